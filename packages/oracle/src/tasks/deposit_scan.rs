//! Deposit scan
//!
//! Walks confirmed mainnet blocks for gateway deposit events and submits each
//! one to the sidechain. The cursor never moves past a block with a deposit
//! that still needs retrying. Announced hot-wallet transfers are looked up by
//! hash and submitted the same way once confirmed.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use transfer_gateway::{deposit_request_hash, DepositOutcome, DepositRecord, MainnetEvent};

use super::{BlockCursor, OracleContext, OracleTask, StepReport};
use crate::bounded_cache::SettledCache;
use crate::error::OracleError;
use crate::retry::{classify, Disposition};

pub struct DepositScanner {
    ctx: OracleContext,
    cursor: BlockCursor,
    settled: SettledCache,
}

impl DepositScanner {
    pub fn new(ctx: OracleContext, cursor: BlockCursor) -> Self {
        Self {
            ctx,
            cursor,
            settled: SettledCache::default(),
        }
    }

    /// Submit one deposit. Only a retryable failure is returned.
    async fn submit(
        &mut self,
        record: DepositRecord,
        report: &mut StepReport,
    ) -> Result<(), OracleError> {
        let tx_hash = record.tx_hash;
        let signature = self
            .ctx
            .sign_request(&deposit_request_hash(&record, &self.ctx.mainnet_gateway))?;
        match self.ctx.client.submit_deposit(record, signature).await {
            Ok(DepositOutcome::AlreadyCredited { .. }) => {
                debug!(tx_hash = %tx_hash, "Deposit already credited");
                report.already_applied += 1;
            }
            Ok(outcome) => {
                info!(tx_hash = %tx_hash, ?outcome, "Deposit submitted");
                report.submitted += 1;
            }
            Err(e) => match classify(&e) {
                Disposition::Applied => report.already_applied += 1,
                Disposition::Rejected => {
                    error!(tx_hash = %tx_hash, error = %e, "Deposit rejected by gateway, skipping");
                    report.rejected += 1;
                }
                Disposition::Retry => {
                    warn!(tx_hash = %tx_hash, error = %e, "Deposit submission failed, will retry");
                    report.deferred += 1;
                    return Err(e);
                }
            },
        }
        self.settled.insert(tx_hash);
        Ok(())
    }

    async fn scan_blocks(&mut self, report: &mut StepReport) -> Result<(), OracleError> {
        let head = self.ctx.source.head_height().await?;
        let Some((from, to)) = self.cursor.ready_range(head, self.ctx.min_confirmations) else {
            return Ok(());
        };

        let events = self.ctx.source.events_in_range(from, to).await?;
        for event in events {
            let MainnetEvent::Deposit(record) = event else {
                continue;
            };
            if self.settled.contains(&record.tx_hash) {
                report.already_applied += 1;
                continue;
            }
            let block = record.block_number;
            if let Err(e) = self.submit(record, report).await {
                self.cursor.resume_at(block);
                return Err(e);
            }
        }

        self.cursor.advance_past(to);
        debug!(from = from, to = to, head = head, "Deposit scan advanced");
        Ok(())
    }

    async fn resolve_hot_wallet(&mut self, report: &mut StepReport) -> Result<(), OracleError> {
        let pending = self.ctx.client.hot_wallet_pending().await?;
        let mut first_error = None;

        for entry in pending {
            if self.settled.contains(&entry.tx_hash) {
                continue;
            }
            let record = match self.ctx.source.transfer_for(&entry.tx_hash).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(tx_hash = %entry.tx_hash, owner = %entry.owner, "Hot-wallet transfer not found on mainnet");
                    report.deferred += 1;
                    continue;
                }
                Err(e) => {
                    report.deferred += 1;
                    first_error.get_or_insert(OracleError::from(e));
                    continue;
                }
            };

            let confirmations = match self.ctx.source.confirmations_for(&entry.tx_hash).await {
                Ok(confirmations) => confirmations,
                Err(e) => {
                    report.deferred += 1;
                    first_error.get_or_insert(OracleError::from(e));
                    continue;
                }
            };
            if confirmations < self.ctx.min_confirmations {
                debug!(
                    tx_hash = %entry.tx_hash,
                    confirmations = confirmations,
                    required = self.ctx.min_confirmations,
                    "Hot-wallet transfer awaiting confirmations"
                );
                report.deferred += 1;
                continue;
            }

            if let Err(e) = self.submit(record, report).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OracleTask for DepositScanner {
    fn name(&self) -> &'static str {
        "deposit_scan"
    }

    async fn step(&mut self) -> Result<StepReport, OracleError> {
        let mut report = StepReport::default();
        // Hot-wallet lookups run even when the block scan has to retry
        let scanned = self.scan_blocks(&mut report).await;
        let resolved = self.resolve_hot_wallet(&mut report).await;
        scanned?;
        resolved?;
        Ok(report)
    }

    fn checkpoint(&self) -> Option<u64> {
        self.cursor.next_block()
    }
}
