//! Clear scan
//!
//! Walks confirmed mainnet blocks for executed releases and clears the
//! matching sidechain receipt. The release names the mainnet recipient; the
//! receipt is found through that account's identity mapping.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use transfer_gateway::{clear_request_hash, ClearOutcome, MainnetEvent, WithdrawalCompleted};

use super::{BlockCursor, OracleContext, OracleTask, StepReport};
use crate::bounded_cache::SettledCache;
use crate::error::OracleError;
use crate::retry::{classify, Disposition};

pub struct ClearScanner {
    ctx: OracleContext,
    cursor: BlockCursor,
    settled: SettledCache,
}

impl ClearScanner {
    pub fn new(ctx: OracleContext, cursor: BlockCursor) -> Self {
        Self {
            ctx,
            cursor,
            settled: SettledCache::default(),
        }
    }

    /// Clear the receipt behind one release. Only a retryable failure is
    /// returned.
    async fn clear(
        &mut self,
        done: &WithdrawalCompleted,
        report: &mut StepReport,
    ) -> Result<(), OracleError> {
        let Some(mapping) = self.ctx.client.identity_for_mainnet(done.recipient).await? else {
            warn!(
                tx_hash = %done.tx_hash,
                recipient = %done.recipient,
                "Release recipient has no sidechain identity, skipping"
            );
            report.rejected += 1;
            self.settled.insert(done.tx_hash);
            return Ok(());
        };

        let request = clear_request_hash(&mapping.sidechain, done.nonce, &self.ctx.mainnet_gateway);
        let signature = self.ctx.sign_request(&request)?;
        match self
            .ctx
            .client
            .clear_receipt(mapping.sidechain, done.nonce, signature)
            .await
        {
            Ok(ClearOutcome::Cleared) => {
                info!(
                    owner = %mapping.sidechain,
                    nonce = done.nonce,
                    tx_hash = %done.tx_hash,
                    "Receipt cleared"
                );
                report.submitted += 1;
            }
            Ok(ClearOutcome::AlreadyCleared) => {
                debug!(owner = %mapping.sidechain, nonce = done.nonce, "Receipt already cleared");
                report.already_applied += 1;
            }
            Err(e) => match classify(&e) {
                Disposition::Applied => report.already_applied += 1,
                Disposition::Rejected => {
                    error!(tx_hash = %done.tx_hash, error = %e, "Clear rejected by gateway, skipping");
                    report.rejected += 1;
                }
                Disposition::Retry => {
                    report.deferred += 1;
                    return Err(e);
                }
            },
        }
        self.settled.insert(done.tx_hash);
        Ok(())
    }
}

#[async_trait]
impl OracleTask for ClearScanner {
    fn name(&self) -> &'static str {
        "clear_scan"
    }

    async fn step(&mut self) -> Result<StepReport, OracleError> {
        let mut report = StepReport::default();
        let head = self.ctx.source.head_height().await?;
        let Some((from, to)) = self.cursor.ready_range(head, self.ctx.min_confirmations) else {
            return Ok(report);
        };

        let events = self.ctx.source.events_in_range(from, to).await?;
        for event in events {
            let MainnetEvent::WithdrawalCompleted(done) = event else {
                continue;
            };
            if self.settled.contains(&done.tx_hash) {
                report.already_applied += 1;
                continue;
            }
            if let Err(e) = self.clear(&done, &mut report).await {
                warn!(tx_hash = %done.tx_hash, error = %e, "Clear failed, will retry");
                self.cursor.resume_at(done.block_number);
                return Err(e);
            }
        }

        self.cursor.advance_past(to);
        Ok(report)
    }

    fn checkpoint(&self) -> Option<u64> {
        self.cursor.next_block()
    }
}
