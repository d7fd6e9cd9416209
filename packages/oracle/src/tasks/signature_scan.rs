//! Signature scan
//!
//! Signs every outstanding receipt this validator has not signed yet. The
//! payload is rebuilt from the receipt fields, so all validators sign the
//! same bytes for the same receipt.

use alloy::primitives::Bytes;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use transfer_gateway::{sign_withdrawal, ReceiptState, ValidatorSet, WithdrawalReceipt};

use super::{OracleContext, OracleTask, StepReport};
use crate::error::OracleError;
use crate::retry::{classify, Disposition};

pub struct SignatureScanner {
    ctx: OracleContext,
    /// Set versions never change once created
    sets: HashMap<u64, ValidatorSet>,
}

impl SignatureScanner {
    pub fn new(ctx: OracleContext) -> Self {
        Self {
            ctx,
            sets: HashMap::new(),
        }
    }

    async fn is_member(&mut self, version: u64) -> Result<bool, OracleError> {
        if !self.sets.contains_key(&version) {
            let set = self.ctx.client.validator_set(version).await?;
            self.sets.insert(version, set);
        }
        Ok(self
            .sets
            .get(&version)
            .is_some_and(|set| set.contains(&self.ctx.validator())))
    }

    async fn sign(
        &mut self,
        receipt: &WithdrawalReceipt,
        report: &mut StepReport,
    ) -> Result<(), OracleError> {
        let payload = receipt.payload_hash(&self.ctx.mainnet_gateway);
        let signature = sign_withdrawal(&self.ctx.signer, &payload).map_err(|e| {
            OracleError::Signing {
                reason: e.to_string(),
            }
        })?;

        match self
            .ctx
            .client
            .submit_signature(
                receipt.owner,
                self.ctx.validator(),
                Bytes::copy_from_slice(&signature),
            )
            .await
        {
            Ok(state) => {
                report.submitted += 1;
                if state == ReceiptState::Signed {
                    info!(owner = %receipt.owner, nonce = receipt.nonce, "Receipt reached quorum");
                } else {
                    debug!(owner = %receipt.owner, nonce = receipt.nonce, "Signature share submitted");
                }
                Ok(())
            }
            Err(e) => match classify(&e) {
                Disposition::Applied => {
                    report.already_applied += 1;
                    Ok(())
                }
                Disposition::Rejected => {
                    // Cleared between listing and signing, or a share we cannot give
                    warn!(owner = %receipt.owner, nonce = receipt.nonce, error = %e, "Signature share rejected");
                    report.rejected += 1;
                    Ok(())
                }
                Disposition::Retry => {
                    report.deferred += 1;
                    Err(e)
                }
            },
        }
    }
}

#[async_trait]
impl OracleTask for SignatureScanner {
    fn name(&self) -> &'static str {
        "signature_scan"
    }

    async fn step(&mut self) -> Result<StepReport, OracleError> {
        let mut report = StepReport::default();
        let receipts = self.ctx.client.pending_receipts().await?;
        let me = self.ctx.validator();
        let mut first_error = None;

        for receipt in &receipts {
            if receipt.has_signed(&me) {
                continue;
            }
            match self.is_member(receipt.validator_set_version).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        owner = %receipt.owner,
                        version = receipt.validator_set_version,
                        "Not a validator of the receipt's set, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    report.deferred += 1;
                    first_error.get_or_insert(e);
                    continue;
                }
            }
            if let Err(e) = self.sign(receipt, &mut report).await {
                error!(owner = %receipt.owner, error = %e, "Failed to submit signature share");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
