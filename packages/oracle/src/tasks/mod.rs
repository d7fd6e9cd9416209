//! Oracle tasks
//!
//! Each task is one responsibility of the oracle. `step()` performs a single
//! idempotent pass and returns; the [`TaskRunner`](crate::runner::TaskRunner)
//! decides when to call it again.

use alloy::primitives::{Address, Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::sync::Arc;
use transfer_gateway::{sign_request, ChainEventSource};

use crate::error::OracleError;
use crate::SidechainClient;

pub mod clear_scan;
pub mod deposit_scan;
pub mod signature_scan;

pub use clear_scan::ClearScanner;
pub use deposit_scan::DepositScanner;
pub use signature_scan::SignatureScanner;

/// Everything a task needs to observe mainnet and act on the sidechain
#[derive(Clone)]
pub struct OracleContext {
    /// This oracle's validator key
    pub signer: PrivateKeySigner,
    pub client: Arc<dyn SidechainClient>,
    pub source: Arc<dyn ChainEventSource>,
    /// Mainnet gateway address bound into withdrawal payloads and requests
    pub mainnet_gateway: Address,
    /// Mainnet confirmations before an event is acted on
    pub min_confirmations: u64,
}

impl OracleContext {
    pub fn validator(&self) -> Address {
        self.signer.address()
    }

    /// Sign a gateway request hash with the validator key
    pub fn sign_request(&self, request: &B256) -> Result<Bytes, OracleError> {
        let signature = sign_request(&self.signer, request).map_err(|e| OracleError::Signing {
            reason: e.to_string(),
        })?;
        Ok(Bytes::copy_from_slice(&signature))
    }
}

/// Counts from one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Submissions that changed the ledger
    pub submitted: usize,
    /// Submissions whose effect was already on the ledger
    pub already_applied: usize,
    /// Submissions the gateway refused for good
    pub rejected: usize,
    /// Items left for a later pass
    pub deferred: usize,
}

impl StepReport {
    pub fn is_idle(&self) -> bool {
        *self == StepReport::default()
    }
}

#[async_trait]
pub trait OracleTask: Send {
    fn name(&self) -> &'static str;

    /// One pass over the task's work
    async fn step(&mut self) -> Result<StepReport, OracleError>;

    /// Next mainnet block the task will scan, for tasks that scan blocks
    fn checkpoint(&self) -> Option<u64> {
        None
    }
}

/// Scan position over mainnet blocks
///
/// Only blocks deep enough to have `min_confirmations` are handed out, at
/// most `max_range` at a time. The position moves only when the caller
/// reports a block fully handled.
#[derive(Debug, Clone)]
pub struct BlockCursor {
    next: Option<u64>,
    start: Option<u64>,
    lookback: u64,
    max_range: u64,
}

impl BlockCursor {
    /// Start at `start`, or `lookback` blocks behind the head when unset
    pub fn new(start: Option<u64>, lookback: u64, max_range: u64) -> Self {
        Self {
            next: None,
            start,
            lookback,
            max_range: max_range.max(1),
        }
    }

    pub fn next_block(&self) -> Option<u64> {
        self.next
    }

    /// Inclusive block range ready to scan at `head`, if any
    pub fn ready_range(&mut self, head: u64, min_confirmations: u64) -> Option<(u64, u64)> {
        let initial = self
            .start
            .unwrap_or_else(|| head.saturating_sub(self.lookback));
        let next = *self.next.get_or_insert(initial);
        // confirmations(block) = head - block + 1
        let confirmed_tip = (head + 1).checked_sub(min_confirmations.max(1))?;
        if next > confirmed_tip {
            return None;
        }
        let to = confirmed_tip.min(next.saturating_add(self.max_range - 1));
        Some((next, to))
    }

    /// Every block up to and including `block` is done
    pub fn advance_past(&mut self, block: u64) {
        self.next = Some(block + 1);
    }

    /// Resume from `block`; earlier blocks are done
    pub fn resume_at(&mut self, block: u64) {
        self.next = Some(block);
    }
}
