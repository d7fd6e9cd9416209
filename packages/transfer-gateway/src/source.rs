//! Chain event source abstraction
//!
//! The gateway and the oracles only ever see mainnet through this trait:
//! confirmed event logs by height, confirmation depth for a transaction, and
//! lookup of plain transfers for hot-wallet deposits.

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::types::{DepositRecord, TokenDescriptor, TokenValue, TxHash};

/// A release executed by the mainnet gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalCompleted {
    pub tx_hash: TxHash,
    pub recipient: Address,
    pub token: TokenDescriptor,
    pub value: TokenValue,
    pub nonce: u64,
    pub block_number: u64,
}

/// Gateway events observed on mainnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MainnetEvent {
    Deposit(DepositRecord),
    WithdrawalCompleted(WithdrawalCompleted),
}

impl MainnetEvent {
    pub fn block_number(&self) -> u64 {
        match self {
            MainnetEvent::Deposit(d) => d.block_number,
            MainnetEvent::WithdrawalCompleted(w) => w.block_number,
        }
    }

    pub fn tx_hash(&self) -> TxHash {
        match self {
            MainnetEvent::Deposit(d) => d.tx_hash,
            MainnetEvent::WithdrawalCompleted(w) => w.tx_hash,
        }
    }
}

/// Number of confirmations a block at `block` has when the chain head is `head`
pub fn confirmations_at(head: u64, block: u64) -> u64 {
    if block == 0 || block > head {
        0
    } else {
        head - block + 1
    }
}

#[async_trait]
pub trait ChainEventSource: Send + Sync {
    /// Current head block height
    async fn head_height(&self) -> Result<u64, GatewayError>;

    /// Confirmations behind head for a transaction; zero if unknown
    async fn confirmations_for(&self, tx_hash: &TxHash) -> Result<u64, GatewayError>;

    /// Gateway events in the inclusive block range, in block order
    async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<MainnetEvent>, GatewayError>;

    /// Inbound value transfer to the gateway by transaction hash, including
    /// plain transfers that emit no deposit event
    async fn transfer_for(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<DepositRecord>, GatewayError>;

    /// Gateway events from `from` up to the current head
    async fn events_since(&self, from: u64) -> Result<Vec<MainnetEvent>, GatewayError> {
        let head = self.head_height().await?;
        if from > head {
            return Ok(Vec::new());
        }
        self.events_in_range(from, head).await
    }
}
