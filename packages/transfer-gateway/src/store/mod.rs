//! Persistence for the sidechain ledger
//!
//! A store loads the full [`LedgerData`] at startup and durably commits each
//! change set as one unit. The gateway applies a change set in memory only
//! after `commit` returns, so a failed write leaves no partial effect.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::ledger::{LedgerData, StateChange};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load everything persisted so far
    async fn load(&self) -> Result<LedgerData, GatewayError>;

    /// Durably apply a change set, all or nothing
    async fn commit(&self, changes: &[StateChange]) -> Result<(), GatewayError>;
}
