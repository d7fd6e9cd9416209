//! Deposit registry: the idempotency ledger of credited mainnet deposits
//!
//! A deposit's source transaction hash is its identity. Once recorded, a hash
//! can never be credited again. Identical resubmissions (every oracle submits
//! the same deposit) are benign; resubmissions with different contents are
//! conflicts.
//!
//! The registry also holds hot-wallet pre-registrations: hashes a user has
//! announced before oracles have credited them. Each announcement records the
//! mainnet head it was made at and lapses `expiry_blocks` later.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::GatewayError;
use crate::types::{DepositRecord, TxHash};

/// Result of checking a deposit against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryCheck {
    /// Never seen; may be credited
    New,
    /// Already credited with identical contents
    AlreadyCredited,
}

/// A hot-wallet hash announced by a sidechain account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotWalletEntry {
    pub tx_hash: TxHash,
    pub owner: Address,
    /// Mainnet head when the announcement was accepted
    pub registered_at: u64,
}

impl HotWalletEntry {
    /// Lapsed at `head`; zero `expiry_blocks` never lapses
    pub fn is_expired(&self, head: u64, expiry_blocks: u64) -> bool {
        expiry_blocks != 0 && head > self.registered_at.saturating_add(expiry_blocks)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositRegistry {
    credited: HashMap<TxHash, DepositRecord>,
    hot_wallet: HashMap<TxHash, HotWalletEntry>,
}

impl DepositRegistry {
    /// Classify a deposit submission
    pub fn check(&self, deposit: &DepositRecord) -> Result<RegistryCheck, GatewayError> {
        match self.credited.get(&deposit.tx_hash) {
            None => Ok(RegistryCheck::New),
            Some(existing) if existing == deposit => Ok(RegistryCheck::AlreadyCredited),
            Some(_) => Err(GatewayError::AlreadyProcessed {
                tx_hash: deposit.tx_hash,
            }),
        }
    }

    /// Check a hot-wallet announcement: rejected as processed once credited,
    /// and as pending while an earlier announcement is unresolved
    pub fn check_hot_wallet(&self, tx_hash: &TxHash) -> Result<(), GatewayError> {
        if self.credited.contains_key(tx_hash) {
            return Err(GatewayError::AlreadyProcessed { tx_hash: *tx_hash });
        }
        if self.hot_wallet.contains_key(tx_hash) {
            return Err(GatewayError::DepositPending { tx_hash: *tx_hash });
        }
        Ok(())
    }

    pub fn get(&self, tx_hash: &TxHash) -> Option<&DepositRecord> {
        self.credited.get(tx_hash)
    }

    pub fn is_credited(&self, tx_hash: &TxHash) -> bool {
        self.credited.contains_key(tx_hash)
    }

    pub fn is_hot_wallet_pending(&self, tx_hash: &TxHash) -> bool {
        self.hot_wallet.contains_key(tx_hash)
    }

    /// Every stored hot-wallet announcement, lapsed or not, in no order
    pub fn hot_wallet_entries(&self) -> impl Iterator<Item = &HotWalletEntry> {
        self.hot_wallet.values()
    }

    /// Announcements still live at `head`
    pub fn pending_hot_wallet(&self, head: u64, expiry_blocks: u64) -> Vec<HotWalletEntry> {
        self.hot_wallet
            .values()
            .filter(|e| !e.is_expired(head, expiry_blocks))
            .copied()
            .collect()
    }

    /// Announcements lapsed at `head`
    pub fn expired_hot_wallet(&self, head: u64, expiry_blocks: u64) -> Vec<TxHash> {
        self.hot_wallet
            .values()
            .filter(|e| e.is_expired(head, expiry_blocks))
            .map(|e| e.tx_hash)
            .collect()
    }

    /// Live announcements made by `owner`
    pub fn hot_wallet_count(&self, owner: &Address, head: u64, expiry_blocks: u64) -> usize {
        self.hot_wallet
            .values()
            .filter(|e| e.owner == *owner && !e.is_expired(head, expiry_blocks))
            .count()
    }

    pub fn credited_count(&self) -> usize {
        self.credited.len()
    }

    pub(crate) fn record(&mut self, deposit: DepositRecord) {
        self.hot_wallet.remove(&deposit.tx_hash);
        self.credited.insert(deposit.tx_hash, deposit);
    }

    pub(crate) fn add_hot_wallet(&mut self, entry: HotWalletEntry) {
        self.hot_wallet.insert(entry.tx_hash, entry);
    }

    pub(crate) fn remove_hot_wallet(&mut self, tx_hash: &TxHash) {
        self.hot_wallet.remove(tx_hash);
    }
}
