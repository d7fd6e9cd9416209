//! Sidechain ledger state and the change sets that mutate it
//!
//! Operations never mutate [`LedgerData`] directly. They compute a list of
//! [`StateChange`]s from the current state; the caller persists the batch and
//! only then applies it in memory. A batch is the unit of atomicity: a
//! registry insert and its credit always travel together.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;

use crate::rate_limit::{RateLimitDebit, RateLimitWindow};
use crate::receipts::WithdrawalReceipt;
use crate::registry::{DepositRegistry, HotWalletEntry};
use crate::types::{BalanceKey, DepositRecord, IdentityMapping, TxHash};
use crate::validators::{ValidatorRegistry, ValidatorSet};

/// One persisted mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    DepositRecorded(DepositRecord),
    HotWalletRegistered(HotWalletEntry),
    /// Lapsed announcement dropped without a credit
    HotWalletExpired { tx_hash: TxHash },
    /// Absolute balance of a sidechain account; zero removes the entry
    BalanceSet { key: BalanceKey, amount: U256 },
    /// Absolute unclaimed amount held for an unmapped mainnet depositor
    UnclaimedSet { key: BalanceKey, amount: U256 },
    ReceiptSaved(WithdrawalReceipt),
    ReceiptRemoved { owner: Address },
    NonceSet { owner: Address, nonce: u64 },
    RateLimitDebited(RateLimitDebit),
    IdentityMapped(IdentityMapping),
    ValidatorSetAdded(ValidatorSet),
}

/// Two-way identity lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityBook {
    by_mainnet: HashMap<Address, Address>,
    by_sidechain: HashMap<Address, Address>,
}

impl IdentityBook {
    pub fn sidechain_for(&self, mainnet: &Address) -> Option<Address> {
        self.by_mainnet.get(mainnet).copied()
    }

    pub fn mainnet_for(&self, sidechain: &Address) -> Option<Address> {
        self.by_sidechain.get(sidechain).copied()
    }

    pub fn all(&self) -> Vec<IdentityMapping> {
        self.by_mainnet
            .iter()
            .map(|(m, s)| IdentityMapping {
                mainnet: *m,
                sidechain: *s,
            })
            .collect()
    }

    fn insert(&mut self, mapping: IdentityMapping) {
        self.by_mainnet.insert(mapping.mainnet, mapping.sidechain);
        self.by_sidechain.insert(mapping.sidechain, mapping.mainnet);
    }
}

/// Everything the sidechain gateway persists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerData {
    pub(crate) registry: DepositRegistry,
    pub(crate) receipts: HashMap<Address, WithdrawalReceipt>,
    /// Last withdrawal nonce issued per owner
    pub(crate) nonces: HashMap<Address, u64>,
    pub(crate) balances: HashMap<BalanceKey, U256>,
    pub(crate) unclaimed: HashMap<BalanceKey, U256>,
    pub(crate) identities: IdentityBook,
    pub(crate) rate_window: RateLimitWindow,
    pub(crate) validators: ValidatorRegistry,
}

impl LedgerData {
    pub fn apply(&mut self, change: &StateChange) {
        match change {
            StateChange::DepositRecorded(deposit) => self.registry.record(deposit.clone()),
            StateChange::HotWalletRegistered(entry) => self.registry.add_hot_wallet(*entry),
            StateChange::HotWalletExpired { tx_hash } => self.registry.remove_hot_wallet(tx_hash),
            StateChange::BalanceSet { key, amount } => {
                set_or_remove(&mut self.balances, *key, *amount)
            }
            StateChange::UnclaimedSet { key, amount } => {
                set_or_remove(&mut self.unclaimed, *key, *amount)
            }
            StateChange::ReceiptSaved(receipt) => {
                self.receipts.insert(receipt.owner, receipt.clone());
            }
            StateChange::ReceiptRemoved { owner } => {
                self.receipts.remove(owner);
            }
            StateChange::NonceSet { owner, nonce } => {
                self.nonces.insert(*owner, *nonce);
            }
            StateChange::RateLimitDebited(debit) => self.rate_window.apply(debit),
            StateChange::IdentityMapped(mapping) => self.identities.insert(*mapping),
            StateChange::ValidatorSetAdded(set) => self.validators.insert(set.clone()),
        }
    }

    pub fn apply_all(&mut self, changes: &[StateChange]) {
        for change in changes {
            self.apply(change);
        }
    }

    pub fn registry(&self) -> &DepositRegistry {
        &self.registry
    }

    pub fn receipt(&self, owner: &Address) -> Option<&WithdrawalReceipt> {
        self.receipts.get(owner)
    }

    pub fn receipts(&self) -> impl Iterator<Item = &WithdrawalReceipt> {
        self.receipts.values()
    }

    pub fn last_nonce(&self, owner: &Address) -> u64 {
        self.nonces.get(owner).copied().unwrap_or(0)
    }

    pub fn balance(&self, key: &BalanceKey) -> U256 {
        self.balances.get(key).copied().unwrap_or(U256::ZERO)
    }

    pub fn unclaimed(&self, key: &BalanceKey) -> U256 {
        self.unclaimed.get(key).copied().unwrap_or(U256::ZERO)
    }

    pub fn identities(&self) -> &IdentityBook {
        &self.identities
    }

    pub fn rate_window(&self) -> &RateLimitWindow {
        &self.rate_window
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    /// Iterate persisted balances (used by storage backends and snapshots)
    pub fn balance_entries(&self) -> impl Iterator<Item = (&BalanceKey, &U256)> {
        self.balances.iter()
    }

    pub fn unclaimed_entries(&self) -> impl Iterator<Item = (&BalanceKey, &U256)> {
        self.unclaimed.iter()
    }

    /// Total held by every sidechain account for one (contract, token id)
    pub fn supply_of(&self, contract: &Address, token_id: &U256) -> U256 {
        self.balances
            .iter()
            .filter(|(k, _)| k.contract == *contract && k.token_id == *token_id)
            .fold(U256::ZERO, |acc, (_, v)| acc.saturating_add(*v))
    }
}

fn set_or_remove(map: &mut HashMap<BalanceKey, U256>, key: BalanceKey, amount: U256) {
    if amount.is_zero() {
        map.remove(&key);
    } else {
        map.insert(key, amount);
    }
}
