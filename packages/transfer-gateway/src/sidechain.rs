//! Sidechain gateway
//!
//! Owns the sidechain ledger: deposit registry, mirrored balances, withdrawal
//! receipts, rate-limit window and validator sets. Every mutating operation
//! runs under one lock:
//!
//! 1. plan the change set against the current state (pure, may fail)
//! 2. persist it through the [`LedgerStore`]
//! 3. apply it in memory
//!
//! A failed plan or a failed persist leaves the ledger untouched, so a
//! registry insert can never be observed without its credit.
//!
//! Requests made on someone's behalf are signed (see [`crate::auth`]):
//! signatures are checked before the lock is taken, nonces and membership
//! under it.

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::auth::{
    clear_request_hash, deposit_request_hash, hot_wallet_request_hash, identity_request_hash,
    verify_request, withdrawal_request_hash,
};
use crate::error::GatewayError;
use crate::ledger::{LedgerData, StateChange};
use crate::metrics;
use crate::rate_limit::RateLimitConfig;
use crate::receipts::{ReceiptState, WithdrawalReceipt};
use crate::registry::{HotWalletEntry, RegistryCheck};
use crate::source::ChainEventSource;
use crate::store::LedgerStore;
use crate::types::{
    BalanceKey, DepositRecord, IdentityMapping, TokenDescriptor, TokenKind, TokenValue, TxHash,
};
use crate::validators::{recover_signer, ValidatorSet};

/// Announcements lapse after about a week of 15s blocks
pub const DEFAULT_HOT_WALLET_EXPIRY_BLOCKS: u64 = 40_320;
pub const DEFAULT_MAX_HOT_WALLET_PER_OWNER: usize = 16;
pub const DEFAULT_MIN_CONFIRMATIONS: u64 = 12;

/// Static gateway parameters
#[derive(Debug, Clone)]
pub struct GatewayParams {
    /// Mainnet gateway address, bound into every signed payload
    pub mainnet_gateway: Address,
    pub rate_limits: RateLimitConfig,
    /// Mainnet confirmations required before a deposit may be credited
    pub min_confirmations: u64,
    /// Token contracts the operator may mint on the sidechain
    pub mintable_tokens: HashSet<Address>,
    /// Blocks after which an uncredited hot-wallet announcement lapses (0 = never)
    pub hot_wallet_expiry_blocks: u64,
    /// Live announcements allowed per owner (0 = unlimited)
    pub max_hot_wallet_per_owner: usize,
}

impl GatewayParams {
    pub fn new(mainnet_gateway: Address) -> Self {
        Self {
            mainnet_gateway,
            rate_limits: RateLimitConfig::default(),
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            mintable_tokens: HashSet::new(),
            hot_wallet_expiry_blocks: DEFAULT_HOT_WALLET_EXPIRY_BLOCKS,
            max_hot_wallet_per_owner: DEFAULT_MAX_HOT_WALLET_PER_OWNER,
        }
    }
}

/// Result of a deposit submission that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DepositOutcome {
    /// First submission: credited to the depositor's sidechain account
    Credited { balance: U256 },
    /// Identical resubmission: nothing changed
    AlreadyCredited { balance: U256 },
    /// Depositor has no identity mapping yet: value held until one is created
    HeldUnclaimed { held: U256 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearOutcome {
    Cleared,
    /// No receipt with that nonce is outstanding
    AlreadyCleared,
}

/// Everything a user needs to call release on mainnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalAuthorization {
    pub receipt: WithdrawalReceipt,
    /// Shares concatenated in validator-set order
    pub signatures: Bytes,
}

pub struct SidechainGateway {
    params: GatewayParams,
    state: Mutex<LedgerData>,
    store: Arc<dyn LedgerStore>,
    source: Arc<dyn ChainEventSource>,
}

impl SidechainGateway {
    /// Load persisted state, seeding `genesis` as version 1 on an empty store
    pub async fn open(
        params: GatewayParams,
        genesis: ValidatorSet,
        store: Arc<dyn LedgerStore>,
        source: Arc<dyn ChainEventSource>,
    ) -> Result<Self, GatewayError> {
        let mut data = store.load().await?;
        if data.validators().active().is_none() {
            let changes = vec![StateChange::ValidatorSetAdded(genesis)];
            store.commit(&changes).await?;
            data.apply_all(&changes);
        }

        info!(
            validator_set_version = data.validators().active_version(),
            credited_deposits = data.registry().credited_count(),
            outstanding_receipts = data.receipts().count(),
            mainnet_gateway = %params.mainnet_gateway,
            mintable_tokens = params.mintable_tokens.len(),
            "Sidechain gateway opened"
        );
        metrics::ACTIVE_VALIDATOR_SET.set(data.validators().active_version() as i64);
        metrics::OUTSTANDING_RECEIPTS.set(data.receipts().count() as i64);

        Ok(Self {
            params,
            state: Mutex::new(data),
            store,
            source,
        })
    }

    pub fn params(&self) -> &GatewayParams {
        &self.params
    }

    async fn commit(
        &self,
        state: &mut LedgerData,
        operation: &str,
        changes: Vec<StateChange>,
    ) -> Result<(), GatewayError> {
        if changes.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.store.commit(&changes).await {
            error!(error = %e, operation = operation, "Ledger commit failed, state unchanged");
            metrics::STORE_FAILURES.with_label_values(&[operation]).inc();
            return Err(e);
        }
        state.apply_all(&changes);
        metrics::OUTSTANDING_RECEIPTS.set(state.receipts().count() as i64);
        Ok(())
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Link a mainnet account to a sidechain account. Both accounts sign the
    /// same identity request. Value held for the mainnet account is moved
    /// into the sidechain balance.
    pub async fn map_identity(
        &self,
        mainnet: Address,
        sidechain: Address,
        mainnet_signature: &[u8],
        sidechain_signature: &[u8],
    ) -> Result<Vec<BalanceKey>, GatewayError> {
        let request = identity_request_hash(&mainnet, &sidechain, &self.params.mainnet_gateway);
        verify_request(&request, mainnet_signature, &mainnet)?;
        verify_request(&request, sidechain_signature, &sidechain)?;

        let mut state = self.state.lock().await;
        let (claimed, changes) = plan_identity(&state, mainnet, sidechain)?;
        self.commit(&mut state, "map_identity", changes).await?;
        info!(
            mainnet = %mainnet,
            sidechain = %sidechain,
            claimed = claimed.len(),
            "Identity mapped"
        );
        Ok(claimed)
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Credit a confirmed mainnet deposit. Called by every oracle with its
    /// validator signature; the first call credits, identical repeats are
    /// no-ops.
    pub async fn submit_deposit(
        &self,
        deposit: DepositRecord,
        signature: &[u8],
    ) -> Result<DepositOutcome, GatewayError> {
        let result = self.submit_deposit_inner(deposit, signature).await;
        metrics::observe(&metrics::DEPOSITS, &result);
        result
    }

    async fn submit_deposit_inner(
        &self,
        deposit: DepositRecord,
        signature: &[u8],
    ) -> Result<DepositOutcome, GatewayError> {
        let request = deposit_request_hash(&deposit, &self.params.mainnet_gateway);
        let submitter = recover_signer(&request, signature)?;
        {
            let state = self.state.lock().await;
            active_set(&state)?.ensure_member(&submitter)?;
            if state.registry().check(&deposit)? == RegistryCheck::AlreadyCredited {
                let (outcome, _) = plan_deposit(&state, &deposit)?;
                debug!(tx_hash = %deposit.tx_hash, submitter = %submitter, "Deposit already credited");
                return Ok(outcome);
            }
        }

        // Chain queries run outside the lock
        let confirmations = self.source.confirmations_for(&deposit.tx_hash).await?;
        if confirmations < self.params.min_confirmations {
            return Err(GatewayError::InsufficientConfirmations {
                tx_hash: deposit.tx_hash,
                confirmations,
                required: self.params.min_confirmations,
            });
        }
        match self.source.transfer_for(&deposit.tx_hash).await? {
            Some(observed) if observed == deposit => {}
            observed => {
                warn!(
                    tx_hash = %deposit.tx_hash,
                    submitter = %submitter,
                    claimed_amount = %deposit.value.amount,
                    observed_amount = ?observed.map(|o| o.value.amount),
                    "Deposit does not match the mainnet transfer"
                );
                return Err(GatewayError::DepositMismatch {
                    tx_hash: deposit.tx_hash,
                });
            }
        }

        let mut state = self.state.lock().await;
        let (outcome, changes) = plan_deposit(&state, &deposit)?;
        self.commit(&mut state, "submit_deposit", changes).await?;

        match outcome {
            DepositOutcome::Credited { balance } => info!(
                tx_hash = %deposit.tx_hash,
                depositor = %deposit.depositor,
                token = %deposit.token.contract,
                amount = %deposit.value.amount,
                balance = %balance,
                submitter = %submitter,
                "Deposit credited"
            ),
            DepositOutcome::HeldUnclaimed { held } => warn!(
                tx_hash = %deposit.tx_hash,
                depositor = %deposit.depositor,
                held = %held,
                "Deposit from unmapped account held as unclaimed"
            ),
            DepositOutcome::AlreadyCredited { .. } => {
                debug!(tx_hash = %deposit.tx_hash, "Deposit credited concurrently")
            }
        }
        Ok(outcome)
    }

    /// Announce a mainnet transfer sent straight to the gateway so oracles
    /// can look it up and credit it. Signed by `owner`; lapsed announcements
    /// are pruned in the same commit.
    pub async fn submit_hot_wallet_deposit(
        &self,
        owner: Address,
        tx_hash: TxHash,
        signature: &[u8],
    ) -> Result<HotWalletEntry, GatewayError> {
        let request = hot_wallet_request_hash(&owner, &tx_hash, &self.params.mainnet_gateway);
        verify_request(&request, signature, &owner)?;
        let head = self.source.head_height().await?;

        let mut state = self.state.lock().await;
        let (entry, changes) = plan_hot_wallet(&state, &self.params, owner, tx_hash, head)?;
        let pruned = changes.len() - 1;
        self.commit(&mut state, "submit_hot_wallet_deposit", changes)
            .await?;
        info!(
            tx_hash = %tx_hash,
            owner = %owner,
            registered_at = head,
            pruned = pruned,
            "Hot-wallet deposit registered"
        );
        Ok(entry)
    }

    /// Drop announcements that lapsed without a credit. Returns how many.
    pub async fn prune_hot_wallet(&self) -> Result<usize, GatewayError> {
        let expiry = self.params.hot_wallet_expiry_blocks;
        if expiry == 0 {
            return Ok(0);
        }
        let head = self.source.head_height().await?;

        let mut state = self.state.lock().await;
        let changes: Vec<_> = state
            .registry()
            .expired_hot_wallet(head, expiry)
            .into_iter()
            .map(|tx_hash| StateChange::HotWalletExpired { tx_hash })
            .collect();
        let pruned = changes.len();
        self.commit(&mut state, "prune_hot_wallet", changes).await?;
        if pruned > 0 {
            info!(pruned = pruned, head = head, "Lapsed hot-wallet announcements pruned");
        }
        Ok(pruned)
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Burn sidechain value and open a `Pending` receipt. The owner signs the
    /// request for the nonce the receipt will carry, so a signed request is
    /// accepted at most once. `now` is unix seconds and drives the
    /// rate-limit window.
    pub async fn request_withdrawal(
        &self,
        owner: Address,
        token: TokenDescriptor,
        value: TokenValue,
        nonce: u64,
        signature: &[u8],
        now: u64,
    ) -> Result<WithdrawalReceipt, GatewayError> {
        let result = self
            .request_withdrawal_inner(owner, token, value, nonce, signature, now)
            .await;
        metrics::observe(&metrics::WITHDRAWALS, &result);
        result
    }

    async fn request_withdrawal_inner(
        &self,
        owner: Address,
        token: TokenDescriptor,
        value: TokenValue,
        nonce: u64,
        signature: &[u8],
        now: u64,
    ) -> Result<WithdrawalReceipt, GatewayError> {
        let request =
            withdrawal_request_hash(&owner, &token, &value, nonce, &self.params.mainnet_gateway);
        verify_request(&request, signature, &owner)?;

        let mut state = self.state.lock().await;
        let (receipt, changes) = plan_withdrawal(
            &state,
            &self.params.rate_limits,
            owner,
            token,
            value,
            nonce,
            now,
        )?;
        self.commit(&mut state, "request_withdrawal", changes).await?;

        info!(
            owner = %owner,
            recipient = %receipt.recipient,
            token = %token.contract,
            amount = %value.amount,
            nonce = receipt.nonce,
            validator_set_version = receipt.validator_set_version,
            "Withdrawal receipt created"
        );
        Ok(receipt)
    }

    /// Nonce the next withdrawal request from `owner` must be signed for
    pub async fn next_withdrawal_nonce(&self, owner: &Address) -> u64 {
        self.state.lock().await.last_nonce(owner) + 1
    }

    /// Add one validator's signature share to `owner`'s receipt
    pub async fn submit_signature(
        &self,
        owner: Address,
        validator: Address,
        signature: &[u8],
    ) -> Result<ReceiptState, GatewayError> {
        let mut state = self.state.lock().await;
        let result = plan_signature(&state, &self.params.mainnet_gateway, owner, validator, signature);
        metrics::observe(&metrics::SIGNATURE_SHARES, &result);
        let receipt = result?;
        let new_state = receipt.state;
        let count = receipt.signature_count();
        self.commit(
            &mut state,
            "submit_signature",
            vec![StateChange::ReceiptSaved(receipt)],
        )
        .await?;

        debug!(owner = %owner, validator = %validator, shares = count, "Signature share accepted");
        if new_state == ReceiptState::Signed {
            info!(owner = %owner, shares = count, "Withdrawal receipt signed");
        }
        Ok(new_state)
    }

    /// Remove `owner`'s receipt once its release was observed on mainnet.
    /// The request must be signed by a validator of the active set.
    pub async fn clear_receipt(
        &self,
        owner: Address,
        nonce: u64,
        signature: &[u8],
    ) -> Result<ClearOutcome, GatewayError> {
        let request = clear_request_hash(&owner, nonce, &self.params.mainnet_gateway);
        let submitter = recover_signer(&request, signature)?;

        let mut state = self.state.lock().await;
        active_set(&state)?.ensure_member(&submitter)?;

        let outcome = match state.receipt(&owner) {
            Some(receipt) if receipt.nonce == nonce => ClearOutcome::Cleared,
            _ => ClearOutcome::AlreadyCleared,
        };
        metrics::RECEIPTS_CLEARED
            .with_label_values(&[match outcome {
                ClearOutcome::Cleared => "cleared",
                ClearOutcome::AlreadyCleared => "already_cleared",
            }])
            .inc();

        if outcome == ClearOutcome::Cleared {
            self.commit(
                &mut state,
                "clear_receipt",
                vec![StateChange::ReceiptRemoved { owner }],
            )
            .await?;
            info!(owner = %owner, nonce = nonce, submitter = %submitter, "Withdrawal receipt cleared");
        }
        Ok(outcome)
    }

    // =========================================================================
    // Minting
    // =========================================================================

    /// Create sidechain-native value for a mintable token. Operator call, not
    /// reachable over the API. A withdrawal of minted value is minted on
    /// mainnet when the escrow cannot cover it. Returns the new balance.
    pub async fn mint(
        &self,
        account: Address,
        token: TokenDescriptor,
        value: TokenValue,
    ) -> Result<U256, GatewayError> {
        let mut state = self.state.lock().await;
        let (balance, changes) = plan_mint(&state, &self.params, account, token, value)?;
        self.commit(&mut state, "mint", changes).await?;
        info!(
            account = %account,
            token = %token.contract,
            kind = %token.kind,
            token_id = %value.token_id,
            amount = %value.amount,
            balance = %balance,
            "Sidechain tokens minted"
        );
        Ok(balance)
    }

    // =========================================================================
    // Validators
    // =========================================================================

    /// Install the next validator set version. Outstanding receipts keep
    /// collecting shares against the version they were created with.
    pub async fn rotate_validators(
        &self,
        validators: Vec<Address>,
    ) -> Result<ValidatorSet, GatewayError> {
        let mut state = self.state.lock().await;
        let set = state.validators().next_set(validators)?;
        self.commit(
            &mut state,
            "rotate_validators",
            vec![StateChange::ValidatorSetAdded(set.clone())],
        )
        .await?;
        metrics::ACTIVE_VALIDATOR_SET.set(set.version() as i64);
        info!(
            version = set.version(),
            validators = set.len(),
            quorum = set.quorum(),
            "Validator set rotated"
        );
        Ok(set)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn receipt(&self, owner: &Address) -> Option<WithdrawalReceipt> {
        self.state.lock().await.receipt(owner).cloned()
    }

    /// Outstanding receipts ordered by owner
    pub async fn pending_receipts(&self) -> Vec<WithdrawalReceipt> {
        let state = self.state.lock().await;
        let mut receipts: Vec<_> = state.receipts().cloned().collect();
        receipts.sort_by_key(|r| r.owner);
        receipts
    }

    /// The receipt plus its aggregated signature, for presenting on mainnet
    pub async fn withdrawal_authorization(
        &self,
        owner: &Address,
    ) -> Result<WithdrawalAuthorization, GatewayError> {
        let state = self.state.lock().await;
        let receipt = state
            .receipt(owner)
            .ok_or(GatewayError::ReceiptNotFound { owner: *owner })?;
        let set = state.validators().get(receipt.validator_set_version)?;
        Ok(WithdrawalAuthorization {
            signatures: Bytes::from(receipt.aggregated_signature(set)),
            receipt: receipt.clone(),
        })
    }

    /// Balance of one (contract, token id) slot, whatever the token kind
    pub async fn balance_of(&self, account: Address, contract: Address, token_id: U256) -> U256 {
        let key = BalanceKey {
            account,
            contract,
            token_id,
        };
        self.state.lock().await.balance(&key)
    }

    pub async fn balance(&self, account: Address, token: &TokenDescriptor, token_id: U256) -> U256 {
        self.balance_of(account, token.contract, token_id).await
    }

    /// Value held for an unmapped mainnet depositor
    pub async fn unclaimed(&self, depositor: Address, token: &TokenDescriptor, token_id: U256) -> U256 {
        let key = BalanceKey {
            account: depositor,
            contract: token.contract,
            token_id,
        };
        self.state.lock().await.unclaimed(&key)
    }

    pub async fn identity_for_mainnet(&self, mainnet: &Address) -> Option<IdentityMapping> {
        let state = self.state.lock().await;
        state
            .identities()
            .sidechain_for(mainnet)
            .map(|sidechain| IdentityMapping {
                mainnet: *mainnet,
                sidechain,
            })
    }

    pub async fn identity_for_sidechain(&self, sidechain: &Address) -> Option<IdentityMapping> {
        let state = self.state.lock().await;
        state
            .identities()
            .mainnet_for(sidechain)
            .map(|mainnet| IdentityMapping {
                mainnet,
                sidechain: *sidechain,
            })
    }

    pub async fn is_credited(&self, tx_hash: &TxHash) -> bool {
        self.state.lock().await.registry().is_credited(tx_hash)
    }

    pub async fn deposit(&self, tx_hash: &TxHash) -> Option<DepositRecord> {
        self.state.lock().await.registry().get(tx_hash).cloned()
    }

    /// Announced hot-wallet hashes neither credited nor lapsed, by hash
    pub async fn hot_wallet_pending(&self) -> Result<Vec<HotWalletEntry>, GatewayError> {
        let head = self.source.head_height().await?;
        let mut pending = self
            .state
            .lock()
            .await
            .registry()
            .pending_hot_wallet(head, self.params.hot_wallet_expiry_blocks);
        pending.sort_by_key(|e| e.tx_hash);
        Ok(pending)
    }

    pub async fn active_validator_set(&self) -> Result<ValidatorSet, GatewayError> {
        let state = self.state.lock().await;
        active_set(&state).cloned()
    }

    pub async fn validator_set(&self, version: u64) -> Result<ValidatorSet, GatewayError> {
        self.state.lock().await.validators().get(version).cloned()
    }

    /// `account`'s and everyone's withdrawals of `contract` in the window in
    /// effect at `now`
    pub async fn withdrawn_in_window(
        &self,
        account: &Address,
        contract: &Address,
        now: u64,
    ) -> (U256, U256) {
        let state = self.state.lock().await;
        let window = state.rate_window().rolled_over(&self.params.rate_limits, now);
        (window.used_by(contract, account), window.total_for(contract))
    }
}

fn active_set(state: &LedgerData) -> Result<&ValidatorSet, GatewayError> {
    state
        .validators()
        .active()
        .ok_or(GatewayError::EmptyValidatorSet)
}

fn plan_identity(
    state: &LedgerData,
    mainnet: Address,
    sidechain: Address,
) -> Result<(Vec<BalanceKey>, Vec<StateChange>), GatewayError> {
    if state.identities().sidechain_for(&mainnet).is_some() {
        return Err(GatewayError::IdentityAlreadyMapped { account: mainnet });
    }
    if state.identities().mainnet_for(&sidechain).is_some() {
        return Err(GatewayError::IdentityAlreadyMapped { account: sidechain });
    }

    let mut changes = vec![StateChange::IdentityMapped(IdentityMapping { mainnet, sidechain })];
    let mut claimed = Vec::new();
    for (key, held) in state.unclaimed_entries().filter(|(k, _)| k.account == mainnet) {
        let target = BalanceKey {
            account: sidechain,
            ..*key
        };
        let balance = state
            .balance(&target)
            .checked_add(*held)
            .ok_or_else(overflow)?;
        changes.push(StateChange::UnclaimedSet {
            key: *key,
            amount: U256::ZERO,
        });
        changes.push(StateChange::BalanceSet {
            key: target,
            amount: balance,
        });
        claimed.push(target);
    }
    Ok((claimed, changes))
}

fn plan_deposit(
    state: &LedgerData,
    deposit: &DepositRecord,
) -> Result<(DepositOutcome, Vec<StateChange>), GatewayError> {
    let check = state.registry().check(deposit)?;
    deposit.value.validate_for(deposit.token.kind)?;

    let mapped = state.identities().sidechain_for(&deposit.depositor);
    match (check, mapped) {
        (RegistryCheck::AlreadyCredited, Some(account)) => {
            let key = BalanceKey::new(account, &deposit.token, &deposit.value);
            Ok((
                DepositOutcome::AlreadyCredited {
                    balance: state.balance(&key),
                },
                Vec::new(),
            ))
        }
        (RegistryCheck::AlreadyCredited, None) => {
            let key = BalanceKey::new(deposit.depositor, &deposit.token, &deposit.value);
            Ok((
                DepositOutcome::AlreadyCredited {
                    balance: state.unclaimed(&key),
                },
                Vec::new(),
            ))
        }
        (RegistryCheck::New, Some(account)) => {
            let key = BalanceKey::new(account, &deposit.token, &deposit.value);
            let balance = state
                .balance(&key)
                .checked_add(deposit.value.amount)
                .ok_or_else(overflow)?;
            Ok((
                DepositOutcome::Credited { balance },
                vec![
                    StateChange::DepositRecorded(deposit.clone()),
                    StateChange::BalanceSet {
                        key,
                        amount: balance,
                    },
                ],
            ))
        }
        (RegistryCheck::New, None) => {
            let key = BalanceKey::new(deposit.depositor, &deposit.token, &deposit.value);
            let held = state
                .unclaimed(&key)
                .checked_add(deposit.value.amount)
                .ok_or_else(overflow)?;
            Ok((
                DepositOutcome::HeldUnclaimed { held },
                vec![
                    StateChange::DepositRecorded(deposit.clone()),
                    StateChange::UnclaimedSet { key, amount: held },
                ],
            ))
        }
    }
}

/// The new entry plus its change set; lapsed entries come first
fn plan_hot_wallet(
    state: &LedgerData,
    params: &GatewayParams,
    owner: Address,
    tx_hash: TxHash,
    head: u64,
) -> Result<(HotWalletEntry, Vec<StateChange>), GatewayError> {
    let expiry = params.hot_wallet_expiry_blocks;
    let expired = state.registry().expired_hot_wallet(head, expiry);

    match state.registry().check_hot_wallet(&tx_hash) {
        // a lapsed announcement may be made again
        Err(GatewayError::DepositPending { .. }) if expired.contains(&tx_hash) => {}
        other => other?,
    }
    let limit = params.max_hot_wallet_per_owner;
    if limit != 0 && state.registry().hot_wallet_count(&owner, head, expiry) >= limit {
        return Err(GatewayError::HotWalletLimitReached { owner, limit });
    }

    let entry = HotWalletEntry {
        tx_hash,
        owner,
        registered_at: head,
    };
    let mut changes: Vec<_> = expired
        .into_iter()
        .map(|tx_hash| StateChange::HotWalletExpired { tx_hash })
        .collect();
    changes.push(StateChange::HotWalletRegistered(entry));
    Ok((entry, changes))
}

fn plan_withdrawal(
    state: &LedgerData,
    limits: &RateLimitConfig,
    owner: Address,
    token: TokenDescriptor,
    value: TokenValue,
    nonce: u64,
    now: u64,
) -> Result<(WithdrawalReceipt, Vec<StateChange>), GatewayError> {
    if state.receipt(&owner).is_some() {
        return Err(GatewayError::ReceiptBusy { owner });
    }
    let expected = state.last_nonce(&owner) + 1;
    if nonce != expected {
        return Err(GatewayError::UnexpectedNonce {
            owner,
            expected,
            nonce,
        });
    }
    let recipient = state
        .identities()
        .mainnet_for(&owner)
        .ok_or(GatewayError::NoIdentityMapping { account: owner })?;
    value.validate_for(token.kind)?;

    // Both ceilings of this token are checked before anything is debited
    let debit = if token.kind.is_fungible() {
        Some(
            state
                .rate_window()
                .try_debit(limits, &token.contract, &owner, value.amount, now)?,
        )
    } else {
        None
    };

    let key = BalanceKey::new(owner, &token, &value);
    let available = state.balance(&key);
    if available < value.amount {
        return Err(GatewayError::InsufficientBalance {
            available,
            requested: value.amount,
        });
    }

    let set = active_set(state)?;
    let receipt = WithdrawalReceipt::new(owner, recipient, token, value, nonce, set.version());

    let mut changes = vec![
        StateChange::BalanceSet {
            key,
            amount: available - value.amount,
        },
        StateChange::NonceSet { owner, nonce },
        StateChange::ReceiptSaved(receipt.clone()),
    ];
    if let Some(debit) = debit {
        changes.push(StateChange::RateLimitDebited(debit));
    }
    Ok((receipt, changes))
}

fn plan_signature(
    state: &LedgerData,
    gateway: &Address,
    owner: Address,
    validator: Address,
    signature: &[u8],
) -> Result<WithdrawalReceipt, GatewayError> {
    let receipt = state
        .receipt(&owner)
        .ok_or(GatewayError::ReceiptNotFound { owner })?;
    let set = state.validators().get(receipt.validator_set_version)?;
    receipt.with_share(set, &validator, signature, gateway)
}

fn plan_mint(
    state: &LedgerData,
    params: &GatewayParams,
    account: Address,
    token: TokenDescriptor,
    value: TokenValue,
) -> Result<(U256, Vec<StateChange>), GatewayError> {
    if !params.mintable_tokens.contains(&token.contract) {
        return Err(GatewayError::NotMintable {
            contract: token.contract,
        });
    }
    value.validate_for(token.kind)?;

    // A non-fungible id exists at most once across balances and receipts
    if token.kind == TokenKind::NonFungible {
        let in_flight = state
            .receipts()
            .any(|r| r.token.contract == token.contract && r.value.token_id == value.token_id);
        if in_flight || !state.supply_of(&token.contract, &value.token_id).is_zero() {
            return Err(GatewayError::InvalidTokenValue {
                reason: format!("token id {} already exists", value.token_id),
            });
        }
    }

    let key = BalanceKey::new(account, &token, &value);
    let balance = state
        .balance(&key)
        .checked_add(value.amount)
        .ok_or_else(overflow)?;
    Ok((
        balance,
        vec![StateChange::BalanceSet {
            key,
            amount: balance,
        }],
    ))
}

fn overflow() -> GatewayError {
    GatewayError::InvalidTokenValue {
        reason: "balance overflow".to_string(),
    }
}
