//! Mock Mainnet
//!
//! A cloneable handle to one [`MainnetGateway`]. Tests drive the chain
//! (deposits, mining, releases) through it while the sidechain gateway and
//! the oracles read it as their [`ChainEventSource`].

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::GatewayError;
use crate::mainnet::MainnetGateway;
use crate::sidechain::WithdrawalAuthorization;
use crate::source::{ChainEventSource, MainnetEvent, WithdrawalCompleted};
use crate::types::{DepositRecord, TokenDescriptor, TokenValue, TxHash};
use crate::validators::ValidatorSet;

#[derive(Clone)]
pub struct MockMainnet {
    inner: Arc<Mutex<MainnetGateway>>,
    fail_next: Arc<AtomicU32>,
}

impl MockMainnet {
    pub fn new(address: Address, validators: ValidatorSet) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MainnetGateway::new(address, validators))),
            fail_next: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Make the next `n` chain queries fail with `ChainUnavailable`
    pub fn fail_next_queries(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(GatewayError::ChainUnavailable {
                reason: "injected RPC failure".to_string(),
            });
        }
        Ok(())
    }

    pub async fn address(&self) -> Address {
        self.inner.lock().await.address()
    }

    pub async fn head(&self) -> u64 {
        self.inner.lock().await.head()
    }

    pub async fn mine(&self, blocks: u64) {
        self.inner.lock().await.mine(blocks);
    }

    pub async fn deposit(
        &self,
        depositor: Address,
        token: TokenDescriptor,
        value: TokenValue,
    ) -> Result<DepositRecord, GatewayError> {
        self.inner.lock().await.deposit(depositor, token, value)
    }

    pub async fn direct_transfer(
        &self,
        from: Address,
        token: TokenDescriptor,
        value: TokenValue,
    ) -> Result<DepositRecord, GatewayError> {
        self.inner.lock().await.direct_transfer(from, token, value)
    }

    pub async fn release(
        &self,
        recipient: Address,
        token: TokenDescriptor,
        value: TokenValue,
        nonce: u64,
        signatures: &[u8],
        validator_set_version: u64,
    ) -> Result<WithdrawalCompleted, GatewayError> {
        self.inner.lock().await.release(
            recipient,
            token,
            value,
            nonce,
            signatures,
            validator_set_version,
        )
    }

    /// Present a sidechain withdrawal authorization to the gateway
    pub async fn release_authorized(
        &self,
        auth: &WithdrawalAuthorization,
    ) -> Result<WithdrawalCompleted, GatewayError> {
        let receipt = &auth.receipt;
        self.release(
            receipt.recipient,
            receipt.token,
            receipt.value,
            receipt.nonce,
            &auth.signatures,
            receipt.validator_set_version,
        )
        .await
    }

    pub async fn add_validator_set(&self, set: ValidatorSet) {
        self.inner.lock().await.add_validator_set(set);
    }

    pub async fn retire_validator_sets_below(&self, version: u64) {
        self.inner.lock().await.retire_validator_sets_below(version);
    }

    pub async fn escrow_of(&self, token: &TokenDescriptor, token_id: U256) -> U256 {
        self.inner.lock().await.escrow_of(token, token_id)
    }

    pub async fn register_mintable(&self, contract: Address) {
        self.inner.lock().await.register_mintable(contract);
    }

    pub async fn minted_of(&self, token: &TokenDescriptor, token_id: U256) -> U256 {
        self.inner.lock().await.minted_of(token, token_id)
    }

    pub async fn is_consumed(&self, recipient: &Address, nonce: u64) -> bool {
        self.inner.lock().await.is_consumed(recipient, nonce)
    }
}

#[async_trait]
impl ChainEventSource for MockMainnet {
    async fn head_height(&self) -> Result<u64, GatewayError> {
        self.check_available()?;
        Ok(self.inner.lock().await.head())
    }

    async fn confirmations_for(&self, tx_hash: &TxHash) -> Result<u64, GatewayError> {
        self.check_available()?;
        Ok(self.inner.lock().await.confirmations_for(tx_hash))
    }

    async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<MainnetEvent>, GatewayError> {
        self.check_available()?;
        Ok(self.inner.lock().await.events_in_range(from, to))
    }

    async fn transfer_for(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<DepositRecord>, GatewayError> {
        self.check_available()?;
        Ok(self.inner.lock().await.transfer_for(tx_hash))
    }
}
