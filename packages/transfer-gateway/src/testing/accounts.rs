//! Deterministic user accounts
//!
//! A [`TestUser`] holds a mainnet key and a sidechain key and signs its own
//! gateway requests. Validator-side requests are signed with
//! [`submit_deposit_as`] and [`clear_receipt_as`].

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;

use crate::auth::{
    clear_request_hash, deposit_request_hash, hot_wallet_request_hash, identity_request_hash,
    sign_request, withdrawal_request_hash,
};
use crate::error::GatewayError;
use crate::receipts::WithdrawalReceipt;
use crate::registry::HotWalletEntry;
use crate::sidechain::{ClearOutcome, DepositOutcome, SidechainGateway};
use crate::types::{BalanceKey, DepositRecord, TokenDescriptor, TokenValue};

/// User key scalars start here, clear of the validator scalars `1..=n`
const USER_KEY_BASE: u64 = 0x1_0000;

fn key_for(scalar: u64) -> Result<PrivateKeySigner, GatewayError> {
    PrivateKeySigner::from_bytes(&B256::from(U256::from(scalar))).map_err(|e| {
        GatewayError::InvalidSignature {
            reason: e.to_string(),
        }
    })
}

pub struct TestUser {
    pub mainnet: PrivateKeySigner,
    pub sidechain: PrivateKeySigner,
}

impl TestUser {
    /// Keys derived from `seed`; equal seeds give equal users
    pub fn new(seed: u8) -> Result<Self, GatewayError> {
        let base = USER_KEY_BASE + 2 * u64::from(seed);
        Ok(Self {
            mainnet: key_for(base)?,
            sidechain: key_for(base + 1)?,
        })
    }

    pub fn mainnet_address(&self) -> Address {
        self.mainnet.address()
    }

    pub fn sidechain_address(&self) -> Address {
        self.sidechain.address()
    }

    /// Both signatures for linking this user's accounts
    pub fn identity_signatures(
        &self,
        gateway: &Address,
    ) -> Result<([u8; 65], [u8; 65]), GatewayError> {
        let request =
            identity_request_hash(&self.mainnet_address(), &self.sidechain_address(), gateway);
        Ok((
            sign_request(&self.mainnet, &request)?,
            sign_request(&self.sidechain, &request)?,
        ))
    }

    pub async fn map_identity(
        &self,
        gateway: &SidechainGateway,
    ) -> Result<Vec<BalanceKey>, GatewayError> {
        let (mainnet_sig, sidechain_sig) =
            self.identity_signatures(&gateway.params().mainnet_gateway)?;
        gateway
            .map_identity(
                self.mainnet_address(),
                self.sidechain_address(),
                &mainnet_sig,
                &sidechain_sig,
            )
            .await
    }

    /// Signature for a withdrawal that will receive `nonce`
    pub fn withdrawal_signature(
        &self,
        gateway: &Address,
        token: &TokenDescriptor,
        value: &TokenValue,
        nonce: u64,
    ) -> Result<[u8; 65], GatewayError> {
        let request =
            withdrawal_request_hash(&self.sidechain_address(), token, value, nonce, gateway);
        sign_request(&self.sidechain, &request)
    }

    /// Withdraw with the next nonce the gateway expects
    pub async fn request_withdrawal(
        &self,
        gateway: &SidechainGateway,
        token: TokenDescriptor,
        value: TokenValue,
        now: u64,
    ) -> Result<WithdrawalReceipt, GatewayError> {
        let owner = self.sidechain_address();
        let nonce = gateway.next_withdrawal_nonce(&owner).await;
        let signature =
            self.withdrawal_signature(&gateway.params().mainnet_gateway, &token, &value, nonce)?;
        gateway
            .request_withdrawal(owner, token, value, nonce, &signature, now)
            .await
    }

    pub async fn announce_hot_wallet(
        &self,
        gateway: &SidechainGateway,
        tx_hash: B256,
    ) -> Result<HotWalletEntry, GatewayError> {
        let owner = self.sidechain_address();
        let request = hot_wallet_request_hash(&owner, &tx_hash, &gateway.params().mainnet_gateway);
        let signature = sign_request(&self.sidechain, &request)?;
        gateway
            .submit_hot_wallet_deposit(owner, tx_hash, &signature)
            .await
    }
}

/// Submit a deposit signed by `validator`
pub async fn submit_deposit_as(
    gateway: &SidechainGateway,
    validator: &PrivateKeySigner,
    deposit: DepositRecord,
) -> Result<DepositOutcome, GatewayError> {
    let request = deposit_request_hash(&deposit, &gateway.params().mainnet_gateway);
    let signature = sign_request(validator, &request)?;
    gateway.submit_deposit(deposit, &signature).await
}

/// Clear `owner`'s receipt with a request signed by `validator`
pub async fn clear_receipt_as(
    gateway: &SidechainGateway,
    validator: &PrivateKeySigner,
    owner: Address,
    nonce: u64,
) -> Result<ClearOutcome, GatewayError> {
    let request = clear_request_hash(&owner, nonce, &gateway.params().mainnet_gateway);
    let signature = sign_request(validator, &request)?;
    gateway.clear_receipt(owner, nonce, &signature).await
}
