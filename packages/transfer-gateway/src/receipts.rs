//! Withdrawal receipts
//!
//! Each sidechain account has at most one outstanding receipt. A receipt is
//! created `Pending`, collects signature shares from validators of the set
//! version recorded on it, and becomes `Signed` once the shares reach quorum.
//! Clearing removes it.

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::GatewayError;
use crate::hash::compute_withdrawal_hash;
use crate::types::{TokenDescriptor, TokenValue};
use crate::validators::{recover_signer, ValidatorSet, SIGNATURE_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptState {
    Pending,
    Signed,
}

impl ReceiptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptState::Pending => "pending",
            ReceiptState::Signed => "signed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReceiptState::Pending),
            "signed" => Some(ReceiptState::Signed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    /// Sidechain account that requested the withdrawal
    pub owner: Address,
    /// Mainnet account that receives the release
    pub recipient: Address,
    pub token: TokenDescriptor,
    pub value: TokenValue,
    pub nonce: u64,
    pub validator_set_version: u64,
    /// Signature shares keyed by validator
    pub signatures: BTreeMap<Address, Bytes>,
    pub state: ReceiptState,
}

impl WithdrawalReceipt {
    pub fn new(
        owner: Address,
        recipient: Address,
        token: TokenDescriptor,
        value: TokenValue,
        nonce: u64,
        validator_set_version: u64,
    ) -> Self {
        Self {
            owner,
            recipient,
            token,
            value,
            nonce,
            validator_set_version,
            signatures: BTreeMap::new(),
            state: ReceiptState::Pending,
        }
    }

    /// The hash validators sign for this receipt
    pub fn payload_hash(&self, gateway: &Address) -> B256 {
        compute_withdrawal_hash(&self.recipient, &self.token, &self.value, self.nonce, gateway)
    }

    pub fn has_signed(&self, validator: &Address) -> bool {
        self.signatures.contains_key(validator)
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Return a copy of this receipt with one more signature share.
    ///
    /// `set` must be the version recorded on the receipt. The share must come
    /// from a member that has not signed yet and must recover to that member
    /// over the canonical payload.
    pub fn with_share(
        &self,
        set: &ValidatorSet,
        validator: &Address,
        signature: &[u8],
        gateway: &Address,
    ) -> Result<WithdrawalReceipt, GatewayError> {
        set.ensure_member(validator)?;
        if self.has_signed(validator) {
            return Err(GatewayError::DuplicateSigner {
                validator: *validator,
            });
        }

        let recovered = recover_signer(&self.payload_hash(gateway), signature)?;
        if recovered != *validator {
            return Err(GatewayError::InvalidSignature {
                reason: format!(
                    "signature recovers to {}, not validator {}",
                    recovered, validator
                ),
            });
        }

        let mut receipt = self.clone();
        receipt
            .signatures
            .insert(*validator, Bytes::copy_from_slice(signature));
        if receipt.signatures.len() >= set.quorum() {
            receipt.state = ReceiptState::Signed;
        }
        Ok(receipt)
    }

    /// Concatenate the shares in validator-set order.
    ///
    /// The result is always a multiple of [`SIGNATURE_LEN`] bytes.
    pub fn aggregated_signature(&self, set: &ValidatorSet) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.signatures.len() * SIGNATURE_LEN);
        for validator in set.validators() {
            if let Some(sig) = self.signatures.get(validator) {
                out.extend_from_slice(sig);
            }
        }
        out
    }
}
