//! Typed error surface of the gateway pair
//!
//! Every error falls into one of three kinds (see [`ErrorKind`]); callers
//! decide what to do by switching on the kind or the variant, never on the
//! message text.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TxHash;

/// How a caller should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The effect conflicts with one already applied. Oracles treat the
    /// benign variants as success.
    Replay,
    /// Rejected by ledger rules; surfaced to the caller, never retried by the ledger
    Policy,
    /// Temporary unavailability; retry later with backoff
    Transient,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum GatewayError {
    // ========================================================================
    // Replay / Idempotency Errors
    // ========================================================================
    #[error("Deposit {tx_hash} was already processed with different contents")]
    AlreadyProcessed { tx_hash: TxHash },

    #[error("Deposit {tx_hash} is pending: already registered but not yet credited")]
    DepositPending { tx_hash: TxHash },

    #[error("Validator {validator} already signed this receipt")]
    DuplicateSigner { validator: Address },

    #[error("Nonce {nonce} for {owner} was already released")]
    NonceReplayed { owner: Address, nonce: u64 },

    #[error("Account {account} already has an identity mapping")]
    IdentityAlreadyMapped { account: Address },

    // ========================================================================
    // Withdrawal Policy Errors
    // ========================================================================
    #[error("A withdrawal receipt for {owner} is still outstanding")]
    ReceiptBusy { owner: Address },

    #[error("No withdrawal receipt for {owner}")]
    ReceiptNotFound { owner: Address },

    #[error("Daily withdrawal total exceeded: limit {limit}, used {used}, requested {requested}")]
    DailyTotalExceeded {
        limit: U256,
        used: U256,
        requested: U256,
    },

    #[error("Daily withdrawal limit for account exceeded: limit {limit}, used {used}, requested {requested}")]
    DailyAccountExceeded {
        limit: U256,
        used: U256,
        requested: U256,
    },

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: U256, requested: U256 },

    #[error("Insufficient escrow: held {held}, requested {requested}")]
    InsufficientEscrow { held: U256, requested: U256 },

    #[error("No identity mapping for {account}")]
    NoIdentityMapping { account: Address },

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid token value: {reason}")]
    InvalidTokenValue { reason: String },

    #[error("Withdrawal request nonce {nonce} for {owner} does not match the next nonce {expected}")]
    UnexpectedNonce {
        owner: Address,
        expected: u64,
        nonce: u64,
    },

    #[error("Token {contract} is not mintable")]
    NotMintable { contract: Address },

    // ========================================================================
    // Deposit Policy Errors
    // ========================================================================
    #[error("Deposit {tx_hash} does not match the transfer observed on mainnet")]
    DepositMismatch { tx_hash: TxHash },

    #[error("{owner} already has {limit} hot-wallet announcements pending")]
    HotWalletLimitReached { owner: Address, limit: usize },

    // ========================================================================
    // Validator / Signature Errors
    // ========================================================================
    #[error("{validator} is not a validator in set version {version}")]
    UnknownValidator { validator: Address, version: u64 },

    #[error("Validator set version {version} is not registered or no longer accepted")]
    UnknownValidatorSet { version: u64 },

    #[error("Signature {index} was not produced by a validator in the set")]
    UnknownSigner { index: usize },

    #[error("Quorum not met: {signatures} valid signatures, {required} required")]
    QuorumNotMet { signatures: usize, required: usize },

    #[error("Malformed signature blob: length {length} is not a non-zero multiple of {slice}")]
    MalformedSignatureBlob { length: usize, slice: usize },

    #[error("Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    #[error("Request must be signed by {expected}, recovered {recovered}")]
    SignerMismatch { expected: Address, recovered: Address },

    #[error("Validator set cannot be empty")]
    EmptyValidatorSet,

    // ========================================================================
    // Transient Errors
    // ========================================================================
    #[error("Insufficient confirmations for {tx_hash}: {confirmations} of {required}")]
    InsufficientConfirmations {
        tx_hash: TxHash,
        confirmations: u64,
        required: u64,
    },

    #[error("Chain unavailable: {reason}")]
    ChainUnavailable { reason: String },

    #[error("Storage error: {reason}")]
    Storage { reason: String },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::AlreadyProcessed { .. }
            | GatewayError::DepositPending { .. }
            | GatewayError::DuplicateSigner { .. }
            | GatewayError::NonceReplayed { .. }
            | GatewayError::IdentityAlreadyMapped { .. } => ErrorKind::Replay,

            GatewayError::InsufficientConfirmations { .. }
            | GatewayError::ChainUnavailable { .. }
            | GatewayError::Storage { .. } => ErrorKind::Transient,

            _ => ErrorKind::Policy,
        }
    }

    /// Stable machine-readable code, used on the HTTP surface
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::AlreadyProcessed { .. } => "AlreadyProcessed",
            GatewayError::DepositPending { .. } => "DepositPending",
            GatewayError::DuplicateSigner { .. } => "DuplicateSigner",
            GatewayError::NonceReplayed { .. } => "NonceReplayed",
            GatewayError::IdentityAlreadyMapped { .. } => "IdentityAlreadyMapped",
            GatewayError::ReceiptBusy { .. } => "ReceiptBusy",
            GatewayError::ReceiptNotFound { .. } => "ReceiptNotFound",
            GatewayError::DailyTotalExceeded { .. } => "DailyTotalExceeded",
            GatewayError::DailyAccountExceeded { .. } => "DailyAccountExceeded",
            GatewayError::InsufficientBalance { .. } => "InsufficientBalance",
            GatewayError::InsufficientEscrow { .. } => "InsufficientEscrow",
            GatewayError::NoIdentityMapping { .. } => "NoIdentityMapping",
            GatewayError::InvalidAmount => "InvalidAmount",
            GatewayError::InvalidTokenValue { .. } => "InvalidTokenValue",
            GatewayError::UnexpectedNonce { .. } => "UnexpectedNonce",
            GatewayError::NotMintable { .. } => "NotMintable",
            GatewayError::DepositMismatch { .. } => "DepositMismatch",
            GatewayError::HotWalletLimitReached { .. } => "HotWalletLimitReached",
            GatewayError::UnknownValidator { .. } => "UnknownValidator",
            GatewayError::UnknownValidatorSet { .. } => "UnknownValidatorSet",
            GatewayError::UnknownSigner { .. } => "UnknownSigner",
            GatewayError::QuorumNotMet { .. } => "QuorumNotMet",
            GatewayError::MalformedSignatureBlob { .. } => "MalformedSignatureBlob",
            GatewayError::InvalidSignature { .. } => "InvalidSignature",
            GatewayError::SignerMismatch { .. } => "SignerMismatch",
            GatewayError::EmptyValidatorSet => "EmptyValidatorSet",
            GatewayError::InsufficientConfirmations { .. } => "InsufficientConfirmations",
            GatewayError::ChainUnavailable { .. } => "ChainUnavailable",
            GatewayError::Storage { .. } => "Storage",
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        GatewayError::Storage {
            reason: e.to_string(),
        }
    }
}
