//! Transfer Gateway: mainnet/sidechain value bridge
//!
//! Users escrow value on mainnet and receive a mirrored credit on the
//! sidechain; withdrawals burn the credit and release the escrow against an
//! aggregated validator signature. This crate holds both halves of the
//! gateway pair plus the pieces the oracle shares with them:
//!
//! - **Deposit Registry** - idempotency ledger of credited mainnet transactions
//! - **Withdrawal Receipts** - one outstanding receipt per sidechain account
//! - **Rate Limiter** - aggregate and per-account ceilings per token and window
//! - **Signed Requests** - who may map, deposit, withdraw and clear
//! - **Validator Sets** - versioned signer sets and the 2/3 quorum rule
//! - **Sidechain Gateway** - the ledger service oracles and users call
//! - **Mainnet Gateway** - escrow and threshold-verified release
//! - **Chain Event Source** - the only view of mainnet the rest of the system gets
//! - **Stores** - in-memory and PostgreSQL persistence for the sidechain ledger
//!
//! ## Feature Flags
//!
//! - `evm` - alloy-based JSON-RPC event source (default)
//! - `testing` - mock mainnet, deterministic validator keys and test users for tests
//! - `full` - Enable all features

// Core modules (always available)
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod mainnet;
pub mod metrics;
pub mod rate_limit;
pub mod receipts;
pub mod registry;
pub mod sidechain;
pub mod source;
pub mod store;
pub mod types;
pub mod validators;

#[cfg(feature = "evm")]
pub mod evm;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items at the crate root
pub use auth::{
    clear_request_hash, deposit_request_hash, hot_wallet_request_hash, identity_request_hash,
    sign_request, verify_request, withdrawal_request_hash,
};
pub use error::{ErrorKind, GatewayError};
pub use hash::{compute_withdrawal_hash, keccak256};
pub use ledger::{LedgerData, StateChange};
pub use mainnet::MainnetGateway;
pub use rate_limit::{RateLimitConfig, RateLimitDebit, RateLimitWindow, TokenLimits};
pub use receipts::{ReceiptState, WithdrawalReceipt};
pub use registry::{DepositRegistry, HotWalletEntry, RegistryCheck};
pub use sidechain::{
    ClearOutcome, DepositOutcome, GatewayParams, SidechainGateway, WithdrawalAuthorization,
};
pub use source::{ChainEventSource, MainnetEvent, WithdrawalCompleted};
pub use store::{LedgerStore, MemoryStore, PgStore};
pub use types::{
    BalanceKey, DepositRecord, IdentityMapping, TokenDescriptor, TokenKind, TokenValue, TxHash,
};
pub use validators::{
    quorum_for, recover_signer, sign_withdrawal, split_signature_blob, ValidatorRegistry,
    ValidatorSet, SIGNATURE_LEN,
};
