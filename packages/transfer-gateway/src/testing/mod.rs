//! Testing Utilities Module
//!
//! Helpers for unit and integration tests: an in-memory mainnet that doubles
//! as a [`ChainEventSource`](crate::source::ChainEventSource), and
//! deterministic validator and user keys.
//!
//! ## Submodules
//!
//! - `mock_mainnet` - Shared handle to a [`MainnetGateway`](crate::mainnet::MainnetGateway) with failure injection
//! - `keys` - Deterministic validator signing keys
//! - `accounts` - Test users that sign their own gateway requests

pub mod accounts;
pub mod keys;
pub mod mock_mainnet;

pub use accounts::*;
pub use keys::*;
pub use mock_mainnet::*;
