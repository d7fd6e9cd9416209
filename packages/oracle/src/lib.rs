//! Transfer Oracle - Library interface
//!
//! One oracle runs per validator. It watches mainnet through a
//! [`ChainEventSource`](transfer_gateway::ChainEventSource) and submits what
//! it sees to the sidechain gateway through a [`SidechainClient`]:
//!
//! - **deposit scan** - credits confirmed mainnet deposits and resolves
//!   announced hot-wallet transfers
//! - **signature scan** - signs outstanding withdrawal receipts
//! - **clear scan** - clears receipts whose release executed on mainnet
//!
//! Oracles never talk to each other. Every submission is idempotent on the
//! gateway side, so several oracles racing on the same observation converge.
//! Each task exposes a single `step()` so tests can drive it without timers.

pub mod bounded_cache;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod runner;
pub mod server;
pub mod tasks;

pub use client::{HttpSidechainClient, LocalSidechain, SidechainClient};
pub use error::OracleError;
pub use runner::TaskRunner;
pub use tasks::{ClearScanner, DepositScanner, OracleContext, OracleTask, SignatureScanner, StepReport};
