//! Prometheus metrics for the sidechain gateway
//!
//! Exposed on the node's `/metrics` endpoint.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_int_gauge, CounterVec, Gauge, IntGauge,
};

use crate::error::GatewayError;

lazy_static! {
    pub static ref DEPOSITS: CounterVec = register_counter_vec!(
        "gateway_deposits_total",
        "Deposit submissions by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref WITHDRAWALS: CounterVec = register_counter_vec!(
        "gateway_withdrawal_requests_total",
        "Withdrawal requests by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref SIGNATURE_SHARES: CounterVec = register_counter_vec!(
        "gateway_signature_shares_total",
        "Signature shares by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref RECEIPTS_CLEARED: CounterVec = register_counter_vec!(
        "gateway_receipts_cleared_total",
        "Receipt clear submissions by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref OUTSTANDING_RECEIPTS: IntGauge = register_int_gauge!(
        "gateway_outstanding_receipts",
        "Withdrawal receipts currently pending or signed"
    ).unwrap();

    pub static ref ACTIVE_VALIDATOR_SET: IntGauge = register_int_gauge!(
        "gateway_active_validator_set_version",
        "Version of the validator set new receipts are bound to"
    ).unwrap();

    pub static ref STORE_FAILURES: CounterVec = register_counter_vec!(
        "gateway_store_failures_total",
        "Ledger commits that failed",
        &["operation"]
    ).unwrap();

    pub static ref UP: Gauge = register_gauge!(
        "gateway_up",
        "Whether the gateway node is up (1) or not (0)"
    ).unwrap();
}

/// Count one operation result, labelled `ok` or by error code
pub fn observe<T>(counter: &CounterVec, result: &Result<T, GatewayError>) {
    let label = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    counter.with_label_values(&[label]).inc();
}
