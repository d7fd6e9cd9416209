//! Deterministic validator keys
//!
//! Key `i` (1-based) is the secp256k1 scalar `i`, so every test process and
//! every oracle in a test derives the same addresses.

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;

use crate::error::GatewayError;
use crate::validators::ValidatorSet;

/// Signing keys for scalars `1..=n`
pub fn test_validator_keys(n: usize) -> Vec<PrivateKeySigner> {
    (1..=n as u64)
        .filter_map(|i| PrivateKeySigner::from_bytes(&B256::from(U256::from(i))).ok())
        .collect()
}

pub fn addresses(keys: &[PrivateKeySigner]) -> Vec<Address> {
    keys.iter().map(|k| k.address()).collect()
}

/// Version-1 set made of the first `n` test keys
pub fn test_validator_set(n: usize) -> Result<(ValidatorSet, Vec<PrivateKeySigner>), GatewayError> {
    let keys = test_validator_keys(n);
    let set = ValidatorSet::new(1, addresses(&keys))?;
    Ok((set, keys))
}
