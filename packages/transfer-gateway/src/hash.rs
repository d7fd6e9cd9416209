//! Canonical withdrawal payload hashing
//!
//! Every validator must sign byte-identical payloads for the same receipt, so
//! the payload is a fixed layout of 32-byte big-endian words:
//!
//! ```text
//! keccak256(recipient || token || kind || tokenId || amount || nonce || gateway)
//! ```
//!
//! Addresses are left-padded to 32 bytes, matching `abi.encode`.

use alloy::primitives::{Address, B256};
use tiny_keccak::{Hasher, Keccak};

use crate::types::{TokenDescriptor, TokenValue};

const PAYLOAD_WORDS: usize = 7;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Left-pad an address into a 32-byte word
pub fn address_to_bytes32(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..32].copy_from_slice(address.as_slice());
    word
}

/// Compute the canonical hash validators sign for a withdrawal.
///
/// `gateway` is the mainnet gateway address that will verify the signatures,
/// binding a signature to one deployment.
pub fn compute_withdrawal_hash(
    recipient: &Address,
    token: &TokenDescriptor,
    value: &TokenValue,
    nonce: u64,
    gateway: &Address,
) -> B256 {
    let mut data = [0u8; 32 * PAYLOAD_WORDS];

    // recipient (mainnet address)
    data[0..32].copy_from_slice(&address_to_bytes32(recipient));

    // token contract
    data[32..64].copy_from_slice(&address_to_bytes32(&token.contract));

    // token kind (uint8 as 32 bytes)
    data[95] = token.kind.code();

    // token id
    data[96..128].copy_from_slice(&value.token_id.to_be_bytes::<32>());

    // amount
    data[128..160].copy_from_slice(&value.amount.to_be_bytes::<32>());

    // nonce (uint64 right-aligned)
    data[184..192].copy_from_slice(&nonce.to_be_bytes());

    // mainnet gateway
    data[192..224].copy_from_slice(&address_to_bytes32(gateway));

    B256::from(keccak256(&data))
}
