//! Signed requests
//!
//! Every call that changes the ledger on someone's behalf carries a 65-byte
//! signature over an EIP-191 prefixed request hash. The gateway recovers the
//! signer and checks it against the account the request acts for:
//!
//! | request              | signed by                             |
//! |----------------------|---------------------------------------|
//! | identity mapping     | the mainnet key and the sidechain key |
//! | deposit submission   | a validator of the active set         |
//! | hot-wallet notice    | the announcing sidechain account      |
//! | withdrawal           | the withdrawing sidechain account     |
//! | receipt clear        | a validator of the active set         |
//!
//! Request hashes are 32-byte words like the withdrawal payload, led by a
//! per-request tag word and ending with the mainnet gateway address, so a
//! signature never verifies for another request kind or another deployment.

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;

use crate::error::GatewayError;
use crate::hash::{address_to_bytes32, keccak256};
use crate::types::{DepositRecord, TokenDescriptor, TokenValue, TxHash};
use crate::validators::{recover_signer, sign_withdrawal, SIGNATURE_LEN};

const IDENTITY_TAG: &str = "transfer-gateway/identity";
const DEPOSIT_TAG: &str = "transfer-gateway/deposit";
const HOT_WALLET_TAG: &str = "transfer-gateway/hot-wallet";
const WITHDRAWAL_TAG: &str = "transfer-gateway/withdrawal";
const CLEAR_TAG: &str = "transfer-gateway/clear";

fn u64_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn u256_word(value: &U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

fn request_hash(tag: &str, words: &[[u8; 32]], gateway: &Address) -> B256 {
    let mut data = Vec::with_capacity(32 * (words.len() + 2));
    data.extend_from_slice(&keccak256(tag.as_bytes()));
    for word in words {
        data.extend_from_slice(word);
    }
    data.extend_from_slice(&address_to_bytes32(gateway));
    B256::from(keccak256(&data))
}

/// Both accounts sign this to link `mainnet` with `sidechain`
pub fn identity_request_hash(mainnet: &Address, sidechain: &Address, gateway: &Address) -> B256 {
    request_hash(
        IDENTITY_TAG,
        &[address_to_bytes32(mainnet), address_to_bytes32(sidechain)],
        gateway,
    )
}

/// A validator signs this to vouch for a deposit it observed
pub fn deposit_request_hash(deposit: &DepositRecord, gateway: &Address) -> B256 {
    let mut kind = [0u8; 32];
    kind[31] = deposit.token.kind.code();
    request_hash(
        DEPOSIT_TAG,
        &[
            deposit.tx_hash.0,
            address_to_bytes32(&deposit.token.contract),
            kind,
            u256_word(&deposit.value.token_id),
            u256_word(&deposit.value.amount),
            address_to_bytes32(&deposit.depositor),
            u64_word(deposit.block_number),
        ],
        gateway,
    )
}

pub fn hot_wallet_request_hash(owner: &Address, tx_hash: &TxHash, gateway: &Address) -> B256 {
    request_hash(
        HOT_WALLET_TAG,
        &[address_to_bytes32(owner), tx_hash.0],
        gateway,
    )
}

/// The owner signs this for the withdrawal that will receive `nonce`
pub fn withdrawal_request_hash(
    owner: &Address,
    token: &TokenDescriptor,
    value: &TokenValue,
    nonce: u64,
    gateway: &Address,
) -> B256 {
    let mut kind = [0u8; 32];
    kind[31] = token.kind.code();
    request_hash(
        WITHDRAWAL_TAG,
        &[
            address_to_bytes32(owner),
            address_to_bytes32(&token.contract),
            kind,
            u256_word(&value.token_id),
            u256_word(&value.amount),
            u64_word(nonce),
        ],
        gateway,
    )
}

pub fn clear_request_hash(owner: &Address, nonce: u64, gateway: &Address) -> B256 {
    request_hash(
        CLEAR_TAG,
        &[address_to_bytes32(owner), u64_word(nonce)],
        gateway,
    )
}

/// Sign a request hash
pub fn sign_request(
    signer: &PrivateKeySigner,
    request: &B256,
) -> Result<[u8; SIGNATURE_LEN], GatewayError> {
    sign_withdrawal(signer, request)
}

/// Recover the signer of `request` and require it to be `expected`
pub fn verify_request(
    request: &B256,
    signature: &[u8],
    expected: &Address,
) -> Result<(), GatewayError> {
    let recovered = recover_signer(request, signature)?;
    if recovered != *expected {
        return Err(GatewayError::SignerMismatch {
            expected: *expected,
            recovered,
        });
    }
    Ok(())
}
