//! Mainnet gateway model
//!
//! Holds escrowed deposits and releases them against an aggregated validator
//! signature. Release verification:
//!
//! 1. the blob is a non-zero multiple of 65 bytes
//! 2. the named validator set version is registered and still accepted
//! 3. every slice recovers to a distinct member of that set
//! 4. the signer count reaches ceil(2n/3)
//! 5. the (recipient, nonce) pair has not been released before
//! 6. the escrow holds the value, or the token is mintable and the shortfall
//!    is minted
//!
//! Each accepted deposit or release is appended to an event log with the
//! block height it was included in; oracles read that log through
//! [`ChainEventSource`](crate::source::ChainEventSource).

use alloy::primitives::{Address, U256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::hash::{compute_withdrawal_hash, keccak256};
use crate::source::{confirmations_at, MainnetEvent, WithdrawalCompleted};
use crate::types::{DepositRecord, TokenDescriptor, TokenValue, TxHash};
use crate::validators::{split_signature_blob, ValidatorRegistry, ValidatorSet};

pub struct MainnetGateway {
    address: Address,
    validators: ValidatorRegistry,
    /// (token contract, token id) -> escrowed amount
    escrow: HashMap<(Address, U256), U256>,
    /// Tokens the gateway may mint; value that originated on the sidechain
    /// is minted on release rather than taken from escrow
    mintable: HashSet<Address>,
    /// (token contract, token id) -> amount minted on release
    minted: HashMap<(Address, U256), U256>,
    /// Released (recipient, nonce) pairs
    consumed: HashSet<(Address, u64)>,
    events: Vec<MainnetEvent>,
    /// Every inbound transfer by tx hash, including hot-wallet transfers
    transfers: HashMap<TxHash, DepositRecord>,
    /// Block height of every transaction this gateway executed
    tx_blocks: HashMap<TxHash, u64>,
    head: u64,
    tx_counter: u64,
}

impl MainnetGateway {
    pub fn new(address: Address, validators: ValidatorSet) -> Self {
        Self {
            address,
            validators: ValidatorRegistry::new(validators),
            escrow: HashMap::new(),
            mintable: HashSet::new(),
            minted: HashMap::new(),
            consumed: HashSet::new(),
            events: Vec::new(),
            transfers: HashMap::new(),
            tx_blocks: HashMap::new(),
            head: 0,
            tx_counter: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    /// Advance the chain by `blocks` empty blocks
    pub fn mine(&mut self, blocks: u64) {
        self.head += blocks;
    }

    /// Lock value in escrow and emit a deposit event. Included in a new block.
    pub fn deposit(
        &mut self,
        depositor: Address,
        token: TokenDescriptor,
        value: TokenValue,
    ) -> Result<DepositRecord, GatewayError> {
        let record = self.accept_transfer(depositor, token, value)?;
        self.events.push(MainnetEvent::Deposit(record.clone()));
        info!(
            tx_hash = %record.tx_hash,
            depositor = %depositor,
            token = %token.contract,
            kind = %token.kind,
            amount = %value.amount,
            block = record.block_number,
            "Mainnet deposit escrowed"
        );
        Ok(record)
    }

    /// Send value straight to the gateway (hot-wallet path): escrowed, but no
    /// deposit event is emitted, so the owner must announce the hash
    pub fn direct_transfer(
        &mut self,
        from: Address,
        token: TokenDescriptor,
        value: TokenValue,
    ) -> Result<DepositRecord, GatewayError> {
        let record = self.accept_transfer(from, token, value)?;
        debug!(tx_hash = %record.tx_hash, from = %from, "Direct transfer to gateway");
        Ok(record)
    }

    fn accept_transfer(
        &mut self,
        from: Address,
        token: TokenDescriptor,
        value: TokenValue,
    ) -> Result<DepositRecord, GatewayError> {
        value.validate_for(token.kind)?;
        let tx_hash = self.next_tx();
        let entry = self
            .escrow
            .entry((token.contract, value.token_id))
            .or_insert(U256::ZERO);
        *entry = entry.saturating_add(value.amount);

        let record = DepositRecord {
            tx_hash,
            token,
            value,
            depositor: from,
            block_number: self.head,
        };
        self.transfers.insert(tx_hash, record.clone());
        Ok(record)
    }

    /// Release escrowed value against an aggregated validator signature
    pub fn release(
        &mut self,
        recipient: Address,
        token: TokenDescriptor,
        value: TokenValue,
        nonce: u64,
        signatures: &[u8],
        validator_set_version: u64,
    ) -> Result<WithdrawalCompleted, GatewayError> {
        split_signature_blob(signatures)?;
        let set = self.validators.get(validator_set_version)?;
        let payload = compute_withdrawal_hash(&recipient, &token, &value, nonce, &self.address);
        let signers = set.verify_aggregate(&payload, signatures)?;

        if self.consumed.contains(&(recipient, nonce)) {
            return Err(GatewayError::NonceReplayed {
                owner: recipient,
                nonce,
            });
        }

        let key = (token.contract, value.token_id);
        let held = self.escrow.get(&key).copied().unwrap_or(U256::ZERO);
        let from_escrow = held.min(value.amount);
        let shortfall = value.amount - from_escrow;
        if !shortfall.is_zero() && !self.mintable.contains(&token.contract) {
            return Err(GatewayError::InsufficientEscrow {
                held,
                requested: value.amount,
            });
        }

        let remaining = held - from_escrow;
        if remaining.is_zero() {
            self.escrow.remove(&key);
        } else {
            self.escrow.insert(key, remaining);
        }
        if !shortfall.is_zero() {
            let minted = self.minted.entry(key).or_insert(U256::ZERO);
            *minted = minted.saturating_add(shortfall);
            debug!(
                token = %token.contract,
                token_id = %value.token_id,
                minted = %shortfall,
                "Minted release shortfall"
            );
        }
        self.consumed.insert((recipient, nonce));

        let tx_hash = self.next_tx();
        let completed = WithdrawalCompleted {
            tx_hash,
            recipient,
            token,
            value,
            nonce,
            block_number: self.head,
        };
        self.events
            .push(MainnetEvent::WithdrawalCompleted(completed.clone()));
        info!(
            tx_hash = %tx_hash,
            recipient = %recipient,
            nonce = nonce,
            signers = signers.len(),
            validator_set_version = validator_set_version,
            "Mainnet release executed"
        );
        Ok(completed)
    }

    /// Register a new validator set version on mainnet
    pub fn add_validator_set(&mut self, set: ValidatorSet) {
        self.validators.insert(set);
    }

    /// Stop accepting signatures from set versions below `version`
    pub fn retire_validator_sets_below(&mut self, version: u64) {
        self.validators.retire_below(version);
    }

    /// Allow releases of `contract` to mint what the escrow lacks
    pub fn register_mintable(&mut self, contract: Address) {
        self.mintable.insert(contract);
    }

    pub fn is_mintable(&self, contract: &Address) -> bool {
        self.mintable.contains(contract)
    }

    pub fn minted_of(&self, token: &TokenDescriptor, token_id: U256) -> U256 {
        self.minted
            .get(&(token.contract, token_id))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn is_consumed(&self, recipient: &Address, nonce: u64) -> bool {
        self.consumed.contains(&(*recipient, nonce))
    }

    pub fn escrow_of(&self, token: &TokenDescriptor, token_id: U256) -> U256 {
        self.escrow
            .get(&(token.contract, token_id))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn confirmations_for(&self, tx_hash: &TxHash) -> u64 {
        self.tx_blocks
            .get(tx_hash)
            .map(|block| confirmations_at(self.head, *block))
            .unwrap_or(0)
    }

    pub fn events_in_range(&self, from: u64, to: u64) -> Vec<MainnetEvent> {
        self.events
            .iter()
            .filter(|e| e.block_number() >= from && e.block_number() <= to)
            .cloned()
            .collect()
    }

    pub fn transfer_for(&self, tx_hash: &TxHash) -> Option<DepositRecord> {
        self.transfers.get(tx_hash).cloned()
    }

    /// Every transaction is mined in its own new block
    fn next_tx(&mut self) -> TxHash {
        self.head += 1;
        self.tx_counter += 1;
        let mut seed = [0u8; 28];
        seed[..20].copy_from_slice(self.address.as_slice());
        seed[20..].copy_from_slice(&self.tx_counter.to_be_bytes());
        let tx_hash = TxHash::from(keccak256(&seed));
        self.tx_blocks.insert(tx_hash, self.head);
        tx_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::{sign_withdrawal, SIGNATURE_LEN};
    use alloy::primitives::B256;
    use alloy::signers::local::PrivateKeySigner;

    struct Fixture {
        gateway: MainnetGateway,
        keys: Vec<PrivateKeySigner>,
        alice: Address,
        token: TokenDescriptor,
    }

    fn fixture(n: u8) -> Fixture {
        let keys: Vec<_> = (1..=n)
            .map(|i| PrivateKeySigner::from_bytes(&B256::with_last_byte(i)).unwrap())
            .collect();
        let set = ValidatorSet::new(1, keys.iter().map(|k| k.address()).collect()).unwrap();
        let mut gateway = MainnetGateway::new(Address::repeat_byte(0x99), set);
        let alice = Address::repeat_byte(0xa1);
        let token = TokenDescriptor::fungible(Address::repeat_byte(0x70));
        gateway
            .deposit(alice, token, TokenValue::amount(U256::from(1_000u64)))
            .unwrap();
        Fixture {
            gateway,
            keys,
            alice,
            token,
        }
    }

    fn sign(f: &Fixture, signers: &[usize], value: TokenValue, nonce: u64) -> Vec<u8> {
        let payload =
            compute_withdrawal_hash(&f.alice, &f.token, &value, nonce, &f.gateway.address());
        signers
            .iter()
            .flat_map(|i| sign_withdrawal(&f.keys[*i], &payload).unwrap())
            .collect()
    }

    #[test]
    fn test_release_with_quorum() {
        let mut f = fixture(4);
        let value = TokenValue::amount(U256::from(400u64));
        let blob = sign(&f, &[0, 1, 2], value, 1);

        let done = f
            .gateway
            .release(f.alice, f.token, value, 1, &blob, 1)
            .unwrap();
        assert_eq!(done.nonce, 1);
        assert_eq!(f.gateway.escrow_of(&f.token, U256::ZERO), U256::from(600u64));
        assert!(f.gateway.is_consumed(&f.alice, 1));
        assert_eq!(
            f.gateway.events_in_range(0, f.gateway.head()).len(),
            2
        );
    }

    #[test]
    fn test_release_below_quorum() {
        let mut f = fixture(4);
        let value = TokenValue::amount(U256::from(400u64));
        let blob = sign(&f, &[0, 1], value, 1);
        assert_eq!(
            f.gateway
                .release(f.alice, f.token, value, 1, &blob, 1)
                .unwrap_err(),
            GatewayError::QuorumNotMet {
                signatures: 2,
                required: 3
            }
        );
        assert_eq!(f.gateway.escrow_of(&f.token, U256::ZERO), U256::from(1_000u64));
    }

    #[test]
    fn test_release_malformed_blob() {
        let mut f = fixture(4);
        let value = TokenValue::amount(U256::from(400u64));
        let mut blob = sign(&f, &[0, 1, 2], value, 1);
        blob.push(0);
        assert_eq!(
            f.gateway
                .release(f.alice, f.token, value, 1, &blob, 1)
                .unwrap_err(),
            GatewayError::MalformedSignatureBlob {
                length: 3 * SIGNATURE_LEN + 1,
                slice: SIGNATURE_LEN
            }
        );
    }

    #[test]
    fn test_release_replay() {
        let mut f = fixture(3);
        let value = TokenValue::amount(U256::from(100u64));
        let blob = sign(&f, &[0, 1], value, 7);
        f.gateway
            .release(f.alice, f.token, value, 7, &blob, 1)
            .unwrap();
        assert_eq!(
            f.gateway
                .release(f.alice, f.token, value, 7, &blob, 1)
                .unwrap_err(),
            GatewayError::NonceReplayed {
                owner: f.alice,
                nonce: 7
            }
        );
    }

    #[test]
    fn test_release_tampered_amount_is_unknown_signer() {
        let mut f = fixture(3);
        let blob = sign(&f, &[0, 1], TokenValue::amount(U256::from(100u64)), 1);
        assert!(matches!(
            f.gateway.release(
                f.alice,
                f.token,
                TokenValue::amount(U256::from(900u64)),
                1,
                &blob,
                1
            ),
            Err(GatewayError::UnknownSigner { .. })
        ));
    }

    #[test]
    fn test_release_insufficient_escrow() {
        let mut f = fixture(1);
        let value = TokenValue::amount(U256::from(5_000u64));
        let blob = sign(&f, &[0], value, 1);
        assert!(matches!(
            f.gateway.release(f.alice, f.token, value, 1, &blob, 1),
            Err(GatewayError::InsufficientEscrow { .. })
        ));
    }

    #[test]
    fn test_mintable_release_mints_shortfall() {
        let mut f = fixture(1);
        f.gateway.register_mintable(f.token.contract);

        // 1,000 escrowed by the fixture deposit
        let value = TokenValue::amount(U256::from(1_500u64));
        let blob = sign(&f, &[0], value, 1);
        f.gateway
            .release(f.alice, f.token, value, 1, &blob, 1)
            .unwrap();
        assert_eq!(f.gateway.escrow_of(&f.token, U256::ZERO), U256::ZERO);
        assert_eq!(f.gateway.minted_of(&f.token, U256::ZERO), U256::from(500u64));
    }

    #[test]
    fn test_mintable_non_fungible_release() {
        let mut f = fixture(1);
        let nft = TokenDescriptor::non_fungible(Address::repeat_byte(0x44));
        let value = TokenValue::token_id(U256::from(123u64));
        let payload = compute_withdrawal_hash(&f.alice, &nft, &value, 1, &f.gateway.address());
        let blob = sign_withdrawal(&f.keys[0], &payload).unwrap().to_vec();

        assert!(matches!(
            f.gateway.release(f.alice, nft, value, 1, &blob, 1),
            Err(GatewayError::InsufficientEscrow { .. })
        ));
        assert!(!f.gateway.is_consumed(&f.alice, 1));

        f.gateway.register_mintable(nft.contract);
        f.gateway.release(f.alice, nft, value, 1, &blob, 1).unwrap();
        assert_eq!(f.gateway.minted_of(&nft, U256::from(123u64)), U256::from(1u64));
        assert!(f.gateway.is_consumed(&f.alice, 1));
    }

    #[test]
    fn test_release_checks_snapshot_version() {
        let mut f = fixture(3);
        let value = TokenValue::amount(U256::from(100u64));
        let blob = sign(&f, &[0, 1], value, 1);

        // rotate to a set the old signers are not part of
        let next = ValidatorSet::new(2, vec![Address::repeat_byte(0x55)]).unwrap();
        f.gateway.add_validator_set(next);

        // still verifiable against the version the receipt was signed under
        assert!(f
            .gateway
            .release(f.alice, f.token, value, 1, &blob, 2)
            .is_err());
        f.gateway
            .release(f.alice, f.token, value, 1, &blob, 1)
            .unwrap();

        f.gateway.retire_validator_sets_below(2);
        let blob = sign(&f, &[0, 1], value, 2);
        assert_eq!(
            f.gateway
                .release(f.alice, f.token, value, 2, &blob, 1)
                .unwrap_err(),
            GatewayError::UnknownValidatorSet { version: 1 }
        );
    }

    #[test]
    fn test_confirmations_and_direct_transfers() {
        let mut f = fixture(1);
        let record = f
            .gateway
            .direct_transfer(f.alice, TokenDescriptor::eth(), TokenValue::amount(U256::from(5u64)))
            .unwrap();
        assert_eq!(f.gateway.confirmations_for(&record.tx_hash), 1);
        f.gateway.mine(9);
        assert_eq!(f.gateway.confirmations_for(&record.tx_hash), 10);
        // no event for direct transfers, but the transfer is retrievable
        assert!(f
            .gateway
            .events_in_range(record.block_number, record.block_number)
            .is_empty());
        assert_eq!(f.gateway.transfer_for(&record.tx_hash), Some(record));
    }
}
