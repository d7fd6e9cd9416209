//! Validator sets and the 2/3 threshold policy
//!
//! Validator sets are versioned. A receipt records the version that was active
//! when it was created, and its signatures are always checked against that
//! version, so a rotation never invalidates in-flight withdrawals.
//!
//! Signatures are 65-byte secp256k1 signatures (`r || s || v`) over the
//! EIP-191 prefixed withdrawal hash. Aggregated signatures are plain
//! concatenations, so the signer count is `len / 65`.

use alloy::primitives::{Address, PrimitiveSignature, B256};
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::GatewayError;

/// Byte length of one validator signature
pub const SIGNATURE_LEN: usize = 65;

/// Minimum distinct signatures for a set of `n` validators: ceil(2n/3)
pub fn quorum_for(n: usize) -> usize {
    (2 * n + 2) / 3
}

/// One version of the authorized signer set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    version: u64,
    validators: Vec<Address>,
}

impl ValidatorSet {
    /// Build a set, dropping duplicate addresses while keeping order
    pub fn new(version: u64, validators: Vec<Address>) -> Result<Self, GatewayError> {
        let mut seen = HashSet::new();
        let validators: Vec<Address> = validators
            .into_iter()
            .filter(|v| seen.insert(*v))
            .collect();
        if validators.is_empty() {
            return Err(GatewayError::EmptyValidatorSet);
        }
        Ok(Self {
            version,
            validators,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn quorum(&self) -> usize {
        quorum_for(self.validators.len())
    }

    pub fn contains(&self, validator: &Address) -> bool {
        self.validators.contains(validator)
    }

    /// Position of a validator; aggregated signatures are ordered by it
    pub fn index_of(&self, validator: &Address) -> Option<usize> {
        self.validators.iter().position(|v| v == validator)
    }

    pub fn ensure_member(&self, validator: &Address) -> Result<(), GatewayError> {
        if self.contains(validator) {
            Ok(())
        } else {
            Err(GatewayError::UnknownValidator {
                validator: *validator,
                version: self.version,
            })
        }
    }

    /// Verify an aggregated signature blob against this set.
    ///
    /// Every slice must recover to a distinct member and the number of
    /// signers must reach quorum. Returns the recovered signers in blob order.
    pub fn verify_aggregate(
        &self,
        payload: &B256,
        blob: &[u8],
    ) -> Result<Vec<Address>, GatewayError> {
        let slices = split_signature_blob(blob)?;
        let mut signers = Vec::with_capacity(slices.len());

        for (index, slice) in slices.into_iter().enumerate() {
            let signer = recover_signer(payload, slice)
                .map_err(|_| GatewayError::UnknownSigner { index })?;
            if !self.contains(&signer) {
                return Err(GatewayError::UnknownSigner { index });
            }
            if signers.contains(&signer) {
                return Err(GatewayError::DuplicateSigner { validator: signer });
            }
            signers.push(signer);
        }

        if signers.len() < self.quorum() {
            return Err(GatewayError::QuorumNotMet {
                signatures: signers.len(),
                required: self.quorum(),
            });
        }

        Ok(signers)
    }
}

/// All known validator set versions plus the active one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRegistry {
    sets: BTreeMap<u64, ValidatorSet>,
    /// Versions below this are no longer accepted for verification
    min_accepted: u64,
}

impl ValidatorRegistry {
    pub fn new(initial: ValidatorSet) -> Self {
        let mut registry = Self::default();
        registry.insert(initial);
        registry
    }

    /// Record a set version. The highest version is the active one.
    pub fn insert(&mut self, set: ValidatorSet) {
        self.sets.insert(set.version(), set);
    }

    /// The most recent set, used for new receipts
    pub fn active(&self) -> Option<&ValidatorSet> {
        self.sets.values().next_back()
    }

    pub fn active_version(&self) -> u64 {
        self.active().map(|s| s.version()).unwrap_or(0)
    }

    /// Look up a set version for verification
    pub fn get(&self, version: u64) -> Result<&ValidatorSet, GatewayError> {
        if version < self.min_accepted {
            return Err(GatewayError::UnknownValidatorSet { version });
        }
        self.sets
            .get(&version)
            .ok_or(GatewayError::UnknownValidatorSet { version })
    }

    /// Build the next version from a new validator list (not yet inserted)
    pub fn next_set(&self, validators: Vec<Address>) -> Result<ValidatorSet, GatewayError> {
        ValidatorSet::new(self.active_version() + 1, validators)
    }

    /// Stop accepting signatures from versions below `version`
    pub fn retire_below(&mut self, version: u64) {
        self.min_accepted = self.min_accepted.max(version);
    }

    pub fn min_accepted(&self) -> u64 {
        self.min_accepted
    }

    pub fn sets(&self) -> impl Iterator<Item = &ValidatorSet> {
        self.sets.values()
    }
}

/// Sign a withdrawal hash as a validator
pub fn sign_withdrawal(
    signer: &PrivateKeySigner,
    payload: &B256,
) -> Result<[u8; SIGNATURE_LEN], GatewayError> {
    let signature = signer
        .sign_message_sync(payload.as_slice())
        .map_err(|e| GatewayError::InvalidSignature {
            reason: e.to_string(),
        })?;
    Ok(signature.as_bytes())
}

/// Recover the address that produced `signature` over `payload`
pub fn recover_signer(payload: &B256, signature: &[u8]) -> Result<Address, GatewayError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(GatewayError::InvalidSignature {
            reason: format!("expected {} bytes, got {}", SIGNATURE_LEN, signature.len()),
        });
    }
    let signature =
        PrimitiveSignature::try_from(signature).map_err(|e| GatewayError::InvalidSignature {
            reason: e.to_string(),
        })?;
    signature
        .recover_address_from_msg(payload.as_slice())
        .map_err(|e| GatewayError::InvalidSignature {
            reason: e.to_string(),
        })
}

/// Split an aggregated signature into fixed-size slices
pub fn split_signature_blob(blob: &[u8]) -> Result<Vec<&[u8]>, GatewayError> {
    if blob.is_empty() || blob.len() % SIGNATURE_LEN != 0 {
        return Err(GatewayError::MalformedSignatureBlob {
            length: blob.len(),
            slice: SIGNATURE_LEN,
        });
    }
    Ok(blob.chunks_exact(SIGNATURE_LEN).collect())
}
