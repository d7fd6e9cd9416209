//! Shared types for the transfer gateway
//!
//! Token descriptors, token values, deposit records and identity mappings are
//! used on both sides of the bridge and by the oracle.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

/// Source-chain transaction hash
pub type TxHash = B256;

/// Kind of token moved through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Native mainnet asset (contract is the zero address)
    Eth,
    /// ERC20-style fungible token
    Fungible,
    /// ERC721-style non-fungible token
    NonFungible,
    /// ERC721X-style semi-fungible token (token id + amount)
    SemiFungible,
}

impl TokenKind {
    /// Stable numeric code used in the signed receipt payload and in storage
    pub fn code(&self) -> u8 {
        match self {
            TokenKind::Eth => 0,
            TokenKind::Fungible => 1,
            TokenKind::NonFungible => 2,
            TokenKind::SemiFungible => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TokenKind::Eth),
            1 => Some(TokenKind::Fungible),
            2 => Some(TokenKind::NonFungible),
            3 => Some(TokenKind::SemiFungible),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Eth => "eth",
            TokenKind::Fungible => "fungible",
            TokenKind::NonFungible => "non_fungible",
            TokenKind::SemiFungible => "semi_fungible",
        }
    }

    /// Fungible kinds are the ones counted against withdrawal ceilings
    pub fn is_fungible(&self) -> bool {
        matches!(self, TokenKind::Eth | TokenKind::Fungible)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eth" => Ok(TokenKind::Eth),
            "fungible" => Ok(TokenKind::Fungible),
            "non_fungible" => Ok(TokenKind::NonFungible),
            "semi_fungible" => Ok(TokenKind::SemiFungible),
            other => Err(GatewayError::InvalidTokenValue {
                reason: format!("unknown token kind '{}'", other),
            }),
        }
    }
}

/// Mainnet token contract plus its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub contract: Address,
    pub kind: TokenKind,
}

impl TokenDescriptor {
    pub fn eth() -> Self {
        Self {
            contract: Address::ZERO,
            kind: TokenKind::Eth,
        }
    }

    pub fn fungible(contract: Address) -> Self {
        Self {
            contract,
            kind: TokenKind::Fungible,
        }
    }

    pub fn non_fungible(contract: Address) -> Self {
        Self {
            contract,
            kind: TokenKind::NonFungible,
        }
    }

    pub fn semi_fungible(contract: Address) -> Self {
        Self {
            contract,
            kind: TokenKind::SemiFungible,
        }
    }
}

/// Amount and/or token id carried by a transfer.
///
/// - `Eth` / `Fungible`: `token_id` is zero, `amount` is the quantity
/// - `NonFungible`: `token_id` identifies the token, `amount` is always one
/// - `SemiFungible`: both are meaningful
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenValue {
    pub token_id: U256,
    pub amount: U256,
}

impl TokenValue {
    pub fn amount(amount: U256) -> Self {
        Self {
            token_id: U256::ZERO,
            amount,
        }
    }

    pub fn token_id(token_id: U256) -> Self {
        Self {
            token_id,
            amount: U256::from(1u8),
        }
    }

    pub fn semi_fungible(token_id: U256, amount: U256) -> Self {
        Self { token_id, amount }
    }

    /// Check that the value is well-formed for the given token kind
    pub fn validate_for(&self, kind: TokenKind) -> Result<(), GatewayError> {
        match kind {
            TokenKind::Eth | TokenKind::Fungible => {
                if !self.token_id.is_zero() {
                    return Err(GatewayError::InvalidTokenValue {
                        reason: "fungible transfers cannot carry a token id".to_string(),
                    });
                }
                if self.amount.is_zero() {
                    return Err(GatewayError::InvalidAmount);
                }
            }
            TokenKind::NonFungible => {
                if self.amount != U256::from(1u8) {
                    return Err(GatewayError::InvalidTokenValue {
                        reason: "non-fungible transfers move exactly one token".to_string(),
                    });
                }
            }
            TokenKind::SemiFungible => {
                if self.amount.is_zero() {
                    return Err(GatewayError::InvalidAmount);
                }
            }
        }
        Ok(())
    }
}

/// A mainnet deposit as observed by an oracle.
///
/// Immutable once recorded in the registry; the `tx_hash` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub tx_hash: TxHash,
    pub token: TokenDescriptor,
    pub value: TokenValue,
    /// Mainnet address that sent the deposit
    pub depositor: Address,
    /// Mainnet block the deposit was included in
    pub block_number: u64,
}

/// Immutable link between a mainnet account and a sidechain account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub mainnet: Address,
    pub sidechain: Address,
}

/// Balance key: (account, token contract, token id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub account: Address,
    pub contract: Address,
    pub token_id: U256,
}

impl BalanceKey {
    pub fn new(account: Address, token: &TokenDescriptor, value: &TokenValue) -> Self {
        Self {
            account,
            contract: token.contract,
            token_id: value.token_id,
        }
    }
}

/// Parse a decimal amount as stored in the database or passed in config
pub fn parse_u256_decimal(s: &str) -> Result<U256, GatewayError> {
    U256::from_str_radix(s.trim(), 10).map_err(|e| GatewayError::Storage {
        reason: format!("invalid decimal amount '{}': {}", s, e),
    })
}
