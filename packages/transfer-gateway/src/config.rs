//! Gateway node configuration
//!
//! Read from environment variables, with a `.env` file loaded first when
//! present.

use alloy::primitives::{Address, U256};
use eyre::{eyre, Result, WrapErr};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::rate_limit::{RateLimitConfig, TokenLimits, DEFAULT_WINDOW_SECS};
use crate::sidechain::{
    GatewayParams, DEFAULT_HOT_WALLET_EXPIRY_BLOCKS, DEFAULT_MAX_HOT_WALLET_PER_OWNER,
    DEFAULT_MIN_CONFIRMATIONS,
};
use crate::types::parse_u256_decimal;
use crate::validators::ValidatorSet;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres persistence; the node keeps state in memory when unset
    pub database: Option<DatabaseConfig>,
    pub api: ApiConfig,
    pub mainnet: MainnetConfig,
    pub gateway: GatewayConfig,
    pub log_format: LogFormat,
}

/// Database configuration
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct MainnetConfig {
    pub rpc_url: String,
    pub gateway_address: Address,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub min_confirmations: u64,
    pub rate_limits: RateLimitConfig,
    /// Validator set installed as version 1 on a fresh ledger
    pub genesis_validators: Vec<Address>,
    pub mintable_tokens: Vec<Address>,
    pub hot_wallet_expiry_blocks: u64,
    pub max_hot_wallet_per_owner: usize,
    /// How often lapsed hot-wallet announcements are pruned
    pub hot_wallet_prune_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(eyre!("LOG_FORMAT must be 'text' or 'json', got '{}'", other)),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_prune_interval_secs() -> u64 {
    600
}

fn env_or<T: FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    fn load_from_env() -> Result<Self> {
        let database = env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .map(|url| DatabaseConfig { url });

        let api = ApiConfig {
            bind_address: env::var("API_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_api_port()),
        };

        let mainnet = MainnetConfig {
            rpc_url: env::var("MAINNET_RPC_URL")
                .map_err(|_| eyre!("MAINNET_RPC_URL environment variable is required"))?,
            gateway_address: env::var("MAINNET_GATEWAY_ADDRESS")
                .map_err(|_| eyre!("MAINNET_GATEWAY_ADDRESS environment variable is required"))?
                .parse()
                .wrap_err("MAINNET_GATEWAY_ADDRESS must be a 0x-prefixed address")?,
        };

        let gateway = GatewayConfig {
            min_confirmations: env_or("MIN_CONFIRMATIONS", DEFAULT_MIN_CONFIRMATIONS),
            rate_limits: RateLimitConfig {
                window_secs: env_or("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS),
                total_limit: parse_limit("DAILY_TOTAL_LIMIT")?,
                account_limit: parse_limit("DAILY_ACCOUNT_LIMIT")?,
                token_limits: parse_token_limits(
                    &env::var("RATE_LIMIT_TOKEN_OVERRIDES").unwrap_or_default(),
                )?,
            },
            genesis_validators: parse_address_list(
                &env::var("GENESIS_VALIDATORS")
                    .map_err(|_| eyre!("GENESIS_VALIDATORS environment variable is required"))?,
            )?,
            mintable_tokens: parse_address_list(&env::var("MINTABLE_TOKENS").unwrap_or_default())
                .wrap_err("Invalid MINTABLE_TOKENS")?,
            hot_wallet_expiry_blocks: env_or(
                "HOT_WALLET_EXPIRY_BLOCKS",
                DEFAULT_HOT_WALLET_EXPIRY_BLOCKS,
            ),
            max_hot_wallet_per_owner: env_or(
                "MAX_HOT_WALLET_PER_OWNER",
                DEFAULT_MAX_HOT_WALLET_PER_OWNER,
            ),
            hot_wallet_prune_interval_secs: env_or(
                "HOT_WALLET_PRUNE_INTERVAL_SECS",
                default_prune_interval_secs(),
            ),
        };

        let log_format = match env::var("LOG_FORMAT") {
            Ok(v) => v.parse()?,
            Err(_) => LogFormat::Text,
        };

        let config = Config {
            database,
            api,
            mainnet,
            gateway,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mainnet.rpc_url.is_empty() {
            return Err(eyre!("mainnet.rpc_url cannot be empty"));
        }
        if self.mainnet.gateway_address.is_zero() {
            return Err(eyre!("mainnet.gateway_address cannot be the zero address"));
        }
        if self.gateway.genesis_validators.is_empty() {
            return Err(eyre!("GENESIS_VALIDATORS must list at least one validator"));
        }
        if self.gateway.rate_limits.window_secs == 0 {
            return Err(eyre!("RATE_LIMIT_WINDOW_SECS must be greater than zero"));
        }
        let limits = &self.gateway.rate_limits;
        check_ceilings(
            "default",
            &TokenLimits::new(limits.total_limit, limits.account_limit),
        )?;
        for (contract, token) in &limits.token_limits {
            check_ceilings(&contract.to_string(), token)?;
        }
        if self.gateway.hot_wallet_prune_interval_secs == 0 {
            return Err(eyre!("HOT_WALLET_PRUNE_INTERVAL_SECS must be greater than zero"));
        }
        Ok(())
    }

    pub fn gateway_params(&self) -> GatewayParams {
        GatewayParams {
            rate_limits: self.gateway.rate_limits.clone(),
            min_confirmations: self.gateway.min_confirmations,
            mintable_tokens: self.gateway.mintable_tokens.iter().copied().collect(),
            hot_wallet_expiry_blocks: self.gateway.hot_wallet_expiry_blocks,
            max_hot_wallet_per_owner: self.gateway.max_hot_wallet_per_owner,
            ..GatewayParams::new(self.mainnet.gateway_address)
        }
    }

    pub fn genesis_set(&self) -> Result<ValidatorSet> {
        ValidatorSet::new(1, self.gateway.genesis_validators.clone())
            .wrap_err("Invalid GENESIS_VALIDATORS")
    }
}

/// Decimal ceiling from the environment; unset means unlimited (zero)
fn parse_limit(var: &str) -> Result<U256> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => {
            parse_u256_decimal(&v).wrap_err_with(|| format!("{} must be a decimal amount", var))
        }
        _ => Ok(U256::ZERO),
    }
}

fn check_ceilings(token: &str, limits: &TokenLimits) -> Result<()> {
    if !limits.total_limit.is_zero()
        && !limits.account_limit.is_zero()
        && limits.account_limit > limits.total_limit
    {
        return Err(eyre!(
            "account limit ({}) cannot exceed total limit ({}) for {} ceilings",
            limits.account_limit,
            limits.total_limit,
            token
        ));
    }
    Ok(())
}

/// Comma-separated `contract:total:account` entries; empty limits mean unlimited
pub fn parse_token_limits(raw: &str) -> Result<HashMap<Address, TokenLimits>> {
    let mut limits = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
        let [contract, total, account] = parts[..] else {
            return Err(eyre!(
                "RATE_LIMIT_TOKEN_OVERRIDES entry '{}' must be contract:total:account",
                entry
            ));
        };
        let contract = Address::from_str(contract)
            .wrap_err_with(|| format!("Invalid token contract '{}'", contract))?;
        let amount = |s: &str| -> Result<U256> {
            if s.is_empty() {
                return Ok(U256::ZERO);
            }
            parse_u256_decimal(s).wrap_err_with(|| format!("Invalid limit '{}' in '{}'", s, entry))
        };
        limits.insert(contract, TokenLimits::new(amount(total)?, amount(account)?));
    }
    Ok(limits)
}

/// Comma-separated 0x addresses
pub fn parse_address_list(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Address::from_str(s).wrap_err_with(|| format!("Invalid validator address '{}'", s))
        })
        .collect()
}
