//! Oracle configuration

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use eyre::{eyre, Result, WrapErr};
use std::env;
use std::fmt;
use std::time::Duration;

/// Oracle configuration
#[derive(Clone)]
pub struct Config {
    /// Unique oracle instance ID
    pub oracle_id: String,

    /// Gateway node API base URL
    pub gateway_api_url: String,

    /// Mainnet RPC URL
    pub mainnet_rpc_url: String,
    /// Mainnet gateway contract address
    pub mainnet_gateway_address: Address,

    /// Validator private key (hex)
    pub validator_private_key: String,

    /// Confirmations before a mainnet event is acted on
    pub min_confirmations: u64,
    /// First mainnet block to scan; defaults to `lookback_blocks` behind head
    pub start_block: Option<u64>,
    pub lookback_blocks: u64,
    /// Maximum blocks read per scan step
    pub max_scan_blocks: u64,

    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,

    pub health_bind_address: String,
    /// Health server port (default 9099)
    pub health_port: u16,

    /// Emit JSON logs instead of text
    pub json_logs: bool,
}

/// Custom Debug that redacts the validator key
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("oracle_id", &self.oracle_id)
            .field("gateway_api_url", &self.gateway_api_url)
            .field("mainnet_rpc_url", &self.mainnet_rpc_url)
            .field("mainnet_gateway_address", &self.mainnet_gateway_address)
            .field("validator_private_key", &"<redacted>")
            .field("min_confirmations", &self.min_confirmations)
            .field("start_block", &self.start_block)
            .field("lookback_blocks", &self.lookback_blocks)
            .field("max_scan_blocks", &self.max_scan_blocks)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("health_bind_address", &self.health_bind_address)
            .field("health_port", &self.health_port)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        // Default oracle ID from hostname or pid
        let default_id = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| format!("oracle-{}", std::process::id()));

        let config = Self {
            oracle_id: env::var("ORACLE_ID").unwrap_or(default_id),

            gateway_api_url: env::var("GATEWAY_API_URL")
                .map_err(|_| eyre!("GATEWAY_API_URL required"))?,

            mainnet_rpc_url: env::var("MAINNET_RPC_URL")
                .map_err(|_| eyre!("MAINNET_RPC_URL required"))?,
            mainnet_gateway_address: env::var("MAINNET_GATEWAY_ADDRESS")
                .map_err(|_| eyre!("MAINNET_GATEWAY_ADDRESS required"))?
                .parse()
                .wrap_err("Invalid MAINNET_GATEWAY_ADDRESS")?,

            validator_private_key: env::var("VALIDATOR_PRIVATE_KEY")
                .map_err(|_| eyre!("VALIDATOR_PRIVATE_KEY required"))?,

            min_confirmations: parse_or("MIN_CONFIRMATIONS", 12)?,
            start_block: env::var("START_BLOCK")
                .ok()
                .map(|v| v.parse().wrap_err("Invalid START_BLOCK"))
                .transpose()?,
            lookback_blocks: parse_or("LOOKBACK_BLOCKS", 100)?,
            max_scan_blocks: parse_or("MAX_SCAN_BLOCKS", 1_000)?,

            poll_interval_ms: parse_or("POLL_INTERVAL_MS", 5_000)?,

            health_bind_address: env::var("HEALTH_BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            health_port: parse_or("HEALTH_PORT", 9099)?,

            json_logs: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway_api_url.is_empty() {
            return Err(eyre!("GATEWAY_API_URL cannot be empty"));
        }
        if self.mainnet_gateway_address.is_zero() {
            return Err(eyre!("MAINNET_GATEWAY_ADDRESS cannot be the zero address"));
        }
        if self.max_scan_blocks == 0 {
            return Err(eyre!("MAX_SCAN_BLOCKS must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(eyre!("POLL_INTERVAL_MS must be greater than zero"));
        }
        self.signer()?;
        Ok(())
    }

    /// Validator signing key
    pub fn signer(&self) -> Result<PrivateKeySigner> {
        self.validator_private_key
            .trim()
            .parse()
            .map_err(|_| eyre!("VALIDATOR_PRIVATE_KEY is not a valid secp256k1 key"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T> {
    match env::var(var) {
        Ok(v) => v.trim().parse().map_err(|_| eyre!("Invalid {}", var)),
        Err(_) => Ok(default),
    }
}
