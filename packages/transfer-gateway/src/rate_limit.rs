//! Withdrawal rate limiting
//!
//! Ceilings are kept per token contract, in that token's own units: an
//! aggregate limit across all accounts and a per-account limit. A zero
//! ceiling disables that check. Tokens without an entry in
//! [`RateLimitConfig::token_limits`] use the default ceilings. Both checks
//! run before anything is debited.
//!
//! Rollover is lazy and pure: the window in effect at `now` is derived from the
//! stored window and the clock value passed in, never from a background timer.
//! Window starts are aligned to multiples of the window length, so every node
//! derives the same boundaries.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::GatewayError;

/// Default window length: one day
pub const DEFAULT_WINDOW_SECS: u64 = 86_400;

/// Ceilings for one token (zero = unlimited)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLimits {
    /// Maximum withdrawn by all accounts per window
    pub total_limit: U256,
    /// Maximum withdrawn by one account per window
    pub account_limit: U256,
}

impl TokenLimits {
    pub fn new(total_limit: U256, account_limit: U256) -> Self {
        Self {
            total_limit,
            account_limit,
        }
    }
}

/// Configured ceilings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    /// Default aggregate ceiling per token (zero = unlimited)
    pub total_limit: U256,
    /// Default per-account ceiling per token (zero = unlimited)
    pub account_limit: U256,
    /// Overrides keyed by token contract
    #[serde(default)]
    pub token_limits: HashMap<Address, TokenLimits>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            total_limit: U256::ZERO,
            account_limit: U256::ZERO,
            token_limits: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Same default ceilings for every token
    pub fn uniform(window_secs: u64, total_limit: U256, account_limit: U256) -> Self {
        Self {
            window_secs,
            total_limit,
            account_limit,
            token_limits: HashMap::new(),
        }
    }

    pub fn with_token_limits(mut self, contract: Address, limits: TokenLimits) -> Self {
        self.token_limits.insert(contract, limits);
        self
    }

    pub fn limits_for(&self, contract: &Address) -> TokenLimits {
        self.token_limits
            .get(contract)
            .copied()
            .unwrap_or(TokenLimits::new(self.total_limit, self.account_limit))
    }
}

/// One token's usage within a window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_withdrawn: U256,
    pub per_account: HashMap<Address, U256>,
}

/// Usage within one window, by token contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub window_start: u64,
    pub per_token: HashMap<Address, TokenUsage>,
}

/// Usage recorded by one accepted withdrawal.
///
/// Carries the new absolute values for the one (token, account) pair it
/// touched, so a store writes two rows instead of the whole window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDebit {
    pub window_start: u64,
    /// The debit opened a new window; usage from the previous one is dropped
    pub reset: bool,
    pub contract: Address,
    pub account: Address,
    /// Token total in the window after the debit
    pub token_total: U256,
    /// Account usage of the token after the debit
    pub account_total: U256,
}

/// Start of the window containing `now`
pub fn window_start_for(now: u64, window_secs: u64) -> u64 {
    if window_secs == 0 {
        return now;
    }
    now - now % window_secs
}

impl RateLimitWindow {
    /// The window in effect at `now`: this one, or a fresh one if it expired
    pub fn rolled_over(&self, config: &RateLimitConfig, now: u64) -> RateLimitWindow {
        if now >= self.window_start.saturating_add(config.window_secs) {
            RateLimitWindow {
                window_start: window_start_for(now, config.window_secs),
                per_token: HashMap::new(),
            }
        } else {
            self.clone()
        }
    }

    pub fn total_for(&self, contract: &Address) -> U256 {
        self.per_token
            .get(contract)
            .map(|usage| usage.total_withdrawn)
            .unwrap_or(U256::ZERO)
    }

    pub fn used_by(&self, contract: &Address, account: &Address) -> U256 {
        self.per_token
            .get(contract)
            .and_then(|usage| usage.per_account.get(account))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Check both ceilings of `contract` for `amount` and describe the usage
    /// to record. `self` is never modified; on error nothing is debited.
    pub fn try_debit(
        &self,
        config: &RateLimitConfig,
        contract: &Address,
        account: &Address,
        amount: U256,
        now: u64,
    ) -> Result<RateLimitDebit, GatewayError> {
        let window = self.rolled_over(config, now);
        let limits = config.limits_for(contract);

        let total = window.total_for(contract);
        let token_total = total.saturating_add(amount);
        if !limits.total_limit.is_zero() && token_total > limits.total_limit {
            return Err(GatewayError::DailyTotalExceeded {
                limit: limits.total_limit,
                used: total,
                requested: amount,
            });
        }

        let used = window.used_by(contract, account);
        let account_total = used.saturating_add(amount);
        if !limits.account_limit.is_zero() && account_total > limits.account_limit {
            return Err(GatewayError::DailyAccountExceeded {
                limit: limits.account_limit,
                used,
                requested: amount,
            });
        }

        Ok(RateLimitDebit {
            window_start: window.window_start,
            reset: window.window_start != self.window_start,
            contract: *contract,
            account: *account,
            token_total,
            account_total,
        })
    }

    /// Record an accepted debit
    pub fn apply(&mut self, debit: &RateLimitDebit) {
        if debit.reset || debit.window_start != self.window_start {
            self.per_token.clear();
            self.window_start = debit.window_start;
        }
        let usage = self.per_token.entry(debit.contract).or_default();
        usage.total_withdrawn = debit.token_total;
        usage.per_account.insert(debit.account, debit.account_total);
    }
}
