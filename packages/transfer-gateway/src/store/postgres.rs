//! PostgreSQL ledger store
//!
//! Each change set is written in a single transaction. Amounts are stored as
//! `NUMERIC(78,0)` and moved through sqlx as decimal text, addresses and
//! hashes as 0x-prefixed hex.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, error};

use super::LedgerStore;
use crate::error::GatewayError;
use crate::ledger::{LedgerData, StateChange};
use crate::rate_limit::RateLimitWindow;
use crate::receipts::{ReceiptState, WithdrawalReceipt};
use crate::registry::HotWalletEntry;
use crate::types::{
    parse_u256_decimal, BalanceKey, DepositRecord, IdentityMapping, TokenDescriptor, TokenKind,
    TokenValue, TxHash,
};
use crate::validators::ValidatorSet;

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn storage(reason: impl Into<String>) -> GatewayError {
    GatewayError::Storage {
        reason: reason.into(),
    }
}

fn parse_address(s: &str) -> Result<Address, GatewayError> {
    Address::from_str(s).map_err(|e| storage(format!("invalid address '{}': {}", s, e)))
}

fn parse_hash(s: &str) -> Result<TxHash, GatewayError> {
    TxHash::from_str(s).map_err(|e| storage(format!("invalid hash '{}': {}", s, e)))
}

fn parse_kind(s: &str) -> Result<TokenKind, GatewayError> {
    TokenKind::from_str(s).map_err(|e| storage(e.to_string()))
}

fn to_i64(value: u64) -> Result<i64, GatewayError> {
    i64::try_from(value).map_err(|_| storage(format!("value {} exceeds BIGINT", value)))
}

fn to_u64(value: i64) -> Result<u64, GatewayError> {
    u64::try_from(value).map_err(|_| storage(format!("negative value {} in u64 column", value)))
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn load(&self) -> Result<LedgerData, GatewayError> {
        let mut data = LedgerData::default();

        let rows = sqlx::query("SELECT version, validators FROM validator_sets ORDER BY version")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let validators: Vec<String> = row.try_get("validators")?;
            let validators = validators
                .iter()
                .map(|v| parse_address(v))
                .collect::<Result<Vec<_>, _>>()?;
            let set = ValidatorSet::new(to_u64(row.try_get("version")?)?, validators)?;
            data.apply(&StateChange::ValidatorSetAdded(set));
        }

        let rows = sqlx::query("SELECT sidechain, mainnet FROM identity_mappings")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let sidechain: String = row.try_get("sidechain")?;
            let mainnet: String = row.try_get("mainnet")?;
            data.apply(&StateChange::IdentityMapped(IdentityMapping {
                mainnet: parse_address(&mainnet)?,
                sidechain: parse_address(&sidechain)?,
            }));
        }

        let rows = sqlx::query(
            r#"SELECT tx_hash, token_contract, token_kind, token_id::TEXT AS token_id,
                      amount::TEXT AS amount, depositor, block_number
               FROM deposits"#,
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let tx_hash: String = row.try_get("tx_hash")?;
            let contract: String = row.try_get("token_contract")?;
            let kind: String = row.try_get("token_kind")?;
            let token_id: String = row.try_get("token_id")?;
            let amount: String = row.try_get("amount")?;
            let depositor: String = row.try_get("depositor")?;
            data.apply(&StateChange::DepositRecorded(DepositRecord {
                tx_hash: parse_hash(&tx_hash)?,
                token: TokenDescriptor {
                    contract: parse_address(&contract)?,
                    kind: parse_kind(&kind)?,
                },
                value: TokenValue::semi_fungible(
                    parse_u256_decimal(&token_id)?,
                    parse_u256_decimal(&amount)?,
                ),
                depositor: parse_address(&depositor)?,
                block_number: to_u64(row.try_get("block_number")?)?,
            }));
        }

        let rows = sqlx::query("SELECT tx_hash, owner, registered_at FROM hot_wallet_deposits")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let tx_hash: String = row.try_get("tx_hash")?;
            let owner: String = row.try_get("owner")?;
            data.apply(&StateChange::HotWalletRegistered(HotWalletEntry {
                tx_hash: parse_hash(&tx_hash)?,
                owner: parse_address(&owner)?,
                registered_at: to_u64(row.try_get("registered_at")?)?,
            }));
        }

        let rows = sqlx::query(
            r#"SELECT account, token_contract, token_id::TEXT AS token_id, amount::TEXT AS amount
               FROM balances"#,
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let (key, amount) = balance_row(&row, "account")?;
            data.apply(&StateChange::BalanceSet { key, amount });
        }

        let rows = sqlx::query(
            r#"SELECT depositor, token_contract, token_id::TEXT AS token_id, amount::TEXT AS amount
               FROM unclaimed_balances"#,
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let (key, amount) = balance_row(&row, "depositor")?;
            data.apply(&StateChange::UnclaimedSet { key, amount });
        }

        let rows = sqlx::query("SELECT owner, nonce FROM withdrawal_nonces")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let owner: String = row.try_get("owner")?;
            data.apply(&StateChange::NonceSet {
                owner: parse_address(&owner)?,
                nonce: to_u64(row.try_get("nonce")?)?,
            });
        }

        let signature_rows = sqlx::query("SELECT owner, validator, signature FROM receipt_signatures")
            .fetch_all(&self.pool)
            .await?;
        let mut signatures: BTreeMap<Address, BTreeMap<Address, Bytes>> = BTreeMap::new();
        for row in signature_rows {
            let owner: String = row.try_get("owner")?;
            let validator: String = row.try_get("validator")?;
            let signature: Vec<u8> = row.try_get("signature")?;
            signatures
                .entry(parse_address(&owner)?)
                .or_default()
                .insert(parse_address(&validator)?, Bytes::from(signature));
        }

        let rows = sqlx::query(
            r#"SELECT owner, recipient, token_contract, token_kind, token_id::TEXT AS token_id,
                      amount::TEXT AS amount, nonce, validator_set_version, state
               FROM withdrawal_receipts"#,
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let owner = parse_address(&row.try_get::<String, _>("owner")?)?;
            let state: String = row.try_get("state")?;
            let receipt = WithdrawalReceipt {
                owner,
                recipient: parse_address(&row.try_get::<String, _>("recipient")?)?,
                token: TokenDescriptor {
                    contract: parse_address(&row.try_get::<String, _>("token_contract")?)?,
                    kind: parse_kind(&row.try_get::<String, _>("token_kind")?)?,
                },
                value: TokenValue::semi_fungible(
                    parse_u256_decimal(&row.try_get::<String, _>("token_id")?)?,
                    parse_u256_decimal(&row.try_get::<String, _>("amount")?)?,
                ),
                nonce: to_u64(row.try_get("nonce")?)?,
                validator_set_version: to_u64(row.try_get("validator_set_version")?)?,
                signatures: signatures.remove(&owner).unwrap_or_default(),
                state: ReceiptState::parse(&state)
                    .ok_or_else(|| storage(format!("unknown receipt state '{}'", state)))?,
            };
            data.apply(&StateChange::ReceiptSaved(receipt));
        }

        let mut window = RateLimitWindow::default();
        if let Some(row) = sqlx::query("SELECT window_start FROM rate_limit_window WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
        {
            window.window_start = to_u64(row.try_get("window_start")?)?;
        }
        let rows = sqlx::query("SELECT token_contract, withdrawn::TEXT AS withdrawn FROM rate_limit_totals")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let contract = parse_address(&row.try_get::<String, _>("token_contract")?)?;
            window.per_token.entry(contract).or_default().total_withdrawn =
                parse_u256_decimal(&row.try_get::<String, _>("withdrawn")?)?;
        }
        let rows = sqlx::query(
            "SELECT token_contract, account, withdrawn::TEXT AS withdrawn FROM rate_limit_accounts",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let contract = parse_address(&row.try_get::<String, _>("token_contract")?)?;
            window.per_token.entry(contract).or_default().per_account.insert(
                parse_address(&row.try_get::<String, _>("account")?)?,
                parse_u256_decimal(&row.try_get::<String, _>("withdrawn")?)?,
            );
        }
        data.rate_window = window;

        debug!(
            deposits = data.registry().credited_count(),
            receipts = data.receipts().count(),
            validator_set_version = data.validators().active_version(),
            "Loaded ledger from database"
        );
        Ok(data)
    }

    async fn commit(&self, changes: &[StateChange]) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        for change in changes {
            if let Err(e) = write_change(&mut tx, change).await {
                error!(error = %e, ?change, "Failed to persist ledger change, rolling back");
                tx.rollback().await?;
                return Err(e);
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

fn balance_row(
    row: &sqlx::postgres::PgRow,
    account_column: &str,
) -> Result<(BalanceKey, U256), GatewayError> {
    let account: String = row.try_get(account_column)?;
    let contract: String = row.try_get("token_contract")?;
    let token_id: String = row.try_get("token_id")?;
    let amount: String = row.try_get("amount")?;
    Ok((
        BalanceKey {
            account: parse_address(&account)?,
            contract: parse_address(&contract)?,
            token_id: parse_u256_decimal(&token_id)?,
        },
        parse_u256_decimal(&amount)?,
    ))
}

async fn write_change(
    tx: &mut Transaction<'_, Postgres>,
    change: &StateChange,
) -> Result<(), GatewayError> {
    match change {
        StateChange::DepositRecorded(deposit) => {
            sqlx::query(
                r#"
                INSERT INTO deposits (tx_hash, token_contract, token_kind, token_id, amount,
                    depositor, block_number)
                VALUES ($1, $2, $3, $4::NUMERIC, $5::NUMERIC, $6, $7)
                "#,
            )
            .bind(deposit.tx_hash.to_string())
            .bind(deposit.token.contract.to_string())
            .bind(deposit.token.kind.as_str())
            .bind(deposit.value.token_id.to_string())
            .bind(deposit.value.amount.to_string())
            .bind(deposit.depositor.to_string())
            .bind(to_i64(deposit.block_number)?)
            .execute(&mut **tx)
            .await?;
            sqlx::query("DELETE FROM hot_wallet_deposits WHERE tx_hash = $1")
                .bind(deposit.tx_hash.to_string())
                .execute(&mut **tx)
                .await?;
        }
        StateChange::HotWalletRegistered(entry) => {
            sqlx::query(
                "INSERT INTO hot_wallet_deposits (tx_hash, owner, registered_at) VALUES ($1, $2, $3)",
            )
            .bind(entry.tx_hash.to_string())
            .bind(entry.owner.to_string())
            .bind(to_i64(entry.registered_at)?)
            .execute(&mut **tx)
            .await?;
        }
        StateChange::HotWalletExpired { tx_hash } => {
            sqlx::query("DELETE FROM hot_wallet_deposits WHERE tx_hash = $1")
                .bind(tx_hash.to_string())
                .execute(&mut **tx)
                .await?;
        }
        StateChange::BalanceSet { key, amount } => {
            write_balance(tx, "balances", "account", key, amount).await?;
        }
        StateChange::UnclaimedSet { key, amount } => {
            write_balance(tx, "unclaimed_balances", "depositor", key, amount).await?;
        }
        StateChange::ReceiptSaved(receipt) => {
            sqlx::query(
                r#"
                INSERT INTO withdrawal_receipts (owner, recipient, token_contract, token_kind,
                    token_id, amount, nonce, validator_set_version, state)
                VALUES ($1, $2, $3, $4, $5::NUMERIC, $6::NUMERIC, $7, $8, $9)
                ON CONFLICT (owner) DO UPDATE SET
                    recipient = EXCLUDED.recipient,
                    token_contract = EXCLUDED.token_contract,
                    token_kind = EXCLUDED.token_kind,
                    token_id = EXCLUDED.token_id,
                    amount = EXCLUDED.amount,
                    nonce = EXCLUDED.nonce,
                    validator_set_version = EXCLUDED.validator_set_version,
                    state = EXCLUDED.state,
                    updated_at = NOW()
                "#,
            )
            .bind(receipt.owner.to_string())
            .bind(receipt.recipient.to_string())
            .bind(receipt.token.contract.to_string())
            .bind(receipt.token.kind.as_str())
            .bind(receipt.value.token_id.to_string())
            .bind(receipt.value.amount.to_string())
            .bind(to_i64(receipt.nonce)?)
            .bind(to_i64(receipt.validator_set_version)?)
            .bind(receipt.state.as_str())
            .execute(&mut **tx)
            .await?;

            sqlx::query("DELETE FROM receipt_signatures WHERE owner = $1")
                .bind(receipt.owner.to_string())
                .execute(&mut **tx)
                .await?;
            for (validator, signature) in &receipt.signatures {
                sqlx::query(
                    "INSERT INTO receipt_signatures (owner, validator, signature) VALUES ($1, $2, $3)",
                )
                .bind(receipt.owner.to_string())
                .bind(validator.to_string())
                .bind(signature.to_vec())
                .execute(&mut **tx)
                .await?;
            }
        }
        StateChange::ReceiptRemoved { owner } => {
            sqlx::query("DELETE FROM withdrawal_receipts WHERE owner = $1")
                .bind(owner.to_string())
                .execute(&mut **tx)
                .await?;
        }
        StateChange::NonceSet { owner, nonce } => {
            sqlx::query(
                r#"
                INSERT INTO withdrawal_nonces (owner, nonce) VALUES ($1, $2)
                ON CONFLICT (owner) DO UPDATE SET nonce = EXCLUDED.nonce
                "#,
            )
            .bind(owner.to_string())
            .bind(to_i64(*nonce)?)
            .execute(&mut **tx)
            .await?;
        }
        StateChange::RateLimitDebited(debit) => {
            if debit.reset {
                sqlx::query("DELETE FROM rate_limit_totals")
                    .execute(&mut **tx)
                    .await?;
                sqlx::query("DELETE FROM rate_limit_accounts")
                    .execute(&mut **tx)
                    .await?;
            }
            sqlx::query(
                r#"
                INSERT INTO rate_limit_window (id, window_start) VALUES (1, $1)
                ON CONFLICT (id) DO UPDATE SET window_start = EXCLUDED.window_start
                "#,
            )
            .bind(to_i64(debit.window_start)?)
            .execute(&mut **tx)
            .await?;
            sqlx::query(
                r#"
                INSERT INTO rate_limit_totals (token_contract, withdrawn) VALUES ($1, $2::NUMERIC)
                ON CONFLICT (token_contract) DO UPDATE SET withdrawn = EXCLUDED.withdrawn
                "#,
            )
            .bind(debit.contract.to_string())
            .bind(debit.token_total.to_string())
            .execute(&mut **tx)
            .await?;
            sqlx::query(
                r#"
                INSERT INTO rate_limit_accounts (token_contract, account, withdrawn)
                VALUES ($1, $2, $3::NUMERIC)
                ON CONFLICT (token_contract, account) DO UPDATE SET withdrawn = EXCLUDED.withdrawn
                "#,
            )
            .bind(debit.contract.to_string())
            .bind(debit.account.to_string())
            .bind(debit.account_total.to_string())
            .execute(&mut **tx)
            .await?;
        }
        StateChange::IdentityMapped(mapping) => {
            sqlx::query("INSERT INTO identity_mappings (sidechain, mainnet) VALUES ($1, $2)")
                .bind(mapping.sidechain.to_string())
                .bind(mapping.mainnet.to_string())
                .execute(&mut **tx)
                .await?;
        }
        StateChange::ValidatorSetAdded(set) => {
            let validators: Vec<String> = set.validators().iter().map(|v| v.to_string()).collect();
            sqlx::query(
                r#"
                INSERT INTO validator_sets (version, validators) VALUES ($1, $2)
                ON CONFLICT (version) DO NOTHING
                "#,
            )
            .bind(to_i64(set.version())?)
            .bind(validators)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

async fn write_balance(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    account_column: &str,
    key: &BalanceKey,
    amount: &U256,
) -> Result<(), GatewayError> {
    if amount.is_zero() {
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1 AND token_contract = $2 AND token_id = $3::NUMERIC",
            table, account_column
        );
        sqlx::query(&sql)
            .bind(key.account.to_string())
            .bind(key.contract.to_string())
            .bind(key.token_id.to_string())
            .execute(&mut **tx)
            .await?;
    } else {
        let sql = format!(
            r#"
            INSERT INTO {table} ({col}, token_contract, token_id, amount)
            VALUES ($1, $2, $3::NUMERIC, $4::NUMERIC)
            ON CONFLICT ({col}, token_contract, token_id) DO UPDATE SET amount = EXCLUDED.amount
            "#,
            table = table,
            col = account_column
        );
        sqlx::query(&sql)
            .bind(key.account.to_string())
            .bind(key.contract.to_string())
            .bind(key.token_id.to_string())
            .bind(amount.to_string())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
