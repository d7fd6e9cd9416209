//! EVM mainnet event source
//!
//! Reads the mainnet gateway contract over JSON-RPC with alloy:
//! `TokenDeposited` and `TokenWithdrawn` logs become [`MainnetEvent`]s, and
//! transaction receipts give confirmation depth and hot-wallet transfers.

use alloy::{
    consensus::Transaction as _,
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{Filter, Log},
    sol,
    sol_types::SolEvent,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::source::{confirmations_at, ChainEventSource, MainnetEvent, WithdrawalCompleted};
use crate::types::{DepositRecord, TokenDescriptor, TokenKind, TokenValue, TxHash};

sol! {
    /// Emitted by the mainnet gateway when value is escrowed
    event TokenDeposited(
        address indexed from,
        address indexed token,
        uint8 kind,
        uint256 tokenId,
        uint256 amount
    );

    /// Emitted by the mainnet gateway when a release executes
    event TokenWithdrawn(
        address indexed recipient,
        address indexed token,
        uint8 kind,
        uint256 tokenId,
        uint256 amount,
        uint64 nonce
    );

    /// ERC20 transfer, used to recognise hot-wallet token transfers
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Maximum block range per log query (to avoid RPC limits)
const MAX_BLOCK_RANGE: u64 = 5_000;

pub struct EvmEventSource {
    provider: RootProvider<Http<Client>>,
    gateway: Address,
}

impl EvmEventSource {
    pub fn new(rpc_url: &str, gateway: Address) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(
            rpc_url
                .parse()
                .map_err(|e| eyre!("Invalid RPC URL: {}", e))?,
        );
        Ok(Self { provider, gateway })
    }

    async fn logs(&self, from: u64, to: u64) -> Result<Vec<Log>, GatewayError> {
        let mut all_logs = Vec::new();
        let mut current_from = from;

        while current_from <= to {
            let current_to = std::cmp::min(current_from + MAX_BLOCK_RANGE - 1, to);
            let filter = Filter::new()
                .address(self.gateway)
                .event_signature(vec![
                    TokenDeposited::SIGNATURE_HASH,
                    TokenWithdrawn::SIGNATURE_HASH,
                ])
                .from_block(current_from)
                .to_block(current_to);

            let logs = self.provider.get_logs(&filter).await.map_err(|e| {
                unavailable(format!(
                    "get_logs {}..={} failed: {}",
                    current_from, current_to, e
                ))
            })?;
            all_logs.extend(logs);
            current_from = current_to + 1;
        }
        Ok(all_logs)
    }
}

fn unavailable(reason: String) -> GatewayError {
    GatewayError::ChainUnavailable { reason }
}

fn token_from(contract: Address, kind: u8) -> Option<TokenDescriptor> {
    TokenKind::from_code(kind).map(|kind| TokenDescriptor { contract, kind })
}

/// Decode one gateway log; unknown or malformed logs yield `None`
pub fn decode_gateway_log(log: &Log) -> Option<MainnetEvent> {
    let tx_hash = log.transaction_hash?;
    let block_number = log.block_number?;

    match log.topic0() {
        Some(topic) if *topic == TokenDeposited::SIGNATURE_HASH => {
            let decoded = log.log_decode::<TokenDeposited>().ok()?;
            let event = decoded.inner.data;
            Some(MainnetEvent::Deposit(DepositRecord {
                tx_hash,
                token: token_from(event.token, event.kind)?,
                value: TokenValue::semi_fungible(event.tokenId, event.amount),
                depositor: event.from,
                block_number,
            }))
        }
        Some(topic) if *topic == TokenWithdrawn::SIGNATURE_HASH => {
            let decoded = log.log_decode::<TokenWithdrawn>().ok()?;
            let event = decoded.inner.data;
            Some(MainnetEvent::WithdrawalCompleted(WithdrawalCompleted {
                tx_hash,
                recipient: event.recipient,
                token: token_from(event.token, event.kind)?,
                value: TokenValue::semi_fungible(event.tokenId, event.amount),
                nonce: event.nonce,
                block_number,
            }))
        }
        _ => None,
    }
}

#[async_trait]
impl ChainEventSource for EvmEventSource {
    async fn head_height(&self) -> Result<u64, GatewayError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| unavailable(format!("get_block_number failed: {}", e)))
    }

    async fn confirmations_for(&self, tx_hash: &TxHash) -> Result<u64, GatewayError> {
        let receipt = self
            .provider
            .get_transaction_receipt(*tx_hash)
            .await
            .map_err(|e| unavailable(format!("get_transaction_receipt failed: {}", e)))?;
        let Some(block) = receipt.and_then(|r| r.block_number) else {
            return Ok(0);
        };
        let head = self.head_height().await?;
        Ok(confirmations_at(head, block))
    }

    async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<MainnetEvent>, GatewayError> {
        if from > to {
            return Ok(Vec::new());
        }
        let logs = self.logs(from, to).await?;
        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_gateway_log(log) {
                Some(event) => events.push(event),
                None => warn!(
                    tx_hash = ?log.transaction_hash,
                    block = ?log.block_number,
                    "Skipping undecodable gateway log"
                ),
            }
        }
        events.sort_by_key(|e| e.block_number());
        if !events.is_empty() {
            debug!(count = events.len(), from = from, to = to, "Found gateway events");
        }
        Ok(events)
    }

    async fn transfer_for(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<DepositRecord>, GatewayError> {
        let Some(receipt) = self
            .provider
            .get_transaction_receipt(*tx_hash)
            .await
            .map_err(|e| unavailable(format!("get_transaction_receipt failed: {}", e)))?
        else {
            return Ok(None);
        };
        if !receipt.status() {
            return Ok(None);
        }
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };

        // A gateway deposit event in the transaction wins
        for log in receipt.inner.logs() {
            if log.address() != self.gateway {
                continue;
            }
            if let Some(MainnetEvent::Deposit(record)) = decode_gateway_log(log) {
                return Ok(Some(record));
            }
        }

        // ERC20 transfer straight to the gateway
        for log in receipt.inner.logs() {
            if log.topic0() != Some(&Transfer::SIGNATURE_HASH) {
                continue;
            }
            if let Ok(decoded) = log.log_decode::<Transfer>() {
                let transfer = decoded.inner.data;
                if transfer.to == self.gateway && !transfer.value.is_zero() {
                    return Ok(Some(DepositRecord {
                        tx_hash: *tx_hash,
                        token: TokenDescriptor::fungible(log.address()),
                        value: TokenValue::amount(transfer.value),
                        depositor: transfer.from,
                        block_number,
                    }));
                }
            }
        }

        // Plain native transfer
        let tx = self
            .provider
            .get_transaction_by_hash(*tx_hash)
            .await
            .map_err(|e| unavailable(format!("get_transaction_by_hash failed: {}", e)))?;
        Ok(tx.and_then(|tx| {
            let value: U256 = tx.value();
            if tx.to() == Some(self.gateway) && !value.is_zero() {
                Some(DepositRecord {
                    tx_hash: *tx_hash,
                    token: TokenDescriptor::eth(),
                    value: TokenValue::amount(value),
                    depositor: tx.from,
                    block_number,
                })
            } else {
                None
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Log as PrimitiveLog, B256};

    fn rpc_log(inner: PrimitiveLog, block: u64) -> Log {
        Log {
            inner,
            block_hash: Some(B256::repeat_byte(1)),
            block_number: Some(block),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(0xab)),
            transaction_index: Some(0),
            log_index: Some(0),
            removed: false,
        }
    }

    #[test]
    fn test_decode_deposit_log() {
        let gateway = Address::repeat_byte(0x99);
        let event = TokenDeposited {
            from: Address::repeat_byte(1),
            token: Address::ZERO,
            kind: 0,
            tokenId: U256::ZERO,
            amount: U256::from(500u64),
        };
        let log = rpc_log(
            PrimitiveLog {
                address: gateway,
                data: event.encode_log_data(),
            },
            42,
        );

        match decode_gateway_log(&log) {
            Some(MainnetEvent::Deposit(record)) => {
                assert_eq!(record.depositor, Address::repeat_byte(1));
                assert_eq!(record.token, TokenDescriptor::eth());
                assert_eq!(record.value.amount, U256::from(500u64));
                assert_eq!(record.block_number, 42);
                assert_eq!(record.tx_hash, B256::repeat_byte(0xab));
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn test_decode_withdrawn_log() {
        let event = TokenWithdrawn {
            recipient: Address::repeat_byte(2),
            token: Address::repeat_byte(3),
            kind: 2,
            tokenId: U256::from(7u64),
            amount: U256::from(1u64),
            nonce: 4,
        };
        let log = rpc_log(
            PrimitiveLog {
                address: Address::repeat_byte(0x99),
                data: event.encode_log_data(),
            },
            10,
        );
        match decode_gateway_log(&log) {
            Some(MainnetEvent::WithdrawalCompleted(done)) => {
                assert_eq!(done.nonce, 4);
                assert_eq!(done.token.kind, TokenKind::NonFungible);
                assert_eq!(done.value.token_id, U256::from(7u64));
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_skipped() {
        let event = TokenDeposited {
            from: Address::repeat_byte(1),
            token: Address::ZERO,
            kind: 9,
            tokenId: U256::ZERO,
            amount: U256::from(1u64),
        };
        let log = rpc_log(
            PrimitiveLog {
                address: Address::repeat_byte(0x99),
                data: event.encode_log_data(),
            },
            1,
        );
        assert!(decode_gateway_log(&log).is_none());
    }

    #[test]
    fn test_invalid_rpc_url() {
        assert!(EvmEventSource::new("not a url", Address::ZERO).is_err());
    }
}
