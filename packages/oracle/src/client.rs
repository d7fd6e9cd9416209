//! Sidechain client
//!
//! The oracle's view of the sidechain gateway. [`LocalSidechain`] calls an
//! in-process [`SidechainGateway`]; [`HttpSidechainClient`] talks to a
//! gateway node over its JSON API.

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use transfer_gateway::api::{
    ClearRequest, ClearResponse, ErrorBody, HotWalletEntry, SignatureRequest, SignatureResponse,
    SubmitDepositRequest,
};
use transfer_gateway::{
    ClearOutcome, DepositOutcome, DepositRecord, IdentityMapping, ReceiptState, SidechainGateway,
    ValidatorSet, WithdrawalReceipt,
};

use crate::error::OracleError;

#[async_trait]
pub trait SidechainClient: Send + Sync {
    /// `signature` is the validator's over the deposit request hash
    async fn submit_deposit(
        &self,
        deposit: DepositRecord,
        signature: Bytes,
    ) -> Result<DepositOutcome, OracleError>;

    /// Announced hot-wallet hashes not yet credited
    async fn hot_wallet_pending(&self) -> Result<Vec<HotWalletEntry>, OracleError>;

    /// Every outstanding receipt, ordered by owner
    async fn pending_receipts(&self) -> Result<Vec<WithdrawalReceipt>, OracleError>;

    async fn submit_signature(
        &self,
        owner: Address,
        validator: Address,
        signature: Bytes,
    ) -> Result<ReceiptState, OracleError>;

    async fn clear_receipt(
        &self,
        owner: Address,
        nonce: u64,
        signature: Bytes,
    ) -> Result<ClearOutcome, OracleError>;

    async fn identity_for_mainnet(
        &self,
        mainnet: Address,
    ) -> Result<Option<IdentityMapping>, OracleError>;

    async fn validator_set(&self, version: u64) -> Result<ValidatorSet, OracleError>;
}

// ============================================================================
// In-process
// ============================================================================

/// Direct calls into a gateway running in the same process
#[derive(Clone)]
pub struct LocalSidechain {
    gateway: Arc<SidechainGateway>,
}

impl LocalSidechain {
    pub fn new(gateway: Arc<SidechainGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl SidechainClient for LocalSidechain {
    async fn submit_deposit(
        &self,
        deposit: DepositRecord,
        signature: Bytes,
    ) -> Result<DepositOutcome, OracleError> {
        Ok(self.gateway.submit_deposit(deposit, &signature).await?)
    }

    async fn hot_wallet_pending(&self) -> Result<Vec<HotWalletEntry>, OracleError> {
        Ok(self.gateway.hot_wallet_pending().await?)
    }

    async fn pending_receipts(&self) -> Result<Vec<WithdrawalReceipt>, OracleError> {
        Ok(self.gateway.pending_receipts().await)
    }

    async fn submit_signature(
        &self,
        owner: Address,
        validator: Address,
        signature: Bytes,
    ) -> Result<ReceiptState, OracleError> {
        Ok(self
            .gateway
            .submit_signature(owner, validator, &signature)
            .await?)
    }

    async fn clear_receipt(
        &self,
        owner: Address,
        nonce: u64,
        signature: Bytes,
    ) -> Result<ClearOutcome, OracleError> {
        Ok(self.gateway.clear_receipt(owner, nonce, &signature).await?)
    }

    async fn identity_for_mainnet(
        &self,
        mainnet: Address,
    ) -> Result<Option<IdentityMapping>, OracleError> {
        Ok(self.gateway.identity_for_mainnet(&mainnet).await)
    }

    async fn validator_set(&self, version: u64) -> Result<ValidatorSet, OracleError> {
        Ok(self.gateway.validator_set(version).await?)
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Request timeout for gateway node calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON client for a remote gateway node
#[derive(Clone)]
pub struct HttpSidechainClient {
    client: Client,
    base_url: String,
}

impl HttpSidechainClient {
    pub fn new(base_url: &str) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, OracleError> {
        let response = self.client.get(self.url(path)).send().await?;
        decode(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, OracleError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        decode(response).await
    }
}

/// Success bodies decode as `T`; failures as the node's typed [`ErrorBody`]
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, OracleError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }
    let body = response.text().await?;
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => {
            debug!(status = status.as_u16(), code = error.error.code(), "Gateway node rejected request");
            Err(OracleError::Gateway(error.error))
        }
        Err(_) => Err(OracleError::UnexpectedResponse {
            status: status.as_u16(),
            body,
        }),
    }
}

#[async_trait]
impl SidechainClient for HttpSidechainClient {
    async fn submit_deposit(
        &self,
        deposit: DepositRecord,
        signature: Bytes,
    ) -> Result<DepositOutcome, OracleError> {
        self.post("/deposits", &SubmitDepositRequest { deposit, signature })
            .await
    }

    async fn hot_wallet_pending(&self) -> Result<Vec<HotWalletEntry>, OracleError> {
        self.get("/deposits/hot-wallet").await
    }

    async fn pending_receipts(&self) -> Result<Vec<WithdrawalReceipt>, OracleError> {
        self.get("/withdrawals").await
    }

    async fn submit_signature(
        &self,
        owner: Address,
        validator: Address,
        signature: Bytes,
    ) -> Result<ReceiptState, OracleError> {
        let response: SignatureResponse = self
            .post(
                &format!("/withdrawals/{}/signatures", owner),
                &SignatureRequest {
                    validator,
                    signature,
                },
            )
            .await?;
        Ok(response.state)
    }

    async fn clear_receipt(
        &self,
        owner: Address,
        nonce: u64,
        signature: Bytes,
    ) -> Result<ClearOutcome, OracleError> {
        let response: ClearResponse = self
            .post(
                &format!("/withdrawals/{}/clear", owner),
                &ClearRequest { nonce, signature },
            )
            .await?;
        Ok(response.outcome)
    }

    async fn identity_for_mainnet(
        &self,
        mainnet: Address,
    ) -> Result<Option<IdentityMapping>, OracleError> {
        match self
            .get::<IdentityMapping>(&format!("/identities/mainnet/{}", mainnet))
            .await
        {
            Ok(mapping) => Ok(Some(mapping)),
            Err(OracleError::UnexpectedResponse { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn validator_set(&self, version: u64) -> Result<ValidatorSet, OracleError> {
        self.get(&format!("/validators/{}", version)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = HttpSidechainClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.url("/withdrawals"), "http://localhost:8080/withdrawals");
    }
}
