//! Gateway node HTTP API
//!
//! JSON routes over [`SidechainGateway`]:
//!
//! - `POST /identities` - map a mainnet account to a sidechain account
//! - `GET  /identities/mainnet/{address}`, `/identities/sidechain/{address}`
//! - `POST /deposits` - oracle deposit submission
//! - `GET  /deposits/{tx_hash}`
//! - `POST /deposits/hot-wallet`, `GET /deposits/hot-wallet`
//! - `POST /withdrawals`, `GET /withdrawals`, `GET /withdrawals/{owner}`
//! - `GET  /withdrawals/{owner}/nonce` - nonce the next withdrawal must be signed for
//! - `GET  /withdrawals/{owner}/authorization` - receipt plus aggregated signature
//! - `POST /withdrawals/{owner}/signatures` - oracle signature share
//! - `POST /withdrawals/{owner}/clear` - oracle receipt clear
//! - `GET  /balances/{account}?contract=&token_id=`
//! - `GET  /validators`, `GET /validators/{version}`
//! - `GET  /health`, `/healthz`, `/readyz`, `/metrics`
//!
//! Mutating requests carry the signatures described in [`crate::auth`].
//! Errors are returned as [`ErrorBody`] with the typed error under `error`.

use alloy::primitives::{Address, Bytes, U256};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ErrorKind, GatewayError};
use crate::metrics;
use crate::receipts::{ReceiptState, WithdrawalReceipt};
pub use crate::registry::HotWalletEntry;
use crate::sidechain::{ClearOutcome, DepositOutcome, SidechainGateway, WithdrawalAuthorization};
use crate::types::{BalanceKey, DepositRecord, IdentityMapping, TokenDescriptor, TokenValue, TxHash};
use crate::validators::ValidatorSet;

// ============================================================================
// Request / response bodies (shared with the oracle's HTTP client)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapIdentityRequest {
    pub mainnet: Address,
    pub sidechain: Address,
    /// Both keys sign the same identity request hash
    pub mainnet_signature: Bytes,
    pub sidechain_signature: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapIdentityResponse {
    /// Balances credited from value held before the mapping existed
    pub claimed: Vec<BalanceKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDepositRequest {
    pub deposit: DepositRecord,
    /// Validator signature; the submitter is recovered from it
    pub signature: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotWalletRequest {
    pub owner: Address,
    pub tx_hash: TxHash,
    pub signature: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub owner: Address,
    pub token: TokenDescriptor,
    pub value: TokenValue,
    pub nonce: u64,
    pub signature: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceResponse {
    pub owner: Address,
    /// Nonce the next withdrawal request must be signed for
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub validator: Address,
    pub signature: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub state: ReceiptState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearRequest {
    pub nonce: u64,
    /// Validator signature; the submitter is recovered from it
    pub signature: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub outcome: ClearOutcome,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalanceQuery {
    /// Token contract; the native asset when omitted
    pub contract: Option<Address>,
    pub token_id: Option<U256>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account: Address,
    pub contract: Address,
    pub token_id: U256,
    pub balance: U256,
}

/// Error response: the error's `code` and fields at top level, plus its
/// kind and display message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(flatten)]
    pub error: GatewayError,
    pub kind: ErrorKind,
    pub message: String,
}

// ============================================================================
// Error mapping
// ============================================================================

pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self(e)
    }
}

pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::ReceiptNotFound { .. } | GatewayError::UnknownValidatorSet { .. } => {
            StatusCode::NOT_FOUND
        }
        GatewayError::UnknownValidator { .. } | GatewayError::SignerMismatch { .. } => {
            StatusCode::FORBIDDEN
        }
        _ => match error.kind() {
            ErrorKind::Replay => StatusCode::CONFLICT,
            ErrorKind::Policy => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, code = self.0.code(), "Request failed");
        }
        let body = ErrorBody {
            kind: self.0.kind(),
            message: self.0.to_string(),
            error: self.0,
        };
        (status, Json(body)).into_response()
    }
}

fn not_found(what: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("{} not found", what)).into_response()
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

// ============================================================================
// Handlers
// ============================================================================

pub type AppState = Arc<SidechainGateway>;

async fn map_identity(
    State(gateway): State<AppState>,
    Json(req): Json<MapIdentityRequest>,
) -> Result<Json<MapIdentityResponse>, ApiError> {
    let claimed = gateway
        .map_identity(
            req.mainnet,
            req.sidechain,
            &req.mainnet_signature,
            &req.sidechain_signature,
        )
        .await?;
    Ok(Json(MapIdentityResponse { claimed }))
}

async fn identity_by_mainnet(
    State(gateway): State<AppState>,
    Path(address): Path<Address>,
) -> Response {
    match gateway.identity_for_mainnet(&address).await {
        Some(mapping) => Json::<IdentityMapping>(mapping).into_response(),
        None => not_found("identity"),
    }
}

async fn identity_by_sidechain(
    State(gateway): State<AppState>,
    Path(address): Path<Address>,
) -> Response {
    match gateway.identity_for_sidechain(&address).await {
        Some(mapping) => Json::<IdentityMapping>(mapping).into_response(),
        None => not_found("identity"),
    }
}

async fn submit_deposit(
    State(gateway): State<AppState>,
    Json(req): Json<SubmitDepositRequest>,
) -> Result<Json<DepositOutcome>, ApiError> {
    Ok(Json(gateway.submit_deposit(req.deposit, &req.signature).await?))
}

async fn get_deposit(State(gateway): State<AppState>, Path(tx_hash): Path<TxHash>) -> Response {
    match gateway.deposit(&tx_hash).await {
        Some(record) => Json(record).into_response(),
        None => not_found("deposit"),
    }
}

async fn submit_hot_wallet(
    State(gateway): State<AppState>,
    Json(req): Json<HotWalletRequest>,
) -> Result<(StatusCode, Json<HotWalletEntry>), ApiError> {
    let entry = gateway
        .submit_hot_wallet_deposit(req.owner, req.tx_hash, &req.signature)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(entry)))
}

async fn list_hot_wallet(
    State(gateway): State<AppState>,
) -> Result<Json<Vec<HotWalletEntry>>, ApiError> {
    Ok(Json(gateway.hot_wallet_pending().await?))
}

async fn request_withdrawal(
    State(gateway): State<AppState>,
    Json(req): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalReceipt>), ApiError> {
    let receipt = gateway
        .request_withdrawal(
            req.owner,
            req.token,
            req.value,
            req.nonce,
            &req.signature,
            unix_now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn next_nonce(State(gateway): State<AppState>, Path(owner): Path<Address>) -> Json<NonceResponse> {
    Json(NonceResponse {
        owner,
        nonce: gateway.next_withdrawal_nonce(&owner).await,
    })
}

async fn list_receipts(State(gateway): State<AppState>) -> Json<Vec<WithdrawalReceipt>> {
    Json(gateway.pending_receipts().await)
}

async fn get_receipt(State(gateway): State<AppState>, Path(owner): Path<Address>) -> Response {
    match gateway.receipt(&owner).await {
        Some(receipt) => Json(receipt).into_response(),
        None => ApiError(GatewayError::ReceiptNotFound { owner }).into_response(),
    }
}

async fn get_authorization(
    State(gateway): State<AppState>,
    Path(owner): Path<Address>,
) -> Result<Json<WithdrawalAuthorization>, ApiError> {
    Ok(Json(gateway.withdrawal_authorization(&owner).await?))
}

async fn submit_signature(
    State(gateway): State<AppState>,
    Path(owner): Path<Address>,
    Json(req): Json<SignatureRequest>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let state = gateway
        .submit_signature(owner, req.validator, &req.signature)
        .await?;
    Ok(Json(SignatureResponse { state }))
}

async fn clear_receipt(
    State(gateway): State<AppState>,
    Path(owner): Path<Address>,
    Json(req): Json<ClearRequest>,
) -> Result<Json<ClearResponse>, ApiError> {
    let outcome = gateway.clear_receipt(owner, req.nonce, &req.signature).await?;
    Ok(Json(ClearResponse { outcome }))
}

async fn get_balance(
    State(gateway): State<AppState>,
    Path(account): Path<Address>,
    Query(query): Query<BalanceQuery>,
) -> Json<BalanceResponse> {
    let contract = query.contract.unwrap_or(Address::ZERO);
    let token_id = query.token_id.unwrap_or(U256::ZERO);
    Json(BalanceResponse {
        account,
        contract,
        token_id,
        balance: gateway.balance_of(account, contract, token_id).await,
    })
}

async fn active_validators(
    State(gateway): State<AppState>,
) -> Result<Json<ValidatorSet>, ApiError> {
    Ok(Json(gateway.active_validator_set().await?))
}

async fn validator_set(
    State(gateway): State<AppState>,
    Path(version): Path<u64>,
) -> Result<Json<ValidatorSet>, ApiError> {
    Ok(Json(gateway.validator_set(version).await?))
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    validator_set_version: u64,
    outstanding_receipts: usize,
}

async fn health_check(State(gateway): State<AppState>) -> Json<HealthResponse> {
    let version = gateway
        .active_validator_set()
        .await
        .map(|s| s.version())
        .unwrap_or(0);
    Json(HealthResponse {
        status: "healthy",
        validator_set_version: version,
        outstanding_receipts: gateway.pending_receipts().await.len(),
    })
}

/// Readiness probe: ready once a validator set is installed
async fn readiness(State(gateway): State<AppState>) -> (StatusCode, &'static str) {
    match gateway.active_validator_set().await {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY"),
    }
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(gateway: AppState) -> Router {
    Router::new()
        .route("/identities", post(map_identity))
        .route("/identities/mainnet/{address}", get(identity_by_mainnet))
        .route("/identities/sidechain/{address}", get(identity_by_sidechain))
        .route("/deposits", post(submit_deposit))
        .route(
            "/deposits/hot-wallet",
            get(list_hot_wallet).post(submit_hot_wallet),
        )
        .route("/deposits/{tx_hash}", get(get_deposit))
        .route("/withdrawals", get(list_receipts).post(request_withdrawal))
        .route("/withdrawals/{owner}", get(get_receipt))
        .route("/withdrawals/{owner}/nonce", get(next_nonce))
        .route("/withdrawals/{owner}/authorization", get(get_authorization))
        .route("/withdrawals/{owner}/signatures", post(submit_signature))
        .route("/withdrawals/{owner}/clear", post(clear_receipt))
        .route("/balances/{account}", get(get_balance))
        .route("/validators", get(active_validators))
        .route("/validators/{version}", get(validator_set))
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(gateway)
}

/// Serve the gateway API until the listener fails
pub async fn start_server(bind_address: &str, port: u16, gateway: AppState) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Gateway API listening on {}", addr);

    metrics::UP.set(1.0);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(gateway)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{deposit_request_hash, sign_request};
    use crate::sidechain::GatewayParams;
    use crate::store::MemoryStore;
    use crate::testing::{test_validator_set, MockMainnet, TestUser};
    use alloy::signers::local::PrivateKeySigner;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::collections::HashSet;
    use tower::ServiceExt;

    const GATEWAY: Address = Address::new([0x99; 20]);
    const CARDS: Address = Address::new([0x61; 20]);

    struct App {
        router: Router,
        gateway: Arc<SidechainGateway>,
        mainnet: MockMainnet,
        keys: Vec<PrivateKeySigner>,
    }

    async fn app() -> App {
        let (set, keys) = test_validator_set(4).unwrap();
        let mainnet = MockMainnet::new(GATEWAY, set.clone());
        let gateway = SidechainGateway::open(
            GatewayParams {
                min_confirmations: 1,
                mintable_tokens: HashSet::from([CARDS]),
                ..GatewayParams::new(GATEWAY)
            },
            set,
            Arc::new(MemoryStore::new()),
            Arc::new(mainnet.clone()),
        )
        .await
        .unwrap();
        let gateway = Arc::new(gateway);
        App {
            router: router(gateway.clone()),
            gateway,
            mainnet,
            keys,
        }
    }

    fn post_json<T: Serialize>(uri: &str, body: &T) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn identity_request(user: &TestUser) -> MapIdentityRequest {
        let (mainnet_sig, sidechain_sig) = user.identity_signatures(&GATEWAY).unwrap();
        MapIdentityRequest {
            mainnet: user.mainnet_address(),
            sidechain: user.sidechain_address(),
            mainnet_signature: Bytes::from(mainnet_sig.to_vec()),
            sidechain_signature: Bytes::from(sidechain_sig.to_vec()),
        }
    }

    #[tokio::test]
    async fn test_liveness() {
        let app = app().await;
        let response = app.router.oneshot(get_request("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_deposit_then_busy_withdrawal_over_http() {
        let app = app().await;
        let alice = TestUser::new(1).unwrap();
        let owner = alice.sidechain_address();

        let response = app
            .router
            .clone()
            .oneshot(post_json("/identities", &identity_request(&alice)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let record = app
            .mainnet
            .deposit(
                alice.mainnet_address(),
                TokenDescriptor::eth(),
                TokenValue::amount(U256::from(100)),
            )
            .await
            .unwrap();
        for key in &app.keys[..2] {
            let signature = sign_request(key, &deposit_request_hash(&record, &GATEWAY)).unwrap();
            let response = app
                .router
                .clone()
                .oneshot(post_json(
                    "/deposits",
                    &SubmitDepositRequest {
                        deposit: record.clone(),
                        signature: Bytes::from(signature.to_vec()),
                    },
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .router
            .clone()
            .oneshot(get_request(&format!("/withdrawals/{}/nonce", owner)))
            .await
            .unwrap();
        let next: NonceResponse = json(response).await;
        assert_eq!(next.nonce, 1);

        let value = TokenValue::amount(U256::from(30));
        let signature = alice
            .withdrawal_signature(&GATEWAY, &TokenDescriptor::eth(), &value, next.nonce)
            .unwrap();
        let withdrawal = WithdrawalRequest {
            owner,
            token: TokenDescriptor::eth(),
            value,
            nonce: next.nonce,
            signature: Bytes::from(signature.to_vec()),
        };
        let response = app
            .router
            .clone()
            .oneshot(post_json("/withdrawals", &withdrawal))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let receipt: WithdrawalReceipt = json(response).await;
        assert_eq!(receipt.nonce, 1);

        let response = app
            .router
            .clone()
            .oneshot(post_json("/withdrawals", &withdrawal))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorBody = json(response).await;
        assert_eq!(body.error, GatewayError::ReceiptBusy { owner });
        assert_eq!(body.kind, ErrorKind::Policy);

        let response = app
            .router
            .oneshot(get_request(&format!("/balances/{}", owner)))
            .await
            .unwrap();
        let balance: BalanceResponse = json(response).await;
        assert_eq!(balance.balance, U256::from(70));
    }

    #[tokio::test]
    async fn test_unsigned_requests_are_forbidden() {
        let app = app().await;
        let alice = TestUser::new(1).unwrap();
        let mallory = TestUser::new(9).unwrap();

        // Mallory's key in place of Alice's mainnet key
        let mut forged = identity_request(&alice);
        forged.mainnet_signature = identity_request(&mallory).mainnet_signature;
        let response = app
            .router
            .clone()
            .oneshot(post_json("/identities", &forged))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: ErrorBody = json(response).await;
        assert_eq!(body.error.code(), "SignerMismatch");

        // a deposit signed by a non-validator
        let record = app
            .mainnet
            .deposit(
                alice.mainnet_address(),
                TokenDescriptor::eth(),
                TokenValue::amount(U256::from(5)),
            )
            .await
            .unwrap();
        let signature =
            sign_request(&mallory.sidechain, &deposit_request_hash(&record, &GATEWAY)).unwrap();
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/deposits",
                &SubmitDepositRequest {
                    deposit: record.clone(),
                    signature: Bytes::from(signature.to_vec()),
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!app.gateway.is_credited(&record.tx_hash).await);

        // a clear signed by a non-validator
        let response = app
            .router
            .oneshot(post_json(
                &format!("/withdrawals/{}/clear", alice.sidechain_address()),
                &ClearRequest {
                    nonce: 1,
                    signature: Bytes::from(vec![0u8; 65]),
                },
            ))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_non_fungible_balance_by_token_id() {
        let app = app().await;
        let alice = TestUser::new(1).unwrap();
        let cards = TokenDescriptor::non_fungible(CARDS);
        app.gateway
            .mint(alice.sidechain_address(), cards, TokenValue::token_id(U256::from(7)))
            .await
            .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(get_request(&format!(
                "/balances/{}?contract={}&token_id=0x7",
                alice.sidechain_address(),
                CARDS
            )))
            .await
            .unwrap();
        let balance: BalanceResponse = json(response).await;
        assert_eq!(balance.contract, CARDS);
        assert_eq!(balance.token_id, U256::from(7));
        assert_eq!(balance.balance, U256::from(1));

        let response = app
            .router
            .oneshot(get_request(&format!(
                "/balances/{}?contract={}&token_id=0x8",
                alice.sidechain_address(),
                CARDS
            )))
            .await
            .unwrap();
        let balance: BalanceResponse = json(response).await;
        assert_eq!(balance.balance, U256::ZERO);
    }

    #[tokio::test]
    async fn test_hot_wallet_announcement_over_http() {
        let app = app().await;
        let alice = TestUser::new(1).unwrap();
        let tx_hash = TxHash::repeat_byte(0x31);
        let signature = sign_request(
            &alice.sidechain,
            &crate::auth::hot_wallet_request_hash(&alice.sidechain_address(), &tx_hash, &GATEWAY),
        )
        .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/deposits/hot-wallet",
                &HotWalletRequest {
                    owner: alice.sidechain_address(),
                    tx_hash,
                    signature: Bytes::from(signature.to_vec()),
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let entry: HotWalletEntry = json(response).await;

        let response = app
            .router
            .oneshot(get_request("/deposits/hot-wallet"))
            .await
            .unwrap();
        let pending: Vec<HotWalletEntry> = json(response).await;
        assert_eq!(pending, vec![entry]);
    }

    #[tokio::test]
    async fn test_missing_receipt_is_not_found() {
        let app = app().await;
        let owner = Address::repeat_byte(5);
        let response = app
            .router
            .oneshot(get_request(&format!("/withdrawals/{}", owner)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ErrorBody = json(response).await;
        assert_eq!(body.error.code(), "ReceiptNotFound");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&GatewayError::AlreadyProcessed {
                tx_hash: TxHash::ZERO
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&GatewayError::ChainUnavailable {
                reason: "down".to_string()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&GatewayError::DailyTotalExceeded {
                limit: U256::from(1),
                used: U256::ZERO,
                requested: U256::from(2)
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&GatewayError::SignerMismatch {
                expected: Address::ZERO,
                recovered: Address::repeat_byte(1)
            }),
            StatusCode::FORBIDDEN
        );
    }
}
