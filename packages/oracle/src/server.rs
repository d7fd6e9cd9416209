//! HTTP server for health and metrics endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

/// Oracle statistics shared between the runner and the HTTP server
#[derive(Debug, Default, Clone, Serialize)]
pub struct OracleStats {
    /// Oracle instance ID
    pub oracle_id: String,
    /// Validator address this oracle signs for
    pub validator: String,
    /// Completed runner cycles
    pub cycles: u64,
    pub deposits_submitted: u64,
    pub signatures_submitted: u64,
    pub receipts_cleared: u64,
    /// Submissions whose effect another oracle had already applied
    pub already_applied: u64,
    pub rejected: u64,
    /// Next mainnet block the deposit scan will read
    pub deposit_checkpoint: u64,
    /// Next mainnet block the clear scan will read
    pub clear_checkpoint: u64,
}

/// Prometheus metrics
pub struct Metrics {
    /// Submissions by task and result (submitted, already_applied, rejected, deferred)
    pub submissions_total: IntCounterVec,
    /// Failed steps by task
    pub step_failures_total: IntCounterVec,
    /// Times a task's circuit breaker tripped
    pub circuit_breaker_trips_total: IntCounter,
    /// Consecutive failed steps per task
    pub consecutive_failures: IntGaugeVec,
    pub deposit_checkpoint: IntGauge,
    pub clear_checkpoint: IntGauge,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let submissions_total = IntCounterVec::new(
            Opts::new(
                "oracle_submissions_total",
                "Gateway submissions by task and result",
            ),
            &["task", "result"],
        )?;
        let step_failures_total = IntCounterVec::new(
            Opts::new("oracle_step_failures_total", "Failed task steps"),
            &["task"],
        )?;
        let circuit_breaker_trips_total = IntCounter::new(
            "oracle_circuit_breaker_trips_total",
            "Times a task circuit breaker tripped",
        )?;
        let consecutive_failures = IntGaugeVec::new(
            Opts::new(
                "oracle_task_consecutive_failures",
                "Consecutive failed steps per task",
            ),
            &["task"],
        )?;
        let deposit_checkpoint = IntGauge::new(
            "oracle_deposit_checkpoint_block",
            "Next mainnet block the deposit scan will read",
        )?;
        let clear_checkpoint = IntGauge::new(
            "oracle_clear_checkpoint_block",
            "Next mainnet block the clear scan will read",
        )?;

        registry.register(Box::new(submissions_total.clone()))?;
        registry.register(Box::new(step_failures_total.clone()))?;
        registry.register(Box::new(circuit_breaker_trips_total.clone()))?;
        registry.register(Box::new(consecutive_failures.clone()))?;
        registry.register(Box::new(deposit_checkpoint.clone()))?;
        registry.register(Box::new(clear_checkpoint.clone()))?;

        Ok(Self {
            submissions_total,
            step_failures_total,
            circuit_breaker_trips_total,
            consecutive_failures,
            deposit_checkpoint,
            clear_checkpoint,
            registry,
        })
    }
}

/// Shared state for the HTTP server
pub type SharedStats = Arc<RwLock<OracleStats>>;
pub type SharedMetrics = Arc<Metrics>;

/// Combined app state
#[derive(Clone)]
pub struct AppState {
    pub stats: SharedStats,
    pub metrics: SharedMetrics,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(flatten)]
    stats: OracleStats,
}

/// Health check endpoint handler
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.stats.read().await.clone();
    Json(HealthResponse {
        status: "healthy",
        stats,
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness probe: ready once the runner has completed a cycle
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.stats.read().await.cycles > 0 {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

/// Prometheus metrics endpoint
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}

pub fn router(stats: SharedStats, metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(AppState { stats, metrics })
}

/// Start the HTTP server for health and metrics
pub async fn start_server(
    bind_address: &str,
    port: u16,
    stats: SharedStats,
    metrics: SharedMetrics,
) -> eyre::Result<()> {
    let app = router(stats, metrics);

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Health server listening on {}", addr);
    info!("  /health  - Full health status (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let metrics = Metrics::new().unwrap();
        metrics
            .submissions_total
            .with_label_values(&["deposit_scan", "submitted"])
            .inc();
        let families = metrics.registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "oracle_submissions_total"));
    }

    #[tokio::test]
    async fn test_readiness_after_first_cycle() {
        let stats: SharedStats = Arc::new(RwLock::new(OracleStats::default()));
        let state = AppState {
            stats: stats.clone(),
            metrics: Arc::new(Metrics::new().unwrap()),
        };
        assert_eq!(
            readiness(State(state.clone())).await.0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        stats.write().await.cycles = 1;
        assert_eq!(readiness(State(state)).await.0, StatusCode::OK);
    }
}
