//! Sidechain gateway node
//!
//! Serves the sidechain ledger over HTTP. Oracles submit deposits, signature
//! shares and receipt clears; users map identities, request withdrawals and
//! fetch the aggregated signature to present on mainnet.

use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use tracing::{error, info, warn};

use transfer_gateway::config::{Config, LogFormat};
use transfer_gateway::evm::EvmEventSource;
use transfer_gateway::store::{postgres, LedgerStore, MemoryStore, PgStore};
use transfer_gateway::{api, SidechainGateway};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    let config = Config::load()?;
    init_logging(config.log_format);

    info!("Starting transfer gateway node");
    info!(
        mainnet_gateway = %config.mainnet.gateway_address,
        min_confirmations = config.gateway.min_confirmations,
        genesis_validators = config.gateway.genesis_validators.len(),
        persistent = config.database.is_some(),
        "Configuration loaded"
    );

    let store: Arc<dyn LedgerStore> = match &config.database {
        Some(db) => {
            let pool = postgres::create_pool(&db.url).await?;
            info!("Database connected");
            postgres::run_migrations(&pool).await?;
            info!("Database migrations complete");
            Arc::new(PgStore::new(pool))
        }
        None => {
            info!("DATABASE_URL not set, ledger kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let source = Arc::new(EvmEventSource::new(
        &config.mainnet.rpc_url,
        config.mainnet.gateway_address,
    )?);

    let gateway = SidechainGateway::open(
        config.gateway_params(),
        config.genesis_set()?,
        store,
        source,
    )
    .await
    .wrap_err("Failed to open sidechain ledger")?;
    let gateway = Arc::new(gateway);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    let pruner = tokio::spawn(prune_hot_wallet_loop(
        gateway.clone(),
        Duration::from_secs(config.gateway.hot_wallet_prune_interval_secs),
    ));

    tokio::select! {
        result = api::start_server(&config.api.bind_address, config.api.port, gateway) => {
            if let Err(e) = result {
                error!(error = %e, "API server error");
                return Err(e);
            }
        }
        _ = shutdown_rx.recv() => {}
    }
    pruner.abort();

    info!("Transfer gateway node stopped");
    Ok(())
}

/// Drop lapsed hot-wallet announcements on a fixed interval
async fn prune_hot_wallet_loop(gateway: Arc<SidechainGateway>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = gateway.prune_hot_wallet().await {
            warn!(error = %e, "Hot-wallet prune failed, retrying next interval");
        }
    }
}

/// Initialize tracing/logging with structured output
fn init_logging(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,transfer_gateway=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
