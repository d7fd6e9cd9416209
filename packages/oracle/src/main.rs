//! Transfer Oracle Node
//!
//! Runs one validator's oracle against a gateway node and a mainnet RPC
//! endpoint:
//! 1. Deposit scan credits confirmed mainnet deposits on the sidechain
//! 2. Signature scan signs outstanding withdrawal receipts
//! 3. Clear scan clears receipts whose release executed on mainnet
//!
//! Each oracle works alone; quorum emerges from the validators' independent
//! signature shares on the gateway.

use std::sync::Arc;

use eyre::WrapErr;
use tokio::sync::RwLock;
use tracing::{error, info};

use oracle::config::Config;
use oracle::server::{self, Metrics, OracleStats};
use oracle::tasks::{BlockCursor, ClearScanner, DepositScanner, OracleContext, SignatureScanner};
use oracle::{HttpSidechainClient, OracleTask, TaskRunner};
use transfer_gateway::evm::EvmEventSource;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    let config = Config::load()?;
    init_logging(config.json_logs);

    info!("Starting Transfer Oracle Node");

    let signer = config.signer()?;
    info!(
        oracle_id = %config.oracle_id,
        validator = %signer.address(),
        gateway_api = %config.gateway_api_url,
        mainnet_rpc = %config.mainnet_rpc_url,
        mainnet_gateway = %config.mainnet_gateway_address,
        min_confirmations = config.min_confirmations,
        "Configuration loaded"
    );

    let source = EvmEventSource::new(&config.mainnet_rpc_url, config.mainnet_gateway_address)?;
    let client = HttpSidechainClient::new(&config.gateway_api_url)
        .wrap_err("Failed to build gateway node client")?;

    let ctx = OracleContext {
        signer: signer.clone(),
        client: Arc::new(client),
        source: Arc::new(source),
        mainnet_gateway: config.mainnet_gateway_address,
        min_confirmations: config.min_confirmations,
    };
    let cursor = || {
        BlockCursor::new(
            config.start_block,
            config.lookback_blocks,
            config.max_scan_blocks,
        )
    };
    let tasks: Vec<Box<dyn OracleTask>> = vec![
        Box::new(DepositScanner::new(ctx.clone(), cursor())),
        Box::new(SignatureScanner::new(ctx.clone())),
        Box::new(ClearScanner::new(ctx, cursor())),
    ];

    let stats = Arc::new(RwLock::new(OracleStats {
        oracle_id: config.oracle_id.clone(),
        validator: signer.address().to_string(),
        ..Default::default()
    }));
    let metrics = Arc::new(Metrics::new().wrap_err("Failed to register metrics")?);

    {
        let stats = stats.clone();
        let metrics = metrics.clone();
        let bind = config.health_bind_address.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = server::start_server(&bind, port, stats, metrics).await {
                error!(error = %e, "Health server stopped");
            }
        });
    }

    let mut runner = TaskRunner::new(tasks, config.poll_interval(), stats, metrics);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle signals
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    runner.run(shutdown_rx).await?;

    info!("Transfer Oracle stopped");
    Ok(())
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,oracle=debug,transfer_gateway=info"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

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
            Ok(mut sig) => {
                sig.recv().await;
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
