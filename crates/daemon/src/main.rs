//! Perfscope daemon - Main Entry Point
//! JSON-RPC job control surface over the analysis orchestrator.

mod config;
mod wiring;

use anyhow::{Context, Result};
use config::{Config, LogFormat};
use perfscope_api_rpc::{RpcServer, RpcServerConfig};
use perfscope_core::application::RecoveryService;
use perfscope_core::port::id_provider::UuidProvider;
use perfscope_core::port::time_provider::SystemTimeProvider;
use perfscope_core::port::{IdProvider, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(format: &LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("perfscope=info"))
        .context("Failed to create env filter")?;

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = Config::from_env().context("Invalid configuration")?;
    init_logging(&config.log_format)?;
    info!("Perfscope daemon v{} starting...", VERSION);

    // 2. Providers and store
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);
    let store = wiring::build_store(&config, id_provider, time_provider.clone()).await?;

    // 3. Recover jobs interrupted by the previous run
    let recovered = RecoveryService::new(store.clone(), time_provider.clone())
        .recover_interrupted_jobs()
        .await
        .context("Job recovery failed")?;
    if recovered > 0 {
        warn!(recovered, "Marked interrupted jobs as failed");
    }

    // 4. Orchestrator
    let orchestrator = wiring::build_orchestrator(&config, store, time_provider)?;

    // 5. JSON-RPC server
    let rpc_server = RpcServer::new(
        RpcServerConfig {
            host: config.rpc_host.clone(),
            port: config.rpc_port,
        },
        orchestrator.clone(),
    );
    let (addr, rpc_handle) = rpc_server.start().await.context("RPC server start failed")?;
    info!(addr = %addr, "System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: stop accepting calls, then cancel in-flight jobs
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    orchestrator.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), rpc_handle.stopped()).await;

    info!("Shutdown complete.");
    Ok(())
}
