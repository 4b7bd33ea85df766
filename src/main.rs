//! Execution Gateway Reconciliation Core binary.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin reconciliation-core
//! ```
//!
//! # Environment Variables
//!
//! - `POD_NAME`: label attached to every emitted metric (default: `unknown`)
//! - `RECONCILIATION_CONFIG`: path to the YAML config file (default: `config.yaml`)
//! - `RUST_LOG`: log level (default: info)
//!
//! Broker, store, and cache adapters are out of scope for this core (see
//! the crate-level docs); this binary wires `ReconciliationService` to
//! the in-memory reference adapters in `infra` so the cycle can be
//! observed end to end. A production deployment supplies its own
//! adapters implementing the `BrokerClient`, `Store`, and `Cache` traits.

use std::sync::Arc;

use anyhow::Context;
use reconciliation_core::infra::{MemoryBroker, MemoryCache, MemoryStore};
use reconciliation_core::{init_metrics, load_config, MetricsConfig, ReconciliationService};
use tokio::signal;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting execution gateway reconciliation core");

    let pod = std::env::var("POD_NAME").unwrap_or_else(|_| "unknown".to_string());
    let config_path = std::env::var("RECONCILIATION_CONFIG").ok();
    let app_config = load_config(config_path.as_deref()).context("failed to load configuration")?;

    let metrics_addr = app_config
        .metrics_listen_addr
        .parse()
        .context("failed to parse metrics_listen_addr")?;
    init_metrics(&MetricsConfig { listen_addr: metrics_addr }).context("failed to start metrics exporter")?;
    tracing::info!(%metrics_addr, "metrics exporter listening");

    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let state = Arc::new(reconciliation_core::ReconciliationState::new());

    let service = Arc::new(ReconciliationService::new(
        broker,
        store,
        cache,
        app_config.reconciliation,
        Arc::clone(&state),
        pod,
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    match service.run_startup_reconciliation().await {
        Ok(report) => {
            tracing::info!(
                applied = report.applied_updates,
                conflicts = report.conflicts_skipped,
                orphans = report.orphans_handled,
                "startup reconciliation complete"
            );
        }
        Err(err) => {
            tracing::error!(error = %err, "startup reconciliation failed");
        }
    }

    let periodic_service = Arc::clone(&service);
    let periodic_cancel = shutdown_tx.subscribe();
    let periodic_handle = tokio::spawn(async move {
        periodic_service.run_periodic_loop(periodic_cancel).await;
    });

    wait_for_shutdown_signal().await;
    state.stop();
    let _ = shutdown_tx.send(());

    if let Err(err) = periodic_handle.await {
        tracing::error!(error = %err, "periodic reconciliation task panicked");
    }

    tracing::info!("execution gateway reconciliation core stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
