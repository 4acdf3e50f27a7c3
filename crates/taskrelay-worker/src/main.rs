//! taskrelay worker binary.
//!
//! Wires the SQS queue and the PostgreSQL status store into the worker
//! loop, then runs until SIGINT or SIGTERM. Shutdown is graceful: the loop
//! finishes the delivery in flight, bounded by a grace period.

mod config;
mod handlers;

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use taskrelay_core::{StatusStore, Worker, WorkerId};
use taskrelay_sqlx::PgStatusStore;
use taskrelay_sqs::SqsQueue;

use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // configuration errors are fatal before anything connects
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(error = %error, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    let store = match PgStatusStore::connect(&config.database_url).await {
        Ok(store) => store,
        Err(error) => {
            tracing::error!(error = %error, "cannot connect to the status store");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = store.migrate().await {
        tracing::error!(error = %error, "status store migration failed");
        return ExitCode::FAILURE;
    }
    let store = Arc::new(store);

    let queue = Arc::new(SqsQueue::connect(config.aws_region.clone(), config.queue_url.clone()).await);

    let registry = match handlers::registry() {
        Ok(registry) => Arc::new(registry),
        Err(error) => {
            tracing::error!(error = %error, "handler registry assembly failed");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(task_types = ?registry.registered_types(), "handlers registered");

    let worker = Worker::new(
        queue,
        store.clone(),
        registry,
        WorkerId::generate(),
        config.worker_config(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut join = tokio::spawn(async move { worker.run(shutdown_rx).await });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(config.shutdown_grace, &mut join)
        .await
        .is_err()
    {
        tracing::warn!("grace period expired before the worker drained, aborting");
        join.abort();
    }

    match store.counts().await {
        Ok(counts) => tracing::info!(
            processing = counts.processing,
            completed = counts.completed,
            failed = counts.failed,
            "task counts at shutdown"
        ),
        Err(error) => tracing::warn!(error = %error, "could not read task counts at shutdown"),
    }
    store.close().await;

    ExitCode::SUCCESS
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(error) => {
                tracing::warn!(error = %error, "cannot install SIGTERM handler, SIGINT only");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    let _ = ctrl_c.await;
}
