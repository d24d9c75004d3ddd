use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use kycsync_contract::ArtifactKind;
use kycsync_delivery::{InMemoryDeliveryBridge, StaticConnectivity};
use kycsync_queue::{Collaborators, FlushWorker, SyncQueueManager};
use kycsync_storage::{SqliteKvStore, StorageConfig};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

mod config;

use config::RuntimeConfig;

#[derive(Debug, Parser)]
#[command(author, version, about = "Offline-first KYC artifact sync queue")]
struct Cli {
    #[arg(long, global = true, default_value = "config/kycsyncd.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store an artifact and queue it for delivery.
    Record {
        #[arg(long)]
        kind: ArtifactKind,
        /// JSON payload, stored as given.
        #[arg(long)]
        payload: String,
        /// Run a foreground flush after recording.
        #[arg(long)]
        flush: bool,
    },
    Flush,
    Status,
    Records {
        #[arg(long)]
        kind: Option<ArtifactKind>,
    },
    Clear,
    /// Flush periodically until Ctrl-C.
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = RuntimeConfig::load(&cli.config)?;
    let long_running = matches!(cli.command, Command::Run);
    let manager = build_manager(&config, long_running).await?;

    match cli.command {
        Command::Record {
            kind,
            payload,
            flush,
        } => {
            let payload: Value =
                serde_json::from_str(&payload).context("payload must be valid JSON")?;
            let record_id = manager.record_artifact(kind, payload).await?;
            if flush {
                let report = manager.flush().await;
                print_json(&serde_json::json!({ "record_id": record_id, "flush": report }))
            } else {
                print_json(&serde_json::json!({ "record_id": record_id }))
            }
        }
        Command::Flush => print_json(&manager.flush().await),
        Command::Status => print_json(&manager.status().await?),
        Command::Records { kind } => {
            let records: Vec<_> = manager
                .records()
                .await?
                .into_iter()
                .filter(|record| kind.map_or(true, |kind| record.kind == kind))
                .collect();
            print_json(&records)
        }
        Command::Clear => {
            manager.clear_all().await?;
            print_json(&serde_json::json!({ "status": "cleared" }))
        }
        Command::Run => run(manager, &config).await,
    }
}

async fn build_manager(config: &RuntimeConfig, flush_on_record: bool) -> Result<SyncQueueManager> {
    if let Some(parent) = std::path::Path::new(&config.storage.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let store = SqliteKvStore::connect(&StorageConfig {
        sqlite_path: config.storage.sqlite_path.clone(),
    })
    .await?;

    let delivery = if config.delivery.accept {
        InMemoryDeliveryBridge::accepting()
    } else {
        warn!("delivery backend configured to reject every submission");
        InMemoryDeliveryBridge::rejecting("ingestion disabled by configuration")
    };

    let collaborators = Collaborators::new(
        Arc::new(store),
        Arc::new(delivery),
        Arc::new(StaticConnectivity::new(config.connectivity.online)),
    );
    Ok(SyncQueueManager::new(
        collaborators,
        config.queue_config(flush_on_record),
    ))
}

async fn run(manager: SyncQueueManager, config: &RuntimeConfig) -> Result<()> {
    let mut events = BroadcastStream::new(manager.subscribe());
    tokio::spawn(async move {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => info!(event = ?event, "sync event"),
                Err(err) => warn!(error = %err, "sync event stream lagged"),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = FlushWorker::new(manager, config.flush_interval()).spawn(shutdown_rx);

    info!(sqlite_path = %config.storage.sqlite_path, "kycsyncd flush worker running");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutdown requested");
    if shutdown_tx.send(true).is_err() {
        warn!("flush worker already stopped");
    }
    let runs = worker.await.context("flush worker panicked")?;
    info!(runs, "kycsyncd stopped");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
