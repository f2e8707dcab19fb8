//! Branded clip worker binary.
//!
//! Reads a batch request as JSON (from the file given as the first argument,
//! or stdin) and writes one JSON event per line to stdout. Ctrl-C cancels
//! the clip in flight and ends the batch.

use std::io::Read;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bclip_models::BatchRequest;
use bclip_worker::{run_batch, ClipPipeline, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive(
        "bclip=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );

    // Logs go to stderr; stdout carries the event stream.
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> Result<()> {
    info!("Starting bclip-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", redacted(&config));
    config
        .prepare_dirs()
        .await
        .context("failed to create working directories")?;

    let request = read_request()?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    let pipeline = ClipPipeline::new(config);
    let summary = run_batch(&pipeline, &request, Some(cancel_rx), |event| {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize {} event: {}", event.name(), e),
        }
    })
    .await
    .context("batch rejected")?;

    info!(
        completed = summary.completed,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "Worker shutdown complete"
    );
    Ok(())
}

fn read_request() -> Result<BatchRequest> {
    let raw = match std::env::args().nth(1) {
        Some(path) if path != "-" => {
            std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path))?
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("invalid batch request JSON")
}

/// Config for logging, without the API key.
fn redacted(config: &WorkerConfig) -> WorkerConfig {
    let mut config = config.clone();
    if config.cohere_api_key.is_some() {
        config.cohere_api_key = Some("***".to_string());
    }
    config
}
