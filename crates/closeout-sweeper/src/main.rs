//! # closeout-sweeper
//!
//! Sweeper service for ended competitive records.
//!
//! Runs the lifecycle pipeline on a schedule: delivers final leaderboards
//! for ended events, rounds, and tournament occurrences, and archives
//! expired rows to the object store.
//!
//! ## Modes
//!
//! - **Service Mode**: Runs continuously with HTTP health endpoints
//! - **CLI Mode**: One-shot invocation for debugging or manual triggers
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Shallow liveness check (always 200)
//! - `GET /ready` - Readiness check with sweep health status
//!
//! ## Usage
//!
//! ```bash
//! # Run as service (default)
//! closeout-sweeper serve --port 8080
//!
//! # One-shot invocation
//! closeout-sweeper run
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::Mutex;

use closeout_core::observability::{init_logging, LogFormat};
use closeout_core::MemoryObjectStore;
use closeout_pipeline::client::HttpDelivery;
use closeout_pipeline::pipeline::{Pipeline, PipelineConfig};
use closeout_pipeline::store::memory::MemoryLiveStore;

/// Closeout lifecycle sweeper.
#[derive(Debug, Parser)]
#[command(name = "closeout-sweeper")]
#[command(about = "Delivers and archives ended competitive records")]
#[command(version)]
struct Args {
    /// Third-party ingest endpoint for final leaderboards.
    #[arg(long, env = "CLOSEOUT_INGEST_URI", global = true)]
    ingest_uri: Option<String>,

    /// Header carrying the ingest API key.
    #[arg(
        long,
        env = "CLOSEOUT_API_KEY_HEADER",
        default_value = "x-api-key",
        global = true
    )]
    api_key_header: String,

    /// Ingest API key.
    #[arg(long, env = "CLOSEOUT_API_KEY", global = true)]
    api_key: Option<String>,

    /// Object-store prefix for archive artifacts.
    #[arg(long, env = "CLOSEOUT_ARCHIVE_ROOT", default_value = "archive", global = true)]
    archive_root: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run as a service with health endpoints.
    Serve {
        /// HTTP port for health endpoints.
        #[arg(long, env = "CLOSEOUT_PORT", default_value = "8080")]
        port: u16,

        /// Sweep interval in seconds.
        #[arg(long, env = "CLOSEOUT_INTERVAL_SECS", default_value = "300")]
        interval_secs: u64,

        /// Maximum time without a successful sweep before unhealthy (seconds).
        #[arg(
            long,
            env = "CLOSEOUT_UNHEALTHY_THRESHOLD_SECS",
            default_value = "900"
        )]
        unhealthy_threshold_secs: u64,
    },

    /// Run a single sweep and exit.
    Run,
}

/// Shared state for tracking sweep health.
#[derive(Debug)]
struct SweeperState {
    /// Whether the service is ready to accept traffic.
    ready: AtomicBool,
    /// Unix timestamp of the last successful sweep.
    last_successful_sweep_ts: AtomicU64,
    /// Total successful sweeps.
    successful_sweeps: AtomicU64,
    /// Total failed sweeps.
    failed_sweeps: AtomicU64,
    /// Whether a sweep is currently running.
    sweep_in_progress: AtomicBool,
    /// Serializes sweeps within this process.
    sweep_lock: Mutex<()>,
    /// Threshold (seconds) before marking unhealthy.
    unhealthy_threshold_secs: u64,
}

impl SweeperState {
    fn new(unhealthy_threshold_secs: u64) -> Self {
        Self {
            ready: AtomicBool::new(false),
            last_successful_sweep_ts: AtomicU64::new(0),
            successful_sweeps: AtomicU64::new(0),
            failed_sweeps: AtomicU64::new(0),
            sweep_in_progress: AtomicBool::new(false),
            sweep_lock: Mutex::new(()),
            unhealthy_threshold_secs,
        }
    }

    fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    fn record_success(&self) {
        let now: u64 = Utc::now().timestamp().try_into().unwrap_or_default();
        self.last_successful_sweep_ts.store(now, Ordering::Release);
        self.successful_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    fn is_healthy(&self) -> bool {
        if !self.ready.load(Ordering::Acquire) {
            return false;
        }

        let last = self.last_successful_sweep_ts.load(Ordering::Acquire);
        if last == 0 {
            return false;
        }

        let now: u64 = Utc::now().timestamp().try_into().unwrap_or_default();
        now.saturating_sub(last) < self.unhealthy_threshold_secs
    }

    fn last_successful_sweep(&self) -> Option<DateTime<Utc>> {
        let ts = self.last_successful_sweep_ts.load(Ordering::Acquire);
        if ts == 0 {
            None
        } else {
            DateTime::from_timestamp(i64::try_from(ts).ok()?, 0)
        }
    }
}

/// Shared state for HTTP handlers.
#[derive(Clone)]
struct ServiceState {
    sweeper: Arc<SweeperState>,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
struct ReadyResponse {
    ready: bool,
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_successful_sweep: Option<String>,
    successful_sweeps: u64,
    failed_sweeps: u64,
    sweep_in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// GET /health - Shallow liveness check.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready - Readiness check with sweep health.
async fn ready(State(state): State<Arc<ServiceState>>) -> impl IntoResponse {
    let ready = state.sweeper.ready.load(Ordering::Acquire);
    let healthy = state.sweeper.is_healthy();
    let successful_sweeps = state.sweeper.successful_sweeps.load(Ordering::Relaxed);
    let failed_sweeps = state.sweeper.failed_sweeps.load(Ordering::Relaxed);
    let sweep_in_progress = state.sweeper.sweep_in_progress.load(Ordering::Acquire);

    let message = if !ready {
        Some("Service starting up".to_string())
    } else if successful_sweeps == 0 {
        Some("Waiting for first successful sweep".to_string())
    } else if !healthy {
        Some(format!(
            "No successful sweep in {} seconds",
            state.sweeper.unhealthy_threshold_secs
        ))
    } else {
        None
    };

    let status = if ready && healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            healthy,
            last_successful_sweep: state
                .sweeper
                .last_successful_sweep()
                .map(|dt| dt.to_rfc3339()),
            successful_sweeps,
            failed_sweeps,
            sweep_in_progress,
            message,
        }),
    )
}

/// Builds a pipeline over the in-memory backends.
///
/// Local/dev wiring; production embedders construct [`Pipeline`] with real
/// store adapters through the library API.
fn build_pipeline(args: &Args) -> Result<Pipeline> {
    let ingest_uri = args
        .ingest_uri
        .clone()
        .context("missing CLOSEOUT_INGEST_URI")?;
    let api_key = args.api_key.clone().context("missing CLOSEOUT_API_KEY")?;

    let delivery = HttpDelivery::new(ingest_uri, &args.api_key_header, &api_key)
        .context("building delivery client")?;

    let config = PipelineConfig {
        archive_root: args.archive_root.clone(),
        ..PipelineConfig::default()
    };

    Ok(Pipeline::new(
        Arc::new(MemoryLiveStore::new()),
        Arc::new(MemoryObjectStore::new()),
        Arc::new(delivery),
        config,
    ))
}

/// Runs the sweep loop in service mode.
async fn run_sweep_loop(pipeline: Arc<Pipeline>, state: Arc<SweeperState>, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);

    // The first tick completes immediately; a sweep runs right away so
    // readiness can become healthy without waiting a full interval.
    interval_timer.tick().await;
    state.mark_ready();
    tracing::info!("Sweeper ready, starting sweep loop");

    loop {
        run_sweep_guarded(&pipeline, &state).await;
        interval_timer.tick().await;
    }
}

async fn run_sweep_guarded(pipeline: &Pipeline, state: &SweeperState) {
    let _guard = state.sweep_lock.lock().await;
    state.sweep_in_progress.store(true, Ordering::Release);

    match pipeline.run().await {
        Ok(summary) if summary.errors.is_empty() => {
            state.record_success();
            tracing::info!(
                delivered = summary.delivered(),
                archived_rows = summary.archive.rows,
                lock_skipped = summary.lock_skipped,
                "Sweep completed"
            );
        }
        Ok(summary) => {
            state.record_failure();
            tracing::error!(errors = ?summary.errors, "Sweep completed with errors");
        }
        Err(e) => {
            state.record_failure();
            tracing::error!(error = %e, "Sweep failed");
        }
    }

    state.sweep_in_progress.store(false, Ordering::Release);
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Serve {
            port,
            interval_secs,
            unhealthy_threshold_secs,
        } => {
            init_logging(LogFormat::Json);

            let pipeline = Arc::new(build_pipeline(&args)?);

            tracing::info!(
                port,
                interval_secs,
                unhealthy_threshold_secs,
                "Starting sweeper service"
            );

            let sweeper_state = Arc::new(SweeperState::new(unhealthy_threshold_secs));
            let state = Arc::new(ServiceState {
                sweeper: Arc::clone(&sweeper_state),
            });

            let router = Router::new()
                .route("/health", get(health))
                .route("/ready", get(ready))
                .with_state(Arc::clone(&state));

            let loop_state = Arc::clone(&sweeper_state);
            let interval = Duration::from_secs(interval_secs);
            tokio::spawn(async move {
                run_sweep_loop(pipeline, loop_state, interval).await;
            });

            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            tracing::info!(address = %addr, "Starting health server");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }

        Commands::Run => {
            init_logging(LogFormat::Pretty);

            let pipeline = build_pipeline(&args)?;
            let summary = pipeline.run().await?;

            tracing::info!(
                delivered = summary.delivered(),
                archived_rows = summary.archive.rows,
                failed = summary.failed(),
                lock_skipped = summary.lock_skipped,
                "Sweep complete"
            );

            if !summary.errors.is_empty() {
                anyhow::bail!("sweep finished with errors: {:?}", summary.errors);
            }
        }
    }

    Ok(())
}
