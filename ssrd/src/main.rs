//! Sonar Scan Runner - daemon
//!
//! Accepts scan requests over HTTP, runs each scan on its own
//! background task (clone, instrumented build, analysis), and serves
//! live status for every tracked scan.

#![forbid(unsafe_code)]

mod executor;
mod http_api;
mod registry;
mod runner;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use registry::ScanRegistry;
use ssr_common::SsrConfig;

#[derive(Parser)]
#[command(name = "ssrd")]
#[command(author, version, about = "Sonar scan runner daemon - asynchronous scan orchestration")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for the daily-rolling daemon log (stderr only when unset)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Keep the non-blocking writer guard alive for the process lifetime.
    let _log_guard = match cli.log_dir.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "ssrd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
            None
        }
    };

    info!("Starting scan runner daemon...");

    let mut config = SsrConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    info!(
        "Analysis server: {} (token {})",
        config.sonar.host_url,
        if config.sonar.token.is_empty() { "not set" } else { "configured" }
    );

    let context = http_api::ServiceContext {
        registry: Arc::new(ScanRegistry::new()),
        config: Arc::new(config),
        started_at: Instant::now(),
        version: env!("CARGO_PKG_VERSION"),
        pid: std::process::id(),
    };

    let addr: SocketAddr = format!("{}:{}", context.config.server.host, context.config.server.port)
        .parse()
        .context("invalid listen address")?;

    let router = http_api::create_router(context);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router).await?;
    Ok(())
}
