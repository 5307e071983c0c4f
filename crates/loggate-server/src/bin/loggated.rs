//! loggated - the loggate ingestion daemon.
//!
//! Loads the config, verifies log paths, binds the listener, and serves
//! until Ctrl-C, then drains in-flight connections before exiting.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use loggate_config::Config;
use loggate_server::{ClientHandler, Server};

/// TCP log ingestion gateway with abuse prevention.
#[derive(Parser)]
#[command(name = "loggated")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    tracing::info!(path = %cli.config.display(), "configuration loaded");

    let handler = Arc::new(ClientHandler::new(&config)?);
    let (server, shutdown) = Server::bind(&config.server.address(), handler).await?;
    let server_task = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    shutdown.shutdown();
    server_task.await??;

    tracing::info!("server shut down");
    Ok(())
}
