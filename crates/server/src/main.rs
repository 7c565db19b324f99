//! feedstock service binary
//!
//! Wires configuration, publisher, feed drivers and the scheduler
//! together, then runs until the HTTP server exits. Configuration and
//! wiring failures are fatal here; after startup all errors stay inside
//! the scheduler.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use feedstock_config::Config;
use feedstock_scheduler::Scheduler;

#[derive(Parser)]
#[command(
    name = "feedstock",
    version,
    about = "Polls package registries and publishes new release events"
)]
struct Cli {
    /// Path to the YAML configuration file. Without one, the built-in
    /// defaults poll the public firehose feeds and print to stdout.
    #[arg(short, long, env = "FEEDSTOCK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default_with_env(),
    };

    let publisher = config
        .publisher
        .to_publisher()
        .await
        .context("failed to initialize publisher from config")?;
    info!(publisher = publisher.name(), "using publisher");

    let feeds = config
        .scheduled_feeds()
        .context("failed to initialize feeds from config")?;
    let feed_names: Vec<&str> = feeds.keys().map(String::as_str).collect();
    info!(feeds = %feed_names.join(", "), "watching feeds");

    let initial_cutoff = config.initial_cutoff()?;
    let scheduler = Scheduler::new(feeds, publisher, config.http_port);
    scheduler.run(initial_cutoff, config.timer).await?;

    Ok(())
}
