// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rollcall Server
//!
//! Standalone membership coordinator. Participants dial the poll endpoint and
//! answer every poll with their identity; observers dial the publish endpoint
//! and receive the membership set each time it changes.
//!
//! # Usage
//!
//! ```bash
//! # Default endpoints (poll 40007, publish 50007)
//! rollcall-server
//!
//! # Custom endpoints and timing
//! rollcall-server --poll tcp://0.0.0.0:41000 --publish tcp://0.0.0.0:51000 --poll-interval-ms 500
//!
//! # From a config file
//! rollcall-server --config rollcall.json
//! ```

use clap::Parser;
use rollcall::{DiscoveryServer, ServerConfig};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Rollcall Server - polls participants and publishes membership changes
#[derive(Parser, Debug)]
#[command(name = "rollcall-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Poll endpoint participants dial
    #[arg(long, default_value = "tcp://0.0.0.0:40007")]
    poll: String,

    /// Publish endpoint observers dial
    #[arg(long, default_value = "tcp://0.0.0.0:50007")]
    publish: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pause between two polls in milliseconds
    #[arg(long, default_value = "1000")]
    poll_interval_ms: u64,

    /// Quiet period that closes a poll round in milliseconds
    #[arg(long, default_value = "250")]
    reply_timeout_ms: u64,

    /// Hard limit on a poll round in milliseconds
    #[arg(long, default_value = "500")]
    survey_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load or build config
    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig {
            poll_endpoint: args.poll,
            publish_endpoint: args.publish,
            poll_interval_ms: args.poll_interval_ms,
            reply_timeout_ms: args.reply_timeout_ms,
            survey_timeout_ms: args.survey_timeout_ms,
            ..Default::default()
        }
    };

    let server = DiscoveryServer::bind(config.clone()).await?;
    let poll = server
        .poll_endpoint()
        .map(ToString::to_string)
        .unwrap_or(config.poll_endpoint);
    let publish = server
        .publish_endpoint()
        .map(ToString::to_string)
        .unwrap_or(config.publish_endpoint);

    info!("+----------------------------------------------------+");
    info!(
        "|       Rollcall Server v{}                       |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Poll:     {:39} |", poll);
    info!("|  Publish:  {:39} |", publish);
    info!(
        "|  Interval: {:39} |",
        format!("{}ms", config.poll_interval_ms)
    );
    info!(
        "|  Replies:  {:39} |",
        format!("{}ms quiet, {}ms max", config.reply_timeout_ms, config.survey_timeout_ms)
    );
    info!("+----------------------------------------------------+");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");
    server.shutdown().await;

    info!("Rollcall server stopped");
    Ok(())
}
