// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! rollcall-agent - Join a rollcall domain and echo membership changes
//!
//! With `--identity` the agent answers polls as a participant. With
//! `--publish` it prints every membership snapshot it receives. Without an
//! identity it only observes. `--config` loads a participant configuration
//! (JSON) instead of the endpoint and identity flags.

use chrono::Local;
use clap::Parser;
use rollcall::{Changes, ClientConfig, DiscoveryClient, Snapshot, Subscriber, SubscriberOptions};
use scope::Scope;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Join a rollcall domain and echo membership changes
#[derive(Parser, Debug)]
#[command(name = "rollcall-agent")]
#[command(version = "0.1.0")]
#[command(about = "Answer rollcall polls and print membership changes")]
struct Args {
    /// Poll endpoint of the coordinator
    #[arg(short, long, default_value = "tcp://127.0.0.1:40007")]
    server: String,

    /// Publish endpoint of the coordinator (enables printing)
    #[arg(short, long)]
    publish: Option<String>,

    /// Identity to answer polls with (observe only when absent)
    #[arg(short, long)]
    identity: Option<String>,

    /// Stop after this many snapshots (0 = unlimited)
    #[arg(short = 'n', long, default_value = "0")]
    count: u64,

    /// Print snapshots as JSON lines
    #[arg(long)]
    json: bool,

    /// Snapshots buffered before new ones are discarded
    #[arg(long, default_value = "8")]
    capacity: usize,

    /// Participant configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

mod scope {
    //! Keeps either a joined client or a bare subscriber alive.

    use rollcall::{Changes, DiscoveryClient, Subscriber};

    pub enum Scope {
        Client(DiscoveryClient),
        Observer(Subscriber),
    }

    impl Scope {
        /// Snapshot stream, if this scope has one.
        pub fn changes(&mut self) -> Option<&mut Changes> {
            match self {
                Scope::Client(client) => client.peers().ok(),
                Scope::Observer(subscriber) => Some(subscriber.changes()),
            }
        }

        pub async fn shutdown(self) {
            match self {
                Scope::Client(client) => client.shutdown().await,
                Scope::Observer(subscriber) => subscriber.shutdown().await,
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,rollcall_agent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match (&args.config, &args.identity) {
        (Some(path), _) => {
            info!("Loading config from {:?}", path);
            Some(ClientConfig::from_file(path)?)
        }
        (None, Some(identity)) => {
            let mut config = ClientConfig::new(&args.server, identity);
            config.subscriber_capacity = args.capacity;
            if let Some(publish) = &args.publish {
                config = config.with_subscriber(publish);
            }
            Some(config)
        }
        (None, None) => None,
    };
    let prints = config
        .as_ref()
        .map_or(args.publish.is_some(), |c| c.publish_endpoint.is_some());

    let mut scope = match config {
        Some(config) => {
            info!("Joining {} as {}", config.poll_endpoint, config.identity);
            Scope::Client(DiscoveryClient::connect(config).await?)
        }
        None => {
            let publish = args
                .publish
                .as_deref()
                .ok_or("one of --identity, --config or --publish is required")?;
            let options = SubscriberOptions {
                capacity: args.capacity,
                ..Default::default()
            };
            let root = CancellationToken::new();
            info!("Observing {}", publish);
            Scope::Observer(Subscriber::connect(publish, &root, options).await?)
        }
    };
    eprintln!("Press Ctrl+C to stop");
    eprintln!();

    let mut seen = 0u64;
    match scope.changes() {
        Some(changes) => {
            seen = echo(changes, &args).await;
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    scope.shutdown().await;
    if prints {
        eprintln!("\n--- Received {} snapshot(s)", seen);
    }
    Ok(())
}

/// Print snapshots until Ctrl+C, end of stream or `--count`.
async fn echo(changes: &mut Changes, args: &Args) -> u64 {
    let mut seen = 0u64;
    loop {
        let next = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = changes.recv() => next,
        };
        let Some(snapshot) = next else { break };

        seen += 1;
        print_snapshot(&snapshot, args.json, seen);
        if args.count > 0 && seen >= args.count {
            break;
        }
    }
    seen
}

fn print_snapshot(snapshot: &Snapshot, json: bool, seq: u64) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

    if json {
        let line = serde_json::json!({
            "seq": seq,
            "timestamp": timestamp.to_string(),
            "members": snapshot.identities(),
        });
        println!("{}", line);
    } else {
        println!(
            "[{}] #{} {} member(s): {}",
            timestamp,
            seq,
            snapshot.len(),
            snapshot
        );
    }
}
