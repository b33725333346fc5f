//! Lumen bridge — entry point.
//!
//! This binary keeps a pool of TCP connections to a lighting gateway's
//! command port, one connection to its broadcast event port, and republishes
//! level changes to a message broker while consuming `set`/`adjust` commands
//! from it.
//!
//! # Usage
//!
//! ```text
//! lumen-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>             Optional TOML configuration file
//!   --gateway-host <HOST>       Gateway IP address
//!   --command-port <PORT>       Gateway command port
//!   --event-port <PORT>         Gateway event port
//!   --pool-size <N>             Pooled command connections
//!   --min-healthy <N>           Healthy connections required for readiness
//!   --queue-interval-ms <MS>    Spacing between dispatched commands
//!   --queue-max <N>             Command queue capacity (0 = unbounded)
//!   --topic-prefix <PREFIX>     Leading broker topic segment
//! ```
//!
//! # Environment variable overrides
//!
//! Every flag can also come from the environment; the CLI value wins when
//! both are present, and both win over the config file.
//!
//! | Variable                 | Description                       |
//! |--------------------------|-----------------------------------|
//! | `LUMEN_CONFIG`           | Path to the TOML configuration    |
//! | `LUMEN_GATEWAY_HOST`     | Gateway IP address                |
//! | `LUMEN_COMMAND_PORT`     | Gateway command port              |
//! | `LUMEN_EVENT_PORT`       | Gateway event port                |
//! | `LUMEN_POOL_SIZE`        | Pooled command connections        |
//! | `LUMEN_MIN_HEALTHY`      | Healthy connections for readiness |
//! | `LUMEN_QUEUE_INTERVAL_MS`| Command spacing in milliseconds   |
//! | `LUMEN_QUEUE_MAX`        | Command queue capacity            |
//! | `LUMEN_TOPIC_PREFIX`     | Leading broker topic segment      |
//!
//! # Architecture overview
//!
//! ```text
//! Message broker  (level topics out, set/adjust topics in)
//!       ↕
//! lumen-bridge  ← this process
//!   domain/          Command, BridgeConfig
//!   application/     Orchestrator, correlation engine
//!   infrastructure/  Connection pool, throttled queue, broker link
//!       ↕
//! Lighting gateway  (line protocol over TCP, command + event ports)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use lumen_bridge::application::Bridge;
use lumen_bridge::domain::{BridgeConfig, FileConfig};
use lumen_bridge::infrastructure::LoggingBrokerLink;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Gateway-to-broker lighting bridge.
///
/// Every option is optional: values default from the config file (when one
/// is given) or from the built-in defaults, and CLI/environment values
/// override both.
#[derive(Debug, Parser)]
#[command(
    name = "lumen-bridge",
    about = "Bridges a lighting gateway's line protocol to a message broker",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "LUMEN_CONFIG")]
    config: Option<PathBuf>,

    /// Gateway IP address.
    #[arg(long, env = "LUMEN_GATEWAY_HOST")]
    gateway_host: Option<String>,

    /// TCP port of the gateway's command protocol.
    #[arg(long, env = "LUMEN_COMMAND_PORT")]
    command_port: Option<u16>,

    /// TCP port of the gateway's broadcast event stream.
    #[arg(long, env = "LUMEN_EVENT_PORT")]
    event_port: Option<u16>,

    /// Number of pooled command connections.
    #[arg(long, env = "LUMEN_POOL_SIZE")]
    pool_size: Option<usize>,

    /// Healthy connections required before the bridge reports ready.
    #[arg(long, env = "LUMEN_MIN_HEALTHY")]
    min_healthy: Option<usize>,

    /// Minimum spacing between dispatched commands, in milliseconds.
    #[arg(long, env = "LUMEN_QUEUE_INTERVAL_MS")]
    queue_interval_ms: Option<u64>,

    /// Command queue capacity; 0 means unbounded.
    #[arg(long, env = "LUMEN_QUEUE_MAX")]
    queue_max: Option<usize>,

    /// Leading topic segment for published and consumed broker topics.
    #[arg(long, env = "LUMEN_TOPIC_PREFIX")]
    topic_prefix: Option<String>,
}

impl Cli {
    /// Builds the runtime configuration: config file first, then CLI and
    /// environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error when the config file cannot be read or parsed, or
    /// when the resulting gateway host/port pair is not a valid address.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let mut file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        if let Some(host) = self.gateway_host {
            file.gateway.host = host;
        }
        if let Some(port) = self.command_port {
            file.gateway.command_port = port;
        }
        if let Some(port) = self.event_port {
            file.gateway.event_port = port;
        }
        if let Some(size) = self.pool_size {
            file.gateway.pool_size = size;
        }
        if let Some(min) = self.min_healthy {
            file.gateway.min_healthy = min;
        }
        if let Some(ms) = self.queue_interval_ms {
            file.queue.interval_ms = ms;
        }
        if let Some(max) = self.queue_max {
            file.queue.max_size = max;
        }
        if let Some(prefix) = self.topic_prefix {
            file.bridge.topic_prefix = prefix;
        }

        Ok(file.into_bridge_config()?)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// Startup order: logging, CLI parsing and config assembly, broker link,
/// bridge construction, Ctrl+C handler, then the bridge event loop until
/// shutdown.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log level comes from RUST_LOG; `info` when absent or invalid.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_bridge_config()?;

    info!(
        command = %config.command_addr,
        event = %config.event_addr,
        pool_size = config.pool_size,
        prefix = %config.topic_prefix,
        "lumen bridge starting"
    );

    let (broker, broker_events) = LoggingBrokerLink::start();
    let (bridge, mut ready_rx) = Bridge::new(config, Arc::new(broker));

    // Consume ready notifications.  This is where a state-sync sweep or
    // discovery republication would hook in.
    tokio::spawn(async move {
        while ready_rx.recv().await.is_some() {
            debug!("ready notification consumed");
        }
    });

    // Graceful shutdown: Ctrl+C flips the watch value; the bridge's event
    // loop observes it, stops both pools, and clears the queue.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    bridge.run(broker_events, shutdown_rx).await?;

    info!("lumen bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
