//! shardline - run a single gateway shard
//!
//! Connects one shard to the gateway and logs every dispatch it receives.
//! Useful for poking at a gateway by hand or watching raw traffic.

use std::sync::Arc;

use clap::Parser;
use shardline::{Identify, LineSink, Shard, ShardOptions};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "shardline")]
#[command(about = "Run a single gateway shard")]
#[command(version)]
struct Cli {
    /// Gateway WebSocket URL
    #[arg(long, env = "SHARDLINE_GATEWAY")]
    gateway: String,

    /// Authentication token
    #[arg(long, env = "SHARDLINE_TOKEN", hide_env_values = true)]
    token: String,

    /// Gateway protocol version
    #[arg(long, default_value = shardline::options::DEFAULT_VERSION)]
    api_version: String,

    /// Shard id
    #[arg(long, default_value_t = 0)]
    shard: u32,

    /// Total number of shards
    #[arg(long, default_value_t = 1)]
    shard_count: u32,

    /// Gateway intents bitfield
    #[arg(long, default_value_t = 0)]
    intents: u64,

    /// Ask for zstd-stream transport compression
    #[arg(long)]
    zstd: bool,

    /// Print every raw frame to stdout
    #[arg(long)]
    output: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("shardline=info".parse()?))
        .init();

    let cli = Cli::parse();
    if cli.shard >= cli.shard_count {
        anyhow::bail!(
            "shard id {} is out of range for {} shards",
            cli.shard,
            cli.shard_count
        );
    }

    let identify = Identify::new(cli.token)
        .with_shard(cli.shard, cli.shard_count)
        .with_intents(cli.intents);

    let (tx, mut rx) = mpsc::channel(256);
    let mut opts = ShardOptions::new(cli.gateway, identify)
        .with_version(cli.api_version)
        .with_dispatch_channel(tx);
    if cli.zstd {
        opts = opts.with_compress(shardline::options::ZSTD_STREAM);
    }
    if cli.output {
        opts = opts.with_output(Arc::new(LineSink::new(std::io::stdout())));
    }

    let shard = Shard::new(opts)?;
    info!(shard = cli.shard, shard_count = cli.shard_count, "starting shard");

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            info!(event = %event.name, seq = ?event.seq, "dispatch");
        }
    });

    let closer = shard.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, closing shard");
            if let Err(e) = closer.close().await {
                warn!(error = %e, "failed to close shard");
            }
        }
    });

    if let Err(e) = shard.open().await {
        error!(error = %e, "shard stopped");
        return Err(e.into());
    }

    info!("shard closed");
    Ok(())
}
