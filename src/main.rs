use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use netflowd::collector::Collector;
use netflowd::config::Config;

#[derive(Parser, Debug)]
#[command(name = "netflowd")]
#[command(about = "NetFlow v1/v5/v9 and IPFIX collector writing gzipped JSON lines")]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Collector listening address (overrides config)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Output file for gzipped JSON lines (overrides config)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Rotate the output file every N seconds, 0 to disable (overrides config)
    #[arg(long)]
    rotate_secs: Option<u64>,

    /// Template snapshot file persisted across restarts (overrides config)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'D')]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(output) = args.output {
        config.output_file = output;
    }
    if let Some(rotate_secs) = args.rotate_secs {
        config.rotate_interval_secs = rotate_secs;
    }
    if let Some(snapshot) = args.snapshot {
        config.snapshot_file = Some(snapshot);
    }
    config.debug |= args.debug;
    config.validate()?;

    let default_filter = if config.debug { "netflowd=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut collector = Collector::new(config)?;
    collector.run().await
}
