use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use vigil::{Daemon, config};

#[derive(Debug, Clone, Parser)]
#[command(version, about)]
struct Args {
    /// Config file
    #[arg(short, long, default_value = "vigil.toml")]
    file: PathBuf,

    /// Log level (overrides `log_level` from the config file)
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![("vigil", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let args = Args::parse();

    let config = config::load(&args.file)
        .with_context(|| format!("failed to load config from {}", args.file.display()))?;

    let configured_level = config.global.log_level.parse::<LevelFilter>().ok();
    init(args.log_level.or(configured_level).unwrap_or(LevelFilter::WARN));
    if configured_level.is_none() {
        warn!("unknown log_level {:?} in config", config.global.log_level);
    }
    trace!("started with args: {args:?}");

    let daemon = Daemon::start_default(&config).context("failed to start daemon")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("received Ctrl-C, shutting down");
    daemon.shutdown().await;

    Ok(())
}
