//! Debug listener: entry point.
//!
//! ```text
//! dbgwire-listener                  Listen with defaults
//! dbgwire-listener --config <path>  Load a custom config TOML
//! dbgwire-listener --bind <addr>    Override the listen address
//! dbgwire-listener --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dbgwire_listener::config::ListenerConfig;
use dbgwire_listener::service::ListenerService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "dbgwire-listener", about = "Receives and logs remote debug events")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "dbgwire-listener.toml")]
    config: PathBuf,

    /// Listen address, overriding the config file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory to save snapshot images in, overriding the config file.
    #[arg(long)]
    snapshot_dir: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ListenerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ListenerConfig::load(&cli.config);
    if let Some(bind) = cli.bind {
        config.network.bind = bind;
    }
    if let Some(dir) = cli.snapshot_dir {
        config.events.snapshot_dir = dir;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("dbgwire-listener v{}", env!("CARGO_PKG_VERSION"));

    let service = ListenerService::bind(&config).await?;
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    service.run().await?;
    Ok(())
}
