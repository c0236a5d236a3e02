use ambilight_tv_bridge::Television;
use ambilight_tv_bridge::config::{self, Config};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "ambilight-tv-bridge", version, about = "Mirror a networked TV's state for home automation")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "AMBILIGHT_TV_CONFIG")]
    config: Option<PathBuf>,

    /// Print one snapshot and exit
    #[arg(long)]
    once: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Before the runtime exists, so no other thread reads the environment.
    config::load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cli));
}

async fn run(cli: Cli) {
    info!("Starting Ambilight TV bridge");

    let path = cli.config.unwrap_or_else(config::default_config_path);
    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration loaded:");
    info!("  TV: {}", config.tv.base_url);
    info!(
        "  Wake-on-LAN: {}",
        config.wake.mac_address.as_deref().unwrap_or("disabled")
    );

    let tv = match Television::from_config(&config) {
        Ok(tv) => Arc::new(tv),
        Err(e) => {
            log::error!("Failed to set up TV connection: {}", e);
            std::process::exit(1);
        }
    };

    match tv.info().system().await {
        Ok(system) => info!(
            "Connected to {} (API {})",
            system.name.as_deref().unwrap_or("unnamed TV"),
            system.api_version
        ),
        Err(e) => log::warn!("TV not reachable yet: {}", e),
    }

    if cli.once {
        let snapshot = tv.snapshot().await;
        println!("{snapshot:#?}");
        return;
    }

    let poller = config
        .auto_refresh_interval()
        .map(|interval| tv.spawn_poller(interval));

    info!("Ambilight TV bridge is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => log::error!("Failed to listen for shutdown signal: {}", e),
    }

    tv.shutdown();
    if let Some(poller) = poller
        && let Err(e) = poller.await
    {
        log::error!("Poller task failed: {}", e);
    }

    info!("Ambilight TV bridge stopped");
}
