use anyhow::{Context, Result};
use clap::Parser;
use configuration_manager::manager::{
    DocumentRegistry, ManagerBus, ServiceName, SignalBroadcaster, SubscriberRegistry,
};
use configuration_manager::{logging, paths, shutdown};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "configuration-manager")]
#[command(about = "Publishes application configuration files on the local bus")]
#[command(version)]
struct Cli {
    /// Directory holding one <application>.json file per application
    #[arg(long, default_value = paths::DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = paths::expand_home(&cli.config_dir)?;
    let bus_dir = paths::bus_dir()?;

    let mut service_name = ServiceName::acquire(&bus_dir, paths::SERVICE_NAME)
        .context("Failed to acquire service name")?;

    let subscribers = Arc::new(RwLock::new(SubscriberRegistry::new()));
    let registry = Arc::new(DocumentRegistry::new(config_dir.clone()));
    let loaded = registry
        .initialize(Arc::new(SignalBroadcaster::new(subscribers.clone())))
        .with_context(|| format!("Failed to load configurations from {}", config_dir.display()))?;
    info!("Loaded {} application(s) from {}", loaded, config_dir.display());

    let bus = ManagerBus::new(registry, subscribers);
    let address = bus.run().await.context("Failed to start bus")?;
    if let Err(e) = service_name.publish(&address) {
        bus.stop().await;
        return Err(anyhow::Error::new(e).context("Failed to publish service address"));
    }
    info!("Service {} ready", service_name.service());

    let signal = shutdown::shutdown_signal().await;
    info!("Received {}, shutting down", signal);

    bus.stop().await;
    service_name.release();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("critical: {:#}", e);
        std::process::exit(1);
    }
}
