use anyhow::{Context, Result};
use clap::Parser;
use configuration_manager::client::{ClientSession, SessionEnd, SessionOptions};
use configuration_manager::{logging, shutdown};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "configuration-client")]
#[command(about = "Prints a phrase periodically, following the manager's configuration")]
#[command(version)]
struct Cli {
    /// Interval between phrases in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Phrase printed after each interval
    #[arg(long, default_value = "Hey")]
    phrase: String,

    /// Local configuration file (its stem is the application name)
    #[arg(long)]
    config_path: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Rewrite the local configuration file from --timeout and --phrase
    #[arg(long)]
    create_config: bool,
}

async fn run(cli: Cli) -> Result<()> {
    let options = SessionOptions {
        timeout_ms: cli.timeout,
        phrase: cli.phrase,
        config_path: cli.config_path,
        force_create: cli.create_config,
        bus_dir: None,
    };
    let mut session = ClientSession::start(options, Box::new(std::io::stdout()))
        .await
        .context("Failed to start client")?;
    info!(
        "Following {} ({})",
        session.app_name(),
        session.config_path().display()
    );

    tokio::select! {
        end = session.run() => match end {
            SessionEnd::ManagerStopping => info!("Manager stopped, exiting"),
            SessionEnd::Disconnected => info!("Lost connection to manager, exiting"),
        },
        signal = shutdown::shutdown_signal() => info!("Received {}, shutting down", signal),
    }

    session.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
