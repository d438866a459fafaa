use std::process;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use gateway_exporter::App;
use gateway_exporter::app::spawn_signal_handler;
use gateway_exporter::config::Args;
use gateway_exporter::logging::init_logging;

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads them.
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let guard = match init_logging(&args.log_filter, args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = run(args).await;

    if let Err(e) = result {
        error!("Application error: {:#}", e);
        // Flush the file writer before exiting.
        drop(guard);
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.into_config().context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        gateway = %config.gateway_host,
        listen = %config.listen_addr,
        "Starting gateway exporter"
    );

    let app = App::new(config).context("Failed to build HTTP clients")?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    app.run(cancel).await?;

    info!("Gateway exporter stopped");
    Ok(())
}
