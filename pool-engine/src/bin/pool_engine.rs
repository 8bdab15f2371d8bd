use clap::Parser;
use pool_engine::{config::StorageStack, logger, pool::PoolService};
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "pool-engine",
    about = "Node-local storage pool provisioning agent",
    version
)]
struct Cli {
    /// Path of the storage stack yaml configuration.
    #[arg(short, long, default_value = "/etc/pool-engine/config.yaml")]
    config: String,
    /// Log level: trace, debug, info, warn, error.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logger::init(&cli.log_level);

    let stack = StorageStack::load(&cli.config)?;
    info!("storage stack: {:?}", stack);

    let service = PoolService::new(stack).await?;
    let pool = service.pool();
    info!(
        "serving pool {} ({}), capacity {} free {}",
        pool.name,
        pool.mode(),
        pool.status.capacity_bytes,
        pool.status.vg_free_size
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
