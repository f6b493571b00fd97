//! chatmesh Coordinator Server Entry Point

use chatmesh_common::{
    config::CoordinatorConfig, defaults::SeedTable, error::CommonError, logging,
    tasks::BackgroundTasks,
};
use chatmesh_coordinator::{cli::Cli, health::EvictionSweeper, registry::ProxyRegistry, server, AppState};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _log_guard = match logging::init("chatmesh-coordinator.log") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli).await {
        error!("Coordinator failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CommonError> {
    let mut config = CoordinatorConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    info!("chatmesh coordinator v{}", env!("CARGO_PKG_VERSION"));

    let seeds = match &config.seed_file {
        Some(path) => {
            info!(path = %path.display(), "Loading seed endpoint table");
            SeedTable::from_file(path)?
        }
        None => SeedTable::builtin()?,
    };

    let registry = ProxyRegistry::new(seeds);
    let mut tasks = BackgroundTasks::new();
    tasks.push(
        "eviction-sweeper",
        EvictionSweeper::new(registry.clone(), config.sweep_interval(), config.stale_after())
            .start(),
    );

    let state = AppState::new(registry);
    let bind_addr = format!("{}:{}", config.host, config.port);
    server::run(state, &bind_addr, tasks).await?;
    Ok(())
}
