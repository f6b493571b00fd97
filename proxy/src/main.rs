//! chatmesh Proxy Entry Point

use chatmesh_common::{
    config::ProxyConfig, error::CommonError, logging, shutdown::ShutdownController,
    tasks::BackgroundTasks,
};
use chatmesh_proxy::{
    cli::Cli,
    client::ControllerClient,
    dispatch::{DispatchPool, Dispatcher},
    identity::ProxyIdentity,
    server,
    snapshot::EndpointSnapshot,
    sync::{self, EndpointSync, Heartbeat},
    transform::TransformRegistry,
    AppState,
};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _log_guard = match logging::init("chatmesh-proxy.log") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli).await {
        error!("Proxy failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CommonError> {
    let mut config = ProxyConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    let identity = Arc::new(ProxyIdentity::from_config(&config));
    let span = tracing::info_span!("proxy", instance = %identity.instance_name);

    async move {
        info!(
            proxy_id = %identity.proxy_id,
            "chatmesh proxy v{}",
            env!("CARGO_PKG_VERSION")
        );

        let snapshot = EndpointSnapshot::new();
        let client = ControllerClient::new(config.controller_url.clone(), config.request_timeout())
            .map_err(|e| CommonError::Config(e.to_string()))?;

        if let Err(e) = sync::register(&client, &identity, &snapshot).await {
            warn!(error = %e, "Initial registration failed, starting with an empty endpoint table");
        }

        let mut tasks = BackgroundTasks::new();
        tasks.push(
            "heartbeat",
            Heartbeat::new(
                client.clone(),
                identity.clone(),
                snapshot.clone(),
                config.heartbeat_interval(),
            )
            .start(),
        );
        tasks.push(
            "endpoint-sync",
            EndpointSync::new(client, identity.clone(), snapshot.clone(), config.sync_interval())
                .with_retry(config.sync_retry_delay(), config.sync_max_retries)
                .start(),
        );

        let dispatcher = Dispatcher::new(
            identity.clone(),
            TransformRegistry::default(),
            DispatchPool::new(config.max_in_flight),
            config.request_timeout(),
        )
        .map_err(|e| CommonError::Config(e.to_string()))?;

        let state = AppState {
            identity,
            snapshot,
            dispatcher,
            shutdown: ShutdownController::default(),
        };
        let bind_addr = format!("0.0.0.0:{}", config.proxy_port);
        server::run(state, &bind_addr, tasks).await?;
        Ok::<(), CommonError>(())
    }
    .instrument(span)
    .await
}
