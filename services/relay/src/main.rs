use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use relay::bus::{MemoryBus, UpstreamBus};
use relay::config::RelayConfig;
use relay::router::create_router;
use relay::simulator::{seed_games, OddsSimulator, SimulatorConfig};
use relay::state::RelayState;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("starting oddswire delta relay");

    let config = RelayConfig::from_env();
    let state = Arc::new(RelayState::new(config));

    // The relay cannot function without the upstream bus: failing to
    // subscribe at startup is fatal rather than running silently empty.
    let bus = MemoryBus::new(1024);
    let publications = bus
        .subscribe(&state.config.tracked_games)
        .await
        .context("upstream bus unreachable")?;

    // Demo stand-in for the external odds feed, publishing onto the bus.
    let simulator = OddsSimulator::new(SimulatorConfig::default(), seed_games());
    tokio::spawn(simulator.run(bus.publisher()));

    tokio::spawn(relay::relay::run(state.clone(), publications));
    tokio::spawn(relay::relay::run_maintenance(state.clone()));
    tokio::spawn(relay::metrics::run_reporter(
        state.metrics.clone(),
        state.config.metrics_log_interval,
    ));

    let addr = state.config.bind_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("listening on {}", addr);
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
