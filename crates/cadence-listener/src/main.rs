//! cadence-listener - message bus bridge binary.

use std::sync::Arc;

use cadence_core::{ActionBus, Engine};
use cadence_listener::{load_engine_config, BusConfig, MessageBusClient};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cadence_core=debug,cadence_listener=debug"));
    let json = std::env::var("CADENCE_LOG_JSON").is_ok();

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let engine_config = load_engine_config()?;
    let bus_config = BusConfig::from_env();
    info!(
        bus = %bus_config.url,
        log = %engine_config.log_path.display(),
        "Starting cadence-listener"
    );

    // Subscribe before the engine can emit anything
    let actions = ActionBus::new();
    let subscriber = actions.subscribe();

    let engine = Engine::from_config(engine_config, Arc::new(actions.clone()));
    let handle = engine.start().await?;

    let client = Arc::new(MessageBusClient::new(bus_config, handle.sender()));
    let mut bus_task = tokio::spawn({
        let client = client.clone();
        async move { client.run(subscriber).await }
    });

    let bus_finished = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping...");
            false
        }
        _ = &mut bus_task => {
            warn!("Message bus client stopped on its own");
            true
        }
    };

    client.shutdown();
    if !bus_finished {
        let _ = bus_task.await;
    }

    let stats = handle.shutdown().await?;
    info!(
        accepted = stats.accepted,
        triggers_fired = stats.triggers_fired,
        habits_fired = stats.habits_fired,
        resets = stats.resets,
        "Listener stopped cleanly"
    );
    Ok(())
}
