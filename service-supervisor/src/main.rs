use anyhow::Context;
use clap::Parser;
use log::{error, info};
use service_supervisor::api::{self, AppState};
use service_supervisor::config::SupervisorConfig;
use service_supervisor::event_bus::{log_crashes, EventBus};
use service_supervisor::registry::ServiceRegistry;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Supervises local worker services", long_about = None)]
struct Args {
    /// TOML configuration file (defaults to ./supervisor.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    info!("=== Service Supervisor Starting ===");

    let config = SupervisorConfig::load(args.config.as_deref()).context("loading configuration")?;
    let addr = match args.bind {
        Some(addr) => addr,
        None => config
            .bind_address
            .parse()
            .with_context(|| format!("invalid bind address '{}'", config.bind_address))?,
    };

    let event_bus = EventBus::new();
    let registry = ServiceRegistry::from_config(&config, event_bus.clone())?;
    for info in registry.list() {
        info!(
            "Service [{}] on port {}: {}",
            info.service_name, info.port, info.status
        );
    }

    tokio::spawn(log_crashes(event_bus.subscribe()));

    let state = AppState {
        registry: registry.clone(),
        event_bus: event_bus.clone(),
    };
    let server = tokio::spawn(api::serve(addr, state));

    if config.autostart {
        let autostarted = registry.clone();
        tokio::spawn(async move {
            for (name, result) in autostarted.start_required().await {
                match result {
                    Ok(status) => info!("Autostart [{}]: {}", name, status),
                    Err(e) => error!("Autostart [{}] failed: {}", name, e),
                }
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
        served = server => match served {
            Ok(Ok(())) => info!("API server stopped"),
            Ok(Err(e)) => error!("API server failed: {}", e),
            Err(e) => error!("API server task panicked: {}", e),
        },
    }

    registry.stop_all().await;
    info!("=== Service Supervisor Stopped ===");
    Ok(())
}
