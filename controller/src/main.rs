use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use service_protocol::{ServiceInfo, SetupStatus, SupervisorClient};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "controller")]
#[command(about = "CLI Controller for the Service Supervisor")]
struct Cli {
    /// Base URL of the supervisor daemon
    #[arg(long, default_value = "http://127.0.0.1:59000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every service, or one of them
    Status { service: Option<String> },
    /// Provision a service's python environment and follow the progress
    Setup { service: String },
    /// Start a service and wait until it is ready
    Start { service: String },
    /// Stop a service
    Stop { service: String },
    /// Poll the service list and print changes until interrupted
    ///
    /// Transitions that start and end between two polls are not shown.
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = SupervisorClient::new(cli.url);

    match cli.command {
        Commands::Status { service: None } => {
            let services = client
                .list_services()
                .await
                .with_context(|| format!("cannot reach supervisor at {}", client.base_url()))?;
            for info in &services {
                print_info(info);
            }
        }
        Commands::Status {
            service: Some(name),
        } => {
            let info = client.service(&name).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Setup { service } => {
            let mut progress = Box::pin(client.set_up(&service).await?);
            let mut outcome = None;
            while let Some(record) = progress.next().await {
                let record = record.context("setup progress stream broke off")?;
                println!("[{}] {}: {}", record.service_name, record.step, record.debug_message);
                if record.is_terminal() {
                    outcome = Some(record.status);
                }
            }
            match outcome {
                Some(SetupStatus::Success) => println!("{} is set up", service),
                Some(_) => bail!("setup of {} failed", service),
                None => bail!("setup of {} ended without a result", service),
            }
        }
        Commands::Start { service } => {
            let status = client.start(&service).await?;
            println!("{}: {}", service, status);
        }
        Commands::Stop { service } => {
            let status = client.stop(&service).await?;
            println!("{}: {}", service, status);
        }
        Commands::Watch { interval } => watch(&client, Duration::from_millis(interval)).await?,
    }

    Ok(())
}

/// Polls `/services` every `interval` and prints snapshots that differ from
/// the previous poll.
async fn watch(client: &SupervisorClient, interval: Duration) -> Result<()> {
    let mut last: HashMap<String, ServiceInfo> = HashMap::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            listed = client.list_services() => {
                for info in listed? {
                    if last.get(&info.service_name) != Some(&info) {
                        print_info(&info);
                        last.insert(info.service_name.clone(), info);
                    }
                }
            }
        }
        tokio::time::sleep(interval).await;
    }
}

fn print_info(info: &ServiceInfo) {
    println!(
        "{:<24} {:<20} {:<28} set_up={} required={}",
        info.service_name, info.status, info.base_url, info.is_set_up, info.is_required
    );
}
