use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use bp_agent::channel::{NetCommand, NetCommandKind, NetEvent};
use bp_agent::config::AgentConfig;
use bp_agent::coordinator::DeliveryCoordinator;
use bp_agent::net;
use bp_agent::telemetry::SimulatedBattery;
use bp_agent::transport::{HttpTransport, Transport};
use bp_store::keystore::KeyStore;
use bp_store::provision::ensure_signing_key;

#[derive(Parser, Debug)]
#[command(author, version, about = "Battery-passport telemetry agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the device signing key without starting the agent
    Provision {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the delivery agent
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Provision { config } => provision_command(config).await,
        Commands::Run { config } => run_command(config).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<AgentConfig> {
    match path {
        Some(p) => AgentConfig::load(&p),
        None => Ok(AgentConfig::default()),
    }
}

async fn provision_command(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = KeyStore::open(config.data_dir.join("keys"))?;
    let provisioned = ensure_signing_key(&store)?;
    if provisioned.first_boot {
        println!("signing key generated");
    } else {
        println!("signing key already present");
    }
    Ok(())
}

async fn run_command(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = KeyStore::open(config.data_dir.join("keys"))?;
    let provisioned = ensure_signing_key(&store)?;
    let public_key_der = provisioned.key.public_key_der()?;

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        config.registry_url.clone(),
        config.probe_count,
        Duration::from_millis(config.probe_pacing_ms),
    ));

    let (cmd_tx, cmd_rx) = mpsc::channel::<NetCommand>(config.channel_capacity);
    let (evt_tx, evt_rx) = mpsc::channel::<NetEvent>(config.channel_capacity);
    let net_task = tokio::spawn(net::run(transport, cmd_rx, evt_tx));

    // First boot only: publish the fresh public key so verifiers can
    // find it. Delivery does not depend on the outcome.
    if provisioned.first_boot {
        let payload = serde_json::to_vec(&serde_json::json!({
            "did": config.device_did,
            "publicKey": BASE64.encode(&public_key_der),
        }))?;
        if cmd_tx
            .send(NetCommand {
                seq: 0,
                kind: NetCommandKind::Register {
                    endpoint: config.registration_endpoint.clone(),
                    payload,
                },
            })
            .await
            .is_err()
        {
            warn!("network task unavailable for key registration");
        }
    }

    let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);
    let coordinator = DeliveryCoordinator::new(
        config.clone(),
        provisioned.key,
        SimulatedBattery::default(),
        cmd_tx,
        evt_rx,
    );
    let coordinator_task = tokio::spawn(coordinator.run(trigger_rx));

    let interval = Duration::from_secs(config.cycle_interval_secs);
    let ticker_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            // A full trigger queue means a cycle is still in flight;
            // dropping the tick keeps cycles from piling up.
            match trigger_tx.try_send(()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(())) => {}
                Err(mpsc::error::TrySendError::Closed(())) => break,
            }
        }
    });

    info!(device_did = %config.device_did, recipients = config.recipients.len(), "agent started");
    signal::ctrl_c().await?;
    info!("agent stopping");
    ticker_task.abort();
    coordinator_task.abort();
    net_task.abort();
    Ok(())
}
