//! Bastion - Dedicated Server

use std::path::PathBuf;

use bastion_server::network::{serve, HostEvent, SessionHost};
use bastion_server::{Result, ServerConfig};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bastion-server")]
#[command(about = "Dedicated session host for Bastion")]
struct Args {
    /// Server config (RON). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listening port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Bastion Dedicated Server");

    if let Err(e) = run(Args::parse()).await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    let host = SessionHost::new(&config)?;
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let (events, receiver) = mpsc::channel(256);

    let front = tokio::spawn(serve(listener, events.clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            let _ = events.send(HostEvent::Shutdown).await;
        }
    });

    let sim = host.run(receiver).await?;
    front.abort();

    if let Some(winner) = sim.winner_text() {
        tracing::info!("Session ended, winner: {winner}");
    }
    Ok(())
}
