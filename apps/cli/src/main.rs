//! RelayBridge CLI
//!
//! Command-line interface for the relay tunnel bridge, the development relay
//! hub, and a few small messaging tools built on the same relay session.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use relaybridge_bridge::{Bridge, BridgeConfig, Role};
use relaybridge_core::{PeerKey, RelayMessage};
use relaybridge_crypto::Keypair;
use relaybridge_logging::LogLevel;
use relaybridge_relay::{Hub, HubConfig};
use relaybridge_settings::Settings;
use relaybridge_transport::{RelayTransport, TcpRelay};

/// RelayBridge - TCP tunnels over an addressed relay
#[derive(Parser)]
#[command(name = "relaybridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Relay server address, overrides the settings file
    #[arg(long, global = true)]
    server: Option<String>,

    /// Secret key (hex) to use instead of a fresh identity
    #[arg(long, global = true)]
    secret_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and print a new key pair
    Keygen,

    /// Publish a local TCP port to the first peer that sends to us
    Expose {
        /// Local port of the service to expose
        local_port: u16,
    },

    /// Forward a local listening port to a remote exposing peer
    Connect {
        /// Public key (hex) of the exposing peer
        remote_key: PeerKey,

        /// Local port to accept clients on
        listen_port: u16,
    },

    /// Send one text message to a peer
    Send {
        /// Public key (hex) of the recipient
        to: PeerKey,

        /// Message text
        message: String,
    },

    /// Print every message received until interrupted
    Recv,

    /// Line-based chat with a peer
    Chat {
        /// Public key (hex) of the other side
        peer: PeerKey,
    },

    /// Run the development relay hub
    Hub {
        /// Listen address, overrides the settings file
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    relaybridge_logging::init(LogLevel::from_verbose(cli.verbose));

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Keygen => keygen(),
        Commands::Expose { local_port } => {
            let target = resolve_local(&settings.bridge.local_host, local_port).await?;
            let relay = open_relay(&settings, cli.secret_key.as_deref()).await?;
            println!("Public key: {}", relay.local_key());
            run_bridge(Role::Expose { target }, relay, &settings).await
        }
        Commands::Connect {
            remote_key,
            listen_port,
        } => {
            let listen = resolve_local(&settings.bridge.local_host, listen_port).await?;
            let relay = open_relay(&settings, cli.secret_key.as_deref()).await?;
            println!("Public key: {}", relay.local_key());
            run_bridge(
                Role::Connect {
                    peer: remote_key,
                    listen,
                },
                relay,
                &settings,
            )
            .await
        }
        Commands::Send { to, message } => {
            let mut relay = open_relay(&settings, cli.secret_key.as_deref()).await?;
            relay
                .send(&to, message.as_bytes())
                .await
                .context("Failed to send message")?;
            relay.close().await;
            info!("Sent {} bytes to {}", message.len(), to.short());
            Ok(())
        }
        Commands::Recv => {
            let relay = open_relay(&settings, cli.secret_key.as_deref()).await?;
            println!("Public key: {}", relay.local_key());
            receive_loop(relay).await
        }
        Commands::Chat { peer } => {
            let relay = open_relay(&settings, cli.secret_key.as_deref()).await?;
            println!("Public key: {}", relay.local_key());
            chat(relay, peer).await
        }
        Commands::Hub { listen } => {
            let config = HubConfig {
                listen_addr: listen.unwrap_or(settings.hub.listen_addr),
                ..HubConfig::default()
            };
            run_hub(config).await
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => Settings::load_or_default().context("Failed to load settings")?,
    };
    if let Some(server) = &cli.server {
        settings.relay.server = server.clone();
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

async fn resolve_local(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Failed to resolve {}:{}", host, port))?
        .next()
        .with_context(|| format!("No address for {}:{}", host, port))
}

async fn open_relay(settings: &Settings, secret_key: Option<&str>) -> Result<TcpRelay> {
    let keypair = match secret_key {
        Some(hex) => Keypair::from_secret_hex(hex).context("Invalid secret key")?,
        None => Keypair::generate(),
    };

    info!("Opening relay session via {}", settings.relay.server);
    TcpRelay::open(&settings.relay.server, keypair)
        .await
        .with_context(|| format!("Failed to open relay session via {}", settings.relay.server))
}

// ============================================================================
// Bridge
// ============================================================================

async fn run_bridge(role: Role, relay: TcpRelay, settings: &Settings) -> Result<()> {
    let config = BridgeConfig {
        chunk_size: settings.bridge.chunk_size,
    };
    let bridge = Bridge::new(role, relay, config)
        .await
        .context("Failed to start bridge")?;

    tokio::select! {
        result = bridge.run() => {
            result.context("Bridge stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }
    Ok(())
}

// ============================================================================
// Peripheral tools
// ============================================================================

fn keygen() -> Result<()> {
    let keypair = Keypair::generate();
    println!("Secret key: {}", hex::encode(keypair.secret_key_bytes()));
    println!("Public key: {}", keypair.public_key());
    println!();
    println!("Keep the secret key private; share only the public key.");
    Ok(())
}

fn print_message(message: &RelayMessage) {
    println!(
        "{}: {}",
        message.sender,
        String::from_utf8_lossy(&message.payload)
    );
}

async fn receive_loop(mut relay: TcpRelay) -> Result<()> {
    loop {
        tokio::select! {
            message = relay.recv() => {
                let message = message.context("Relay session lost")?;
                print_message(&message);
            }
            _ = tokio::signal::ctrl_c() => {
                relay.close().await;
                return Ok(());
            }
        }
    }
}

async fn chat(mut relay: TcpRelay, peer: PeerKey) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Chatting with {}; end input or press Ctrl-C to quit", peer.short());

    loop {
        tokio::select! {
            message = relay.recv() => {
                let message = message.context("Relay session lost")?;
                if message.sender != peer {
                    continue;
                }
                if !message.is_empty() {
                    print_message(&message);
                }
            }
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) if !line.is_empty() => {
                        relay.send(&peer, line.as_bytes()).await.context("Failed to send message")?;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    relay.close().await;
    Ok(())
}

// ============================================================================
// Hub
// ============================================================================

async fn run_hub(config: HubConfig) -> Result<()> {
    let hub = Hub::bind(config).await.context("Failed to start relay hub")?;
    println!("Hub key: {}", hub.public_key());

    tokio::select! {
        result = hub.run() => {
            result.context("Relay hub stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }
    Ok(())
}
