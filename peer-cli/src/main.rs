//! A thin, realistic consumer of the `peer` library: dials or listens for
//! exactly one peer, drives the session to `Ready`, and then logs
//! ping/pong and message traffic until disconnected.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use secp256k1::{PublicKey, SecretKey};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use peer::{reconnect, PeerEvent, PeerSession, PeerSessionConfig, Role, SessionOutcome};

#[derive(Parser, Debug)]
#[command(name = "peer-cli", about = "Dial or listen for a single Lightning peer connection")]
struct Cli {
    /// Dial a peer at host:port as the connection's initiator.
    #[arg(long, value_name = "HOST:PORT")]
    connect: Option<SocketAddr>,

    /// The peer's compressed secp256k1 static public key, hex-encoded.
    /// Required with --connect.
    #[arg(long, value_name = "HEX")]
    remote_pubkey: Option<String>,

    /// Listen for a single inbound connection as the responder.
    #[arg(long, value_name = "HOST:PORT")]
    listen: Option<SocketAddr>,

    /// This node's static secret key, hex-encoded. A random key is
    /// generated if omitted.
    #[arg(long, value_name = "HEX")]
    local_secret: Option<String>,

    #[arg(long, default_value_t = 30_000)]
    ping_interval_ms: u64,

    #[arg(long, default_value_t = 30_000)]
    ping_timeout_ms: u64,

    #[arg(long, default_value_t = 5_000)]
    reconnect_timeout_ms: u64,
}

fn parse_secret_key(hex_str: &str) -> Result<SecretKey> {
    let bytes = hex::decode(hex_str).context("local secret must be hex-encoded")?;
    SecretKey::from_slice(&bytes).context("local secret must be a valid 32-byte secp256k1 key")
}

fn parse_public_key(hex_str: &str) -> Result<PublicKey> {
    let bytes = hex::decode(hex_str).context("remote pubkey must be hex-encoded")?;
    PublicKey::from_slice(&bytes).context("remote pubkey must be a valid compressed secp256k1 key")
}

async fn log_events(mut events: mpsc::Receiver<PeerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PeerEvent::Ready => info!("session ready"),
            PeerEvent::Message(payload) => info!(len = payload.len(), "message received"),
            PeerEvent::Sending(payload) => info!(len = payload.len(), "message sent"),
            PeerEvent::Error(err) => tracing::warn!(error = %err, "session error"),
            PeerEvent::Close => {
                info!("session closed");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let local_static = match &cli.local_secret {
        Some(hex_str) => parse_secret_key(hex_str)?,
        None => SecretKey::new(&mut rand::thread_rng()),
    };

    match (cli.connect, cli.listen) {
        (Some(addr), None) => {
            let remote_pubkey_hex =
                cli.remote_pubkey.context("--connect requires --remote-pubkey")?;
            let remote_static = parse_public_key(&remote_pubkey_hex)?;

            let mut config = PeerSessionConfig::new(Role::Initiator, local_static);
            config.remote_static_pubkey = Some(remote_static);
            config.ping_interval_ms = cli.ping_interval_ms;
            config.ping_timeout_ms = cli.ping_timeout_ms;
            config.reconnect_timeout_ms = cli.reconnect_timeout_ms;

            let (events_tx, events_rx) = mpsc::channel(64);
            let (_commands_tx, commands_rx) = mpsc::channel(64);
            let logger = tokio::spawn(log_events(events_rx));

            info!(%addr, "dialing peer");
            reconnect::run_initiator(config, addr, events_tx, commands_rx).await;
            let _ = logger.await;
            Ok(())
        }
        (None, Some(addr)) => {
            let listener = TcpListener::bind(addr).await.context("binding listener")?;
            info!(%addr, "listening for a peer");
            let (stream, remote_addr) = listener.accept().await.context("accepting connection")?;
            info!(%remote_addr, "accepted connection, starting handshake");

            let (transport, remote_static) = brontide::tcp::accept(stream, local_static)
                .await
                .context("handshake failed")?;
            info!(remote_static = %hex::encode(remote_static.serialize()), "handshake complete");

            let mut config = PeerSessionConfig::new(Role::Responder, local_static);
            config.ping_interval_ms = cli.ping_interval_ms;
            config.ping_timeout_ms = cli.ping_timeout_ms;

            let (events_tx, events_rx) = mpsc::channel(64);
            let (_commands_tx, mut commands_rx) = mpsc::channel(64);
            let logger = tokio::spawn(log_events(events_rx));

            let outcome = PeerSession::new(config).run(transport, events_tx, &mut commands_rx).await;
            match outcome {
                SessionOutcome::ClosedByUser => info!("closed locally"),
                SessionOutcome::FatalError => info!("closed on a fatal protocol error"),
                SessionOutcome::StreamClosed { .. } => info!("peer closed the connection"),
            }
            let _ = logger.await;
            Ok(())
        }
        _ => anyhow::bail!("pass exactly one of --connect or --listen"),
    }
}
