//! Lifecycle and application protocol above a [`brontide::NoiseTransport`]:
//! the `init` handshake, BOLT #1 ping/pong liveness, and reconnect with
//! exponential backoff.

mod config;
mod error;
mod pingpong;
pub mod reconnect;
mod session;

pub use config::{InitFeatures, PeerSessionConfig, ReconnectPolicy, Role};
pub use error::SessionError;
pub use pingpong::{BoltPingPong, LivenessPolicy};
pub use session::{PeerCommand, PeerEvent, PeerSession, PeerState, SessionOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::SecretKey;
    use tokio::sync::mpsc;

    fn secret_key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    async fn handshaken_pair() -> (
        brontide::NoiseTransport<tokio::io::DuplexStream>,
        brontide::NoiseTransport<tokio::io::DuplexStream>,
        secp256k1::PublicKey,
    ) {
        let (initiator_stream, responder_stream) = tokio::io::duplex(64 * 1024);
        let initiator_static = secret_key(0x11);
        let responder_static = secret_key(0x21);
        let responder_pub = secp256k1::PublicKey::from_secret_key(&secp256k1::SECP256K1, &responder_static);

        let mut i_stream = initiator_stream;
        let mut r_stream = responder_stream;
        let (i, r) = tokio::join!(
            brontide::initiate(&mut i_stream, initiator_static, responder_pub),
            brontide::accept(&mut r_stream, responder_static),
        );
        let i = i.unwrap();
        let r = r.unwrap();
        (
            brontide::NoiseTransport::new(i_stream, i.send, i.recv),
            brontide::NoiseTransport::new(r_stream, r.send, r.recv),
            responder_pub,
        )
    }

    #[tokio::test]
    async fn init_exchange_brings_both_sides_to_ready() {
        let (initiator_transport, responder_transport, responder_pub) = handshaken_pair().await;

        let mut initiator_config = PeerSessionConfig::new(Role::Initiator, secret_key(0x11));
        initiator_config.remote_static_pubkey = Some(responder_pub);
        initiator_config.reconnect_timeout_ms = 0;
        let responder_config = PeerSessionConfig::new(Role::Responder, secret_key(0x21));

        let (i_events_tx, mut i_events_rx) = mpsc::channel(16);
        let (_i_cmd_tx, mut i_cmd_rx) = mpsc::channel(16);
        let (r_events_tx, mut r_events_rx) = mpsc::channel(16);
        let (_r_cmd_tx, mut r_cmd_rx) = mpsc::channel(16);

        let initiator = tokio::spawn(async move {
            PeerSession::new(initiator_config)
                .run(initiator_transport, i_events_tx, &mut i_cmd_rx)
                .await
        });
        let responder = tokio::spawn(async move {
            PeerSession::new(responder_config)
                .run(responder_transport, r_events_tx, &mut r_cmd_rx)
                .await
        });

        let first_initiator_event = i_events_rx.recv().await.unwrap();
        assert!(matches!(first_initiator_event, PeerEvent::Ready));
        let first_responder_event = r_events_rx.recv().await.unwrap();
        assert!(matches!(first_responder_event, PeerEvent::Ready));

        initiator.abort();
        responder.abort();
    }

    #[tokio::test]
    async fn disconnect_command_ends_the_session_without_reconnect() {
        let (initiator_transport, _responder_transport, responder_pub) = handshaken_pair().await;
        let mut config = PeerSessionConfig::new(Role::Initiator, secret_key(0x11));
        config.remote_static_pubkey = Some(responder_pub);

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);

        let handle = tokio::spawn(async move {
            PeerSession::new(config).run(initiator_transport, events_tx, &mut cmd_rx).await
        });

        cmd_tx.send(PeerCommand::Disconnect).await.unwrap();
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, SessionOutcome::ClosedByUser));

        // drain: we should see at most a Close, no Error.
        while let Ok(event) = events_rx.try_recv() {
            assert!(!matches!(event, PeerEvent::Error(_)));
        }
    }
}
