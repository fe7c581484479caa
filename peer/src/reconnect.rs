use tokio::net::ToSocketAddrs;
use tokio::sync::mpsc;
use tracing::{info, warn};

use brontide::tcp;

use crate::config::PeerSessionConfig;
use crate::session::{PeerCommand, PeerEvent, PeerSession, SessionOutcome};

/// Drives a single logical connection to `addr` as the initiator,
/// reconnecting with exponential backoff on an unsolicited close. Returns
/// once the observer sends [`PeerCommand::Disconnect`] (or drops the
/// command channel) or a fatal protocol error ends the session locally —
/// both of which are terminal per the lifecycle table.
///
/// A fresh [`PeerSession`] is built for every attempt: reconnect always
/// restarts the handshake, so nothing beyond the stable static secret in
/// `config` can carry over, which makes a new session instance behaviorally
/// identical to reusing one with its transport swapped out.
pub async fn run_initiator<A>(
    config: PeerSessionConfig,
    addr: A,
    events: mpsc::Sender<PeerEvent>,
    mut commands: mpsc::Receiver<PeerCommand>,
) where
    A: ToSocketAddrs + Clone,
{
    let remote_static = config
        .remote_static_pubkey
        .expect("initiator role requires a configured remote_static_pubkey");
    let mut attempt: u32 = 0;

    loop {
        let connect_result =
            tcp::connect(addr.clone(), config.local_static_secret, remote_static).await;

        let transport = match connect_result {
            Ok(transport) => transport,
            Err(e) => {
                warn!(error = %e, attempt, "handshake failed while reconnecting");
                if !config.reconnect_enabled() {
                    return;
                }
                let delay = config.reconnect_policy.delay_ms(attempt);
                attempt += 1;
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                continue;
            }
        };

        let session = PeerSession::new(config.clone());
        let outcome = session.run(transport, events.clone(), &mut commands).await;

        match outcome {
            SessionOutcome::ClosedByUser | SessionOutcome::FatalError => return,
            SessionOutcome::StreamClosed { reached_ready } => {
                if !config.reconnect_enabled() {
                    return;
                }
                if reached_ready {
                    attempt = 0;
                }
                let delay = config.reconnect_policy.delay_ms(attempt);
                attempt += 1;
                info!(delay_ms = delay, attempt, "scheduling reconnect after unsolicited close");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
        }
    }
}
