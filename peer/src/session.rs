use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{debug, trace, warn};

use brontide::NoiseTransport;
use wire::{Init, Message};

use crate::config::PeerSessionConfig;
use crate::error::SessionError;
use crate::pingpong::{BoltPingPong, LivenessPolicy};

/// Where a single connection's lifecycle currently stands. `Pending` isn't
/// represented here — by the time a `PeerSession` is handed a transport the
/// handshake has already completed, so the session starts life having just
/// sent its own `init`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PeerState {
    AwaitingPeerInit,
    Ready,
    Disconnecting,
    Disconnected,
}

/// Signals a running session reports to its observer, mirroring the
/// `ready | message | sending | error | close` events of the design.
#[derive(Debug)]
pub enum PeerEvent {
    Ready,
    Message(Vec<u8>),
    Sending(Vec<u8>),
    Error(SessionError),
    Close,
}

/// Commands an observer can issue to a running session.
#[derive(Debug)]
pub enum PeerCommand {
    Send(Vec<u8>),
    Disconnect,
}

/// Why a `PeerSession::run` call returned. The reconnect loop in
/// [`crate::reconnect`] only retries on `StreamClosed` — a locally decided
/// disconnect (user-requested or a protocol violation we caught) never
/// reconnects, matching the `Disconnecting -> close` row of the lifecycle
/// table, which is a terminal, no-reconnect transition.
#[derive(Debug)]
pub enum SessionOutcome {
    ClosedByUser,
    FatalError,
    /// The transport closed or failed without a local disconnect request.
    /// `reached_ready` tells the reconnect loop whether to reset its
    /// backoff counter: only a session that made it to `Ready` counts as a
    /// successful connection for that purpose.
    StreamClosed { reached_ready: bool },
}

/// A lifecycle state machine over one [`NoiseTransport`]: exchanges `init`,
/// answers/verifies BOLT #1 ping/pong, and forwards application payloads
/// to its observer. One `PeerSession` is consumed per connection attempt;
/// reconnect drives a fresh one over a fresh transport.
pub struct PeerSession {
    config: PeerSessionConfig,
    liveness: Box<dyn LivenessPolicy>,
}

impl PeerSession {
    pub fn new(config: PeerSessionConfig) -> Self {
        PeerSession::with_liveness(config, Box::new(BoltPingPong::new()))
    }

    pub fn with_liveness(config: PeerSessionConfig, liveness: Box<dyn LivenessPolicy>) -> Self {
        PeerSession { config, liveness }
    }

    fn local_init(&self) -> Init {
        Init {
            global_features: self.config.init_features.global.clone(),
            local_features: self.config.init_features.local.clone(),
        }
    }

    /// Validates an inbound `init`: odd-indexed unrecognized bits are
    /// tolerated per BOLT #1's "it's okay to be odd" rule, even-indexed
    /// ones are fatal.
    fn check_required_features(&self, init: &Init) -> Result<(), SessionError> {
        for bits in [&init.global_features, &init.local_features] {
            if let Some(&bad) = bits.unknown_required_bits(self.config.known_feature_bits).first() {
                return Err(SessionError::UnknownRequiredFeature(bad));
            }
        }
        Ok(())
    }

    /// Drives the session to completion: sends the local `init`, awaits
    /// the peer's, then serves `Ready` until the transport closes, a fatal
    /// protocol error occurs, or the observer asks to disconnect.
    pub async fn run<S>(
        mut self,
        mut transport: NoiseTransport<S>,
        events: mpsc::Sender<PeerEvent>,
        commands: &mut mpsc::Receiver<PeerCommand>,
    ) -> SessionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let local_init = self.local_init();
        if let Err(e) = transport.send_message(&local_init.encode()).await {
            return self.fail(&events, e.into()).await;
        }

        let mut state = PeerState::AwaitingPeerInit;
        let mut ping_timer = tokio::time::interval(Duration::from_millis(self.config.ping_interval_ms));
        ping_timer.tick().await; // first tick fires immediately; consume it.

        // Armed whenever a ping is outstanding and disarmed once it's
        // answered; firing before that means the peer didn't reply within
        // `ping_timeout_ms`, independent of how often we re-tick.
        let mut pong_deadline: Option<Pin<Box<Sleep>>> = None;

        loop {
            let pong_timed_out = async {
                match pong_deadline.as_mut() {
                    Some(sleep) => sleep.as_mut().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                frame = transport.read_message() => {
                    match frame {
                        Ok(Some(payload)) => {
                            match self
                                .handle_inbound(state, &mut transport, &events, payload, &mut pong_deadline)
                                .await
                            {
                                Ok(Some(next)) => {
                                    state = next;
                                    if state == PeerState::Ready {
                                        // the 30s liveness timer is scoped to Ready, not
                                        // to the time the init handshake happened to take.
                                        ping_timer.reset();
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => return self.fail(&events, e).await,
                            }
                        }
                        Ok(None) => return self.close_unsolicited(&events, state == PeerState::Ready).await,
                        Err(e) => {
                            return self
                                .close_unsolicited_after(&events, state == PeerState::Ready, e.into())
                                .await
                        }
                    }
                }
                _ = pong_timed_out, if pong_deadline.is_some() => {
                    return self.fail(&events, SessionError::PingTimeout).await;
                }
                _ = ping_timer.tick() => {
                    if state == PeerState::Ready {
                        if let Some(ping) = self.liveness.on_tick() {
                            trace!("ping tick: sending liveness probe");
                            if let Err(e) = transport.send_message(&Message::Ping(ping).encode()).await {
                                return self.fail(&events, e.into()).await;
                            }
                            pong_deadline = Some(Box::pin(tokio::time::sleep(Duration::from_millis(
                                self.config.ping_timeout_ms,
                            ))));
                        }
                    }
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(PeerCommand::Send(payload)) => {
                            if let Err(e) = transport.send_message(&payload).await {
                                return self.fail(&events, e.into()).await;
                            }
                            let _ = events.send(PeerEvent::Sending(payload)).await;
                        }
                        Some(PeerCommand::Disconnect) | None => {
                            debug!("disconnect requested, closing transport");
                            let _ = events.send(PeerEvent::Close).await;
                            return SessionOutcome::ClosedByUser;
                        }
                    }
                }
            }
        }
    }

    async fn handle_inbound<S>(
        &mut self,
        state: PeerState,
        transport: &mut NoiseTransport<S>,
        events: &mpsc::Sender<PeerEvent>,
        payload: Vec<u8>,
        pong_deadline: &mut Option<Pin<Box<Sleep>>>,
    ) -> Result<Option<PeerState>, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match state {
            PeerState::AwaitingPeerInit => {
                let message = Message::decode(&payload).map_err(SessionError::MalformedInit)?;
                let init = match message {
                    Message::Init(init) => init,
                    _ => return Err(SessionError::UnexpectedMessage),
                };
                self.check_required_features(&init)?;
                debug!("peer init received, session ready");
                let _ = events.send(PeerEvent::Ready).await;
                Ok(Some(PeerState::Ready))
            }
            PeerState::Ready => {
                match Message::decode(&payload) {
                    Ok(Message::Ping(ping)) => {
                        if let Some(pong) = self.liveness.on_ping(&ping) {
                            let encoded = Message::Pong(pong).encode();
                            transport.send_message(&encoded).await?;
                            let _ = events.send(PeerEvent::Sending(encoded)).await;
                        }
                    }
                    Ok(Message::Pong(pong)) => {
                        self.liveness.on_pong(&pong)?;
                        *pong_deadline = None;
                    }
                    _ => {}
                }
                let _ = events.send(PeerEvent::Message(payload)).await;
                Ok(None)
            }
            PeerState::Disconnecting | PeerState::Disconnected => Ok(None),
        }
    }

    async fn fail(&self, events: &mpsc::Sender<PeerEvent>, err: SessionError) -> SessionOutcome {
        warn!(error = %err, "session closing on fatal error");
        let _ = events.send(PeerEvent::Error(err)).await;
        let _ = events.send(PeerEvent::Close).await;
        SessionOutcome::FatalError
    }

    async fn close_unsolicited(&self, events: &mpsc::Sender<PeerEvent>, reached_ready: bool) -> SessionOutcome {
        debug!("underlying stream closed without a local disconnect request");
        let _ = events.send(PeerEvent::Close).await;
        SessionOutcome::StreamClosed { reached_ready }
    }

    async fn close_unsolicited_after(
        &self,
        events: &mpsc::Sender<PeerEvent>,
        reached_ready: bool,
        err: SessionError,
    ) -> SessionOutcome {
        warn!(error = %err, "transport failed");
        let _ = events.send(PeerEvent::Error(err)).await;
        self.close_unsolicited(events, reached_ready).await
    }
}
