use thiserror::Error;

use brontide::{HandshakeError, TransportError};
use wire::MessageError;

/// Failures that can abort a `PeerSession`. Every variant here is fatal to
/// the connection it occurred on: the transport is closed and, if the
/// session initiated the connection and reconnect is enabled, a fresh
/// attempt is scheduled.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("first inbound message after the handshake was not init")]
    UnexpectedMessage,

    #[error("init message could not be decoded: {0}")]
    MalformedInit(#[source] MessageError),

    #[error("remote peer requires feature bit {0}, which this node doesn't recognize")]
    UnknownRequiredFeature(u32),

    #[error("no pong received before the next ping tick")]
    PingTimeout,

    #[error("pong carried {got} ignored bytes, expected {expected}")]
    PongSizeMismatch { expected: u16, got: u16 },

    #[error("received a pong with no ping outstanding")]
    PongUnsolicited,
}
