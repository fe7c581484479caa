use thiserror::Error;

/// Failures that can occur while running the three-act Noise_XK handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("i/o error during handshake: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake act failed cryptographic verification")]
    BadMac,

    #[error("remote sent an ephemeral or static key that doesn't lie on the curve")]
    InvalidPublicKey(#[from] secp256k1::Error),

    #[error("handshake act carries an unsupported version byte: {0}")]
    UnknownVersion(u8),
}

/// Failures that can occur once the transport is past the handshake and is
/// framing/encrypting application messages.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error on the underlying stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("message authentication failed, stream is no longer trustworthy")]
    BadMac,

    #[error("peer declared a message body of {0} bytes, exceeding the maximum of {1}")]
    MessageTooLarge(usize, usize),

    #[error("transport was used after a previous authentication failure poisoned it")]
    Poisoned,
}
