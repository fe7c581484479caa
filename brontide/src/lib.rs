//! BOLT #8 Noise_XK handshake and the encrypted, length-framed transport
//! built on top of it.

#![forbid(unsafe_code)]

mod errors;
mod machine;
pub mod tcp;

pub use errors::{HandshakeError, TransportError};
pub use machine::{accept, initiate, CipherState, Handshaken, NoiseCodec, NoiseTransport};
pub use machine::{KEY_ROTATION_INTERVAL, MAX_MESSAGE_LEN};
