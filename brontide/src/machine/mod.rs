mod cipher_state;
mod handshake;
mod transport;

pub use cipher_state::{CipherState, KEY_ROTATION_INTERVAL};
pub use handshake::{accept, initiate, Handshaken};
pub use transport::{NoiseCodec, NoiseTransport, MAX_MESSAGE_LEN};
