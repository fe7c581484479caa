//! BOLT #1 message types exchanged once a peer connection is past the
//! Noise handshake: `init`, `ping`, `pong`, and an opaque passthrough for
//! everything this crate doesn't otherwise understand.

mod features;
mod message;

pub use features::FeatureVector;
pub use message::{
    Init, Message, MessageError, Ping, Pong, DECLINE_REPLY_THRESHOLD, INIT_TYPE, PING_TYPE, PONG_TYPE,
};
