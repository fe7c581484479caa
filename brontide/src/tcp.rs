//! Convenience helpers for running the handshake directly over a
//! [`tokio::net::TcpStream`], the common case for a peer-to-peer link.

use secp256k1::{PublicKey, SecretKey};
use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::HandshakeError;
use crate::machine::{self, NoiseTransport};

/// Dials `addr`, then runs the handshake as the connecting side against
/// the peer's known static public key.
pub async fn connect(
    addr: impl tokio::net::ToSocketAddrs,
    local_static: SecretKey,
    remote_static: PublicKey,
) -> Result<NoiseTransport<TcpStream>, HandshakeError> {
    let mut stream = TcpStream::connect(addr).await?;
    debug!("dialed peer, starting handshake as initiator");
    let handshaken = machine::initiate(&mut stream, local_static, remote_static).await?;
    Ok(NoiseTransport::new(stream, handshaken.send, handshaken.recv))
}

/// Accepts the handshake as the listening side on an already-connected
/// socket. Returns the transport along with the peer's now-authenticated
/// static public key.
pub async fn accept(
    mut stream: TcpStream,
    local_static: SecretKey,
) -> Result<(NoiseTransport<TcpStream>, PublicKey), HandshakeError> {
    debug!("accepted connection, starting handshake as responder");
    let handshaken = machine::accept(&mut stream, local_static).await?;
    let remote_static = handshaken.remote_static;
    Ok((NoiseTransport::new(stream, handshaken.send, handshaken.recv), remote_static))
}
