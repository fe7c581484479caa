use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::errors::TransportError;
use crate::machine::cipher_state::CipherState;

/// Length header ciphertext: a 2-byte big-endian body length, AEAD-sealed
/// with no associated data, so it carries a 16-byte tag.
const LENGTH_CIPHERTEXT_LEN: usize = 2 + 16;

/// The largest plaintext body a single frame can carry: BOLT #1 length
/// fields are 16 bits.
pub const MAX_MESSAGE_LEN: usize = 65535;

/// Where a partially-read frame currently stands. `decode` is re-entered
/// every time more bytes arrive on the wire, so this tracks exactly how
/// much of the next frame has already been authenticated.
enum ReadState {
    /// Nothing of the next frame's length header has been read yet.
    AwaitingLength,
    /// The length header decrypted to `body_len`; its nonce has already
    /// been consumed, so it must never be re-derived on a short read of
    /// the body that follows.
    AwaitingBody { body_len: usize },
}

/// A `tokio_util::codec` pair that turns a raw byte stream into encrypted,
/// length-framed messages using the two `CipherState`s a handshake
/// produced. Intended to be driven through `tokio_util::codec::Framed`.
pub struct NoiseCodec {
    send: CipherState,
    recv: CipherState,
    read_state: ReadState,
    poisoned: bool,
}

impl NoiseCodec {
    pub fn new(send: CipherState, recv: CipherState) -> Self {
        NoiseCodec { send, recv, read_state: ReadState::AwaitingLength, poisoned: false }
    }
}

impl Decoder for NoiseCodec {
    type Item = Vec<u8>;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, TransportError> {
        if self.poisoned {
            return Err(TransportError::Poisoned);
        }

        let body_len = match self.read_state {
            ReadState::AwaitingBody { body_len } => body_len,
            ReadState::AwaitingLength => {
                if src.len() < LENGTH_CIPHERTEXT_LEN {
                    return Ok(None);
                }
                let length_ciphertext = src.split_to(LENGTH_CIPHERTEXT_LEN);
                let plaintext = self.recv.decrypt(&[], &length_ciphertext).map_err(|_| {
                    self.poisoned = true;
                    TransportError::BadMac
                })?;
                let body_len = BigEndian::read_u16(&plaintext) as usize;
                self.read_state = ReadState::AwaitingBody { body_len };
                body_len
            }
        };

        let body_ciphertext_len = body_len + 16;
        if src.len() < body_ciphertext_len {
            return Ok(None);
        }
        let body_ciphertext = src.split_to(body_ciphertext_len);
        let plaintext = self.recv.decrypt(&[], &body_ciphertext).map_err(|_| {
            self.poisoned = true;
            TransportError::BadMac
        })?;
        self.read_state = ReadState::AwaitingLength;
        Ok(Some(plaintext))
    }
}

impl Encoder<Vec<u8>> for NoiseCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), TransportError> {
        if item.len() > MAX_MESSAGE_LEN {
            return Err(TransportError::MessageTooLarge(item.len(), MAX_MESSAGE_LEN));
        }
        let mut len_bytes = [0u8; 2];
        BigEndian::write_u16(&mut len_bytes, item.len() as u16);

        let length_ciphertext = self.send.encrypt(&[], &len_bytes);
        let body_ciphertext = self.send.encrypt(&[], &item);

        dst.reserve(length_ciphertext.len() + body_ciphertext.len());
        dst.put_slice(&length_ciphertext);
        dst.put_slice(&body_ciphertext);
        Ok(())
    }
}

/// An encrypted, framed connection to a peer, established by running a
/// Noise_XK handshake over `S` and then wrapping it in a [`NoiseCodec`].
pub struct NoiseTransport<S> {
    framed: Framed<S, NoiseCodec>,
}

impl<S> NoiseTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, send: CipherState, recv: CipherState) -> Self {
        NoiseTransport { framed: Framed::new(stream, NoiseCodec::new(send, recv)) }
    }

    pub async fn send_message(&mut self, message: &[u8]) -> Result<(), TransportError> {
        self.framed.send(message.to_vec()).await
    }

    /// Returns `Ok(None)` on a clean EOF between frames.
    pub async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.framed.next().await.transpose()
    }

    pub fn into_inner(self) -> S {
        self.framed.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired_cipher_states() -> ((CipherState, CipherState), (CipherState, CipherState)) {
        let ck = [7u8; 32];
        let a_to_b_key = [1u8; 32];
        let b_to_a_key = [2u8; 32];
        let a_side = (CipherState::new(ck, a_to_b_key), CipherState::new(ck, b_to_a_key));
        let b_side = (CipherState::new(ck, b_to_a_key), CipherState::new(ck, a_to_b_key));
        (a_side, b_side)
    }

    #[tokio::test]
    async fn message_round_trips_over_duplex_stream() {
        let ((a_send, a_recv), (b_send, b_recv)) = paired_cipher_states();
        let (client, server) = tokio::io::duplex(4096);
        let mut a = NoiseTransport::new(client, a_send, a_recv);
        let mut b = NoiseTransport::new(server, b_send, b_recv);

        a.send_message(b"hello peer").await.unwrap();
        let received = b.read_message().await.unwrap().unwrap();
        assert_eq!(received, b"hello peer");
    }

    #[tokio::test]
    async fn short_reads_are_buffered_without_reconsuming_length_nonce() {
        let ((a_send, a_recv), (b_send, b_recv)) = paired_cipher_states();
        let mut codec = NoiseCodec::new(a_send, a_recv);
        let mut scratch = BytesMut::new();
        let mut peer_codec = NoiseCodec::new(b_send, b_recv);
        peer_codec.encode(b"hello".to_vec(), &mut scratch).unwrap();

        // feed the frame one byte at a time.
        let whole = scratch.split();
        let mut buf = BytesMut::new();
        let mut result = None;
        for byte in whole.iter() {
            buf.put_u8(*byte);
            result = codec.decode(&mut buf).unwrap();
            if result.is_some() {
                break;
            }
        }
        assert_eq!(result.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn tampered_frame_poisons_the_transport() {
        let ((a_send, a_recv), (b_send, b_recv)) = paired_cipher_states();
        let mut sender_codec = NoiseCodec::new(a_send, a_recv);
        let mut buf = BytesMut::new();
        sender_codec.encode(b"hello".to_vec(), &mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let mut receiver_codec = NoiseCodec::new(b_send, b_recv);
        assert!(receiver_codec.decode(&mut buf).is_err());
        // any further use of the same codec must stay poisoned.
        let mut more = BytesMut::new();
        assert!(matches!(receiver_codec.decode(&mut more), Err(TransportError::Poisoned)));
    }

    #[tokio::test]
    async fn oversized_message_is_rejected_before_encryption() {
        let ((a_send, a_recv), _) = paired_cipher_states();
        let mut codec = NoiseCodec::new(a_send, a_recv);
        let mut buf = BytesMut::new();
        let oversized = vec![0u8; MAX_MESSAGE_LEN + 1];
        let err = codec.encode(oversized, &mut buf).unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLarge(_, _)));
    }
}
