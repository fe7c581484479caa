use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::features::FeatureVector;

pub const INIT_TYPE: u16 = 16;
pub const PING_TYPE: u16 = 18;
pub const PONG_TYPE: u16 = 19;

/// A `ping` whose `num_pong_bytes` meets or exceeds this must not be
/// answered with a `pong` at all — it's a one-way liveness probe, used so
/// a large `num_pong_bytes` can't be turned into a reflection amplifier.
pub const DECLINE_REPLY_THRESHOLD: u16 = 65532;

/// An upper bound on ignored payload we'll allocate for on an incoming
/// ping/pong: a peer that declares a `num_pong_bytes`/byte-length larger
/// than this is trying to make us allocate on its behalf.
const MAX_IGNORED_LEN: usize = 65535;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message is shorter than its 2-byte type prefix")]
    TooShortForType,

    #[error("init message truncated while reading global features")]
    InitTruncatedGlobalFeatures,

    #[error("init message truncated while reading local features")]
    InitTruncatedLocalFeatures,

    #[error("ping message truncated")]
    PingTruncated,

    #[error("pong message truncated")]
    PongTruncated,

    #[error("declared ignored-byte length {0} exceeds the maximum of {MAX_IGNORED_LEN}")]
    IgnoredLenTooLarge(usize),
}

/// `init` (type 16): the feature vectors a peer announces immediately
/// after the handshake completes.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Init {
    pub global_features: FeatureVector,
    pub local_features: FeatureVector,
}

impl Init {
    pub fn encode(&self) -> Vec<u8> {
        let gf = self.global_features.as_bytes();
        let lf = self.local_features.as_bytes();
        let mut out = Vec::with_capacity(2 + 2 + gf.len() + 2 + lf.len());
        out.extend_from_slice(&INIT_TYPE.to_be_bytes());
        out.extend_from_slice(&(gf.len() as u16).to_be_bytes());
        out.extend_from_slice(gf);
        out.extend_from_slice(&(lf.len() as u16).to_be_bytes());
        out.extend_from_slice(lf);
        out
    }

    /// Decodes the body of an `init` message (type prefix already stripped).
    pub fn decode_body(body: &[u8]) -> Result<Self, MessageError> {
        if body.len() < 2 {
            return Err(MessageError::InitTruncatedGlobalFeatures);
        }
        let gflen = BigEndian::read_u16(&body[0..2]) as usize;
        let gf_start = 2;
        let gf_end = gf_start + gflen;
        if body.len() < gf_end + 2 {
            return Err(MessageError::InitTruncatedGlobalFeatures);
        }
        let global_features = FeatureVector::from_bytes(body[gf_start..gf_end].to_vec());

        let lflen = BigEndian::read_u16(&body[gf_end..gf_end + 2]) as usize;
        let lf_start = gf_end + 2;
        let lf_end = lf_start + lflen;
        if body.len() < lf_end {
            return Err(MessageError::InitTruncatedLocalFeatures);
        }
        let local_features = FeatureVector::from_bytes(body[lf_start..lf_end].to_vec());

        Ok(Init { global_features, local_features })
    }
}

/// `ping` (type 18): a liveness probe that asks the remote peer to echo
/// back `num_pong_bytes` of ignored filler.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Ping {
    pub num_pong_bytes: u16,
    pub ignored: Vec<u8>,
}

impl Ping {
    pub fn new(num_pong_bytes: u16, ignored_len: u16) -> Self {
        Ping { num_pong_bytes, ignored: vec![0u8; ignored_len as usize] }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 2 + 2 + self.ignored.len());
        out.extend_from_slice(&PING_TYPE.to_be_bytes());
        out.extend_from_slice(&self.num_pong_bytes.to_be_bytes());
        out.extend_from_slice(&(self.ignored.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.ignored);
        out
    }

    pub fn decode_body(body: &[u8]) -> Result<Self, MessageError> {
        if body.len() < 4 {
            return Err(MessageError::PingTruncated);
        }
        let num_pong_bytes = BigEndian::read_u16(&body[0..2]);
        let byteslen = BigEndian::read_u16(&body[2..4]) as usize;
        if byteslen > MAX_IGNORED_LEN {
            return Err(MessageError::IgnoredLenTooLarge(byteslen));
        }
        if body.len() < 4 + byteslen {
            return Err(MessageError::PingTruncated);
        }
        Ok(Ping { num_pong_bytes, ignored: body[4..4 + byteslen].to_vec() })
    }
}

/// `pong` (type 19): the reply to a `ping`, carrying `num_pong_bytes` of
/// zero-filled filler.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Pong {
    pub ignored: Vec<u8>,
}

impl Pong {
    pub fn new(num_pong_bytes: u16) -> Self {
        Pong { ignored: vec![0u8; num_pong_bytes as usize] }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 2 + self.ignored.len());
        out.extend_from_slice(&PONG_TYPE.to_be_bytes());
        out.extend_from_slice(&(self.ignored.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.ignored);
        out
    }

    pub fn decode_body(body: &[u8]) -> Result<Self, MessageError> {
        if body.len() < 2 {
            return Err(MessageError::PongTruncated);
        }
        let byteslen = BigEndian::read_u16(&body[0..2]) as usize;
        if byteslen > MAX_IGNORED_LEN {
            return Err(MessageError::IgnoredLenTooLarge(byteslen));
        }
        if body.len() < 2 + byteslen {
            return Err(MessageError::PongTruncated);
        }
        Ok(Pong { ignored: body[2..2 + byteslen].to_vec() })
    }
}

/// A decoded BOLT #1 message. Types outside the set this crate understands
/// round-trip as opaque payloads rather than failing to decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Init(Init),
    Ping(Ping),
    Pong(Pong),
    Unknown { type_: u16, payload: Vec<u8> },
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Init(init) => init.encode(),
            Message::Ping(ping) => ping.encode(),
            Message::Pong(pong) => pong.encode(),
            Message::Unknown { type_, payload } => {
                let mut out = Vec::with_capacity(2 + payload.len());
                out.extend_from_slice(&type_.to_be_bytes());
                out.extend_from_slice(payload);
                out
            }
        }
    }

    /// Decodes a full message, including its leading 2-byte type field.
    pub fn decode(raw: &[u8]) -> Result<Self, MessageError> {
        if raw.len() < 2 {
            return Err(MessageError::TooShortForType);
        }
        let type_ = BigEndian::read_u16(&raw[0..2]);
        let body = &raw[2..];
        match type_ {
            INIT_TYPE => Ok(Message::Init(Init::decode_body(body)?)),
            PING_TYPE => Ok(Message::Ping(Ping::decode_body(body)?)),
            PONG_TYPE => Ok(Message::Pong(Pong::decode_body(body)?)),
            other => Ok(Message::Unknown { type_: other, payload: body.to_vec() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_vector_roundtrips() {
        // type=16 gflen=0 lflen=1 lf=[0x02]
        let raw = hex::decode("001000000001 02".replace(' ', "")).unwrap();
        let msg = Message::decode(&raw).unwrap();
        let init = match &msg {
            Message::Init(init) => init,
            _ => panic!("expected Init"),
        };
        assert!(init.global_features.as_bytes().is_empty());
        assert_eq!(init.local_features.as_bytes(), &[0x02]);
        assert_eq!(msg.encode(), raw);
    }

    #[test]
    fn ping_pong_vectors_roundtrip() {
        let ping_raw = hex::decode("0012000100 00".replace(' ', "")).unwrap();
        let msg = Message::decode(&ping_raw).unwrap();
        let ping = match &msg {
            Message::Ping(ping) => ping.clone(),
            _ => panic!("expected Ping"),
        };
        assert_eq!(ping.num_pong_bytes, 1);
        assert!(ping.ignored.is_empty());
        assert_eq!(msg.encode(), ping_raw);

        let pong = Pong::new(ping.num_pong_bytes);
        let pong_raw = hex::decode("00130001 00".replace(' ', "")).unwrap();
        assert_eq!(Message::Pong(pong).encode(), pong_raw);
    }

    #[test]
    fn ping_with_oversized_ignored_len_is_rejected() {
        let mut raw = vec![0x00, 0x12, 0x00, 0x01, 0xff, 0xff];
        raw.extend(std::iter::repeat(0u8).take(10));
        let err = Message::decode(&raw).unwrap_err();
        assert!(matches!(err, MessageError::PingTruncated));
    }

    #[test]
    fn unknown_type_round_trips_as_opaque() {
        let raw = vec![0x00, 0x22, 0xde, 0xad, 0xbe, 0xef];
        let msg = Message::decode(&raw).unwrap();
        assert_eq!(msg, Message::Unknown { type_: 0x22, payload: vec![0xde, 0xad, 0xbe, 0xef] });
        assert_eq!(msg.encode(), raw);
    }

    #[test]
    fn truncated_message_is_rejected() {
        let err = Message::decode(&[0x00]).unwrap_err();
        assert!(matches!(err, MessageError::TooShortForType));
    }
}
