use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use secp256k1::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::HandshakeError;
use crate::machine::cipher_state::CipherState;

const PROTOCOL_NAME: &[u8] = b"Noise_XK_secp256k1_ChaChaPoly_SHA256";
const PROLOGUE: &[u8] = b"lightning";
const HANDSHAKE_VERSION: u8 = 0;

const ACT_ONE_LEN: usize = 50;
const ACT_TWO_LEN: usize = 50;
const ACT_THREE_LEN: usize = 66;

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn ecdh(pubkey: &PublicKey, seckey: &SecretKey) -> [u8; 32] {
    secp256k1::ecdh::SharedSecret::new(pubkey, seckey).secret_bytes()
}

/// The running symmetric state of the handshake: a chaining key threaded
/// through HKDF at each mix_key, a running transcript hash, and the most
/// recently derived key used to encrypt/decrypt the next handshake payload.
struct SymmetricState {
    chaining_key: [u8; 32],
    handshake_digest: [u8; 32],
    temp_key: [u8; 32],
}

impl SymmetricState {
    fn initialize(protocol_name: &[u8]) -> Self {
        let chaining_key = if protocol_name.len() <= 32 {
            let mut ck = [0u8; 32];
            ck[..protocol_name.len()].copy_from_slice(protocol_name);
            ck
        } else {
            sha256(protocol_name)
        };
        SymmetricState {
            chaining_key,
            handshake_digest: sha256(protocol_name),
            temp_key: [0u8; 32],
        }
    }

    fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.handshake_digest);
        hasher.update(data);
        self.handshake_digest = hasher.finalize().into();
    }

    fn mix_key(&mut self, input_key_material: &[u8]) {
        let hk = Hkdf::<Sha256>::new(Some(&self.chaining_key), input_key_material);
        let mut okm = [0u8; 64];
        hk.expand(&[], &mut okm)
            .expect("64 is a valid HKDF-SHA256 output length");
        self.chaining_key.copy_from_slice(&okm[0..32]);
        self.temp_key.copy_from_slice(&okm[32..64]);
    }

    /// Encrypts `plaintext` with the current `temp_key`, mixing the
    /// ciphertext into the transcript hash. The nonce is always zero: each
    /// call here immediately follows the `mix_key` that produced `temp_key`,
    /// so no key is ever reused across more than one encryption.
    fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.temp_key));
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&[0u8; 12]),
                Payload { msg: plaintext, aad: &self.handshake_digest },
            )
            .expect("encryption with a valid key/nonce pair cannot fail");
        self.mix_hash(&ciphertext);
        ciphertext
    }

    fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.temp_key));
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&[0u8; 12]),
                Payload { msg: ciphertext, aad: &self.handshake_digest },
            )
            .map_err(|_| HandshakeError::BadMac)?;
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }
}

struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKey::from_secret_key(&secp256k1::SECP256K1, &secret);
        Keypair { secret, public }
    }

    fn generate() -> Self {
        Keypair::from_secret(SecretKey::new(&mut rand::thread_rng()))
    }
}

/// Drives the three-act Noise_XK handshake. One `HandshakeMachine` is
/// consumed over the course of a single handshake; `run` hands back the
/// two directional `CipherState`s and the peer's static public key.
struct HandshakeMachine {
    symmetric_state: SymmetricState,
    initiator: bool,
    local_static: Keypair,
    local_ephemeral: Option<Keypair>,
    remote_static: Option<PublicKey>,
    remote_ephemeral: Option<PublicKey>,
}

impl HandshakeMachine {
    fn new(initiator: bool, local_static: Keypair, remote_static: Option<PublicKey>) -> Self {
        let responder_static_pubkey = if initiator {
            remote_static.expect("initiator must be configured with the responder's static key")
        } else {
            local_static.public
        };

        let mut symmetric_state = SymmetricState::initialize(PROTOCOL_NAME);
        symmetric_state.mix_hash(PROLOGUE);
        symmetric_state.mix_hash(&responder_static_pubkey.serialize());

        HandshakeMachine {
            symmetric_state,
            initiator,
            local_static,
            local_ephemeral: None,
            remote_static,
            remote_ephemeral: None,
        }
    }

    /// Act One, initiator side: generate `e`, mix it into the transcript,
    /// ECDH it against the responder's known static key, and authenticate
    /// an empty payload under the resulting key.
    fn gen_act_one(&mut self) -> [u8; ACT_ONE_LEN] {
        let local_ephemeral = Keypair::generate();
        self.symmetric_state.mix_hash(&local_ephemeral.public.serialize());

        let es = ecdh(
            &self.remote_static.expect("initiator knows the responder's static key"),
            &local_ephemeral.secret,
        );
        self.symmetric_state.mix_key(&es);
        let tag = self.symmetric_state.encrypt_and_hash(&[]);

        let mut act = [0u8; ACT_ONE_LEN];
        act[0] = HANDSHAKE_VERSION;
        act[1..34].copy_from_slice(&local_ephemeral.public.serialize());
        act[34..50].copy_from_slice(&tag);
        self.local_ephemeral = Some(local_ephemeral);
        act
    }

    /// Act One, responder side: read the initiator's ephemeral key, redo
    /// the same ECDH and MAC check from the other side.
    fn recv_act_one(&mut self, act: &[u8; ACT_ONE_LEN]) -> Result<(), HandshakeError> {
        if act[0] != HANDSHAKE_VERSION {
            return Err(HandshakeError::UnknownVersion(act[0]));
        }
        let remote_ephemeral = PublicKey::from_slice(&act[1..34])?;
        self.symmetric_state.mix_hash(&remote_ephemeral.serialize());

        let es = ecdh(&remote_ephemeral, &self.local_static.secret);
        self.symmetric_state.mix_key(&es);
        self.symmetric_state.decrypt_and_hash(&act[34..50])?;

        self.remote_ephemeral = Some(remote_ephemeral);
        Ok(())
    }

    /// Act Two, responder side: generate its own ephemeral key, ECDH it
    /// against the initiator's ephemeral key, authenticate an empty
    /// payload.
    fn gen_act_two(&mut self) -> [u8; ACT_TWO_LEN] {
        let local_ephemeral = Keypair::generate();
        self.symmetric_state.mix_hash(&local_ephemeral.public.serialize());

        let ee = ecdh(
            self.remote_ephemeral
                .as_ref()
                .expect("act one must be processed before act two is generated"),
            &local_ephemeral.secret,
        );
        self.symmetric_state.mix_key(&ee);
        let tag = self.symmetric_state.encrypt_and_hash(&[]);

        let mut act = [0u8; ACT_TWO_LEN];
        act[0] = HANDSHAKE_VERSION;
        act[1..34].copy_from_slice(&local_ephemeral.public.serialize());
        act[34..50].copy_from_slice(&tag);
        self.local_ephemeral = Some(local_ephemeral);
        act
    }

    /// Act Two, initiator side.
    fn recv_act_two(&mut self, act: &[u8; ACT_TWO_LEN]) -> Result<(), HandshakeError> {
        if act[0] != HANDSHAKE_VERSION {
            return Err(HandshakeError::UnknownVersion(act[0]));
        }
        let remote_ephemeral = PublicKey::from_slice(&act[1..34])?;
        self.symmetric_state.mix_hash(&remote_ephemeral.serialize());

        let ee = ecdh(
            &remote_ephemeral,
            &self
                .local_ephemeral
                .as_ref()
                .expect("act one must generate a local ephemeral key before act two is read")
                .secret,
        );
        self.symmetric_state.mix_key(&ee);
        self.symmetric_state.decrypt_and_hash(&act[34..50])?;

        self.remote_ephemeral = Some(remote_ephemeral);
        Ok(())
    }

    /// Act Three, initiator side: encrypt the initiator's static key under
    /// the current key, mix in a final ECDH between that static key and
    /// the responder's ephemeral key, then authenticate an empty payload.
    fn gen_act_three(&mut self) -> [u8; ACT_THREE_LEN] {
        let encrypted_static_key = self
            .symmetric_state
            .encrypt_and_hash(&self.local_static.public.serialize());

        let se = ecdh(
            self.remote_ephemeral
                .as_ref()
                .expect("act two must be processed before act three is generated"),
            &self.local_static.secret,
        );
        self.symmetric_state.mix_key(&se);
        let tag = self.symmetric_state.encrypt_and_hash(&[]);

        let mut act = [0u8; ACT_THREE_LEN];
        act[0] = HANDSHAKE_VERSION;
        act[1..50].copy_from_slice(&encrypted_static_key);
        act[50..66].copy_from_slice(&tag);
        act
    }

    /// Act Three, responder side: decrypt the initiator's static key,
    /// complete the matching ECDH, verify the closing tag.
    fn recv_act_three(&mut self, act: &[u8; ACT_THREE_LEN]) -> Result<(), HandshakeError> {
        if act[0] != HANDSHAKE_VERSION {
            return Err(HandshakeError::UnknownVersion(act[0]));
        }
        let remote_static_bytes = self.symmetric_state.decrypt_and_hash(&act[1..50])?;
        let remote_static = PublicKey::from_slice(&remote_static_bytes)?;

        let se = ecdh(&remote_static, &self.local_ephemeral.as_ref().unwrap().secret);
        self.symmetric_state.mix_key(&se);
        self.symmetric_state.decrypt_and_hash(&act[50..66])?;

        self.remote_static = Some(remote_static);
        Ok(())
    }

    /// Splits the final chaining key into the two directional transport
    /// keys. The initiator's first key becomes its sending key; the
    /// responder swaps the two.
    fn split(self) -> (CipherState, CipherState, PublicKey) {
        let hk = Hkdf::<Sha256>::new(Some(&self.symmetric_state.chaining_key), &[]);
        let mut okm = [0u8; 64];
        hk.expand(&[], &mut okm)
            .expect("64 is a valid HKDF-SHA256 output length");
        let t1: [u8; 32] = okm[0..32].try_into().unwrap();
        let t2: [u8; 32] = okm[32..64].try_into().unwrap();

        let remote_static = self.remote_static.expect("handshake must finish all three acts");
        let (send_key, recv_key) = if self.initiator { (t1, t2) } else { (t2, t1) };
        (
            CipherState::new(self.symmetric_state.chaining_key, send_key),
            CipherState::new(self.symmetric_state.chaining_key, recv_key),
            remote_static,
        )
    }
}

/// The output of a completed handshake: independent send/receive cipher
/// states plus the peer's authenticated static public key.
pub struct Handshaken {
    pub send: CipherState,
    pub recv: CipherState,
    pub remote_static: PublicKey,
}

async fn write_act<S: AsyncWrite + Unpin>(stream: &mut S, act: &[u8]) -> Result<(), HandshakeError> {
    stream.write_all(act).await?;
    stream.flush().await?;
    Ok(())
}

/// Runs the handshake as the connecting side, given the responder's known
/// static public key.
pub async fn initiate<S>(
    stream: &mut S,
    local_static: SecretKey,
    remote_static: PublicKey,
) -> Result<Handshaken, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut machine =
        HandshakeMachine::new(true, Keypair::from_secret(local_static), Some(remote_static));

    let act_one = machine.gen_act_one();
    write_act(stream, &act_one).await?;

    let mut act_two = [0u8; ACT_TWO_LEN];
    stream.read_exact(&mut act_two).await?;
    machine.recv_act_two(&act_two)?;

    let act_three = machine.gen_act_three();
    write_act(stream, &act_three).await?;

    let (send, recv, remote_static) = machine.split();
    Ok(Handshaken { send, recv, remote_static })
}

/// Runs the handshake as the listening side. The responder learns the
/// initiator's static key during Act Three.
pub async fn accept<S>(stream: &mut S, local_static: SecretKey) -> Result<Handshaken, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut machine = HandshakeMachine::new(false, Keypair::from_secret(local_static), None);

    let mut act_one = [0u8; ACT_ONE_LEN];
    stream.read_exact(&mut act_one).await?;
    machine.recv_act_one(&act_one)?;

    let act_two = machine.gen_act_two();
    write_act(stream, &act_two).await?;

    let mut act_three = [0u8; ACT_THREE_LEN];
    stream.read_exact(&mut act_three).await?;
    machine.recv_act_three(&act_three)?;

    let (send, recv, remote_static) = machine.split();
    Ok(Handshaken { send, recv, remote_static })
}
