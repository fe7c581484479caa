use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

/// Number of AEAD operations a key is used for before it's rotated via
/// `rotate_key`. BOLT #8 fixes this at 1000.
pub const KEY_ROTATION_INTERVAL: u64 = 1000;

/// AEAD authentication failed. Callers map this to whichever domain error
/// (handshake vs. post-handshake transport) applies at their call site.
#[derive(Debug)]
pub struct DecryptFailed;

/// One direction's symmetric crypto state: a ChaCha20-Poly1305 key, the
/// chaining key it was derived from, and a nonce counter. Nonces are the
/// 96-bit value `0x00000000 || LE64(counter)`, per BOLT #8.
pub struct CipherState {
    nonce: u64,
    key: [u8; 32],
    chaining_key: [u8; 32],
}

impl CipherState {
    pub fn new(chaining_key: [u8; 32], key: [u8; 32]) -> Self {
        CipherState { nonce: 0, key, chaining_key }
    }

    fn nonce_bytes(&self) -> Nonce {
        let mut bytes = [0u8; 12];
        bytes[4..].copy_from_slice(&self.nonce.to_le_bytes());
        *Nonce::from_slice(&bytes)
    }

    fn advance(&mut self) {
        self.nonce += 1;
        if self.nonce == KEY_ROTATION_INTERVAL {
            self.rotate_key();
        }
    }

    /// HKDF(chaining_key, key) -> (new chaining_key, new key), nonce reset
    /// to zero, so both directions stay usable indefinitely without ever
    /// reusing a nonce under a given key.
    fn rotate_key(&mut self) {
        let hk = Hkdf::<Sha256>::new(Some(&self.chaining_key), &self.key);
        let mut okm = [0u8; 64];
        hk.expand(&[], &mut okm)
            .expect("64 is a valid HKDF-SHA256 output length");
        self.chaining_key.copy_from_slice(&okm[0..32]);
        self.key.copy_from_slice(&okm[32..64]);
        self.nonce = 0;
    }

    /// Encrypts `plaintext` under `ad` as associated data. Returns
    /// ciphertext with the 16-byte Poly1305 tag appended.
    pub fn encrypt(&mut self, ad: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let nonce = self.nonce_bytes();
        let out = cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad: ad })
            .expect("encryption with a valid key/nonce pair cannot fail");
        self.advance();
        out
    }

    /// Decrypts `ciphertext` (with its trailing 16-byte tag) under `ad`.
    pub fn decrypt(&mut self, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptFailed> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let nonce = self.nonce_bytes();
        let out = cipher
            .decrypt(&nonce, Payload { msg: ciphertext, aad: ad })
            .map_err(|_| DecryptFailed)?;
        self.advance();
        Ok(out)
    }

    #[cfg(test)]
    pub fn key(&self) -> [u8; 32] {
        self.key
    }

    #[cfg(test)]
    pub fn chaining_key(&self) -> [u8; 32] {
        self.chaining_key
    }
}

impl Drop for CipherState {
    fn drop(&mut self) {
        self.key.zeroize();
        self.chaining_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rotates_after_interval() {
        let mut cs = CipherState::new([0u8; 32], [1u8; 32]);
        let key_before = cs.key();
        for _ in 0..KEY_ROTATION_INTERVAL {
            let _ = cs.encrypt(b"", b"hello");
        }
        assert_ne!(cs.key(), key_before);
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let mut sender = CipherState::new([0u8; 32], [2u8; 32]);
        let mut receiver = CipherState::new([0u8; 32], [2u8; 32]);
        let mut ct = sender.encrypt(b"ad", b"message");
        ct[0] ^= 0xff;
        assert!(receiver.decrypt(b"ad", &ct).is_err());
    }

    #[test]
    fn roundtrip_preserves_plaintext() {
        let mut sender = CipherState::new([3u8; 32], [4u8; 32]);
        let mut receiver = CipherState::new([3u8; 32], [4u8; 32]);
        for i in 0..5u8 {
            let pt = vec![i; 10];
            let ct = sender.encrypt(b"", &pt);
            let decrypted = receiver.decrypt(b"", &ct).unwrap();
            assert_eq!(decrypted, pt);
        }
    }
}
