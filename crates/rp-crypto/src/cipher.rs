//! AES-128 keystream cipher for the control channel.

use std::fmt;

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;

use crate::keys::SessionKeyMaterial;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Keystream cipher shared by the auth headers and every control payload.
///
/// There is a single keystream position per session: `encrypt` and `decrypt`
/// both consume it, so calls must happen in exactly the order the bytes travel
/// on the wire. The type is not `Clone`.
pub struct SessionCipher {
    inner: Aes128Ctr,
    position: u64,
}

impl SessionCipher {
    /// Create cipher with key = AES key and initial counter block = session nonce.
    pub fn new(material: &SessionKeyMaterial) -> Self {
        Self::from_parts(material.aes_key, material.session_nonce)
    }

    pub fn from_parts(key: [u8; 16], nonce: [u8; 16]) -> Self {
        Self {
            inner: Aes128Ctr::new(&key.into(), &nonce.into()),
            position: 0,
        }
    }

    /// Encrypt into a new buffer, advancing the keystream by `plaintext.len()`.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let mut out = plaintext.to_vec();
        self.apply_in_place(&mut out);
        out
    }

    /// Decrypt into a new buffer, advancing the keystream by `ciphertext.len()`.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Vec<u8> {
        let mut out = ciphertext.to_vec();
        self.apply_in_place(&mut out);
        out
    }

    /// XOR the next `buf.len()` keystream bytes into `buf`.
    pub fn apply_in_place(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
        self.position += buf.len() as u64;
    }

    /// Keystream bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}
