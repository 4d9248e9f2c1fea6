//! Session key derivation from the server nonce and the registered RP key.
//!
//! Both transforms pick a 112-byte block out of a lookup table using the top
//! five bits of one nonce byte, then scramble the first 16 bytes of that block
//! with the inputs. The arithmetic must match the host byte for byte; any
//! difference desynchronizes the control cipher.

use std::fmt;
use std::path::Path;

use rp_core::error::CryptoError;
use rp_core::protocol::RP_CRYPT_SIZE;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Distance between two selectable blocks.
pub const TABLE_BLOCK_STRIDE: usize = 112;

/// Smallest table that can serve every block index (`0xff >> 3 == 31`).
pub const MIN_TABLE_LEN: usize = 31 * TABLE_BLOCK_STRIDE + RP_CRYPT_SIZE;

/// The two lookup tables used by [`KeyTables::session_nonce`] and
/// [`KeyTables::aes_key`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyTables {
    nonce_table: Vec<u8>,
    key_table: Vec<u8>,
}

/// Nonce and AES key for one control session.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeyMaterial {
    pub session_nonce: [u8; 16],
    pub aes_key: [u8; 16],
}

impl KeyTables {
    /// Create from the nonce table (A) and key table (B).
    pub fn new(nonce_table: Vec<u8>, key_table: Vec<u8>) -> Result<Self, CryptoError> {
        for table in [&nonce_table, &key_table] {
            if table.len() < MIN_TABLE_LEN {
                return Err(CryptoError::InvalidKeyTable {
                    minimum: MIN_TABLE_LEN,
                    actual: table.len(),
                });
            }
        }
        Ok(Self {
            nonce_table,
            key_table,
        })
    }

    /// Load both tables from raw binary files.
    pub fn from_files(
        nonce_table: impl AsRef<Path>,
        key_table: impl AsRef<Path>,
    ) -> Result<Self, rp_core::Error> {
        let a = std::fs::read(nonce_table)?;
        let b = std::fs::read(key_table)?;
        Ok(Self::new(a, b)?)
    }

    /// Derive the session nonce (cipher IV) from the server nonce.
    pub fn session_nonce(&self, server_nonce: &[u8]) -> Result<[u8; 16], CryptoError> {
        check_len(server_nonce)?;
        let block = block_at(&self.nonce_table, server_nonce[0]);

        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = server_nonce[i].wrapping_add(54).wrapping_add(i as u8) ^ block[i];
        }
        Ok(out)
    }

    /// Derive the AES session key from the server nonce and RP key.
    pub fn aes_key(&self, server_nonce: &[u8], rp_key: &[u8]) -> Result<[u8; 16], CryptoError> {
        check_len(server_nonce)?;
        check_len(rp_key)?;
        let block = block_at(&self.key_table, server_nonce[7]);

        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = (block[i] ^ rp_key[i])
                .wrapping_add(33)
                .wrapping_add(i as u8)
                ^ server_nonce[i];
        }
        Ok(out)
    }

    /// Run both derivations.
    pub fn derive(
        &self,
        server_nonce: &[u8],
        rp_key: &[u8],
    ) -> Result<SessionKeyMaterial, CryptoError> {
        let session_nonce = self.session_nonce(server_nonce)?;
        let aes_key = self.aes_key(server_nonce, rp_key)?;
        tracing::debug!(
            session_nonce = %hex::encode(session_nonce),
            "Derived control session key material"
        );
        Ok(SessionKeyMaterial {
            session_nonce,
            aes_key,
        })
    }
}

impl fmt::Debug for KeyTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTables")
            .field("nonce_table_len", &self.nonce_table.len())
            .field("key_table_len", &self.key_table.len())
            .finish()
    }
}

fn check_len(input: &[u8]) -> Result<(), CryptoError> {
    if input.len() != RP_CRYPT_SIZE {
        return Err(CryptoError::InvalidInputLength {
            expected: RP_CRYPT_SIZE,
            actual: input.len(),
        });
    }
    Ok(())
}

fn block_at(table: &[u8], selector: u8) -> &[u8] {
    let offset = (selector >> 3) as usize * TABLE_BLOCK_STRIDE;
    &table[offset..offset + RP_CRYPT_SIZE]
}
