//! # rp-crypto
//!
//! Cryptographic primitives for the Remote Play control channel.
//!
//! This crate provides:
//! - Session nonce and AES key derivation from the server nonce
//! - The AES-128 keystream cipher shared by auth headers and control messages
//!
//! Key material is zeroized on drop.

pub mod cipher;
pub mod keys;

pub use cipher::SessionCipher;
pub use keys::{KeyTables, SessionKeyMaterial, MIN_TABLE_LEN};
