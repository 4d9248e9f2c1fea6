//! # rp-core
//!
//! Core types, constants and error definitions shared across the Remote Play crates.
//!
//! This crate provides:
//! - Host type identification
//! - Pairing credentials and the credential store seam
//! - Protocol constants (ports, paths, versions)
//! - Common error types

pub mod error;
pub mod host;
pub mod protocol;

pub use error::{
    ApplicationReason, CryptoError, Error, FailureKind, HandshakeError, ParseError,
    ProtocolError, Result,
};
pub use host::{CredentialStore, HostType, MemoryCredentialStore, PairingCredential};
