//! # rp-discovery
//!
//! Host availability checks for Remote Play consoles.
//!
//! This crate provides:
//! - The `Availability` trait consulted before every handshake
//! - DDP (device discovery protocol) message building and reply parsing
//! - `DdpProbe`, a UDP probe implementing `Availability`
//!
//! ## Example
//!
//! ```ignore
//! use rp_discovery::{Availability, DdpProbe};
//!
//! let probe = DdpProbe::new();
//! if probe.is_available(host, HostType::Ps4).await {
//!     println!("{} is up", host);
//! }
//! ```

mod parser;
mod probe;
mod traits;

pub use parser::{ddp_port, search_message, DdpResponse, DDP_PORT_PS4, DDP_PORT_PS5};
pub use probe::DdpProbe;
pub use traits::{AssumeAvailable, Availability};

#[cfg(any(test, feature = "mock"))]
pub use traits::MockAvailability;
