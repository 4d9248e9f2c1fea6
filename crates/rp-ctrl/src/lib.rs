//! # rp-ctrl
//!
//! Control channel client for Remote Play hosts.
//!
//! This crate provides:
//! - The init/auth HTTP handshake that opens the control socket
//! - Control message framing over the session keystream
//! - The session state machine (heartbeats, session id capture)
//! - A receive loop task driven by a cloneable [`ControlHandle`]
//! - Streaming bootstrap through the [`StreamLauncher`] seam
//!
//! ```no_run
//! # async fn run(tables: rp_crypto::KeyTables, credential: rp_core::PairingCredential) -> rp_core::Result<()> {
//! use rp_ctrl::SessionBuilder;
//!
//! let handle = SessionBuilder::new(tables)
//!     .start("192.168.1.20".parse().unwrap(), credential)
//!     .await?;
//! handle.standby()?;
//! handle.stop();
//! handle.join().await
//! # }
//! ```

pub mod builder;
pub mod events;
pub mod handle;
pub mod handshake;
pub mod message;
pub mod request;
pub mod response;
pub mod session;
pub mod stream;
mod worker;

pub use builder::{ControlConfig, SessionBuilder};
pub use events::{CallbackHandler, ControlEvent, EventHandler, NoOpHandler, SessionReadyHandler};
pub use handle::{ControlHandle, SessionStatus};
pub use handshake::{Established, HandshakeClient};
pub use message::{ControlMessage, FrameDecoder, MessageType};
pub use request::{AuthHeaders, HttpRequest};
pub use response::HttpResponse;
pub use session::{ControlSession, MalformedSessionIdPolicy, SessionEvent, SessionState};
pub use stream::{NetworkMeasurement, NoopLauncher, StreamLauncher, StreamOptions, StreamRequest};

#[cfg(any(test, feature = "mock"))]
pub use stream::MockStreamLauncher;
