//! Protocol constants shared by the control client crates.

use std::time::Duration;

/// TCP port of the session HTTP endpoints and the control channel.
pub const RP_PORT: u16 = 9295;

/// Value of the `Rp-Version` header.
pub const RP_VERSION: &str = "10.0";

/// Default `User-Agent` header.
pub const USER_AGENT: &str = "remoteplay Windows";

/// Default client OS type sent (encrypted) in `RP-OSType`.
pub const OS_TYPE: &str = "Win10.0.0";

/// Size of nonces, keys and the per-block lookup window.
pub const RP_CRYPT_SIZE: usize = 16;

pub const INIT_PATH: &str = "/sie/ps4/rp/sess/init";
pub const CTRL_PATH: &str = "/sie/ps4/rp/sess/ctrl";

/// Heartbeat staleness after which a corrective request is sent.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Stream defaults used when no measurement is available.
pub const DEFAULT_MTU: u16 = 1454;
pub const DEFAULT_RTT: Duration = Duration::from_secs(1);
