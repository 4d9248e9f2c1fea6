//! Error types for the Remote Play control client.

use std::fmt;
use std::net::IpAddr;

use thiserror::Error;

/// Primary error type for all Remote Play operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("No pairing credential for {0}")]
    MissingCredential(crate::HostType),

    #[error("Session ID not received yet")]
    SessionNotReady,

    #[error("Control connection closed")]
    TransportClosed,

    #[error("Operation timed out")]
    Timeout,
}

/// Errors while bootstrapping the control channel.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("Host {0} is not reachable")]
    HostUnreachable(IpAddr),

    #[error("Init rejected with status {status}: {reason}")]
    InitRejected { status: u16, reason: ApplicationReason },

    #[error("Init response did not carry a nonce")]
    MissingNonce,

    #[error("Auth rejected with status {status}")]
    AuthRejected { status: u16 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Anomalies on an established control channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown message type: {0:#06x}")]
    UnknownMessageType(u16),

    #[error("Malformed session ID")]
    MalformedSessionId,

    #[error("Frame payload of {len} bytes exceeds {max}")]
    FrameTooLarge { len: usize, max: usize },
}

/// Cryptographic operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid input length: expected {expected}, got {actual}")]
    InvalidInputLength { expected: usize, actual: usize },

    #[error("Invalid key table: need at least {minimum} bytes, got {actual}")]
    InvalidKeyTable { minimum: usize, actual: usize },
}

/// Parsing errors for credentials and wire values.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid hex value: {0}")]
    InvalidHex(String),
}

/// Application level reason sent in `RP-Application-Reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationReason {
    RegistFailed,
    InvalidAccountId,
    InUse,
    Crash,
    VersionMismatch,
    Unknown,
    /// A code outside the documented set.
    Other(u32),
    /// The rejection carried no reason header.
    Missing,
}

impl ApplicationReason {
    pub const REGIST_FAILED: u32 = 0x8010_8b09;
    pub const INVALID_ACCOUNT_ID: u32 = 0x8010_8b02;
    pub const IN_USE: u32 = 0x8010_8b10;
    pub const CRASH: u32 = 0x8010_8b15;
    pub const VERSION_MISMATCH: u32 = 0x8010_8b11;
    pub const UNKNOWN: u32 = 0x8010_8bff;

    pub fn from_code(code: u32) -> Self {
        match code {
            Self::REGIST_FAILED => Self::RegistFailed,
            Self::INVALID_ACCOUNT_ID => Self::InvalidAccountId,
            Self::IN_USE => Self::InUse,
            Self::CRASH => Self::Crash,
            Self::VERSION_MISMATCH => Self::VersionMismatch,
            Self::UNKNOWN => Self::Unknown,
            other => Self::Other(other),
        }
    }

    /// Parse the hex encoded header value (e.g. `80108b10`).
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| u32::from_str_radix(v.trim(), 16)) {
            Some(Ok(code)) => Self::from_code(code),
            Some(Err(_)) | None => Self::Missing,
        }
    }

    /// Numeric code, if the console sent one.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::RegistFailed => Some(Self::REGIST_FAILED),
            Self::InvalidAccountId => Some(Self::INVALID_ACCOUNT_ID),
            Self::InUse => Some(Self::IN_USE),
            Self::Crash => Some(Self::CRASH),
            Self::VersionMismatch => Some(Self::VERSION_MISMATCH),
            Self::Unknown => Some(Self::UNKNOWN),
            Self::Other(code) => Some(*code),
            Self::Missing => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::RegistFailed => "registration failed",
            Self::InvalidAccountId => "invalid account id",
            Self::InUse => "remote play session already in use",
            Self::Crash => "remote play crashed on the host",
            Self::VersionMismatch => "remote play version mismatch",
            Self::Unknown => "unknown error",
            Self::Other(_) => "unrecognized error",
            Self::Missing => "no reason given",
        }
    }
}

impl fmt::Display for ApplicationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{} ({:#010x})", self.description(), code),
            None => f.write_str(self.description()),
        }
    }
}

/// Coarse classification telling the caller which corrective action applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Host is off or not on the network. Retry later or wake it.
    DeviceOffline,
    /// Registration data is invalid or stale. Re-pair.
    Credentials,
    /// Client and host disagree on the protocol version. Upgrade.
    VersionMismatch,
    /// Host is busy with another session. Retry.
    Busy,
    /// Unexpected data from the host.
    Protocol,
    /// Socket level failure.
    Transport,
}

impl Error {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Handshake(HandshakeError::HostUnreachable(_)) => FailureKind::DeviceOffline,
            Error::Handshake(HandshakeError::InitRejected { reason, .. }) => match reason {
                ApplicationReason::RegistFailed | ApplicationReason::InvalidAccountId => {
                    FailureKind::Credentials
                }
                ApplicationReason::VersionMismatch => FailureKind::VersionMismatch,
                ApplicationReason::InUse => FailureKind::Busy,
                _ => FailureKind::Protocol,
            },
            Error::Handshake(HandshakeError::AuthRejected { .. }) => FailureKind::Credentials,
            Error::Handshake(_) | Error::Protocol(_) | Error::Parse(_) | Error::SessionNotReady => {
                FailureKind::Protocol
            }
            Error::Crypto(_) | Error::MissingCredential(_) => FailureKind::Credentials,
            Error::Connection(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                FailureKind::DeviceOffline
            }
            Error::Connection(_) | Error::TransportClosed | Error::Timeout => FailureKind::Transport,
        }
    }
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn error_display_formats() {
        let err = Error::Handshake(HandshakeError::HostUnreachable(IpAddr::V4(Ipv4Addr::new(
            192, 168, 1, 2,
        ))));
        assert!(err.to_string().contains("Handshake error"));
        assert!(err.to_string().contains("192.168.1.2"));

        let err = Error::Handshake(HandshakeError::InitRejected {
            status: 403,
            reason: ApplicationReason::InUse,
        });
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("already in use"));
        assert!(err.to_string().contains("0x80108b10"));

        let err = Error::Protocol(ProtocolError::UnknownMessageType(0x99));
        assert!(err.to_string().contains("0x0099"));

        let err = Error::Protocol(ProtocolError::FrameTooLarge { len: 5_000_000, max: 1 << 20 });
        assert!(err.to_string().contains("5000000"));
        assert_eq!(err.failure_kind(), FailureKind::Protocol);

        assert!(Error::Timeout.to_string().contains("timed out"));
    }

    #[test]
    fn error_conversions() {
        let err: Error = HandshakeError::MissingNonce.into();
        assert!(matches!(err, Error::Handshake(_)));

        let err: Error = ProtocolError::MalformedSessionId.into();
        assert!(matches!(err, Error::Protocol(_)));

        let err: Error = CryptoError::InvalidInputLength { expected: 16, actual: 3 }.into();
        assert!(matches!(err, Error::Crypto(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Connection(_)));
    }

    mod application_reason {
        use super::*;

        #[test]
        fn known_codes_map_to_variants() {
            assert_eq!(ApplicationReason::from_code(0x80108b09), ApplicationReason::RegistFailed);
            assert_eq!(ApplicationReason::from_code(0x80108b02), ApplicationReason::InvalidAccountId);
            assert_eq!(ApplicationReason::from_code(0x80108b10), ApplicationReason::InUse);
            assert_eq!(ApplicationReason::from_code(0x80108b15), ApplicationReason::Crash);
            assert_eq!(ApplicationReason::from_code(0x80108b11), ApplicationReason::VersionMismatch);
            assert_eq!(ApplicationReason::from_code(0x80108bff), ApplicationReason::Unknown);
        }

        #[test]
        fn unrecognized_code_is_kept() {
            let reason = ApplicationReason::from_code(0x1234);
            assert_eq!(reason, ApplicationReason::Other(0x1234));
            assert_eq!(reason.code(), Some(0x1234));
        }

        #[test]
        fn parses_hex_header() {
            assert_eq!(
                ApplicationReason::from_header(Some("80108b11")),
                ApplicationReason::VersionMismatch
            );
            assert_eq!(ApplicationReason::from_header(Some("zz")), ApplicationReason::Missing);
            assert_eq!(ApplicationReason::from_header(None), ApplicationReason::Missing);
            assert_eq!(ApplicationReason::Missing.code(), None);
        }
    }

    mod failure_kind {
        use super::*;

        fn rejected(reason: ApplicationReason) -> Error {
            HandshakeError::InitRejected { status: 403, reason }.into()
        }

        #[test]
        fn distinguishes_corrective_actions() {
            let offline: Error =
                HandshakeError::HostUnreachable(IpAddr::V4(Ipv4Addr::LOCALHOST)).into();
            assert_eq!(offline.failure_kind(), FailureKind::DeviceOffline);

            assert_eq!(
                rejected(ApplicationReason::RegistFailed).failure_kind(),
                FailureKind::Credentials
            );
            assert_eq!(
                rejected(ApplicationReason::VersionMismatch).failure_kind(),
                FailureKind::VersionMismatch
            );
            assert_eq!(rejected(ApplicationReason::InUse).failure_kind(), FailureKind::Busy);
            assert_eq!(
                Error::from(HandshakeError::AuthRejected { status: 403 }).failure_kind(),
                FailureKind::Credentials
            );
            assert_eq!(Error::TransportClosed.failure_kind(), FailureKind::Transport);
            assert_eq!(
                Error::MissingCredential(crate::HostType::Ps5).failure_kind(),
                FailureKind::Credentials
            );
        }

        #[test]
        fn refused_connection_reads_as_offline() {
            let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
            assert_eq!(Error::from(io_err).failure_kind(), FailureKind::DeviceOffline);
        }
    }
}
