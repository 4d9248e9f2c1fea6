//! Device discovery protocol (DDP) message building and parsing.

use std::collections::HashMap;

use rp_core::error::ParseError;
use rp_core::HostType;

/// DDP protocol version advertised in every message.
pub const DDP_VERSION: &str = "00030010";

pub const DDP_PORT_PS4: u16 = 987;
pub const DDP_PORT_PS5: u16 = 9032;

pub const STATUS_OK: u16 = 200;
pub const STATUS_STANDBY: u16 = 620;

/// UDP port the host listens on for DDP.
pub fn ddp_port(host_type: HostType) -> u16 {
    match host_type {
        HostType::Ps4 => DDP_PORT_PS4,
        HostType::Ps5 => DDP_PORT_PS5,
    }
}

/// Build a search message.
///
/// ```text
/// SRCH * HTTP/1.1\n
/// device-discovery-protocol-version:00030010\n
/// ```
pub fn search_message() -> Vec<u8> {
    format!(
        "SRCH * HTTP/1.1\ndevice-discovery-protocol-version:{}\n",
        DDP_VERSION
    )
    .into_bytes()
}

/// Parsed reply to a DDP search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdpResponse {
    pub status_code: u16,
    pub status: String,
    pub fields: HashMap<String, String>,
}

impl DdpResponse {
    /// Parse a reply datagram.
    ///
    /// ```text
    /// HTTP/1.1 200 Ok\n
    /// host-id:...\n
    /// host-type:PS4\n
    /// ...
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| ParseError::InvalidFormat("DDP reply is not UTF-8".to_string()))?;

        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let status_line = lines
            .next()
            .ok_or_else(|| ParseError::InvalidFormat("empty DDP reply".to_string()))?;

        let mut parts = status_line.splitn(3, ' ');
        if parts.next() != Some("HTTP/1.1") {
            return Err(ParseError::InvalidFormat(format!(
                "not a DDP reply: {}",
                status_line
            )));
        }
        let status_code = parts
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| ParseError::InvalidFormat(format!("bad status: {}", status_line)))?;
        let status = parts.next().unwrap_or("").to_string();

        let fields = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(Self {
            status_code,
            status,
            fields,
        })
    }

    /// Host answered and is on or in rest mode.
    pub fn is_reachable(&self) -> bool {
        matches!(self.status_code, STATUS_OK | STATUS_STANDBY)
    }

    pub fn is_standby(&self) -> bool {
        self.status_code == STATUS_STANDBY
    }

    pub fn host_type(&self) -> Option<HostType> {
        self.fields.get("host-type").and_then(|t| t.parse().ok())
    }

    pub fn host_name(&self) -> Option<&str> {
        self.fields.get("host-name").map(String::as_str)
    }

    pub fn running_app_name(&self) -> Option<&str> {
        self.fields.get("running-app-name").map(String::as_str)
    }
}
