//! HTTP request formatting for the session endpoints.

use std::io::Write;
use std::net::IpAddr;

use rp_core::protocol::{CTRL_PATH, INIT_PATH};

use crate::builder::ControlConfig;

/// Minimal HTTP/1.1 GET request. Headers are written in insertion order.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Get header value (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire format.
    ///
    /// ```text
    /// GET /path HTTP/1.1\r\n
    /// Header: Value\r\n
    /// ...
    /// \r\n
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writes into a Vec cannot fail.
        let _ = write!(&mut out, "GET {} HTTP/1.1\r\n", self.path);
        for (key, value) in &self.headers {
            let _ = write!(&mut out, "{}: {}\r\n", key, value);
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Common headers for both session requests.
    fn session(path: &str, host: IpAddr, config: &ControlConfig, connection: &str) -> Self {
        Self::get(path)
            .header("Host", format!("{}:{}", host, config.port))
            .header("User-Agent", config.user_agent.clone())
            .header("Connection", connection)
            .header("Content-Length", "0")
    }

    /// Init request carrying the plain registration key.
    pub fn init(host: IpAddr, config: &ControlConfig, registration_key: &str) -> Self {
        Self::session(INIT_PATH, host, config, "close")
            .header("RP-Registkey", registration_key)
            .header("Rp-Version", config.rp_version.clone())
    }

    /// Auth request carrying the encrypted header set. Keeps the connection open.
    pub fn ctrl(host: IpAddr, config: &ControlConfig, auth: &AuthHeaders) -> Self {
        Self::session(CTRL_PATH, host, config, "keep-alive")
            .header("RP-Auth", auth.auth.clone())
            .header("RP-Version", config.rp_version.clone())
            .header("RP-Did", auth.did.clone())
            .header("RP-ControllerType", "3")
            .header("RP-ClientType", "11")
            .header("RP-OSType", auth.os_type.clone())
            .header("RP-ConPath", "1")
            .header("RP-StartBitrate", auth.bitrate.clone())
    }
}

/// Base64 encoded, encrypted values of the auth request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub auth: String,
    pub did: String,
    pub os_type: String,
    pub bitrate: String,
}
