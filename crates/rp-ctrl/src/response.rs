//! HTTP response parsing for the session endpoints.

use std::collections::HashMap;

use rp_core::error::{HandshakeError, Result};

/// Parsed HTTP response head.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    /// Parse the response head from the start of `data`.
    ///
    /// Returns `Ok(None)` while the blank line ending the head has not arrived,
    /// otherwise the response and the number of bytes the head occupied.
    ///
    /// ```text
    /// HTTP/1.1 200 OK\r\n
    /// Header: Value\r\n
    /// ...
    /// \r\n
    /// ```
    pub fn parse_head(data: &[u8]) -> Result<Option<(Self, usize)>> {
        let header_end = match data.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(end) => end,
            None => return Ok(None),
        };

        let header_str = std::str::from_utf8(&data[..header_end]).map_err(|_| {
            HandshakeError::InvalidResponse("invalid UTF-8 in headers".to_string())
        })?;

        let mut lines = header_str.lines();
        let status_line = lines
            .next()
            .ok_or_else(|| HandshakeError::InvalidResponse("missing status line".to_string()))?;
        let (status_code, status_text) = parse_status_line(status_line)?;

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Ok(Some((
            Self {
                status_code,
                status_text,
                headers,
            },
            header_end + 4,
        )))
    }

    /// Check if response is `200`.
    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }

    /// Get header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Parse status line: "HTTP/1.1 200 OK"
fn parse_status_line(line: &str) -> Result<(u16, String)> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();

    if parts.len() < 2 {
        return Err(
            HandshakeError::InvalidResponse(format!("malformed status line: {}", line)).into(),
        );
    }

    if !parts[0].starts_with("HTTP/") {
        return Err(
            HandshakeError::InvalidResponse(format!("not an HTTP response: {}", parts[0])).into(),
        );
    }

    let code = parts[1].parse().map_err(|_| {
        HandshakeError::InvalidResponse(format!("invalid status code: {}", parts[1]))
    })?;

    let text = parts.get(2).unwrap_or(&"").to_string();

    Ok((code, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn parse_simple_response() {
            let data = b"HTTP/1.1 200 OK\r\n\r\n";
            let (response, len) = HttpResponse::parse_head(data).unwrap().unwrap();
            assert_eq!(response.status_code, 200);
            assert_eq!(response.status_text, "OK");
            assert!(response.is_ok());
            assert_eq!(len, data.len());
        }

        #[test]
        fn parse_response_with_headers() {
            let data = b"HTTP/1.1 200 OK\r\nRP-Nonce: AAECAw==\r\nContent-Length: 0\r\n\r\n";
            let (response, _) = HttpResponse::parse_head(data).unwrap().unwrap();
            assert_eq!(response.header("rp-nonce"), Some("AAECAw=="));
            assert_eq!(response.content_length(), 0);
        }

        #[test]
        fn head_length_excludes_trailing_bytes() {
            let mut data = b"HTTP/1.1 200 OK\r\nRP-Server-Type: AQA=\r\n\r\n".to_vec();
            let head_len = data.len();
            data.extend_from_slice(&[0, 0, 0, 8, 0, 0x33, 0, 0]);

            let (_, len) = HttpResponse::parse_head(&data).unwrap().unwrap();
            assert_eq!(len, head_len);
        }

        #[test]
        fn incomplete_head_returns_none() {
            let data = b"HTTP/1.1 200 OK\r\nRP-Nonce: AAEC";
            assert!(HttpResponse::parse_head(data).unwrap().is_none());
        }

        #[test]
        fn parse_error_response() {
            let data = b"HTTP/1.1 403 Forbidden\r\nRP-Application-Reason: 80108b10\r\n\r\n";
            let (response, _) = HttpResponse::parse_head(data).unwrap().unwrap();
            assert_eq!(response.status_code, 403);
            assert!(!response.is_ok());
            assert_eq!(response.header("RP-Application-Reason"), Some("80108b10"));
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn parse_error_on_malformed_status_line() {
            assert!(HttpResponse::parse_head(b"garbage\r\n\r\n").is_err());
            assert!(HttpResponse::parse_head(b"RTSP/1.0 200 OK\r\n\r\n").is_err());
            assert!(HttpResponse::parse_head(b"HTTP/1.1 abc OK\r\n\r\n").is_err());
        }

        #[test]
        fn parse_error_on_invalid_utf8() {
            let data = b"HTTP/1.1 200 OK\r\nX: \xff\xfe\r\n\r\n";
            assert!(HttpResponse::parse_head(data).is_err());
        }
    }
}
