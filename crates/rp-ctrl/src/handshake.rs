//! Two-step HTTP handshake that opens the control channel.
//!
//! 1. `GET /sie/ps4/rp/sess/init` with the plain registration key. The host
//!    answers with a 16 byte nonce.
//! 2. `GET /sie/ps4/rp/sess/ctrl` with four encrypted headers. The host
//!    answers with its encrypted server type and keeps the socket open; from
//!    then on the socket carries framed control messages.

use std::net::IpAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;
use rp_core::error::{Error, HandshakeError, Result};
use rp_core::PairingCredential;
use rp_crypto::{KeyTables, SessionCipher};
use rp_discovery::Availability;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::builder::ControlConfig;
use crate::request::{AuthHeaders, HttpRequest};
use crate::response::HttpResponse;

/// Fixed leading bytes of every device id.
pub const DID_PREFIX: [u8; 10] = [0x00, 0x18, 0x00, 0x00, 0x00, 0x07, 0x00, 0x40, 0x00, 0x80];

pub const DEVICE_ID_LEN: usize = 32;

const DID_RANDOM_LEN: usize = 16;
const REGIST_KEY_PADDING: usize = 8;
const OS_TYPE_WIDTH: usize = 10;
const START_BITRATE: [u8; 4] = [0; 4];

/// Prefix, 16 random bytes, 6 zero bytes.
pub fn generate_device_id() -> [u8; DEVICE_ID_LEN] {
    let mut did = [0u8; DEVICE_ID_LEN];
    did[..DID_PREFIX.len()].copy_from_slice(&DID_PREFIX);
    rand::thread_rng().fill(&mut did[DID_PREFIX.len()..DID_PREFIX.len() + DID_RANDOM_LEN]);
    did
}

/// Encrypt the auth header values.
///
/// The order is fixed (registration key, device id, OS type, bitrate): the
/// host decrypts them with the same keystream in the same order.
pub fn build_auth_headers(
    cipher: &mut SessionCipher,
    registration_key: &[u8],
    device_id: &[u8],
    os_type: &str,
) -> AuthHeaders {
    let mut key = registration_key.to_vec();
    key.extend_from_slice(&[0u8; REGIST_KEY_PADDING]);

    let mut os = os_type.as_bytes().to_vec();
    if os.len() < OS_TYPE_WIDTH {
        os.resize(OS_TYPE_WIDTH, 0);
    }

    AuthHeaders {
        auth: STANDARD.encode(cipher.encrypt(&key)),
        did: STANDARD.encode(cipher.encrypt(device_id)),
        os_type: STANDARD.encode(cipher.encrypt(&os)),
        bitrate: STANDARD.encode(cipher.encrypt(&START_BITRATE)),
    }
}

/// Extract the server nonce from the init response.
pub fn parse_init_response(response: &HttpResponse) -> std::result::Result<[u8; 16], HandshakeError> {
    if !response.is_ok() {
        let reason = rp_core::ApplicationReason::from_header(response.header("RP-Application-Reason"));
        error!("Failed to init control session: {}", reason);
        return Err(HandshakeError::InitRejected {
            status: response.status_code,
            reason,
        });
    }

    let encoded = response.header("RP-Nonce").ok_or(HandshakeError::MissingNonce)?;
    let nonce = STANDARD
        .decode(encoded.trim())
        .map_err(|e| HandshakeError::InvalidResponse(format!("RP-Nonce: {}", e)))?;
    debug!(nonce = %hex::encode(&nonce), "Received server nonce");

    nonce.try_into().map_err(|v: Vec<u8>| {
        HandshakeError::InvalidResponse(format!("RP-Nonce must be 16 bytes, got {}", v.len()))
    })
}

/// Decrypt the server type from the auth response.
///
/// Consumes keystream, so it must run right after [`build_auth_headers`].
pub fn parse_auth_response(
    response: &HttpResponse,
    cipher: &mut SessionCipher,
) -> std::result::Result<u32, HandshakeError> {
    let encoded = match (response.is_ok(), response.header("RP-Server-Type")) {
        (true, Some(value)) => value,
        _ => {
            return Err(HandshakeError::AuthRejected {
                status: response.status_code,
            })
        }
    };

    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| HandshakeError::InvalidResponse(format!("RP-Server-Type: {}", e)))?;
    let plain = cipher.decrypt(&raw);
    if plain.len() > 4 {
        return Err(HandshakeError::InvalidResponse(format!(
            "RP-Server-Type is {} bytes",
            plain.len()
        )));
    }

    let mut le = [0u8; 4];
    le[..plain.len()].copy_from_slice(&plain);
    Ok(u32::from_le_bytes(le))
}

/// Result of a successful handshake.
#[derive(Debug)]
pub struct Established {
    /// The auth socket, now the control channel.
    pub stream: TcpStream,
    pub cipher: SessionCipher,
    pub server_type: u32,
    pub device_id: [u8; DEVICE_ID_LEN],
    /// Bytes read past the auth response head. They belong to the first frames.
    pub pending: Vec<u8>,
}

/// Performs the init and auth requests.
pub struct HandshakeClient {
    config: ControlConfig,
    tables: Arc<KeyTables>,
    availability: Arc<dyn Availability>,
}

impl HandshakeClient {
    pub fn new(
        config: ControlConfig,
        tables: Arc<KeyTables>,
        availability: Arc<dyn Availability>,
    ) -> Self {
        Self {
            config,
            tables,
            availability,
        }
    }

    /// Run the full handshake against `host`.
    pub async fn connect(&self, host: IpAddr, credential: &PairingCredential) -> Result<Established> {
        if !self.availability.is_available(host, credential.host_type).await {
            warn!("{} at {} is not available", credential.host_type, host);
            return Err(HandshakeError::HostUnreachable(host).into());
        }

        let nonce = self.init(host, credential).await?;
        let material = self.tables.derive(&nonce, &credential.rp_key)?;
        let mut cipher = SessionCipher::new(&material);

        let device_id = generate_device_id();
        let registration_key = credential.registration_key_bytes()?;
        let headers = build_auth_headers(
            &mut cipher,
            &registration_key,
            &device_id,
            &self.config.os_type,
        );

        let request = HttpRequest::ctrl(host, &self.config, &headers);
        let mut stream = self.open(host).await?;
        stream.write_all(&request.serialize()).await?;
        stream.flush().await?;

        let (response, pending) = self.read(&mut stream).await?;
        debug!(status = response.status_code, "Auth response");
        let server_type = parse_auth_response(&response, &mut cipher)?;
        info!(server_type, "Control channel established with {}", host);

        Ok(Established {
            stream,
            cipher,
            server_type,
            device_id,
            pending,
        })
    }

    async fn init(&self, host: IpAddr, credential: &PairingCredential) -> Result<[u8; 16]> {
        let request = HttpRequest::init(host, &self.config, &credential.registration_key);
        let mut stream = self.open(host).await?;
        stream.write_all(&request.serialize()).await?;
        stream.flush().await?;

        let (response, _) = self.read(&mut stream).await?;
        debug!(status = response.status_code, headers = ?response.headers, "Init response");
        Ok(parse_init_response(&response)?)
    }

    async fn open(&self, host: IpAddr) -> Result<TcpStream> {
        let stream = timeout(
            self.config.handshake_timeout,
            TcpStream::connect((host, self.config.port)),
        )
        .await
        .map_err(|_| Error::Timeout)??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn read(&self, stream: &mut TcpStream) -> Result<(HttpResponse, Vec<u8>)> {
        timeout(self.config.handshake_timeout, read_response(stream))
            .await
            .map_err(|_| Error::Timeout)?
    }
}

/// Read one response head plus `Content-Length` body bytes.
///
/// Returns whatever arrived after the body.
pub(crate) async fn read_response<S: AsyncRead + Unpin>(
    stream: &mut S,
) -> Result<(HttpResponse, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        if let Some((response, head_len)) = HttpResponse::parse_head(&buf)? {
            let body_end = head_len + response.content_length();
            while buf.len() < body_end {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(HandshakeError::InvalidResponse(
                        "connection closed before body".to_string(),
                    )
                    .into());
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let pending = buf.split_off(body_end);
            return Ok((response, pending));
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(
                HandshakeError::InvalidResponse("connection closed before response".to_string())
                    .into(),
            );
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rp_core::{ApplicationReason, HostType};
    use rp_crypto::SessionKeyMaterial;

    pub(crate) fn test_tables() -> KeyTables {
        let a = (0..3584usize).map(|j| (j * 7 + 3) as u8).collect();
        let b = (0..3584usize).map(|j| (j * 13 + 5) as u8).collect();
        KeyTables::new(a, b).unwrap()
    }

    pub(crate) fn test_material() -> SessionKeyMaterial {
        let nonce: Vec<u8> = (0..16).collect();
        let rp_key: Vec<u8> = (0x10..0x20).collect();
        test_tables().derive(&nonce, &rp_key).unwrap()
    }

    fn response(raw: &[u8]) -> HttpResponse {
        HttpResponse::parse_head(raw).unwrap().unwrap().0
    }

    mod device_id {
        use super::*;

        #[test]
        fn layout() {
            let did = generate_device_id();
            assert_eq!(&did[..10], &DID_PREFIX);
            assert_eq!(&did[26..], &[0u8; 6]);
        }

        #[test]
        fn random_part_differs() {
            assert_ne!(generate_device_id()[10..26], generate_device_id()[10..26]);
        }
    }

    mod auth_headers {
        use super::*;

        #[test]
        fn derived_material_matches_reference() {
            let material = test_material();
            assert_eq!(
                hex::encode(material.session_nonce),
                "35322b2421666f707d0a031c190e3738"
            );
            assert_eq!(hex::encode(material.aes_key), "36243260567c6a989684c2b0e6ecda08");
        }

        #[test]
        fn headers_decrypt_to_preimages_in_order() {
            let material = test_material();
            let mut client = SessionCipher::new(&material);
            let mut host = SessionCipher::new(&material);
            let regist = [0x3a, 0x2f, 0x1b, 0x0c, 0x4d, 0x5e, 0x6f, 0x70];
            let did = generate_device_id();

            let headers = build_auth_headers(&mut client, &regist, &did, "Win10.0.0");

            let auth = host.decrypt(&STANDARD.decode(&headers.auth).unwrap());
            assert_eq!(&auth[..8], &regist);
            assert_eq!(&auth[8..], &[0u8; 8]);

            let did_plain = host.decrypt(&STANDARD.decode(&headers.did).unwrap());
            assert_eq!(did_plain, did);

            let os = host.decrypt(&STANDARD.decode(&headers.os_type).unwrap());
            assert_eq!(os, b"Win10.0.0\0");

            let bitrate = host.decrypt(&STANDARD.decode(&headers.bitrate).unwrap());
            assert_eq!(bitrate, vec![0u8; 4]);

            assert_eq!(client.position(), 16 + 32 + 10 + 4);
            assert_eq!(client.position(), host.position());
        }

        #[test]
        fn long_os_type_is_not_truncated() {
            let mut cipher = SessionCipher::new(&test_material());
            let mut host = SessionCipher::new(&test_material());
            let headers = build_auth_headers(&mut cipher, &[0; 8], &[0; 32], "Windows10.0.19045");

            host.decrypt(&STANDARD.decode(&headers.auth).unwrap());
            host.decrypt(&STANDARD.decode(&headers.did).unwrap());
            let os = host.decrypt(&STANDARD.decode(&headers.os_type).unwrap());
            assert_eq!(os, b"Windows10.0.19045");
        }
    }

    mod init_response {
        use super::*;

        #[test]
        fn nonce_is_decoded() {
            let rsp = response(b"HTTP/1.1 200 OK\r\nRP-Nonce: AAECAwQFBgcICQoLDA0ODw==\r\n\r\n");
            let nonce = parse_init_response(&rsp).unwrap();
            assert_eq!(nonce.to_vec(), (0..16).collect::<Vec<u8>>());
        }

        #[test]
        fn rejection_carries_reason() {
            let rsp = response(b"HTTP/1.1 403 Forbidden\r\nRP-Application-Reason: 80108b11\r\n\r\n");
            match parse_init_response(&rsp) {
                Err(HandshakeError::InitRejected { status, reason }) => {
                    assert_eq!(status, 403);
                    assert_eq!(reason, ApplicationReason::VersionMismatch);
                }
                other => panic!("unexpected: {:?}", other),
            }
        }

        #[test]
        fn missing_nonce() {
            let rsp = response(b"HTTP/1.1 200 OK\r\n\r\n");
            assert!(matches!(
                parse_init_response(&rsp),
                Err(HandshakeError::MissingNonce)
            ));
        }

        #[test]
        fn short_nonce_is_invalid() {
            let rsp = response(b"HTTP/1.1 200 OK\r\nRP-Nonce: AAECAw==\r\n\r\n");
            assert!(matches!(
                parse_init_response(&rsp),
                Err(HandshakeError::InvalidResponse(_))
            ));
        }
    }

    mod auth_response {
        use super::*;

        #[test]
        fn server_type_is_little_endian() {
            let material = test_material();
            let mut host = SessionCipher::new(&material);
            let mut client = SessionCipher::new(&material);
            let encoded = STANDARD.encode(host.encrypt(&[0x03, 0x01]));
            let raw = format!("HTTP/1.1 200 OK\r\nRP-Server-Type: {}\r\n\r\n", encoded);

            let server_type = parse_auth_response(&response(raw.as_bytes()), &mut client).unwrap();
            assert_eq!(server_type, 0x0103);
        }

        #[test]
        fn oversized_server_type_is_invalid() {
            let material = test_material();
            let mut host = SessionCipher::new(&material);
            let mut client = SessionCipher::new(&material);
            let encoded = STANDARD.encode(host.encrypt(&[0x02, 0x00, 0x00, 0x00, 0x07]));
            let raw = format!("HTTP/1.1 200 OK\r\nRP-Server-Type: {}\r\n\r\n", encoded);

            assert!(matches!(
                parse_auth_response(&response(raw.as_bytes()), &mut client),
                Err(HandshakeError::InvalidResponse(_))
            ));
        }

        #[test]
        fn non_200_is_rejected() {
            let mut cipher = SessionCipher::new(&test_material());
            let rsp = response(b"HTTP/1.1 403 Forbidden\r\nRP-Server-Type: AQA=\r\n\r\n");
            assert!(matches!(
                parse_auth_response(&rsp, &mut cipher),
                Err(HandshakeError::AuthRejected { status: 403 })
            ));
        }

        #[test]
        fn missing_server_type_is_rejected() {
            let mut cipher = SessionCipher::new(&test_material());
            let rsp = response(b"HTTP/1.1 200 OK\r\n\r\n");
            assert!(matches!(
                parse_auth_response(&rsp, &mut cipher),
                Err(HandshakeError::AuthRejected { status: 200 })
            ));
        }
    }

    mod reading {
        use super::*;

        #[tokio::test]
        async fn keeps_bytes_after_head() {
            let (mut client, mut server) = tokio::io::duplex(256);
            server
                .write_all(b"HTTP/1.1 200 OK\r\nRP-Server-Type: AQA=\r\n\r\n\x00\x00\x00\x00")
                .await
                .unwrap();

            let (rsp, pending) = read_response(&mut client).await.unwrap();
            assert!(rsp.is_ok());
            assert_eq!(pending, vec![0, 0, 0, 0]);
        }

        #[tokio::test]
        async fn skips_declared_body() {
            let (mut client, mut server) = tokio::io::duplex(256);
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabcXY")
                .await
                .unwrap();

            let (_, pending) = read_response(&mut client).await.unwrap();
            assert_eq!(pending, b"XY");
        }

        #[tokio::test]
        async fn early_close_is_an_error() {
            let (mut client, mut server) = tokio::io::duplex(256);
            server.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();
            drop(server);

            assert!(read_response(&mut client).await.is_err());
        }
    }

    mod availability {
        use super::*;
        use rp_discovery::MockAvailability;
        use std::net::Ipv4Addr;

        #[tokio::test]
        async fn unavailable_host_is_refused_before_connecting() {
            let mut availability = MockAvailability::new();
            availability
                .expect_is_available()
                .times(1)
                .returning(|_, _| Box::pin(async { false }));

            let client = HandshakeClient::new(
                ControlConfig::default(),
                Arc::new(test_tables()),
                Arc::new(availability),
            );
            let credential = PairingCredential::new(HostType::Ps4, "", "00", [0; 16]);
            let host = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

            let err = client.connect(host, &credential).await.unwrap_err();
            assert!(matches!(
                err,
                Error::Handshake(HandshakeError::HostUnreachable(h)) if h == host
            ));
        }
    }
}
