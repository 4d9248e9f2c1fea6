//! Host identification and pairing credentials.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use zeroize::ZeroizeOnDrop;

use crate::error::ParseError;

/// Console generation. Determines discovery ports and registration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    Ps4,
    Ps5,
}

impl HostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostType::Ps4 => "PS4",
            HostType::Ps5 => "PS5",
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PS4" => Ok(HostType::Ps4),
            "PS5" => Ok(HostType::Ps5),
            other => Err(ParseError::InvalidFormat(format!("unknown host type: {}", other))),
        }
    }
}

/// Registration data obtained when the client was paired with a host.
///
/// Read-only for the lifetime of a session.
#[derive(Clone, ZeroizeOnDrop)]
pub struct PairingCredential {
    #[zeroize(skip)]
    pub host_type: HostType,
    #[zeroize(skip)]
    pub mac_address: String,
    #[zeroize(skip)]
    pub nickname: String,
    /// Hex encoded registration key (`RP-Registkey`).
    pub registration_key: String,
    pub rp_key: [u8; 16],
}

impl PairingCredential {
    pub fn new(
        host_type: HostType,
        mac_address: impl Into<String>,
        registration_key: impl Into<String>,
        rp_key: [u8; 16],
    ) -> Self {
        Self {
            host_type,
            mac_address: mac_address.into(),
            nickname: String::new(),
            registration_key: registration_key.into(),
            rp_key,
        }
    }

    /// Build a credential from the hex strings stored at registration time.
    pub fn from_hex(
        host_type: HostType,
        mac_address: impl Into<String>,
        registration_key: &str,
        rp_key_hex: &str,
    ) -> Result<Self, ParseError> {
        hex::decode(registration_key.trim())
            .map_err(|_| ParseError::InvalidHex(registration_key.to_string()))?;

        let rp_key = hex::decode(rp_key_hex.trim())
            .map_err(|_| ParseError::InvalidHex(rp_key_hex.to_string()))?;
        let rp_key: [u8; 16] = rp_key.try_into().map_err(|v: Vec<u8>| {
            ParseError::InvalidFormat(format!("RP key must be 16 bytes, got {}", v.len()))
        })?;

        Ok(Self::new(host_type, mac_address, registration_key.trim(), rp_key))
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    /// Decoded registration key bytes.
    pub fn registration_key_bytes(&self) -> Result<Vec<u8>, ParseError> {
        hex::decode(&self.registration_key)
            .map_err(|_| ParseError::InvalidHex(self.registration_key.clone()))
    }
}

impl fmt::Debug for PairingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingCredential")
            .field("host_type", &self.host_type)
            .field("mac_address", &self.mac_address)
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

/// Source of pairing credentials, keyed by host type.
pub trait CredentialStore: Send + Sync {
    fn credential(&self, host_type: HostType) -> Option<PairingCredential>;
}

/// Credential store held in memory.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: HashMap<HostType, PairingCredential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, credential: PairingCredential) {
        self.credentials.insert(credential.host_type, credential);
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn credential(&self, host_type: HostType) -> Option<PairingCredential> {
        self.credentials.get(&host_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod host_type {
        use super::*;

        #[test]
        fn parses_case_insensitive() {
            assert_eq!("ps4".parse::<HostType>().unwrap(), HostType::Ps4);
            assert_eq!(" PS5 ".parse::<HostType>().unwrap(), HostType::Ps5);
            assert!("xbox".parse::<HostType>().is_err());
        }

        #[test]
        fn display_matches_wire_name() {
            assert_eq!(HostType::Ps4.to_string(), "PS4");
            assert_eq!(HostType::Ps5.to_string(), "PS5");
        }
    }

    mod credential {
        use super::*;

        #[test]
        fn from_hex_decodes_rp_key() {
            let cred = PairingCredential::from_hex(
                HostType::Ps4,
                "aa:bb:cc:dd:ee:ff",
                "3a2f1b0c4d5e6f70",
                "101112131415161718191a1b1c1d1e1f",
            )
            .unwrap();

            assert_eq!(cred.rp_key[0], 0x10);
            assert_eq!(cred.rp_key[15], 0x1f);
            assert_eq!(
                cred.registration_key_bytes().unwrap(),
                vec![0x3a, 0x2f, 0x1b, 0x0c, 0x4d, 0x5e, 0x6f, 0x70]
            );
        }

        #[test]
        fn from_hex_rejects_short_rp_key() {
            let result =
                PairingCredential::from_hex(HostType::Ps4, "", "00", "0011");
            assert!(matches!(result, Err(ParseError::InvalidFormat(_))));
        }

        #[test]
        fn from_hex_rejects_bad_registration_key() {
            let result = PairingCredential::from_hex(
                HostType::Ps4,
                "",
                "not-hex",
                "101112131415161718191a1b1c1d1e1f",
            );
            assert!(matches!(result, Err(ParseError::InvalidHex(_))));
        }

        #[test]
        fn debug_hides_secrets() {
            let cred = PairingCredential::new(HostType::Ps5, "mac", "deadbeef", [0x42; 16]);
            let dbg = format!("{:?}", cred);
            assert!(!dbg.contains("deadbeef"));
            assert!(dbg.contains("Ps5"));
        }
    }

    mod store {
        use super::*;

        #[test]
        fn memory_store_keys_by_host_type() {
            let mut store = MemoryCredentialStore::new();
            store.insert(PairingCredential::new(HostType::Ps4, "m4", "00", [4; 16]));

            assert_eq!(store.credential(HostType::Ps4).unwrap().mac_address, "m4");
            assert!(store.credential(HostType::Ps5).is_none());
        }
    }
}
