//! Trait definitions for host availability (enables mocking in tests).

use std::net::IpAddr;

use async_trait::async_trait;
use rp_core::HostType;

/// Reachability check consulted before every handshake attempt.
#[async_trait]
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait Availability: Send + Sync {
    /// Return true if the host answered and can accept a session.
    async fn is_available(&self, host: IpAddr, host_type: HostType) -> bool;
}

/// Availability check that trusts the caller.
///
/// Useful when the host was just discovered by other means.
pub struct AssumeAvailable;

#[async_trait]
impl Availability for AssumeAvailable {
    async fn is_available(&self, _host: IpAddr, _host_type: HostType) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50));

    #[tokio::test]
    async fn mock_reports_configured_availability() {
        let mut mock = MockAvailability::new();
        mock.expect_is_available()
            .withf(|host, host_type| *host == HOST && *host_type == HostType::Ps4)
            .returning(|_, _| Box::pin(async { false }));

        assert!(!mock.is_available(HOST, HostType::Ps4).await);
    }

    #[tokio::test]
    async fn assume_available_is_always_true() {
        assert!(AssumeAvailable.is_available(HOST, HostType::Ps5).await);
    }
}
