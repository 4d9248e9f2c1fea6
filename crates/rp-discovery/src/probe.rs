//! UDP availability probe.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use rp_core::{HostType, Result};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::parser::{ddp_port, search_message, DdpResponse};
use crate::traits::Availability;

/// Sends DDP search datagrams directly to a host and waits for a reply.
#[derive(Debug, Clone)]
pub struct DdpProbe {
    timeout: Duration,
    attempts: u32,
    port_override: Option<u16>,
}

impl DdpProbe {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            attempts: 3,
            port_override: None,
        }
    }

    /// Time to wait for a reply after each datagram.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of search datagrams sent before giving up.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Send to a fixed port instead of the host type's DDP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port_override = Some(port);
        self
    }

    /// Search a host and return its parsed reply.
    pub async fn search(&self, host: IpAddr, host_type: HostType) -> Result<Option<DdpResponse>> {
        let unspecified = match host {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await?;
        let target = SocketAddr::new(host, self.port_override.unwrap_or(ddp_port(host_type)));
        let message = search_message();
        let mut buf = [0u8; 1024];

        for attempt in 1..=self.attempts {
            socket.send_to(&message, target).await?;
            debug!(%target, attempt, "DDP search sent");

            let received = match timeout(self.timeout, socket.recv_from(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => continue,
            };

            let (len, from) = received;
            if from.ip() != host {
                debug!(%from, "Ignoring DDP reply from other host");
                continue;
            }
            match DdpResponse::parse(&buf[..len]) {
                Ok(response) => return Ok(Some(response)),
                Err(e) => warn!("Invalid DDP reply from {}: {}", from, e),
            }
        }
        Ok(None)
    }
}

impl Default for DdpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Availability for DdpProbe {
    async fn is_available(&self, host: IpAddr, host_type: HostType) -> bool {
        match self.search(host, host_type).await {
            Ok(Some(response)) => {
                debug!(
                    status = response.status_code,
                    name = response.host_name().unwrap_or(""),
                    "Host answered DDP search"
                );
                response.is_reachable()
            }
            Ok(None) => {
                warn!("Could not detect {} at {}", host_type, host);
                false
            }
            Err(e) => {
                warn!("DDP search to {} failed: {}", host, e);
                false
            }
        }
    }
}
