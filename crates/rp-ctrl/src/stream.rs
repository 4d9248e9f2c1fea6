//! Streaming bootstrap once the session id is known.
//!
//! The stream transport itself lives behind [`StreamLauncher`]. In test mode
//! a throwaway stream measures the network first, then the real stream is
//! launched with the measured parameters.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use rp_core::error::{Error, Result};
use rp_core::protocol::{DEFAULT_MTU, DEFAULT_RTT};
use rp_core::HostType;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::handle::ControlHandle;

/// Network parameters measured by a test stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkMeasurement {
    pub mtu: u16,
    pub rtt: Duration,
}

impl Default for NetworkMeasurement {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            rtt: DEFAULT_RTT,
        }
    }
}

/// How to start streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Measure the network with a test stream first.
    pub test: bool,
    pub mtu: Option<u16>,
    pub rtt: Option<Duration>,
}

impl StreamOptions {
    pub fn test() -> Self {
        Self {
            test: true,
            ..Self::default()
        }
    }

    pub fn direct(mtu: Option<u16>, rtt: Option<Duration>) -> Self {
        Self {
            test: false,
            mtu,
            rtt,
        }
    }
}

/// Everything a stream transport needs from the control session.
#[derive(Clone)]
pub struct StreamRequest {
    pub host: IpAddr,
    pub host_type: HostType,
    pub session_id: Vec<u8>,
    pub server_type: u32,
    /// Command side of the control session.
    pub control: ControlHandle,
    /// Flips to `true` when the stream must end.
    pub stop: watch::Receiver<bool>,
    pub test: bool,
    pub mtu: Option<u16>,
    pub rtt: Option<Duration>,
}

impl std::fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRequest")
            .field("host", &self.host)
            .field("host_type", &self.host_type)
            .field("test", &self.test)
            .field("mtu", &self.mtu)
            .field("rtt", &self.rtt)
            .finish_non_exhaustive()
    }
}

/// Stream transport seam.
#[async_trait]
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait StreamLauncher: Send + Sync {
    /// Run a stream until it ends or `request.stop` fires.
    ///
    /// Test-mode runs return the measurement they took, if any.
    async fn launch(&self, request: StreamRequest) -> Result<Option<NetworkMeasurement>>;
}

/// Launcher that only logs. Test runs report the requested or default
/// parameters.
pub struct NoopLauncher;

#[async_trait]
impl StreamLauncher for NoopLauncher {
    async fn launch(&self, request: StreamRequest) -> Result<Option<NetworkMeasurement>> {
        info!(
            host = %request.host,
            test = request.test,
            session_id = %String::from_utf8_lossy(&request.session_id),
            "Stream requested; no stream transport configured"
        );
        if !request.test {
            return Ok(None);
        }
        let defaults = NetworkMeasurement::default();
        Ok(Some(NetworkMeasurement {
            mtu: request.mtu.unwrap_or(defaults.mtu),
            rtt: request.rtt.unwrap_or(defaults.rtt),
        }))
    }
}

/// Start streaming for `control`'s session.
pub async fn bootstrap(
    launcher: &dyn StreamLauncher,
    control: ControlHandle,
    options: StreamOptions,
) -> Result<()> {
    let session_id = control.session_id().ok_or(Error::SessionNotReady)?;
    let request = |stop: watch::Receiver<bool>, test, mtu, rtt| StreamRequest {
        host: control.host(),
        host_type: control.host_type(),
        session_id: session_id.clone(),
        server_type: control.server_type(),
        control: control.clone(),
        stop,
        test,
        mtu,
        rtt,
    };

    let (mtu, rtt) = if options.test {
        let (test_stop, test_stop_rx) = watch::channel(false);
        let measured = launcher
            .launch(request(test_stop_rx, true, options.mtu, options.rtt))
            .await;
        test_stop.send_replace(true);

        let defaults = NetworkMeasurement::default();
        let measurement = measured?.unwrap_or(NetworkMeasurement {
            mtu: options.mtu.unwrap_or(defaults.mtu),
            rtt: options.rtt.unwrap_or(defaults.rtt),
        });
        info!(
            mtu = measurement.mtu,
            rtt_ms = measurement.rtt.as_millis() as u64,
            "Tested network"
        );
        (Some(measurement.mtu), Some(measurement.rtt))
    } else {
        (options.mtu, options.rtt)
    };

    debug!(?mtu, ?rtt, "Launching stream");
    launcher
        .launch(request(control.stop_signal(), false, mtu, rtt))
        .await?;
    Ok(())
}
