//! Session builder and configuration.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rp_core::error::{Error, Result};
use rp_core::protocol::{HEARTBEAT_INTERVAL, OS_TYPE, RP_PORT, RP_VERSION, USER_AGENT};
use rp_core::{CredentialStore, HostType, PairingCredential};
use rp_crypto::KeyTables;
use rp_discovery::{Availability, DdpProbe};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::events::{
    EventHandler, NoOpHandler, SessionReadyHandler, SharedEventHandler, SharedReadyHandler,
};
use crate::handle::{ControlHandle, SessionStatus};
use crate::handshake::HandshakeClient;
use crate::session::{ControlSession, MalformedSessionIdPolicy};
use crate::stream::{NoopLauncher, StreamLauncher};
use crate::worker::ReceiveLoop;

/// Tunables for the handshake and the control channel.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub port: u16,
    pub user_agent: String,
    pub rp_version: String,
    pub os_type: String,
    pub heartbeat_interval: Duration,
    /// Bound on each connect and each response read during the handshake.
    pub handshake_timeout: Duration,
    pub malformed_session_id: MalformedSessionIdPolicy,
    pub read_buffer_size: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            port: RP_PORT,
            user_agent: USER_AGENT.to_string(),
            rp_version: RP_VERSION.to_string(),
            os_type: OS_TYPE.to_string(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            handshake_timeout: Duration::from_secs(10),
            malformed_session_id: MalformedSessionIdPolicy::Ignore,
            read_buffer_size: 4096,
        }
    }
}

/// Builder for starting control sessions.
pub struct SessionBuilder {
    config: ControlConfig,
    tables: Arc<KeyTables>,
    availability: Arc<dyn Availability>,
    launcher: Arc<dyn StreamLauncher>,
    ready_handler: Option<SharedReadyHandler>,
    event_handler: SharedEventHandler,
}

impl SessionBuilder {
    /// Create new builder with defaults.
    pub fn new(tables: KeyTables) -> Self {
        Self {
            config: ControlConfig::default(),
            tables: Arc::new(tables),
            availability: Arc::new(DdpProbe::new()),
            launcher: Arc::new(NoopLauncher),
            ready_handler: None,
            event_handler: Arc::new(NoOpHandler),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Connect to a non-default port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn malformed_session_id(mut self, policy: MalformedSessionIdPolicy) -> Self {
        self.config.malformed_session_id = policy;
        self
    }

    /// Set the reachability check run before the handshake.
    pub fn availability(mut self, availability: impl Availability + 'static) -> Self {
        self.availability = Arc::new(availability);
        self
    }

    /// Set the stream transport.
    pub fn launcher(mut self, launcher: impl StreamLauncher + 'static) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }

    /// Replace the default stream bootstrap run when the session id arrives.
    pub fn on_session_ready(mut self, handler: impl SessionReadyHandler + 'static) -> Self {
        self.ready_handler = Some(Arc::new(handler));
        self
    }

    /// Set event handler.
    pub fn event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.event_handler = Arc::new(handler);
        self
    }

    /// Handshake with `host` and spawn the receive loop.
    pub async fn start(self, host: IpAddr, credential: PairingCredential) -> Result<ControlHandle> {
        let handshake = HandshakeClient::new(
            self.config.clone(),
            self.tables.clone(),
            self.availability.clone(),
        );
        let established = handshake.connect(host, &credential).await?;

        let host_type = credential.host_type;
        let mut session = ControlSession::new(
            host,
            credential,
            established.cipher,
            established.server_type,
            &self.config,
        );
        session.set_ready()?;

        let (status_tx, status_rx) = watch::channel(SessionStatus::of(&session));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = ControlHandle::new(host, host_type, cmd_tx, stop_tx, status_rx, self.launcher);

        let worker = ReceiveLoop {
            session,
            stream: established.stream,
            pending: established.pending,
            commands: cmd_rx,
            stop: stop_rx,
            status: status_tx,
            handle: handle.clone(),
            ready_handler: self.ready_handler,
            events: self.event_handler,
            read_buffer_size: self.config.read_buffer_size,
        };
        handle.attach(tokio::spawn(worker.run())).await;
        info!(%host, %host_type, "Control session started");
        Ok(handle)
    }

    /// Look up the credential for `host_type` and [`start`](Self::start).
    pub async fn start_with_store(
        self,
        host: IpAddr,
        host_type: HostType,
        store: &dyn CredentialStore,
    ) -> Result<ControlHandle> {
        let credential = store
            .credential(host_type)
            .ok_or(Error::MissingCredential(host_type))?;
        self.start(host, credential).await
    }
}
