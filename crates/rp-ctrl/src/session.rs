//! Control session state machine.
//!
//! Pure with respect to I/O: bytes go in through [`ControlSession::receive`],
//! encoded frames come out through [`ControlSession::take_outbound`]. The
//! receive loop in `worker` owns the socket.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use rp_core::error::{Error, ProtocolError, Result};
use rp_core::{HostType, PairingCredential};
use rp_crypto::SessionCipher;
use tracing::{debug, info, warn};

use crate::builder::ControlConfig;
use crate::message::{self, ControlMessage, FrameDecoder, MessageType, HEARTBEAT_RESPONSE_BODY};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake not finished.
    Init,
    /// Control channel open.
    Ready,
    /// Closed. Terminal.
    Stopped,
}

/// What to do when a SESSION_ID payload is not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedSessionIdPolicy {
    /// Log and keep the channel open.
    #[default]
    Ignore,
    /// Close the channel.
    Disconnect,
}

/// Outcome of dispatching one message that the owner must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session identifier received for the first time.
    SessionReady(Vec<u8>),
    /// Message the session does not handle itself (login, keyboard, standby).
    Forwarded(ControlMessage),
    /// The session decided to close the channel.
    Disconnect,
    /// The byte stream can no longer be framed. The session has stopped.
    Failed(ProtocolError),
}

/// Client side of one control channel.
pub struct ControlSession {
    host: IpAddr,
    credential: PairingCredential,
    cipher: SessionCipher,
    decoder: FrameDecoder,
    state: SessionState,
    server_type: u32,
    session_id: Option<Vec<u8>>,
    last_heartbeat: Option<Instant>,
    heartbeat_interval: Duration,
    malformed_session_id: MalformedSessionIdPolicy,
    outbox: VecDeque<Vec<u8>>,
}

impl ControlSession {
    /// Create from the cipher the handshake left behind.
    pub fn new(
        host: IpAddr,
        credential: PairingCredential,
        cipher: SessionCipher,
        server_type: u32,
        config: &ControlConfig,
    ) -> Self {
        Self {
            host,
            credential,
            cipher,
            decoder: FrameDecoder::new(),
            state: SessionState::Init,
            server_type,
            session_id: None,
            last_heartbeat: None,
            heartbeat_interval: config.heartbeat_interval,
            malformed_session_id: config.malformed_session_id,
            outbox: VecDeque::new(),
        }
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn host_type(&self) -> HostType {
        self.credential.host_type
    }

    pub fn credential(&self) -> &PairingCredential {
        &self.credential
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn server_type(&self) -> u32 {
        self.server_type
    }

    pub fn session_id(&self) -> Option<&[u8]> {
        self.session_id.as_deref()
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    /// Keystream bytes consumed in both directions.
    pub fn keystream_position(&self) -> u64 {
        self.cipher.position()
    }

    /// Mark the control channel open.
    pub fn set_ready(&mut self) -> Result<()> {
        match self.state {
            SessionState::Init => {
                self.state = SessionState::Ready;
                Ok(())
            }
            SessionState::Ready => Ok(()),
            SessionState::Stopped => Err(Error::TransportClosed),
        }
    }

    /// Enter the terminal state. Pending outbound frames are dropped.
    pub fn stop(&mut self) {
        if self.state != SessionState::Stopped {
            info!("Control session with {} stopped", self.host);
        }
        self.state = SessionState::Stopped;
        self.outbox.clear();
    }

    /// Feed bytes read from the socket and dispatch every complete frame.
    ///
    /// One call is one dispatch cycle: if at least one message was handled
    /// and no heartbeat arrived from the host within the configured interval,
    /// a single heartbeat request is queued. Only inbound heartbeats refresh
    /// the timestamp, so every later cycle asks again until the host answers.
    ///
    /// Message-level anomalies are logged and do not end the session. A
    /// frame header that cannot be trusted stops it with [`SessionEvent::Failed`].
    pub fn receive(&mut self, data: &[u8], now: Instant) -> Vec<SessionEvent> {
        if self.state != SessionState::Ready {
            debug!(len = data.len(), state = ?self.state, "Dropping bytes outside Ready");
            return Vec::new();
        }
        self.decoder.extend(data);

        let mut events = Vec::new();
        let mut dispatched = 0usize;
        while self.state == SessionState::Ready {
            let msg = match self.decoder.decode_next(&mut self.cipher) {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(e) => {
                    warn!("Control stream corrupt: {}", e);
                    self.stop();
                    events.push(SessionEvent::Failed(e));
                    break;
                }
            };
            dispatched += 1;
            match self.handle_message(msg, now) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => warn!("Control message ignored: {}", e),
            }
        }

        if dispatched > 0 && self.heartbeat_stale(now) {
            debug!(dispatched, "Heartbeat stale, asking host");
            self.queue_heartbeat_request();
        }
        events
    }

    /// Dispatch one decoded message.
    pub fn handle_message(
        &mut self,
        msg: ControlMessage,
        now: Instant,
    ) -> std::result::Result<Option<SessionEvent>, ProtocolError> {
        debug!(kind = %msg.kind, len = msg.payload.len(), "RECV");

        let kind = msg.kind;
        match kind {
            MessageType::HeartbeatRequest => {
                self.last_heartbeat = Some(now);
                self.queue_heartbeat_response();
                Ok(None)
            }
            MessageType::HeartbeatResponse => {
                self.last_heartbeat = Some(now);
                Ok(None)
            }
            MessageType::SessionId => self.handle_session_id(&msg.payload),
            MessageType::Unknown(code) => Err(ProtocolError::UnknownMessageType(code)),
            _ => Ok(Some(SessionEvent::Forwarded(msg))),
        }
    }

    fn handle_session_id(
        &mut self,
        payload: &[u8],
    ) -> std::result::Result<Option<SessionEvent>, ProtocolError> {
        let id = payload.get(2..).unwrap_or_default();
        if std::str::from_utf8(id).is_err() {
            warn!(raw = %hex::encode(id), "Malformed session id");
            if self.malformed_session_id == MalformedSessionIdPolicy::Disconnect {
                self.stop();
                return Ok(Some(SessionEvent::Disconnect));
            }
            return Err(ProtocolError::MalformedSessionId);
        }

        if self.session_id.is_some() {
            debug!("Session id already set, ignoring repeat");
            return Ok(None);
        }

        info!(session_id = %String::from_utf8_lossy(id), "Received session id");
        self.session_id = Some(id.to_vec());
        Ok(Some(SessionEvent::SessionReady(id.to_vec())))
    }

    fn heartbeat_stale(&self, now: Instant) -> bool {
        match self.last_heartbeat {
            Some(last) => now.saturating_duration_since(last) > self.heartbeat_interval,
            None => true,
        }
    }

    fn queue(&mut self, msg: ControlMessage) {
        if self.state != SessionState::Ready {
            debug!(kind = %msg.kind, "Not queueing outside Ready");
            return;
        }
        debug!(kind = %msg.kind, len = msg.payload.len(), "SEND");
        let frame = message::encode(&mut self.cipher, &msg);
        self.outbox.push_back(frame);
    }

    pub fn queue_heartbeat_request(&mut self) {
        self.queue(ControlMessage::empty(MessageType::HeartbeatRequest));
    }

    pub fn queue_heartbeat_response(&mut self) {
        self.queue(ControlMessage::new(
            MessageType::HeartbeatResponse,
            HEARTBEAT_RESPONSE_BODY,
        ));
    }

    /// Ask the host to enter rest mode.
    pub fn queue_standby(&mut self) {
        self.queue(ControlMessage::empty(MessageType::Standby));
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Frames to write, in queue order.
    pub fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        self.outbox.drain(..).collect()
    }
}
