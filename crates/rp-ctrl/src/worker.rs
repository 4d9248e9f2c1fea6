//! Receive loop owning the control socket.
//!
//! The loop is the only reader, writer and cipher user of a session. It
//! waits on socket reads, handle commands and the stop signal, and flushes
//! queued frames after each wakeup.

use std::time::Instant;

use rp_core::error::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::events::{ControlEvent, SharedEventHandler, SharedReadyHandler};
use crate::handle::{Command, ControlHandle, SessionStatus};
use crate::session::{ControlSession, SessionEvent, SessionState};
use crate::stream::StreamOptions;

pub(crate) struct ReceiveLoop {
    pub session: ControlSession,
    pub stream: TcpStream,
    /// Bytes that arrived together with the auth response.
    pub pending: Vec<u8>,
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub stop: watch::Receiver<bool>,
    pub status: watch::Sender<SessionStatus>,
    pub handle: ControlHandle,
    pub ready_handler: Option<SharedReadyHandler>,
    pub events: SharedEventHandler,
    pub read_buffer_size: usize,
}

impl ReceiveLoop {
    pub(crate) async fn run(mut self) -> Result<()> {
        info!(host = %self.session.host(), "Control receive loop started");

        let result = self.run_loop().await;

        self.session.stop();
        self.publish();
        if let Err(e) = self.stream.shutdown().await {
            debug!("Control socket shutdown: {}", e);
        }
        match &result {
            Ok(()) => info!("Control session closed"),
            Err(e) => warn!("Control session ended: {}", e),
        }
        let failure = result.as_ref().err().map(Error::failure_kind);
        self.events.on_event(ControlEvent::Stopped(failure)).await;
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            self.ingest(&pending).await?;
        }

        let mut buf = vec![0u8; self.read_buffer_size.max(1)];

        loop {
            self.flush().await?;
            if self.session.state() == SessionState::Stopped || *self.stop.borrow() {
                return Ok(());
            }

            tokio::select! {
                read = self.stream.read(&mut buf) => {
                    let n = read.map_err(|e| transport_error("read", e))?;
                    if n == 0 {
                        return Err(Error::TransportClosed);
                    }
                    self.ingest(&buf[..n]).await?;
                }
                Some(command) = self.commands.recv() => {
                    if command == Command::Stop {
                        return Ok(());
                    }
                    self.apply(command);
                }
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn ingest(&mut self, data: &[u8]) -> Result<()> {
        for event in self.session.receive(data, Instant::now()) {
            match event {
                SessionEvent::SessionReady(id) => {
                    self.publish();
                    self.on_ready();
                    self.events.on_event(ControlEvent::SessionReady(id)).await;
                }
                SessionEvent::Forwarded(msg) => {
                    self.events.on_event(ControlEvent::Message(msg)).await;
                }
                SessionEvent::Disconnect => {
                    info!("Closing control session after malformed session id");
                }
                SessionEvent::Failed(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn on_ready(&self) {
        match &self.ready_handler {
            Some(handler) => handler.on_session_ready(self.handle.clone()),
            None => {
                if let Err(e) = self.handle.start_stream(StreamOptions::test()) {
                    warn!("Could not start stream: {}", e);
                }
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Heartbeat => self.session.queue_heartbeat_request(),
            Command::Standby => self.session.queue_standby(),
            Command::Stop => self.session.stop(),
        }
    }

    async fn flush(&mut self) -> Result<()> {
        for frame in self.session.take_outbound() {
            self.stream
                .write_all(&frame)
                .await
                .map_err(|e| transport_error("write", e))?;
        }
        Ok(())
    }

    fn publish(&self) {
        self.status.send_replace(SessionStatus::of(&self.session));
    }
}

/// Socket failures after the handshake all mean the channel is gone.
fn transport_error(op: &str, e: std::io::Error) -> Error {
    warn!(kind = ?e.kind(), "Control socket {} failed: {}", op, e);
    Error::TransportClosed
}
