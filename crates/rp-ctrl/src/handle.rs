//! Cloneable handle to a running control session.

use std::net::IpAddr;
use std::sync::Arc;

use rp_core::error::{Error, Result};
use rp_core::HostType;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::session::{ControlSession, SessionState};
use crate::stream::{self, StreamLauncher, StreamOptions};

/// Snapshot published by the receive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session_id: Option<Vec<u8>>,
    pub server_type: u32,
}

impl SessionStatus {
    pub(crate) fn of(session: &ControlSession) -> Self {
        Self {
            state: session.state(),
            session_id: session.session_id().map(<[u8]>::to_vec),
            server_type: session.server_type(),
        }
    }
}

/// Requests executed by the receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Heartbeat,
    Standby,
    Stop,
}

struct Inner {
    host: IpAddr,
    host_type: HostType,
    commands: mpsc::UnboundedSender<Command>,
    stop: watch::Sender<bool>,
    status: watch::Receiver<SessionStatus>,
    launcher: Arc<dyn StreamLauncher>,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

/// Handle to a control session.
///
/// All writes go through the session's receive loop, so the handle can be
/// cloned and used from any task.
#[derive(Clone)]
pub struct ControlHandle {
    inner: Arc<Inner>,
}

impl ControlHandle {
    pub(crate) fn new(
        host: IpAddr,
        host_type: HostType,
        commands: mpsc::UnboundedSender<Command>,
        stop: watch::Sender<bool>,
        status: watch::Receiver<SessionStatus>,
        launcher: Arc<dyn StreamLauncher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                host_type,
                commands,
                stop,
                status,
                launcher,
                task: Mutex::new(None),
            }),
        }
    }

    pub(crate) async fn attach(&self, task: JoinHandle<Result<()>>) {
        *self.inner.task.lock().await = Some(task);
    }

    pub fn host(&self) -> IpAddr {
        self.inner.host
    }

    pub fn host_type(&self) -> HostType {
        self.inner.host_type
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.status.borrow().state
    }

    /// Session id, once the host sent it.
    pub fn session_id(&self) -> Option<Vec<u8>> {
        self.inner.status.borrow().session_id.clone()
    }

    pub fn server_type(&self) -> u32 {
        self.inner.status.borrow().server_type
    }

    /// True once a stop was requested or the loop has ended.
    pub fn is_stopped(&self) -> bool {
        *self.inner.stop.borrow() || self.state() == SessionState::Stopped
    }

    /// Send a heartbeat request.
    pub fn send_heartbeat(&self) -> Result<()> {
        self.command(Command::Heartbeat)
    }

    /// Ask the host to enter rest mode.
    pub fn standby(&self) -> Result<()> {
        self.command(Command::Standby)
    }

    /// Stop the session and every stream bound to it. Idempotent.
    pub fn stop(&self) {
        debug!(host = %self.inner.host, "Stop requested");
        self.inner.stop.send_replace(true);
        // The loop may already be gone; the watch above is enough then.
        let _ = self.inner.commands.send(Command::Stop);
    }

    /// Receiver that flips to `true` when the session stops.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.inner.stop.subscribe()
    }

    /// Wait until the receive loop reports `Stopped`.
    pub async fn wait_stopped(&self) {
        let mut status = self.inner.status.clone();
        loop {
            if status.borrow().state == SessionState::Stopped {
                return;
            }
            if status.changed().await.is_err() {
                return;
            }
        }
    }

    /// Wait for the receive loop and return how it ended.
    ///
    /// Only the first caller observes the result; later calls return `Ok`.
    pub async fn join(&self) -> Result<()> {
        let task = self.inner.task.lock().await.take();
        match task {
            Some(task) => task.await.map_err(|e| {
                Error::Connection(std::io::Error::new(std::io::ErrorKind::Other, e))
            })?,
            None => Ok(()),
        }
    }

    /// Start streaming on a background task.
    ///
    /// Fails with `SessionNotReady` until the session id has arrived.
    pub fn start_stream(&self, options: StreamOptions) -> Result<JoinHandle<Result<()>>> {
        if self.session_id().is_none() {
            return Err(Error::SessionNotReady);
        }
        let handle = self.clone();
        let launcher = self.inner.launcher.clone();
        Ok(tokio::spawn(async move {
            let result = stream::bootstrap(launcher.as_ref(), handle, options).await;
            if let Err(e) = &result {
                warn!("Stream bootstrap failed: {}", e);
            }
            result
        }))
    }

    fn command(&self, command: Command) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::TransportClosed);
        }
        self.inner
            .commands
            .send(command)
            .map_err(|_| Error::TransportClosed)
    }
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle")
            .field("host", &self.inner.host)
            .field("host_type", &self.inner.host_type)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stream::NoopLauncher;
    use std::net::Ipv4Addr;

    pub(crate) struct Detached {
        pub commands: mpsc::UnboundedReceiver<Command>,
        pub status: watch::Sender<SessionStatus>,
    }

    /// Handle with no receive loop behind it.
    pub(crate) fn detached_handle(session_id: Option<Vec<u8>>) -> (ControlHandle, Detached) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (stop_tx, _) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: SessionState::Ready,
            session_id,
            server_type: 2,
        });
        let handle = ControlHandle::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            HostType::Ps4,
            cmd_tx,
            stop_tx,
            status_rx,
            Arc::new(NoopLauncher),
        );
        (
            handle,
            Detached {
                commands: cmd_rx,
                status: status_tx,
            },
        )
    }

    mod commands {
        use super::*;

        #[test]
        fn heartbeat_and_standby_are_forwarded() {
            let (handle, mut loop_side) = detached_handle(None);
            handle.send_heartbeat().unwrap();
            handle.standby().unwrap();

            assert_eq!(loop_side.commands.try_recv().unwrap(), Command::Heartbeat);
            assert_eq!(loop_side.commands.try_recv().unwrap(), Command::Standby);
        }

        #[test]
        fn stop_sets_signal_and_rejects_commands() {
            let (handle, mut loop_side) = detached_handle(None);
            let signal = handle.stop_signal();

            handle.stop();
            handle.stop();

            assert!(*signal.borrow());
            assert!(handle.is_stopped());
            assert_eq!(loop_side.commands.try_recv().unwrap(), Command::Stop);
            assert!(matches!(handle.standby(), Err(Error::TransportClosed)));
        }

        #[test]
        fn closed_loop_reads_as_transport_closed() {
            let (handle, loop_side) = detached_handle(None);
            drop(loop_side);
            assert!(matches!(handle.send_heartbeat(), Err(Error::TransportClosed)));
        }
    }

    mod status {
        use super::*;

        #[test]
        fn reflects_published_snapshot() {
            let (handle, loop_side) = detached_handle(None);
            assert_eq!(handle.session_id(), None);
            assert_eq!(handle.server_type(), 2);

            loop_side.status.send_replace(SessionStatus {
                state: SessionState::Ready,
                session_id: Some(b"XYZ".to_vec()),
                server_type: 2,
            });
            assert_eq!(handle.session_id(), Some(b"XYZ".to_vec()));
        }

        #[tokio::test]
        async fn wait_stopped_returns_after_stop_published() {
            let (handle, loop_side) = detached_handle(None);
            let waiter = handle.clone();
            let wait = tokio::spawn(async move { waiter.wait_stopped().await });

            loop_side.status.send_replace(SessionStatus {
                state: SessionState::Stopped,
                session_id: None,
                server_type: 2,
            });
            wait.await.unwrap();
            assert!(handle.is_stopped());
        }

        #[tokio::test]
        async fn join_without_task_is_ok() {
            let (handle, _loop_side) = detached_handle(None);
            handle.join().await.unwrap();
        }
    }

    mod streaming {
        use super::*;

        #[tokio::test]
        async fn start_stream_requires_session_id() {
            let (handle, _loop_side) = detached_handle(None);
            assert!(matches!(
                handle.start_stream(StreamOptions::test()),
                Err(Error::SessionNotReady)
            ));
        }

        #[tokio::test]
        async fn start_stream_runs_bootstrap() {
            let (handle, _loop_side) = detached_handle(Some(b"SID".to_vec()));
            let task = handle.start_stream(StreamOptions::test()).unwrap();
            task.await.unwrap().unwrap();
        }
    }
}
