//! Control session events and handlers.

use std::sync::Arc;

use async_trait::async_trait;
use rp_core::FailureKind;

use crate::handle::ControlHandle;
use crate::message::ControlMessage;

/// Events emitted by a running control session.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// Session id received.
    SessionReady(Vec<u8>),
    /// Message passed through unhandled (login PIN, keyboard, standby).
    Message(ControlMessage),
    /// Receive loop ended. Carries the reason when it ended on an error.
    Stopped(Option<FailureKind>),
}

/// Handler for control events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    async fn on_event(&self, event: ControlEvent);
}

/// Discards every event.
///
/// The builder's default, for callers that only drive the session through
/// its [`ControlHandle`] and `join`.
pub struct NoOpHandler;

#[async_trait]
impl EventHandler for NoOpHandler {
    async fn on_event(&self, _event: ControlEvent) {}
}

/// Hands each event to a synchronous closure.
///
/// Runs on the receive loop, so the closure should only record or forward
/// the event (to a channel, a log line) and return.
pub struct CallbackHandler<F>
where
    F: Fn(ControlEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(ControlEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(ControlEvent) + Send + Sync,
{
    async fn on_event(&self, event: ControlEvent) {
        (self.callback)(event);
    }
}

/// Invoked once when the session id arrives.
///
/// Registering one replaces the default action of starting a test stream
/// followed by the real stream.
pub trait SessionReadyHandler: Send + Sync {
    fn on_session_ready(&self, handle: ControlHandle);
}

impl<F> SessionReadyHandler for F
where
    F: Fn(ControlHandle) + Send + Sync,
{
    fn on_session_ready(&self, handle: ControlHandle) {
        self(handle)
    }
}

pub(crate) type SharedEventHandler = Arc<dyn EventHandler>;
pub(crate) type SharedReadyHandler = Arc<dyn SessionReadyHandler>;
