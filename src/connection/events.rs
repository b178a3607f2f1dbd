//! Observable connection notifications.
//!
//! Two ways to observe a connection:
//!
//! - [`EventSurface::on`] registers a callback for one [`EventKind`]
//! - [`EventSurface::subscribe`] returns an [`EventStream`] of every event
//!
//! Delivery is fire-and-forget in emission order. Nothing is replayed to
//! late subscribers and slow streams are never waited on.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Error;
use crate::identifiers::ListenerId;
use crate::pipeline::Payload;
use crate::transport::CloseFrame;

use super::state::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// Callback registered with [`EventSurface::on`].
pub type EventHandler = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Receiver returned by [`EventSurface::subscribe`].
pub type EventStream = mpsc::UnboundedReceiver<ConnectionEvent>;

// ============================================================================
// ConnectionEvent
// ============================================================================

/// A notification emitted by a connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The state changed.
    State(ConnectionState),
    /// First successful open after `start()`.
    Connect,
    /// Successful open after a retry.
    Reconnect,
    /// `stop()` completed.
    Disconnect,
    /// Decoded inbound message.
    Message(Payload),
    /// Something failed.
    Error(Arc<Error>),
    /// The remote closed normally.
    Info(CloseFrame),
}

impl ConnectionEvent {
    /// Returns the kind of this event.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::State(_) => EventKind::State,
            Self::Connect => EventKind::Connect,
            Self::Reconnect => EventKind::Reconnect,
            Self::Disconnect => EventKind::Disconnect,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Info(_) => EventKind::Info,
        }
    }

    /// Returns the error if this is an `Error` event.
    #[inline]
    #[must_use]
    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// EventKind
// ============================================================================

/// Event names handlers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`ConnectionEvent::State`].
    State,
    /// [`ConnectionEvent::Connect`].
    Connect,
    /// [`ConnectionEvent::Reconnect`].
    Reconnect,
    /// [`ConnectionEvent::Disconnect`].
    Disconnect,
    /// [`ConnectionEvent::Message`].
    Message,
    /// [`ConnectionEvent::Error`].
    Error,
    /// [`ConnectionEvent::Info`].
    Info,
}

impl EventKind {
    /// Returns the lowercase event name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Connect => "connect",
            Self::Reconnect => "reconnect",
            Self::Disconnect => "disconnect",
            Self::Message => "message",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EventSurface
// ============================================================================

#[derive(Default)]
struct Registry {
    handlers: FxHashMap<EventKind, Vec<(ListenerId, EventHandler)>>,
    subscribers: Vec<mpsc::UnboundedSender<ConnectionEvent>>,
}

/// Handler registry and subscriber fan-out for one connection.
pub struct EventSurface {
    name: String,
    registry: Mutex<Registry>,
}

impl EventSurface {
    /// Creates an empty surface for connection `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Registers `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.registry
            .lock()
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        trace!(name = %self.name, listener_id = %id, %kind, "Handler registered");
        id
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.lock();
        for handlers in registry.handlers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(h, _)| *h == id) {
                handlers.remove(pos);
                trace!(name = %self.name, listener_id = %id, "Handler removed");
                return true;
            }
        }
        false
    }

    /// Returns a stream of every event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.lock().subscribers.push(tx);
        rx
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.registry.lock().handlers.values().map(Vec::len).sum()
    }

    /// Delivers `event` to subscribers and matching handlers.
    ///
    /// Handlers run after the registry lock is released, so they may call
    /// [`on`](Self::on) or [`off`](Self::off).
    pub fn emit(&self, event: ConnectionEvent) {
        let kind = event.kind();

        let handlers: Vec<EventHandler> = {
            let mut registry = self.registry.lock();
            registry
                .subscribers
                .retain(|tx| tx.send(event.clone()).is_ok());
            registry
                .handlers
                .get(&kind)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        trace!(name = %self.name, %kind, handlers = handlers.len(), "Event emitted");

        for handler in handlers {
            handler(&event);
        }
    }
}

impl fmt::Debug for EventSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventSurface")
            .field("name", &self.name)
            .field("subscribers", &registry.subscribers.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
