//! Detachable transport event sink.
//!
//! A [`TransportListener`] is created attached and handed to the factory.
//! Detaching flips a flag shared by every clone, so a transport that emits
//! `close` synchronously from inside its own `close()` call is silenced
//! before teardown begins.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::trace;

use crate::identifiers::TransportId;
use crate::pipeline::Payload;

use super::CloseFrame;

// ============================================================================
// Types
// ============================================================================

/// The closed set of transport callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The socket finished its handshake.
    Open,
    /// A frame arrived.
    Message(Payload),
    /// The socket reported an error.
    Error(String),
    /// The socket closed.
    Close(CloseFrame),
}

/// A [`TransportEvent`] tagged with the transport that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSignal {
    /// Source transport.
    pub id: TransportId,
    /// The event.
    pub event: TransportEvent,
}

// ============================================================================
// TransportListener
// ============================================================================

/// Event sink a transport reports through.
#[derive(Debug, Clone)]
pub struct TransportListener {
    id: TransportId,
    attached: Arc<AtomicBool>,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
}

impl TransportListener {
    /// Creates an attached listener for transport `id`.
    #[must_use]
    pub fn attach(id: TransportId, signal_tx: mpsc::UnboundedSender<TransportSignal>) -> Self {
        Self {
            id,
            attached: Arc::new(AtomicBool::new(true)),
            signal_tx,
        }
    }

    /// Returns the transport this listener belongs to.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.id
    }

    /// Returns `true` until [`detach`](Self::detach) is called.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Stops forwarding events. Idempotent.
    ///
    /// Returns `true` if this call detached the listener.
    pub fn detach(&self) -> bool {
        self.attached.swap(false, Ordering::AcqRel)
    }

    /// Reports that the socket opened.
    pub fn on_open(&self) {
        self.dispatch(TransportEvent::Open);
    }

    /// Reports an inbound frame.
    pub fn on_message(&self, payload: Payload) {
        self.dispatch(TransportEvent::Message(payload));
    }

    /// Reports a socket error.
    pub fn on_error(&self, message: impl Into<String>) {
        self.dispatch(TransportEvent::Error(message.into()));
    }

    /// Reports that the socket closed.
    pub fn on_close(&self, frame: CloseFrame) {
        self.dispatch(TransportEvent::Close(frame));
    }

    fn dispatch(&self, event: TransportEvent) {
        if !self.is_attached() {
            trace!(transport_id = %self.id, ?event, "Dropped event from detached transport");
            return;
        }

        let signal = TransportSignal { id: self.id, event };
        if self.signal_tx.send(signal).is_err() {
            trace!(transport_id = %self.id, "Connection loop gone, event dropped");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
