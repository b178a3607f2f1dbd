//! Transport layer.
//!
//! The connection never talks to a socket directly. It drives a
//! [`Transport`] created by an injected [`TransportFactory`] and listens to
//! it through a [`TransportListener`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  create(request, listener)  ┌──────────────────┐
//! │  Lifecycle       │────────────────────────────►│ TransportFactory │
//! │  (one live slot) │                             └────────┬─────────┘
//! │                  │◄── TransportSignal ─────┐            │
//! └────────┬─────────┘   (open/message/        │   ┌────────▼─────────┐
//!          │              error/close)         └───│    Transport     │
//!          └── send / close / binary type ────────►│  (WebSocket)     │
//!                                                  └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `lifecycle` | Owns the single active transport |
//! | `listener` | Detachable event sink handed to transports |
//! | `tungstenite` | tokio-tungstenite WebSocket transport |

// ============================================================================
// Submodules
// ============================================================================

/// Single active transport slot.
pub(crate) mod lifecycle;

/// Detachable transport event sink.
pub mod listener;

/// tokio-tungstenite WebSocket transport.
pub mod tungstenite;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::config::duration_ms;
use crate::connection::BinaryType;
use crate::error::Result;
use crate::pipeline::Payload;

// ============================================================================
// Re-exports
// ============================================================================

pub use listener::{TransportEvent, TransportListener, TransportSignal};
pub use tungstenite::{TungsteniteFactory, TungsteniteTransport};

// ============================================================================
// Constants
// ============================================================================

/// Close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when no status was received.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Default handshake timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// CloseFrame
// ============================================================================

/// Close code and reason reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close code.
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
}

impl CloseFrame {
    /// Creates a close frame.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Frame reported when the connection dropped without a close frame.
    #[inline]
    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(CLOSE_ABNORMAL, "")
    }
}

// ============================================================================
// PlatformOptions
// ============================================================================

/// Transport construction options.
///
/// Passed to every [`TransportFactory::create`] call. Factories ignore
/// fields that do not apply to them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlatformOptions {
    /// Maximum size of an incoming message.
    pub max_message_size: Option<usize>,

    /// Maximum size of a single incoming frame.
    pub max_frame_size: Option<usize>,

    /// Accept frames the server did not mask.
    pub accept_unmasked_frames: bool,

    /// Set `TCP_NODELAY` on the socket.
    pub disable_nagle: bool,

    /// Handshake timeout.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            max_message_size: None,
            max_frame_size: None,
            accept_unmasked_frames: false,
            disable_nagle: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// A live bidirectional message socket.
///
/// Implementations report activity through the [`TransportListener`] they
/// were created with and must never call back into the connection
/// directly.
pub trait Transport: Send {
    /// Queues a frame for sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is not open or cannot carry the
    /// payload.
    fn send(&mut self, payload: Payload) -> Result<()>;

    /// Requests the socket to close. Must be safe to call more than once.
    fn close(&mut self, code: Option<u16>, reason: Option<&str>);

    /// Returns the binary type currently in effect.
    fn binary_type(&self) -> BinaryType;

    /// Changes how binary frames are surfaced.
    fn set_binary_type(&mut self, binary_type: BinaryType);
}

// ============================================================================
// TransportFactory
// ============================================================================

/// Parameters for creating a transport.
#[derive(Debug, Clone, Copy)]
pub struct TransportRequest<'a> {
    /// Endpoint URL.
    pub url: &'a Url,
    /// Requested subprotocols.
    pub protocols: &'a [String],
    /// Platform specific options.
    pub platform: &'a PlatformOptions,
}

/// Creates transports for a connection.
///
/// Selected once when the connection is built; the connection calls
/// [`create`](Self::create) for every connection attempt.
pub trait TransportFactory: Send + Sync {
    /// Starts connecting a new transport.
    ///
    /// Connection progress is reported later through `listener`; an `Ok`
    /// return only means the attempt has started.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be constructed at all.
    fn create(
        &self,
        request: &TransportRequest<'_>,
        listener: TransportListener,
    ) -> Result<Box<dyn Transport>>;
}

// ============================================================================
// Tests
// ============================================================================
