//! Error types for tenacious-ws.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Construction is the only fallible call that returns an error directly.
//! Everything after `start()` is reported through the `Error` event:
//!
//! ```ignore
//! use tenacious_ws::{Connection, ConnectionEvent, EventKind};
//!
//! let connection = Connection::builder().url("ws://127.0.0.1:8080").build()?;
//! connection.on(EventKind::Error, |event| {
//!     if let ConnectionEvent::Error(err) = event {
//!         eprintln!("socket error: {err}");
//!     }
//! });
//! connection.start();
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::UnsupportedEnvironment`] |
//! | Connection | [`Error::ConnectionAttempt`], [`Error::AbnormalClose`], [`Error::Exhausted`], [`Error::Transport`] |
//! | Messaging | [`Error::NotConnected`], [`Error::SendFailed`], [`Error::Decode`], [`Error::Codec`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::pipeline::Payload;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Send and decode failures carry the original payload so subscribers can
/// retry or log what was lost.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the connection is built without a usable URL or
    /// outside of a tokio runtime.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// No transport factory is available.
    ///
    /// Reported when `start()` is called on a connection built without a
    /// transport.
    #[error("Environment does not support WebSockets")]
    UnsupportedEnvironment,

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport reported an error while an attempt was in flight.
    #[error("Error during connection attempt {attempt}: {message}")]
    ConnectionAttempt {
        /// Backoff attempt number at the time of the error.
        attempt: u32,
        /// Description from the transport.
        message: String,
    },

    /// Remote closed the socket with an error-class code.
    #[error("Connection closed: {code} {reason}")]
    AbnormalClose {
        /// Close code from the close frame.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },

    /// Retry cap reached. Fatal until the next `start()`.
    #[error("Failed to connect after {attempts} tries")]
    Exhausted {
        /// Number of retries performed.
        attempts: u32,
    },

    /// Unclassified transport failure.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Messaging Errors
    // ========================================================================
    /// `send` was called without a live transport.
    #[error("Can't send, not connected")]
    NotConnected {
        /// The message that could not be sent.
        message: Payload,
    },

    /// Serializer or transport rejected an outbound message.
    #[error("Send failed: {source}")]
    SendFailed {
        /// The original outbound message.
        message: Payload,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// Deserializer rejected an inbound frame.
    #[error("Failed to decode inbound frame: {source}")]
    Decode {
        /// The raw frame as received.
        frame: Payload,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// Codec could not handle a payload variant.
    #[error("Codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection attempt error.
    #[inline]
    pub fn connection_attempt(attempt: u32, message: impl Into<String>) -> Self {
        Self::ConnectionAttempt {
            attempt,
            message: message.into(),
        }
    }

    /// Creates an abnormal close error.
    #[inline]
    pub fn abnormal_close(code: u16, reason: impl Into<String>) -> Self {
        Self::AbnormalClose {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a backoff exhaustion error.
    #[inline]
    pub fn exhausted(attempts: u32) -> Self {
        Self::Exhausted { attempts }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a not connected error for the given outbound message.
    #[inline]
    pub fn not_connected(message: Payload) -> Self {
        Self::NotConnected { message }
    }

    /// Wraps `source` as a send failure for `message`.
    #[inline]
    pub fn send_failed(message: Payload, source: Error) -> Self {
        Self::SendFailed {
            message,
            source: Box::new(source),
        }
    }

    /// Wraps `source` as a decode failure for `frame`.
    #[inline]
    pub fn decode(frame: Payload, source: Error) -> Self {
        Self::Decode {
            frame,
            source: Box::new(source),
        }
    }

    /// Creates a codec error.
    #[inline]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the connection will not retry on its own.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::UnsupportedEnvironment | Self::Exhausted { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionAttempt { .. }
                | Self::AbnormalClose { .. }
                | Self::Exhausted { .. }
                | Self::Transport { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if an outbound message was lost.
    #[inline]
    #[must_use]
    pub fn is_send_error(&self) -> bool {
        matches!(self, Self::NotConnected { .. } | Self::SendFailed { .. })
    }

    /// Returns the outbound message a send error was annotated with.
    #[must_use]
    pub fn message(&self) -> Option<&Payload> {
        match self {
            Self::NotConnected { message } | Self::SendFailed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Returns the inbound frame a decode error was annotated with.
    #[must_use]
    pub fn frame(&self) -> Option<&Payload> {
        match self {
            Self::Decode { frame, .. } => Some(frame),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
