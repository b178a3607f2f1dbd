//! tenacious-ws - Self-healing WebSocket client.
//!
//! This library keeps a full-duplex message socket alive: it reconnects
//! with jittered backoff when the socket drops, encodes and decodes
//! messages, and reports everything that happens as events.
//!
//! # Architecture
//!
//! Every [`Connection`] is a handle to one tokio task that owns:
//!
//! - **State machine**: the authoritative [`ConnectionState`]
//! - **Transport lifecycle**: at most one live [`Transport`] at a time
//! - **Backoff adapter**: decides how long to wait and when to give up
//! - **Pipeline**: serializer and deserializer around the transport
//!
//! Key design principles:
//!
//! - Caller operations never block and never fail after construction
//! - Failures are reported through `Error` events with the lost payload
//! - A transport is detached before it is closed, so teardown never
//!   triggers a retry
//!
//! # Quick Start
//!
//! ```no_run
//! use tenacious_ws::{Connection, ConnectionEvent, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection = Connection::builder()
//!         .url("ws://127.0.0.1:9001")
//!         .build()?;
//!
//!     let mut events = connection.subscribe();
//!     connection.start();
//!     connection.send(serde_json::json!({ "hello": "world" }));
//!
//!     while let Some(event) = events.recv().await {
//!         if let ConnectionEvent::Message(payload) = event {
//!             println!("received {payload:?}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backoff`] | Retry scheduling and delay strategies |
//! | [`config`] | Serde-loadable [`ConnectionConfig`] |
//! | [`connection`] | [`Connection`], builder, options and events |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`pipeline`] | [`Payload`] and codec functions |
//! | [`transport`] | Transport traits and the WebSocket transport |

// ============================================================================
// Modules
// ============================================================================

/// Retry scheduling.
///
/// [`Backoff`](backoff::Backoff) wraps a [`BackoffStrategy`] and turns its
/// delays into timed signals.
pub mod backoff;

/// Serializable configuration.
pub mod config;

/// Connection handle, state machine and event surface.
pub mod connection;

/// Error types and result aliases.
///
/// Construction returns [`Result<T>`]; everything later is reported as an
/// [`Error`] event.
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Outbound and inbound message processing.
pub mod pipeline;

/// Transport abstraction and the tokio-tungstenite implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Backoff types
pub use backoff::{BackoffStrategy, StrategyKind, StrategyOptions};

// Configuration types
pub use config::{CodecKind, ConnectionConfig};

// Connection types
pub use connection::{
    BinaryType, CloseKind, ClosePolicy, Connection, ConnectionBuilder, ConnectionEvent,
    ConnectionOptions, ConnectionState, EventKind, EventStream, WeakConnection,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, TransportId};

// Pipeline types
pub use pipeline::{Deserializer, Payload, Serializer};

// Transport types
pub use transport::{
    CloseFrame, PlatformOptions, Transport, TransportEvent, TransportFactory, TransportListener,
    TransportRequest, TungsteniteFactory,
};
