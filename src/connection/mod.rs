//! Self-healing connection.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent [`ConnectionBuilder`] |
//! | `core` | Public [`Connection`] handle |
//! | `events` | [`ConnectionEvent`] fan-out |
//! | `machine` | State machine and event loop |
//! | `options` | Runtime [`ConnectionOptions`] |
//! | `state` | [`ConnectionState`], [`BinaryType`], [`ClosePolicy`] |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder.
pub mod builder;

/// Public handle.
pub mod core;

/// Event surface.
pub mod events;

/// State machine and event loop.
mod machine;

/// Runtime options.
pub mod options;

/// State and close classification types.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionBuilder;
pub use core::{Connection, WeakConnection};
pub use events::{ConnectionEvent, EventHandler, EventKind, EventStream, EventSurface};
pub use options::ConnectionOptions;
pub use state::{BinaryType, CloseKind, ClosePolicy, ConnectionState};
