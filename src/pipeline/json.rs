//! JSON codec.
//!
//! | Direction | `Json` | `Text` | `Binary` |
//! |-----------|--------|--------|----------|
//! | encode | serialized to `Text` | unchanged | unchanged |
//! | decode | unchanged | parsed to `Json` | unchanged |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::{from_str, to_string};

use crate::error::Result;

use super::{Deserializer, Payload, Serializer};

// ============================================================================
// Functions
// ============================================================================

/// Encodes structured payloads as JSON text.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if the value cannot be serialized.
pub fn encode(payload: &Payload) -> Result<Payload> {
    match payload {
        Payload::Json(value) => Ok(Payload::Text(to_string(value)?)),
        frame => Ok(frame.clone()),
    }
}

/// Parses text frames as JSON.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if the text is not valid JSON.
pub fn decode(payload: &Payload) -> Result<Payload> {
    match payload {
        Payload::Text(text) => Ok(Payload::Json(from_str(text)?)),
        other => Ok(other.clone()),
    }
}

/// Returns [`encode`] as a [`Serializer`].
#[must_use]
pub fn serializer() -> Serializer {
    Arc::new(encode)
}

/// Returns [`decode`] as a [`Deserializer`].
#[must_use]
pub fn deserializer() -> Deserializer {
    Arc::new(decode)
}

// ============================================================================
// Tests
// ============================================================================
