//! Message payloads.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// Payload
// ============================================================================

/// A message travelling through the pipeline.
///
/// Transports only carry [`Payload::Text`] and [`Payload::Binary`] frames.
/// [`Payload::Json`] is the structured form produced by the default
/// deserializer and consumed by the default serializer.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Structured value, not yet serialized.
    Json(Value),
}

impl Payload {
    /// Returns `true` if the payload can be written to a transport as is.
    #[inline]
    #[must_use]
    pub fn is_frame(&self) -> bool {
        !matches!(self, Self::Json(_))
    }

    /// Returns the text content, if this is a text frame.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the structured value, if this is a JSON payload.
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the payload size in bytes for logging.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
            Self::Json(_) => 0,
        }
    }

    /// Returns `true` for empty frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_frame() && self.len() == 0
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<String> for Payload {
    #[inline]
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    #[inline]
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    #[inline]
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Payload {
    #[inline]
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

impl From<Value> for Payload {
    #[inline]
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

// ============================================================================
// Tests
// ============================================================================
