//! Message pipeline.
//!
//! Outbound messages pass through an optional [`Serializer`] before they
//! reach the transport; inbound frames pass through an optional
//! [`Deserializer`] before they are emitted as `Message` events.
//!
//! Both functions default to the JSON pair in [`json`]. Setting either to
//! `None` passes payloads through unchanged.
//!
//! # Failure Isolation
//!
//! A failing serializer or deserializer never changes connection state.
//! The failure is wrapped with the original payload:
//!
//! - outbound: [`Error::SendFailed`] carrying the message
//! - inbound: [`Error::Decode`] carrying the raw frame
//!
//! and reported on the error channel only.

// ============================================================================
// Submodules
// ============================================================================

/// Default JSON codec functions.
pub mod json;

/// Payload type.
pub mod payload;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use payload::Payload;

// ============================================================================
// Types
// ============================================================================

/// Outbound encoding function.
pub type Serializer = Arc<dyn Fn(&Payload) -> Result<Payload> + Send + Sync>;

/// Inbound decoding function.
pub type Deserializer = Arc<dyn Fn(&Payload) -> Result<Payload> + Send + Sync>;

// ============================================================================
// Pipeline
// ============================================================================

/// Serializer/deserializer pair applied by the connection.
#[derive(Clone)]
pub struct Pipeline {
    serializer: Option<Serializer>,
    deserializer: Option<Deserializer>,
}

impl Pipeline {
    /// Creates a pipeline from optional codec functions.
    #[inline]
    #[must_use]
    pub fn new(serializer: Option<Serializer>, deserializer: Option<Deserializer>) -> Self {
        Self {
            serializer,
            deserializer,
        }
    }

    /// Creates the default JSON pipeline.
    #[must_use]
    pub fn json() -> Self {
        Self::new(Some(json::serializer()), Some(json::deserializer()))
    }

    /// Creates a pipeline that passes payloads through unchanged.
    #[inline]
    #[must_use]
    pub fn passthrough() -> Self {
        Self::new(None, None)
    }

    /// Returns `true` if an outbound serializer is configured.
    #[inline]
    #[must_use]
    pub fn has_serializer(&self) -> bool {
        self.serializer.is_some()
    }

    /// Returns `true` if an inbound deserializer is configured.
    #[inline]
    #[must_use]
    pub fn has_deserializer(&self) -> bool {
        self.deserializer.is_some()
    }

    /// Splits the pipeline into its codec functions.
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> (Option<Serializer>, Option<Deserializer>) {
        (self.serializer, self.deserializer)
    }

    /// Encodes an outbound message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SendFailed`] wrapping the serializer error, annotated
    /// with `message`.
    pub fn encode(&self, message: &Payload) -> Result<Payload> {
        match &self.serializer {
            Some(serialize) => {
                serialize(message).map_err(|e| Error::send_failed(message.clone(), e))
            }
            None => Ok(message.clone()),
        }
    }

    /// Decodes an inbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] wrapping the deserializer error, annotated
    /// with the raw frame.
    pub fn decode(&self, frame: Payload) -> Result<Payload> {
        let Some(deserialize) = &self.deserializer else {
            return Ok(frame);
        };

        match deserialize(&frame) {
            Ok(decoded) => Ok(decoded),
            Err(e) => {
                trace!(len = frame.len(), error = %e, "Inbound frame rejected by deserializer");
                Err(Error::decode(frame, e))
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::json()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("serializer", &self.serializer.is_some())
            .field("deserializer", &self.deserializer.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_json_pipeline_encodes_values() {
        let pipeline = Pipeline::json();
        let encoded = pipeline.encode(&Payload::Json(json!({ "a": 1 }))).unwrap();
        assert_eq!(encoded, Payload::Text(r#"{"a":1}"#.into()));
    }

    #[test]
    fn test_json_pipeline_decodes_text() {
        let pipeline = Pipeline::json();
        let decoded = pipeline.decode(Payload::from(r#"{"something":"foo"}"#)).unwrap();
        assert_eq!(decoded, Payload::Json(json!({ "something": "foo" })));
    }

    #[test]
    fn test_decode_failure_keeps_frame() {
        let pipeline = Pipeline::json();
        let err = pipeline.decode(Payload::from("not json")).unwrap_err();

        assert!(matches!(err, Error::Decode { .. }));
        assert_eq!(err.frame(), Some(&Payload::from("not json")));
    }

    #[test]
    fn test_encode_failure_keeps_message() {
        let failing: Serializer = Arc::new(|_| Err(Error::codec("nope")));
        let pipeline = Pipeline::new(Some(failing), None);

        let err = pipeline.encode(&Payload::from("x")).unwrap_err();
        assert!(err.is_send_error());
        assert_eq!(err.message(), Some(&Payload::from("x")));
    }

    #[test]
    fn test_passthrough() {
        let pipeline = Pipeline::passthrough();
        assert!(!pipeline.has_serializer());
        assert!(!pipeline.has_deserializer());

        let value = Payload::Json(json!([1, 2]));
        assert_eq!(pipeline.encode(&value).unwrap(), value);
        assert_eq!(pipeline.decode(Payload::from("raw")).unwrap(), Payload::from("raw"));
    }

    #[test]
    fn test_debug_hides_closures() {
        let debug = format!("{:?}", Pipeline::json());
        assert_eq!(debug, "Pipeline { serializer: true, deserializer: true }");
    }
}
