//! Serializable connection configuration.
//!
//! [`ConnectionConfig`] is the data-only subset of
//! [`ConnectionOptions`](crate::ConnectionOptions) that can live in a host
//! application's config file. Closures (custom codecs) and transport
//! factories are set on the builder instead.
//!
//! Durations are expressed in milliseconds.
//!
//! # Example
//!
//! ```
//! use tenacious_ws::ConnectionConfig;
//!
//! let config = ConnectionConfig::from_json_str(
//!     r#"{
//!         "strategy": "exponential",
//!         "strategy_opts": { "initial_delay": 500, "max_delay": 8000 },
//!         "fail_after": 10,
//!         "protocols": ["chat.v1"]
//!     }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.fail_after, Some(10));
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

use crate::backoff::{StrategyKind, StrategyOptions};
use crate::connection::{BinaryType, ClosePolicy};
use crate::error::Result;
use crate::transport::PlatformOptions;

// ============================================================================
// CodecKind
// ============================================================================

/// Built-in codec selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// JSON serializer and deserializer.
    #[default]
    Json,
    /// No serializer or deserializer.
    Passthrough,
}

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Data-only connection configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Connection name used in logs.
    pub name: Option<String>,

    /// Subprotocols requested during the handshake.
    pub protocols: Vec<String>,

    /// Pinned binary type.
    pub binary_type: Option<BinaryType>,

    /// Backoff strategy.
    pub strategy: StrategyKind,

    /// Backoff strategy tuning.
    pub strategy_opts: StrategyOptions,

    /// Retry cap. `None` retries forever.
    pub fail_after: Option<u32>,

    /// Built-in codec.
    pub codec: CodecKind,

    /// Transport construction options.
    pub platform: PlatformOptions,

    /// Close code classification.
    pub close_policy: ClosePolicy,
}

impl ConnectionConfig {
    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] on malformed input.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// Duration Helpers
// ============================================================================

/// (De)serializes a [`std::time::Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(dead_code)]
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// ============================================================================
// Tests
// ============================================================================
