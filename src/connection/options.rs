//! Runtime connection options.
//!
//! Unlike [`ConnectionConfig`], options may hold closures and a transport
//! factory, so they are assembled in code.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tenacious_ws::{ConnectionOptions, StrategyKind};
//!
//! let options = ConnectionOptions::new()
//!     .with_strategy(StrategyKind::Exponential)
//!     .with_fail_after(5)
//!     .with_protocols(["chat.v1"])
//!     .with_name("feed");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::backoff::{StrategyKind, StrategyOptions};
use crate::config::{CodecKind, ConnectionConfig};
use crate::pipeline::{Deserializer, Pipeline, Serializer, json};
use crate::transport::{PlatformOptions, TransportFactory, TungsteniteFactory};

use super::state::{BinaryType, ClosePolicy};

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Everything a connection needs besides its URL.
#[derive(Clone)]
pub struct ConnectionOptions {
    /// Name used in logs. A random `ws-xxxx` name is generated when unset.
    pub name: Option<String>,

    /// Subprotocols requested during the handshake.
    pub protocols: Vec<String>,

    /// Pinned binary type. When unset the transport default is adopted.
    pub binary_type: Option<BinaryType>,

    /// Backoff strategy.
    pub strategy: StrategyKind,

    /// Backoff strategy tuning.
    pub strategy_opts: StrategyOptions,

    /// Retry cap. `None` or `Some(0)` retries forever.
    pub fail_after: Option<u32>,

    /// Outbound encoder. `None` sends payloads unchanged.
    pub serializer: Option<Serializer>,

    /// Inbound decoder. `None` emits frames unchanged.
    pub deserializer: Option<Deserializer>,

    /// Transport factory. `None` makes `start()` fail.
    pub transport: Option<Arc<dyn TransportFactory>>,

    /// Options passed to the transport factory.
    pub platform: PlatformOptions,

    /// Close code classification.
    pub close_policy: ClosePolicy,
}

// ============================================================================
// Constructors
// ============================================================================

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            name: None,
            protocols: Vec::new(),
            binary_type: None,
            strategy: StrategyKind::default(),
            strategy_opts: StrategyOptions::default(),
            fail_after: None,
            serializer: Some(json::serializer()),
            deserializer: Some(json::deserializer()),
            transport: Some(Arc::new(TungsteniteFactory)),
            platform: PlatformOptions::default(),
            close_policy: ClosePolicy::default(),
        }
    }
}

impl ConnectionOptions {
    /// Creates options with the JSON codec and the WebSocket transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options from a data-only configuration.
    #[must_use]
    pub fn from_config(config: ConnectionConfig) -> Self {
        Self::default().with_config(config)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the connection name.
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the requested subprotocols.
    #[inline]
    #[must_use]
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Pins the binary type.
    #[inline]
    #[must_use]
    pub fn with_binary_type(mut self, binary_type: BinaryType) -> Self {
        self.binary_type = Some(binary_type);
        self
    }

    /// Selects the backoff strategy.
    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the backoff strategy tuning.
    #[inline]
    #[must_use]
    pub fn with_strategy_options(mut self, options: StrategyOptions) -> Self {
        self.strategy_opts = options;
        self
    }

    /// Gives up after `retries` failed retries.
    #[inline]
    #[must_use]
    pub fn with_fail_after(mut self, retries: u32) -> Self {
        self.fail_after = Some(retries);
        self
    }

    /// Replaces the outbound encoder.
    #[inline]
    #[must_use]
    pub fn with_serializer(mut self, serializer: Option<Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Replaces the inbound decoder.
    #[inline]
    #[must_use]
    pub fn with_deserializer(mut self, deserializer: Option<Deserializer>) -> Self {
        self.deserializer = deserializer;
        self
    }

    /// Removes both codec functions.
    #[inline]
    #[must_use]
    pub fn with_passthrough(mut self) -> Self {
        self.serializer = None;
        self.deserializer = None;
        self
    }

    /// Replaces the transport factory.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport = Some(factory);
        self
    }

    /// Removes the transport factory.
    #[inline]
    #[must_use]
    pub fn without_transport(mut self) -> Self {
        self.transport = None;
        self
    }

    /// Sets the transport construction options.
    #[inline]
    #[must_use]
    pub fn with_platform(mut self, platform: PlatformOptions) -> Self {
        self.platform = platform;
        self
    }

    /// Sets the close code classification.
    #[inline]
    #[must_use]
    pub fn with_close_policy(mut self, policy: ClosePolicy) -> Self {
        self.close_policy = policy;
        self
    }

    /// Overlays a data-only configuration.
    ///
    /// Every field of `config` replaces the corresponding option; the
    /// transport factory is kept.
    #[must_use]
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        let pipeline = match config.codec {
            CodecKind::Json => Pipeline::json(),
            CodecKind::Passthrough => Pipeline::passthrough(),
        };
        let (serializer, deserializer) = pipeline.into_parts();

        if config.name.is_some() {
            self.name = config.name;
        }
        self.protocols = config.protocols;
        self.binary_type = config.binary_type;
        self.strategy = config.strategy;
        self.strategy_opts = config.strategy_opts;
        self.fail_after = config.fail_after;
        self.serializer = serializer;
        self.deserializer = deserializer;
        self.platform = config.platform;
        self.close_policy = config.close_policy;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ConnectionOptions {
    /// Returns the retry cap in effect. Zero disables the cap.
    #[inline]
    #[must_use]
    pub fn effective_fail_after(&self) -> Option<u32> {
        self.fail_after.filter(|&n| n > 0)
    }

    /// Builds the codec pipeline.
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.serializer.clone(), self.deserializer.clone())
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("name", &self.name)
            .field("protocols", &self.protocols)
            .field("binary_type", &self.binary_type)
            .field("strategy", &self.strategy)
            .field("strategy_opts", &self.strategy_opts)
            .field("fail_after", &self.fail_after)
            .field("serializer", &self.serializer.is_some())
            .field("deserializer", &self.deserializer.is_some())
            .field("transport", &self.transport.is_some())
            .field("platform", &self.platform)
            .field("close_policy", &self.close_policy)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::new();
        assert!(options.name.is_none());
        assert!(options.serializer.is_some());
        assert!(options.deserializer.is_some());
        assert!(options.transport.is_some());
        assert_eq!(options.strategy, StrategyKind::Fibonacci);
        assert_eq!(options.strategy_opts.initial_delay, Duration::from_millis(1_000));
        assert_eq!(options.strategy_opts.max_delay, Duration::from_millis(20_000));
        assert!(options.effective_fail_after().is_none());
    }

    #[test]
    fn test_builder_methods() {
        let options = ConnectionOptions::new()
            .with_name("feed")
            .with_protocols(["a", "b"])
            .with_binary_type(BinaryType::ArrayBuffer)
            .with_strategy(StrategyKind::Exponential)
            .with_fail_after(3)
            .with_passthrough()
            .without_transport();

        assert_eq!(options.name.as_deref(), Some("feed"));
        assert_eq!(options.protocols, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(options.binary_type, Some(BinaryType::ArrayBuffer));
        assert_eq!(options.strategy, StrategyKind::Exponential);
        assert_eq!(options.effective_fail_after(), Some(3));
        assert!(options.serializer.is_none());
        assert!(options.deserializer.is_none());
        assert!(options.transport.is_none());
    }

    #[test]
    fn test_zero_fail_after_means_unlimited() {
        let options = ConnectionOptions::new().with_fail_after(0);
        assert!(options.effective_fail_after().is_none());
    }

    #[test]
    fn test_from_config() {
        let config = ConnectionConfig::from_json_str(
            r#"{ "name": "cfg", "codec": "passthrough", "fail_after": 4 }"#,
        )
        .unwrap();
        let options = ConnectionOptions::from_config(config);

        assert_eq!(options.name.as_deref(), Some("cfg"));
        assert_eq!(options.fail_after, Some(4));
        assert!(!options.pipeline().has_serializer());
        assert!(options.transport.is_some());
    }

    #[test]
    fn test_config_without_name_keeps_existing() {
        let options = ConnectionOptions::new()
            .with_name("kept")
            .with_config(ConnectionConfig::default());
        assert_eq!(options.name.as_deref(), Some("kept"));
        assert!(options.pipeline().has_deserializer());
    }
}
