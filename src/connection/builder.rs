//! Builder pattern for connection configuration.
//!
//! Provides a fluent API for configuring and creating [`Connection`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use tenacious_ws::{Connection, StrategyKind};
//!
//! # async fn example() -> tenacious_ws::Result<()> {
//! let connection = Connection::builder()
//!     .url("wss://stream.example.com/v1")
//!     .protocols(["json.v1"])
//!     .strategy(StrategyKind::Exponential)
//!     .fail_after(10)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::backoff::{StrategyKind, StrategyOptions};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::pipeline::Payload;
use crate::transport::{PlatformOptions, TransportFactory};

use super::core::Connection;
use super::options::ConnectionOptions;
use super::state::{BinaryType, ClosePolicy};

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Builder for configuring a [`Connection`].
///
/// Use [`Connection::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ConnectionBuilder {
    /// Endpoint URL.
    url: Option<String>,
    /// Everything else.
    options: ConnectionOptions,
}

// ============================================================================
// ConnectionBuilder Implementation
// ============================================================================

impl ConnectionBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the connection name used in logs.
    #[inline]
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options = self.options.with_name(name);
        self
    }

    /// Sets the requested subprotocols.
    #[inline]
    #[must_use]
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.with_protocols(protocols);
        self
    }

    /// Pins the binary type.
    #[inline]
    #[must_use]
    pub fn binary_type(mut self, binary_type: BinaryType) -> Self {
        self.options = self.options.with_binary_type(binary_type);
        self
    }

    /// Selects the backoff strategy.
    #[inline]
    #[must_use]
    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.options = self.options.with_strategy(strategy);
        self
    }

    /// Sets the backoff strategy tuning.
    #[inline]
    #[must_use]
    pub fn strategy_options(mut self, options: StrategyOptions) -> Self {
        self.options = self.options.with_strategy_options(options);
        self
    }

    /// Gives up after `retries` failed retries.
    #[inline]
    #[must_use]
    pub fn fail_after(mut self, retries: u32) -> Self {
        self.options = self.options.with_fail_after(retries);
        self
    }

    /// Sets the outbound encoder.
    #[must_use]
    pub fn serializer<F>(mut self, serializer: F) -> Self
    where
        F: Fn(&Payload) -> Result<Payload> + Send + Sync + 'static,
    {
        self.options = self.options.with_serializer(Some(Arc::new(serializer)));
        self
    }

    /// Sets the inbound decoder.
    #[must_use]
    pub fn deserializer<F>(mut self, deserializer: F) -> Self
    where
        F: Fn(&Payload) -> Result<Payload> + Send + Sync + 'static,
    {
        self.options = self.options.with_deserializer(Some(Arc::new(deserializer)));
        self
    }

    /// Sends and emits payloads unchanged.
    #[inline]
    #[must_use]
    pub fn passthrough(mut self) -> Self {
        self.options = self.options.with_passthrough();
        self
    }

    /// Sets the transport factory.
    #[inline]
    #[must_use]
    pub fn transport(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.options = self.options.with_transport(factory);
        self
    }

    /// Builds a connection without a transport; `start()` will fail.
    #[inline]
    #[must_use]
    pub fn no_transport(mut self) -> Self {
        self.options = self.options.without_transport();
        self
    }

    /// Sets the transport construction options.
    #[inline]
    #[must_use]
    pub fn platform_options(mut self, platform: PlatformOptions) -> Self {
        self.options = self.options.with_platform(platform);
        self
    }

    /// Sets the close code classification.
    #[inline]
    #[must_use]
    pub fn close_policy(mut self, policy: ClosePolicy) -> Self {
        self.options = self.options.with_close_policy(policy);
        self
    }

    /// Applies a data-only configuration on top of the current options.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.options = self.options.with_config(config);
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the connection with validation.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is not set or no runtime is running
    /// - [`Error::Url`] if the URL cannot be parsed
    pub fn build(self) -> Result<Connection> {
        let url = self.validate_url()?;
        Connection::new(&url, self.options)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionBuilder {
    /// Validates the URL configuration.
    fn validate_url(&self) -> Result<String> {
        let url = self.url.clone().ok_or_else(|| {
            Error::config(
                "URL is required. Use .url() to set it.\n\
                 Example: Connection::builder().url(\"ws://localhost:8080\")",
            )
        })?;

        if url.trim().is_empty() {
            return Err(Error::config("URL must not be empty"));
        }

        Ok(url)
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
    fn test_new_creates_empty_builder() {
        let builder = ConnectionBuilder::new();
        assert!(builder.url.is_none());
        assert!(builder.options.transport.is_some());
    }

    #[test]
    fn test_setters_reach_options() {
        let builder = ConnectionBuilder::new()
            .url("ws://localhost:1")
            .name("feed")
            .protocols(["p"])
            .binary_type(BinaryType::ArrayBuffer)
            .strategy(StrategyKind::Exponential)
            .fail_after(4)
            .passthrough()
            .no_transport();

        assert_eq!(builder.url.as_deref(), Some("ws://localhost:1"));
        assert_eq!(builder.options.name.as_deref(), Some("feed"));
        assert_eq!(builder.options.protocols, vec!["p".to_string()]);
        assert_eq!(builder.options.binary_type, Some(BinaryType::ArrayBuffer));
        assert_eq!(builder.options.strategy, StrategyKind::Exponential);
        assert_eq!(builder.options.fail_after, Some(4));
        assert!(builder.options.serializer.is_none());
        assert!(builder.options.transport.is_none());
    }

    #[test]
    fn test_custom_codec() {
        let builder = ConnectionBuilder::new()
            .serializer(|p| Ok(p.clone()))
            .deserializer(|p| Ok(p.clone()));
        let pipeline = builder.options.pipeline();
        assert!(pipeline.has_serializer());
        assert!(pipeline.has_deserializer());
    }

    #[test]
    fn test_config_applied() {
        let config = ConnectionConfig::from_json_str(
            r#"{ "strategy_opts": { "initial_delay": 250 }, "platform": { "connect_timeout": 500 } }"#,
        )
        .unwrap();
        let builder = ConnectionBuilder::new().config(config);
        assert_eq!(
            builder.options.strategy_opts.initial_delay,
            Duration::from_millis(250)
        );
        assert_eq!(
            builder.options.platform.connect_timeout,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_build_fails_without_url() {
        let err = ConnectionBuilder::new().build().unwrap_err();
        assert!(err.to_string().contains("URL is required"));
    }

    #[test]
    fn test_build_fails_with_blank_url() {
        let err = ConnectionBuilder::new().url("   ").build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_inside_runtime() {
        let connection = ConnectionBuilder::new()
            .url("ws://localhost:9000")
            .name("built")
            .build()
            .unwrap();
        assert_eq!(connection.name(), "built");
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = ConnectionBuilder::new().url("ws://a");
        let cloned = builder.clone();
        assert_eq!(builder.url, cloned.url);
    }
}
