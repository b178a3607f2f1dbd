//! Connection state, binary type and close classification.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::transport::{CLOSE_NORMAL, CloseFrame};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected and not trying to.
    #[default]
    Disconnected,
    /// First attempt after `start()` in flight.
    Connecting,
    /// Transport open.
    Connected,
    /// Backoff delay running.
    Waiting,
    /// Retry attempt in flight.
    Reconnecting,
    /// Failed fatally; `start()` to try again.
    Error,
}

impl ConnectionState {
    /// Returns the lowercase state name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Waiting => "waiting",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }

    /// Returns `true` while an attempt is in flight.
    #[inline]
    #[must_use]
    pub const fn is_attempting(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// BinaryType
// ============================================================================

/// How binary frames are surfaced by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryType {
    /// Opaque blob.
    #[default]
    Blob,
    /// Raw byte buffer.
    ArrayBuffer,
}

impl BinaryType {
    /// Returns the lowercase name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::ArrayBuffer => "arraybuffer",
        }
    }
}

impl fmt::Display for BinaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BinaryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(Self::Blob),
            "arraybuffer" => Ok(Self::ArrayBuffer),
            other => Err(Error::config(format!(
                "unknown binary type '{other}', expected 'blob' or 'arraybuffer'"
            ))),
        }
    }
}

// ============================================================================
// ClosePolicy
// ============================================================================

/// Outcome of classifying a close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Reported as `Info`.
    Normal,
    /// Reported as `Error`.
    Abnormal,
}

/// Decides how a remote close is reported and whether it is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClosePolicy {
    /// Codes at or above this value are errors, except 1000.
    pub error_threshold: u16,

    /// Schedule a retry after a normal close.
    pub reconnect_on_normal_close: bool,
}

impl Default for ClosePolicy {
    fn default() -> Self {
        Self {
            error_threshold: 400,
            reconnect_on_normal_close: true,
        }
    }
}

impl ClosePolicy {
    /// Classifies a close frame.
    #[inline]
    #[must_use]
    pub fn classify(&self, frame: &CloseFrame) -> CloseKind {
        if frame.code < self.error_threshold || frame.code == CLOSE_NORMAL {
            CloseKind::Normal
        } else {
            CloseKind::Abnormal
        }
    }

    /// Returns `true` if a close of this kind schedules a retry.
    #[inline]
    #[must_use]
    pub fn should_retry(&self, kind: CloseKind) -> bool {
        match kind {
            CloseKind::Normal => self.reconnect_on_normal_close,
            CloseKind::Abnormal => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Waiting.to_string(), "waiting");
        assert!(ConnectionState::Reconnecting.is_attempting());
        assert!(!ConnectionState::Connected.is_attempting());
    }

    #[test]
    fn test_binary_type_parse() {
        assert_eq!("blob".parse::<BinaryType>().unwrap(), BinaryType::Blob);
        assert_eq!(
            "arraybuffer".parse::<BinaryType>().unwrap(),
            BinaryType::ArrayBuffer
        );
        assert!("ArrayBuffer".parse::<BinaryType>().is_err());
        assert!("buffer".parse::<BinaryType>().is_err());
    }

    #[test]
    fn test_close_classification() {
        let policy = ClosePolicy::default();
        assert_eq!(policy.classify(&CloseFrame::new(1000, "")), CloseKind::Normal);
        assert_eq!(policy.classify(&CloseFrame::new(200, "")), CloseKind::Normal);
        assert_eq!(policy.classify(&CloseFrame::new(1006, "")), CloseKind::Abnormal);
        assert_eq!(
            policy.classify(&CloseFrame::new(4001, "kicked")),
            CloseKind::Abnormal
        );
    }

    #[test]
    fn test_normal_close_retry_configurable() {
        let policy = ClosePolicy {
            reconnect_on_normal_close: false,
            ..ClosePolicy::default()
        };
        assert!(!policy.should_retry(CloseKind::Normal));
        assert!(policy.should_retry(CloseKind::Abnormal));
    }
}
