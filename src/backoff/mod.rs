//! Backoff policy adapter.
//!
//! Wraps a [`BackoffStrategy`] and turns it into timed signals that drive
//! reconnection. The adapter is purely reactive: the connection decides
//! when to call [`Backoff::backoff`] and [`Backoff::reset`]; the adapter
//! decides how long to wait and when to give up.
//!
//! # Signals
//!
//! ```text
//! backoff() ──► Scheduled{n, delay} ──(delay)──► Ready{n, delay}
//!     │
//!     └── n == fail_after ──► Exhausted{attempts}
//! ```
//!
//! Signals are sent on the channel handed to [`Backoff::new`]. Each one is
//! stamped with an epoch; [`Backoff::reset`] and [`Backoff::cancel`] bump the
//! epoch so signals already queued from a cancelled cycle are rejected by
//! [`Backoff::accept`].

// ============================================================================
// Submodules
// ============================================================================

/// Delay strategies.
pub mod strategy;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

// ============================================================================
// Re-exports
// ============================================================================

pub use strategy::{
    BackoffStrategy, ExponentialStrategy, FibonacciStrategy, StrategyKind, StrategyOptions,
};

// ============================================================================
// Types
// ============================================================================

/// Event emitted by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffEvent {
    /// A retry was scheduled after `delay`.
    Scheduled {
        /// Zero-based retry number.
        number: u32,
        /// Jittered delay.
        delay: Duration,
    },
    /// The delay elapsed; time to retry.
    Ready {
        /// Zero-based retry number.
        number: u32,
        /// Delay that elapsed.
        delay: Duration,
    },
    /// The retry cap was reached.
    Exhausted {
        /// Retries performed before giving up.
        attempts: u32,
    },
}

/// A [`BackoffEvent`] stamped with the cycle it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSignal {
    epoch: u64,
    /// The event.
    pub event: BackoffEvent,
}

/// Sending half of the signal channel.
pub type SignalSender = mpsc::UnboundedSender<BackoffSignal>;

// ============================================================================
// Backoff
// ============================================================================

/// Retry scheduler owned by a connection.
///
/// Must be used from within a tokio runtime: timers are spawned tasks.
pub struct Backoff {
    strategy: Box<dyn BackoffStrategy>,
    fail_after: Option<u32>,
    number: u32,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
    signal_tx: SignalSender,
}

impl Backoff {
    /// Creates an adapter around `strategy`.
    ///
    /// `fail_after` caps the number of retries; `None` retries forever.
    #[must_use]
    pub fn new(
        strategy: Box<dyn BackoffStrategy>,
        fail_after: Option<u32>,
        signal_tx: SignalSender,
    ) -> Self {
        Self {
            strategy,
            fail_after,
            number: 0,
            epoch: 0,
            timer: None,
            signal_tx,
        }
    }

    /// Returns the current retry number.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.number
    }

    /// Returns the configured retry cap.
    #[inline]
    #[must_use]
    pub fn fail_after(&self) -> Option<u32> {
        self.fail_after
    }

    /// Returns `true` while a retry timer is armed.
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Schedules the next retry, or reports exhaustion.
    ///
    /// No-op while a retry is already pending.
    pub fn backoff(&mut self) {
        if self.timer.is_some() {
            warn!(number = self.number, "Backoff already in progress");
            return;
        }

        if self.fail_after == Some(self.number) {
            let attempts = self.number;
            debug!(attempts, "Backoff exhausted");
            self.send(BackoffEvent::Exhausted { attempts });
            self.rewind();
            return;
        }

        let number = self.number;
        let delay = self.strategy.next_delay();
        debug!(number, delay_ms = delay.as_millis() as u64, "Backoff scheduled");

        self.send(BackoffEvent::Scheduled { number, delay });

        let signal_tx = self.signal_tx.clone();
        let ready = BackoffSignal {
            epoch: self.epoch,
            event: BackoffEvent::Ready { number, delay },
        };
        self.timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = signal_tx.send(ready);
        }));
    }

    /// Returns `true` if `signal` belongs to the current cycle.
    #[inline]
    #[must_use]
    pub fn accept(&self, signal: &BackoffSignal) -> bool {
        signal.epoch == self.epoch
    }

    /// Records that the pending delay elapsed and advances the retry number.
    ///
    /// Call after an accepted [`BackoffEvent::Ready`].
    pub fn complete(&mut self) {
        self.timer = None;
        self.number = self.number.saturating_add(1);
    }

    /// Returns to the initial condition and drops any pending retry.
    pub fn reset(&mut self) {
        self.cancel();
        self.rewind();
        trace!("Backoff reset");
    }

    /// Drops any pending retry without touching the retry number.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            debug!(number = self.number, "Pending backoff cancelled");
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn rewind(&mut self) {
        self.number = 0;
        self.strategy.reset();
    }

    fn send(&self, event: BackoffEvent) {
        let signal = BackoffSignal {
            epoch: self.epoch,
            event,
        };
        if self.signal_tx.send(signal).is_err() {
            trace!(?event, "Backoff signal dropped, receiver gone");
        }
    }
}

impl Drop for Backoff {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
