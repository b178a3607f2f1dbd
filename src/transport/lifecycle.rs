//! Single active transport slot.
//!
//! Guarantees at most one live transport per connection. Teardown always
//! detaches the listener before closing, so nothing the old transport
//! emits afterwards reaches the connection.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use url::Url;

use crate::connection::BinaryType;
use crate::error::{Error, Result};
use crate::identifiers::TransportId;

use super::{
    PlatformOptions, Transport, TransportFactory, TransportListener, TransportRequest,
    TransportSignal,
};

// ============================================================================
// Types
// ============================================================================

struct ActiveTransport {
    listener: TransportListener,
    transport: Box<dyn Transport>,
}

// ============================================================================
// TransportLifecycle
// ============================================================================

/// Owns the connection's transport.
pub(crate) struct TransportLifecycle {
    url: Url,
    protocols: Vec<String>,
    platform: PlatformOptions,
    factory: Option<Arc<dyn TransportFactory>>,
    /// Pinned or adopted binary type, shared with the public handle.
    binary_type: Arc<Mutex<Option<BinaryType>>>,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    active: Option<ActiveTransport>,
}

impl TransportLifecycle {
    pub(crate) fn new(
        url: Url,
        protocols: Vec<String>,
        platform: PlatformOptions,
        factory: Option<Arc<dyn TransportFactory>>,
        binary_type: Arc<Mutex<Option<BinaryType>>>,
        signal_tx: mpsc::UnboundedSender<TransportSignal>,
    ) -> Self {
        Self {
            url,
            protocols,
            platform,
            factory,
            binary_type,
            signal_tx,
            active: None,
        }
    }

    #[inline]
    pub(crate) fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }

    #[inline]
    pub(crate) fn current_id(&self) -> Option<TransportId> {
        self.active.as_ref().map(|a| a.listener.id())
    }

    /// Returns `true` if `id` is the live transport.
    #[inline]
    pub(crate) fn is_current(&self, id: TransportId) -> bool {
        self.current_id() == Some(id)
    }

    /// Tears down any live transport and starts a new one.
    ///
    /// On failure the slot is left empty.
    pub(crate) fn create(&mut self) -> Result<TransportId> {
        self.destroy(None, None);

        let factory = self
            .factory
            .clone()
            .ok_or(Error::UnsupportedEnvironment)?;

        let id = TransportId::next();
        let listener = TransportListener::attach(id, self.signal_tx.clone());
        let request = TransportRequest {
            url: &self.url,
            protocols: &self.protocols,
            platform: &self.platform,
        };

        let mut transport = match factory.create(&request, listener.clone()) {
            Ok(transport) => transport,
            Err(e) => {
                listener.detach();
                return Err(e);
            }
        };

        {
            let mut binary_type = self.binary_type.lock();
            match *binary_type {
                Some(pinned) => transport.set_binary_type(pinned),
                None => *binary_type = Some(transport.binary_type()),
            }
        }

        debug!(transport_id = %id, url = %self.url, "Transport created");
        self.active = Some(ActiveTransport {
            listener,
            transport,
        });
        Ok(id)
    }

    /// Detaches and closes the live transport, if any. Idempotent.
    pub(crate) fn destroy(&mut self, code: Option<u16>, reason: Option<&str>) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.listener.detach();
        active.transport.close(code, reason);
        debug!(transport_id = %active.listener.id(), ?code, "Transport destroyed");
    }

    /// Returns the live transport.
    #[inline]
    pub(crate) fn transport_mut(&mut self) -> Option<&mut dyn Transport> {
        match self.active.as_mut() {
            Some(active) => Some(active.transport.as_mut()),
            None => None,
        }
    }

    /// Applies a new binary type to the live transport.
    pub(crate) fn apply_binary_type(&mut self, binary_type: BinaryType) {
        if let Some(transport) = self.transport_mut() {
            transport.set_binary_type(binary_type);
            trace!(?binary_type, "Binary type applied to live transport");
        }
    }
}

impl Drop for TransportLifecycle {
    fn drop(&mut self) {
        self.destroy(None, None);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::mock::MockFactory;
    use crate::transport::TransportEvent;

    fn lifecycle(
        factory: Option<Arc<dyn TransportFactory>>,
        pinned: Option<BinaryType>,
    ) -> (
        TransportLifecycle,
        mpsc::UnboundedReceiver<TransportSignal>,
        Arc<Mutex<Option<BinaryType>>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let binary_type = Arc::new(Mutex::new(pinned));
        let lifecycle = TransportLifecycle::new(
            Url::parse("ws://localhost:9000/feed").unwrap(),
            vec!["chat".into()],
            PlatformOptions::default(),
            factory,
            Arc::clone(&binary_type),
            tx,
        );
        (lifecycle, rx, binary_type)
    }

    #[test]
    fn test_create_without_factory() {
        let (mut lifecycle, _rx, _) = lifecycle(None, None);
        assert!(!lifecycle.has_factory());
        let err = lifecycle.create().unwrap_err();
        assert!(matches!(err, Error::UnsupportedEnvironment));
        assert!(!lifecycle.is_active());
    }

    #[test]
    fn test_create_passes_request() {
        let (factory, mut created) = MockFactory::new();
        let (mut lifecycle, _rx, _) = lifecycle(Some(factory), None);

        let id = lifecycle.create().unwrap();
        let handle = created.try_recv().unwrap();
        assert_eq!(handle.id(), id);
        assert_eq!(handle.url(), "ws://localhost:9000/feed");
        assert_eq!(handle.protocols(), vec!["chat".to_string()]);
        assert!(lifecycle.is_current(id));
    }

    #[test]
    fn test_create_replaces_previous_transport() {
        let (factory, mut created) = MockFactory::new();
        let (mut lifecycle, _rx, _) = lifecycle(Some(factory.clone()), None);

        let first = lifecycle.create().unwrap();
        let second = lifecycle.create().unwrap();

        assert_ne!(first, second);
        assert!(!lifecycle.is_current(first));
        assert_eq!(factory.created(), 2);
        assert_eq!(factory.live(), 1);

        let old = created.try_recv().unwrap();
        assert!(old.is_detached());
        assert_eq!(old.close_calls(), 1);
    }

    #[test]
    fn test_destroy_detaches_before_close() {
        let (factory, mut created) = MockFactory::with_echo_close();
        let (mut lifecycle, mut rx, _) = lifecycle(Some(factory), None);

        lifecycle.create().unwrap();
        let handle = created.try_recv().unwrap();
        handle.open();

        lifecycle.destroy(Some(1000), Some("done"));
        lifecycle.destroy(None, None);

        assert_eq!(rx.try_recv().unwrap().event, TransportEvent::Open);
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.close_calls(), 1);
        assert!(!lifecycle.is_active());
    }

    #[test]
    fn test_late_events_from_destroyed_transport_dropped() {
        let (factory, mut created) = MockFactory::new();
        let (mut lifecycle, mut rx, _) = lifecycle(Some(factory), None);

        lifecycle.create().unwrap();
        let handle = created.try_recv().unwrap();
        lifecycle.destroy(None, None);

        handle.message("late");
        handle.close_remote(1006, "");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_default_binary_type_adopted() {
        let (factory, _created) = MockFactory::new();
        let (mut lifecycle, _rx, shared) = lifecycle(Some(factory), None);

        lifecycle.create().unwrap();
        assert_eq!(*shared.lock(), Some(BinaryType::Blob));
    }

    #[test]
    fn test_pinned_binary_type_applied() {
        let (factory, mut created) = MockFactory::new();
        let (mut lifecycle, _rx, shared) = lifecycle(Some(factory), Some(BinaryType::ArrayBuffer));

        lifecycle.create().unwrap();
        let handle = created.try_recv().unwrap();
        assert_eq!(handle.binary_type(), BinaryType::ArrayBuffer);
        assert_eq!(*shared.lock(), Some(BinaryType::ArrayBuffer));

        lifecycle.apply_binary_type(BinaryType::Blob);
        assert_eq!(handle.binary_type(), BinaryType::Blob);
    }

    #[test]
    fn test_factory_failure_leaves_slot_empty() {
        let (factory, _created) = MockFactory::new();
        factory.fail_next_create(true);
        let (mut lifecycle, _rx, _) = lifecycle(Some(factory.clone()), None);

        assert!(lifecycle.create().is_err());
        assert!(!lifecycle.is_active());
        assert!(lifecycle.create().is_ok());
    }

    #[test]
    fn test_drop_closes_transport() {
        let (factory, mut created) = MockFactory::new();
        let (mut lifecycle, _rx, _) = lifecycle(Some(factory), None);
        lifecycle.create().unwrap();
        let handle = created.try_recv().unwrap();

        drop(lifecycle);
        assert_eq!(handle.close_calls(), 1);
        assert!(handle.is_detached());
    }
}
