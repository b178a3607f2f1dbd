//! Scriptable in-memory transport for tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::connection::BinaryType;
use crate::error::{Error, Result};
use crate::identifiers::TransportId;
use crate::pipeline::Payload;

use super::{
    CLOSE_NO_STATUS, CloseFrame, Transport, TransportFactory, TransportListener, TransportRequest,
};

// ============================================================================
// MockFactory
// ============================================================================

/// Factory that hands every created transport's handle to the test.
pub(crate) struct MockFactory {
    created_tx: mpsc::UnboundedSender<MockHandle>,
    handles: Mutex<Vec<MockHandle>>,
    echo_close: bool,
    default_binary_type: BinaryType,
    fail_create: Mutex<bool>,
}

impl MockFactory {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockHandle>) {
        Self::build(false)
    }

    /// Transports emit `close` synchronously from inside `close()`.
    pub(crate) fn with_echo_close() -> (Arc<Self>, mpsc::UnboundedReceiver<MockHandle>) {
        Self::build(true)
    }

    fn build(echo_close: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<MockHandle>) {
        let (created_tx, created_rx) = mpsc::unbounded_channel();
        let factory = Self {
            created_tx,
            handles: Mutex::new(Vec::new()),
            echo_close,
            default_binary_type: BinaryType::Blob,
            fail_create: Mutex::new(false),
        };
        (Arc::new(factory), created_rx)
    }

    pub(crate) fn fail_next_create(&self, fail: bool) {
        *self.fail_create.lock() = fail;
    }

    pub(crate) fn created(&self) -> usize {
        self.handles.lock().len()
    }

    /// Transports that were created and have not closed yet.
    pub(crate) fn live(&self) -> usize {
        self.handles.lock().iter().filter(|h| h.is_live()).count()
    }
}

impl TransportFactory for MockFactory {
    fn create(
        &self,
        request: &TransportRequest<'_>,
        listener: TransportListener,
    ) -> Result<Box<dyn Transport>> {
        if std::mem::take(&mut *self.fail_create.lock()) {
            return Err(Error::transport("mock factory refused"));
        }

        let handle = MockHandle {
            listener,
            state: Arc::new(Mutex::new(MockState {
                url: request.url.to_string(),
                protocols: request.protocols.to_vec(),
                binary_type: self.default_binary_type,
                ..MockState::default()
            })),
        };

        self.handles.lock().push(handle.clone());
        let _ = self.created_tx.send(handle.clone());

        Ok(Box::new(MockTransport {
            handle,
            echo_close: self.echo_close,
        }))
    }
}

// ============================================================================
// MockHandle
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    url: String,
    protocols: Vec<String>,
    binary_type: BinaryType,
    sent: Vec<Payload>,
    close_calls: Vec<(Option<u16>, Option<String>)>,
    remote_closed: bool,
    reject_sends: bool,
}

/// Test-side view of one mock transport.
#[derive(Debug, Clone)]
pub(crate) struct MockHandle {
    listener: TransportListener,
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub(crate) fn id(&self) -> TransportId {
        self.listener.id()
    }

    pub(crate) fn open(&self) {
        self.listener.on_open();
    }

    pub(crate) fn message(&self, payload: impl Into<Payload>) {
        self.listener.on_message(payload.into());
    }

    pub(crate) fn error(&self, message: &str) {
        self.listener.on_error(message);
    }

    /// Simulates the server closing the socket.
    pub(crate) fn close_remote(&self, code: u16, reason: &str) {
        self.state.lock().remote_closed = true;
        self.listener.on_close(CloseFrame::new(code, reason));
    }

    pub(crate) fn reject_sends(&self, reject: bool) {
        self.state.lock().reject_sends = reject;
    }

    pub(crate) fn sent(&self) -> Vec<Payload> {
        self.state.lock().sent.clone()
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.state.lock().close_calls.len()
    }

    pub(crate) fn is_detached(&self) -> bool {
        !self.listener.is_attached()
    }

    pub(crate) fn binary_type(&self) -> BinaryType {
        self.state.lock().binary_type
    }

    pub(crate) fn url(&self) -> String {
        self.state.lock().url.clone()
    }

    pub(crate) fn protocols(&self) -> Vec<String> {
        self.state.lock().protocols.clone()
    }

    fn is_live(&self) -> bool {
        let state = self.state.lock();
        state.close_calls.is_empty() && !state.remote_closed
    }
}

// ============================================================================
// MockTransport
// ============================================================================

struct MockTransport {
    handle: MockHandle,
    echo_close: bool,
}

impl Transport for MockTransport {
    fn send(&mut self, payload: Payload) -> Result<()> {
        let mut state = self.handle.state.lock();
        if state.reject_sends {
            return Err(Error::transport("mock socket rejected frame"));
        }
        state.sent.push(payload);
        Ok(())
    }

    fn close(&mut self, code: Option<u16>, reason: Option<&str>) {
        self.handle
            .state
            .lock()
            .close_calls
            .push((code, reason.map(str::to_owned)));

        if self.echo_close {
            self.handle.listener.on_close(CloseFrame::new(
                code.unwrap_or(CLOSE_NO_STATUS),
                reason.unwrap_or_default(),
            ));
        }
    }

    fn binary_type(&self) -> BinaryType {
        self.handle.state.lock().binary_type
    }

    fn set_binary_type(&mut self, binary_type: BinaryType) {
        self.handle.state.lock().binary_type = binary_type;
    }
}
