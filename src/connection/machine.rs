//! Connection state machine and event loop.
//!
//! One tokio task per connection owns the [`StateMachine`]. Caller
//! commands, transport signals and backoff signals arrive on unbounded
//! channels and are handled one at a time, so every transition runs to
//! completion before the next input is looked at.
//!
//! # Transitions
//!
//! | From | Input | To |
//! |------|-------|----|
//! | any | `start` | connecting |
//! | connecting / reconnecting | transport open | connected |
//! | any | transport close | disconnected, then backoff |
//! | any | backoff scheduled | waiting |
//! | waiting | backoff ready | reconnecting |
//! | any | backoff exhausted | error |
//! | any | `stop` | disconnected |
//!
//! The loop ends when every [`Connection`](super::Connection) handle has
//! been dropped, tearing down any live transport.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::backoff::{Backoff, BackoffEvent, BackoffSignal};
use crate::error::Error;
use crate::pipeline::{Payload, Pipeline};
use crate::transport::lifecycle::TransportLifecycle;
use crate::transport::{CloseFrame, TransportEvent, TransportSignal};

use super::events::{ConnectionEvent, EventSurface};
use super::options::ConnectionOptions;
use super::state::{BinaryType, CloseKind, ClosePolicy, ConnectionState};

// ============================================================================
// Types
// ============================================================================

/// Caller requests for the event loop.
#[derive(Debug)]
pub(crate) enum Command {
    /// Begin (or restart) connecting.
    Start,
    /// Tear down and stay disconnected.
    Stop,
    /// Encode and send a message.
    Send(Payload),
    /// Apply a binary type to the live transport.
    SetBinaryType(BinaryType),
}

/// State shared between the handles and the loop.
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) state: Arc<RwLock<ConnectionState>>,
    pub(crate) binary_type: Arc<Mutex<Option<BinaryType>>>,
    pub(crate) events: Arc<EventSurface>,
}

impl Shared {
    pub(crate) fn new(name: &str, binary_type: Option<BinaryType>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            binary_type: Arc::new(Mutex::new(binary_type)),
            events: Arc::new(EventSurface::new(name)),
        }
    }
}

/// Receiving halves of the internal signal channels.
pub(crate) struct Inbox {
    transport_rx: mpsc::UnboundedReceiver<TransportSignal>,
    backoff_rx: mpsc::UnboundedReceiver<BackoffSignal>,
}

// ============================================================================
// StateMachine
// ============================================================================

/// Authoritative connection state and transition rules.
pub(crate) struct StateMachine {
    name: String,
    shared: Shared,
    /// `Some(true)` from `start()` until the first open.
    first_connect: Option<bool>,
    lifecycle: TransportLifecycle,
    backoff: Backoff,
    pipeline: Pipeline,
    close_policy: ClosePolicy,
}

impl StateMachine {
    pub(crate) fn new(
        name: String,
        url: Url,
        options: ConnectionOptions,
        shared: Shared,
    ) -> (Self, Inbox) {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (backoff_tx, backoff_rx) = mpsc::unbounded_channel();

        let pipeline = options.pipeline();
        let strategy = options.strategy.build(options.strategy_opts);
        let backoff = Backoff::new(strategy, options.effective_fail_after(), backoff_tx);
        let lifecycle = TransportLifecycle::new(
            url,
            options.protocols,
            options.platform,
            options.transport,
            Arc::clone(&shared.binary_type),
            transport_tx,
        );

        let machine = Self {
            name,
            shared,
            first_connect: None,
            lifecycle,
            backoff,
            pipeline,
            close_policy: options.close_policy,
        };
        let inbox = Inbox {
            transport_rx,
            backoff_rx,
        };
        (machine, inbox)
    }

    /// Runs until the command channel closes.
    pub(crate) async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut inbox: Inbox,
    ) {
        debug!(name = %self.name, "Connection loop started");

        loop {
            tokio::select! {
                biased;

                command = command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }

                Some(signal) = inbox.transport_rx.recv() => {
                    self.handle_transport(signal);
                }

                Some(signal) = inbox.backoff_rx.recv() => {
                    self.handle_backoff(signal);
                }
            }
        }

        self.backoff.cancel();
        self.lifecycle.destroy(None, None);
        debug!(name = %self.name, "Connection loop terminated");
    }

    #[inline]
    fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    fn set_state(&mut self, state: ConnectionState) {
        *self.shared.state.write() = state;
        debug!(name = %self.name, %state, "State changed");
        self.shared.events.emit(ConnectionEvent::State(state));
    }

    fn emit(&self, event: ConnectionEvent) {
        self.shared.events.emit(event);
    }

    fn report(&self, err: Error) {
        self.emit(ConnectionEvent::Error(Arc::new(err)));
    }
}

// ============================================================================
// Commands
// ============================================================================

impl StateMachine {
    pub(crate) fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Send(message) => self.send(message),
            Command::SetBinaryType(binary_type) => self.lifecycle.apply_binary_type(binary_type),
        }
    }

    fn start(&mut self) {
        if !self.lifecycle.has_factory() {
            self.fail(Error::UnsupportedEnvironment);
            return;
        }

        self.backoff.cancel();
        self.set_state(ConnectionState::Connecting);
        self.first_connect = Some(true);
        info!(name = %self.name, "Connecting");

        if let Err(e) = self.lifecycle.create() {
            self.fail(e);
        }
    }

    fn stop(&mut self) {
        self.backoff.reset();
        self.lifecycle.destroy(None, None);
        self.set_state(ConnectionState::Disconnected);
        info!(name = %self.name, "Disconnected");
        self.emit(ConnectionEvent::Disconnect);
    }

    fn send(&mut self, message: Payload) {
        if !self.lifecycle.is_active() {
            debug!(name = %self.name, "Send without transport");
            self.report(Error::not_connected(message));
            return;
        }

        let frame = match self.pipeline.encode(&message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(name = %self.name, error = %e, "Serializer rejected message");
                self.report(e);
                return;
            }
        };

        let result = match self.lifecycle.transport_mut() {
            Some(transport) => transport.send(frame),
            None => return,
        };

        match result {
            Ok(()) => trace!(name = %self.name, "Message handed to transport"),
            Err(e) => {
                warn!(name = %self.name, error = %e, "Transport rejected message");
                self.report(Error::send_failed(message, e));
            }
        }
    }

    /// Tears down the transport and parks in `Error` until the next start.
    fn fail(&mut self, err: Error) {
        self.lifecycle.destroy(None, None);
        self.backoff.cancel();
        self.set_state(ConnectionState::Error);
        error!(name = %self.name, error = %err, "Connection failed");
        self.report(err);
    }
}

// ============================================================================
// Transport Signals
// ============================================================================

impl StateMachine {
    pub(crate) fn handle_transport(&mut self, signal: TransportSignal) {
        if !self.lifecycle.is_current(signal.id) {
            trace!(name = %self.name, transport_id = %signal.id, "Ignored event from stale transport");
            return;
        }

        match signal.event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(frame) => self.on_message(frame),
            TransportEvent::Error(message) => self.on_error(message),
            TransportEvent::Close(frame) => self.on_close(frame),
        }
    }

    fn on_open(&mut self) {
        self.set_state(ConnectionState::Connected);

        if self.first_connect == Some(true) {
            self.first_connect = Some(false);
            info!(name = %self.name, "Connected");
            self.emit(ConnectionEvent::Connect);
        } else {
            info!(name = %self.name, attempts = self.backoff.attempts(), "Reconnected");
            self.emit(ConnectionEvent::Reconnect);
        }

        self.backoff.reset();
    }

    fn on_message(&mut self, frame: Payload) {
        match self.pipeline.decode(frame) {
            Ok(message) => self.emit(ConnectionEvent::Message(message)),
            Err(e) => {
                debug!(name = %self.name, error = %e, "Inbound frame dropped");
                self.report(e);
            }
        }
    }

    fn on_error(&mut self, message: String) {
        let err = if self.state().is_attempting() {
            Error::connection_attempt(self.backoff.attempts(), message)
        } else {
            Error::transport(message)
        };
        warn!(name = %self.name, error = %err, "Transport error");
        self.report(err);
    }

    fn on_close(&mut self, frame: CloseFrame) {
        self.lifecycle.destroy(None, None);

        let kind = self.close_policy.classify(&frame);
        match kind {
            CloseKind::Normal => {
                info!(name = %self.name, code = frame.code, "Connection closed");
                self.emit(ConnectionEvent::Info(frame));
            }
            CloseKind::Abnormal => {
                warn!(name = %self.name, code = frame.code, reason = %frame.reason, "Connection closed abnormally");
                self.report(Error::abnormal_close(frame.code, frame.reason));
            }
        }

        self.set_state(ConnectionState::Disconnected);

        if self.close_policy.should_retry(kind) {
            self.backoff.backoff();
        }
    }
}

// ============================================================================
// Backoff Signals
// ============================================================================

impl StateMachine {
    pub(crate) fn handle_backoff(&mut self, signal: BackoffSignal) {
        if !self.backoff.accept(&signal) {
            trace!(name = %self.name, event = ?signal.event, "Ignored stale backoff signal");
            return;
        }

        match signal.event {
            BackoffEvent::Scheduled { number, delay } => {
                debug!(
                    name = %self.name,
                    attempt = number,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                self.set_state(ConnectionState::Waiting);
            }
            BackoffEvent::Ready { number, .. } => {
                self.backoff.complete();
                debug!(name = %self.name, attempt = number, "Reconnecting");
                self.reconnect();
            }
            BackoffEvent::Exhausted { attempts } => {
                self.fail(Error::exhausted(attempts));
            }
        }
    }

    fn reconnect(&mut self) {
        self.set_state(ConnectionState::Reconnecting);
        self.lifecycle.destroy(None, None);
        if let Err(e) = self.lifecycle.create() {
            self.fail(e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
