//! Public connection handle.
//!
//! A [`Connection`] is a cheap, cloneable handle to one event-loop task.
//! Every operation is non-blocking: commands are queued to the loop and
//! their outcome is reported through events.
//!
//! # Example
//!
//! ```no_run
//! use tenacious_ws::{Connection, ConnectionEvent, EventKind};
//!
//! # async fn example() -> tenacious_ws::Result<()> {
//! let connection = Connection::builder()
//!     .url("ws://127.0.0.1:8080/feed")
//!     .fail_after(5)
//!     .build()?;
//!
//! connection.on(EventKind::Message, |event| {
//!     if let ConnectionEvent::Message(payload) = event {
//!         println!("received {payload:?}");
//!     }
//! });
//!
//! connection.start();
//! connection.send(serde_json::json!({ "op": "subscribe" }));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identifiers::ListenerId;
use crate::pipeline::Payload;

use super::builder::ConnectionBuilder;
use super::events::{ConnectionEvent, EventKind, EventStream, EventSurface};
use super::machine::{Command, Shared, StateMachine};
use super::options::ConnectionOptions;
use super::state::{BinaryType, ConnectionState};

// ============================================================================
// Constants
// ============================================================================

/// Prefix of generated connection names.
const NAME_PREFIX: &str = "ws-";

/// Hex digits in a generated connection name.
const NAME_SUFFIX_LEN: usize = 4;

// ============================================================================
// Connection
// ============================================================================

struct Inner {
    name: String,
    url: Url,
    command_tx: mpsc::UnboundedSender<Command>,
    shared: Shared,
}

/// Handle to a self-healing socket connection.
///
/// All clones address the same connection. The event loop stops and the
/// transport is torn down when the last clone is dropped.
///
/// Handlers are owned by the connection, so a handler that captures a
/// `Connection` keeps it alive. Capture a [`WeakConnection`] instead.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`. State reads are lock-protected snapshots.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`Connection`].
///
/// Obtained from [`Connection::downgrade`]. Does not keep the event loop
/// running.
#[derive(Clone)]
pub struct WeakConnection {
    inner: Weak<Inner>,
}

impl WeakConnection {
    /// Returns the connection if any strong handle is still alive.
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

impl fmt::Debug for WeakConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakConnection")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Connection {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Creates an inert connection to `url`. Call [`start`](Self::start) to
    /// connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `url` is empty, the strategy options are
    ///   invalid, or no tokio runtime is running
    /// - [`Error::Url`] if `url` cannot be parsed
    pub fn new(url: &str, options: ConnectionOptions) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(Error::config("URL is required"));
        }
        let url = Url::parse(url)?;

        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Connection must be created inside a tokio runtime"))?;
        options.strategy_opts.validate()?;

        let name = options.name.clone().unwrap_or_else(generate_name);
        let shared = Shared::new(&name, options.binary_type);
        let (machine, inbox) = StateMachine::new(name.clone(), url.clone(), options, shared.clone());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        runtime.spawn(machine.run(command_rx, inbox));
        debug!(%name, %url, "Connection created");

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                url,
                command_tx,
                shared,
            }),
        })
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

impl Connection {
    /// Starts connecting. Restarts if already running.
    pub fn start(&self) {
        self.command(Command::Start);
    }

    /// Cancels any pending retry, closes the transport and stays
    /// disconnected until the next [`start`](Self::start).
    pub fn stop(&self) {
        self.command(Command::Stop);
    }

    /// Sends a message.
    ///
    /// Never fails here. Without a transport, or if encoding or the
    /// transport rejects the message, an `Error` event carrying the
    /// message is emitted instead.
    pub fn send(&self, message: impl Into<Payload>) {
        self.command(Command::Send(message.into()));
    }

    fn command(&self, command: Command) {
        if let Err(rejected) = self.inner.command_tx.send(command) {
            warn!(name = %self.inner.name, command = ?rejected.0, "Connection loop has stopped");
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Connection {
    /// Returns the connection name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.read()
    }

    /// Returns the pinned binary type, or the one adopted from the first
    /// transport.
    #[inline]
    #[must_use]
    pub fn binary_type(&self) -> Option<BinaryType> {
        *self.inner.shared.binary_type.lock()
    }

    /// Pins the binary type by name and applies it to the live transport.
    ///
    /// Accepts `"blob"` and `"arraybuffer"`; anything else is ignored.
    pub fn set_binary_type(&self, binary_type: &str) {
        match binary_type.parse::<BinaryType>() {
            Ok(binary_type) => self.pin_binary_type(binary_type),
            Err(_) => trace!(name = %self.inner.name, binary_type, "Ignored unknown binary type"),
        }
    }

    /// Pins the binary type and applies it to the live transport.
    pub fn pin_binary_type(&self, binary_type: BinaryType) {
        *self.inner.shared.binary_type.lock() = Some(binary_type);
        self.command(Command::SetBinaryType(binary_type));
    }
}

// ============================================================================
// Events
// ============================================================================

impl Connection {
    /// Registers `handler` for events of `kind`.
    ///
    /// To act on the connection from inside `handler`, capture
    /// [`downgrade`](Self::downgrade) rather than a clone; a captured clone
    /// is never dropped and the connection outlives every user handle.
    ///
    /// ```no_run
    /// # use tenacious_ws::{Connection, EventKind};
    /// # fn reply(connection: &Connection) {
    /// let weak = connection.downgrade();
    /// connection.on(EventKind::Message, move |_| {
    ///     if let Some(connection) = weak.upgrade() {
    ///         connection.send("ack");
    ///     }
    /// });
    /// # }
    /// ```
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.inner.shared.events.on(kind, handler)
    }

    /// Removes a handler registered with [`on`](Self::on).
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.shared.events.off(id)
    }

    /// Returns a stream of every event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        self.inner.shared.events.subscribe()
    }

    /// Returns a handle that does not keep the connection alive.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the event surface.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &Arc<EventSurface> {
        &self.inner.shared.events
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.inner.name)
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns `ws-` followed by four random hex digits.
fn generate_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{NAME_PREFIX}{}", &id[..NAME_SUFFIX_LEN])
}

// ============================================================================
// Tests
// ============================================================================
