//! WebSocket transport backed by tokio-tungstenite.
//!
//! Each transport spawns one tokio task that performs the handshake and
//! then runs the socket I/O loop:
//!
//! - Incoming frames are reported through the [`TransportListener`]
//! - Outgoing frames and close requests arrive over a command channel
//! - A stream that ends without a close frame is reported as code 1006

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame as WsCloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};
use url::Url;

use crate::connection::BinaryType;
use crate::error::{Error, Result};
use crate::pipeline::Payload;

use super::{
    CLOSE_NO_STATUS, CLOSE_NORMAL, CloseFrame, PlatformOptions, Transport, TransportFactory,
    TransportListener, TransportRequest,
};

// ============================================================================
// Constants
// ============================================================================

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSING: u8 = 2;
const CLOSED: u8 = 3;

// ============================================================================
// Types
// ============================================================================

/// Commands for the socket task.
enum SocketCommand {
    /// Write a frame.
    Send(Message),
    /// Send a close frame and shut down.
    Close(WsCloseFrame),
}

// ============================================================================
// TungsteniteFactory
// ============================================================================

/// Default [`TransportFactory`] for `ws://` and `wss://` endpoints.
///
/// `wss://` requires the `native-tls` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteFactory;

impl TransportFactory for TungsteniteFactory {
    fn create(
        &self,
        request: &TransportRequest<'_>,
        listener: TransportListener,
    ) -> Result<Box<dyn Transport>> {
        let client_request = build_request(request.url, request.protocols)?;
        let config = socket_config(request.platform);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let ready_state = Arc::new(AtomicU8::new(CONNECTING));

        debug!(
            transport_id = %listener.id(),
            url = %request.url,
            "Opening WebSocket"
        );

        let task = tokio::spawn(run_socket(
            client_request,
            config,
            request.platform.disable_nagle,
            request.platform.connect_timeout,
            command_rx,
            listener,
            Arc::clone(&ready_state),
        ));

        Ok(Box::new(TungsteniteTransport {
            command_tx,
            ready_state,
            binary_type: BinaryType::Blob,
            task,
        }))
    }
}

// ============================================================================
// TungsteniteTransport
// ============================================================================

/// Handle to a socket task spawned by [`TungsteniteFactory`].
///
/// The binary type is informational for this transport: inbound binary
/// frames are always delivered as [`Payload::Binary`] bytes, whichever
/// [`BinaryType`] is set.
pub struct TungsteniteTransport {
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    ready_state: Arc<AtomicU8>,
    binary_type: BinaryType,
    task: JoinHandle<()>,
}

impl TungsteniteTransport {
    /// Returns `true` once the handshake completed and until close starts.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.ready_state.load(Ordering::Acquire) == OPEN
    }
}

impl Transport for TungsteniteTransport {
    fn send(&mut self, payload: Payload) -> Result<()> {
        if !self.is_open() {
            return Err(Error::transport("WebSocket is not open"));
        }

        let message = match payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(bytes) => Message::Binary(bytes.into()),
            Payload::Json(_) => {
                return Err(Error::codec(
                    "structured payload reached the socket without a serializer",
                ));
            }
        };

        self.command_tx
            .send(SocketCommand::Send(message))
            .map_err(|_| Error::transport("WebSocket task has stopped"))
    }

    fn close(&mut self, code: Option<u16>, reason: Option<&str>) {
        let previous = self.ready_state.swap(CLOSING, Ordering::AcqRel);
        match previous {
            CONNECTING => {
                self.task.abort();
                self.ready_state.store(CLOSED, Ordering::Release);
                trace!("Aborted pending handshake");
            }
            OPEN => {
                let frame = WsCloseFrame {
                    code: CloseCode::from(code.unwrap_or(CLOSE_NORMAL)),
                    reason: reason.unwrap_or_default().to_owned().into(),
                };
                let _ = self.command_tx.send(SocketCommand::Close(frame));
            }
            _ => {
                self.ready_state.store(previous, Ordering::Release);
            }
        }
    }

    fn binary_type(&self) -> BinaryType {
        self.binary_type
    }

    /// Records the binary type. Inbound frames are unaffected.
    fn set_binary_type(&mut self, binary_type: BinaryType) {
        self.binary_type = binary_type;
    }
}

// ============================================================================
// Socket Task
// ============================================================================

async fn run_socket(
    request: Request,
    config: WebSocketConfig,
    disable_nagle: bool,
    connect_timeout: Duration,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    listener: TransportListener,
    ready_state: Arc<AtomicU8>,
) {
    let connect = connect_async_with_config(request, Some(config), disable_nagle);
    let ws_stream = match timeout(connect_timeout, connect).await {
        Ok(Ok((stream, response))) => {
            debug!(
                transport_id = %listener.id(),
                status = %response.status(),
                "WebSocket handshake completed"
            );
            stream
        }
        Ok(Err(e)) => {
            ready_state.store(CLOSED, Ordering::Release);
            listener.on_error(e.to_string());
            listener.on_close(CloseFrame::abnormal());
            return;
        }
        Err(_) => {
            ready_state.store(CLOSED, Ordering::Release);
            listener.on_error(format!(
                "handshake timed out after {}ms",
                connect_timeout.as_millis()
            ));
            listener.on_close(CloseFrame::abnormal());
            return;
        }
    };

    if ready_state
        .compare_exchange(CONNECTING, OPEN, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }
    listener.on_open();

    let (mut ws_write, mut ws_read) = ws_stream.split();

    let close_frame = loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        listener.on_message(Payload::Text(text.as_str().to_owned()));
                    }

                    Some(Ok(Message::Binary(bytes))) => {
                        listener.on_message(Payload::Binary(bytes.to_vec()));
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(transport_id = %listener.id(), ?frame, "WebSocket closed by remote");
                        break frame.map_or_else(
                            || CloseFrame::new(CLOSE_NO_STATUS, ""),
                            |f| CloseFrame::new(u16::from(f.code), f.reason.as_str()),
                        );
                    }

                    Some(Err(e)) => {
                        warn!(transport_id = %listener.id(), error = %e, "WebSocket error");
                        listener.on_error(e.to_string());
                        break CloseFrame::abnormal();
                    }

                    None => {
                        debug!(transport_id = %listener.id(), "WebSocket stream ended");
                        break CloseFrame::abnormal();
                    }

                    // Ping, Pong, raw frames
                    _ => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Send(message)) => {
                        if let Err(e) = ws_write.send(message).await {
                            warn!(transport_id = %listener.id(), error = %e, "WebSocket write failed");
                            listener.on_error(e.to_string());
                            break CloseFrame::abnormal();
                        }
                        trace!(transport_id = %listener.id(), "Frame sent");
                    }

                    Some(SocketCommand::Close(frame)) => {
                        let code = u16::from(frame.code);
                        let reason = frame.reason.as_str().to_owned();
                        if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
                            trace!(error = %e, "Close frame not delivered");
                        }
                        debug!(transport_id = %listener.id(), code, "WebSocket closed locally");
                        break CloseFrame::new(code, reason);
                    }

                    None => {
                        debug!(transport_id = %listener.id(), "Transport handle dropped");
                        break CloseFrame::new(CLOSE_NORMAL, "");
                    }
                }
            }
        }
    };

    let _ = ws_write.close().await;
    ready_state.store(CLOSED, Ordering::Release);
    listener.on_close(close_frame);
}

// ============================================================================
// Helpers
// ============================================================================

fn build_request(url: &Url, protocols: &[String]) -> Result<Request> {
    let mut request = url.as_str().into_client_request()?;

    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|e| Error::config(format!("invalid subprotocol list: {e}")))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(request)
}

fn socket_config(platform: &PlatformOptions) -> WebSocketConfig {
    let mut config =
        WebSocketConfig::default().accept_unmasked_frames(platform.accept_unmasked_frames);

    if let Some(size) = platform.max_message_size {
        config = config.max_message_size(Some(size));
    }
    if let Some(size) = platform.max_frame_size {
        config = config.max_frame_size(Some(size));
    }

    config
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use tokio::net::TcpListener;

    use crate::identifiers::TransportId;
    use crate::transport::{CLOSE_ABNORMAL, TransportEvent, TransportSignal};

    const WAIT: Duration = Duration::from_secs(5);

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(_) | Message::Binary(_) => {
                        if ws.send(message).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        addr
    }

    fn open(
        url: &str,
    ) -> (
        Box<dyn Transport>,
        mpsc::UnboundedReceiver<TransportSignal>,
    ) {
        let url = Url::parse(url).unwrap();
        let platform = PlatformOptions::default();
        let request = TransportRequest {
            url: &url,
            protocols: &[],
            platform: &platform,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = TransportListener::attach(TransportId::next(), tx);
        let transport = TungsteniteFactory.create(&request, listener).unwrap();
        (transport, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportSignal>) -> TransportEvent {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap().event
    }

    #[test]
    fn test_build_request_sets_protocol_header() {
        let url = Url::parse("ws://localhost:9000/feed").unwrap();
        let request = build_request(&url, &["chat".into(), "json".into()]).unwrap();
        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "chat, json"
        );
    }

    #[test]
    fn test_build_request_without_protocols() {
        let url = Url::parse("ws://localhost:9000").unwrap();
        let request = build_request(&url, &[]).unwrap();
        assert!(request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let addr = echo_server().await;
        let (mut transport, mut rx) = open(&format!("ws://{addr}"));

        assert_eq!(next_event(&mut rx).await, TransportEvent::Open);

        transport.send(Payload::from("ping")).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message(Payload::from("ping"))
        );

        transport.send(Payload::Binary(vec![1, 2, 3])).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message(Payload::Binary(vec![1, 2, 3]))
        );

        transport.close(Some(1000), Some("bye"));
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Close(CloseFrame::new(1000, "bye"))
        );
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let addr = echo_server().await;
        let (mut transport, _rx) = open(&format!("ws://{addr}"));
        let err = transport.send(Payload::from("early")).unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        transport.close(None, None);
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (_transport, mut rx) = open(&format!("ws://{addr}"));
        assert!(matches!(next_event(&mut rx).await, TransportEvent::Error(_)));
        match next_event(&mut rx).await {
            TransportEvent::Close(frame) => assert_eq!(frame.code, CLOSE_ABNORMAL),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_binary_type_defaults_to_blob() {
        let (mut transport, _rx) = open("ws://127.0.0.1:9");
        assert_eq!(transport.binary_type(), BinaryType::Blob);
        transport.set_binary_type(BinaryType::ArrayBuffer);
        assert_eq!(transport.binary_type(), BinaryType::ArrayBuffer);
        transport.close(None, None);
    }

    #[tokio::test]
    async fn test_binary_type_does_not_change_inbound_frames() {
        let addr = echo_server().await;
        let (mut transport, mut rx) = open(&format!("ws://{addr}"));
        assert_eq!(next_event(&mut rx).await, TransportEvent::Open);

        transport.set_binary_type(BinaryType::ArrayBuffer);
        transport.send(Payload::Binary(vec![7, 8])).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message(Payload::Binary(vec![7, 8]))
        );
        transport.close(None, None);
    }
}
