//! Echo round trip with a forced reconnect.
//!
//! Demonstrates:
//! - Building a connection with the default JSON codec
//! - Observing state, message and error events
//! - Automatic reconnection after the server drops the socket
//!
//! Usage:
//!   cargo run --example echo
//!   cargo run --example echo -- --debug
//!   cargo run --example echo -- ws://127.0.0.1:9001

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use serde_json::json;
use tenacious_ws::{Connection, ConnectionEvent, ConnectionState, EventKind, StrategyOptions};
use tokio::time::timeout;

// ============================================================================
// Constants
// ============================================================================

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    common::init_logging(args.debug);

    let (url, server) = match args.url {
        Some(url) => (url, None),
        None => {
            let (addr, task) = common::spawn_echo_server().await?;
            (format!("ws://{addr}"), Some(task))
        }
    };

    let connection = Connection::builder()
        .url(&url)
        .name("echo-demo")
        .strategy_options(StrategyOptions::default().with_initial_delay(Duration::from_millis(200)))
        .fail_after(5)
        .build()?;

    connection.on(EventKind::State, |event| {
        if let ConnectionEvent::State(state) = event {
            println!("[state] {state}");
        }
    });
    connection.on(EventKind::Error, |event| {
        if let Some(err) = event.as_error() {
            println!("[error] {err}");
        }
    });

    let mut events = connection.subscribe();
    connection.start();

    wait_for(&mut events, |e| matches!(e, ConnectionEvent::Connect)).await?;
    println!("[connect] {} -> {}", connection.name(), connection.url());

    connection.send(json!({ "greeting": "hello", "n": 1 }));
    let echoed = wait_for(&mut events, |e| matches!(e, ConnectionEvent::Message(_))).await?;
    if let ConnectionEvent::Message(payload) = echoed {
        println!("[message] {payload:?}");
    }

    if let Some(server) = server {
        println!("Stopping echo server to force a reconnect...");
        server.abort();
        connection.send(json!({ "n": 2 }));
        wait_for(&mut events, |e| {
            matches!(e, ConnectionEvent::State(ConnectionState::Waiting))
        })
        .await?;
        println!("Waiting for backoff; no server is listening so retries will fail");
    }

    connection.stop();
    wait_for(&mut events, |e| matches!(e, ConnectionEvent::Disconnect)).await?;
    println!("[disconnect] final state: {}", connection.state());

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

async fn wait_for<F>(
    events: &mut tenacious_ws::EventStream,
    done: F,
) -> anyhow::Result<ConnectionEvent>
where
    F: Fn(&ConnectionEvent) -> bool,
{
    loop {
        let event = timeout(EVENT_TIMEOUT, events.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("event stream closed"))?;
        if done(&event) {
            return Ok(event);
        }
    }
}
