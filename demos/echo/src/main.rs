//! Connects to a WebSocket echo server, sends one text and one binary frame,
//! prints whatever comes back, then deletes the connection.
//!
//! Usage: `echo [ws://host:port/path]`

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;
use ws_bridge::{Bridge, BridgeConfig, NativeHost, Payload, ReadyState};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001".to_string());

    let bridge = Bridge::new(NativeHost::new(BridgeConfig::from_env())?);
    let ws = bridge.create(&url)?;

    let replies = Rc::new(Cell::new(0u32));
    let done = Rc::new(Cell::new(false));

    bridge.set_open_callback(ws, |_| println!("open"));
    bridge.set_error_callback(ws, |code, _| println!("error (code {})", code));

    let (seen, finished) = (replies.clone(), done.clone());
    bridge.set_message_callback(ws, move |frame, _| {
        if frame.is_closed() {
            println!("closed");
            finished.set(true);
            return;
        }
        match frame.as_text() {
            Some(text) => println!("text: {}", text),
            None => println!("binary: {:02x?}", frame.as_bytes()),
        }
        seen.set(seen.get() + 1);
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut sent = false;
    while Instant::now() < deadline && !done.get() && replies.get() < 2 {
        bridge.dispatch_timeout(Duration::from_millis(50));

        if !sent && bridge.ready_state(ws) == ReadyState::Open {
            bridge.send(ws, Payload::from("hello"))?;
            bridge.send(ws, Payload::Binary(vec![0x00, 0x7F, 0xFF]))?;
            sent = true;
        }
    }

    if replies.get() < 2 && !done.get() {
        log::warn!("Gave up waiting for {}", url);
    }
    bridge.delete(ws);
    Ok(())
}
