//! Loopback WebSocket peers for the native host tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Text that makes the echo peer close the connection instead of echoing.
pub const CLOSE_REQUEST: &str = "close-please";

/// Start an echo server on its own thread and return its `ws://` url.
///
/// Text and binary frames are echoed back unchanged; [`CLOSE_REQUEST`] makes
/// the server start the closing handshake.
pub fn spawn_echo_server() -> String {
    let (tx, rx) = mpsc::channel::<SocketAddr>();

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to build echo server runtime");

        rt.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind echo server");
            tx.send(listener.local_addr().expect("listener address"))
                .expect("test went away");

            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    while let Some(Ok(msg)) = ws.next().await {
                        match msg {
                            Message::Text(ref text) if text.as_str() == CLOSE_REQUEST => {
                                let _ = ws.close(None).await;
                                break;
                            }
                            Message::Text(_) | Message::Binary(_) => {
                                if ws.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                });
            }
        });
    });

    let addr = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("echo server did not start");
    format!("ws://{}", addr)
}

/// A `ws://` url whose TCP connect succeeds but whose handshake never
/// completes. Keep the returned listener alive for as long as it matters.
pub fn silent_server() -> (std::net::TcpListener, String) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let url = format!("ws://{}", listener.local_addr().expect("listener address"));
    (listener, url)
}

/// A `ws://` url nothing is listening on.
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().expect("listener address");
    drop(listener);
    format!("ws://{}", addr)
}

/// Call `pump` until `done` holds or five seconds pass.
pub fn wait_until(mut pump: impl FnMut(), done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        pump();
    }
    done()
}
