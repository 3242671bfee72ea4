//! Native host
//!
//! Runs each connection as a task on a tokio runtime using tokio-tungstenite.
//! `wss://` targets are wrapped in rustls with the webpki root store.
//! Ready state lives in an atomic shared with the bridge thread; outbound
//! frames go to a writer task over a channel; inbound frames and lifecycle
//! changes are posted back through the connection's [`EventSender`].

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::bridge::Payload;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::host::{
    EventSender, Host, ReadyState, Transport, TransportEvent, WS_CLOSED, WS_CLOSING, WS_CONNECTING,
    WS_OPEN,
};

/// Frames headed for the writer task.
#[derive(Debug)]
enum Outbound {
    Frame(Payload),
    Close,
}

/// A connection driven by the host's runtime.
pub struct NativeTransport {
    sender: mpsc::UnboundedSender<Outbound>,
    ready_state: Arc<AtomicU32>,
}

impl Transport for NativeTransport {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_raw(self.ready_state.load(Ordering::SeqCst))
    }

    fn send(&self, payload: &Payload) -> Result<()> {
        self.sender
            .send(Outbound::Frame(payload.clone()))
            .map_err(|e| BridgeError::Transport(format!("Failed to send: {}", e)))
    }

    fn close(&self) {
        let state = self.ready_state.load(Ordering::SeqCst);
        if state == WS_CLOSING || state == WS_CLOSED {
            return;
        }
        self.ready_state.store(WS_CLOSING, Ordering::SeqCst);
        let _ = self.sender.send(Outbound::Close);
    }
}

/// Opens connections on a tokio runtime it owns.
pub struct NativeHost {
    runtime: Runtime,
    config: BridgeConfig,
}

impl NativeHost {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            log::debug!("rustls crypto provider already installed");
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("ws-bridge")
            .build()?;
        Ok(Self { runtime, config })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Host for NativeHost {
    type Transport = NativeTransport;

    fn connect(&self, url: &str, events: EventSender) -> Result<NativeTransport> {
        let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
        let ready_state = Arc::new(AtomicU32::new(WS_CONNECTING));

        self.runtime.spawn(run_connection(
            url.to_string(),
            self.config.clone(),
            events,
            rx,
            ready_state.clone(),
        ));

        Ok(NativeTransport {
            sender: tx,
            ready_state,
        })
    }
}

/// Report a failure before the connection ever opened.
fn fail(events: &EventSender, ready_state: &AtomicU32) {
    ready_state.store(WS_CLOSED, Ordering::SeqCst);
    events.emit(TransportEvent::Error);
    events.emit(TransportEvent::Close);
}

async fn run_connection(
    url: String,
    config: BridgeConfig,
    events: EventSender,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    ready_state: Arc<AtomicU32>,
) {
    let id = events.handle();
    log::info!("[WebSocket {}] Connecting to {}", id, url);

    let parsed = match url::Url::parse(&url) {
        Ok(u) => u,
        Err(e) => {
            log::error!("[WebSocket {}] Invalid URL: {}", id, e);
            fail(&events, &ready_state);
            return;
        }
    };

    let host = parsed.host_str().unwrap_or("localhost");
    let port = parsed
        .port()
        .unwrap_or(if parsed.scheme() == "wss" { 443 } else { 80 });
    let addr = format!("{}:{}", host, port);

    log::info!("[WebSocket {}] Connecting TCP to {}", id, addr);

    let tcp_stream = match TcpStream::connect(&addr).await {
        Ok(stream) => {
            log::info!("[WebSocket {}] TCP connected", id);
            stream
        }
        Err(e) => {
            log::error!("[WebSocket {}] TCP connection failed: {}", id, e);
            fail(&events, &ready_state);
            return;
        }
    };

    let mut request = match url.as_str().into_client_request() {
        Ok(req) => req,
        Err(e) => {
            log::error!("[WebSocket {}] Failed to create request: {}", id, e);
            fail(&events, &ready_state);
            return;
        }
    };

    let headers = [
        ("Origin", config.origin.clone()),
        ("Sec-WebSocket-Protocol", config.protocol_header()),
    ];
    for (name, value) in headers {
        let Some(value) = value else { continue };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                request.headers_mut().insert(name, value);
            }
            Err(e) => log::warn!("[WebSocket {}] Skipping {} header: {}", id, name, e),
        }
    }

    log::info!("[WebSocket {}] Performing WebSocket handshake", id);

    // Negotiates TLS first when the scheme is wss.
    let mut ws_stream = match tokio_tungstenite::client_async_tls(request, tcp_stream).await {
        Ok((stream, response)) => {
            log::info!(
                "[WebSocket {}] Connected successfully (status: {})",
                id,
                response.status()
            );
            stream
        }
        Err(e) => {
            log::error!("[WebSocket {}] Handshake failed: {}", id, e);
            fail(&events, &ready_state);
            return;
        }
    };

    // Deleted while the handshake was in flight.
    if events.is_cancelled() {
        ready_state.store(WS_CLOSED, Ordering::SeqCst);
        let _ = ws_stream.close(None).await;
        log::info!("[WebSocket {}] Dropped after delete", id);
        return;
    }

    ready_state.store(WS_OPEN, Ordering::SeqCst);
    events.emit(TransportEvent::Open);

    let (mut write, mut read) = ws_stream.split();

    let ready_state_for_send = ready_state.clone();
    let send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let message = match outbound {
                Outbound::Frame(Payload::Text(text)) => Message::Text(text.into()),
                Outbound::Frame(Payload::Binary(bytes)) => Message::Binary(bytes.into()),
                Outbound::Close => {
                    log::info!("[WebSocket {}] Closing", id);
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            };
            if ready_state_for_send.load(Ordering::SeqCst) != WS_OPEN {
                break;
            }
            if let Err(e) = write.send(message).await {
                log::error!("[WebSocket {}] Send error: {}", id, e);
                break;
            }
        }
    });

    while let Some(msg_result) = read.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                log::debug!("[WebSocket {}] Received text ({} bytes)", id, text.len());
                events.emit(TransportEvent::Message(Payload::Text(text.to_string())));
            }
            Ok(Message::Binary(data)) => {
                log::debug!("[WebSocket {}] Received binary ({} bytes)", id, data.len());
                events.emit(TransportEvent::Message(Payload::Binary(data.to_vec())));
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Handled by tungstenite
            }
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((1000, String::new()));
                log::info!("[WebSocket {}] Received close: {} {}", id, code, reason);
                ready_state.store(WS_CLOSED, Ordering::SeqCst);
                events.emit(TransportEvent::Close);
                break;
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                log::error!("[WebSocket {}] Read error: {}", id, e);
                ready_state.store(WS_CLOSED, Ordering::SeqCst);
                events.emit(TransportEvent::Error);
                events.emit(TransportEvent::Close);
                break;
            }
        }
    }

    // Stream ended without a close frame.
    if ready_state.swap(WS_CLOSED, Ordering::SeqCst) != WS_CLOSED {
        events.emit(TransportEvent::Close);
    }

    send_task.abort();
    log::info!("[WebSocket {}] Connection ended", id);
}
