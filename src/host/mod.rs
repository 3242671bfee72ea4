//! Hosts
//!
//! A host is whatever actually owns sockets: the browser's `WebSocket`, or a
//! tokio-tungstenite client when running natively. The bridge only sees the
//! two traits below. Transports push events back through an [`EventSender`];
//! the bridge drains them on its own thread.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use crate::bridge::{Handle, Payload};
use crate::error::Result;

#[cfg(target_arch = "wasm32")]
pub mod browser;
#[cfg(not(target_arch = "wasm32"))]
pub mod native;

/// WebSocket ready states (matching browser API)
pub const WS_CONNECTING: u32 = 0;
pub const WS_OPEN: u32 = 1;
pub const WS_CLOSING: u32 = 2;
pub const WS_CLOSED: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    /// Anything outside the browser's numbering reads as closed.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            WS_CONNECTING => ReadyState::Connecting,
            WS_OPEN => ReadyState::Open,
            WS_CLOSING => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            ReadyState::Connecting => WS_CONNECTING,
            ReadyState::Open => WS_OPEN,
            ReadyState::Closing => WS_CLOSING,
            ReadyState::Closed => WS_CLOSED,
        }
    }
}

/// Something a transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Error,
    Message(Payload),
    Close,
}

/// A transport event tagged with the connection it belongs to.
#[derive(Debug)]
pub struct Envelope {
    pub handle: Handle,
    pub event: TransportEvent,
}

/// Set once the caller deletes a connection. Shared between the bridge's
/// record and everything that can still emit events for it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handed to a transport so it can report events for one connection.
///
/// Cheap to clone and `Send`, so it can move onto I/O threads.
#[derive(Clone)]
pub struct EventSender {
    handle: Handle,
    sender: mpsc::Sender<Envelope>,
    cancel: CancelToken,
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("handle", &self.handle)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl EventSender {
    pub(crate) fn new(handle: Handle, sender: mpsc::Sender<Envelope>, cancel: CancelToken) -> Self {
        Self {
            handle,
            sender,
            cancel,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue an event for the bridge.
    ///
    /// Returns `false` if the connection was deleted or the bridge is gone;
    /// the event is dropped in that case.
    pub fn emit(&self, event: TransportEvent) -> bool {
        if self.cancel.is_cancelled() {
            log::trace!("[WebSocket {}] Dropping {:?} after delete", self.handle, event);
            return false;
        }
        self.sender
            .send(Envelope {
                handle: self.handle,
                event,
            })
            .is_ok()
    }
}

/// One live connection as the host sees it.
pub trait Transport {
    fn ready_state(&self) -> ReadyState;

    /// Put one frame on the wire. Only called while [`ReadyState::Open`].
    fn send(&self, payload: &Payload) -> Result<()>;

    /// Ask the connection to close. Must not call back synchronously.
    fn close(&self);
}

/// Opens transports.
pub trait Host {
    type Transport: Transport;

    /// Whether this environment can open WebSockets at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Start connecting to `url`. Every event for the new connection goes
    /// through `events`; none may be delivered before this returns.
    fn connect(&self, url: &str, events: EventSender) -> Result<Self::Transport>;

    /// Ask for a dispatch pass soon, without running one now. Hosts whose
    /// caller drives dispatch can ignore this.
    fn schedule_dispatch(&self) {}
}
