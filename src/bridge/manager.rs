//! The bridge proper.
//!
//! Owns the handle registry and turns transport events into callback
//! invocations. Everything here runs on one thread: transports only queue
//! [`Envelope`]s, and callbacks run inside [`Bridge::dispatch_pending`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::Duration;

use crate::bridge::callback::{Callbacks, Slot, slot};
use crate::bridge::{
    ErrorCallback, Frame, GENERIC_ERROR_CODE, Handle, HandleRegistry, MAX_HANDLE, MessageCallback,
    OpenCallback, Payload, ScratchBuffer, UserToken,
};
use crate::error::{BridgeError, Result};
use crate::host::{CancelToken, Envelope, EventSender, Host, ReadyState, Transport, TransportEvent};

/// Bridge-owned state for one handle.
struct ConnectionRecord<T> {
    url: String,
    transport: T,
    cancel: CancelToken,
    user_token: UserToken,
    callbacks: Callbacks,
    /// The transport's open event has been dispatched.
    open_seen: bool,
    /// End-of-stream has been dispatched; later close events are ignored.
    close_seen: bool,
}

impl<T> ConnectionRecord<T> {
    fn new(url: &str, transport: T, cancel: CancelToken) -> Self {
        Self {
            url: url.to_string(),
            transport,
            cancel,
            user_token: UserToken::NONE,
            callbacks: Callbacks::default(),
            open_seen: false,
            close_seen: false,
        }
    }
}

/// An open notification owed to a callback registered after the fact.
struct DeferredOpen {
    handle: Handle,
    callback: Slot<OpenCallback>,
}

/// A callback resolved under the registry borrow, invoked after releasing it.
enum Delivery {
    Open(Slot<OpenCallback>),
    Error(Slot<ErrorCallback>),
    Message(Slot<MessageCallback>, Payload),
    Closed(Slot<MessageCallback>),
}

/// Clears the dispatching flag even if a callback unwinds.
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Maps handles to live connections on a [`Host`] and dispatches their events.
pub struct Bridge<H: Host> {
    host: H,
    registry: RefCell<HandleRegistry<ConnectionRecord<H::Transport>>>,
    sender: mpsc::Sender<Envelope>,
    receiver: mpsc::Receiver<Envelope>,
    deferred: RefCell<VecDeque<DeferredOpen>>,
    dispatching: Cell<bool>,
}

impl<H: Host> Bridge<H> {
    pub fn new(host: H) -> Self {
        Self::with_handle_limit(host, MAX_HANDLE)
    }

    /// Bridge that issues at most `limit` handles over its lifetime.
    pub fn with_handle_limit(host: H, limit: u32) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            host,
            registry: RefCell::new(HandleRegistry::with_limit(limit)),
            sender,
            receiver,
            deferred: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Open a connection to `url` and return its handle.
    ///
    /// Fails with [`BridgeError::Unsupported`] when the host has no WebSocket
    /// support, or with whatever the host raises synchronously. Problems the
    /// host only finds later arrive through the error callback.
    pub fn create(&self, url: &str) -> Result<Handle> {
        if !self.host.is_supported() {
            log::warn!("WebSockets are not supported here, not connecting to {}", url);
            return Err(BridgeError::Unsupported);
        }

        let handle = self.registry.borrow_mut().allocate_with(|handle| {
            let cancel = CancelToken::new();
            let events = EventSender::new(handle, self.sender.clone(), cancel.clone());
            let transport = self.host.connect(url, events)?;
            Ok::<_, BridgeError>(ConnectionRecord::new(url, transport, cancel))
        })?;

        log::info!("[WebSocket {}] Created for {}", handle, url);
        Ok(handle)
    }

    /// Close and forget a connection.
    ///
    /// Once this returns no callback registered for `handle` runs again, even
    /// for events the transport already queued. Returns `false` for an
    /// unknown handle.
    pub fn delete(&self, handle: Handle) -> bool {
        let record = {
            let mut registry = self.registry.borrow_mut();
            let Some(record) = registry.lookup(handle) else {
                log::debug!("[WebSocket {}] Delete of unknown handle ignored", handle);
                return false;
            };
            record.transport.close();
            record.cancel.cancel();
            registry.remove(handle)
        };
        self.deferred.borrow_mut().retain(|d| d.handle != handle);

        // Transport teardown happens outside the registry borrow.
        drop(record);
        log::info!("[WebSocket {}] Deleted", handle);
        true
    }

    /// Attach an opaque token echoed on every later callback for `handle`.
    pub fn set_user_token(&self, handle: Handle, token: UserToken) {
        match self.registry.borrow_mut().lookup_mut(handle) {
            Some(record) => record.user_token = token,
            None => log::debug!("[WebSocket {}] set_user_token on unknown handle", handle),
        }
    }

    /// Register the open callback, replacing any previous one.
    ///
    /// If the open event was already dispatched and the connection is still
    /// open, one notification is queued for the next dispatch pass instead of
    /// being lost. A connection that has since closed gets none.
    pub fn set_open_callback(&self, handle: Handle, callback: impl FnMut(UserToken) + 'static) {
        let callback: Box<OpenCallback> = Box::new(callback);
        let callback = slot(callback);

        let already_open = {
            let mut registry = self.registry.borrow_mut();
            let Some(record) = registry.lookup_mut(handle) else {
                log::debug!("[WebSocket {}] set_open_callback on unknown handle", handle);
                return;
            };
            record.callbacks.open = Some(callback.clone());
            record.open_seen
                && !record.close_seen
                && record.transport.ready_state() == ReadyState::Open
        };

        if already_open {
            log::debug!("[WebSocket {}] Already open, deferring open notification", handle);
            self.deferred
                .borrow_mut()
                .push_back(DeferredOpen { handle, callback });
            self.host.schedule_dispatch();
        }
    }

    /// Register the error callback, replacing any previous one.
    pub fn set_error_callback(&self, handle: Handle, callback: impl FnMut(i32, UserToken) + 'static) {
        let callback: Box<ErrorCallback> = Box::new(callback);
        match self.registry.borrow_mut().lookup_mut(handle) {
            Some(record) => record.callbacks.error = Some(slot(callback)),
            None => log::debug!("[WebSocket {}] set_error_callback on unknown handle", handle),
        }
    }

    /// Register the message callback, replacing any previous one.
    ///
    /// It sees every inbound frame, then [`Frame::Closed`] once when the
    /// connection ends.
    pub fn set_message_callback(
        &self,
        handle: Handle,
        callback: impl FnMut(Frame<'_>, UserToken) + 'static,
    ) {
        let callback: Box<MessageCallback> = Box::new(callback);
        match self.registry.borrow_mut().lookup_mut(handle) {
            Some(record) => record.callbacks.message = Some(slot(callback)),
            None => log::debug!("[WebSocket {}] set_message_callback on unknown handle", handle),
        }
    }

    /// Send one frame. Returns the number of bytes put on the wire.
    pub fn send(&self, handle: Handle, payload: impl Into<Payload>) -> Result<usize> {
        let payload = payload.into();
        let registry = self.registry.borrow();
        let record = registry
            .lookup(handle)
            .ok_or(BridgeError::UnknownHandle(handle))?;

        if record.transport.ready_state() != ReadyState::Open {
            return Err(BridgeError::NotOpen(handle));
        }

        record.transport.send(&payload)?;
        log::debug!(
            "[WebSocket {}] Sent {} ({} bytes)",
            handle,
            if payload.is_text() { "text" } else { "binary" },
            payload.encoded_len()
        );
        Ok(payload.encoded_len())
    }

    /// Ready state of the connection; unknown handles read as closed.
    pub fn ready_state(&self, handle: Handle) -> ReadyState {
        self.registry
            .borrow()
            .lookup(handle)
            .map(|record| record.transport.ready_state())
            .unwrap_or(ReadyState::Closed)
    }

    /// The target a connection was created with.
    pub fn url(&self, handle: Handle) -> Option<String> {
        self.registry
            .borrow()
            .lookup(handle)
            .map(|record| record.url.clone())
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.registry.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().is_empty()
    }

    /// Run every callback that is due right now.
    ///
    /// Returns how many callbacks ran. Events that arrive while this is
    /// running wait for the next call. Calling it from inside a callback does
    /// nothing.
    pub fn dispatch_pending(&self) -> usize {
        self.run_pass(None)
    }

    /// Wait up to `timeout` for something to dispatch, then dispatch
    /// everything that is due.
    pub fn dispatch_timeout(&self, timeout: Duration) -> usize {
        if self.dispatching.get() {
            return 0;
        }
        if !self.deferred.borrow().is_empty() {
            return self.run_pass(None);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(first) => self.run_pass(Some(first)),
            Err(_) => 0,
        }
    }

    fn run_pass(&self, first: Option<Envelope>) -> usize {
        if self.dispatching.replace(true) {
            return 0;
        }
        let _guard = DispatchGuard(&self.dispatching);

        let mut invoked = self.drain_deferred();
        let batch: Vec<Envelope> = first.into_iter().chain(self.receiver.try_iter()).collect();
        for envelope in batch {
            invoked += self.dispatch(envelope);
            // Opens deferred by a callback go out before the next event.
            invoked += self.drain_deferred();
        }
        invoked
    }

    fn drain_deferred(&self) -> usize {
        let mut invoked = 0;
        loop {
            let next = self.deferred.borrow_mut().pop_front();
            let Some(DeferredOpen { handle, callback }) = next else {
                break;
            };

            let token = match self.registry.borrow().lookup(handle) {
                Some(record) if !record.cancel.is_cancelled() => record.user_token,
                _ => continue,
            };
            log::debug!("[WebSocket {}] Delivering deferred open", handle);
            (&mut *callback.borrow_mut())(token);
            invoked += 1;
        }
        invoked
    }

    fn dispatch(&self, Envelope { handle, event }: Envelope) -> usize {
        let (token, delivery) = {
            let mut registry = self.registry.borrow_mut();
            let Some(record) = registry.lookup_mut(handle) else {
                log::trace!("[WebSocket {}] Dropping {:?} for deleted handle", handle, event);
                return 0;
            };
            if record.cancel.is_cancelled() {
                return 0;
            }

            let callbacks = &record.callbacks;
            let delivery = match event {
                TransportEvent::Open => {
                    record.open_seen = true;
                    callbacks.open.clone().map(Delivery::Open)
                }
                TransportEvent::Error => callbacks.error.clone().map(Delivery::Error),
                TransportEvent::Message(payload) => callbacks
                    .message
                    .clone()
                    .map(|callback| Delivery::Message(callback, payload)),
                TransportEvent::Close if record.close_seen => None,
                TransportEvent::Close => {
                    record.close_seen = true;
                    callbacks.message.clone().map(Delivery::Closed)
                }
            };
            (record.user_token, delivery)
        };

        let Some(delivery) = delivery else {
            return 0;
        };

        match delivery {
            Delivery::Open(callback) => {
                log::info!("[WebSocket {}] Dispatching open", handle);
                (&mut *callback.borrow_mut())(token);
            }
            Delivery::Error(callback) => {
                log::info!("[WebSocket {}] Dispatching error", handle);
                (&mut *callback.borrow_mut())(GENERIC_ERROR_CODE, token);
            }
            Delivery::Message(callback, payload) => {
                let scratch = match &payload {
                    Payload::Text(text) => ScratchBuffer::for_text(text),
                    Payload::Binary(bytes) => ScratchBuffer::for_binary(bytes),
                };
                log::debug!(
                    "[WebSocket {}] Dispatching message ({} bytes)",
                    handle,
                    scratch.as_bytes().len()
                );
                (&mut *callback.borrow_mut())(Frame::from_scratch(&scratch), token);
            }
            Delivery::Closed(callback) => {
                log::info!("[WebSocket {}] Dispatching close", handle);
                (&mut *callback.borrow_mut())(Frame::Closed, token);
            }
        }
        1
    }
}

impl<H: Host> Drop for Bridge<H> {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        for handle in registry.handles() {
            if let Some(record) = registry.remove(handle) {
                record.transport.close();
                record.cancel.cancel();
            }
        }
    }
}
