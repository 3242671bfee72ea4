//! Browser host
//!
//! Wraps `web_sys::WebSocket`. The socket's event handlers queue events and
//! immediately run a dispatch pass, so callbacks fire on the page's own event
//! loop, one browser task per event.

use std::rc::Rc;

use js_sys::{ArrayBuffer, Uint8Array};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{BinaryType, CloseEvent, Event, MessageEvent, WebSocket};

use crate::bridge::Payload;
use crate::error::{BridgeError, Result};
use crate::host::{EventSender, Host, ReadyState, Transport, TransportEvent};

/// Runs a dispatch pass on the bridge that owns this host.
pub type Dispatcher = Rc<dyn Fn()>;

/// A browser socket plus the handlers keeping it wired to the bridge.
pub struct BrowserTransport {
    socket: WebSocket,
    _on_open: Closure<dyn FnMut(Event)>,
    _on_error: Closure<dyn FnMut(Event)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
}

impl Transport for BrowserTransport {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_raw(u32::from(self.socket.ready_state()))
    }

    fn send(&self, payload: &Payload) -> Result<()> {
        let sent = match payload {
            Payload::Text(text) => self.socket.send_with_str(text),
            Payload::Binary(bytes) => self.socket.send_with_u8_array(bytes),
        };
        sent.map_err(|e| BridgeError::Transport(format!("{:?}", e)))
    }

    fn close(&self) {
        if let Err(e) = self.socket.close() {
            log::warn!("Failed to close WebSocket: {:?}", e);
        }
    }
}

impl Drop for BrowserTransport {
    fn drop(&mut self) {
        // The closures die with us; detach them so the browser never calls a
        // freed handler.
        self.socket.set_onopen(None);
        self.socket.set_onerror(None);
        self.socket.set_onmessage(None);
        self.socket.set_onclose(None);
    }
}

/// Opens sockets through the page's `WebSocket` constructor.
pub struct BrowserHost {
    dispatcher: Dispatcher,
}

impl BrowserHost {
    /// `dispatcher` must run a dispatch pass on the bridge this host is
    /// installed in.
    pub fn new(dispatcher: impl Fn() + 'static) -> Self {
        Self {
            dispatcher: Rc::new(dispatcher),
        }
    }

    /// Handler that queues whatever `translate` makes of the browser event,
    /// then pumps the bridge.
    fn handler<E: 'static>(
        &self,
        events: &EventSender,
        translate: impl Fn(&E) -> Option<TransportEvent> + 'static,
    ) -> Closure<dyn FnMut(E)>
    where
        E: wasm_bindgen::convert::FromWasmAbi,
    {
        let events = events.clone();
        let dispatcher = self.dispatcher.clone();
        Closure::wrap(Box::new(move |event: E| {
            if events.is_cancelled() {
                return;
            }
            if let Some(event) = translate(&event) {
                events.emit(event);
                dispatcher();
            }
        }) as Box<dyn FnMut(E)>)
    }
}

fn translate_message(event: &MessageEvent) -> Option<TransportEvent> {
    let data = event.data();
    if let Some(text) = data.as_string() {
        return Some(TransportEvent::Message(Payload::Text(text)));
    }
    match data.dyn_into::<ArrayBuffer>() {
        Ok(buffer) => Some(TransportEvent::Message(Payload::Binary(
            Uint8Array::new(&buffer).to_vec(),
        ))),
        Err(other) => {
            log::warn!("Ignoring message with unexpected data: {:?}", other);
            None
        }
    }
}

impl Host for BrowserHost {
    type Transport = BrowserTransport;

    fn is_supported(&self) -> bool {
        js_sys::Reflect::has(&js_sys::global(), &JsValue::from_str("WebSocket")).unwrap_or(false)
    }

    fn connect(&self, url: &str, events: EventSender) -> Result<BrowserTransport> {
        let socket = WebSocket::new(url)
            .map_err(|e| BridgeError::InvalidUrl(format!("{}: {:?}", url, e)))?;
        socket.set_binary_type(BinaryType::Arraybuffer);

        let on_open = self.handler(&events, |_: &Event| Some(TransportEvent::Open));
        let on_error = self.handler(&events, |_: &Event| Some(TransportEvent::Error));
        let on_message = self.handler(&events, translate_message);
        let on_close = self.handler(&events, |_: &CloseEvent| Some(TransportEvent::Close));

        socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        socket.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        Ok(BrowserTransport {
            socket,
            _on_open: on_open,
            _on_error: on_error,
            _on_message: on_message,
            _on_close: on_close,
        })
    }

    fn schedule_dispatch(&self) {
        let dispatcher = self.dispatcher.clone();
        wasm_bindgen_futures::spawn_local(async move { dispatcher() });
    }
}
