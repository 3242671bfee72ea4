//! # ws_bridge
//!
//! Lets code that cannot touch browser objects (a wasm module's native side,
//! or any C caller) drive WebSockets through integer handles and
//! function-pointer callbacks.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use ws_bridge::{Bridge, BridgeConfig, NativeHost, Payload};
//!
//! let bridge = Bridge::new(NativeHost::new(BridgeConfig::default())?);
//! let ws = bridge.create("ws://127.0.0.1:9001")?;
//!
//! bridge.set_open_callback(ws, |_token| println!("open"));
//! bridge.set_message_callback(ws, |frame, _token| {
//!     if frame.is_closed() {
//!         println!("closed");
//!     } else if let Some(text) = frame.as_text() {
//!         println!("text: {}", text);
//!     } else {
//!         println!("binary: {:?}", frame.as_bytes());
//!     }
//! });
//!
//! while bridge.ready_state(ws) != ws_bridge::ReadyState::Open {
//!     bridge.dispatch_timeout(Duration::from_millis(50));
//! }
//! bridge.send(ws, Payload::from("hello"))?;
//! bridge.dispatch_timeout(Duration::from_secs(1));
//! bridge.delete(ws);
//! # Ok::<(), ws_bridge::BridgeError>(())
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod ffi;
pub mod host;

pub use bridge::{
    Bridge, Frame, GENERIC_ERROR_CODE, Handle, HandleRegistry, HandleSpaceExhausted, MAX_HANDLE,
    Payload, ScratchBuffer, TEXT_LENGTH, UserToken,
};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use host::{CancelToken, EventSender, Host, ReadyState, Transport, TransportEvent};

#[cfg(target_arch = "wasm32")]
pub use host::browser::{BrowserHost, BrowserTransport};
#[cfg(not(target_arch = "wasm32"))]
pub use host::native::{NativeHost, NativeTransport};
