//! C ABI
//!
//! The exported functions native callers link against. They run on a
//! thread-local default [`Bridge`], created on first use, and speak the
//! sentinel convention: handle `0` for a failed create, `-1` for a failed
//! send, negative lengths for NUL-terminated text.
//!
//! On `wasm32` the default bridge sits on the browser host and pumps itself
//! from socket events. Natively it sits on a [`NativeHost`] configured from
//! [`CONFIG_ENV_VAR`](crate::config::CONFIG_ENV_VAR), and the caller pumps it
//! with [`ws_dispatch_pending`].

use std::ffi::{CStr, c_char, c_int, c_void};

use once_cell::unsync::Lazy;

use crate::bridge::{Bridge, Frame, Handle, Payload, UserToken};

#[cfg(target_arch = "wasm32")]
use crate::host::browser::BrowserHost;
#[cfg(not(target_arch = "wasm32"))]
use crate::host::native::NativeHost;

#[cfg(target_arch = "wasm32")]
type DefaultHost = BrowserHost;
#[cfg(not(target_arch = "wasm32"))]
type DefaultHost = NativeHost;

/// `void (*)(void *user_pointer)`
pub type WsOpenCallback = unsafe extern "C" fn(user_pointer: *mut c_void);
/// `void (*)(int error, void *user_pointer)`
pub type WsErrorCallback = unsafe extern "C" fn(error: c_int, user_pointer: *mut c_void);
/// `void (*)(const char *data, int size, void *user_pointer)`
///
/// `size` is `-1` for NUL-terminated text, the byte count for binary, and `0`
/// with a null `data` once the connection has closed.
pub type WsMessageCallback =
    unsafe extern "C" fn(data: *const c_char, size: c_int, user_pointer: *mut c_void);

thread_local! {
    static BRIDGE: Lazy<Option<Bridge<DefaultHost>>> = Lazy::new(default_bridge);
}

#[cfg(target_arch = "wasm32")]
fn default_bridge() -> Option<Bridge<DefaultHost>> {
    Some(Bridge::new(BrowserHost::new(|| {
        ws_dispatch_pending();
    })))
}

#[cfg(not(target_arch = "wasm32"))]
fn default_bridge() -> Option<Bridge<DefaultHost>> {
    match NativeHost::new(crate::config::BridgeConfig::from_env()) {
        Ok(host) => Some(Bridge::new(host)),
        Err(e) => {
            log::error!("Failed to start native WebSocket host: {}", e);
            None
        }
    }
}

fn with_bridge<R>(fallback: R, f: impl FnOnce(&Bridge<DefaultHost>) -> R) -> R {
    BRIDGE.with(|bridge| match &**bridge {
        Some(bridge) => f(bridge),
        None => fallback,
    })
}

fn handle(ws: c_int) -> Handle {
    u32::try_from(ws).map(Handle::from_raw).unwrap_or(Handle::NONE)
}

fn user_pointer(token: UserToken) -> *mut c_void {
    token.0 as *mut c_void
}

/// Open a WebSocket to the NUL-terminated `url`.
///
/// Returns the new handle, or 0 if WebSockets are unavailable or the target
/// was refused outright.
///
/// # Safety
///
/// `url` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ws_create(url: *const c_char) -> c_int {
    if url.is_null() {
        log::warn!("ws_create called with a null url");
        return 0;
    }
    let url = unsafe { CStr::from_ptr(url) }.to_string_lossy();

    with_bridge(0, |bridge| match bridge.create(&url) {
        // The registry never issues above MAX_HANDLE, which fits an int.
        Ok(handle) => handle.as_raw() as c_int,
        Err(e) => {
            log::error!("ws_create({}) failed: {}", url, e);
            0
        }
    })
}

/// Close and forget `ws`. No callback for it runs afterwards.
#[unsafe(no_mangle)]
pub extern "C" fn ws_delete(ws: c_int) {
    with_bridge((), |bridge| {
        bridge.delete(handle(ws));
    })
}

/// # Safety
///
/// `callback` must stay callable for as long as `ws` exists.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ws_set_open_callback(ws: c_int, callback: Option<WsOpenCallback>) {
    let Some(callback) = callback else {
        log::warn!("ws_set_open_callback({}) with a null callback ignored", ws);
        return;
    };
    with_bridge((), |bridge| {
        bridge.set_open_callback(handle(ws), move |token| unsafe {
            callback(user_pointer(token))
        })
    })
}

/// # Safety
///
/// `callback` must stay callable for as long as `ws` exists.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ws_set_error_callback(ws: c_int, callback: Option<WsErrorCallback>) {
    let Some(callback) = callback else {
        log::warn!("ws_set_error_callback({}) with a null callback ignored", ws);
        return;
    };
    with_bridge((), |bridge| {
        bridge.set_error_callback(handle(ws), move |code, token| unsafe {
            callback(code, user_pointer(token))
        })
    })
}

/// The buffer passed to `callback` is only valid until it returns.
///
/// # Safety
///
/// `callback` must stay callable for as long as `ws` exists.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ws_set_message_callback(ws: c_int, callback: Option<WsMessageCallback>) {
    let Some(callback) = callback else {
        log::warn!("ws_set_message_callback({}) with a null callback ignored", ws);
        return;
    };
    with_bridge((), |bridge| {
        bridge.set_message_callback(handle(ws), move |frame: Frame<'_>, token| unsafe {
            callback(
                frame.as_ptr() as *const c_char,
                frame.length(),
                user_pointer(token),
            )
        })
    })
}

/// Send `size` bytes of `data` as a binary frame, or, if `size` is negative,
/// the NUL-terminated `data` as a text frame.
///
/// Returns the number of bytes sent (text excludes the terminator), or -1 if
/// `ws` is unknown or not open.
///
/// # Safety
///
/// For `size >= 0`, `data` must be readable for `size` bytes. For `size < 0`,
/// `data` must point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ws_send(ws: c_int, data: *const c_char, size: c_int) -> c_int {
    let payload = match unsafe { Payload::from_raw(data as *const u8, size) } {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("ws_send({}) rejected: {}", ws, e);
            return -1;
        }
    };

    with_bridge(-1, |bridge| match bridge.send(handle(ws), payload) {
        Ok(sent) => c_int::try_from(sent).unwrap_or(c_int::MAX),
        Err(e) => {
            log::debug!("ws_send({}) failed: {}", ws, e);
            -1
        }
    })
}

/// Attach `ptr` to `ws`; it is passed back to every callback.
#[unsafe(no_mangle)]
pub extern "C" fn ws_set_user_pointer(ws: c_int, ptr: *mut c_void) {
    with_bridge((), |bridge| {
        bridge.set_user_token(handle(ws), UserToken(ptr as usize))
    })
}

/// Ready state of `ws` in browser numbering; 3 (closed) for unknown handles.
#[unsafe(no_mangle)]
pub extern "C" fn ws_get_ready_state(ws: c_int) -> c_int {
    with_bridge(crate::host::WS_CLOSED as c_int, |bridge| {
        bridge.ready_state(handle(ws)).as_raw() as c_int
    })
}

/// Run every callback that is due. Returns how many ran.
#[unsafe(no_mangle)]
pub extern "C" fn ws_dispatch_pending() -> c_int {
    with_bridge(0, |bridge| {
        c_int::try_from(bridge.dispatch_pending()).unwrap_or(c_int::MAX)
    })
}
