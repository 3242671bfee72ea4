//! Native host against a loopback tokio-tungstenite peer.

#![cfg(not(target_arch = "wasm32"))]

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use ws_bridge::{Bridge, BridgeConfig, GENERIC_ERROR_CODE, Handle, NativeHost, ReadyState};

#[derive(Debug, Default)]
struct Events {
    opened: u32,
    errors: Vec<i32>,
    texts: Vec<String>,
    binaries: Vec<Vec<u8>>,
    closed: u32,
}

type Shared = Rc<RefCell<Events>>;

fn native_bridge() -> Bridge<NativeHost> {
    let host = NativeHost::new(BridgeConfig::default()).expect("Failed to start native host");
    Bridge::new(host)
}

fn watch(bridge: &Bridge<NativeHost>, handle: Handle) -> Shared {
    let events: Shared = Rc::default();

    let seen = events.clone();
    bridge.set_open_callback(handle, move |_| seen.borrow_mut().opened += 1);

    let seen = events.clone();
    bridge.set_error_callback(handle, move |code, _| seen.borrow_mut().errors.push(code));

    let seen = events.clone();
    bridge.set_message_callback(handle, move |frame, _| {
        let mut seen = seen.borrow_mut();
        if frame.is_closed() {
            seen.closed += 1;
        } else if let Some(text) = frame.as_text() {
            seen.texts.push(text.to_string());
        } else {
            seen.binaries.push(frame.as_bytes().to_vec());
        }
    });

    events
}

fn pump(bridge: &Bridge<NativeHost>) -> impl FnMut() + '_ {
    move || {
        bridge.dispatch_timeout(Duration::from_millis(20));
    }
}

#[test]
fn test_text_and_binary_round_trip() {
    let url = common::spawn_echo_server();
    let bridge = native_bridge();
    let ws = bridge.create(&url).expect("create should succeed");
    let events = watch(&bridge, ws);

    assert!(
        common::wait_until(pump(&bridge), || events.borrow().opened == 1),
        "connection never opened: {:?}",
        events.borrow()
    );
    assert_eq!(bridge.ready_state(ws), ReadyState::Open);

    assert_eq!(bridge.send(ws, "hello").unwrap(), 5);
    assert_eq!(bridge.send(ws, vec![0x00u8, 0x7F, 0xFF]).unwrap(), 3);

    assert!(
        common::wait_until(pump(&bridge), || {
            let events = events.borrow();
            !events.texts.is_empty() && !events.binaries.is_empty()
        }),
        "echo never arrived: {:?}",
        events.borrow()
    );

    let events = events.borrow();
    assert_eq!(events.texts, vec!["hello".to_string()]);
    assert_eq!(events.binaries, vec![vec![0x00, 0x7F, 0xFF]]);
    assert!(events.errors.is_empty());
    assert_eq!(events.closed, 0);
}

#[test]
fn test_peer_close_arrives_as_empty_message() {
    let url = common::spawn_echo_server();
    let bridge = native_bridge();
    let ws = bridge.create(&url).unwrap();
    let events = watch(&bridge, ws);

    assert!(common::wait_until(pump(&bridge), || events.borrow().opened == 1));
    bridge.send(ws, common::CLOSE_REQUEST).unwrap();

    assert!(
        common::wait_until(pump(&bridge), || events.borrow().closed > 0),
        "close never arrived: {:?}",
        events.borrow()
    );

    // Give any stray duplicate a chance to show up.
    for _ in 0..5 {
        bridge.dispatch_timeout(Duration::from_millis(20));
    }
    assert_eq!(events.borrow().closed, 1);
    assert!(bridge.send(ws, "late").unwrap_err().is_not_open());
}

#[test]
fn test_send_before_handshake_fails() {
    let (_listener, url) = common::silent_server();
    let bridge = native_bridge();
    let ws = bridge.create(&url).unwrap();

    let err = bridge.send(ws, "too early").unwrap_err();
    assert!(err.is_not_open(), "got {}", err);
    assert_eq!(bridge.ready_state(ws), ReadyState::Connecting);
}

#[test]
fn test_refused_connection_reports_error_then_close() {
    let bridge = native_bridge();
    let ws = bridge.create(&common::refused_url()).unwrap();
    let events = watch(&bridge, ws);

    assert!(
        common::wait_until(pump(&bridge), || events.borrow().closed > 0),
        "failure never reported: {:?}",
        events.borrow()
    );
    let events = events.borrow();
    assert_eq!(events.errors, vec![GENERIC_ERROR_CODE]);
    assert_eq!(events.opened, 0);
    assert_eq!(events.closed, 1);
}

#[test]
fn test_secure_url_never_opens_over_cleartext() {
    let url = common::spawn_echo_server().replacen("ws://", "wss://", 1);
    let bridge = native_bridge();
    let ws = bridge.create(&url).unwrap();
    let events = watch(&bridge, ws);

    assert!(
        common::wait_until(pump(&bridge), || events.borrow().closed > 0),
        "tls failure never reported: {:?}",
        events.borrow()
    );
    let events = events.borrow();
    assert_eq!(events.opened, 0, "wss must not fall back to plain tcp");
    assert_eq!(events.errors, vec![GENERIC_ERROR_CODE]);
    assert_eq!(events.closed, 1);
}

#[test]
fn test_malformed_url_fails_asynchronously() {
    let bridge = native_bridge();
    let ws = bridge.create("definitely not a url").expect("create defers validation");
    let events = watch(&bridge, ws);

    assert!(common::wait_until(pump(&bridge), || events.borrow().closed > 0));
    assert_eq!(events.borrow().errors, vec![GENERIC_ERROR_CODE]);
}

#[test]
fn test_no_callbacks_after_delete() {
    let url = common::spawn_echo_server();
    let bridge = native_bridge();
    let ws = bridge.create(&url).unwrap();
    let events = watch(&bridge, ws);

    assert!(common::wait_until(pump(&bridge), || events.borrow().opened == 1));
    bridge.send(ws, "echo me").unwrap();
    bridge.delete(ws);

    for _ in 0..10 {
        bridge.dispatch_timeout(Duration::from_millis(20));
    }
    let events = events.borrow();
    assert!(events.texts.is_empty(), "got {:?}", events.texts);
    assert_eq!(events.closed, 0);
    assert!(bridge.is_empty());
}

#[test]
fn test_delete_during_handshake_is_silent() {
    let url = common::spawn_echo_server();
    let bridge = native_bridge();
    let ws = bridge.create(&url).unwrap();
    let events = watch(&bridge, ws);
    bridge.delete(ws);

    for _ in 0..10 {
        bridge.dispatch_timeout(Duration::from_millis(20));
    }
    let events = events.borrow();
    assert_eq!(events.opened, 0);
    assert!(events.errors.is_empty());
    assert_eq!(events.closed, 0);
}
