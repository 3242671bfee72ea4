//! Callback slots attached to each connection.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bridge::Frame;

/// Error code passed to error callbacks. Transports do not expose a portable
/// error code, so every failure reports this one.
pub const GENERIC_ERROR_CODE: i32 = 0;

/// Opaque value echoed back on every callback for a connection.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UserToken(pub usize);

impl UserToken {
    pub const NONE: UserToken = UserToken(0);
}

pub type OpenCallback = dyn FnMut(UserToken);
pub type ErrorCallback = dyn FnMut(i32, UserToken);
pub type MessageCallback = dyn for<'a> FnMut(Frame<'a>, UserToken);

/// A registered callback.
///
/// Shared so the dispatcher can hold on to it after releasing the registry;
/// a callback is then free to re-register, delete, or send on its own handle.
pub(crate) type Slot<F> = Rc<RefCell<Box<F>>>;

pub(crate) fn slot<F: ?Sized>(callback: Box<F>) -> Slot<F> {
    Rc::new(RefCell::new(callback))
}

/// The three callback slots of one connection.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) open: Option<Slot<OpenCallback>>,
    pub(crate) error: Option<Slot<ErrorCallback>>,
    pub(crate) message: Option<Slot<MessageCallback>>,
}
