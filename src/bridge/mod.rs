//! Handle-based WebSocket bridge.
//!
//! Callers get an integer [`Handle`] per connection, register callbacks on
//! it, and push frames through it. Events from the host come back through
//! the same handle and are dropped once the handle is deleted.

mod callback;
mod manager;
mod payload;
mod registry;

pub use callback::{ErrorCallback, GENERIC_ERROR_CODE, MessageCallback, OpenCallback, UserToken};
pub use manager::Bridge;
pub use payload::{Frame, Payload, ScratchBuffer, TEXT_LENGTH};
pub use registry::{Handle, HandleRegistry, HandleSpaceExhausted, MAX_HANDLE};
