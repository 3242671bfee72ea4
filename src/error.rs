//! Error types for the bridge.

use thiserror::Error;

use crate::bridge::{Handle, HandleSpaceExhausted};

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error type for bridge operations.
///
/// The C ABI never surfaces these directly; it collapses them to the
/// `0` / `-1` sentinels after logging.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host environment has no WebSocket capability.
    #[error("websockets are not supported by this host")]
    Unsupported,

    /// Handle was never issued, or has already been deleted.
    #[error("unknown handle {0}")]
    UnknownHandle(Handle),

    /// Connection has not reached (or has left) the open state.
    #[error("connection {0} is not open")]
    NotOpen(Handle),

    /// The host rejected the connection target outright.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Function argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No handle numbers are left to issue.
    #[error(transparent)]
    Exhausted(#[from] HandleSpaceExhausted),

    /// The transport refused a frame or is gone.
    #[error("transport error: {0}")]
    Transport(String),

    /// The async runtime backing the native host could not be built.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl BridgeError {
    /// Check if this error means the handle does not exist.
    pub fn is_unknown_handle(&self) -> bool {
        matches!(self, BridgeError::UnknownHandle(_))
    }

    /// Check if this error means the connection is not open yet (or any more).
    pub fn is_not_open(&self) -> bool {
        matches!(self, BridgeError::NotOpen(_))
    }
}
