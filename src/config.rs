//! Bridge configuration.
//!
//! Only the native host reads most of these settings; the browser picks its
//! own origin and runs on the page's event loop.

use serde::Deserialize;

use crate::error::Result;

/// Environment variable holding a JSON [`BridgeConfig`] for the default bridge.
pub const CONFIG_ENV_VAR: &str = "WS_BRIDGE_CONFIG";

fn default_worker_threads() -> usize {
    2
}

/// Configuration for a bridge and the host behind it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// `Origin` header sent with the opening handshake.
    pub origin: Option<String>,
    /// Values offered in `Sec-WebSocket-Protocol`.
    pub subprotocols: Vec<String>,
    /// Worker threads for the native host's runtime.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            origin: None,
            subprotocols: Vec::new(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `Origin` header for new connections.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Offer an additional subprotocol.
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }

    /// Size the native runtime. Zero is bumped to one.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: BridgeConfig = serde_json::from_str(json)?;
        config.worker_threads = config.worker_threads.max(1);
        Ok(config)
    }

    /// Read the config from [`CONFIG_ENV_VAR`], falling back to defaults.
    pub fn from_env() -> Self {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(json) => Self::from_json(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed {}: {}", CONFIG_ENV_VAR, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// The `Sec-WebSocket-Protocol` header value, if any protocols are offered.
    pub fn protocol_header(&self) -> Option<String> {
        if self.subprotocols.is_empty() {
            None
        } else {
            Some(self.subprotocols.join(", "))
        }
    }
}
