//! Key-value stores holding endpoint envelopes.
//!
//! Keys are 40-character lowercase hex slot keys, values are hex envelopes.
//! Backends are created by name through the [`PluginRegistry`] and looked up
//! per peer through the [`PluginManager`].

mod exec;
mod memory;
mod process;
mod registry;
mod shell;

pub use exec::ExecStore;
pub use memory::MemoryStore;
pub use registry::{DEFAULT_PLUGIN_TIMEOUT, PluginConfig, PluginManager, PluginRegistry, StoreFactory};
pub use shell::ShellStore;

use async_trait::async_trait;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Nothing stored under the key
    #[error("key {0} not found")]
    NotFound(String),

    /// Backend could not serve the request (unreachable, refused, timed out)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Plugin broke its protocol (unparseable reply, closed pipe)
    #[error("plugin failure: {0}")]
    Plugin(String),

    /// No plugin registered under this name
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    /// No factory for this plugin type
    #[error("unknown plugin type '{0}'")]
    UnknownType(String),

    /// Plugin definition rejected by its factory
    #[error("invalid plugin configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Returns true if a later attempt may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Plugin(_))
    }
}

/// Opaque key → value persistence with at-least-once semantics.
#[async_trait]
pub trait Store: Send + Sync {
    /// Value stored under `key`, or [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<String, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
