//! Host collaborator interfaces
//!
//! The host process owns configuration storage, listener registration and
//! the log transport. The extension only sees them through these traits:
//! - [`ConfigSource`] for reading named configuration values
//! - [`HostRegistry`] for subscribing listeners, wrapped in [`Registration`]
//! - [`EventSink`] for one-way (severity, code, detail) events

pub mod memory;
pub mod sink;

pub use memory::MemoryHost;
pub use sink::{ChannelSink, MemorySink, TracingSink};

use crate::error::HostError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Event codes sent to the host log
pub mod codes {
    pub const MESSAGE_INIT: &str = "MESSAGE_INIT";
    pub const MESSAGE_SHUTDOWN: &str = "MESSAGE_SHUTDOWN";
    pub const NEW_CONFIG: &str = "NEW_CONFIG";
    pub const ERROR_CONFIG: &str = "ERROR_CONFIG";
    pub const ERROR_UNKNOWN_COMMAND: &str = "ERROR_UNKNOWN_COMMAND";
    /// One event per diagnostic line returned for a rejected mail
    pub const ERROR_MAIL: &str = "ERROR_MAIL";
    pub const ERROR_REQUEST: &str = "ERROR_REQUEST";
    pub const ERROR_COMMAND: &str = "ERROR_COMMAND";
    pub const ERROR_CALL_COMMAND: &str = "ERROR_CALL_COMMAND";
}

/// Read access to the host's configuration values
pub trait ConfigSource: Send + Sync {
    /// Current value of one key, `None` when the host has no value
    fn get_value(&self, key: &str) -> Option<Value>;

    /// Values for several keys, read as one consistent set when the host
    /// supports it.
    fn get_values(&self, keys: &[&str]) -> Vec<Option<Value>> {
        keys.iter().map(|key| self.get_value(key)).collect()
    }
}

/// Listener kinds the extension subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Request,
    Config,
    Shutdown,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "request",
            Self::Config => "config",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Handle returned by the host for a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Host listener registry
#[cfg_attr(test, mockall::automock)]
pub trait HostRegistry: Send + Sync {
    /// Register a listener. `filter` restricts config listeners to the named keys.
    fn register(&self, kind: ListenerKind, filter: Vec<String>) -> Result<ListenerId, HostError>;

    fn unregister(&self, id: ListenerId);
}

/// A registered listener, unregistered when dropped
pub struct Registration {
    registry: Arc<dyn HostRegistry>,
    kind: ListenerKind,
    id: ListenerId,
}

impl Registration {
    pub fn register(
        registry: &Arc<dyn HostRegistry>,
        kind: ListenerKind,
        filter: &[&str],
    ) -> Result<Self, HostError> {
        let id = registry.register(kind, filter.iter().map(|k| k.to_string()).collect())?;
        tracing::debug!(listener = %kind, id = id.0, "Registered host listener");

        Ok(Self {
            registry: Arc::clone(registry),
            kind,
            id,
        })
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
        tracing::debug!(listener = %self.kind, id = self.id.0, "Unregistered host listener");
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One event for the host log
#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    pub severity: Severity,
    pub code: &'static str,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl HostEvent {
    pub fn new(severity: Severity, code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(code: &'static str, detail: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, detail)
    }

    pub fn error(code: &'static str, detail: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, detail)
    }
}

/// One-way event sink. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: HostEvent);
}
