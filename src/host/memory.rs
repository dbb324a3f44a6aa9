//! In-process host: configuration map plus listener bookkeeping

use super::{ConfigSource, HostRegistry, ListenerId, ListenerKind};
use crate::error::{ConfigError, HostError};
use crate::settings::keys;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Host stand-in that keeps configuration values and registered listeners in memory
#[derive(Debug, Default)]
pub struct MemoryHost {
    values: RwLock<HashMap<String, Value>>,
    listeners: Mutex<HashMap<ListenerId, (ListenerKind, Vec<String>)>>,
    next_id: AtomicU64,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host preloaded with a full SMTP configuration
    pub fn with_smtp(
        server: &str,
        port: u16,
        enable_ssl: bool,
        username: &str,
        password: &str,
    ) -> Self {
        let host = Self::new();
        host.set_smtp(server, port, enable_ssl, username, password);
        host
    }

    /// Load configuration values from a JSON object file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;

        match value {
            Value::Object(map) => {
                let host = Self::new();
                host.values.write().extend(map);
                Ok(host)
            }
            _ => Err(ConfigError::Load(format!(
                "{}: expected a JSON object",
                path.display()
            ))),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }

    /// Replace all SMTP values in one write
    pub fn set_smtp(&self, server: &str, port: u16, enable_ssl: bool, username: &str, password: &str) {
        let mut values = self.values.write();
        values.insert(keys::SMTP_SERVER.to_string(), Value::from(server));
        values.insert(keys::PORT.to_string(), Value::from(port));
        values.insert(keys::ENABLE_SSL.to_string(), Value::from(enable_ssl));
        values.insert(keys::USERNAME.to_string(), Value::from(username));
        values.insert(keys::PASSWORD.to_string(), Value::from(password));
    }

    /// Number of listeners currently registered
    pub fn active_listeners(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Key filter of the registered config listener, if any
    pub fn config_filter(&self) -> Option<Vec<String>> {
        self.listeners
            .lock()
            .values()
            .find(|(kind, _)| *kind == ListenerKind::Config)
            .map(|(_, filter)| filter.clone())
    }
}

impl ConfigSource for MemoryHost {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn get_values(&self, keys: &[&str]) -> Vec<Option<Value>> {
        let values = self.values.read();
        keys.iter().map(|key| values.get(*key).cloned()).collect()
    }
}

impl HostRegistry for MemoryHost {
    fn register(&self, kind: ListenerKind, filter: Vec<String>) -> Result<ListenerId, HostError> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners.lock().insert(id, (kind, filter));
        Ok(id)
    }

    fn unregister(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }
}
