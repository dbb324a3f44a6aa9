//! SMTP settings read from the host configuration surface

pub mod store;

pub use store::{ConfigStore, ReplaceOutcome};

use crate::domain::ConfigSnapshot;
use crate::error::ConfigError;
use crate::host::ConfigSource;
use serde_json::Value;
use validator::Validate;

/// Configuration keys owned by the host
pub mod keys {
    pub const SMTP_SERVER: &str = "SMTPServer";
    pub const PORT: &str = "Port";
    pub const ENABLE_SSL: &str = "EnableSSL";
    pub const USERNAME: &str = "Username";
    pub const PASSWORD: &str = "Password";

    /// Every key that makes up one snapshot, in read order
    pub const ALL: [&str; 5] = [SMTP_SERVER, PORT, ENABLE_SSL, USERNAME, PASSWORD];
}

/// Read all five SMTP values and assemble a validated snapshot.
///
/// `SMTPServer` and `Port` are required. A missing `EnableSSL` means no TLS;
/// missing credentials mean anonymous submission.
pub fn read_snapshot(source: &dyn ConfigSource) -> Result<ConfigSnapshot, ConfigError> {
    let values = source.get_values(&keys::ALL);
    let [server, port, enable_ssl, username, password]: [Option<Value>; 5] = values
        .try_into()
        .map_err(|_| ConfigError::Invalid("configuration source returned a short read".to_string()))?;

    let snapshot = ConfigSnapshot::new(
        required_string(keys::SMTP_SERVER, server)?,
        port_value(port)?,
        optional_bool(keys::ENABLE_SSL, enable_ssl)?,
        optional_string(keys::USERNAME, username)?,
        optional_string(keys::PASSWORD, password)?,
    );
    snapshot.validate()?;

    Ok(snapshot)
}

fn required_string(key: &'static str, value: Option<Value>) -> Result<String, ConfigError> {
    match value {
        None | Some(Value::Null) => Err(ConfigError::Missing(key)),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(ConfigError::WrongType {
            key,
            expected: "a string",
        }),
    }
}

fn optional_string(key: &'static str, value: Option<Value>) -> Result<String, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ConfigError::WrongType {
            key,
            expected: "a string",
        }),
    }
}

fn optional_bool(key: &'static str, value: Option<Value>) -> Result<bool, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(_) => Err(ConfigError::WrongType {
            key,
            expected: "a boolean",
        }),
    }
}

fn port_value(value: Option<Value>) -> Result<u16, ConfigError> {
    let number = match value {
        None | Some(Value::Null) => return Err(ConfigError::Missing(keys::PORT)),
        Some(Value::Number(n)) => n.as_i64().ok_or(ConfigError::WrongType {
            key: keys::PORT,
            expected: "an integer",
        })?,
        Some(_) => {
            return Err(ConfigError::WrongType {
                key: keys::PORT,
                expected: "an integer",
            })
        }
    };

    match u16::try_from(number) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::Invalid(format!(
            "Port must be between 1 and 65535, got {}",
            number
        ))),
    }
}
