//! Unified error handling for MailCore

use crate::domain::ResultCode;
use crate::email::DeliveryError;
use thiserror::Error;

/// Lifecycle result type
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised while bringing the extension up
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Transport error: {0}")]
    Transport(#[from] DeliveryError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Code reported to the host when init fails
    pub fn result_code(&self) -> ResultCode {
        ResultCode::Fail
    }
}

/// Errors reading the SMTP settings from the host configuration surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration value '{0}'")]
    Missing(&'static str),

    #[error("Configuration value '{key}' must be {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load settings: {0}")]
    Load(String),
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ConfigError::Invalid(errors.to_string())
    }
}

/// Errors talking to the host's listener registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Listener registration failed: {0}")]
    Registration(String),
}
