//! Mail transport traits and error types

use crate::domain::{ConfigSnapshot, SendOutcome};
use async_trait::async_trait;
use lettre::Message;
use std::sync::Arc;
use thiserror::Error;

/// Mail transport error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The server or the message builder declined the mail.
    /// One entry per diagnostic line.
    #[error("Message rejected: {}", .0.join("; "))]
    Rejected(Vec<String>),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl DeliveryError {
    pub fn into_outcome(self) -> SendOutcome {
        match self {
            Self::Rejected(diagnostics) => SendOutcome::Rejected { diagnostics },
            other => SendOutcome::TransportError {
                detail: other.to_string(),
            },
        }
    }
}

/// A configured connection to one mail server
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Submit a message. Blocks the calling task until the server answers.
    async fn send(&self, message: Message) -> Result<(), DeliveryError>;

    /// Open a session and close it again without sending
    async fn test_connection(&self) -> Result<(), DeliveryError>;

    fn transport_name(&self) -> &'static str;
}

/// Builds a transport from a settings snapshot
#[cfg_attr(test, mockall::automock)]
pub trait TransportFactory: Send + Sync {
    fn build(&self, snapshot: &ConfigSnapshot) -> Result<Arc<dyn MailTransport>, DeliveryError>;
}
