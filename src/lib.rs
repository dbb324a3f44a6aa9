//! MailCore - mail send extension
//!
//! Routes host command batches to handlers and sends mail over SMTP using
//! settings that the host may change at any time.

pub mod config;
pub mod domain;
pub mod email;
pub mod error;
pub mod host;
pub mod service;
pub mod settings;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, ServiceError};
pub use service::{HostContext, MailCoreService};
