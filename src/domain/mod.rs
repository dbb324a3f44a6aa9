//! Domain models for MailCore

pub mod command;
pub mod mail;
pub mod snapshot;

pub use command::{BatchResult, CommandEnvelope, CommandResult, ResultCode};
pub use mail::{MailRequest, SendOutcome};
pub use snapshot::ConfigSnapshot;
