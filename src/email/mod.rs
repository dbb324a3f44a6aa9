//! Outbound mail
//!
//! - transport traits and errors (`provider`)
//! - SMTP transport using lettre (`smtp`)
//! - pluggable HTML body formatting (`templates`)
//! - the snapshot-bound sender (`sender`)

pub mod provider;
pub mod sender;
pub mod smtp;
pub mod templates;

pub use provider::{DeliveryError, MailTransport, TransportFactory};
pub use sender::MailSender;
pub use smtp::{SmtpMailTransport, SmtpTransportFactory, TransportOptions};
pub use templates::{BodyFormatter, FormatError, PassthroughFormatter, TemplateEngine};
