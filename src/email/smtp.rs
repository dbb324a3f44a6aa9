//! SMTP transport implementation using lettre

use super::provider::{DeliveryError, MailTransport, TransportFactory};
use crate::config::Config;
use crate::domain::ConfigSnapshot;
use async_trait::async_trait;
use lettre::{
    transport::smtp::{authentication::Credentials, extension::ClientId},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use std::time::Duration;

/// Options applied to every transport regardless of snapshot
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Bound on each SMTP round trip
    pub timeout: Duration,
    /// EHLO client name; lettre's default when `None`
    pub hello_name: Option<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            hello_name: None,
        }
    }
}

impl From<&Config> for TransportOptions {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.smtp_timeout,
            hello_name: config.hello_name.clone(),
        }
    }
}

/// SMTP transport bound to one settings snapshot
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    endpoint: String,
}

impl SmtpMailTransport {
    /// Create a transport from a snapshot. No connection is opened here.
    pub fn from_snapshot(
        snapshot: &ConfigSnapshot,
        options: &TransportOptions,
    ) -> Result<Self, DeliveryError> {
        let mut builder = if snapshot.use_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(snapshot.host())
                .map_err(|e| DeliveryError::InvalidConfiguration(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(snapshot.host())
        };

        builder = builder.port(snapshot.port()).timeout(Some(options.timeout));

        if let Some(name) = &options.hello_name {
            builder = builder.hello_name(ClientId::Domain(name.clone()));
        }

        // Empty username means anonymous submission
        if let Some((username, password)) = snapshot.credentials() {
            builder = builder.credentials(Credentials::new(
                username.to_string(),
                password.to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            endpoint: snapshot.endpoint(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        match self.transport.send(message).await {
            Ok(response) => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    code = %response.code(),
                    "SMTP server accepted message"
                );
                Ok(())
            }
            Err(e) => Err(classify_error(&e)),
        }
    }

    async fn test_connection(&self) -> Result<(), DeliveryError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DeliveryError::ConnectionError(format!(
                "{} did not accept a session",
                self.endpoint
            ))),
            Err(e) => Err(classify_error(&e)),
        }
    }

    fn transport_name(&self) -> &'static str {
        "smtp"
    }
}

/// Map a lettre error to a delivery error.
///
/// Negative server replies become `Rejected` with the reply text, except
/// 53x replies which are authentication failures. Everything without a
/// reply code (I/O, TLS, timeout, client side) is a connection error.
fn classify_error(err: &lettre::transport::smtp::Error) -> DeliveryError {
    if err.is_permanent() || err.is_transient() {
        let is_auth = err
            .status()
            .map(|code| code.to_string().starts_with("53"))
            .unwrap_or(false);
        if is_auth {
            return DeliveryError::AuthenticationFailed(err.to_string());
        }
        return DeliveryError::Rejected(diagnostic_lines(err));
    }

    DeliveryError::ConnectionError(err.to_string())
}

fn diagnostic_lines(err: &lettre::transport::smtp::Error) -> Vec<String> {
    let lines: Vec<String> = std::error::Error::source(err)
        .map(|source| {
            source
                .to_string()
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if lines.is_empty() {
        vec![err.to_string()]
    } else {
        lines
    }
}

/// Builds [`SmtpMailTransport`]s with shared options
#[derive(Debug, Clone, Default)]
pub struct SmtpTransportFactory {
    options: TransportOptions,
}

impl SmtpTransportFactory {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(TransportOptions::from(config))
    }
}

impl TransportFactory for SmtpTransportFactory {
    fn build(&self, snapshot: &ConfigSnapshot) -> Result<Arc<dyn MailTransport>, DeliveryError> {
        let transport = SmtpMailTransport::from_snapshot(snapshot, &self.options)?;
        tracing::debug!(endpoint = %transport.endpoint(), tls = snapshot.use_tls(), "Built SMTP transport");
        Ok(Arc::new(transport))
    }
}
