//! Mail request and send outcome types

use serde::Deserialize;
use validator::Validate;

/// Mail to be sent, built from one `SendMail` command payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct MailRequest {
    /// Sender address
    #[validate(length(min = 1))]
    pub from: String,

    /// Recipient address list, separated by `,` or `;`
    #[validate(length(min = 1))]
    pub to: String,

    pub subject: String,

    /// Plain text body
    #[serde(rename = "body")]
    pub body_text: String,

    /// HTML body, rendered through the body formatter before sending
    #[serde(rename = "htmlBody", default)]
    pub body_html: Option<String>,
}

impl MailRequest {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body_text: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body_text: body_text.into(),
            body_html: None,
        }
    }

    pub fn with_html_body(mut self, body_html: impl Into<String>) -> Self {
        self.body_html = Some(body_html.into());
        self
    }

    /// Recipient addresses with separators and blanks removed
    pub fn recipients(&self) -> Vec<&str> {
        self.to
            .split([',', ';'])
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .collect()
    }

    /// HTML body if one was supplied and is not blank
    pub fn html_body(&self) -> Option<&str> {
        self.body_html
            .as_deref()
            .filter(|html| !html.trim().is_empty())
    }

    /// Plain text body if not blank
    pub fn text_body(&self) -> Option<&str> {
        Some(self.body_text.as_str()).filter(|text| !text.trim().is_empty())
    }
}

/// Result of one send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The server accepted the message
    Delivered,

    /// The server (or the address parser) declined the message.
    /// Each diagnostic line is kept separately.
    Rejected { diagnostics: Vec<String> },

    /// Connection, TLS, authentication or timeout failure
    TransportError { detail: String },
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Rejected { .. } => "rejected",
            Self::TransportError { .. } => "transport_error",
        }
    }
}
