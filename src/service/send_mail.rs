//! `SendMail` command handler

use super::dispatcher::{CommandError, CommandHandler, DispatchContext};
use crate::domain::{CommandResult, MailRequest, SendOutcome};
use crate::email::MailSender;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use validator::Validate;

/// Command name routed to [`SendMailHandler`]
pub const SEND_MAIL: &str = "SendMail";

/// Validates a mail payload and sends it with the batch's snapshot
pub struct SendMailHandler {
    sender: Arc<MailSender>,
}

impl SendMailHandler {
    pub fn new(sender: Arc<MailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl CommandHandler for SendMailHandler {
    async fn handle(
        &self,
        payload: &Value,
        ctx: &DispatchContext,
    ) -> Result<CommandResult, CommandError> {
        let request = parse_request(payload)?;

        tracing::info!(
            batch_id = %ctx.batch_id,
            endpoint = %ctx.snapshot.endpoint(),
            recipients = request.recipients().len(),
            "Sending mail"
        );

        match self.sender.send(&ctx.snapshot, &request).await {
            SendOutcome::Delivered => Ok(CommandResult::success()),
            SendOutcome::Rejected { diagnostics } => Err(CommandError::DeliveryRejected(diagnostics)),
            SendOutcome::TransportError { detail } => Err(CommandError::TransportFailure(detail)),
        }
    }
}

/// Build a mail request from an untyped payload.
///
/// Anything other than an object carrying `from`, `to`, `subject` and `body`
/// strings (plus an optional `htmlBody`) is a validation error, as is a blank
/// sender or a recipient list with no addresses.
pub fn parse_request(payload: &Value) -> Result<MailRequest, CommandError> {
    if !payload.is_object() {
        return Err(CommandError::Validation(format!(
            "expected a structured value, got {}",
            value_kind(payload)
        )));
    }

    let request = MailRequest::deserialize(payload)
        .map_err(|e| CommandError::Validation(e.to_string()))?;
    request
        .validate()
        .map_err(|e| CommandError::Validation(e.to_string()))?;

    if request.from.trim().is_empty() {
        return Err(CommandError::Validation("from: sender address is blank".to_string()));
    }
    if request.recipients().is_empty() {
        return Err(CommandError::Validation("to: no recipient address given".to_string()));
    }

    Ok(request)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
