//! Command envelopes and results exchanged with the host

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Extension result codes reported back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    Fail,
    SendMailFail,
    DataWrongTypeOrEmpty,
}

impl ResultCode {
    /// Numeric value on the host wire
    pub fn code(&self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Fail => 1,
            Self::SendMailFail => 10,
            Self::DataWrongTypeOrEmpty => 11,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
            Self::SendMailFail => "send_mail_fail",
            Self::DataWrongTypeOrEmpty => "data_wrong_type_or_empty",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.code())
    }
}

/// Outcome of one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub status: ResultCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success() -> Self {
        Self {
            status: ResultCode::Success,
            message: None,
        }
    }

    pub fn new(status: ResultCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

/// One inbound command and its result slot
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandEnvelope {
    /// Command name used for routing
    #[serde(alias = "mapping")]
    pub name: String,

    /// Untyped payload; `null` when the host sent nothing
    #[serde(default, alias = "writeValue", skip_serializing)]
    pub payload: serde_json::Value,

    /// Filled in by the dispatcher
    #[serde(default, skip_deserializing)]
    pub result: Option<CommandResult>,
}

impl CommandEnvelope {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            result: None,
        }
    }

    pub fn status(&self) -> Option<ResultCode> {
        self.result.as_ref().map(|r| r.status)
    }
}

/// Aggregate status of one dispatched batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub status: ResultCode,
    /// Number of commands in the batch
    pub total: usize,
    /// Number of commands whose result is not `Success`
    pub failed: usize,
}

impl BatchResult {
    /// Aggregate the result slots of a dispatched batch.
    ///
    /// A command without a result counts as failed.
    pub fn from_envelopes(batch: &[CommandEnvelope]) -> Self {
        let failed = batch
            .iter()
            .filter(|envelope| !matches!(envelope.status(), Some(ResultCode::Success)))
            .count();

        Self {
            status: if failed == 0 {
                ResultCode::Success
            } else {
                ResultCode::Fail
            },
            total: batch.len(),
            failed,
        }
    }

    /// Force the batch status to `Fail` after a failure outside the
    /// per-command boundary
    pub fn failed_outright(self) -> Self {
        Self {
            status: ResultCode::Fail,
            ..self
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(ResultCode::Success, 0)]
    #[case(ResultCode::Fail, 1)]
    #[case(ResultCode::SendMailFail, 10)]
    #[case(ResultCode::DataWrongTypeOrEmpty, 11)]
    fn test_result_code_values(#[case] code: ResultCode, #[case] expected: u32) {
        assert_eq!(code.code(), expected);
        assert_eq!(serde_json::to_value(code).unwrap(), json!(expected));
    }

    #[test]
    fn test_envelope_deserialization_aliases() {
        let envelope: CommandEnvelope = serde_json::from_value(json!({
            "mapping": "SendMail",
            "writeValue": { "from": "a@x.com" }
        }))
        .unwrap();

        assert_eq!(envelope.name, "SendMail");
        assert_eq!(envelope.payload["from"], "a@x.com");
        assert!(envelope.result.is_none());
    }

    #[test]
    fn test_envelope_without_payload_is_null() {
        let envelope: CommandEnvelope = serde_json::from_value(json!({ "name": "Ping" })).unwrap();
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn test_envelope_serializes_result() {
        let mut envelope = CommandEnvelope::new("Ping", json!(null));
        envelope.result = Some(CommandResult::new(ResultCode::Fail, "nope"));

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({ "name": "Ping", "result": { "status": 1, "message": "nope" } })
        );
    }

    #[test]
    fn test_batch_result_aggregation() {
        let mut ok = CommandEnvelope::new("SendMail", json!({}));
        ok.result = Some(CommandResult::success());
        let mut failed = CommandEnvelope::new("Ping", json!(null));
        failed.result = Some(CommandResult::new(ResultCode::Fail, "unknown"));

        let batch = vec![ok.clone()];
        assert!(BatchResult::from_envelopes(&batch).is_success());

        let batch = vec![ok, failed];
        let result = BatchResult::from_envelopes(&batch);
        assert_eq!(result.status, ResultCode::Fail);
        assert_eq!(result.total, 2);
        assert_eq!(result.failed, 1);
    }

    #[test]
    fn test_missing_result_counts_as_failed() {
        let batch = vec![CommandEnvelope::new("SendMail", json!({}))];
        assert_eq!(BatchResult::from_envelopes(&batch).failed, 1);
    }

    #[test]
    fn test_failed_outright_keeps_counts() {
        let mut ok = CommandEnvelope::new("SendMail", json!({}));
        ok.result = Some(CommandResult::success());

        let result = BatchResult::from_envelopes(&[ok]).failed_outright();
        assert_eq!(result.status, ResultCode::Fail);
        assert_eq!(result.total, 1);
        assert_eq!(result.failed, 0);
    }

    #[test]
    fn test_empty_batch_is_success() {
        assert!(BatchResult::from_envelopes(&[]).is_success());
    }
}
