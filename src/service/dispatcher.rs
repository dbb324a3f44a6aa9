//! Command routing with per-command failure isolation

use crate::domain::{BatchResult, CommandEnvelope, CommandResult, ConfigSnapshot, ResultCode};
use crate::host::{codes, EventSink, HostEvent};
use crate::settings::ConfigStore;
use async_trait::async_trait;
use futures::FutureExt;
use metrics::counter;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Per-command failures. Each one resolves to a result code; none aborts the batch.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Unknown command '{0}' not handled.")]
    UnknownCommand(String),

    #[error("Command data has the wrong type or is empty: {0}")]
    Validation(String),

    #[error("Mail rejected: {}", .0.join("; "))]
    DeliveryRejected(Vec<String>),

    #[error("Mail transport failed: {0}")]
    TransportFailure(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl CommandError {
    pub fn status(&self) -> ResultCode {
        match self {
            Self::UnknownCommand(_) | Self::Unexpected(_) => ResultCode::Fail,
            Self::Validation(_) => ResultCode::DataWrongTypeOrEmpty,
            Self::DeliveryRejected(_) | Self::TransportFailure(_) => ResultCode::SendMailFail,
        }
    }

    /// Convert into the result written back for `command`
    pub fn into_result(self, command: &str) -> CommandResult {
        let status = self.status();
        let message = match &self {
            Self::Unexpected(e) => format!(
                "Calling command '{}' failed! Additional information: {:#}",
                command, e
            ),
            other => other.to_string(),
        };
        CommandResult::new(status, message)
    }

    /// Send the events this failure produces to the host log
    fn report(&self, command: &str, sink: &dyn EventSink) {
        match self {
            Self::UnknownCommand(_) => {
                sink.emit(HostEvent::error(codes::ERROR_UNKNOWN_COMMAND, self.to_string()))
            }
            Self::Validation(reason) => {
                tracing::warn!(command, %reason, "Rejected command data");
            }
            Self::DeliveryRejected(diagnostics) => {
                for line in diagnostics {
                    sink.emit(HostEvent::error(codes::ERROR_MAIL, line.as_str()));
                }
            }
            Self::TransportFailure(detail) => {
                sink.emit(HostEvent::error(codes::ERROR_REQUEST, detail.as_str()))
            }
            Self::Unexpected(e) => sink.emit(HostEvent::error(
                codes::ERROR_COMMAND,
                format!("{}: {:#}", command, e),
            )),
        }
    }
}

/// State shared by every command of one dispatch cycle
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub batch_id: Uuid,
    /// Read once per batch
    pub snapshot: Arc<ConfigSnapshot>,
}

/// Routing target for one command name
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        payload: &Value,
        ctx: &DispatchContext,
    ) -> Result<CommandResult, CommandError>;
}

/// Builds the routing table of a [`CommandDispatcher`]
#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl DispatcherBuilder {
    pub fn route(mut self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn build(self, store: Arc<ConfigStore>, sink: Arc<dyn EventSink>) -> CommandDispatcher {
        CommandDispatcher {
            handlers: self.handlers,
            store,
            sink,
        }
    }
}

/// Routes command batches to handlers.
///
/// The routing table is fixed once built. Commands run in order and each
/// result is written before the next command starts.
pub struct CommandDispatcher {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    store: Arc<ConfigStore>,
    sink: Arc<dyn EventSink>,
}

impl CommandDispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn routes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run every command of `batch`, filling each result slot
    pub async fn dispatch(&self, batch: &mut [CommandEnvelope]) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let span = tracing::info_span!("dispatch", %batch_id, commands = batch.len());

        let run = AssertUnwindSafe(self.run_batch(batch, batch_id))
            .catch_unwind()
            .instrument(span)
            .await;

        match run {
            Ok(()) => BatchResult::from_envelopes(batch),
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(%batch_id, %detail, "Dispatch failed outside command boundary");

                for envelope in batch.iter_mut().filter(|e| e.result.is_none()) {
                    envelope.result = Some(CommandResult::new(
                        ResultCode::Fail,
                        format!("Command '{}' not processed: {}", envelope.name, detail),
                    ));
                }

                let event = HostEvent::error(codes::ERROR_CALL_COMMAND, detail.as_str());
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.sink.emit(event))) {
                    tracing::error!(
                        %batch_id,
                        detail = %panic_message(panic.as_ref()),
                        "Event sink failed while reporting dispatch failure"
                    );
                }

                BatchResult::from_envelopes(batch).failed_outright()
            }
        }
    }

    async fn run_batch(&self, batch: &mut [CommandEnvelope], batch_id: Uuid) {
        let ctx = DispatchContext {
            batch_id,
            snapshot: self.store.current(),
        };

        for envelope in batch.iter_mut() {
            let result = self.run_command(envelope, &ctx).await;

            let command = if self.handlers.contains_key(&envelope.name) {
                envelope.name.clone()
            } else {
                "unknown".to_string()
            };
            counter!(
                "mailcore_commands_total",
                "command" => command,
                "status" => result.status.as_str()
            )
            .increment(1);

            envelope.result = Some(result);
        }
    }

    async fn run_command(&self, envelope: &CommandEnvelope, ctx: &DispatchContext) -> CommandResult {
        let name = envelope.name.as_str();

        let outcome = match self.handlers.get(name) {
            None => Err(CommandError::UnknownCommand(name.to_string())),
            Some(handler) => AssertUnwindSafe(handler.handle(&envelope.payload, ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(CommandError::Unexpected(anyhow::anyhow!(
                        "handler panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                }),
        };

        match outcome {
            Ok(result) => {
                tracing::debug!(command = name, status = %result.status, "Command handled");
                result
            }
            Err(err) => {
                tracing::warn!(command = name, status = %err.status(), error = %err, "Command failed");
                err.report(name, self.sink.as_ref());
                err.into_result(name)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
