//! Extension lifecycle: init, config changes, request batches, shutdown

use super::dispatcher::CommandDispatcher;
use super::send_mail::{SendMailHandler, SEND_MAIL};
use crate::domain::{BatchResult, CommandEnvelope, CommandResult, ResultCode};
use crate::email::{BodyFormatter, MailSender, TransportFactory};
use crate::error::Result;
use crate::host::{
    codes, ConfigSource, EventSink, HostEvent, HostRegistry, ListenerKind, Registration,
};
use crate::settings::{keys, read_snapshot, ConfigStore, ReplaceOutcome};
use metrics::counter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Collaborators supplied by the host at init
#[derive(Clone)]
pub struct HostContext {
    pub config_source: Arc<dyn ConfigSource>,
    pub registry: Arc<dyn HostRegistry>,
    pub sink: Arc<dyn EventSink>,
}

/// The running mail extension.
///
/// Owns the config store, the sender and the dispatcher for its whole
/// lifetime. Listener registrations are released on shutdown or drop.
pub struct MailCoreService {
    source: Arc<dyn ConfigSource>,
    sink: Arc<dyn EventSink>,
    store: Arc<ConfigStore>,
    sender: Arc<MailSender>,
    dispatcher: CommandDispatcher,
    registrations: Mutex<Vec<Registration>>,
    shut_down: AtomicBool,
}

impl MailCoreService {
    /// Subscribe to the host, load the first snapshot and bind the sender.
    ///
    /// Listeners are registered before the first read so a change landing
    /// during init is not missed.
    pub fn init(
        host: HostContext,
        factory: Arc<dyn TransportFactory>,
        formatter: Arc<dyn BodyFormatter>,
    ) -> Result<Self> {
        let registrations = vec![
            Registration::register(&host.registry, ListenerKind::Request, &[])?,
            Registration::register(&host.registry, ListenerKind::Config, &keys::ALL)?,
            Registration::register(&host.registry, ListenerKind::Shutdown, &[])?,
        ];

        let snapshot = match read_snapshot(host.config_source.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                host.sink
                    .emit(HostEvent::error(codes::ERROR_CONFIG, e.to_string()));
                return Err(e.into());
            }
        };

        let store = Arc::new(ConfigStore::new(snapshot));
        let sender = Arc::new(MailSender::new(factory, formatter));
        let current = store.current();
        if let Err(e) = sender.bind(&current) {
            host.sink
                .emit(HostEvent::error(codes::ERROR_CONFIG, e.to_string()));
            return Err(e.into());
        }

        let dispatcher = CommandDispatcher::builder()
            .route(SEND_MAIL, Arc::new(SendMailHandler::new(Arc::clone(&sender))))
            .build(Arc::clone(&store), Arc::clone(&host.sink));

        tracing::info!(
            endpoint = %current.endpoint(),
            routes = ?dispatcher.routes(),
            "Mail extension initialized"
        );
        host.sink.emit(HostEvent::info(
            codes::MESSAGE_INIT,
            format!("Mail extension initialized for {}", current.endpoint()),
        ));

        Ok(Self {
            source: host.config_source,
            sink: host.sink,
            store,
            sender,
            dispatcher,
            registrations: Mutex::new(registrations),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Re-read the SMTP settings after the host reports changed keys.
    ///
    /// All five values are re-read together regardless of which keys changed.
    /// An invalid configuration keeps the current snapshot.
    pub fn on_config_changed(&self, changed_keys: &[String]) {
        if self.is_shut_down() {
            return;
        }

        let mut bind_error = None;
        let reloaded = self.store.reload_then(self.source.as_ref(), |snapshot| {
            if let Err(e) = self.sender.bind(snapshot) {
                self.sender.invalidate();
                bind_error = Some(e);
            }
        });

        match reloaded {
            Ok(ReplaceOutcome::Unchanged) => {
                tracing::debug!(?changed_keys, "Configuration unchanged");
                counter!("mailcore_config_reloads_total", "result" => "unchanged").increment(1);
            }
            Ok(ReplaceOutcome::Replaced {
                snapshot,
                generation,
            }) => {
                if let Some(e) = bind_error {
                    tracing::error!(error = %e, "Failed to build transport for new configuration");
                    self.sink
                        .emit(HostEvent::error(codes::ERROR_CONFIG, e.to_string()));
                }

                tracing::info!(
                    ?changed_keys,
                    endpoint = %snapshot.endpoint(),
                    generation,
                    "Configuration replaced"
                );
                self.sink.emit(HostEvent::info(
                    codes::NEW_CONFIG,
                    format!(
                        "Mail configuration {} applied for {}",
                        generation,
                        snapshot.endpoint()
                    ),
                ));
                counter!("mailcore_config_reloads_total", "result" => "replaced").increment(1);
            }
            Err(e) => {
                tracing::warn!(?changed_keys, error = %e, "Rejected configuration change");
                self.sink
                    .emit(HostEvent::error(codes::ERROR_CONFIG, e.to_string()));
                counter!("mailcore_config_reloads_total", "result" => "invalid").increment(1);
            }
        }
    }

    /// Dispatch one request batch, filling every result slot
    pub async fn on_request_batch(&self, batch: &mut [CommandEnvelope]) -> BatchResult {
        if self.is_shut_down() {
            tracing::warn!(commands = batch.len(), "Request batch after shutdown");
            for envelope in batch.iter_mut() {
                envelope.result = Some(CommandResult::new(
                    ResultCode::Fail,
                    format!("Command '{}' not processed: mail extension is shut down", envelope.name),
                ));
            }
            return BatchResult::from_envelopes(batch).failed_outright();
        }

        self.dispatcher.dispatch(batch).await
    }

    /// Release every listener and the cached transport. Safe to call twice.
    pub fn on_shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let released: Vec<Registration> = self.registrations.lock().drain(..).collect();
        let count = released.len();
        drop(released);
        self.sender.invalidate();

        tracing::info!(listeners = count, "Mail extension shut down");
        self.sink.emit(HostEvent::info(
            codes::MESSAGE_SHUTDOWN,
            "Mail extension shut down",
        ));
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn sender(&self) -> &Arc<MailSender> {
        &self.sender
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }
}
