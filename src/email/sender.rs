//! Mail sender bound to the live settings snapshot

use super::provider::{DeliveryError, MailTransport, TransportFactory};
use super::templates::BodyFormatter;
use crate::domain::{ConfigSnapshot, MailRequest, SendOutcome};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    Message,
};
use metrics::counter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct CachedTransport {
    snapshot: Arc<ConfigSnapshot>,
    transport: Arc<dyn MailTransport>,
}

/// Sends mail requests through a transport built from a snapshot.
///
/// One transport is cached per snapshot identity (`Arc` pointer). A send
/// with a different snapshot rebuilds the transport and replaces the cache
/// entry, so rotated credentials are never paired with an old transport.
pub struct MailSender {
    factory: Arc<dyn TransportFactory>,
    formatter: Arc<dyn BodyFormatter>,
    cached: Mutex<Option<CachedTransport>>,
    builds: AtomicU64,
}

impl MailSender {
    pub fn new(factory: Arc<dyn TransportFactory>, formatter: Arc<dyn BodyFormatter>) -> Self {
        Self {
            factory,
            formatter,
            cached: Mutex::new(None),
            builds: AtomicU64::new(0),
        }
    }

    /// Build and cache the transport for `snapshot` unless it is already cached
    pub fn bind(&self, snapshot: &Arc<ConfigSnapshot>) -> Result<(), DeliveryError> {
        self.transport_for(snapshot).map(|_| ())
    }

    /// Drop the cached transport
    pub fn invalidate(&self) {
        self.cached.lock().take();
    }

    /// Number of transports built since construction
    pub fn transport_builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn is_bound_to(&self, snapshot: &Arc<ConfigSnapshot>) -> bool {
        self.cached
            .lock()
            .as_ref()
            .map(|cached| Arc::ptr_eq(&cached.snapshot, snapshot))
            .unwrap_or(false)
    }

    /// Send one mail with the given snapshot. Never touches the config store.
    pub async fn send(&self, snapshot: &Arc<ConfigSnapshot>, request: &MailRequest) -> SendOutcome {
        let outcome = match self.build_message(request) {
            Ok(message) => match self.transport_for(snapshot) {
                Ok(transport) => match transport.send(message).await {
                    Ok(()) => SendOutcome::Delivered,
                    Err(e) => e.into_outcome(),
                },
                Err(e) => e.into_outcome(),
            },
            Err(e) => e.into_outcome(),
        };

        counter!("mailcore_mail_sends_total", "outcome" => outcome.label()).increment(1);
        tracing::debug!(
            endpoint = %snapshot.endpoint(),
            outcome = outcome.label(),
            "Mail send finished"
        );

        outcome
    }

    fn transport_for(
        &self,
        snapshot: &Arc<ConfigSnapshot>,
    ) -> Result<Arc<dyn MailTransport>, DeliveryError> {
        let mut cached = self.cached.lock();

        if let Some(entry) = cached.as_ref() {
            if Arc::ptr_eq(&entry.snapshot, snapshot) {
                return Ok(Arc::clone(&entry.transport));
            }
        }

        let transport = self.factory.build(snapshot)?;
        self.builds.fetch_add(1, Ordering::Relaxed);
        counter!("mailcore_transport_builds_total").increment(1);
        tracing::info!(endpoint = %snapshot.endpoint(), "Mail transport rebuilt");

        *cached = Some(CachedTransport {
            snapshot: Arc::clone(snapshot),
            transport: Arc::clone(&transport),
        });

        Ok(transport)
    }

    /// Build the MIME message.
    ///
    /// Text plus HTML becomes multipart/alternative; a single body becomes a
    /// single part. Address and rendering problems are rejections.
    fn build_message(&self, request: &MailRequest) -> Result<Message, DeliveryError> {
        let from: Mailbox = request.from.trim().parse().map_err(|e| {
            DeliveryError::Rejected(vec![format!("Invalid from address '{}': {}", request.from, e)])
        })?;

        let recipients = request.recipients();
        if recipients.is_empty() {
            return Err(DeliveryError::Rejected(vec![
                "No recipients specified".to_string(),
            ]));
        }

        let mut builder = Message::builder().from(from).subject(request.subject.as_str());
        for address in recipients {
            let mailbox: Mailbox = address.parse().map_err(|e| {
                DeliveryError::Rejected(vec![format!("Invalid to address '{}': {}", address, e)])
            })?;
            builder = builder.to(mailbox);
        }

        let html_body = request
            .html_body()
            .map(|html| self.formatter.render_html(html))
            .transpose()
            .map_err(|e| DeliveryError::Rejected(vec![e.to_string()]))?;

        let message = match (request.text_body(), html_body) {
            (Some(text), Some(html)) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            ),
            (None, Some(html)) => builder.header(ContentType::TEXT_HTML).body(html),
            (_, None) => builder
                .header(ContentType::TEXT_PLAIN)
                .body(request.body_text.clone()),
        };

        message.map_err(|e| DeliveryError::Rejected(vec![format!("Failed to build message: {}", e)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::provider::{MockMailTransport, MockTransportFactory};
    use crate::email::templates::{PassthroughFormatter, TemplateEngine};

    fn snapshot() -> Arc<ConfigSnapshot> {
        Arc::new(ConfigSnapshot::new("localhost", 1025, false, "", ""))
    }

    fn request() -> MailRequest {
        MailRequest::new("a@x.com", "b@x.com", "hi", "text")
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8_lossy(&message.formatted()).to_string()
    }

    fn factory_with<F>(builds: usize, send: F) -> MockTransportFactory
    where
        F: Fn(&Message) -> Result<(), DeliveryError> + Send + Sync + Clone + 'static,
    {
        let mut factory = MockTransportFactory::new();
        factory.expect_build().times(builds).returning(move |_| {
            let send = send.clone();
            let mut transport = MockMailTransport::new();
            transport
                .expect_send()
                .returning(move |message| send(&message));
            Ok(Arc::new(transport) as Arc<dyn MailTransport>)
        });
        factory
    }

    fn sender(factory: MockTransportFactory) -> MailSender {
        MailSender::new(Arc::new(factory), Arc::new(PassthroughFormatter))
    }

    #[tokio::test]
    async fn test_send_delivered() {
        let sender = sender(factory_with(1, |_| Ok(())));
        let outcome = sender.send(&snapshot(), &request()).await;
        assert_eq!(outcome, SendOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_transport_is_cached_per_snapshot() {
        let sender = sender(factory_with(2, |_| Ok(())));
        let first = snapshot();

        sender.bind(&first).unwrap();
        assert!(sender.is_bound_to(&first));
        sender.send(&first, &request()).await;
        sender.send(&first, &request()).await;
        assert_eq!(sender.transport_builds(), 1);

        // Equal contents but a different snapshot identity rebuilds
        let second = snapshot();
        sender.send(&second, &request()).await;
        assert_eq!(sender.transport_builds(), 2);
        assert!(sender.is_bound_to(&second));
        assert!(!sender.is_bound_to(&first));
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let sender = sender(factory_with(2, |_| Ok(())));
        let snapshot = snapshot();

        sender.bind(&snapshot).unwrap();
        sender.invalidate();
        assert!(!sender.is_bound_to(&snapshot));
        sender.bind(&snapshot).unwrap();
        assert_eq!(sender.transport_builds(), 2);
    }

    #[tokio::test]
    async fn test_rejection_keeps_diagnostics() {
        let sender = sender(factory_with(1, |_| {
            Err(DeliveryError::Rejected(vec![
                "mailbox unavailable".to_string(),
                "policy violation".to_string(),
            ]))
        }));

        let outcome = sender.send(&snapshot(), &request()).await;
        assert_eq!(
            outcome,
            SendOutcome::Rejected {
                diagnostics: vec![
                    "mailbox unavailable".to_string(),
                    "policy violation".to_string()
                ]
            }
        );
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let sender = sender(factory_with(1, |_| {
            Err(DeliveryError::ConnectionError("connection refused".to_string()))
        }));

        let outcome = sender.send(&snapshot(), &request()).await;
        assert!(matches!(outcome, SendOutcome::TransportError { detail } if detail.contains("connection refused")));
    }

    #[tokio::test]
    async fn test_factory_failure_is_transport_error() {
        let mut factory = MockTransportFactory::new();
        factory
            .expect_build()
            .returning(|_| Err(DeliveryError::InvalidConfiguration("bad host".to_string())));
        let sender = sender(factory);

        let outcome = sender.send(&snapshot(), &request()).await;
        assert!(matches!(outcome, SendOutcome::TransportError { .. }));
        assert_eq!(sender.transport_builds(), 0);
    }

    #[tokio::test]
    async fn test_invalid_address_never_reaches_transport() {
        let mut factory = MockTransportFactory::new();
        factory.expect_build().times(0);
        let sender = sender(factory);

        let request = MailRequest::new("not an address", "b@x.com", "hi", "text");
        match sender.send(&snapshot(), &request).await {
            SendOutcome::Rejected { diagnostics } => {
                assert_eq!(diagnostics.len(), 1);
                assert!(diagnostics[0].contains("Invalid from address"));
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }

        let request = MailRequest::new("a@x.com", "b@x.com; broken", "hi", "text");
        assert!(matches!(
            sender.send(&snapshot(), &request).await,
            SendOutcome::Rejected { .. }
        ));

        let request = MailRequest::new("a@x.com", " ; ", "hi", "text");
        assert!(matches!(
            sender.send(&snapshot(), &request).await,
            SendOutcome::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_text_and_html_is_multipart() {
        let sender = sender(factory_with(1, |message| {
            let raw = formatted(message);
            assert!(raw.contains("multipart/alternative"));
            assert!(raw.contains("text/plain"));
            assert!(raw.contains("text/html"));
            Ok(())
        }));

        let request = request().with_html_body("<p>text</p>");
        assert!(sender.send(&snapshot(), &request).await.is_delivered());
    }

    #[tokio::test]
    async fn test_text_only_is_single_part() {
        let sender = sender(factory_with(1, |message| {
            let raw = formatted(message);
            assert!(!raw.contains("multipart"));
            assert!(raw.contains("text/plain"));
            Ok(())
        }));

        let request = request().with_html_body("");
        assert!(sender.send(&snapshot(), &request).await.is_delivered());
    }

    #[tokio::test]
    async fn test_html_only_is_single_part() {
        let sender = sender(factory_with(1, |message| {
            let raw = formatted(message);
            assert!(!raw.contains("multipart"));
            assert!(raw.contains("text/html"));
            Ok(())
        }));

        let request = MailRequest::new("a@x.com", "b@x.com", "hi", "").with_html_body("<p>hi</p>");
        assert!(sender.send(&snapshot(), &request).await.is_delivered());
    }

    #[tokio::test]
    async fn test_multiple_recipients() {
        let sender = sender(factory_with(1, |message| {
            assert_eq!(message.envelope().to().len(), 2);
            Ok(())
        }));

        let request = MailRequest::new("a@x.com", "b@x.com, c@x.com", "hi", "text");
        assert!(sender.send(&snapshot(), &request).await.is_delivered());
    }

    #[tokio::test]
    async fn test_formatter_renders_html() {
        let mut engine = TemplateEngine::new();
        engine.set("line", "Line 3");

        let factory = factory_with(1, |message| {
            assert!(formatted(message).contains("Line 3 stopped"));
            Ok(())
        });
        let sender = MailSender::new(Arc::new(factory), Arc::new(engine));

        let request = request().with_html_body("<p>{{line}} stopped</p>");
        assert!(sender.send(&snapshot(), &request).await.is_delivered());
    }

    #[tokio::test]
    async fn test_formatter_failure_is_rejection() {
        let mut factory = MockTransportFactory::new();
        factory.expect_build().times(0);
        let sender = MailSender::new(Arc::new(factory), Arc::new(TemplateEngine::new().strict()));

        let request = request().with_html_body("<p>{{missing}}</p>");
        match sender.send(&snapshot(), &request).await {
            SendOutcome::Rejected { diagnostics } => {
                assert_eq!(diagnostics, vec!["Unresolved template variable 'missing'"]);
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }
}
