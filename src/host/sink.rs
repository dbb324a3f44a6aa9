//! Event sink implementations

use super::{EventSink, HostEvent, Severity};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Forwards host events into `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: HostEvent) {
        match event.severity {
            Severity::Info => {
                tracing::info!(code = event.code, detail = %event.detail, "host event")
            }
            Severity::Warning => {
                tracing::warn!(code = event.code, detail = %event.detail, "host event")
            }
            Severity::Error => {
                tracing::error!(code = event.code, detail = %event.detail, "host event")
            }
        }
    }
}

/// Forwards host events into a bounded channel.
///
/// A full or closed channel drops the event instead of waiting.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<HostEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<HostEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of events dropped because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: HostEvent) {
        if let Err(err) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %err, "Dropping host event");
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<HostEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    /// Details of all events with the given code, in emission order
    pub fn details(&self, code: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.code == code)
            .map(|event| event.detail.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: HostEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::codes;

    #[test]
    fn test_memory_sink_filters_by_code() {
        let sink = MemorySink::new();
        sink.emit(HostEvent::error(codes::ERROR_MAIL, "first"));
        sink.emit(HostEvent::info(codes::NEW_CONFIG, ""));
        sink.emit(HostEvent::error(codes::ERROR_MAIL, "second"));

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.details(codes::ERROR_MAIL), vec!["first", "second"]);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.emit(HostEvent::info(codes::MESSAGE_INIT, ""));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.code, codes::MESSAGE_INIT);
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, _rx) = ChannelSink::new(1);
        sink.emit(HostEvent::info(codes::MESSAGE_INIT, ""));
        sink.emit(HostEvent::info(codes::NEW_CONFIG, ""));
        sink.emit(HostEvent::info(codes::MESSAGE_SHUTDOWN, ""));

        assert_eq!(sink.dropped(), 2);
    }

    #[test]
    fn test_channel_sink_drops_when_closed() {
        let (sink, rx) = ChannelSink::new(4);
        drop(rx);
        sink.emit(HostEvent::info(codes::MESSAGE_INIT, ""));
        assert_eq!(sink.dropped(), 1);
    }
}
