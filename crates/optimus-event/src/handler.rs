use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::Event;
use crate::metrics::EventMetrics;

/// Producer side of the event pipeline. Cheap to clone; never blocks and
/// never fails the caller.
#[derive(Debug, Clone)]
pub struct EventHandler {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    metrics: EventMetrics,
}

impl EventHandler {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Vec<u8>>, metrics: EventMetrics) -> Self {
        Self {
            tx: Some(tx),
            metrics,
        }
    }

    /// A handler that discards every event.
    pub fn disabled(metrics: EventMetrics) -> Self {
        Self { tx: None, metrics }
    }

    pub fn handle_event(&self, event: &Event) {
        let Some(tx) = &self.tx else {
            debug!(event_type = event.kind().name(), "event publishing disabled");
            return;
        };

        let bytes = match event.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(event_id = %event.id(), error = %err, "dropping event");
                self.metrics.dropped(1);
                return;
            }
        };

        if tx.send(bytes).is_err() {
            warn!(event_id = %event.id(), "event worker is gone, dropping event");
            self.metrics.dropped(1);
            return;
        }
        self.metrics.published(event.kind().name());
    }
}
