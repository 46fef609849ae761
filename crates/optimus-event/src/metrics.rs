use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

#[derive(Debug, Clone)]
pub struct EventMetrics {
    published: IntCounterVec,
    dropped: IntCounter,
}

impl EventMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let published = IntCounterVec::new(
            Opts::new(
                "optimus_events_published_total",
                "Events accepted for delivery, by event type.",
            ),
            &["event_type"],
        )?;
        let dropped = IntCounter::with_opts(Opts::new(
            "optimus_events_dropped_total",
            "Events lost to encoding, delivery or shutdown failures.",
        ))?;
        registry.register(Box::new(published.clone()))?;
        registry.register(Box::new(dropped.clone()))?;

        Ok(Self { published, dropped })
    }

    pub(crate) fn published(&self, event_type: &str) {
        self.published.with_label_values(&[event_type]).inc();
    }

    pub(crate) fn dropped(&self, count: u64) {
        self.dropped.inc_by(count);
    }

    pub fn published_count(&self, event_type: &str) -> u64 {
        self.published.with_label_values(&[event_type]).get()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.get()
    }
}
