use crate::record::{Level, LogRecord, Metadata};
use crate::shipper::Shipper;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate's own modules are never forwarded.
const OWN_TARGET: &str = "tracing_log_shipper";

/// `tracing_subscriber` layer that turns `tracing` events into
/// [`LogRecord`]s and hands them to a [`Shipper`].
///
/// The event's `message` becomes the record message, every other field
/// lands in the record metadata and the event target is added as a tag.
/// `TRACE` maps to [`Level::Debug`] and `WARN` to [`Level::Warning`].
pub struct ShipperLayer {
    shipper: Arc<Shipper>,
    min_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Handed to the shipper.
    pub forwarded_events: Arc<AtomicU64>,
    /// Refused by the shipper (unknown template).
    pub rejected_events: Arc<AtomicU64>,
}

impl ShipperLayer {
    pub fn new(shipper: Arc<Shipper>, min_level: Level) -> Self {
        Self {
            shipper,
            min_level,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
            rejected_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

pub(crate) fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE | tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO => Level::Info,
        tracing::Level::WARN => Level::Warning,
        tracing::Level::ERROR => Level::Error,
    }
}

impl<S> Layer<S> for ShipperLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET) {
            return;
        }
        let level = map_level(meta.level());
        if level < self.min_level {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record =
            LogRecord::new(visitor.message.unwrap_or_default()).with_tag(meta.target());
        if !visitor.metadata.is_empty() {
            record = record.with_metadata(visitor.metadata);
        }

        match self.shipper.log(level, record) {
            Ok(()) => {
                self.forwarded_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.rejected_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    metadata: Metadata,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.metadata.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, Value::String(format!("{:?}", value)));
        }
    }
}
