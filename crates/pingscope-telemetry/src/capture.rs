use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// A log event held by [`MemoryLogSink`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub client_id: Option<String>,
}

impl LogRecord {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Filters for [`MemoryLogSink::query`]. Unset filters match everything.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    /// Exact level, case-insensitive ("ERROR", "info", ...).
    pub level: Option<String>,
    /// Substring of the event target.
    pub target: Option<String>,
    pub client_id: Option<String>,
    /// Exact message text.
    pub message: Option<String>,
    pub limit: Option<usize>,
}

impl LogQuery {
    fn matches(&self, record: &LogRecord) -> bool {
        self.level
            .as_ref()
            .map_or(true, |l| record.level.eq_ignore_ascii_case(l))
            && self
                .target
                .as_ref()
                .map_or(true, |t| record.target.contains(t.as_str()))
            && self
                .client_id
                .as_ref()
                .map_or(true, |c| record.client_id.as_deref() == Some(c.as_str()))
            && self
                .message
                .as_ref()
                .map_or(true, |m| record.message == *m)
    }
}

/// Bounded in-memory store of log records. Oldest records are evicted first.
pub struct MemoryLogSink {
    records: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
    next_id: AtomicI64,
}

impl MemoryLogSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
            next_id: AtomicI64::new(1),
        }
    }

    fn insert(&self, insert: LogInsert) {
        let record = LogRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: insert.timestamp,
            level: insert.level,
            target: insert.target,
            message: insert.message,
            fields: insert.fields,
            client_id: insert.client_id,
        };
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Matching records, newest first.
    pub fn query(&self, q: &LogQuery) -> Vec<LogRecord> {
        let records = self.records.lock();
        let limit = q.limit.unwrap_or(usize::MAX);
        records
            .iter()
            .rev()
            .filter(|r| q.matches(r))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

}

impl std::fmt::Debug for MemoryLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLogSink")
            .field("count", &self.count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

struct LogInsert {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: serde_json::Map<String, serde_json::Value>,
    client_id: Option<String>,
}

/// tracing Layer that copies every event it sees into a [`MemoryLogSink`].
pub struct MemoryLogLayer {
    sink: Arc<MemoryLogSink>,
}

impl MemoryLogLayer {
    pub fn new(sink: Arc<MemoryLogSink>) -> Self {
        Self { sink }
    }
}

struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    client_id: Option<String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: serde_json::Map::new(),
            client_id: None,
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(val),
            "client_id" => self.client_id = Some(val),
            name => {
                self.fields
                    .insert(name.to_string(), serde_json::Value::String(val));
            }
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "client_id" => self.client_id = Some(value.to_string()),
            name => {
                self.fields
                    .insert(name.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

/// Stored on spans so child events inherit the span's `client_id`.
struct SpanClient(String);

impl<S> Layer<S> for MemoryLogLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        if visitor.client_id.is_none() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope {
                    if let Some(client) = span.extensions().get::<SpanClient>() {
                        visitor.client_id = Some(client.0.clone());
                        break;
                    }
                }
            }
        }

        self.sink.insert(LogInsert {
            timestamp: Utc::now().to_rfc3339(),
            level: event.metadata().level().to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            client_id: visitor.client_id,
        });
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::new();
        attrs.record(&mut visitor);

        if let (Some(client_id), Some(span)) = (visitor.client_id, ctx.span(id)) {
            span.extensions_mut().insert(SpanClient(client_id));
        }
    }
}

/// A subscriber that records everything into a fresh sink.
///
/// Meant for `tracing::subscriber::set_default` in tests; events from other
/// threads are only seen if they run under the same default.
pub fn capture_subscriber(
    capacity: usize,
) -> (impl tracing::Subscriber + Send + Sync, Arc<MemoryLogSink>) {
    let sink = Arc::new(MemoryLogSink::new(capacity));
    let subscriber =
        tracing_subscriber::registry().with(MemoryLogLayer::new(Arc::clone(&sink)));
    (subscriber, sink)
}
