//! JSON records for the file sink
//!
//! One object per line with `timestamp`, `level`, `target`, `message`,
//! `caller`, the event's own fields, and one key per field attached through
//! [`Logger::with`](super::Logger::with). `level` is the [`Severity`] label,
//! so panic and fatal records read `PANIC` / `FATAL` rather than `ERROR`.

use super::severity::Severity;
use super::TIME_FORMAT;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Fields attached to a logger, already sanitized
pub(crate) type Fields = Arc<Vec<(String, String)>>;

/// Console-only rendering of [`Fields`]
pub(crate) const CONTEXT_FIELD: &str = "context";
/// Console-only severity label on panic and fatal events
pub(crate) const SEVERITY_FIELD: &str = "severity";

thread_local! {
    static SCOPED_FIELDS: RefCell<Option<Fields>> = const { RefCell::new(None) };
}

/// Run `f` with `fields` visible to [`JsonFormat`] on this thread
///
/// Formatting happens synchronously inside the event dispatch, so the
/// formatter sees exactly the fields of the logger that emitted the event.
pub(crate) fn scoped<R>(fields: &Fields, f: impl FnOnce() -> R) -> R {
    let previous = SCOPED_FIELDS.with(|slot| slot.replace(Some(fields.clone())));
    let _restore = Restore(previous);
    f()
}

struct Restore(Option<Fields>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        let _ = SCOPED_FIELDS.try_with(|slot| *slot.borrow_mut() = previous);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JsonFormat;

impl<S, N> FormatEvent<S, N> for JsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut record = Map::new();
        record.insert(
            "timestamp".to_string(),
            Value::from(chrono::Local::now().format(TIME_FORMAT).to_string()),
        );
        record.insert(
            "level".to_string(),
            Value::from(Severity::of(metadata).as_str().to_ascii_uppercase()),
        );
        record.insert("target".to_string(), Value::from(metadata.target()));

        event.record(&mut JsonVisitor(&mut record));

        SCOPED_FIELDS.with(|slot| {
            if let Some(fields) = slot.borrow().as_ref() {
                for (key, value) in fields.iter() {
                    // Built-in keys win over attached ones
                    record
                        .entry(key.clone())
                        .or_insert_with(|| Value::from(value.as_str()));
                }
            }
        });

        let line = serde_json::to_string(&record).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl JsonVisitor<'_> {
    fn insert(&mut self, field: &Field, value: Value) {
        match field.name() {
            CONTEXT_FIELD | SEVERITY_FIELD => {}
            name => {
                self.0.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for JsonVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{value:?}")));
    }
}
