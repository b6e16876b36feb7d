//! Custom tracing layer for JSONL output.
//!
//! Produces one JSON object per event on stderr. Correlation fields
//! (`run_id`, `iteration`, `stage`, `site`, `analyzer`) are lifted out of the
//! enclosing spans, or out of the event itself, to the top level.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

/// Correlation fields carried by spans.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    iteration: Option<u64>,
    stage: Option<String>,
    site: Option<String>,
    analyzer: Option<String>,
}

impl SpanContext {
    /// Fill unset fields from `outer`; inner spans win.
    fn inherit(&mut self, outer: &SpanContext) {
        if self.run_id.is_none() {
            self.run_id.clone_from(&outer.run_id);
        }
        if self.iteration.is_none() {
            self.iteration = outer.iteration;
        }
        if self.stage.is_none() {
            self.stage.clone_from(&outer.stage);
        }
        if self.site.is_none() {
            self.site.clone_from(&outer.site);
        }
        if self.analyzer.is_none() {
            self.analyzer.clone_from(&outer.analyzer);
        }
    }

    fn set_str(&mut self, name: &str, value: String) -> bool {
        match name {
            "run_id" => self.run_id = Some(value),
            "stage" => self.stage = Some(value),
            "site" => self.site = Some(value),
            "analyzer" => self.analyzer = Some(value),
            _ => return false,
        }
        true
    }
}

/// A visitor that extracts field values from tracing events.
struct JsonFieldVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
    message: Option<String>,
    context: SpanContext,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        JsonFieldVisitor {
            fields: serde_json::Map::new(),
            message: None,
            context: SpanContext::default(),
        }
    }

    fn record_string(&mut self, name: &str, value: String) {
        if name == "message" {
            self.message = Some(value);
        } else if !self.context.set_str(name, value.clone()) {
            self.fields
                .insert(name.to_string(), serde_json::Value::String(value));
        }
    }
}

impl tracing::field::Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record_string(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.record_string(field.name(), format!("{:?}", value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        if field.name() == "iteration" {
            self.context.iteration = Some(value);
            return;
        }
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(serde_json::Number::from(value)),
        );
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        // Non-finite scores are meaningful here; keep them as strings.
        let value = match serde_json::Number::from_f64(value) {
            Some(n) => serde_json::Value::Number(n),
            None => serde_json::Value::String(value.to_string()),
        };
        self.fields.insert(field.name().to_string(), value);
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

/// A visitor for extracting span context.
struct SpanContextVisitor {
    context: SpanContext,
}

impl tracing::field::Visit for SpanContextVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.context.set_str(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.context.set_str(field.name(), format!("{:?}", value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        if field.name() == "iteration" {
            self.context.iteration = Some(value);
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        if field.name() == "iteration" && value >= 0 {
            self.context.iteration = Some(value as u64);
        }
    }
}

/// JSONL tracing layer that outputs to stderr.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    /// Create a new JSONL layer writing to stderr.
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    /// Create a new JSONL layer with a custom writer.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = SpanContextVisitor {
            context: SpanContext::default(),
        };
        attrs.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.context);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let ts = Utc::now();

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        // Event fields first, then the innermost span outwards
        let mut context = visitor.context.clone();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_ctx) = span.extensions().get::<SpanContext>() {
                    context.inherit(span_ctx);
                }
            }
        }

        let level: Level = (*event.metadata().level()).into();
        let mut obj = serde_json::Map::new();

        obj.insert("ts".to_string(), serde_json::json!(ts.to_rfc3339()));
        obj.insert("level".to_string(), serde_json::json!(level));
        obj.insert(
            "event".to_string(),
            serde_json::json!(event.metadata().target()),
        );

        if let Some(id) = context.run_id {
            obj.insert("run_id".to_string(), serde_json::json!(id));
        }
        if let Some(i) = context.iteration {
            obj.insert("iteration".to_string(), serde_json::json!(i));
        }
        if let Some(s) = context.stage {
            obj.insert("stage".to_string(), serde_json::json!(s));
        }
        if let Some(s) = context.site {
            obj.insert("site".to_string(), serde_json::json!(s));
        }
        if let Some(a) = context.analyzer {
            obj.insert("analyzer".to_string(), serde_json::json!(a));
        }
        if let Some(msg) = visitor.message {
            obj.insert("message".to_string(), serde_json::json!(msg));
        }
        if !visitor.fields.is_empty() {
            obj.insert(
                "fields".to_string(),
                serde_json::Value::Object(visitor.fields),
            );
        }

        let json = serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct BufWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn make_buffer_layer() -> (Arc<Mutex<Vec<u8>>>, JsonlLayer<BufWriter>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(BufWriter(buffer.clone()));
        (buffer, layer)
    }

    fn single_line(buffer: &Arc<Mutex<Vec<u8>>>) -> serde_json::Value {
        let output = buffer.lock().unwrap();
        let json_str = String::from_utf8_lossy(&output);
        serde_json::from_str(json_str.trim()).unwrap()
    }

    #[test]
    fn test_jsonl_layer_output() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "run.started", message = "starting iteration");
        });

        let parsed = single_line(&buffer);
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "run.started");
        assert_eq!(parsed["message"], "starting iteration");
        assert!(parsed.get("ts").is_some());
    }

    #[test]
    fn span_fields_are_lifted() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let outer = tracing::info_span!("iteration", run_id = "run-1", iteration = 2u64);
            let _o = outer.enter();
            let inner = tracing::info_span!("analyzer", site = "Namawala", analyzer = "incidence", stage = "apply");
            let _i = inner.enter();
            tracing::warn!(target: "apply.failed", sim_id = "sim-4", message = "missing file");
        });

        let parsed = single_line(&buffer);
        assert_eq!(parsed["run_id"], "run-1");
        assert_eq!(parsed["iteration"], 2);
        assert_eq!(parsed["stage"], "apply");
        assert_eq!(parsed["site"], "Namawala");
        assert_eq!(parsed["analyzer"], "incidence");
        assert_eq!(parsed["fields"]["sim_id"], "sim-4");
    }

    #[test]
    fn event_site_overrides_span() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("site", site = "Outer");
            let _g = span.enter();
            tracing::info!(target: "site.ready", site = "Inner", message = "ready");
        });

        let parsed = single_line(&buffer);
        assert_eq!(parsed["site"], "Inner");
        assert!(parsed.get("fields").is_none());
    }

    #[test]
    fn layer_records_extra_fields() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "combine.finished", samples = 42, complete = true, message = "hi");
        });

        let parsed = single_line(&buffer);
        assert_eq!(parsed["fields"]["samples"], 42);
        assert_eq!(parsed["fields"]["complete"], true);
    }

    #[test]
    fn non_finite_scores_are_kept() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "finalize.degenerate", score = f64::NEG_INFINITY, message = "degenerate");
        });

        let parsed = single_line(&buffer);
        assert_eq!(parsed["fields"]["score"], "-inf");
    }
}
