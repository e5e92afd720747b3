//! Custom tracing layer that mirrors selected events onto the coordinator's
//! event broadcast channel, so `/events` subscribers see worker log lines
//! alongside debug-CPU/GPU/HID events (SPEC_FULL §10.2).

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::coordinator::VmEvent;

pub struct EventBroadcastLayer {
    events: tokio::sync::broadcast::Sender<VmEvent>,
}

impl EventBroadcastLayer {
    pub fn new(events: tokio::sync::broadcast::Sender<VmEvent>) -> Self {
        Self { events }
    }
}

impl<S> Layer<S> for EventBroadcastLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = match *event.metadata().level() {
            Level::ERROR => "error",
            Level::WARN => "warn",
            Level::INFO => "info",
            Level::DEBUG => "debug",
            Level::TRACE => "debug",
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let Some(msg) = visitor.into_text() else { return };

        let target = event.metadata().target();
        let source = if target.starts_with("vm_cpu") {
            "cpu"
        } else if target.starts_with("vm_gpu") {
            "gpu"
        } else if target.starts_with("vm_io") {
            "io"
        } else if target.starts_with("vm_hid") {
            "hid"
        } else {
            "vmctl"
        };

        // No subscribers yet is not an error: events are best-effort.
        let _ = self.events.send(VmEvent::LogLine {
            level: level.to_string(),
            source: source.to_string(),
            msg,
            ts_ms: chrono::Utc::now().timestamp_millis(),
        });
    }
}

/// Pulls the primary `message` field out of an event, falling back to the
/// first other field recorded (e.g. `tracing::warn!(%err, "...")` calls
/// that carry structured context alongside or instead of a message).
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fallback: Option<String>,
}

impl MessageVisitor {
    fn into_text(self) -> Option<String> {
        self.message.or(self.fallback)
    }

    fn record(&mut self, field: &tracing::field::Field, text: String) {
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.fallback.get_or_insert(text);
        }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record(field, value.to_owned());
    }
}
