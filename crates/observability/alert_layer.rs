use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

use super::{config::ServiceContext, discord::DiscordAlertSink};

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone)]
pub(crate) struct AlertEvent {
    pub(crate) level: Level,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) service: ServiceContext,
    pub(crate) target: String,
    pub(crate) location: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) fields: BTreeMap<String, String>,
    pub(crate) spans: Vec<String>,
}

/// Forwards events to the Discord sink. Level filtering is applied by the caller.
pub(crate) struct AlertLayer {
    sink: DiscordAlertSink,
    service: ServiceContext,
}

impl AlertLayer {
    pub(crate) fn new(sink: DiscordAlertSink, service: ServiceContext) -> Self {
        Self { sink, service }
    }
}

#[derive(Default)]
struct RedactingVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl RedactingVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
            return;
        }
        let value = if is_sensitive_field(field.name()) {
            REDACTED.to_string()
        } else {
            value
        };
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for RedactingVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = RedactingVisitor::default();
        event.record(&mut visitor);

        let spans = ctx
            .event_span(event)
            .map(|span| {
                span.scope()
                    .from_root()
                    .map(|s| s.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        self.sink.try_send(AlertEvent {
            level: *metadata.level(),
            timestamp: Utc::now(),
            service: self.service.clone(),
            target: metadata.target().to_string(),
            location: metadata
                .file()
                .zip(metadata.line())
                .map(|(file, line)| format!("{file}:{line}")),
            message: visitor.message,
            fields: visitor.fields,
            spans,
        });
    }
}

pub(crate) fn is_sensitive_field(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["secret", "token", "authorization", "password", "webhook", "billing_key"]
        .iter()
        .any(|needle| name.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_credentials_are_sensitive() {
        assert!(is_sensitive_field("billing_key"));
        assert!(is_sensitive_field("TOSS_SECRET_KEY"));
        assert!(is_sensitive_field("internal_token"));
        assert!(is_sensitive_field("authorization"));
        assert!(is_sensitive_field("discord_webhook_url"));
    }

    #[test]
    fn billing_identifiers_stay_visible() {
        assert!(!is_sensitive_field("subscription_id"));
        assert!(!is_sensitive_field("order_id"));
        assert!(!is_sensitive_field("retry_count"));
    }
}
