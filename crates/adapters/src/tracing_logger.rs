//! `LoggerPort` adapter that forwards events to `tracing`.

use serde_json::Value;
use vault_sync_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use vault_sync_shared::{REDACTED, is_secret_key};

/// Forwards engine events to the active `tracing` subscriber.
///
/// Structured fields are flattened into a single `fields` JSON string so the
/// subscriber's formatter decides the final layout.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    base_fields: LogFields,
}

impl TracingLogger {
    /// Logger with no base fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoggerPort for TracingLogger {
    fn log(&self, event: LogEvent) {
        let mut fields = self.base_fields.clone();
        fields.extend(event.fields.unwrap_or_default());
        let fields = render_fields(&fields);
        let error = event.error.map(|error| error.to_string()).unwrap_or_default();
        let name = event.event.as_ref();
        let message = event.message.as_ref();

        match event.level {
            LogLevel::Debug => {
                tracing::debug!(event = name, fields = %fields, error = %error, "{message}");
            },
            LogLevel::Info => {
                tracing::info!(event = name, fields = %fields, error = %error, "{message}");
            },
            LogLevel::Warn => {
                tracing::warn!(event = name, fields = %fields, error = %error, "{message}");
            },
            LogLevel::Error => {
                tracing::error!(event = name, fields = %fields, error = %error, "{message}");
            },
        }
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut merged = self.base_fields.clone();
        merged.extend(fields);
        Box::new(Self {
            base_fields: merged,
        })
    }
}

fn render_fields(fields: &LogFields) -> String {
    let map = fields
        .iter()
        .map(|(key, value)| {
            let value = if is_secret_key(key) {
                Value::from(REDACTED)
            } else {
                value.clone()
            };
            (key.to_string(), value)
        })
        .collect::<serde_json::Map<_, _>>();
    Value::Object(map).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_sync_ports::log_fields;

    #[test]
    fn rendered_fields_hide_secrets() {
        let rendered = render_fields(&log_fields([("token", "abc"), ("pending", "3")]));
        assert_eq!(rendered, r#"{"pending":"3","token":"[REDACTED]"}"#);
    }

    #[test]
    fn child_accumulates_fields_without_subscriber() {
        let logger = TracingLogger::new().child(log_fields([("component", "watcher")]));
        logger.info("sync.watch.start", "watching", None);
    }
}
