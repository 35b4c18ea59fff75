//! Capture tracing events for assertions in tests.

use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::prelude::*;

/// A captured tracing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Events recorded by a [`CaptureLayer`].
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, level: Level, message: &str) -> bool {
        self.events()
            .iter()
            .any(|e| e.level == level && e.message.contains(message))
    }

    #[must_use]
    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message.contains(message))
            .collect()
    }

    /// Formatted events for assertion failure output.
    #[must_use]
    pub fn dump(&self) -> String {
        let events = self.events();
        if events.is_empty() {
            return "No logs captured".to_string();
        }
        events
            .iter()
            .map(|e| {
                let fields: Vec<String> = e.fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("[{}] {}: {} {}", e.level, e.target, e.message, fields.join(" "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct CaptureLayer {
    capture: LogCapture,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        struct Visitor {
            message: String,
            fields: Vec<(String, String)>,
        }

        impl tracing::field::Visit for Visitor {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = value.to_string();
                } else {
                    self.fields.push((field.name().to_string(), value.to_string()));
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                let value = format!("{value:?}");
                if field.name() == "message" {
                    self.message = value;
                } else {
                    self.fields.push((field.name().to_string(), value));
                }
            }
        }

        let mut visitor = Visitor {
            message: String::new(),
            fields: Vec::new(),
        };
        event.record(&mut visitor);
        let metadata = event.metadata();
        if let Ok(mut events) = self.capture.events.lock() {
            events.push(CapturedEvent {
                level: *metadata.level(),
                target: metadata.target().to_string(),
                message: visitor.message,
                fields: visitor.fields,
            });
        }
    }
}

/// Run `f` with every event at `level` or above captured on this thread.
pub fn capture<T>(level: Level, f: impl FnOnce() -> T) -> (T, LogCapture) {
    let capture = LogCapture::default();
    let layer = CaptureLayer {
        capture: capture.clone(),
    };
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .with(layer);
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, capture)
}
