//! `[DS]` diagnostic channel: session lifecycle steps mirrored to the client console.

use serde_json::Value;

use crate::dap::protocol::{Event, OutputCategory};

const PREFIX: &str = "[DS] ";

#[derive(Debug, Clone, PartialEq)]
pub enum DiagMessage {
    Text(String),
    Structured(Value),
}

impl DiagMessage {
    pub fn render(&self) -> String {
        match self {
            DiagMessage::Text(text) => text.clone(),
            DiagMessage::Structured(Value::String(text)) => text.clone(),
            DiagMessage::Structured(value @ (Value::Object(_) | Value::Array(_))) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            DiagMessage::Structured(value) => value.to_string(),
        }
    }
}

impl From<&str> for DiagMessage {
    fn from(text: &str) -> Self {
        DiagMessage::Text(text.to_string())
    }
}

impl From<String> for DiagMessage {
    fn from(text: String) -> Self {
        DiagMessage::Text(text)
    }
}

impl From<Value> for DiagMessage {
    fn from(value: Value) -> Self {
        DiagMessage::Structured(value)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Diagnostics {
    enabled: bool,
}

impl Diagnostics {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Output event for `message`, `None` while the channel is disabled.
    pub fn event(&self, message: &DiagMessage) -> Option<Event> {
        self.enabled.then(|| {
            Event::output(
                OutputCategory::Console,
                format!("{PREFIX}{}\n", message.render()),
            )
        })
    }
}
