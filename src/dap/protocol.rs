use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// DAP request envelope. Arguments stay raw until the request kind is known.
#[derive(Debug, Clone, Deserialize)]
pub struct DapRequest {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// DAP response envelope, `message` and `body` are left out when empty.
#[derive(Debug, Serialize)]
pub struct DapResponse {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// DAP event envelope.
#[derive(Debug, Serialize)]
pub struct DapEvent {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Response to a single request, before a sequence number is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request_seq: i64,
    pub command: String,
    pub success: bool,
    pub message: Option<String>,
    pub body: Option<Value>,
}

impl Response {
    pub fn success(request: &DapRequest, body: Option<Value>) -> Self {
        Self {
            request_seq: request.seq,
            command: request.command.clone(),
            success: true,
            message: None,
            body,
        }
    }

    pub fn error(request: &DapRequest, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            request_seq: request.seq,
            command: request.command.clone(),
            success: false,
            body: Some(json!({ "error": { "id": 0, "format": message } })),
            message: Some(message),
        }
    }

    pub fn into_envelope(self, seq: i64) -> DapResponse {
        DapResponse {
            seq,
            r#type: "response",
            request_seq: self.request_seq,
            success: self.success,
            command: self.command,
            message: self.message,
            body: self.body,
        }
    }
}

/// Event to the client, before a sequence number is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event: &'static str,
    pub body: Option<Value>,
}

impl Event {
    pub fn initialized() -> Self {
        Self {
            event: "initialized",
            body: None,
        }
    }

    pub fn stopped(reason: StoppedReason, thread_id: i64, text: Option<String>) -> Self {
        Self {
            event: "stopped",
            body: Some(to_body(&StoppedEventBody {
                reason,
                thread_id,
                text,
            })),
        }
    }

    pub fn continued(thread_id: i64) -> Self {
        Self {
            event: "continued",
            body: Some(to_body(&ContinuedEventBody { thread_id })),
        }
    }

    pub fn terminated() -> Self {
        Self {
            event: "terminated",
            body: None,
        }
    }

    pub fn output(category: OutputCategory, output: String) -> Self {
        Self {
            event: "output",
            body: Some(to_body(&OutputEventBody { category, output })),
        }
    }

    pub fn into_envelope(self, seq: i64) -> DapEvent {
        DapEvent {
            seq,
            r#type: "event",
            event: self.event,
            body: self.body,
        }
    }
}

/// Serialize a body type; body types are plain data and always serializable.
pub fn to_body<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or(Value::Null)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StoppedReason {
    Breakpoint,
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputCategory {
    Console,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoppedEventBody {
    reason: StoppedReason,
    thread_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContinuedEventBody {
    thread_id: i64,
}

#[derive(Debug, Serialize)]
struct OutputEventBody {
    category: OutputCategory,
    output: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: bool,
    pub supports_function_breakpoints: bool,
    pub supports_evaluate_for_hovers: bool,
    pub supports_step_back: bool,
    pub supports_restart_request: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    pub source: Source,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakpoint {
    pub verified: bool,
    pub line: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceBreakpoint {
    pub line: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub lines: Option<Vec<u32>>,
    #[serde(default)]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
}

impl SetBreakpointsArguments {
    /// Requested lines; the deprecated `lines` field wins when both are present.
    pub fn desired_lines(&self) -> Vec<u32> {
        match (&self.lines, &self.breakpoints) {
            (Some(lines), _) => lines.clone(),
            (None, Some(breakpoints)) => breakpoints.iter().map(|bp| bp.line).collect(),
            (None, None) => vec![],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateArguments {
    pub expression: String,
}
