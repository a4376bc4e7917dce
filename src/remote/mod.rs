//! Remote side of the bridge: the engine debugger connection.
//!
//! [`RemoteDebugClient`] is the seam between the session controller and a concrete remote
//! protocol implementation. Every operation that needs the engine to answer returns a
//! [`Pending`] result that is observed later from the event loop; queries that are answered
//! from locally mirrored engine state (scripts, breakpoints, sources) return immediately.

pub mod jerry;
mod pending;

use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub use pending::{pending, Completer, Completion, Pending};

/// Remote-assigned identifier of a parsed script.
pub type ScriptId = u32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("not connected to the debug server")]
    NotConnected,
    /// The engine (or the protocol handler on its behalf) refused the operation.
    #[error("{0}")]
    Rejected(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        RemoteError::Connection(err.to_string())
    }
}

impl From<tungstenite::Error> for RemoteError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Io(err) => err.into(),
            tungstenite::Error::Capacity(err) => RemoteError::Protocol(err.to_string()),
            tungstenite::Error::Protocol(err) => RemoteError::Protocol(err.to_string()),
            err => RemoteError::Connection(err.to_string()),
        }
    }
}

/// Network location of the remote debug server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub address: String,
    pub port: u16,
}

impl Display for RemoteTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Remote identity of a single breakpoint location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointHandle {
    pub script_id: ScriptId,
    pub line: u32,
    /// Compressed pointer of the byte code that owns the location.
    pub byte_code_cp: u32,
    pub offset: u32,
}

/// One frame of a remote backtrace, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceFrame {
    pub function_name: Option<String>,
    pub source_name: Option<String>,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalSubtype {
    Ok,
    Error,
    Other(u8),
}

impl From<u8> for EvalSubtype {
    fn from(value: u8) -> Self {
        match value {
            1 => EvalSubtype::Ok,
            2 => EvalSubtype::Error,
            other => EvalSubtype::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalResult {
    pub subtype: EvalSubtype,
    pub value: String,
}

/// Notifications raised by the remote engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    BreakpointHit,
    ExceptionHit { message: String },
    Resumed,
    ScriptParsed { id: ScriptId, name: Option<String> },
    Closed,
}

/// Everything a remote client feeds back into the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSignal {
    Connected,
    ConnectFailed(String),
    /// Raw protocol message, decoded on the loop thread by [`RemoteDebugClient::on_message`].
    Message(Vec<u8>),
    Event(RemoteEvent),
}

/// Delivery callback for [`RemoteSignal`]s; callable from transport threads.
pub type SignalSink = Arc<dyn Fn(RemoteSignal) + Send + Sync>;

pub trait RemoteDebugClient {
    /// Start connecting in the background. The outcome arrives as
    /// [`RemoteSignal::Connected`] or [`RemoteSignal::ConnectFailed`].
    fn connect(&mut self);

    /// Tear down the transport synchronously.
    fn disconnect(&mut self);

    /// Process one inbound protocol message.
    fn on_message(&mut self, message: &[u8]) -> Result<(), RemoteError>;

    fn resume(&mut self) -> Pending<()>;

    fn step_over(&mut self) -> Pending<()>;

    fn step_into(&mut self) -> Pending<()>;

    fn step_out(&mut self) -> Pending<()>;

    fn pause(&mut self) -> Pending<()>;

    fn script_id_by_name(&self, name: &str) -> Result<ScriptId, RemoteError>;

    /// Lines of `script_id` that currently carry an enabled breakpoint.
    fn active_breakpoint_lines(&self, script_id: ScriptId) -> Vec<u32>;

    fn find_breakpoint(&self, script_id: ScriptId, line: u32)
        -> Result<BreakpointHandle, RemoteError>;

    fn update_breakpoint(&mut self, breakpoint: &BreakpointHandle, enable: bool) -> Pending<()>;

    fn evaluate(&mut self, expression: &str) -> Pending<EvalResult>;

    fn backtrace(&mut self) -> Pending<Vec<BacktraceFrame>>;

    fn source(&self, script_id: ScriptId) -> Result<String, RemoteError>;
}
