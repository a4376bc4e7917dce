//! Debug session controller.
//!
//! A single event loop owns the controller and feeds it [`LoopEvent`]s: client requests from the
//! DAP reader thread and signals from the remote client of the current session. Remote
//! operations never block the loop; every request waiting for the engine is parked as an
//! [`InFlight`] continuation and settled by [`Controller::drive`] after each event.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use strum_macros::EnumString;

use super::breakpoints::{self, Reconciliation};
use super::bridge::{self, Bridged, THREAD_ID};
use super::diagnostics::{DiagMessage, Diagnostics};
use super::source::{self, SyncOutcome};
use super::{AttachArgs, LoopEvent, RemoteConnector, Session, SessionError};
use crate::dap::protocol::{
    to_body, Breakpoint, Capabilities, DapRequest, EvaluateArguments, Event, Response,
    SetBreakpointsArguments, Source, StackFrame, Thread,
};
use crate::dap::ClientSink;
use crate::remote::{
    BacktraceFrame, Completion, EvalResult, EvalSubtype, Pending, RemoteError, RemoteEvent,
    RemoteSignal, ScriptId, SignalSink,
};

/// Result shown to the client for an evaluation the engine reports as failed.
pub const EVALUATE_ERROR: &str = "Evaluate Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "camelCase")]
enum RequestKind {
    Initialize,
    Attach,
    Launch,
    Disconnect,
    Restart,
    ConfigurationDone,
    SetBreakpoints,
    Continue,
    Next,
    StepIn,
    StepOut,
    Pause,
    Evaluate,
    StackTrace,
    Threads,
    Scopes,
    Variables,
}

/// How a request handler answered.
enum Reply {
    Respond(Option<Value>),
    /// The handler already responded.
    Sent,
    /// Answered later from [`Controller::drive`], or never.
    Deferred,
}

/// Request waiting for the remote engine.
enum InFlight {
    Command {
        request: DapRequest,
        ack: Pending<()>,
    },
    Evaluate {
        request: DapRequest,
        result: Pending<EvalResult>,
    },
    StackTrace {
        request: DapRequest,
        local_root: PathBuf,
        frames: Pending<Vec<BacktraceFrame>>,
    },
    Breakpoints {
        request: DapRequest,
        sync: Reconciliation,
    },
}

enum Outcome {
    Respond(Response),
    SyncFailed(ScriptId, RemoteError),
    Abandoned(String),
}

impl InFlight {
    fn poll(&mut self) -> Option<Outcome> {
        match self {
            InFlight::Command { request, ack } => settle(request, ack.poll(), |()| None),
            InFlight::Evaluate { request, result } => settle(request, result.poll(), |result| {
                let value = match result.subtype {
                    EvalSubtype::Ok => result.value,
                    _ => EVALUATE_ERROR.to_string(),
                };
                Some(json!({ "result": value, "variablesReference": 0 }))
            }),
            InFlight::StackTrace {
                request,
                local_root,
                frames,
            } => settle(request, frames.poll(), |frames| {
                let frames = frames
                    .into_iter()
                    .enumerate()
                    .map(|(idx, frame)| stack_frame(idx, frame, local_root.as_path()))
                    .collect::<Vec<_>>();
                Some(json!({ "totalFrames": frames.len(), "stackFrames": frames }))
            }),
            InFlight::Breakpoints { request, sync } => match sync.poll() {
                Completion::Waiting => None,
                Completion::Done(Ok(lines)) => {
                    let breakpoints = lines
                        .into_iter()
                        .map(|line| Breakpoint {
                            verified: true,
                            line,
                        })
                        .collect::<Vec<_>>();
                    Some(Outcome::Respond(Response::success(
                        request,
                        Some(json!({ "breakpoints": breakpoints })),
                    )))
                }
                Completion::Done(Err(err)) => Some(Outcome::SyncFailed(sync.script_id(), err)),
                Completion::Abandoned => Some(Outcome::Abandoned(request.command.clone())),
            },
        }
    }
}

fn settle<T>(
    request: &DapRequest,
    completion: Completion<T>,
    body: impl FnOnce(T) -> Option<Value>,
) -> Option<Outcome> {
    match completion {
        Completion::Waiting => None,
        Completion::Done(Ok(value)) => Some(Outcome::Respond(Response::success(
            request,
            body(value),
        ))),
        Completion::Done(Err(err)) => Some(Outcome::Respond(Response::error(
            request,
            err.to_string(),
        ))),
        Completion::Abandoned => Some(Outcome::Abandoned(request.command.clone())),
    }
}

fn stack_frame(idx: usize, frame: BacktraceFrame, local_root: &Path) -> StackFrame {
    let source_name = frame.source_name.as_deref();
    StackFrame {
        id: idx as i64,
        name: frame
            .function_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "global".to_string()),
        source: Source {
            name: Some(source::source_basename(source_name)),
            path: Some(
                source::local_source_path(local_root, source_name)
                    .to_string_lossy()
                    .into_owned(),
            ),
        },
        line: frame.line,
        column: frame.column,
    }
}

fn capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: true,
        supports_function_breakpoints: false,
        supports_evaluate_for_hovers: false,
        supports_step_back: false,
        supports_restart_request: true,
    }
}

pub struct Controller<S: ClientSink> {
    client: S,
    connector: RemoteConnector,
    events: Sender<LoopEvent>,
    session: Option<Session>,
    /// Incremented for every attach, remote signals of older sessions are dropped.
    generation: u64,
    in_flight: Vec<InFlight>,
    diagnostics: Diagnostics,
}

impl<S: ClientSink> Controller<S> {
    /// `events` is the sending half of the loop channel, remote clients deliver their signals
    /// through it.
    pub fn new(client: S, connector: RemoteConnector, events: Sender<LoopEvent>) -> Self {
        Self {
            client,
            connector,
            events,
            session: None,
            generation: 0,
            in_flight: vec![],
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn client(&self) -> &S {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut S {
        &mut self.client
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Number of requests waiting for the remote engine.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Process events until the client goes away.
    pub fn run(mut self, events: Receiver<LoopEvent>) -> anyhow::Result<()> {
        for event in events {
            if self.handle(event)?.is_break() {
                break;
            }
        }
        self.teardown();
        Ok(())
    }

    /// Handle a single loop event and settle whatever it unblocked.
    pub fn handle(&mut self, event: LoopEvent) -> anyhow::Result<ControlFlow<()>> {
        let flow = match event {
            LoopEvent::Request(request) => {
                self.on_request(request)?;
                ControlFlow::Continue(())
            }
            LoopEvent::Remote { generation, signal } => {
                if generation == self.generation && self.session.is_some() {
                    self.on_remote_signal(signal)?;
                } else {
                    log::debug!(target: "remote", "drop signal of closed session #{generation}");
                }
                ControlFlow::Continue(())
            }
            LoopEvent::ClientClosed => {
                log::info!(target: "dap", "DAP client closed the connection");
                self.teardown();
                ControlFlow::Break(())
            }
        };

        self.drive()?;
        Ok(flow)
    }

    /// Answer every in-flight request whose remote result is available.
    pub fn drive(&mut self) -> anyhow::Result<()> {
        let mut outcomes = vec![];
        self.in_flight.retain_mut(|task| match task.poll() {
            Some(outcome) => {
                outcomes.push(outcome);
                false
            }
            None => true,
        });

        for outcome in outcomes {
            match outcome {
                Outcome::Respond(response) => self.client.respond(response)?,
                Outcome::SyncFailed(script_id, err) => self.sync_failed(script_id, &err)?,
                Outcome::Abandoned(command) => {
                    log::warn!(target: "dap", "{command} request left unanswered, remote operation dropped")
                }
            }
        }
        Ok(())
    }

    fn log(&mut self, message: impl Into<DiagMessage>) -> anyhow::Result<()> {
        let message = message.into();
        log::debug!(target: "dap", "[DS] {}", message.render());
        if let Some(event) = self.diagnostics.event(&message) {
            self.client.send_event(event)?;
        }
        Ok(())
    }

    fn sync_failed(&mut self, script_id: ScriptId, err: &RemoteError) -> anyhow::Result<()> {
        log::error!(target: "dap", "breakpoint synchronization of script #{script_id} failed: {err}");
        self.log(err.to_string())
    }

    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            log::info!(target: "remote", "close session with {}", session.config.target);
            session.remote.disconnect();
        }
        if !self.in_flight.is_empty() {
            log::debug!(target: "dap", "orphan {} in-flight request(s)", self.in_flight.len());
        }
        self.in_flight.clear();
    }

    fn on_request(&mut self, request: DapRequest) -> anyhow::Result<()> {
        log::debug!(target: "dap", "{}: {} {}", request.seq, request.command, request.arguments);

        let reply = match RequestKind::from_str(&request.command) {
            Ok(kind) => {
                self.log(format!("{} request", request.command))?;
                self.dispatch(kind, &request)
            }
            Err(_) => {
                log::warn!(target: "dap", "unknown command: {}", request.command);
                Err(SessionError::UnknownRequest(request.command.clone()).into())
            }
        };

        match reply {
            Ok(Reply::Respond(body)) => self.client.respond(Response::success(&request, body)),
            Ok(Reply::Sent | Reply::Deferred) => Ok(()),
            Err(err) => match err.downcast::<SessionError>() {
                Ok(err) => {
                    log::debug!(target: "dap", "{} request failed: {err}", request.command);
                    self.client.respond(Response::error(&request, err.to_string()))
                }
                Err(err) => Err(err),
            },
        }
    }

    fn dispatch(&mut self, kind: RequestKind, request: &DapRequest) -> anyhow::Result<Reply> {
        match kind {
            RequestKind::Initialize => {
                self.client.send_event(Event::initialized())?;
                Ok(Reply::Respond(Some(to_body(&capabilities()))))
            }
            RequestKind::Attach => self.attach(request),
            RequestKind::Launch => Err(SessionError::LaunchUnsupported.into()),
            RequestKind::Disconnect => {
                self.teardown();
                self.client.send_event(Event::terminated())?;
                Ok(Reply::Respond(None))
            }
            RequestKind::Restart => {
                log::info!(target: "dap", "restart is not implemented, request ignored");
                Ok(Reply::Respond(None))
            }
            RequestKind::ConfigurationDone => Ok(Reply::Respond(None)),
            RequestKind::SetBreakpoints => self.set_breakpoints(request),
            RequestKind::Continue
            | RequestKind::Next
            | RequestKind::StepIn
            | RequestKind::StepOut
            | RequestKind::Pause => {
                let remote = &mut self.session.as_mut().ok_or(SessionError::NoSession)?.remote;
                let ack = match kind {
                    RequestKind::Continue => remote.resume(),
                    RequestKind::Next => remote.step_over(),
                    RequestKind::StepIn => remote.step_into(),
                    RequestKind::StepOut => remote.step_out(),
                    _ => remote.pause(),
                };
                self.in_flight.push(InFlight::Command {
                    request: request.clone(),
                    ack,
                });
                Ok(Reply::Deferred)
            }
            RequestKind::Evaluate => {
                let session = self.session.as_mut().ok_or(SessionError::NoSession)?;
                let args: EvaluateArguments = arguments_required(request)?;
                let result = session.remote.evaluate(&args.expression);
                self.in_flight.push(InFlight::Evaluate {
                    request: request.clone(),
                    result,
                });
                Ok(Reply::Deferred)
            }
            RequestKind::StackTrace => {
                let session = self.session.as_mut().ok_or(SessionError::NoSession)?;
                let frames = session.remote.backtrace();
                self.in_flight.push(InFlight::StackTrace {
                    request: request.clone(),
                    local_root: session.config.local_root.clone(),
                    frames,
                });
                Ok(Reply::Deferred)
            }
            RequestKind::Threads => {
                let threads = [Thread {
                    id: THREAD_ID,
                    name: format!("thread {THREAD_ID}"),
                }];
                Ok(Reply::Respond(Some(json!({ "threads": threads }))))
            }
            RequestKind::Scopes => Ok(Reply::Respond(Some(json!({ "scopes": [] })))),
            RequestKind::Variables => Ok(Reply::Respond(Some(json!({ "variables": [] })))),
        }
    }

    fn attach(&mut self, request: &DapRequest) -> anyhow::Result<Reply> {
        let config = AttachArgs::from_request(&request.arguments).validate()?;

        if self.session.is_some() {
            log::info!(target: "dap", "attach replaces the active session");
            self.teardown();
        }

        self.generation += 1;
        let generation = self.generation;
        let events = self.events.clone();
        let sink: SignalSink = Arc::new(move |signal: RemoteSignal| {
            // the loop may be gone already, nobody is left to care about the signal then
            let _ = events.send(LoopEvent::Remote { generation, signal });
        });

        log::info!(target: "remote", "attach to {} (session #{generation})", config.target);
        self.diagnostics = Diagnostics::new(config.debug_log);
        self.log(json!({
            "address": config.target.address,
            "port": config.target.port,
            "localRoot": config.local_root.display().to_string(),
        }))?;
        let remote = (self.connector)(&config.target, sink);
        let mut session = Session::new(config, remote);
        session.remote.connect();
        self.session = Some(session);

        self.client.respond(Response::success(request, None))?;
        self.client.send_event(Event::initialized())?;
        Ok(Reply::Sent)
    }

    fn set_breakpoints(&mut self, request: &DapRequest) -> anyhow::Result<Reply> {
        let session = self.session.as_mut().ok_or(SessionError::NoSession)?;
        let args: SetBreakpointsArguments = arguments_required(request)?;

        let name = args.source.name.clone().unwrap_or_default();
        let lines = args.desired_lines();
        let sync = session
            .remote
            .script_id_by_name(&name)
            .and_then(|script_id| breakpoints::reconcile(session.remote.as_mut(), script_id, &lines));

        match sync {
            Ok(sync) => self.in_flight.push(InFlight::Breakpoints {
                request: request.clone(),
                sync,
            }),
            Err(err) => {
                log::error!(target: "dap", "breakpoints of {name:?} not synchronized: {err}");
                self.log(err.to_string())?;
            }
        }
        Ok(Reply::Deferred)
    }

    fn on_remote_signal(&mut self, signal: RemoteSignal) -> anyhow::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        match signal {
            RemoteSignal::Connected => {
                let target = session.config.target.clone();
                log::info!(target: "remote", "connected to {target}");
                self.log(format!("Connected to: {target}"))
            }
            RemoteSignal::ConnectFailed(reason) => {
                let target = &session.config.target;
                log::warn!(target: "remote", "connection to {target} failed: {reason}");
                let details = json!({
                    "address": target.address,
                    "port": target.port,
                    "error": reason,
                });
                self.log(details)
            }
            RemoteSignal::Message(message) => match session.remote.on_message(&message) {
                Ok(()) => Ok(()),
                Err(err) => {
                    log::error!(target: "remote", "remote message: {err}");
                    self.log(err.to_string())
                }
            },
            RemoteSignal::Event(event) => self.on_remote_event(event),
        }
    }

    fn on_remote_event(&mut self, event: RemoteEvent) -> anyhow::Result<()> {
        self.log(format!("remote event: {event:?}"))?;

        match bridge::translate(event) {
            Bridged::Emit(event) => self.client.send_event(event),
            Bridged::SyncSource { id, name } => {
                self.sync_source(id, name.as_deref());
                Ok(())
            }
            Bridged::Terminate => {
                log::info!(target: "remote", "remote connection closed");
                self.teardown();
                self.client.send_event(Event::terminated())
            }
        }
    }

    fn sync_source(&mut self, id: ScriptId, name: Option<&str>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let text = match session.remote.source(id) {
            Ok(text) => text,
            Err(err) => {
                log::warn!(target: "remote", "source of script #{id} unavailable: {err}");
                return;
            }
        };

        let path = session.sources.local_path(name);
        match session.sources.sync(name, &text) {
            Ok(SyncOutcome::Unchanged) => {
                log::debug!(target: "dap", "{} is up to date", path.display())
            }
            Ok(outcome) => log::info!(target: "dap", "{}: {outcome:?}", path.display()),
            Err(err) => log::error!(target: "dap", "write {}: {err}", path.display()),
        }
    }
}

/// Request arguments that must be present.
fn arguments_required<T: DeserializeOwned>(request: &DapRequest) -> Result<T, SessionError> {
    Ok(serde_json::from_value(request.arguments.clone())?)
}
