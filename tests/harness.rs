#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use iotjs_dap::dap::protocol::{DapRequest, Event, Response};
use iotjs_dap::dap::ClientSink;
use iotjs_dap::remote::{
    pending, BacktraceFrame, BreakpointHandle, Completer, EvalResult, Pending, RemoteDebugClient,
    RemoteError, RemoteSignal, RemoteTarget, ScriptId, SignalSink,
};
use iotjs_dap::session::{Controller, LoopEvent, RemoteConnector};
use serde_json::Value;

/// Message delivered to the client, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Response(Response),
    Event(Event),
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub sent: Vec<Sent>,
}

impl ClientSink for Recorder {
    fn respond(&mut self, response: Response) -> anyhow::Result<()> {
        self.sent.push(Sent::Response(response));
        Ok(())
    }

    fn send_event(&mut self, event: Event) -> anyhow::Result<()> {
        self.sent.push(Sent::Event(event));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Disconnect,
    Resume,
    StepOver,
    StepInto,
    StepOut,
    Pause,
    UpdateBreakpoint {
        script_id: ScriptId,
        line: u32,
        enable: bool,
    },
    Evaluate(String),
    Backtrace,
}

/// Scripted engine state shared between a test and the remote clients it hands out.
#[derive(Default)]
pub struct RemoteState {
    pub calls: Vec<Call>,
    pub targets: Vec<RemoteTarget>,
    /// Signal sink of the most recently created client.
    pub sink: Option<SignalSink>,
    pub scripts: HashMap<String, ScriptId>,
    pub sources: HashMap<ScriptId, String>,
    /// Lines with a breakpoint location, per script.
    pub locations: HashMap<ScriptId, Vec<u32>>,
    pub active: HashMap<ScriptId, Vec<u32>>,
    /// Rejection for the next execution command.
    pub command_error: Option<RemoteError>,
    pub reject_activation: Option<RemoteError>,
    pub evaluations: VecDeque<Completer<EvalResult>>,
    pub backtraces: VecDeque<Completer<Vec<BacktraceFrame>>>,
}

impl RemoteState {
    pub fn add_script(&mut self, id: ScriptId, name: &str, source: &str, locations: &[u32]) {
        self.scripts.insert(name.to_string(), id);
        self.sources.insert(id, source.to_string());
        self.locations.insert(id, locations.to_vec());
    }

    pub fn breakpoint_updates(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::UpdateBreakpoint { .. }))
            .cloned()
            .collect()
    }
}

pub struct MockRemote {
    state: Rc<RefCell<RemoteState>>,
}

impl MockRemote {
    fn command(&mut self, call: Call) -> Pending<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        match state.command_error.take() {
            Some(err) => Pending::rejected(err),
            None => Pending::resolved(()),
        }
    }
}

impl RemoteDebugClient for MockRemote {
    fn connect(&mut self) {
        self.state.borrow_mut().calls.push(Call::Connect);
    }

    fn disconnect(&mut self) {
        self.state.borrow_mut().calls.push(Call::Disconnect);
    }

    fn on_message(&mut self, _message: &[u8]) -> Result<(), RemoteError> {
        Ok(())
    }

    fn resume(&mut self) -> Pending<()> {
        self.command(Call::Resume)
    }

    fn step_over(&mut self) -> Pending<()> {
        self.command(Call::StepOver)
    }

    fn step_into(&mut self) -> Pending<()> {
        self.command(Call::StepInto)
    }

    fn step_out(&mut self) -> Pending<()> {
        self.command(Call::StepOut)
    }

    fn pause(&mut self) -> Pending<()> {
        self.command(Call::Pause)
    }

    fn script_id_by_name(&self, name: &str) -> Result<ScriptId, RemoteError> {
        self.state
            .borrow()
            .scripts
            .get(name)
            .copied()
            .ok_or_else(|| RemoteError::Rejected(format!("no such source: {name}")))
    }

    fn active_breakpoint_lines(&self, script_id: ScriptId) -> Vec<u32> {
        self.state
            .borrow()
            .active
            .get(&script_id)
            .cloned()
            .unwrap_or_default()
    }

    fn find_breakpoint(
        &self,
        script_id: ScriptId,
        line: u32,
    ) -> Result<BreakpointHandle, RemoteError> {
        let state = self.state.borrow();
        let known = state
            .locations
            .get(&script_id)
            .is_some_and(|lines| lines.contains(&line));
        if !known {
            return Err(RemoteError::Rejected(format!(
                "no breakpoint location at line {line}"
            )));
        }
        Ok(BreakpointHandle {
            script_id,
            line,
            byte_code_cp: 0x10,
            offset: line * 2,
        })
    }

    fn update_breakpoint(&mut self, breakpoint: &BreakpointHandle, enable: bool) -> Pending<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::UpdateBreakpoint {
            script_id: breakpoint.script_id,
            line: breakpoint.line,
            enable,
        });
        if enable {
            if let Some(err) = state.reject_activation.take() {
                return Pending::rejected(err);
            }
        }

        let active = state.active.entry(breakpoint.script_id).or_default();
        if enable {
            active.push(breakpoint.line);
        } else {
            active.retain(|&line| line != breakpoint.line);
        }
        Pending::resolved(())
    }

    fn evaluate(&mut self, expression: &str) -> Pending<EvalResult> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Evaluate(expression.to_string()));
        let (completer, pending) = pending();
        state.evaluations.push_back(completer);
        pending
    }

    fn backtrace(&mut self) -> Pending<Vec<BacktraceFrame>> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Backtrace);
        let (completer, pending) = pending();
        state.backtraces.push_back(completer);
        pending
    }

    fn source(&self, script_id: ScriptId) -> Result<String, RemoteError> {
        self.state
            .borrow()
            .sources
            .get(&script_id)
            .cloned()
            .ok_or_else(|| RemoteError::Rejected(format!("no such script: {script_id}")))
    }
}

pub fn mock_connector(state: Rc<RefCell<RemoteState>>) -> RemoteConnector {
    Box::new(move |target: &RemoteTarget, sink: SignalSink| {
        {
            let mut s = state.borrow_mut();
            s.targets.push(target.clone());
            s.sink = Some(sink);
        }
        Box::new(MockRemote {
            state: state.clone(),
        }) as Box<dyn RemoteDebugClient>
    })
}

/// Controller wired to a recording client and any remote connector.
pub struct Harness {
    pub controller: Controller<Recorder>,
    pub events: Receiver<LoopEvent>,
    seq: i64,
}

impl Harness {
    pub fn new(connector: RemoteConnector) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            controller: Controller::new(Recorder::default(), connector, tx),
            events: rx,
            seq: 0,
        }
    }

    /// Send a request and process whatever it triggered. Returns the request seq.
    pub fn request(&mut self, command: &str, arguments: Value) -> i64 {
        self.seq += 1;
        let request = DapRequest {
            seq: self.seq,
            r#type: "request".to_string(),
            command: command.to_string(),
            arguments,
        };
        self.controller
            .handle(LoopEvent::Request(request))
            .expect("handle request");
        self.pump();
        self.seq
    }

    /// Process all queued loop events.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.controller.handle(event).expect("handle loop event");
        }
    }

    /// Process loop events until `done` holds, waiting for events from other threads.
    pub fn pump_until(&mut self, timeout: Duration, done: impl Fn(&[Sent]) -> bool) {
        let deadline = Instant::now() + timeout;
        while !done(self.sent()) {
            let left = deadline.saturating_duration_since(Instant::now());
            assert!(!left.is_zero(), "timed out, sent so far: {:#?}", self.sent());
            if let Ok(event) = self.events.recv_timeout(left) {
                self.controller.handle(event).expect("handle loop event");
            }
        }
    }

    pub fn sent(&self) -> &[Sent] {
        &self.controller.client().sent
    }

    pub fn clear(&mut self) {
        self.controller.client_mut().sent.clear();
    }

    pub fn response(&self, seq: i64) -> Option<&Response> {
        self.sent().iter().find_map(|sent| match sent {
            Sent::Response(response) if response.request_seq == seq => Some(response),
            _ => None,
        })
    }

    pub fn events(&self, name: &str) -> Vec<&Event> {
        self.sent()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Event(event) if event.event == name => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Console output of the `[DS]` diagnostic channel.
    pub fn diagnostics(&self) -> Vec<String> {
        self.events("output")
            .into_iter()
            .filter_map(|event| event.body.as_ref())
            .filter_map(|body| body["output"].as_str().map(str::to_string))
            .collect()
    }
}

pub fn has_response(seq: i64) -> impl Fn(&[Sent]) -> bool {
    move |sent| {
        sent.iter()
            .any(|s| matches!(s, Sent::Response(r) if r.request_seq == seq))
    }
}

pub fn has_event(name: &'static str) -> impl Fn(&[Sent]) -> bool {
    move |sent| sent.iter().any(|s| matches!(s, Sent::Event(e) if e.event == name))
}

/// Deliver `signal` as the remote client of the latest attach.
pub fn emit(state: &Rc<RefCell<RemoteState>>, signal: RemoteSignal) {
    let sink = state.borrow().sink.clone().expect("no remote client created");
    sink(signal);
}
