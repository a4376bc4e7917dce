//! JerryScript debugger protocol state machine.
//!
//! The handler mirrors the engine state needed by the adapter: parsed scripts, their functions
//! and breakpoint locations, whether the engine is stopped, and the requests waiting for an
//! answer. It performs no I/O; outgoing protocol messages and notifications are queued and
//! collected with [`ProtocolHandler::take_outgoing`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};
use itertools::Itertools;

use super::constants::{client, server, EVAL_SUBTYPE_EVAL};
use crate::remote::{
    pending, BacktraceFrame, BreakpointHandle, Completer, EvalResult, EvalSubtype, Pending,
    RemoteError, RemoteEvent, ScriptId,
};

/// Name used for scripts the engine reports without a name.
pub const ANONYMOUS_SOURCE: &str = "debug_eval.js";

#[derive(Debug, PartialEq, Eq)]
pub enum Outgoing {
    Message(Vec<u8>),
    Event(RemoteEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub max_message_size: usize,
    pub cpointer_size: usize,
    pub little_endian: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
    byte_code_cp: u32,
    offset: u32,
}

#[derive(Debug, Clone)]
struct BreakpointSlot {
    line: u32,
    active: bool,
}

#[derive(Debug)]
struct Function {
    script_id: ScriptId,
    name: String,
    line: u32,
    column: u32,
    lines: Vec<u32>,
    offsets: Vec<u32>,
    /// Breakpoint locations keyed by byte code offset.
    breakpoints: BTreeMap<u32, BreakpointSlot>,
}

impl Function {
    fn new(name: String, line: u32, column: u32) -> Self {
        Self {
            script_id: 0,
            name,
            line,
            column,
            lines: vec![],
            offsets: vec![],
            breakpoints: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct Script {
    name: Option<String>,
    source: String,
    functions: Vec<u32>,
}

impl Script {
    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(ANONYMOUS_SOURCE)
    }
}

/// Accumulated state of the script currently being parsed by the engine.
#[derive(Debug, Default)]
struct ParseState {
    source: Vec<u8>,
    source_name: Vec<u8>,
    function_name: Vec<u8>,
    stack: Vec<Function>,
    finished: Vec<(u32, Function)>,
}

impl ParseState {
    fn is_active(&self) -> bool {
        !self.stack.is_empty()
    }

    fn ensure_started(&mut self) {
        if self.stack.is_empty() {
            self.stack.push(Function::new(String::new(), 1, 1));
        }
    }
}

#[derive(Default)]
pub struct ProtocolHandler {
    config: Option<Configuration>,
    parse: ParseState,
    scripts: BTreeMap<ScriptId, Script>,
    functions: HashMap<u32, Function>,
    last_script_id: ScriptId,
    stopped_at: Option<Location>,
    exception: Vec<u8>,
    backtrace: Vec<BacktraceFrame>,
    backtrace_requests: VecDeque<Completer<Vec<BacktraceFrame>>>,
    eval_result: Vec<u8>,
    eval_requests: VecDeque<Completer<EvalResult>>,
    outgoing: Vec<Outgoing>,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }

    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn on_message(&mut self, message: &[u8]) -> Result<(), RemoteError> {
        let Some((&kind, mut data)) = message.split_first() else {
            return Err(RemoteError::Protocol("empty message".to_string()));
        };

        if kind == server::CONFIGURATION {
            return self.on_configuration(data);
        }
        let config = self.config.ok_or_else(|| {
            RemoteError::Protocol(format!("message {kind} received before configuration"))
        })?;

        match kind {
            server::PARSE_ERROR => {
                log::warn!(target: "remote", "engine reported a parse error");
                self.parse = ParseState::default();
            }
            server::SOURCE_CODE | server::SOURCE_CODE_END => {
                self.parse.ensure_started();
                self.parse.source.extend_from_slice(data);
            }
            server::SOURCE_CODE_NAME | server::SOURCE_CODE_NAME_END => {
                self.parse.ensure_started();
                self.parse.source_name.extend_from_slice(data);
            }
            server::FUNCTION_NAME | server::FUNCTION_NAME_END => {
                self.parse.ensure_started();
                self.parse.function_name.extend_from_slice(data);
            }
            server::PARSE_FUNCTION => {
                self.parse.ensure_started();
                let line = read_u32(&mut data, &config)?;
                let column = read_u32(&mut data, &config)?;
                let name = String::from_utf8_lossy(&self.parse.function_name).into_owned();
                self.parse.function_name.clear();
                self.parse.stack.push(Function::new(name, line, column));
            }
            server::BREAKPOINT_LIST | server::BREAKPOINT_OFFSET_LIST => {
                self.parse.ensure_started();
                let mut values = Vec::with_capacity(data.len() / 4);
                while data.has_remaining() {
                    values.push(read_u32(&mut data, &config)?);
                }
                let top = self
                    .parse
                    .stack
                    .last_mut()
                    .ok_or_else(|| RemoteError::Protocol("no function is parsed".to_string()))?;
                if kind == server::BREAKPOINT_LIST {
                    top.lines.extend(values);
                } else {
                    top.offsets.extend(values);
                }
            }
            server::BYTE_CODE_CP => {
                let cp = read_cp(&mut data, &config)?;
                self.on_byte_code(cp)?;
            }
            server::WAITING_AFTER_PARSE => {
                self.outgoing
                    .push(Outgoing::Message(vec![client::PARSER_RESUME]));
            }
            server::RELEASE_BYTE_CODE_CP => {
                let cp = read_cp(&mut data, &config)?;
                self.release_function(cp);
                let mut msg = BytesMut::new();
                msg.put_u8(client::FREE_BYTE_CODE_CP);
                put_cp(&mut msg, cp, &config);
                self.outgoing.push(Outgoing::Message(msg.to_vec()));
            }
            server::MEMSTATS_RECEIVE => {
                log::debug!(target: "remote", "memory statistics received");
            }
            server::BREAKPOINT_HIT => {
                let location = read_location(&mut data, &config)?;
                self.stopped_at = Some(location);
                self.outgoing.push(Outgoing::Event(RemoteEvent::BreakpointHit));
            }
            server::EXCEPTION_STR | server::EXCEPTION_STR_END => {
                self.exception.extend_from_slice(data);
            }
            server::EXCEPTION_HIT => {
                let location = read_location(&mut data, &config)?;
                self.stopped_at = Some(location);
                let message = String::from_utf8_lossy(&self.exception).into_owned();
                self.exception.clear();
                self.outgoing
                    .push(Outgoing::Event(RemoteEvent::ExceptionHit { message }));
            }
            server::BACKTRACE | server::BACKTRACE_END => {
                while data.has_remaining() {
                    let location = read_location(&mut data, &config)?;
                    match self.frame_at(location) {
                        Some(frame) => self.backtrace.push(frame),
                        None => log::warn!(
                            target: "remote",
                            "backtrace frame in unknown byte code {:#x}", location.byte_code_cp
                        ),
                    }
                }
                if kind == server::BACKTRACE_END {
                    let frames = std::mem::take(&mut self.backtrace);
                    match self.backtrace_requests.pop_front() {
                        Some(completer) => completer.resolve(frames),
                        None => log::warn!(target: "remote", "unsolicited backtrace"),
                    }
                }
            }
            server::EVAL_RESULT | server::EVAL_RESULT_END => {
                self.eval_result.extend_from_slice(data);
                if kind == server::EVAL_RESULT_END {
                    let result = std::mem::take(&mut self.eval_result);
                    let result = match result.split_last() {
                        Some((&subtype, value)) => Ok(EvalResult {
                            subtype: EvalSubtype::from(subtype),
                            value: String::from_utf8_lossy(value).into_owned(),
                        }),
                        None => Err(RemoteError::Protocol("empty eval result".to_string())),
                    };
                    match self.eval_requests.pop_front() {
                        Some(completer) => completer.complete(result),
                        None => log::warn!(target: "remote", "unsolicited eval result"),
                    }
                }
            }
            server::WAIT_FOR_SOURCE => {
                log::info!(target: "remote", "engine is waiting for client sources");
            }
            server::OUTPUT_RESULT | server::OUTPUT_RESULT_END => {
                log::info!(target: "remote", "engine output: {}", String::from_utf8_lossy(data));
            }
            other => {
                return Err(RemoteError::Protocol(format!("unknown message type {other}")));
            }
        }

        Ok(())
    }

    fn on_configuration(&mut self, mut data: &[u8]) -> Result<(), RemoteError> {
        if data.remaining() < 4 {
            return Err(RemoteError::Protocol(
                "truncated configuration message".to_string(),
            ));
        }
        let max_message_size = data.get_u8() as usize;
        let cpointer_size = data.get_u8() as usize;
        let little_endian = data.get_u8() != 0;
        let version = data.get_u8();

        if cpointer_size != 2 && cpointer_size != 4 {
            return Err(RemoteError::Protocol(format!(
                "unsupported compressed pointer size {cpointer_size}"
            )));
        }
        // room for the largest fixed size message: update breakpoint
        if max_message_size < 2 + cpointer_size + 4 {
            return Err(RemoteError::Protocol(format!(
                "maximum message size {max_message_size} is too small"
            )));
        }

        log::debug!(
            target: "remote",
            "engine configuration: protocol version {version}, message size {max_message_size}, pointer size {cpointer_size}"
        );
        self.config = Some(Configuration {
            max_message_size,
            cpointer_size,
            little_endian,
        });
        Ok(())
    }

    fn on_byte_code(&mut self, cp: u32) -> Result<(), RemoteError> {
        let function = self.parse.stack.pop().ok_or_else(|| {
            RemoteError::Protocol(format!("byte code {cp:#x} without a parsed function"))
        })?;
        self.parse.finished.push((cp, function));

        if !self.parse.is_active() {
            self.finish_script();
        }
        Ok(())
    }

    fn finish_script(&mut self) {
        let parse = std::mem::take(&mut self.parse);
        self.last_script_id += 1;
        let id = self.last_script_id;

        let name = Some(String::from_utf8_lossy(&parse.source_name).into_owned())
            .filter(|name| !name.is_empty());
        let mut script = Script {
            name: name.clone(),
            source: String::from_utf8_lossy(&parse.source).into_owned(),
            functions: Vec::with_capacity(parse.finished.len()),
        };

        for (cp, mut function) in parse.finished {
            function.script_id = id;
            function.breakpoints = function
                .lines
                .iter()
                .zip(function.offsets.iter())
                .map(|(&line, &offset)| {
                    (
                        offset,
                        BreakpointSlot {
                            line,
                            active: false,
                        },
                    )
                })
                .collect();
            script.functions.push(cp);
            self.functions.insert(cp, function);
        }

        log::debug!(target: "remote", "script #{id} parsed: {}", script.display_name());
        self.scripts.insert(id, script);
        self.outgoing
            .push(Outgoing::Event(RemoteEvent::ScriptParsed { id, name }));
    }

    fn release_function(&mut self, cp: u32) {
        let Some(function) = self.functions.remove(&cp) else {
            log::warn!(target: "remote", "release of unknown byte code {cp:#x}");
            return;
        };
        if let Some(script) = self.scripts.get_mut(&function.script_id) {
            script.functions.retain(|&f| f != cp);
        }
        if self.stopped_at.map(|l| l.byte_code_cp) == Some(cp) {
            self.stopped_at = None;
        }
    }

    fn frame_at(&self, location: Location) -> Option<BacktraceFrame> {
        let function = self.functions.get(&location.byte_code_cp)?;
        let line = function
            .breakpoints
            .range(..=location.offset)
            .next_back()
            .map(|(_, slot)| slot.line)
            .unwrap_or(function.line);
        let source_name = self
            .scripts
            .get(&function.script_id)
            .and_then(|script| script.name.clone());

        Some(BacktraceFrame {
            function_name: Some(function.name.clone()).filter(|name| !name.is_empty()),
            source_name,
            line,
            column: function.column,
        })
    }

    fn script_functions(&self, script_id: ScriptId) -> impl Iterator<Item = (u32, &Function)> {
        self.scripts
            .get(&script_id)
            .into_iter()
            .flat_map(|script| script.functions.iter())
            .filter_map(|cp| self.functions.get(cp).map(|f| (*cp, f)))
    }

    pub fn script_id_by_name(&self, name: &str) -> Result<ScriptId, RemoteError> {
        let wanted = if name.is_empty() { ANONYMOUS_SOURCE } else { name };
        let wanted_base = basename(wanted);

        self.scripts
            .iter()
            .rev()
            .find(|(_, script)| {
                let name = script.display_name();
                name == wanted || basename(name) == wanted_base
            })
            .map(|(id, _)| *id)
            .ok_or_else(|| RemoteError::Rejected(format!("no such source: {wanted}")))
    }

    pub fn active_breakpoint_lines(&self, script_id: ScriptId) -> Vec<u32> {
        self.script_functions(script_id)
            .flat_map(|(_, function)| function.breakpoints.values())
            .filter(|slot| slot.active)
            .map(|slot| slot.line)
            .sorted()
            .dedup()
            .collect()
    }

    pub fn find_breakpoint(
        &self,
        script_id: ScriptId,
        line: u32,
    ) -> Result<BreakpointHandle, RemoteError> {
        let candidates = self
            .script_functions(script_id)
            .flat_map(|(cp, function)| {
                function
                    .breakpoints
                    .iter()
                    .filter(move |(_, slot)| slot.line == line)
                    .map(move |(offset, slot)| (cp, *offset, slot.active))
            })
            .collect_vec();

        // an enabled location on the line wins so it can be found again for disabling
        let (byte_code_cp, offset, _) = candidates
            .iter()
            .find(|(_, _, active)| *active)
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(|| {
                RemoteError::Rejected(format!("no breakpoint location at line {line}"))
            })?;

        Ok(BreakpointHandle {
            script_id,
            line,
            byte_code_cp,
            offset,
        })
    }

    pub fn source(&self, script_id: ScriptId) -> Result<String, RemoteError> {
        self.scripts
            .get(&script_id)
            .map(|script| script.source.clone())
            .ok_or_else(|| RemoteError::Rejected(format!("no such script: {script_id}")))
    }

    pub fn update_breakpoint(
        &mut self,
        breakpoint: &BreakpointHandle,
        enable: bool,
    ) -> Result<Pending<()>, RemoteError> {
        let config = self.config.ok_or(RemoteError::NotConnected)?;
        let slot = self
            .functions
            .get_mut(&breakpoint.byte_code_cp)
            .and_then(|function| function.breakpoints.get_mut(&breakpoint.offset))
            .ok_or_else(|| {
                RemoteError::Rejected(format!("unknown breakpoint at line {}", breakpoint.line))
            })?;

        if slot.active == enable {
            let state = if enable { "enabled" } else { "disabled" };
            return Err(RemoteError::Rejected(format!(
                "breakpoint at line {} is already {state}",
                breakpoint.line
            )));
        }
        slot.active = enable;

        let mut msg = BytesMut::new();
        msg.put_u8(client::UPDATE_BREAKPOINT);
        msg.put_u8(enable as u8);
        put_cp(&mut msg, breakpoint.byte_code_cp, &config);
        put_u32(&mut msg, breakpoint.offset, &config);
        self.outgoing.push(Outgoing::Message(msg.to_vec()));

        Ok(Pending::resolved(()))
    }

    /// Leave the breakpoint with one of the resume commands.
    pub fn resume(&mut self, command: u8) -> Result<Pending<()>, RemoteError> {
        self.config.ok_or(RemoteError::NotConnected)?;
        if self.stopped_at.take().is_none() {
            return Err(RemoteError::Rejected(
                "attempted resume while not at breakpoint".to_string(),
            ));
        }
        self.outgoing.push(Outgoing::Message(vec![command]));
        self.outgoing.push(Outgoing::Event(RemoteEvent::Resumed));
        Ok(Pending::resolved(()))
    }

    pub fn pause(&mut self) -> Result<Pending<()>, RemoteError> {
        self.config.ok_or(RemoteError::NotConnected)?;
        if self.is_stopped() {
            return Err(RemoteError::Rejected(
                "attempted pause while at breakpoint".to_string(),
            ));
        }
        self.outgoing.push(Outgoing::Message(vec![client::STOP]));
        Ok(Pending::resolved(()))
    }

    pub fn backtrace(&mut self) -> Result<Pending<Vec<BacktraceFrame>>, RemoteError> {
        let config = self.config.ok_or(RemoteError::NotConnected)?;
        if !self.is_stopped() {
            return Err(RemoteError::Rejected(
                "attempted backtrace while not at breakpoint".to_string(),
            ));
        }

        let mut msg = BytesMut::new();
        msg.put_u8(client::GET_BACKTRACE);
        // zero depth: all frames
        put_u32(&mut msg, 0, &config);
        self.outgoing.push(Outgoing::Message(msg.to_vec()));

        let (completer, pending) = pending();
        self.backtrace_requests.push_back(completer);
        Ok(pending)
    }

    pub fn evaluate(&mut self, expression: &str) -> Result<Pending<EvalResult>, RemoteError> {
        let config = self.config.ok_or(RemoteError::NotConnected)?;
        if !self.is_stopped() {
            return Err(RemoteError::Rejected(
                "attempted eval while not at breakpoint".to_string(),
            ));
        }

        let mut payload = Vec::with_capacity(expression.len() + 1);
        payload.push(EVAL_SUBTYPE_EVAL);
        payload.extend_from_slice(expression.as_bytes());

        let mut msg = BytesMut::new();
        msg.put_u8(client::EVAL);
        put_u32(&mut msg, payload.len() as u32, &config);
        let first_chunk = payload.len().min(config.max_message_size - msg.len());
        msg.put_slice(&payload[..first_chunk]);
        self.outgoing.push(Outgoing::Message(msg.to_vec()));

        for chunk in payload[first_chunk..].chunks(config.max_message_size - 1) {
            let mut part = Vec::with_capacity(chunk.len() + 1);
            part.push(client::EVAL_PART);
            part.extend_from_slice(chunk);
            self.outgoing.push(Outgoing::Message(part));
        }

        let (completer, pending) = pending();
        self.eval_requests.push_back(completer);
        Ok(pending)
    }
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

fn read_u32(data: &mut &[u8], config: &Configuration) -> Result<u32, RemoteError> {
    if data.remaining() < 4 {
        return Err(RemoteError::Protocol("truncated message".to_string()));
    }
    Ok(if config.little_endian {
        data.get_u32_le()
    } else {
        data.get_u32()
    })
}

fn read_cp(data: &mut &[u8], config: &Configuration) -> Result<u32, RemoteError> {
    if config.cpointer_size == 4 {
        return read_u32(data, config);
    }
    if data.remaining() < 2 {
        return Err(RemoteError::Protocol("truncated message".to_string()));
    }
    Ok(if config.little_endian {
        data.get_u16_le()
    } else {
        data.get_u16()
    } as u32)
}

fn read_location(data: &mut &[u8], config: &Configuration) -> Result<Location, RemoteError> {
    let byte_code_cp = read_cp(data, config)?;
    let offset = read_u32(data, config)?;
    Ok(Location {
        byte_code_cp,
        offset,
    })
}

fn put_u32(buf: &mut BytesMut, value: u32, config: &Configuration) {
    if config.little_endian {
        buf.put_u32_le(value)
    } else {
        buf.put_u32(value)
    }
}

fn put_cp(buf: &mut BytesMut, cp: u32, config: &Configuration) {
    match (config.cpointer_size, config.little_endian) {
        (4, _) => put_u32(buf, cp, config),
        (_, true) => buf.put_u16_le(cp as u16),
        (_, false) => buf.put_u16(cp as u16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Completion;

    fn configured() -> ProtocolHandler {
        let mut handler = ProtocolHandler::new();
        handler
            .on_message(&[server::CONFIGURATION, 64, 2, 1, 1])
            .unwrap();
        handler
    }

    fn msg(kind: u8, words: &[u32]) -> Vec<u8> {
        let mut out = vec![kind];
        for w in words {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    fn cp_msg(kind: u8, cp: u16, words: &[u32]) -> Vec<u8> {
        let mut out = vec![kind];
        out.extend_from_slice(&cp.to_le_bytes());
        for w in words {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    /// Parse a script with a top level part (lines 1, 2) and a function `f` (line 5).
    fn parse_script(handler: &mut ProtocolHandler, name: &str) {
        let mut source = vec![server::SOURCE_CODE_END];
        source.extend_from_slice(b"var a = 1;\nf();\n\n\nfunction f() {}");
        handler.on_message(&source).unwrap();
        let mut source_name = vec![server::SOURCE_CODE_NAME_END];
        source_name.extend_from_slice(name.as_bytes());
        handler.on_message(&source_name).unwrap();

        let mut fname = vec![server::FUNCTION_NAME_END];
        fname.extend_from_slice(b"f");
        handler.on_message(&fname).unwrap();
        handler
            .on_message(&msg(server::PARSE_FUNCTION, &[5, 10]))
            .unwrap();
        handler
            .on_message(&msg(server::BREAKPOINT_LIST, &[5]))
            .unwrap();
        handler
            .on_message(&msg(server::BREAKPOINT_OFFSET_LIST, &[4]))
            .unwrap();
        handler
            .on_message(&cp_msg(server::BYTE_CODE_CP, 0x20, &[]))
            .unwrap();

        handler
            .on_message(&msg(server::BREAKPOINT_LIST, &[1, 2]))
            .unwrap();
        handler
            .on_message(&msg(server::BREAKPOINT_OFFSET_LIST, &[3, 9]))
            .unwrap();
        handler
            .on_message(&cp_msg(server::BYTE_CODE_CP, 0x10, &[]))
            .unwrap();
    }

    #[test]
    fn test_message_before_configuration_is_rejected() {
        let mut handler = ProtocolHandler::new();
        assert!(handler.on_message(&[server::SOURCE_CODE, b'x']).is_err());
    }

    #[test]
    fn test_script_parsed() {
        let mut handler = configured();
        parse_script(&mut handler, "/app/main.js");

        assert_eq!(
            handler.take_outgoing(),
            vec![Outgoing::Event(RemoteEvent::ScriptParsed {
                id: 1,
                name: Some("/app/main.js".to_string()),
            })]
        );
        assert_eq!(handler.script_id_by_name("main.js").unwrap(), 1);
        assert_eq!(handler.script_id_by_name("/app/main.js").unwrap(), 1);
        assert!(handler.script_id_by_name("other.js").is_err());
        assert!(handler.source(1).unwrap().starts_with("var a = 1;"));
        assert!(handler.active_breakpoint_lines(1).is_empty());
    }

    #[test]
    fn test_anonymous_script_is_found_by_default_name() {
        let mut handler = configured();
        parse_script(&mut handler, "");
        assert_eq!(
            handler.take_outgoing(),
            vec![Outgoing::Event(RemoteEvent::ScriptParsed { id: 1, name: None })]
        );
        assert_eq!(handler.script_id_by_name("debug_eval.js").unwrap(), 1);
    }

    #[test]
    fn test_update_breakpoint() {
        let mut handler = configured();
        parse_script(&mut handler, "main.js");
        handler.take_outgoing();

        let bp = handler.find_breakpoint(1, 5).unwrap();
        assert_eq!(bp.byte_code_cp, 0x20);
        assert_eq!(bp.offset, 4);
        let mut ack = handler.update_breakpoint(&bp, true).unwrap();
        assert!(matches!(ack.poll(), Completion::Done(Ok(()))));
        assert_eq!(handler.active_breakpoint_lines(1), vec![5]);
        assert_eq!(
            handler.take_outgoing(),
            vec![Outgoing::Message(vec![
                client::UPDATE_BREAKPOINT,
                1,
                0x20,
                0,
                4,
                0,
                0,
                0
            ])]
        );

        assert!(handler.update_breakpoint(&bp, true).is_err());
        assert!(handler.find_breakpoint(1, 3).is_err());
    }

    #[test]
    fn test_breakpoint_hit_and_backtrace() {
        let mut handler = configured();
        parse_script(&mut handler, "main.js");
        handler.take_outgoing();

        assert!(handler.backtrace().is_err());

        handler
            .on_message(&cp_msg(server::BREAKPOINT_HIT, 0x20, &[4]))
            .unwrap();
        assert_eq!(
            handler.take_outgoing(),
            vec![Outgoing::Event(RemoteEvent::BreakpointHit)]
        );

        let mut frames = handler.backtrace().unwrap();
        assert!(matches!(frames.poll(), Completion::Waiting));
        assert_eq!(
            handler.take_outgoing(),
            vec![Outgoing::Message(vec![client::GET_BACKTRACE, 0, 0, 0, 0])]
        );

        let mut bt = cp_msg(server::BACKTRACE, 0x20, &[4]);
        bt.extend_from_slice(&0x10u16.to_le_bytes());
        bt.extend_from_slice(&10u32.to_le_bytes());
        handler.on_message(&bt).unwrap();
        handler.on_message(&[server::BACKTRACE_END]).unwrap();

        match frames.poll() {
            Completion::Done(Ok(frames)) => assert_eq!(
                frames,
                vec![
                    BacktraceFrame {
                        function_name: Some("f".to_string()),
                        source_name: Some("main.js".to_string()),
                        line: 5,
                        column: 10,
                    },
                    BacktraceFrame {
                        function_name: None,
                        source_name: Some("main.js".to_string()),
                        line: 2,
                        column: 1,
                    },
                ]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_resume_requires_stop() {
        let mut handler = configured();
        parse_script(&mut handler, "main.js");
        handler.take_outgoing();

        match handler.resume(client::CONTINUE) {
            Err(RemoteError::Rejected(msg)) => {
                assert_eq!(msg, "attempted resume while not at breakpoint")
            }
            other => panic!("unexpected {other:?}"),
        }
        handler.pause().unwrap();
        assert_eq!(
            handler.take_outgoing(),
            vec![Outgoing::Message(vec![client::STOP])]
        );

        handler
            .on_message(&cp_msg(server::BREAKPOINT_HIT, 0x10, &[3]))
            .unwrap();
        handler.take_outgoing();
        assert!(handler.pause().is_err());
        handler.resume(client::NEXT).unwrap();
        assert_eq!(
            handler.take_outgoing(),
            vec![
                Outgoing::Message(vec![client::NEXT]),
                Outgoing::Event(RemoteEvent::Resumed)
            ]
        );
        assert!(!handler.is_stopped());
    }

    #[test]
    fn test_exception_hit_carries_message() {
        let mut handler = configured();
        parse_script(&mut handler, "main.js");
        handler.take_outgoing();

        let mut text = vec![server::EXCEPTION_STR];
        text.extend_from_slice(b"TypeError: ");
        handler.on_message(&text).unwrap();
        let mut text = vec![server::EXCEPTION_STR_END];
        text.extend_from_slice(b"x is undefined");
        handler.on_message(&text).unwrap();
        handler
            .on_message(&cp_msg(server::EXCEPTION_HIT, 0x10, &[9]))
            .unwrap();

        assert_eq!(
            handler.take_outgoing(),
            vec![Outgoing::Event(RemoteEvent::ExceptionHit {
                message: "TypeError: x is undefined".to_string()
            })]
        );
    }

    #[test]
    fn test_evaluate_splits_long_expressions() {
        let mut handler = ProtocolHandler::new();
        handler
            .on_message(&[server::CONFIGURATION, 16, 2, 1, 1])
            .unwrap();
        parse_script(&mut handler, "main.js");
        handler
            .on_message(&cp_msg(server::BREAKPOINT_HIT, 0x10, &[3]))
            .unwrap();
        handler.take_outgoing();

        let expression = "a + a + a + a + a + a";
        let mut result = handler.evaluate(expression).unwrap();
        let sent = handler
            .take_outgoing()
            .into_iter()
            .map(|out| match out {
                Outgoing::Message(m) => m,
                other => panic!("unexpected {other:?}"),
            })
            .collect_vec();

        assert_eq!(sent[0][0], client::EVAL);
        assert_eq!(&sent[0][1..5], &(expression.len() as u32 + 1).to_le_bytes());
        assert!(sent.iter().all(|m| m.len() <= 16));
        assert!(sent[1..].iter().all(|m| m[0] == client::EVAL_PART));
        let mut body = sent[0][5..].to_vec();
        for part in &sent[1..] {
            body.extend_from_slice(&part[1..]);
        }
        assert_eq!(body[0], EVAL_SUBTYPE_EVAL);
        assert_eq!(&body[1..], expression.as_bytes());

        handler
            .on_message(&[server::EVAL_RESULT_END, b'6', 1])
            .unwrap();
        match result.poll() {
            Completion::Done(Ok(r)) => {
                assert_eq!(r.subtype, EvalSubtype::Ok);
                assert_eq!(r.value, "6");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_release_byte_code() {
        let mut handler = configured();
        parse_script(&mut handler, "main.js");
        handler.take_outgoing();

        handler
            .on_message(&cp_msg(server::RELEASE_BYTE_CODE_CP, 0x20, &[]))
            .unwrap();
        assert_eq!(
            handler.take_outgoing(),
            vec![Outgoing::Message(vec![client::FREE_BYTE_CODE_CP, 0x20, 0])]
        );
        assert!(handler.find_breakpoint(1, 5).is_err());
        assert!(handler.find_breakpoint(1, 1).is_ok());
    }

    #[test]
    fn test_waiting_after_parse_is_resumed() {
        let mut handler = configured();
        handler.on_message(&[server::WAITING_AFTER_PARSE]).unwrap();
        assert_eq!(
            handler.take_outgoing(),
            vec![Outgoing::Message(vec![client::PARSER_RESUME])]
        );
    }
}
