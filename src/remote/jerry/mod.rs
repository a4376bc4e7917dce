//! JerryScript (IoT.js) remote debugger client.
//!
//! The engine serves its debugger as a WebSocket endpoint. After the upgrade the socket is read
//! by a background thread that forwards every inbound protocol message to the event loop as
//! [`RemoteSignal::Message`]; decoding and all protocol state live in [`ProtocolHandler`] on the
//! loop thread. Outgoing messages are written from the loop thread through a second WebSocket
//! over a clone of the same TCP stream.

pub mod constants;
pub mod handler;

use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use bytes::Bytes;
use tungstenite::protocol::Role;
use tungstenite::{Message, WebSocket};

use self::constants::{client, ENDPOINT};
use self::handler::{Outgoing, ProtocolHandler};
use crate::remote::{
    BacktraceFrame, BreakpointHandle, EvalResult, Pending, RemoteDebugClient, RemoteError,
    RemoteEvent, RemoteSignal, RemoteTarget, ScriptId, SignalSink,
};

type Socket = WebSocket<TcpStream>;

/// Write half of the connection, shared with the connect thread.
#[derive(Default)]
struct Channel {
    socket: Option<Socket>,
    /// Set by `disconnect`, a handshake that completes afterwards is dropped.
    closed: bool,
}

type SharedChannel = Arc<Mutex<Channel>>;

pub struct JerryClient {
    target: RemoteTarget,
    sink: SignalSink,
    handler: ProtocolHandler,
    channel: SharedChannel,
}

impl JerryClient {
    pub fn new(target: RemoteTarget, sink: SignalSink) -> Self {
        Self {
            target,
            sink,
            handler: ProtocolHandler::new(),
            channel: Arc::default(),
        }
    }

    /// Write queued protocol messages and forward queued notifications.
    fn flush(&mut self) -> Result<(), RemoteError> {
        for out in self.handler.take_outgoing() {
            match out {
                Outgoing::Message(message) => self.write(&message)?,
                Outgoing::Event(event) => (self.sink)(RemoteSignal::Event(event)),
            }
        }
        Ok(())
    }

    fn write(&self, message: &[u8]) -> Result<(), RemoteError> {
        let mut channel = lock(&self.channel)?;
        let socket = channel.socket.as_mut().ok_or(RemoteError::NotConnected)?;
        socket.send(Message::Binary(Bytes::copy_from_slice(message)))?;
        Ok(())
    }

    fn submit<T>(&mut self, request: Result<Pending<T>, RemoteError>) -> Pending<T> {
        match request.and_then(|pending| self.flush().map(|_| pending)) {
            Ok(pending) => pending,
            Err(err) => Pending::rejected(err),
        }
    }
}

fn lock(channel: &SharedChannel) -> Result<std::sync::MutexGuard<'_, Channel>, RemoteError> {
    channel
        .lock()
        .map_err(|_| RemoteError::Connection("socket lock poisoned".to_string()))
}

fn shutdown(socket: &Socket) {
    if let Err(err) = socket.get_ref().shutdown(Shutdown::Both) {
        log::debug!(target: "remote", "socket shutdown: {err}");
    }
}

impl RemoteDebugClient for JerryClient {
    fn connect(&mut self) {
        let target = self.target.clone();
        let channel = self.channel.clone();
        let sink = self.sink.clone();

        thread::spawn(move || {
            let (reader, writer) = match open(&target) {
                Ok(sockets) => sockets,
                Err(err) => {
                    log::warn!(target: "remote", "connect to {target} failed: {err}");
                    sink(RemoteSignal::ConnectFailed(err.to_string()));
                    return;
                }
            };

            match lock(&channel) {
                Ok(mut channel) if !channel.closed => channel.socket = Some(writer),
                Ok(_) => {
                    log::debug!(target: "remote", "session closed during handshake with {target}");
                    shutdown(&writer);
                    return;
                }
                Err(err) => {
                    shutdown(&writer);
                    sink(RemoteSignal::ConnectFailed(err.to_string()));
                    return;
                }
            }
            sink(RemoteSignal::Connected);

            if let Err(err) = read_messages(reader, &sink) {
                log::debug!(target: "remote", "remote connection ended: {err}");
            }
            sink(RemoteSignal::Event(RemoteEvent::Closed));
        });
    }

    fn disconnect(&mut self) {
        let Ok(mut channel) = self.channel.lock() else {
            return;
        };
        channel.closed = true;
        if let Some(mut socket) = channel.socket.take() {
            if let Err(err) = socket.close(None) {
                log::debug!(target: "remote", "close handshake: {err}");
            }
            shutdown(&socket);
        }
    }

    fn on_message(&mut self, message: &[u8]) -> Result<(), RemoteError> {
        let result = self.handler.on_message(message);
        // whatever was decoded before a failure still has to go out
        self.flush()?;
        result
    }

    fn resume(&mut self) -> Pending<()> {
        let request = self.handler.resume(client::CONTINUE);
        self.submit(request)
    }

    fn step_over(&mut self) -> Pending<()> {
        let request = self.handler.resume(client::NEXT);
        self.submit(request)
    }

    fn step_into(&mut self) -> Pending<()> {
        let request = self.handler.resume(client::STEP);
        self.submit(request)
    }

    fn step_out(&mut self) -> Pending<()> {
        let request = self.handler.resume(client::FINISH);
        self.submit(request)
    }

    fn pause(&mut self) -> Pending<()> {
        let request = self.handler.pause();
        self.submit(request)
    }

    fn script_id_by_name(&self, name: &str) -> Result<ScriptId, RemoteError> {
        self.handler.script_id_by_name(name)
    }

    fn active_breakpoint_lines(&self, script_id: ScriptId) -> Vec<u32> {
        self.handler.active_breakpoint_lines(script_id)
    }

    fn find_breakpoint(
        &self,
        script_id: ScriptId,
        line: u32,
    ) -> Result<BreakpointHandle, RemoteError> {
        self.handler.find_breakpoint(script_id, line)
    }

    fn update_breakpoint(&mut self, breakpoint: &BreakpointHandle, enable: bool) -> Pending<()> {
        let request = self.handler.update_breakpoint(breakpoint, enable);
        self.submit(request)
    }

    fn evaluate(&mut self, expression: &str) -> Pending<EvalResult> {
        let request = self.handler.evaluate(expression);
        self.submit(request)
    }

    fn backtrace(&mut self) -> Pending<Vec<BacktraceFrame>> {
        let request = self.handler.backtrace();
        self.submit(request)
    }

    fn source(&self, script_id: ScriptId) -> Result<String, RemoteError> {
        self.handler.source(script_id)
    }
}

/// Connect and upgrade to the debugger WebSocket endpoint. Returns the read and the write half.
fn open(target: &RemoteTarget) -> Result<(Socket, Socket), RemoteError> {
    let stream = TcpStream::connect((target.address.as_str(), target.port))?;
    stream.set_nodelay(true)?;
    let write_stream = stream.try_clone()?;

    let (reader, _) = tungstenite::client::client(format!("ws://{target}{ENDPOINT}"), stream)
        .map_err(|err| RemoteError::Connection(format!("websocket handshake: {err}")))?;
    let writer = WebSocket::from_raw_socket(write_stream, Role::Client, None);
    Ok((reader, writer))
}

/// Forward inbound messages until the engine hangs up. Pings are answered by the socket.
fn read_messages(mut socket: Socket, sink: &SignalSink) -> Result<(), RemoteError> {
    loop {
        match socket.read() {
            Ok(Message::Binary(message)) => sink(RemoteSignal::Message(message.to_vec())),
            Ok(Message::Text(text)) => {
                sink(RemoteSignal::Message(text.as_str().as_bytes().to_vec()))
            }
            Ok(Message::Close(_)) | Err(tungstenite::Error::ConnectionClosed) => return Ok(()),
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }
}
