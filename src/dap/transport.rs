//! DAP message framing (`Content-Length` headers followed by a JSON body).
//! Works over stdio as well as over a TCP connection in server mode.

use std::io::{BufRead, Write};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use serde::Serialize;
use serde_json::Value;

use super::protocol::{DapRequest, Event, Response};
use super::tracer::FileTracer;
use super::ClientSink;
use crate::session::LoopEvent;

/// Reading half of a DAP connection.
pub struct DapReader<R> {
    reader: R,
    tracer: Option<FileTracer>,
}

impl<R: BufRead> DapReader<R> {
    pub fn new(reader: R, tracer: Option<FileTracer>) -> Self {
        Self { reader, tracer }
    }

    /// Read a single DAP message, `None` once the peer closed the stream.
    pub fn read_message(&mut self) -> anyhow::Result<Option<Value>> {
        let mut content_length: Option<usize> = None;
        let mut header_seen = false;
        loop {
            let mut line = String::new();
            let read_n = self.reader.read_line(&mut line)?;
            if read_n == 0 {
                if header_seen {
                    return Err(anyhow!("DAP connection closed inside a message header"));
                }
                return Ok(None);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if header_seen {
                    break;
                }
                continue;
            }
            header_seen = true;
            if let Some(v) = line.strip_prefix("Content-Length:") {
                content_length = Some(v.trim().parse()?);
            }
        }

        let len = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        let msg: Value = serde_json::from_slice(&buf)?;
        if let Some(tracer) = &self.tracer {
            tracer.inbound(&msg);
        }
        Ok(Some(msg))
    }
}

impl<R: BufRead + Send + 'static> DapReader<R> {
    /// Forward incoming requests to the event loop until the stream ends.
    pub fn spawn(mut self, events: Sender<LoopEvent>) -> JoinHandle<()> {
        thread::spawn(move || {
            loop {
                match self.read_message() {
                    Ok(Some(message)) => match serde_json::from_value::<DapRequest>(message) {
                        Ok(request) if request.r#type == "request" => {
                            if events.send(LoopEvent::Request(request)).is_err() {
                                return;
                            }
                        }
                        Ok(other) => {
                            log::warn!(target: "dap", "ignore non-request message: {}", other.r#type)
                        }
                        Err(err) => log::warn!(target: "dap", "malformed request: {err}"),
                    },
                    Ok(None) => break,
                    Err(err) => {
                        log::warn!(target: "dap", "DAP read failed: {err:#}");
                        break;
                    }
                }
            }
            let _ = events.send(LoopEvent::ClientClosed);
        })
    }
}

/// Writing half of a DAP connection. Owns the outbound sequence counter.
pub struct DapWriter<W> {
    writer: W,
    seq: i64,
    tracer: Option<FileTracer>,
}

impl<W: Write> DapWriter<W> {
    pub fn new(writer: W, tracer: Option<FileTracer>) -> Self {
        Self {
            writer,
            seq: 0,
            tracer,
        }
    }

    fn next_seq(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    pub fn write_message<T: Serialize>(&mut self, v: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(v)?;
        if let Some(tracer) = &self.tracer {
            tracer.outbound(&payload);
        }
        write!(self.writer, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> ClientSink for DapWriter<W> {
    fn respond(&mut self, response: Response) -> anyhow::Result<()> {
        let seq = self.next_seq();
        self.write_message(&response.into_envelope(seq))
    }

    fn send_event(&mut self, event: Event) -> anyhow::Result<()> {
        let seq = self.next_seq();
        self.write_message(&event.into_envelope(seq))
    }
}
