//! iotjs-dap - Debug Adapter Protocol bridge to the IoT.js / JerryScript remote debugger.
//!
//! Talks DAP over stdin/stdout by default, or over TCP with `--server`.

mod args;

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use args::Args;
use iotjs_dap::dap::tracer::FileTracer;
use iotjs_dap::dap::transport::{DapReader, DapWriter};
use iotjs_dap::remote::jerry::JerryClient;
use iotjs_dap::remote::{RemoteDebugClient, RemoteTarget, SignalSink};
use iotjs_dap::session::{Controller, RemoteConnector};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    iotjs_dap::log::init(args.log_file.as_deref())?;

    let tracer = match (&args.log_file, args.trace_dap) {
        (Some(path), true) => Some(FileTracer::new(path)?),
        (None, true) => {
            warn!(target: "dap", "--trace-dap requires --log-file; tracing disabled");
            None
        }
        _ => None,
    };

    let Some(listen) = &args.server else {
        info!(target: "dap", "serving DAP on stdio");
        return serve(
            BufReader::new(io::stdin()),
            BufWriter::new(io::stdout()),
            tracer,
        );
    };

    let addr: SocketAddr = listen.parse().context("Invalid listen address")?;
    let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
    info!(target: "dap", "iotjs-dap listening on {addr}");

    // one client == one debug session, clients are served one after another
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(v) => v,
            Err(err) => {
                warn!(target: "dap", "accept failed: {err:#}");
                continue;
            }
        };
        info!(target: "dap", "DAP client connected: {peer}");
        if let Some(t) = &tracer {
            t.line(&format!("client connected: {peer}"));
        }

        let res = serve_tcp(stream, tracer.clone());
        if let Err(err) = res {
            warn!(target: "dap", "session ended with error: {err:#}");
            if let Some(t) = &tracer {
                t.line(&format!("session error: {err:#}"));
            }
        } else if let Some(t) = &tracer {
            t.line("session finished OK");
        }

        if args.oneshot {
            break;
        }
    }
    Ok(())
}

fn serve_tcp(stream: TcpStream, tracer: Option<FileTracer>) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone().context("clone DAP stream")?);
    serve(reader, BufWriter::new(stream), tracer)
}

/// Run one client session to completion.
fn serve<R, W>(reader: R, writer: W, tracer: Option<FileTracer>) -> anyhow::Result<()>
where
    R: BufRead + Send + 'static,
    W: Write,
{
    let (tx, rx) = mpsc::channel();
    DapReader::new(reader, tracer.clone()).spawn(tx.clone());

    let connector: RemoteConnector = Box::new(|target: &RemoteTarget, sink: SignalSink| {
        Box::new(JerryClient::new(target.clone(), sink)) as Box<dyn RemoteDebugClient>
    });
    Controller::new(DapWriter::new(writer, tracer), connector, tx).run(rx)
}
