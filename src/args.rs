use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Serve DAP over TCP on this address instead of stdin/stdout (e.g. 127.0.0.1:4711).
    #[clap(long)]
    pub server: Option<String>,

    /// Exit after the first debug session ends (server mode only).
    #[clap(long)]
    pub oneshot: bool,

    /// Optional log file for adapter diagnostics (stderr otherwise).
    #[clap(long, env = "IOTJS_DAP_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Trace DAP traffic (requests/responses/events) into the log file.
    /// Requires --log-file.
    #[clap(long)]
    pub trace_dap: bool,
}
