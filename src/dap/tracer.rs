//! DAP traffic trace, appended to the adapter log file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::Value;

/// Shared handle to the trace file; clones append to the same file.
#[derive(Clone)]
pub struct FileTracer {
    file: Arc<Mutex<File>>,
}

impl FileTracer {
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open trace file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Message received from the client.
    pub fn inbound(&self, message: &Value) {
        self.line(&format!("<- {message}"));
    }

    /// Serialized message sent to the client.
    pub fn outbound(&self, payload: &[u8]) {
        self.line(&format!("-> {}", String::from_utf8_lossy(payload)));
    }

    pub fn line(&self, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            // a broken trace must not break the session
            let _ = writeln!(file, "{text}");
        }
    }
}
