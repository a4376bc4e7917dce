//! Debug session controller and the pieces it is built from.

pub mod breakpoints;
pub mod bridge;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod source;

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub use controller::Controller;
pub use error::SessionError;

use crate::dap::protocol::DapRequest;
use crate::remote::{RemoteDebugClient, RemoteSignal, RemoteTarget, SignalSink};
use source::SourceCache;

/// Highest port accepted by `attach`.
pub const MAX_PORT: i64 = 35535;

/// Everything the controller event loop reacts to.
#[derive(Debug)]
pub enum LoopEvent {
    Request(DapRequest),
    /// Signal of the remote client created for session `generation`.
    Remote {
        generation: u64,
        signal: RemoteSignal,
    },
    ClientClosed,
}

/// Creates the remote client for a freshly validated session.
pub type RemoteConnector = Box<dyn FnMut(&RemoteTarget, SignalSink) -> Box<dyn RemoteDebugClient>>;

/// `attach` request arguments as sent by the client.
///
/// Every field is optional on the wire, [`AttachArgs::validate`] reports what is missing. A
/// field of the wrong type counts as missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachArgs {
    #[serde(deserialize_with = "lenient")]
    pub address: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub port: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub local_root: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub debug_log: Option<bool>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl AttachArgs {
    /// Read the arguments of an `attach` request; anything but an object reads as empty.
    pub fn from_request(arguments: &Value) -> Self {
        serde_json::from_value(arguments.clone()).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<SessionConfig, SessionError> {
        let address = match self.address.as_deref() {
            Some(address) if !address.is_empty() => address,
            _ => return Err(SessionError::MissingAddress),
        };
        let port = match self.port {
            Some(port) if (1..=MAX_PORT).contains(&port) => port as u16,
            _ => return Err(SessionError::InvalidPort),
        };
        let local_root = match self.local_root.as_deref() {
            Some(local_root) if !local_root.is_empty() => local_root,
            _ => return Err(SessionError::MissingLocalRoot),
        };

        Ok(SessionConfig {
            target: RemoteTarget {
                address: address.to_string(),
                port,
            },
            local_root: PathBuf::from(local_root),
            debug_log: self.debug_log.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub target: RemoteTarget,
    pub local_root: PathBuf,
    pub debug_log: bool,
}

/// State of one attach, alive until disconnect or until the remote side goes away.
pub struct Session {
    pub config: SessionConfig,
    pub remote: Box<dyn RemoteDebugClient>,
    pub sources: SourceCache,
}

impl Session {
    pub fn new(config: SessionConfig, remote: Box<dyn RemoteDebugClient>) -> Self {
        let sources = SourceCache::new(config.local_root.clone());
        Self {
            config,
            remote,
            sources,
        }
    }
}
