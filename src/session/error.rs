use crate::remote::RemoteError;

/// Errors reported back to the client in response to a request.
///
/// The display text is the message the client sees.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    // --------------------------------- attach argument validation --------------------------------
    #[error("Must specify an address")]
    MissingAddress,
    #[error("Must specify a valid port")]
    InvalidPort,
    #[error("Must specify a localRoot")]
    MissingLocalRoot,

    // --------------------------------- unsupported operations ------------------------------------
    #[error("Launching is not supported. Use Attach.")]
    LaunchUnsupported,
    #[error("Unrecognized request: {0}")]
    UnknownRequest(String),

    // --------------------------------- request errors --------------------------------------------
    #[error("No active debug session")]
    NoSession,
    #[error("invalid arguments: {0}")]
    Arguments(#[from] serde_json::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
