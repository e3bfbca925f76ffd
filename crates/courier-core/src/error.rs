use thiserror::Error;

/// Top-level error type for Courier.
#[derive(Debug, Error)]
pub enum CourierError {
    /// A poller is already running, either on this instance or in another
    /// process holding the lock file. `pid` is the owner recorded in the
    /// lock file, when known.
    #[error("poller already running{}", pid_suffix(.pid))]
    AlreadyRunning { pid: Option<u32> },

    /// The single-instance lock could not be created or taken.
    #[error("lock unavailable: {0}")]
    LockUnavailable(String),

    /// Error talking to the Bot API.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Failure of a single Bot API request. Always recoverable from the
/// poller's point of view.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level failure (connect, timeout, TLS, ...).
    #[error("http error: {0}")]
    Http(String),

    /// The API answered with `ok: false`.
    #[error("api error{}: {description}", code_suffix(.code))]
    Api {
        code: Option<i64>,
        description: String,
    },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

fn pid_suffix(pid: &Option<u32>) -> String {
    pid.map(|p| format!(" with pid {p}")).unwrap_or_default()
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(" {c}")).unwrap_or_default()
}
