use std::io;

/// Errors produced by the transport layer.
///
/// Every variant here is transient from the engine's point of view: the
/// request gets disconnected and the scheduler may reconnect and retry.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot look up hostname {host}: {source}")]
    Lookup { host: String, source: io::Error },

    #[error("cannot connect to {host}: {source}")]
    Connect { host: String, source: io::Error },

    #[error("connection to {0} timed out")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("connection closed by remote end")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// True when the error was caused by the local cancel flag rather than
    /// the network.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}
