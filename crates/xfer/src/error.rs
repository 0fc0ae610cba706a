//! Engine error type and severity classification.

use xfer_sftp_msg::SftpMsgError;
use xfer_transport::TransportError;

/// How the scheduler should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Stop the current operation and the enclosing transfer file.
    Fatal,
    /// Transient. The affected request has been (or may be) disconnected;
    /// the scheduler may reconnect and retry.
    Retryable,
    /// Per-file failure (missing file, permission). The request stays open;
    /// the scheduler skips the file.
    Logical,
}

/// Errors surfaced by the engine.
///
/// Protocol drivers map server codes onto these variants; no raw protocol
/// values leak upward. The last server response line is kept on the request
/// for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered, but with a failure class the operation cannot
    /// recover from inside this connection.
    #[error("server said: {0}")]
    ServerResponse(String),

    /// The server refused an operation in a way worth retrying on a fresh
    /// connection (FTP 4xx, HTTP 5xx).
    #[error("server said: {0}")]
    Transient(String),

    /// Malformed or unexpected protocol data.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    SftpMessage(#[from] SftpMsgError),

    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Server-reported per-file failure (FTP 550 class, SFTP `Failure`).
    #[error("remote failure: {0}")]
    RemoteFailure(String),

    #[error("{0} is not supported by this protocol")]
    Unsupported(&'static str),

    #[error("not connected")]
    NotConnected,

    #[error("connection lost")]
    ConnectionLost,

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("cannot parse listing line: {0}")]
    ListingParse(String),

    #[error("maximum retries reached")]
    RetriesExhausted,

    #[error("transfer cancelled")]
    Cancelled,
}

impl Error {
    pub fn severity(&self) -> Severity {
        match self {
            // Transport failures tear the connection down; the scheduler
            // may rebuild it. Cancellation rides the same path so that the
            // next operation fails promptly.
            Error::Transport(_)
            | Error::Io(_)
            | Error::Transient(_)
            | Error::ConnectionLost
            | Error::Cancelled => Severity::Retryable,

            Error::NotFound(_) | Error::PermissionDenied(_) | Error::RemoteFailure(_) => {
                Severity::Logical
            }

            Error::ServerResponse(_)
            | Error::Protocol(_)
            | Error::SftpMessage(_)
            | Error::Unsupported(_)
            | Error::NotConnected
            | Error::Url(_)
            | Error::ListingParse(_)
            | Error::RetriesExhausted => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    pub fn is_retryable(&self) -> bool {
        self.severity() == Severity::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        let err = Error::from(TransportError::Timeout("host".into()));
        assert_eq!(err.severity(), Severity::Retryable);
    }

    #[test]
    fn missing_files_are_logical() {
        assert_eq!(
            Error::NotFound("a.txt".into()).severity(),
            Severity::Logical
        );
        assert_eq!(
            Error::PermissionDenied("a.txt".into()).severity(),
            Severity::Logical
        );
    }

    #[test]
    fn malformed_responses_are_fatal() {
        assert_eq!(
            Error::Protocol("bad PASV".into()).severity(),
            Severity::Fatal
        );
        assert_eq!(Error::Unsupported("mkdir").severity(), Severity::Fatal);
    }
}
