//! SFTP status codes.

use binrw::prelude::*;

/// Status codes carried by `SSH_FXP_STATUS`.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(big, repr(u32))]
pub enum StatusCode {
    Ok = 0,
    Eof = 1,
    NoSuchFile = 2,
    PermissionDenied = 3,
    Failure = 4,
    BadMessage = 5,
    NoConnection = 6,
    ConnectionLost = 7,
    Unsupported = 8,
}

impl StatusCode {
    /// True for codes that leave the session unusable.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            StatusCode::BadMessage | StatusCode::NoConnection | StatusCode::ConnectionLost
        )
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StatusCode::Ok => "OK",
            StatusCode::Eof => "EOF",
            StatusCode::NoSuchFile => "No such file or directory",
            StatusCode::PermissionDenied => "Permission denied",
            StatusCode::Failure => "Failure",
            StatusCode::BadMessage => "Bad message",
            StatusCode::NoConnection => "No connection",
            StatusCode::ConnectionLost => "Connection lost",
            StatusCode::Unsupported => "Operation unsupported",
        };
        write!(f, "{text}")
    }
}
