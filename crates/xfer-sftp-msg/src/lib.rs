//! SFTP version 3 wire messages.
//!
//! Every packet on the wire is framed as `u32 length | u8 type | payload`,
//! big-endian, where `length` covers the type byte and the payload. All
//! requests except `INIT` carry a `u32` request id as the first payload
//! field; the peer echoes it in the response.
//!
//! Reference: draft-ietf-secsh-filexfer-02 (the revision OpenSSH speaks).

pub mod attrs;
pub mod request;
pub mod response;
pub mod status;
pub mod wire;

pub use attrs::FileAttrs;
pub use request::*;
pub use response::{
    AttrsPayload, DataPayload, HandlePayload, NameEntry, NamePayload, Response,
    StatusPayload, VersionPayload,
};
pub use status::StatusCode;
pub use wire::WireString;

use binrw::{BinRead, BinWrite};

/// The protocol revision this crate implements.
pub const PROTOCOL_VERSION: u32 = 3;

/// Upper bound on a whole frame (type byte + payload). Anything larger is a
/// protocol violation in either direction.
pub const MAX_PACKET_SIZE: usize = 34000;

/// Payload cap for a single `WRITE`, leaving frame headroom for the handle
/// and offset fields under [`MAX_PACKET_SIZE`].
pub const WRITE_CHUNK_SIZE: usize = 32500;

/// SFTP packet type codes.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(big, repr(u8))]
pub enum PacketType {
    Init = 1,
    Version = 2,
    Open = 3,
    Close = 4,
    Read = 5,
    Write = 6,
    Lstat = 7,
    Fstat = 8,
    Setstat = 9,
    Fsetstat = 10,
    Opendir = 11,
    Readdir = 12,
    Remove = 13,
    Mkdir = 14,
    Rmdir = 15,
    Realpath = 16,
    Stat = 17,
    Rename = 18,
    Status = 101,
    Handle = 102,
    Data = 103,
    Name = 104,
    Attrs = 105,
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, *self as u8)
    }
}

/// Errors for encoding or decoding SFTP messages.
#[derive(Debug, thiserror::Error)]
pub enum SftpMsgError {
    #[error("message size {0} too big")]
    TooLarge(usize),

    #[error("unknown packet type {0}")]
    UnknownType(u8),

    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: &'static str,
        source: binrw::Error,
    },
}

/// SFTP message result type
pub type Result<T> = std::result::Result<T, SftpMsgError>;

/// A request payload that serializes with a fixed packet type.
pub trait SftpRequest: for<'a> BinWrite<Args<'a> = ()> {
    const KIND: PacketType;
}

/// Serializes a request into one framed packet, length prefix included.
pub fn encode_request<T: SftpRequest>(req: &T) -> Result<Vec<u8>> {
    let mut payload = std::io::Cursor::new(Vec::new());
    req.write_be(&mut payload)
        .map_err(|source| SftpMsgError::Malformed {
            kind: "request",
            source,
        })?;
    let payload = payload.into_inner();

    let framed_len = payload.len() + 1;
    if framed_len > MAX_PACKET_SIZE {
        return Err(SftpMsgError::TooLarge(framed_len));
    }

    let mut out = Vec::with_capacity(framed_len + 4);
    out.extend_from_slice(&(framed_len as u32).to_be_bytes());
    out.push(T::KIND as u8);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parses the 4-byte length prefix, validating it against the frame cap.
/// The returned count covers the type byte and the payload.
pub fn decode_frame_len(prefix: [u8; 4]) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len == 0 || len > MAX_PACKET_SIZE {
        return Err(SftpMsgError::TooLarge(len));
    }
    Ok(len)
}
