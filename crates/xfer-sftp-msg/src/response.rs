//! Server-to-client response payloads.

use binrw::prelude::*;
use std::io::Cursor;

use crate::attrs::FileAttrs;
use crate::status::StatusCode;
use crate::wire::WireString;
use crate::{PacketType, Result, SftpMsgError};

/// `SSH_FXP_VERSION`. Extension name/value pairs after the version number
/// are read to exhaustion.
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(big)]
pub struct VersionPayload {
    pub version: u32,
    #[br(parse_with = binrw::helpers::until_eof)]
    pub extensions: Vec<u8>,
}

/// `SSH_FXP_STATUS`. Protocol revisions before 3 sent only the code, so the
/// message and language fields are tolerated as absent.
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(big)]
pub struct StatusPayload {
    pub id: u32,
    pub code: StatusCode,
    #[br(try)]
    pub message: Option<WireString>,
    #[br(try)]
    pub language: Option<WireString>,
}

/// `SSH_FXP_HANDLE`: an opaque token naming an open file or directory.
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(big)]
pub struct HandlePayload {
    pub id: u32,
    pub handle: WireString,
}

/// `SSH_FXP_DATA`: one read's worth of file bytes.
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(big)]
pub struct DataPayload {
    pub id: u32,
    pub data: WireString,
}

/// One entry of a `SSH_FXP_NAME` response.
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(big)]
pub struct NameEntry {
    pub filename: WireString,
    /// The server's `ls -l`-style presentation line; listing parsers run on
    /// this rather than on the attribute block.
    pub longname: WireString,
    pub attrs: FileAttrs,
}

/// `SSH_FXP_NAME`: directory entries or a resolved path.
#[binrw::binread]
#[derive(Debug, Clone, PartialEq, Eq)]
#[br(big)]
pub struct NamePayload {
    pub id: u32,
    #[br(temp)]
    count: u32,
    #[br(count = count)]
    pub entries: Vec<NameEntry>,
}

/// `SSH_FXP_ATTRS`: a stat result.
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(big)]
pub struct AttrsPayload {
    pub id: u32,
    pub attrs: FileAttrs,
}

/// A decoded response packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Version(VersionPayload),
    Status(StatusPayload),
    Handle(HandlePayload),
    Data(DataPayload),
    Name(NamePayload),
    Attrs(AttrsPayload),
}

impl Response {
    /// Decodes a response payload for the given packet type byte.
    pub fn decode(kind: u8, payload: &[u8]) -> Result<Response> {
        fn read<T>(kind: &'static str, payload: &[u8]) -> Result<T>
        where
            T: for<'a> BinRead<Args<'a> = ()>,
        {
            T::read_be(&mut Cursor::new(payload))
                .map_err(|source| SftpMsgError::Malformed { kind, source })
        }

        match kind {
            k if k == PacketType::Version as u8 => {
                Ok(Response::Version(read("VERSION", payload)?))
            }
            k if k == PacketType::Status as u8 => {
                Ok(Response::Status(read("STATUS", payload)?))
            }
            k if k == PacketType::Handle as u8 => {
                Ok(Response::Handle(read("HANDLE", payload)?))
            }
            k if k == PacketType::Data as u8 => Ok(Response::Data(read("DATA", payload)?)),
            k if k == PacketType::Name as u8 => Ok(Response::Name(read("NAME", payload)?)),
            k if k == PacketType::Attrs as u8 => {
                Ok(Response::Attrs(read("ATTRS", payload)?))
            }
            other => Err(SftpMsgError::UnknownType(other)),
        }
    }

    /// The request id this response answers. `VERSION` has none.
    pub fn id(&self) -> Option<u32> {
        match self {
            Response::Version(_) => None,
            Response::Status(p) => Some(p.id),
            Response::Handle(p) => Some(p.id),
            Response::Data(p) => Some(p.id),
            Response::Name(p) => Some(p.id),
            Response::Attrs(p) => Some(p.id),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Response::Version(_) => "VERSION",
            Response::Status(_) => "STATUS",
            Response::Handle(_) => "HANDLE",
            Response::Data(_) => "DATA",
            Response::Name(_) => "NAME",
            Response::Attrs(_) => "ATTRS",
        }
    }
}
