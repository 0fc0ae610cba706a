//! Client-to-server request payloads.
//!
//! Each struct is the payload that follows the packet type byte; the request
//! id is always the first field except for `INIT`, which predates ids in the
//! handshake.

use binrw::prelude::*;

use crate::attrs::FileAttrs;
use crate::wire::WireString;
use crate::{PacketType, SftpRequest};

bitflags::bitflags! {
    /// `SSH_FXP_OPEN` pflags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ   = 0x0000_0001;
        const WRITE  = 0x0000_0002;
        const APPEND = 0x0000_0004;
        const CREAT  = 0x0000_0008;
        const TRUNC  = 0x0000_0010;
        const EXCL   = 0x0000_0020;
    }
}

macro_rules! request_kind {
    ($($ty:ident => $kind:ident,)+) => {
        $(
            impl SftpRequest for $ty {
                const KIND: PacketType = PacketType::$kind;
            }
        )+
    };
}

/// Protocol handshake. The only request without an id.
#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct InitRequest {
    pub version: u32,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct OpenRequest {
    pub id: u32,
    pub path: WireString,
    #[bw(map = |f: &OpenFlags| f.bits())]
    pub pflags: OpenFlags,
    pub attrs: FileAttrs,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct CloseRequest {
    pub id: u32,
    pub handle: WireString,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct ReadRequest {
    pub id: u32,
    pub handle: WireString,
    pub offset: u64,
    pub length: u32,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct WriteRequest {
    pub id: u32,
    pub handle: WireString,
    pub offset: u64,
    pub data: WireString,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct OpendirRequest {
    pub id: u32,
    pub path: WireString,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct ReaddirRequest {
    pub id: u32,
    pub handle: WireString,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct RemoveRequest {
    pub id: u32,
    pub filename: WireString,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct MkdirRequest {
    pub id: u32,
    pub path: WireString,
    pub attrs: FileAttrs,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct RmdirRequest {
    pub id: u32,
    pub path: WireString,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct RealpathRequest {
    pub id: u32,
    pub path: WireString,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct StatRequest {
    pub id: u32,
    pub path: WireString,
}

/// Like [`StatRequest`] but does not follow symlinks.
#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct LstatRequest {
    pub id: u32,
    pub path: WireString,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct SetstatRequest {
    pub id: u32,
    pub path: WireString,
    pub attrs: FileAttrs,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(big)]
pub struct RenameRequest {
    pub id: u32,
    pub oldpath: WireString,
    pub newpath: WireString,
}

request_kind! {
    InitRequest => Init,
    OpenRequest => Open,
    CloseRequest => Close,
    ReadRequest => Read,
    WriteRequest => Write,
    OpendirRequest => Opendir,
    ReaddirRequest => Readdir,
    RemoveRequest => Remove,
    MkdirRequest => Mkdir,
    RmdirRequest => Rmdir,
    RealpathRequest => Realpath,
    StatRequest => Stat,
    LstatRequest => Lstat,
    SetstatRequest => Setstat,
    RenameRequest => Rename,
}
