//! SFTP v3 file attributes.

use binrw::{Endian, prelude::*};
use std::io::{Read, Seek, Write};

use crate::wire::WireString;

bitflags::bitflags! {
    /// Presence flags in the attribute block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttrFlags: u32 {
        const SIZE        = 0x0000_0001;
        const UIDGID      = 0x0000_0002;
        const PERMISSIONS = 0x0000_0004;
        const ACMODTIME   = 0x0000_0008;
        const EXTENDED    = 0x8000_0000;
    }
}

/// File attribute block: a flags word followed by the fields the flags
/// declare present, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttrs {
    pub size: Option<u64>,
    pub uid_gid: Option<(u32, u32)>,
    pub permissions: Option<u32>,
    /// `(atime, mtime)` in unix seconds.
    pub times: Option<(u32, u32)>,
    pub extended: Vec<(WireString, WireString)>,
}

impl FileAttrs {
    /// An empty block (no fields present), used where the protocol wants an
    /// attribute structure but the client has nothing to say.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_permissions(permissions: u32) -> Self {
        Self {
            permissions: Some(permissions),
            ..Self::default()
        }
    }

    pub fn with_times(atime: u32, mtime: u32) -> Self {
        Self {
            times: Some((atime, mtime)),
            ..Self::default()
        }
    }

    fn flags(&self) -> AttrFlags {
        let mut flags = AttrFlags::empty();
        if self.size.is_some() {
            flags |= AttrFlags::SIZE;
        }
        if self.uid_gid.is_some() {
            flags |= AttrFlags::UIDGID;
        }
        if self.permissions.is_some() {
            flags |= AttrFlags::PERMISSIONS;
        }
        if self.times.is_some() {
            flags |= AttrFlags::ACMODTIME;
        }
        if !self.extended.is_empty() {
            flags |= AttrFlags::EXTENDED;
        }
        flags
    }
}

impl BinRead for FileAttrs {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        let raw = u32::read_options(reader, Endian::Big, ())?;
        let flags = AttrFlags::from_bits_retain(raw);
        let mut attrs = FileAttrs::default();

        if flags.contains(AttrFlags::SIZE) {
            attrs.size = Some(u64::read_options(reader, Endian::Big, ())?);
        }
        if flags.contains(AttrFlags::UIDGID) {
            let uid = u32::read_options(reader, Endian::Big, ())?;
            let gid = u32::read_options(reader, Endian::Big, ())?;
            attrs.uid_gid = Some((uid, gid));
        }
        if flags.contains(AttrFlags::PERMISSIONS) {
            attrs.permissions = Some(u32::read_options(reader, Endian::Big, ())?);
        }
        if flags.contains(AttrFlags::ACMODTIME) {
            let atime = u32::read_options(reader, Endian::Big, ())?;
            let mtime = u32::read_options(reader, Endian::Big, ())?;
            attrs.times = Some((atime, mtime));
        }
        if flags.contains(AttrFlags::EXTENDED) {
            let count = u32::read_options(reader, Endian::Big, ())?;
            for _ in 0..count {
                let name = WireString::read_options(reader, Endian::Big, ())?;
                let value = WireString::read_options(reader, Endian::Big, ())?;
                attrs.extended.push((name, value));
            }
        }

        Ok(attrs)
    }
}

impl BinWrite for FileAttrs {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        self.flags().bits().write_options(writer, Endian::Big, ())?;

        if let Some(size) = self.size {
            size.write_options(writer, Endian::Big, ())?;
        }
        if let Some((uid, gid)) = self.uid_gid {
            uid.write_options(writer, Endian::Big, ())?;
            gid.write_options(writer, Endian::Big, ())?;
        }
        if let Some(permissions) = self.permissions {
            permissions.write_options(writer, Endian::Big, ())?;
        }
        if let Some((atime, mtime)) = self.times {
            atime.write_options(writer, Endian::Big, ())?;
            mtime.write_options(writer, Endian::Big, ())?;
        }
        if !self.extended.is_empty() {
            (self.extended.len() as u32).write_options(writer, Endian::Big, ())?;
            for (name, value) in &self.extended {
                name.write_options(writer, Endian::Big, ())?;
                value.write_options(writer, Endian::Big, ())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn empty_block_is_a_zero_flags_word() {
        let mut buf = Cursor::new(Vec::new());
        FileAttrs::empty().write_be(&mut buf).unwrap();
        assert_eq!(buf.into_inner(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn permissions_only() {
        let attrs = FileAttrs::with_permissions(0o644);
        let mut buf = Cursor::new(Vec::new());
        attrs.write_be(&mut buf).unwrap();
        let bytes = buf.into_inner();
        assert_eq!(&bytes[..4], &4u32.to_be_bytes());
        assert_eq!(&bytes[4..], &0o644u32.to_be_bytes());

        let parsed = FileAttrs::read_be(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed, attrs);
    }

    #[test]
    fn full_block_round_trips() {
        let attrs = FileAttrs {
            size: Some(1_000_000),
            uid_gid: Some((1000, 100)),
            permissions: Some(0o100644),
            times: Some((1_600_000_000, 1_600_000_001)),
            extended: vec![],
        };
        let mut buf = Cursor::new(Vec::new());
        attrs.write_be(&mut buf).unwrap();
        let parsed = FileAttrs::read_be(&mut Cursor::new(buf.into_inner())).unwrap();
        assert_eq!(parsed, attrs);
    }

    #[test]
    fn unknown_flag_bits_are_tolerated_on_read() {
        // Only the size bit maps to a field we read; unknown upper bits must
        // not break parsing of the declared fields.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(AttrFlags::SIZE.bits() | 0x0000_0100).to_be_bytes());
        bytes.extend_from_slice(&42u64.to_be_bytes());
        let parsed = FileAttrs::read_be(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed.size, Some(42));
    }
}
