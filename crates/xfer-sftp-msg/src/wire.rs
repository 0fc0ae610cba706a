//! [`WireString`] implementation for binrw.

use binrw::{Endian, prelude::*};
use std::io::{Read, Seek, Write};

/// An SFTP string: `u32` byte count followed by the bytes.
///
/// SFTP strings are not guaranteed to be UTF-8 (file names come from the
/// server's filesystem as-is), so the payload stays a byte vector and
/// [`WireString::as_str_lossy`] is the display path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireString(pub Vec<u8>);

impl WireString {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl From<&str> for WireString {
    fn from(value: &str) -> Self {
        WireString(value.as_bytes().to_vec())
    }
}

impl From<&[u8]> for WireString {
    fn from(value: &[u8]) -> Self {
        WireString(value.to_vec())
    }
}

impl From<String> for WireString {
    fn from(value: String) -> Self {
        WireString(value.into_bytes())
    }
}

impl BinRead for WireString {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        let len = u32::read_options(reader, Endian::Big, ())?;
        let mut data = vec![0u8; len as usize];
        reader.read_exact(&mut data)?;
        Ok(WireString(data))
    }
}

impl BinWrite for WireString {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        (self.0.len() as u32).write_options(writer, Endian::Big, ())?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let s = WireString::from("/tmp/file.txt");
        let mut buf = Cursor::new(Vec::new());
        s.write_be(&mut buf).unwrap();

        let encoded = buf.into_inner();
        assert_eq!(&encoded[..4], &13u32.to_be_bytes());

        let decoded = WireString::read_be(&mut Cursor::new(encoded)).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn empty_string() {
        let mut buf = Cursor::new(Vec::new());
        WireString::default().write_be(&mut buf).unwrap();
        assert_eq!(buf.into_inner(), vec![0, 0, 0, 0]);
    }
}
