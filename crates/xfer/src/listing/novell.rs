//! Novell NetWare listing lines.

use super::{next_token, parse_file_size};
use crate::file::FileRecord;
use crate::mode::mode_from_attribs;
use crate::{Error, Result};

/// `d [RWCEAFMS] dillon                512 Oct 16 15:55 coldfusion`
///
/// A 12-character attribute block, the owner, the size, the date, and the
/// file name.
pub fn parse(line: &str) -> Result<FileRecord> {
    let fail = || Error::ListingParse(line.to_string());

    let bytes = line.as_bytes();
    if bytes.len() < 14 || bytes[12] != b' ' {
        return Err(fail());
    }

    let mut record = FileRecord::new(String::new());
    record.mode = mode_from_attribs(&line[..12]);
    record.group = "unknown".to_string();

    let rest = &line[13..];
    let (user, rest) = next_token(rest).ok_or_else(fail)?;
    record.user = user.to_string();

    // The size is the first numeric column after the owner.
    let idx = rest.find(|c: char| c.is_ascii_digit()).ok_or_else(fail)?;
    record.size = parse_file_size(&rest[idx..]);

    let rest = super::skip_token(&rest[idx..]);
    let (datetime, name_part) = super::time::parse_time(rest);
    record.mtime = datetime;

    if name_part.is_empty() {
        return Err(fail());
    }
    record.name = name_part.to_string();
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_line() {
        let rec = parse("d [RWCEAFMS] dillon                512 Oct 16 15:55 coldfusion").unwrap();
        assert!(rec.is_dir());
        assert_eq!(rec.user, "dillon");
        assert_eq!(rec.size, 512);
        assert_eq!(rec.name, "coldfusion");
    }

    #[test]
    fn file_line() {
        let rec = parse("- [RWCEAFMS] dillon               4096 Jan 12 09:15 index.html").unwrap();
        assert!(!rec.is_dir());
        assert_eq!(rec.name, "index.html");
    }

    #[test]
    fn malformed_attribute_block_fails() {
        assert!(parse("d [RW] dillon 512 Oct 16 15:55 x").is_err());
    }
}
