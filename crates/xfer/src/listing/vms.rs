//! VMS listing lines.

use super::{next_token, parse_file_size, ExtraLines};
use crate::file::FileRecord;
use crate::mode::{S_IFDIR, S_IRWXG, S_IRWXO, S_IRWXU};
use crate::{Error, Result};

/// Blocks are 512 bytes under RMS.
const VMS_BLOCK_SIZE: i64 = 512;

/// Single-line form:
/// `WWW.DIR;1   1  23-NOV-1999 05:47 [MYERSRG] (RWE,RWE,RE,E)`
///
/// Multi-line form (no space on the first line; the metadata follows):
/// ```text
/// TCPIP$FTP_SERVER.LOG;29
///         0/18 8-JUN-2004 14:42:04  [NUCLEAR,FISSION]  (RWED,RWED,RE,)
/// ```
pub fn parse(line: &str, extra: &mut dyn ExtraLines) -> Result<FileRecord> {
    let fail = || Error::ListingParse(line.to_string());

    let semi = line.find(';').ok_or_else(fail)?;
    let multiline = !line.contains(' ');

    let mut name = &line[..semi];
    let mut record = FileRecord::new(String::new());
    if let Some(stripped) = name.strip_suffix(".DIR") {
        record.mode |= S_IFDIR;
        name = stripped;
    }
    if name.is_empty() {
        return Err(fail());
    }
    record.name = name.to_string();

    let continuation;
    let meta: &str = if multiline {
        continuation = extra
            .next_extra_line()?
            .ok_or_else(fail)?;
        continuation.trim_start_matches([' ', '\t'])
    } else {
        // Skip the remainder of the `name;version` token.
        super::skip_token(&line[semi..])
    };

    let (size_tok, rest) = next_token(meta).ok_or_else(fail)?;
    let blocks = parse_file_size(size_tok);
    record.size = if blocks < 0 { -1 } else { blocks * VMS_BLOCK_SIZE };

    let (datetime, rest) = super::time::parse_vms_time(rest);
    record.mtime = datetime;

    if !rest.starts_with('[') {
        return Err(fail());
    }
    let close = rest.find(']').ok_or_else(fail)?;
    record.user = String::new();
    record.group = String::new();

    // Protection mask `(SYSTEM,OWNER,GROUP,WORLD)`; the SYSTEM field is
    // skipped by starting at the first comma.
    let after = &rest[close + 1..];
    let Some(comma) = after.find(',') else {
        return Ok(record);
    };
    let mut fields = after[comma + 1..].split([',', ')']);
    record.mode |= vms_protection(fields.next(), S_IRWXU);
    record.mode |= vms_protection(fields.next(), S_IRWXG);
    record.mode |= vms_protection(fields.next(), S_IRWXO);

    Ok(record)
}

/// `R`, `W`, `E` map to read, write, execute within the given class mask.
fn vms_protection(field: Option<&str>, mask: u32) -> u32 {
    let mut mode = 0;
    if let Some(field) = field {
        if field.contains('R') {
            mode |= 0o444;
        }
        if field.contains('W') {
            mode |= 0o222;
        }
        if field.contains('E') {
            mode |= 0o111;
        }
    }
    mode & mask
}

#[cfg(test)]
mod tests {
    use super::super::NoExtraLines;
    use super::*;
    use crate::mode::{S_IRUSR, S_IWUSR, S_IXUSR};
    use time::macros::datetime;

    #[test]
    fn single_line_directory() {
        let rec = parse(
            "WWW.DIR;1                   1  23-NOV-1999 05:47 [MYERSRG] (RWE,RWE,RE,E)",
            &mut NoExtraLines,
        )
        .unwrap();
        assert!(rec.is_dir());
        assert_eq!(rec.name, "WWW");
        assert_eq!(rec.size, 512);
        assert_eq!(rec.mtime, datetime!(1999-11-23 05:47 UTC).unix_timestamp());
        assert_eq!(rec.mode & S_IRWXU, S_IRUSR | S_IWUSR | S_IXUSR);
    }

    #[test]
    fn single_line_file() {
        let rec = parse(
            ".PINE-DEBUG1;1              9  21-AUG-2002 20:06 [MYERSRG] (RWED,RWED,,)",
            &mut NoExtraLines,
        )
        .unwrap();
        assert!(!rec.is_dir());
        assert_eq!(rec.name, ".PINE-DEBUG1");
        assert_eq!(rec.size, 9 * 512);
        assert_eq!(rec.mode & S_IRWXO, 0);
    }

    #[test]
    fn multi_line_entry_pulls_continuation() {
        struct OneLine(Option<String>);
        impl ExtraLines for OneLine {
            fn next_extra_line(&mut self) -> crate::Result<Option<String>> {
                Ok(self.0.take())
            }
        }

        let mut extra = OneLine(Some(
            "\t5/18 8-JUN-2004 13:03:51  [NUCLEAR,FISSION]      (RWED,RWED,RE,)".to_string(),
        ));
        let rec = parse("TCPIP$FTP_SERVER.LOG;27", &mut extra).unwrap();
        assert_eq!(rec.name, "TCPIP$FTP_SERVER.LOG");
        assert_eq!(rec.size, 5 * 512);
        assert_eq!(rec.mtime, datetime!(2004-06-08 13:03:51 UTC).unix_timestamp());
    }

    #[test]
    fn multi_line_without_continuation_fails() {
        assert!(parse("ORPHAN.LOG;1", &mut NoExtraLines).is_err());
    }

    #[test]
    fn missing_semicolon_fails() {
        assert!(parse("not a vms line", &mut NoExtraLines).is_err());
    }
}
