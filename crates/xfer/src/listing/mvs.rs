//! MVS dataset listing lines.

use super::{next_token, parse_file_size, skip_token};
use crate::file::FileRecord;
use crate::mode::{S_IFDIR, S_IFREG};
use crate::{Error, Result};

/// Bytes per 3390 DASD track; the `Used` column counts tracks.
const MVS_TRACK_SIZE: i64 = 55996;

/// `Volume Unit  Referred  Ext Used Recfm Lrecl BlkSz Dsorg Dsname`
/// `SVI52A 3390  2003/12/10  8  216  FB      80 27920  PS  CARDS.DELETES`
///
/// `PS` (physical-sequential) datasets read as files, `PO` (partitioned)
/// as directories; anything else is not a transferable entry.
pub fn parse(line: &str) -> Result<FileRecord> {
    let fail = || Error::ListingParse(line.to_string());

    let mut record = FileRecord::new(String::new());
    record.user = "unknown".to_string();
    record.group = "unknown".to_string();

    // Volume and unit columns.
    let rest = skip_token(line);
    let rest = skip_token(rest);

    let (datetime, rest) = super::time::parse_time(rest);
    record.mtime = datetime;

    // Extent count, then tracks used.
    let rest = skip_token(rest);
    let (used_tok, rest) = next_token(rest).ok_or_else(fail)?;
    let used = parse_file_size(used_tok);
    record.size = if used < 0 { -1 } else { used * MVS_TRACK_SIZE };

    // Recfm, Lrecl, BlkSz.
    let rest = skip_token(rest);
    let rest = skip_token(rest);
    let rest = skip_token(rest);

    let (dsorg, rest) = next_token(rest).ok_or_else(fail)?;
    record.mode = match &dsorg[..dsorg.len().min(2)] {
        "PS" => S_IFREG | 0o644,
        "PO" => S_IFDIR | 0o755,
        _ => return Err(fail()),
    };

    let (name, _) = next_token(rest).ok_or_else(fail)?;
    record.name = name.to_string();
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn sequential_dataset_is_a_file() {
        let rec =
            parse("SVI52A 3390   2003/12/10  8  216  FB      80 27920  PS  CARDS.DELETES")
                .unwrap();
        assert!(!rec.is_dir());
        assert_eq!(rec.name, "CARDS.DELETES");
        assert_eq!(rec.size, 216 * MVS_TRACK_SIZE);
        assert_eq!(rec.mtime, datetime!(2003-12-10 00:00 UTC).unix_timestamp());
    }

    #[test]
    fn partitioned_dataset_is_a_directory() {
        let rec =
            parse("SVI528 3390   2003/12/12  1    5  FB      80 24000  PO  CLIST").unwrap();
        assert!(rec.is_dir());
        assert_eq!(rec.name, "CLIST");
    }

    #[test]
    fn other_dsorg_is_rejected() {
        assert!(
            parse("SVI528 3390   2003/12/12  1    5  FB      80 24000  VS  DB2.DATA").is_err()
        );
    }
}
