//! DOS / Windows NT listing lines.

use super::{next_token, parse_file_size};
use crate::file::FileRecord;
use crate::mode::{S_IFDIR, S_IFREG};
use crate::{Error, Result};

/// `07-06-99  12:57PM       <DIR>          tools`
/// `07-06-99  12:57PM           123456 setup.exe`
///
/// There are no permissions to report, so the mode is synthesized: `0755`
/// for directories, `0644` for files.
pub fn parse(line: &str) -> Result<FileRecord> {
    let fail = || Error::ListingParse(line.to_string());

    let mut record = FileRecord::new(String::new());
    record.user = "unknown".to_string();
    record.group = "unknown".to_string();

    let (datetime, rest) = super::time::parse_time(line);
    record.mtime = datetime;

    let (size_tok, rest) = next_token(rest).ok_or_else(fail)?;
    if size_tok.starts_with('<') {
        record.mode = S_IFDIR | 0o755;
        record.size = 0;
    } else {
        record.mode = S_IFREG | 0o644;
        record.size = parse_file_size(size_tok);
    }

    if rest.is_empty() {
        return Err(fail());
    }
    record.name = rest.to_string();
    Ok(record)
}
