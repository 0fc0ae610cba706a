//! Unix `ls -l` listing lines, plus the Cray variant.

use super::{next_token, parse_file_size, skip_token, ServerType};
use crate::file::FileRecord;
use crate::mode::{self, mode_from_attribs};
use crate::{Error, Result};

/// `-rwxr-xr-x  1 user group size Mon DD HH:MM name`, with the
/// `Mon DD YYYY` variant handled by the shared date parser.
pub fn parse(line: &str, server_type: ServerType) -> Result<FileRecord> {
    let fail = || Error::ListingParse(line.to_string());

    // Some servers run the attribute block into the link count; force a
    // separator at column 10.
    let mut fixed = line.to_string();
    if fixed.len() > 10 && fixed.is_char_boundary(10) && fixed.is_char_boundary(11) {
        fixed.replace_range(10..11, " ");
    }

    let cols = count_columns(&fixed);

    let (attribs, mut rest) = next_token(&fixed).ok_or_else(fail)?;
    if attribs.len() < 10 || rest.is_empty() {
        return Err(fail());
    }

    let mut record = FileRecord::new(String::new());
    record.mode = mode_from_attribs(attribs);

    if cols >= 9 {
        // Skip the link count, then user and group.
        rest = skip_token(rest);
        let (user, after) = next_token(rest).ok_or_else(fail)?;
        let (group, after) = next_token(after).ok_or_else(fail)?;
        record.user = user.to_string();
        record.group = group.to_string();
        rest = after;
    } else if cols == 8 {
        let (user, after) = next_token(rest).ok_or_else(fail)?;
        record.user = user.to_string();
        record.group = "unknown".to_string();
        rest = skip_token(after);
    } else {
        record.user = "unknown".to_string();
        record.group = "unknown".to_string();
        rest = skip_token(rest);
    }

    // Cray listings wedge two extra columns (disk group, account) between
    // the group and the size:
    //   drwx------ 2 feiliu g913 DK common 4096 Sep 24 2001 wv
    if server_type == ServerType::Cray && cols == 11 && !fixed.contains("->") {
        rest = skip_token(rest);
        rest = skip_token(rest);
    }

    if record.is_device() {
        // Major, minor in place of the size column, `8, 1` or `8,1`.
        let (dev_tok, after) = next_token(rest).ok_or_else(fail)?;
        let (major_part, minor_part) = dev_tok.split_once(',').ok_or_else(fail)?;
        let major = parse_file_size(major_part);
        let (minor, after) = if minor_part.is_empty() {
            let (minor_tok, after) = next_token(after).ok_or_else(fail)?;
            (parse_file_size(minor_tok), after)
        } else {
            (parse_file_size(minor_part), after)
        };
        if major < 0 || minor < 0 {
            return Err(fail());
        }
        record.size = (major << 16) | (minor & 0xFF);
        rest = after;
    } else {
        let (size_tok, after) = next_token(rest).ok_or_else(fail)?;
        record.size = parse_file_size(size_tok);
        rest = after;
    }

    let (datetime, name_part) = super::time::parse_time(rest);
    record.mtime = datetime;

    // Symlink targets are not part of the name.
    let name = if mode::is_symlink(record.mode) {
        match name_part.find(" -> ") {
            Some(idx) => &name_part[..idx],
            None => name_part,
        }
    } else {
        name_part
    };

    record.name = name.to_string();
    if record.name.is_empty() {
        return Err(fail());
    }
    Ok(record)
}

/// Counts whitespace-separated columns, stopping at the first token that
/// contains a colon (the HH:MM time), which counts double. This mirrors how
/// the column heuristics distinguish listings with and without group
/// columns.
fn count_columns(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut cols = 0;

    while i < bytes.len() {
        let mut hit_colon = false;
        while i < bytes.len() && bytes[i] != b' ' && bytes[i] != b'\t' {
            if bytes[i] == b':' {
                hit_colon = true;
                break;
            }
            i += 1;
        }
        cols += 1;
        if hit_colon {
            cols += 1;
            break;
        }
        while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
    }

    cols
}
