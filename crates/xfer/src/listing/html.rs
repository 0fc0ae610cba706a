//! HTML directory-index lines, as produced by httpd autoindex pages.

use crate::file::FileRecord;
use crate::mode::{S_IFDIR, S_IFREG};

/// Extracts a directory entry from one line of an HTML index.
///
/// Returns `None` for lines that do not describe an entry (navigation
/// links, `mailto:` anchors, parent-directory links and markup). The date
/// and the human-readable size (`123k` / `1.1M`) after the closing anchor
/// are picked up when present.
pub fn parse_html_line(line: &str) -> Option<FileRecord> {
    let lower = line.to_ascii_lowercase();
    let anchor = lower.find("<a href=")?;

    // The name lives between the quotes of the href.
    let after = &line[anchor + "<a href=".len()..];
    let quote = after.find('"')?;
    let after = &after[quote + 1..];
    let end_quote = after.find('"')?;
    let mut name = &after[..end_quote];

    let mut record = FileRecord::new(String::new());
    record.user = "unknown".to_string();
    record.group = "unknown".to_string();
    record.mode = S_IFREG | 0o644;

    if let Some(stripped) = name.strip_suffix('/') {
        record.mode = S_IFDIR | 0o755;
        name = stripped;
    }

    // Only plain names in the current directory are entries.
    if name.is_empty()
        || name.contains('/')
        || name.starts_with('?')
        || name.starts_with("mailto:")
    {
        return None;
    }
    record.name = name.to_string();

    // Past the closing anchor, skip whitespace, dots and stray tags, then
    // look for a date and a human size.
    let close = lower[anchor..].find("</a>")? + anchor + "</a>".len();
    let mut rest = &line[close..];

    loop {
        let trimmed = rest.trim_start_matches([' ', '\t', '.']);
        if let Some(after_tag) = trimmed.strip_prefix('<') {
            match after_tag.find('>') {
                Some(end) => rest = &after_tag[end + 1..],
                None => return Some(record),
            }
        } else {
            rest = trimmed;
            break;
        }
    }

    let rest = rest.strip_prefix('[').unwrap_or(rest);
    let (datetime, rest) = super::time::parse_time(rest);
    record.mtime = datetime;

    let rest = rest.trim_start_matches([' ', ']']);
    if let Some(size) = parse_human_size(rest) {
        record.size = size;
    }

    Some(record)
}

/// Finds a `<digits>[.<digit>]k|M` size in the text after the date. The
/// unit letter must directly follow a digit, so the `k` of a description
/// word ("package") is not mistaken for a unit.
fn parse_human_size(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();

    let unit_at = (0..bytes.len()).find(|&i| {
        (bytes[i] == b'k' || bytes[i] == b'M') && i > 0 && bytes[i - 1].is_ascii_digit()
    })?;
    let units: i64 = if bytes[unit_at] == b'k' { 1024 } else { 1024 * 1024 };

    // Walk back over the number, honoring a one-decimal fraction.
    let mut start = unit_at;
    let mut fraction = 0i64;
    while start > 0 {
        let prev = bytes[start - 1];
        if prev == b' ' || prev == b'\t' {
            break;
        }
        start -= 1;
        if prev == b'.' && bytes.get(start + 1).is_some_and(u8::is_ascii_digit) {
            fraction = units * ascii_number(&bytes[start + 1..unit_at])? / 10;
        }
    }

    Some(units * ascii_number(&bytes[start..unit_at])? + fraction)
}

fn ascii_number(bytes: &[u8]) -> Option<i64> {
    let digits: Vec<u8> = bytes
        .iter()
        .copied()
        .take_while(u8::is_ascii_digit)
        .collect();
    std::str::from_utf8(&digits).ok()?.parse().ok()
}
