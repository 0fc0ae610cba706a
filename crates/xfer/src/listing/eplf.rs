//! EPLF ("Easily Parsed List Format") listing lines.

use super::parse_file_size;
use crate::file::FileRecord;
use crate::mode::{S_IFDIR, S_IFREG};
use crate::{Error, Result};

/// `+i8388621.48594,m825718503,r,s280,\tdjb.html`
///
/// Comma-separated facts between the leading `+` and a TAB; the name
/// follows the TAB. Recognized facts: `/` (directory), `s<size>`,
/// `m<mtime>`.
pub fn parse(line: &str) -> Result<FileRecord> {
    let fail = || Error::ListingParse(line.to_string());

    let rest = line.strip_prefix('+').ok_or_else(fail)?;
    let tab = rest.find('\t').ok_or_else(fail)?;
    let (facts, name) = rest.split_at(tab);
    let name = &name[1..];

    let mut record = FileRecord::new(String::new());
    record.user = "unknown".to_string();
    record.group = "unknown".to_string();

    let mut is_dir = false;
    for fact in facts.split(',') {
        let mut chars = fact.chars();
        match chars.next() {
            Some('/') => is_dir = true,
            Some('s') => record.size = parse_file_size(chars.as_str()),
            Some('m') => {
                record.mtime = chars.as_str().parse().unwrap_or(0);
            }
            _ => (),
        }
    }

    record.mode = if is_dir {
        S_IFDIR | 0o755
    } else {
        S_IFREG | 0o644
    };

    if name.is_empty() {
        return Err(fail());
    }
    record.name = name.to_string();
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_with_size_and_mtime() {
        let rec = parse("+i8388621.48594,m825718503,r,s280,\tdjb.html").unwrap();
        assert!(!rec.is_dir());
        assert_eq!(rec.size, 280);
        assert_eq!(rec.mtime, 825718503);
        assert_eq!(rec.name, "djb.html");
    }

    #[test]
    fn directory_fact() {
        let rec = parse("+i8388621.48593,m825718348,/,\t514").unwrap();
        assert!(rec.is_dir());
        assert_eq!(rec.name, "514");
    }

    #[test]
    fn missing_tab_fails() {
        assert!(parse("+m825718503,r,s280, name").is_err());
    }

    #[test]
    fn missing_plus_fails() {
        assert!(parse("i8388621,m825718503,\tname").is_err());
    }
}
