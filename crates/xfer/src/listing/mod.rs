//! Directory-listing parsers.
//!
//! One entry point, [`parse_ls`], turns a raw listing line into a
//! [`FileRecord`]. The server type is either forced (FTP `SYST`) or
//! autodetected per line. Seven formats are understood: Unix `ls` (with the
//! Cray variant), DOS, Novell, EPLF, VMS (single- and multi-line), MVS, and
//! HTML indexes (used by the HTTP driver through [`html::parse_html_line`]).

pub mod charset;
pub mod dos;
pub mod eplf;
pub mod html;
pub mod mvs;
pub mod novell;
pub mod time;
pub mod unix;
pub mod vms;

pub use charset::decode_listing;
pub use html::parse_html_line;
pub use self::time::{parse_time, parse_vms_time};

use crate::file::FileRecord;
use crate::{Error, Result};

/// Listing dialect, as reported by `SYST` or guessed per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerType {
    #[default]
    Autodetect,
    Unix,
    Cray,
    Dos,
    Novell,
    Eplf,
    Vms,
    Mvs,
}

impl ServerType {
    /// Maps an FTP `215` SYST response to a dialect hint.
    pub fn from_syst(response: &str) -> ServerType {
        let upper = response.to_ascii_uppercase();
        if upper.contains("UNIX") {
            ServerType::Unix
        } else if upper.contains("CRAY") {
            ServerType::Cray
        } else if upper.contains("VMS") {
            ServerType::Vms
        } else if upper.contains("MVS") || upper.contains("OS/390") {
            ServerType::Mvs
        } else if upper.contains("NETWARE") || upper.contains("NOVELL") {
            ServerType::Novell
        } else if upper.contains("WINDOWS") || upper.contains("DOS") {
            ServerType::Dos
        } else {
            ServerType::Autodetect
        }
    }
}

/// Source of continuation lines for the multi-line VMS format. The FTP
/// driver backs this with its data-connection line reader; cached listings
/// back it with the cache file.
pub trait ExtraLines {
    fn next_extra_line(&mut self) -> Result<Option<String>>;
}

/// For callers that can never see a multi-line listing.
pub struct NoExtraLines;

impl ExtraLines for NoExtraLines {
    fn next_extra_line(&mut self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Parses one listing line.
///
/// A successful parse always carries a non-empty file name; garbage yields
/// an error instead of an empty record.
pub fn parse_ls(
    line: &str,
    server_type: ServerType,
    extra: &mut dyn ExtraLines,
) -> Result<FileRecord> {
    let line = line.trim_end_matches(['\r', '\n']);

    let record = match server_type {
        ServerType::Unix | ServerType::Cray => unix::parse(line, server_type),
        ServerType::Dos => dos::parse(line),
        ServerType::Novell => novell::parse(line),
        ServerType::Eplf => eplf::parse(line),
        ServerType::Vms => vms::parse(line, extra),
        ServerType::Mvs => mvs::parse(line),
        ServerType::Autodetect => autodetect(line, extra),
    }?;

    if record.name.is_empty() {
        return Err(Error::ListingParse(line.to_string()));
    }
    Ok(record)
}

fn autodetect(line: &str, extra: &mut dyn ExtraLines) -> Result<FileRecord> {
    let b = line.as_bytes();

    if b.first() == Some(&b'+') {
        return eplf::parse(line);
    }
    if b.len() > 2 && b[0].is_ascii_digit() && b[2] == b'-' {
        return dos::parse(line);
    }
    if b.len() > 2 && b[1] == b' ' && b[2] == b'[' {
        return novell::parse(line);
    }

    let first_token = line.split_whitespace().next().unwrap_or(line);
    if first_token.contains(';') {
        return vms::parse(line, extra);
    }

    unix::parse(line, ServerType::Unix)
}

/// Splits off the next whitespace-delimited token, returning it and the
/// remainder positioned at the following token.
pub(crate) fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start_matches([' ', '\t']);
    if s.is_empty() {
        return None;
    }
    let end = s
        .find([' ', '\t'])
        .unwrap_or(s.len());
    let (token, rest) = s.split_at(end);
    Some((token, rest.trim_start_matches([' ', '\t'])))
}

/// Skips one token, landing on the next.
pub(crate) fn skip_token(s: &str) -> &str {
    match next_token(s) {
        Some((_, rest)) => rest,
        None => "",
    }
}

/// Parses the leading decimal digits of a size column. Returns -1 when the
/// column does not start with a digit.
pub(crate) fn parse_file_size(s: &str) -> i64 {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{S_IFDIR, S_IFREG};

    #[test]
    fn autodetect_picks_the_right_parser() {
        let mut no_extra = NoExtraLines;

        let unix = parse_ls(
            "-rw-r--r--   1 alice  staff    2048 Jan 12 09:15 report.txt",
            ServerType::Autodetect,
            &mut no_extra,
        )
        .unwrap();
        assert_eq!(unix.name, "report.txt");

        let dos = parse_ls(
            "07-06-99  12:57PM       <DIR>          tools",
            ServerType::Autodetect,
            &mut no_extra,
        )
        .unwrap();
        assert!(dos.is_dir());

        let eplf = parse_ls(
            "+i8388621.48594,m825718503,r,s280,\tdjb.html",
            ServerType::Autodetect,
            &mut no_extra,
        )
        .unwrap();
        assert_eq!(eplf.name, "djb.html");
        assert_eq!(eplf.size, 280);

        let vms = parse_ls(
            "WWW.DIR;1  1  23-NOV-1999 05:47 [MYERSRG] (RWE,RWE,RE,E)",
            ServerType::Autodetect,
            &mut no_extra,
        )
        .unwrap();
        assert_eq!(vms.name, "WWW");
        assert!(vms.is_dir());
    }

    #[test]
    fn garbage_is_rejected_not_empty_named() {
        let mut no_extra = NoExtraLines;
        for garbage in ["", "total 1234", "?????", "      "] {
            match parse_ls(garbage, ServerType::Autodetect, &mut no_extra) {
                Err(Error::ListingParse(_)) => (),
                Ok(rec) => assert!(
                    !rec.name.is_empty(),
                    "empty-name success for {garbage:?}"
                ),
                Err(e) => panic!("unexpected error kind for {garbage:?}: {e}"),
            }
        }
    }

    #[test]
    fn forced_server_type_skips_detection() {
        let mut no_extra = NoExtraLines;
        // A VMS-looking line parsed as Unix fails instead of being guessed.
        let line = "WWW.DIR;1  1  23-NOV-1999 05:47 [MYERSRG] (RWE,RWE,RE,E)";
        assert!(parse_ls(line, ServerType::Unix, &mut no_extra).is_err());
    }

    #[test]
    fn syst_mapping() {
        assert_eq!(ServerType::from_syst("215 UNIX Type: L8"), ServerType::Unix);
        assert_eq!(
            ServerType::from_syst("215 Windows_NT version 5.0"),
            ServerType::Dos
        );
        assert_eq!(ServerType::from_syst("215 VMS V5.5"), ServerType::Vms);
        assert_eq!(
            ServerType::from_syst("215 something else"),
            ServerType::Autodetect
        );
    }

    #[test]
    fn token_helpers() {
        assert_eq!(next_token("  a   b c"), Some(("a", "b c")));
        assert_eq!(skip_token("a   b c"), "b c");
        assert_eq!(next_token("   "), None);
        assert_eq!(parse_file_size("2048 rest"), 2048);
        assert_eq!(parse_file_size("<DIR>"), -1);
    }

    #[test]
    fn synthesized_modes_have_type_bits() {
        let mut no_extra = NoExtraLines;
        let dos_file = parse_ls(
            "07-06-99  12:57PM           123456 setup.exe",
            ServerType::Dos,
            &mut no_extra,
        )
        .unwrap();
        assert_eq!(dos_file.mode & crate::mode::S_IFMT, S_IFREG);

        let dos_dir = parse_ls(
            "07-06-99  12:57PM       <DIR>          tools",
            ServerType::Dos,
            &mut no_extra,
        )
        .unwrap();
        assert_eq!(dos_dir.mode & crate::mode::S_IFMT, S_IFDIR);
    }
}
