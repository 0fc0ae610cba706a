//! Charset conversion for remote listing bytes.

/// Decodes raw listing bytes to UTF-8.
///
/// Valid UTF-8 passes through untouched. Otherwise each entry of the
/// comma-separated `remote_charsets` fallback list is tried in order, and
/// the first encoding that converts without errors wins. As a last resort
/// the bytes are decoded lossily so a listing never fails outright over a
/// stray byte.
pub fn decode_listing(bytes: &[u8], remote_charsets: &str) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    for label in remote_charsets.split(',') {
        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) else {
            log::warn!("unknown charset {label:?} in remote_charsets");
            continue;
        };
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return decoded.into_owned();
        }
    }

    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        assert_eq!(decode_listing("héllo.txt".as_bytes(), ""), "héllo.txt");
    }

    #[test]
    fn latin1_fallback() {
        // "héllo" in ISO-8859-1.
        let bytes = b"h\xe9llo.txt";
        assert_eq!(decode_listing(bytes, "iso-8859-1"), "héllo.txt");
    }

    #[test]
    fn first_matching_charset_wins() {
        let bytes = b"h\xe9llo";
        // An unknown label is skipped, then latin1 applies.
        assert_eq!(decode_listing(bytes, "no-such-charset, iso-8859-1"), "héllo");
    }

    #[test]
    fn lossy_as_last_resort() {
        let bytes = b"bad\xff\xfebytes";
        let decoded = decode_listing(bytes, "");
        assert!(decoded.starts_with("bad"));
        assert!(decoded.contains('\u{FFFD}'));
    }
}
