//! FTP response payload parsing.

use std::net::Ipv4Addr;

/// Extracts `(host, port)` from a `227 Entering Passive Mode
/// (h1,h2,h3,h4,p1,p2)` response.
pub fn parse_pasv_response(response: &str) -> Option<(Ipv4Addr, u16)> {
    let start = response
        .char_indices()
        .skip(4)
        .find(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i)?;

    let digits: Vec<u16> = response[start..]
        .trim_end_matches(|c: char| !c.is_ascii_digit())
        .splitn(6, ',')
        .map(|part| {
            part.trim_matches(|c: char| !c.is_ascii_digit())
                .parse::<u16>()
        })
        .collect::<std::result::Result<_, _>>()
        .ok()?;

    if digits.len() != 6 || digits[..4].iter().any(|&d| d > 255) {
        return None;
    }

    let host = Ipv4Addr::new(
        digits[0] as u8,
        digits[1] as u8,
        digits[2] as u8,
        digits[3] as u8,
    );
    let port = digits[4].checked_mul(256)?.checked_add(digits[5])?;
    Some((host, port))
}

/// The raw `h1,h2,h3,h4,p1,p2` tuple of a PASV response, for replaying into
/// a `PORT` command on the other endpoint of an FXP transfer.
pub fn pasv_tuple(response: &str) -> Option<&str> {
    let start = response
        .char_indices()
        .skip(4)
        .find(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i)?;
    let rest = &response[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != ',')
        .unwrap_or(rest.len());
    let tuple = &rest[..end];
    if tuple.split(',').count() == 6 {
        Some(tuple)
    } else {
        None
    }
}

/// Extracts the port from a `229 Entering Extended Passive Mode (|||port|)`
/// response.
pub fn parse_epsv_response(response: &str) -> Option<u16> {
    let open = response.find('(')?;
    let inner = response[open + 1..].strip_prefix("|||")?;
    let bar = inner.find('|')?;
    inner[..bar].parse().ok()
}

/// Extracts the directory from a `257 "dir" is current directory` response.
pub fn parse_pwd_response(response: &str) -> Option<String> {
    let open = response.find('"')?;
    let rest = &response[open + 1..];
    let close = rest.find('"')?;
    Some(rest[..close].to_string())
}

/// Pulls the transfer size out of a `150 Opening BINARY mode data
/// connection for file (1234 bytes)` response. Servers without the
/// parenthesized form get the first number after the code.
pub fn parse_transfer_size(response: &str) -> Option<i64> {
    let candidate = match response.rfind('(') {
        Some(idx) => &response[idx + 1..],
        None => response.get(4..)?,
    };
    let digits_at = candidate.find(|c: char| c.is_ascii_digit())?;
    let digits: String = candidate[digits_at..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Extracts the byte count of a `213 <size>` SIZE response.
pub fn parse_size_response(response: &str) -> Option<i64> {
    response.get(4..)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pasv_parses_host_and_port() {
        let (host, port) =
            parse_pasv_response("227 Entering Passive Mode (192,168,1,10,12,34).").unwrap();
        assert_eq!(host, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(port, 12 * 256 + 34);
    }

    #[test]
    fn pasv_without_parentheses() {
        let (host, port) = parse_pasv_response("227 =10,0,0,1,4,0").unwrap();
        assert_eq!(host, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(port, 1024);
    }

    #[test]
    fn pasv_garbage_is_rejected() {
        assert!(parse_pasv_response("227 Entering Passive Mode").is_none());
        assert!(parse_pasv_response("227 (1,2,3)").is_none());
        assert!(parse_pasv_response("227 (999,2,3,4,5,6)").is_none());
    }

    #[test]
    fn pasv_tuple_for_fxp() {
        assert_eq!(
            pasv_tuple("227 Entering Passive Mode (192,168,1,10,12,34)."),
            Some("192,168,1,10,12,34")
        );
    }

    #[test]
    fn epsv_port() {
        assert_eq!(
            parse_epsv_response("229 Entering Extended Passive Mode (|||6446|)"),
            Some(6446)
        );
        assert_eq!(parse_epsv_response("229 nope"), None);
    }

    #[test]
    fn pwd_directory() {
        assert_eq!(
            parse_pwd_response("257 \"/home/alice\" is the current directory"),
            Some("/home/alice".to_string())
        );
    }

    #[test]
    fn transfer_size_from_150() {
        assert_eq!(
            parse_transfer_size(
                "150 Opening BINARY mode data connection for x.iso (1048576 bytes)"
            ),
            Some(1048576)
        );
        assert_eq!(parse_transfer_size("150 Here comes 2048 bytes"), Some(2048));
        assert_eq!(parse_transfer_size("150 Opening data connection"), None);
    }

    #[test]
    fn size_response() {
        assert_eq!(parse_size_response("213 1000000"), Some(1000000));
        assert_eq!(parse_size_response("550 not found"), None);
    }
}
