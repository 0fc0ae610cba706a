//! Listing date parsing.
//!
//! Servers send dates in a handful of shapes:
//!
//! - `07-06-99  12:57PM` (DOS)
//! - `10-Jan-2003 09:14` (some Unix and HTML indexes)
//! - `2003/12/25` (MVS)
//! - `Jul 06 12:57` (Unix, current-ish files; the year is inferred)
//! - `Jul  6  1999` (Unix, old files)
//!
//! All timestamps are interpreted as UTC; listing times have no zone
//! information to begin with.

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use super::{next_token, skip_token};

fn month_from_name(name: &str) -> Option<Month> {
    let mut lower = name.to_ascii_lowercase();
    lower.truncate(3);
    Some(match lower.as_str() {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    })
}

fn epoch(date: Date, time: Time) -> i64 {
    PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp()
}

/// Two-digit years follow the POSIX `strptime` convention.
fn expand_year(two_digit: i32) -> i32 {
    if two_digit >= 69 {
        1900 + two_digit
    } else {
        2000 + two_digit
    }
}

fn parse_hm(token: &str) -> Option<Time> {
    let (h, m) = token.split_once(':')?;
    Time::from_hms(h.parse().ok()?, m.parse().ok()?, 0).ok()
}

/// `12:57PM` / `01:05am` with a 12-hour clock.
fn parse_hm_ampm(token: &str) -> Option<Time> {
    let (clock, suffix) = token.split_at(token.len().checked_sub(2)?);
    let (h, m) = clock.split_once(':')?;
    let hour: u8 = h.parse().ok()?;
    let minute: u8 = m.parse().ok()?;
    let hour = match (suffix.to_ascii_uppercase().as_str(), hour) {
        ("AM", 12) => 0,
        ("AM", h) => h,
        ("PM", 12) => 12,
        ("PM", h) => h + 12,
        _ => return None,
    };
    Time::from_hms(hour, minute, 0).ok()
}

/// Skips the two tokens a date would have occupied. Used when the date does
/// not parse, so the caller can still find the file name after it.
fn skip_date_tokens(s: &str) -> &str {
    skip_token(skip_token(s))
}

/// Parses a listing date, returning the unix timestamp (0 when the date is
/// unparseable) and the remainder of the line positioned at the next token.
pub fn parse_time(s: &str) -> (i64, &str) {
    parse_time_at(s, now_utc())
}

fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Testable core of [`parse_time`] with an injected "now" for the
/// year-inference rule.
pub(crate) fn parse_time_at(s: &str, now: OffsetDateTime) -> (i64, &str) {
    let b = s.as_bytes();

    if b.len() > 4 && b[0].is_ascii_digit() && b[2] == b'-' && b[3].is_ascii_digit() {
        // 07-06-99  12:57PM
        return parse_dos(s);
    }
    if b.len() > 4 && b[0].is_ascii_digit() && b[2] == b'-' && b[3].is_ascii_alphabetic() {
        // 10-Jan-2003 09:14
        return parse_dmy(s);
    }
    if b.len() > 4 && b[0].is_ascii_digit() && b[4] == b'/' {
        // 2003/12/25
        return parse_ymd(s);
    }
    parse_month_name(s, now)
}

fn parse_dos(s: &str) -> (i64, &str) {
    let parsed = (|| {
        let (date_tok, rest) = next_token(s)?;
        let (time_tok, rest) = next_token(rest)?;

        let mut parts = date_tok.split('-');
        let month: u8 = parts.next()?.parse().ok()?;
        let day: u8 = parts.next()?.parse().ok()?;
        let year: i32 = parts.next()?.parse().ok()?;
        let date =
            Date::from_calendar_date(expand_year(year), Month::try_from(month).ok()?, day)
                .ok()?;
        let time = parse_hm_ampm(time_tok)?;
        Some((epoch(date, time), rest))
    })();

    parsed.unwrap_or_else(|| (0, skip_date_tokens(s)))
}

fn parse_dmy(s: &str) -> (i64, &str) {
    let parsed = (|| {
        let (date_tok, rest) = next_token(s)?;
        let (time_tok, rest) = next_token(rest)?;

        let mut parts = date_tok.split('-');
        let day: u8 = parts.next()?.parse().ok()?;
        let month = month_from_name(parts.next()?)?;
        let year: i32 = parts.next()?.parse().ok()?;
        let date = Date::from_calendar_date(year, month, day).ok()?;
        let time = parse_hm(time_tok)?;
        Some((epoch(date, time), rest))
    })();

    parsed.unwrap_or_else(|| (0, skip_date_tokens(s)))
}

fn parse_ymd(s: &str) -> (i64, &str) {
    let parsed = (|| {
        let (date_tok, rest) = next_token(s)?;
        let mut parts = date_tok.split('/');
        let year: i32 = parts.next()?.parse().ok()?;
        let month: u8 = parts.next()?.parse().ok()?;
        let day: u8 = parts.next()?.parse().ok()?;
        let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
        Some((epoch(date, Time::MIDNIGHT), rest))
    })();

    parsed.unwrap_or_else(|| (0, skip_date_tokens(s)))
}

fn parse_month_name(s: &str, now: OffsetDateTime) -> (i64, &str) {
    let parsed = (|| {
        let (month_tok, rest) = next_token(s)?;
        let (day_tok, rest) = next_token(rest)?;
        let (third_tok, rest) = next_token(rest)?;

        let month = month_from_name(month_tok)?;
        let day: u8 = day_tok.parse().ok()?;

        if third_tok.contains(':') {
            // Jul 06 12:57 - the year is whichever puts the date in the past.
            let time = parse_hm(third_tok)?;
            let year = if u8::from(month) > u8::from(now.month()) {
                now.year() - 1
            } else {
                now.year()
            };
            let date = Date::from_calendar_date(year, month, day).ok()?;
            Some((epoch(date, time), rest))
        } else {
            // Jul  6  1999
            let year: i32 = third_tok.parse().ok()?;
            let date = Date::from_calendar_date(year, month, day).ok()?;
            Some((epoch(date, Time::MIDNIGHT), rest))
        }
    })();

    parsed.unwrap_or_else(|| (0, skip_date_tokens(s)))
}

/// VMS dates: `8-JUN-2004 13:04:14`, seconds optional. Unlike
/// [`parse_time`] the remainder is positioned after optional blanks.
pub fn parse_vms_time(s: &str) -> (i64, &str) {
    let parsed = (|| {
        let (date_tok, rest) = next_token(s)?;
        let (time_tok, rest) = next_token(rest)?;

        let mut parts = date_tok.split('-');
        let day: u8 = parts.next()?.parse().ok()?;
        let month = month_from_name(parts.next()?)?;
        let year: i32 = parts.next()?.parse().ok()?;
        let date = Date::from_calendar_date(year, month, day).ok()?;

        let mut clock = time_tok.split(':');
        let hour: u8 = clock.next()?.parse().ok()?;
        let minute: u8 = clock.next()?.parse().ok()?;
        let second: u8 = match clock.next() {
            Some(sec) => sec.parse().ok()?,
            None => 0,
        };
        let time = Time::from_hms(hour, minute, second).ok()?;
        Some((epoch(date, time), rest))
    })();

    parsed.unwrap_or_else(|| (0, skip_date_tokens(s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn dos_date() {
        let (epoch, rest) = parse_time("07-06-99  12:57PM  <DIR> tools");
        assert_eq!(epoch, datetime!(1999-07-06 12:57 UTC).unix_timestamp());
        assert_eq!(rest, "<DIR> tools");
    }

    #[test]
    fn dos_midnight_and_noon() {
        let (midnight, _) = parse_time("01-02-03 12:00AM x");
        assert_eq!(midnight, datetime!(2003-01-02 00:00 UTC).unix_timestamp());
        let (noon, _) = parse_time("01-02-03 12:00PM x");
        assert_eq!(noon, datetime!(2003-01-02 12:00 UTC).unix_timestamp());
    }

    #[test]
    fn dmy_date() {
        let (epoch, rest) = parse_time("10-Jan-2003 09:14  1234 file");
        assert_eq!(epoch, datetime!(2003-01-10 09:14 UTC).unix_timestamp());
        assert_eq!(rest, "1234 file");
    }

    #[test]
    fn ymd_date() {
        let (epoch, rest) = parse_time("2003/12/25 8 216 FB");
        assert_eq!(epoch, datetime!(2003-12-25 00:00 UTC).unix_timestamp());
        assert_eq!(rest, "8 216 FB");
    }

    #[test]
    fn month_name_with_year() {
        let (epoch, rest) = parse_time("Jul  6  1999 wv");
        assert_eq!(epoch, datetime!(1999-07-06 00:00 UTC).unix_timestamp());
        assert_eq!(rest, "wv");
    }

    #[test]
    fn month_name_year_inference() {
        let now = datetime!(2026-03-15 12:00 UTC);

        // A January date in March is this year.
        let (epoch, _) = parse_time_at("Jan 12 09:15 report.txt", now);
        assert_eq!(epoch, datetime!(2026-01-12 09:15 UTC).unix_timestamp());

        // A July date seen in March has to be last year's.
        let (epoch, _) = parse_time_at("Jul 20 23:59 old.txt", now);
        assert_eq!(epoch, datetime!(2025-07-20 23:59 UTC).unix_timestamp());
    }

    #[test]
    fn unparseable_date_advances_two_tokens() {
        let (epoch, rest) = parse_time("bogus tokens file.txt");
        assert_eq!(epoch, 0);
        assert_eq!(rest, "file.txt");
    }

    #[test]
    fn vms_time_with_seconds() {
        let (epoch, rest) = parse_vms_time("8-JUN-2004 13:04:14  [NUCLEAR,FISSION]");
        assert_eq!(epoch, datetime!(2004-06-08 13:04:14 UTC).unix_timestamp());
        assert_eq!(rest, "[NUCLEAR,FISSION]");
    }

    #[test]
    fn vms_time_without_seconds() {
        let (epoch, _) = parse_vms_time("21-AUG-2002 20:06 [MYERSRG]");
        assert_eq!(epoch, datetime!(2002-08-21 20:06 UTC).unix_timestamp());
    }
}
