//! `ls` output formatting.

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use xfer::FileRecord;

const RECENT: &[FormatItem<'_>] = format_description!("[month repr:short] [day padding:space] [hour]:[minute]");
const OLD: &[FormatItem<'_>] = format_description!("[month repr:short] [day padding:space]  [year]");

/// Renders one entry the way `ls -l` would.
pub fn format_entry(record: &FileRecord) -> String {
    let size = if record.size < 0 {
        "-".to_string()
    } else {
        record.size.to_string()
    };

    format!(
        "{} {:>8} {:>8} {:>12} {} {}",
        record.attribs(),
        record.user,
        record.group,
        size,
        format_mtime(record.mtime),
        record.name,
    )
}

fn format_mtime(mtime: i64) -> String {
    let Ok(when) = OffsetDateTime::from_unix_timestamp(mtime) else {
        return "            ".to_string();
    };
    if mtime == 0 {
        return "            ".to_string();
    }

    let now = OffsetDateTime::now_utc();
    let old = (now - when).whole_days() > 180 || when > now;
    let formatted = if old {
        when.format(&OLD)
    } else {
        when.format(&RECENT)
    };
    formatted.unwrap_or_else(|_| "            ".to_string())
}
