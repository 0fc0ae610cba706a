//! Directory entries as the engine sees them.

use crate::mode;

/// What to do with a file when the destination already has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferAction {
    #[default]
    Overwrite,
    Resume,
    Skip,
}

/// One directory entry, produced by the listing parsers or a driver's
/// `stat`, and consumed by the transfer scheduler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileRecord {
    /// Path-relative file name on the source side.
    pub name: String,
    /// Name on the destination side; filled in by the scheduler.
    pub dest_name: String,
    /// Size in bytes. `-1` when the producing parser could not recover a
    /// size. For block/char devices this packs `major << 16 | minor`.
    pub size: i64,
    /// Resume offset, in bytes already present on the destination.
    pub start_size: i64,
    /// Modification time, unix seconds; 0 when unknown.
    pub mtime: i64,
    pub user: String,
    pub group: String,
    /// POSIX mode bits including the file-type bits; 0 when unknown.
    pub mode: u32,
    pub action: TransferAction,
    pub done: bool,
    /// Set by recursive expansion when the destination listing already has
    /// an entry with this name.
    pub exists_on_destination: bool,
}

impl FileRecord {
    pub fn new(name: impl Into<String>) -> Self {
        FileRecord {
            name: name.into(),
            size: -1,
            ..Default::default()
        }
    }

    pub fn is_dir(&self) -> bool {
        mode::is_dir(self.mode)
    }

    pub fn is_symlink(&self) -> bool {
        mode::is_symlink(self.mode)
    }

    pub fn is_device(&self) -> bool {
        mode::is_device(self.mode)
    }

    /// The `ls -l` attribute string for display and chmod decisions.
    pub fn attribs(&self) -> String {
        mode::attribs_from_mode(self.mode)
    }

    /// Destination name, falling back to the source name when the scheduler
    /// has not assigned one.
    pub fn destination(&self) -> &str {
        if self.dest_name.is_empty() {
            &self.name
        } else {
            &self.dest_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{S_IFDIR, S_IFLNK};

    #[test]
    fn new_record_has_unknown_size() {
        let rec = FileRecord::new("report.txt");
        assert_eq!(rec.size, -1);
        assert_eq!(rec.action, TransferAction::Overwrite);
        assert!(!rec.is_dir());
    }

    #[test]
    fn type_views_follow_mode() {
        let mut rec = FileRecord::new("dir");
        rec.mode = S_IFDIR | 0o755;
        assert!(rec.is_dir());
        rec.mode = S_IFLNK | 0o777;
        assert!(rec.is_symlink());
    }

    #[test]
    fn destination_falls_back_to_name() {
        let mut rec = FileRecord::new("a.txt");
        assert_eq!(rec.destination(), "a.txt");
        rec.dest_name = "b.txt".into();
        assert_eq!(rec.destination(), "b.txt");
    }
}
