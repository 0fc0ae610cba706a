//! Local filesystem driver.
//!
//! Satisfies the same operation set as the network drivers so one side of a
//! transfer can be the local machine. `always_connected`: there is no
//! session to set up, every operation works directly against the
//! filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::file::FileRecord;
use crate::request::{Capabilities, Driver, Protocol, RequestCore};
use crate::{Error, Result};

pub struct LocalDriver {
    read_file: Option<File>,
    write_file: Option<File>,
    entries: Option<std::vec::IntoIter<FileRecord>>,
}

impl LocalDriver {
    pub fn new() -> Self {
        Self {
            read_file: None,
            write_file: None,
            entries: None,
        }
    }

    fn absolutize(&self, core: &RequestCore, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&core.directory).join(path)
        }
    }

    fn map_fs_error(path: &Path, e: std::io::Error) -> Error {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                Error::PermissionDenied(path.display().to_string())
            }
            std::io::ErrorKind::AlreadyExists => {
                Error::RemoteFailure(format!("{} already exists", path.display()))
            }
            _ => Error::Io(e),
        }
    }

    fn record_from_metadata(name: String, meta: &fs::Metadata) -> FileRecord {
        let mut record = FileRecord::new(name);
        record.size = meta.len() as i64;
        record.mode = metadata_mode(meta);
        record.mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        fill_owner(&mut record, meta);
        record
    }
}

#[cfg(unix)]
fn metadata_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn metadata_mode(meta: &fs::Metadata) -> u32 {
    let type_bits = if meta.is_dir() {
        mode::S_IFDIR
    } else if meta.file_type().is_symlink() {
        mode::S_IFLNK
    } else {
        mode::S_IFREG
    };
    let perms = if meta.permissions().readonly() { 0o444 } else { 0o644 };
    type_bits | perms
}

#[cfg(unix)]
fn fill_owner(record: &mut FileRecord, meta: &fs::Metadata) {
    use std::os::unix::fs::MetadataExt;
    record.user = meta.uid().to_string();
    record.group = meta.gid().to_string();
}

#[cfg(not(unix))]
fn fill_owner(record: &mut FileRecord, _meta: &fs::Metadata) {
    record.user = "unknown".to_string();
    record.group = "unknown".to_string();
}

impl Default for LocalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for LocalDriver {
    fn protocol(&self) -> Protocol {
        Protocol::Local
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            listing: true,
            download: true,
            upload: true,
            mutate: true,
            metadata: true,
            raw_commands: false,
        }
    }

    fn connect(&mut self, core: &mut RequestCore) -> Result<()> {
        if core.directory.is_empty() {
            core.directory = std::env::current_dir()
                .map_err(Error::Io)?
                .to_string_lossy()
                .into_owned();
        }
        Ok(())
    }

    fn disconnect(&mut self, _core: &mut RequestCore) {
        self.read_file = None;
        self.write_file = None;
        self.entries = None;
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn always_connected(&self) -> bool {
        true
    }

    fn list_files(&mut self, core: &mut RequestCore) -> Result<()> {
        let dir = PathBuf::from(&core.directory);
        let mut records = Vec::new();

        for entry in fs::read_dir(&dir).map_err(|e| Self::map_fs_error(&dir, e))? {
            let entry = entry.map_err(Error::Io)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.path().symlink_metadata() {
                Ok(meta) => records.push(Self::record_from_metadata(name, &meta)),
                Err(e) => log::warn!("cannot stat {name}: {e}"),
            }
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        self.entries = Some(records.into_iter());
        Ok(())
    }

    fn next_file(&mut self, _core: &mut RequestCore) -> Result<Option<FileRecord>> {
        Ok(self.entries.as_mut().and_then(Iterator::next))
    }

    fn get_file(&mut self, core: &mut RequestCore, name: &str, start: u64) -> Result<i64> {
        let path = self.absolutize(core, name);
        let mut file = File::open(&path).map_err(|e| Self::map_fs_error(&path, e))?;
        let size = file.metadata().map_err(Error::Io)?.len() as i64;

        if start > 0 {
            file.seek(SeekFrom::Start(start)).map_err(Error::Io)?;
        }
        self.read_file = Some(file);
        Ok(size)
    }

    fn put_file(
        &mut self,
        core: &mut RequestCore,
        name: &str,
        start: u64,
        _total: i64,
    ) -> Result<()> {
        let path = self.absolutize(core, name);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Self::map_fs_error(&path, e))?;

        // Resume continues at `start`; anything beyond it is stale.
        file.set_len(start).map_err(Error::Io)?;
        file.seek(SeekFrom::Start(start)).map_err(Error::Io)?;
        self.write_file = Some(file);
        Ok(())
    }

    fn read_chunk(&mut self, _core: &mut RequestCore, buf: &mut [u8]) -> Result<usize> {
        let file = self.read_file.as_mut().ok_or(Error::NotConnected)?;
        file.read(buf).map_err(Error::Io)
    }

    fn write_chunk(&mut self, _core: &mut RequestCore, buf: &[u8]) -> Result<usize> {
        let file = self.write_file.as_mut().ok_or(Error::NotConnected)?;
        file.write_all(buf).map_err(Error::Io)?;
        Ok(buf.len())
    }

    fn end_transfer(&mut self, _core: &mut RequestCore) -> Result<()> {
        if let Some(mut file) = self.write_file.take() {
            file.flush().map_err(Error::Io)?;
        }
        self.read_file = None;
        self.entries = None;
        Ok(())
    }

    fn chdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        let path = self.absolutize(core, dir);
        let meta = fs::metadata(&path).map_err(|e| Self::map_fs_error(&path, e))?;
        if !meta.is_dir() {
            return Err(Error::RemoteFailure(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        core.directory = path.to_string_lossy().into_owned();
        Ok(())
    }

    fn mkdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        let path = self.absolutize(core, dir);
        fs::create_dir(&path).map_err(|e| Self::map_fs_error(&path, e))
    }

    fn rmdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        let path = self.absolutize(core, dir);
        fs::remove_dir(&path).map_err(|e| Self::map_fs_error(&path, e))
    }

    fn remove_file(&mut self, core: &mut RequestCore, name: &str) -> Result<()> {
        let path = self.absolutize(core, name);
        fs::remove_file(&path).map_err(|e| Self::map_fs_error(&path, e))
    }

    fn rename(&mut self, core: &mut RequestCore, old: &str, new: &str) -> Result<()> {
        let from = self.absolutize(core, old);
        let to = self.absolutize(core, new);
        fs::rename(&from, &to).map_err(|e| Self::map_fs_error(&from, e))
    }

    #[cfg(unix)]
    fn chmod(&mut self, core: &mut RequestCore, name: &str, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let path = self.absolutize(core, name);
        fs::set_permissions(&path, fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| Self::map_fs_error(&path, e))
    }

    #[cfg(not(unix))]
    fn chmod(&mut self, _core: &mut RequestCore, _name: &str, _mode: u32) -> Result<()> {
        Err(Error::Unsupported("chmod"))
    }

    #[cfg(unix)]
    fn set_file_time(&mut self, core: &mut RequestCore, name: &str, mtime: i64) -> Result<()> {
        use nix::sys::time::TimeValLike;
        let path = self.absolutize(core, name);
        let time = nix::sys::time::TimeVal::seconds(mtime);
        nix::sys::stat::utimes(&path, &time, &time)
            .map_err(|e| Self::map_fs_error(&path, std::io::Error::from(e)))
    }

    #[cfg(not(unix))]
    fn set_file_time(&mut self, _core: &mut RequestCore, _name: &str, _mtime: i64) -> Result<()> {
        Err(Error::Unsupported("set_file_time"))
    }

    fn file_size(&mut self, core: &mut RequestCore, name: &str) -> Result<i64> {
        let path = self.absolutize(core, name);
        let meta = fs::metadata(&path).map_err(|e| Self::map_fs_error(&path, e))?;
        Ok(meta.len() as i64)
    }

    fn stat(&mut self, core: &mut RequestCore, name: &str) -> Result<FileRecord> {
        let path = self.absolutize(core, name);
        let meta = path
            .symlink_metadata()
            .map_err(|e| Self::map_fs_error(&path, e))?;
        Ok(Self::record_from_metadata(name.to_string(), &meta))
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use std::sync::Arc;

    fn setup() -> (tempfile::TempDir, LocalDriver, RequestCore) {
        let dir = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let ctx = Arc::new(Context::new(cache.path().to_path_buf()));
        let mut core = RequestCore::new(Protocol::Local, ctx);
        core.directory = dir.path().to_string_lossy().into_owned();
        (dir, LocalDriver::new(), core)
    }

    #[test]
    fn listing_reports_sizes_and_types() {
        let (dir, mut driver, mut core) = setup();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        driver.list_files(&mut core).unwrap();
        let a = driver.next_file(&mut core).unwrap().unwrap();
        let sub = driver.next_file(&mut core).unwrap().unwrap();
        assert!(driver.next_file(&mut core).unwrap().is_none());

        assert_eq!(a.name, "a.txt");
        assert_eq!(a.size, 5);
        assert!(!a.is_dir());
        assert_eq!(sub.name, "sub");
        assert!(sub.is_dir());
    }

    #[test]
    fn get_honors_start_offset() {
        let (dir, mut driver, mut core) = setup();
        fs::write(dir.path().join("data.bin"), b"0123456789").unwrap();

        let size = driver.get_file(&mut core, "data.bin", 4).unwrap();
        assert_eq!(size, 10);

        let mut buf = [0u8; 16];
        let n = driver.read_chunk(&mut core, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"456789");
    }

    #[test]
    fn put_truncates_beyond_resume_point() {
        let (dir, mut driver, mut core) = setup();
        let path = dir.path().join("out.bin");
        fs::write(&path, b"0123456789").unwrap();

        driver.put_file(&mut core, "out.bin", 4, 8).unwrap();
        assert_eq!(driver.write_chunk(&mut core, b"wxyz").unwrap(), 4);
        driver.end_transfer(&mut core).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"0123wxyz");
    }

    #[test]
    fn missing_file_is_logical() {
        let (_dir, mut driver, mut core) = setup();
        match driver.get_file(&mut core, "ghost.txt", 0) {
            Err(Error::NotFound(_)) => (),
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[test]
    fn mkdir_rename_rmdir_cycle() {
        let (dir, mut driver, mut core) = setup();

        driver.mkdir(&mut core, "newdir").unwrap();
        assert!(dir.path().join("newdir").is_dir());

        driver.rename(&mut core, "newdir", "renamed").unwrap();
        assert!(dir.path().join("renamed").is_dir());

        driver.rmdir(&mut core, "renamed").unwrap();
        assert!(!dir.path().join("renamed").exists());
    }

    #[test]
    fn chdir_rejects_files() {
        let (dir, mut driver, mut core) = setup();
        fs::write(dir.path().join("plain.txt"), b"x").unwrap();

        assert!(driver.chdir(&mut core, "plain.txt").is_err());
        driver.mkdir(&mut core, "sub").unwrap();
        driver.chdir(&mut core, "sub").unwrap();
        assert!(core.directory.ends_with("sub"));
    }

    #[cfg(unix)]
    #[test]
    fn chmod_and_mtime_apply() {
        use std::os::unix::fs::MetadataExt;
        let (dir, mut driver, mut core) = setup();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();

        driver
            .chmod(&mut core, "f", crate::mode::S_IFREG | 0o600)
            .unwrap();
        assert_eq!(fs::metadata(&path).unwrap().mode() & 0o7777, 0o600);

        driver.set_file_time(&mut core, "f", 1_600_000_000).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().mtime(), 1_600_000_000);
    }
}
