//! On-disk directory-listing cache.
//!
//! A cache entry is the raw byte lines a listing produced, keyed by the
//! endpoint identity plus the directory path. Drivers write entries through
//! while a listing streams in, then replay them on the next listing of the
//! same directory instead of a network round trip. Invalidation is
//! explicit: every operation that mutates a directory removes its entry.
//!
//! Only one writer per key is allowed at a time; a second writer simply
//! gets no cache handle and the listing goes uncached.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Identity of one cached listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scheme: &'static str,
    pub username: String,
    pub hostname: String,
    pub port: u16,
    pub directory: String,
}

impl CacheKey {
    /// Human-readable token, also the basis of the entry file name.
    pub fn token(&self) -> String {
        format!(
            "{}:{}@{}:{}{}",
            self.scheme, self.username, self.hostname, self.port, self.directory
        )
    }

    fn filename(&self) -> String {
        let token = self.token();
        let safe: String = token
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(96)
            .collect();
        format!("{safe}-{:016x}.ls", fnv1a(token.as_bytes()))
    }
}

/// FNV-1a, for stable entry names across runs.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[derive(Debug)]
pub struct ListingCache {
    dir: PathBuf,
    busy: Arc<Mutex<HashSet<String>>>,
}

impl ListingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            busy: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Opens an existing entry for replay.
    pub fn open(&self, key: &CacheKey) -> Option<File> {
        let path = self.dir.join(key.filename());
        match File::open(&path) {
            Ok(file) => {
                log::debug!("serving listing of {} from cache", key.token());
                Some(file)
            }
            Err(_) => None,
        }
    }

    /// Starts a write-through entry. Returns `None` when another writer
    /// holds this key or the cache directory is unusable.
    pub fn create(&self, key: &CacheKey) -> Option<EntryWriter> {
        let token = key.filename();
        {
            let mut busy = self.busy.lock().unwrap();
            if !busy.insert(token.clone()) {
                return None;
            }
        }

        if let Err(e) = fs::create_dir_all(&self.dir) {
            log::warn!("cannot create cache directory {}: {e}", self.dir.display());
            self.busy.lock().unwrap().remove(&token);
            return None;
        }

        let final_path = self.dir.join(&token);
        let tmp_path = self.dir.join(format!("{token}.part"));
        match File::create(&tmp_path) {
            Ok(file) => Some(EntryWriter {
                file: BufWriter::new(file),
                tmp_path,
                final_path,
                token,
                busy: Arc::clone(&self.busy),
                committed: false,
            }),
            Err(e) => {
                log::warn!("cannot create cache entry for {}: {e}", key.token());
                self.busy.lock().unwrap().remove(&token);
                None
            }
        }
    }

    /// Removes an entry. Called on refresh and after mutating operations.
    pub fn invalidate(&self, key: &CacheKey) {
        let path = self.dir.join(key.filename());
        if fs::remove_file(&path).is_ok() {
            log::debug!("invalidated cached listing of {}", key.token());
        }
    }
}

/// Write-through handle for one cache entry. The entry only becomes visible
/// once [`EntryWriter::commit`] runs; an aborted listing leaves no trace.
#[derive(Debug)]
pub struct EntryWriter {
    file: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    token: String,
    busy: Arc<Mutex<HashSet<String>>>,
    committed: bool,
}

impl EntryWriter {
    /// Appends one raw listing line, restoring the newline the line reader
    /// stripped.
    pub fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line)?;
        self.file.write_all(b"\n")
    }

    pub fn commit(mut self) -> std::io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for EntryWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
        self.busy.lock().unwrap().remove(&self.token);
    }
}

/// A cached entry replayed through the [`Channel`] interface, so listing
/// code reads it exactly as it would read the wire.
///
/// [`Channel`]: xfer_transport::Channel
#[derive(Debug)]
pub struct ReplayChannel(pub File);

impl xfer_transport::Channel for ReplayChannel {
    fn read(&mut self, buf: &mut [u8]) -> xfer_transport::Result<usize> {
        use std::io::Read;
        Ok(self.0.read(buf)?)
    }

    fn write_all(&mut self, _buf: &[u8]) -> xfer_transport::Result<()> {
        Err(xfer_transport::TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn key(dir: &str) -> CacheKey {
        CacheKey {
            scheme: "ftp",
            username: "alice".into(),
            hostname: "ftp.example.org".into(),
            port: 21,
            directory: dir.into(),
        }
    }

    #[test]
    fn write_commit_replay() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ListingCache::new(tmp.path());
        let k = key("/pub");

        let mut writer = cache.create(&k).unwrap();
        writer.write_line(b"-rw-r--r-- 1 u g 10 Jan 1 00:00 a").unwrap();
        writer.write_line(b"-rw-r--r-- 1 u g 20 Jan 1 00:00 b").unwrap();
        writer.commit().unwrap();

        let mut replay = String::new();
        cache.open(&k).unwrap().read_to_string(&mut replay).unwrap();
        assert_eq!(replay.lines().count(), 2);
        assert!(replay.ends_with("b\n"));
    }

    #[test]
    fn uncommitted_entry_is_invisible() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ListingCache::new(tmp.path());
        let k = key("/pub");

        {
            let mut writer = cache.create(&k).unwrap();
            writer.write_line(b"partial").unwrap();
            // dropped without commit
        }
        assert!(cache.open(&k).is_none());
    }

    #[test]
    fn one_writer_per_key() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ListingCache::new(tmp.path());
        let k = key("/pub");

        let first = cache.create(&k).unwrap();
        assert!(cache.create(&k).is_none());
        drop(first);
        assert!(cache.create(&k).is_some());
    }

    #[test]
    fn invalidate_removes_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ListingCache::new(tmp.path());
        let k = key("/pub");

        let writer = cache.create(&k).unwrap();
        writer.commit().unwrap();
        assert!(cache.open(&k).is_some());

        cache.invalidate(&k);
        assert!(cache.open(&k).is_none());
    }

    #[test]
    fn distinct_directories_get_distinct_entries() {
        let a = key("/pub").filename();
        let b = key("/pub/sub").filename();
        assert_ne!(a, b);
    }
}
