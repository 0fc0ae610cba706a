//! The transfer scheduler.
//!
//! A [`Transfer`] moves an ordered file list from a source request to a
//! destination request: recursive directory expansion up front, then a
//! per-file loop that streams chunks, throttles to `maxkbs`, retries
//! transient failures with resume, skips per-file logical failures, and
//! propagates cancellation to both endpoints.
//!
//! Statistics live behind a mutex so a UI thread can watch a transfer
//! running on a worker thread; the cursor and flags are only touched by the
//! worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use xfer_transport::CancelFlag;

use crate::file::{FileRecord, TransferAction};
use crate::ftp;
use crate::request::Request;
use crate::{Error, Result, Severity};

const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Running,
    Retrying,
    Skipping,
    Done,
    Cancelled,
}

/// Aggregate counters, shared with observers under a mutex.
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// Bytes streamed since the last (re)start of the clock.
    pub trans_bytes: i64,
    /// Bytes skipped over by resume across all files.
    pub resumed_bytes: i64,
    pub total_bytes: i64,
    /// Bytes streamed for the current file on the current attempt.
    pub curtrans: i64,
    /// Resume offset of the current file.
    pub curresumed: i64,
    pub num_files: usize,
    pub num_dirs: usize,
    pub current_file_number: usize,
    pub current_file_retries: i64,
    pub kbs: f64,
    pub stalled: bool,
    started_at: Instant,
    last_update: Instant,
}

impl TransferStats {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            trans_bytes: 0,
            resumed_bytes: 0,
            total_bytes: 0,
            curtrans: 0,
            curresumed: 0,
            num_files: 0,
            num_dirs: 0,
            current_file_number: 0,
            current_file_retries: 0,
            kbs: 0.0,
            stalled: false,
            started_at: now,
            last_update: now,
        }
    }

    fn restart_clock(&mut self) {
        self.started_at = Instant::now();
        self.last_update = self.started_at;
    }
}

/// Handle for another thread to observe and steer a running transfer.
#[derive(Clone)]
pub struct TransferControl {
    stats: Arc<Mutex<TransferStats>>,
    cancel_flags: Vec<CancelFlag>,
    skip: Arc<AtomicBool>,
}

impl TransferControl {
    /// Aborts the whole transfer: the next I/O on either request fails
    /// within one timeout interval.
    pub fn cancel(&self) {
        for flag in &self.cancel_flags {
            flag.set();
        }
    }

    /// Abandons only the current file; the transfer continues with the
    /// next one.
    pub fn skip_current_file(&self) {
        self.skip.store(true, Ordering::SeqCst);
        self.cancel();
    }

    pub fn stats(&self) -> TransferStats {
        self.stats.lock().unwrap().clone()
    }
}

/// How long to pause after a chunk so the average rate stays at or under
/// the cap. `elapsed_since_last` is the time since the previous chunk
/// finished.
pub(crate) fn throttle_wait(
    bytes_just_read: usize,
    maxkbs: f64,
    elapsed_since_last: Duration,
) -> Duration {
    let ideal = Duration::from_secs_f64(bytes_just_read as f64 / 1024.0 / maxkbs);
    ideal.saturating_sub(elapsed_since_last)
}

enum Recover {
    Retry,
    SkipFile,
}

pub struct Transfer {
    pub source: Request,
    pub dest: Request,
    files: Vec<FileRecord>,
    cursor: usize,
    state: TransferState,
    stats: Arc<Mutex<TransferStats>>,
    cancel: CancelFlag,
    skip: Arc<AtomicBool>,
}

impl Transfer {
    pub fn new(source: Request, dest: Request, files: Vec<FileRecord>) -> Self {
        let mut transfer = Self {
            source,
            dest,
            files,
            cursor: 0,
            state: TransferState::Idle,
            stats: Arc::new(Mutex::new(TransferStats::new())),
            cancel: CancelFlag::new(),
            skip: Arc::new(AtomicBool::new(false)),
        };
        transfer.recount_totals();
        transfer
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn stats(&self) -> TransferStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn control(&self) -> TransferControl {
        TransferControl {
            stats: Arc::clone(&self.stats),
            cancel_flags: vec![
                self.cancel.clone(),
                self.source.cancel_flag(),
                self.dest.cancel_flag(),
            ],
            skip: Arc::clone(&self.skip),
        }
    }

    fn recount_totals(&mut self) {
        let mut stats = self.stats.lock().unwrap();
        stats.num_files = 0;
        stats.num_dirs = 0;
        stats.total_bytes = 0;
        for file in &self.files {
            if file.is_dir() {
                stats.num_dirs += 1;
            } else {
                stats.num_files += 1;
                if file.size > 0 {
                    stats.total_bytes += file.size;
                }
            }
        }
    }

    /// Replaces directory entries with their full recursive contents. Each
    /// directory is listed on the source; the matching destination listing
    /// (when it exists) marks which files are already present and how big
    /// they are, feeding the per-file resume decision.
    pub fn expand_directories(&mut self) -> Result<()> {
        self.source.ensure_connected()?;
        self.dest.ensure_connected()?;

        let files = std::mem::take(&mut self.files);
        let mut out = Vec::new();
        for file in files {
            self.expand_one(file, &mut out)?;
        }
        self.files = out;
        self.recount_totals();
        Ok(())
    }

    fn expand_one(&mut self, mut record: FileRecord, out: &mut Vec<FileRecord>) -> Result<()> {
        if record.dest_name.is_empty() {
            record.dest_name = record.name.clone();
        }
        let is_dir = record.is_dir();
        let src_path = record.name.clone();
        let dest_path = record.dest_name.clone();
        out.push(record);

        if !is_dir {
            return Ok(());
        }

        let saved_src = self.source.core.directory.clone();
        let saved_dest = self.dest.core.directory.clone();

        self.source.chdir(&join_path(&saved_src, &src_path))?;
        let entries = self.source.list_dir()?;
        self.source.chdir(&saved_src)?;

        let existing = self.destination_listing(&saved_dest, &dest_path);

        for entry in entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let mut child = entry;
            let base = child.name.clone();
            child.name = format!("{src_path}/{base}");
            child.dest_name = format!("{dest_path}/{base}");
            if let Some(&size) = existing.get(&base) {
                child.exists_on_destination = true;
                child.start_size = size;
            }
            self.expand_one(child, out)?;
        }
        Ok(())
    }

    fn destination_listing(&mut self, saved_dest: &str, dest_path: &str) -> HashMap<String, i64> {
        let mut map = HashMap::new();
        if self
            .dest
            .chdir(&join_path(saved_dest, dest_path))
            .is_err()
        {
            return map;
        }
        if let Ok(entries) = self.dest.list_dir() {
            for entry in entries {
                map.insert(entry.name.clone(), entry.size.max(0));
            }
        }
        let _ = self.dest.chdir(saved_dest);
        map
    }

    /// Runs the transfer to completion.
    pub fn run(&mut self) -> Result<()> {
        self.state = TransferState::Running;
        self.stats.lock().unwrap().restart_clock();

        while self.cursor < self.files.len() {
            if self.cancel.is_set() && !self.skip.load(Ordering::SeqCst) {
                self.abort_both();
                self.state = TransferState::Cancelled;
                return Err(Error::Cancelled);
            }

            {
                let mut stats = self.stats.lock().unwrap();
                stats.current_file_number += 1;
            }

            if self.files[self.cursor].action == TransferAction::Skip {
                self.cursor += 1;
                continue;
            }

            match self.transfer_current() {
                Ok(()) => {
                    self.files[self.cursor].done = true;
                    self.cursor += 1;
                    self.reset_file_flags();
                }
                Err(e) => match e.severity() {
                    Severity::Logical => {
                        log::error!("{}: {e}", self.files[self.cursor].name);
                        self.files[self.cursor].action = TransferAction::Skip;
                        self.cursor += 1;
                        self.reset_file_flags();
                    }
                    Severity::Retryable => match self.recover()? {
                        Recover::Retry => {
                            self.state = TransferState::Retrying;
                            let mut stats = self.stats.lock().unwrap();
                            stats.current_file_number =
                                stats.current_file_number.saturating_sub(1);
                        }
                        Recover::SkipFile => {
                            self.state = TransferState::Skipping;
                            self.files[self.cursor].action = TransferAction::Skip;
                            self.cursor += 1;
                            self.reset_file_flags();
                        }
                    },
                    Severity::Fatal => {
                        self.abort_both();
                        return Err(e);
                    }
                },
            }
            if self.state != TransferState::Running {
                self.state = TransferState::Running;
            }
        }

        self.state = TransferState::Done;
        Ok(())
    }

    fn reset_file_flags(&mut self) {
        self.skip.store(false, Ordering::SeqCst);
        self.cancel.clear();
        self.source.core.cancel.clear();
        self.dest.core.cancel.clear();
        let mut stats = self.stats.lock().unwrap();
        stats.current_file_retries = 0;
        stats.curtrans = 0;
        stats.curresumed = 0;
    }

    fn abort_both(&mut self) {
        if self.source.abort_transfer().is_err() {
            self.source.disconnect();
        }
        if self.dest.abort_transfer().is_err() {
            self.dest.disconnect();
        }
    }

    /// One attempt at the current file.
    fn transfer_current(&mut self) -> Result<()> {
        self.source.ensure_connected()?;
        self.dest.ensure_connected()?;

        let record = self.files[self.cursor].clone();
        let dest_name = record.destination().to_string();

        if record.is_dir() {
            match self.dest.mkdir(&dest_name) {
                Ok(()) => (),
                // Usually "already exists"; the files inside will tell.
                Err(e) if e.severity() == Severity::Logical => (),
                Err(e) => return Err(e),
            }
            return Ok(());
        }

        if record.size < 0 {
            if let Ok(size) = self.source.file_size(&record.name) {
                self.files[self.cursor].size = size;
                self.stats.lock().unwrap().total_bytes += size.max(0);
            }
        }

        let start = if record.action == TransferAction::Resume {
            record.start_size.max(0) as u64
        } else {
            0
        };

        {
            let mut stats = self.stats.lock().unwrap();
            stats.curtrans = 0;
            stats.curresumed = start as i64;
            stats.resumed_bytes += start as i64;
        }

        if ftp::supports_fxp(&self.source, &self.dest) {
            return self.transfer_current_fxp(&record.name, &dest_name);
        }

        let total = self.source.get_file(&record.name, start)?;
        if self.files[self.cursor].size < 0 && total >= 0 {
            self.files[self.cursor].size = total;
            self.stats.lock().unwrap().total_bytes += total;
        }

        if let Err(e) = self.dest.put_file(&dest_name, start, total) {
            let _ = self.source.abort_transfer();
            return Err(e);
        }

        self.stream_chunks()?;

        self.source.end_transfer()?;
        if let Err(e) = self.dest.end_transfer() {
            log::error!("finalizing {dest_name}: {e}");
        }

        let kbs = self.stats.lock().unwrap().kbs;
        log::info!(
            "Successfully transferred {} at {kbs:.2} KB/s",
            record.name
        );

        self.apply_attributes(&record, &dest_name);
        Ok(())
    }

    /// Third-party FTP transfer: the byte stream never touches us, so
    /// there is nothing to throttle; both servers report completion on
    /// their control connections.
    fn transfer_current_fxp(&mut self, name: &str, dest_name: &str) -> Result<()> {
        ftp::transfer_between(&mut self.source, &mut self.dest, name, dest_name)?;
        self.source.end_transfer()?;
        self.dest.end_transfer()?;

        let size = self.files[self.cursor].size.max(0);
        let mut stats = self.stats.lock().unwrap();
        stats.trans_bytes += size;
        stats.curtrans = size;
        drop(stats);

        let record = self.files[self.cursor].clone();
        let dest_name = dest_name.to_string();
        self.apply_attributes(&record, &dest_name);
        Ok(())
    }

    fn stream_chunks(&mut self) -> Result<()> {
        let maxkbs = self.source.core.opt_float("maxkbs");
        let mut buf = [0u8; CHUNK_SIZE];

        loop {
            if self.cancel.is_set() {
                return Err(Error::Cancelled);
            }

            let n = self.source.read_chunk(&mut buf)?;
            if n == 0 {
                return Ok(());
            }

            self.record_bytes(n, maxkbs);
            self.dest.write_chunk(&buf[..n])?;
        }
    }

    /// Updates byte counters and the KB/s figure, sleeping when the rate
    /// cap is exceeded.
    fn record_bytes(&mut self, n: usize, maxkbs: f64) {
        let wait = {
            let mut stats = self.stats.lock().unwrap();
            let now = Instant::now();
            stats.trans_bytes += n as i64;
            stats.curtrans += n as i64;
            stats.stalled = false;

            let elapsed = now.duration_since(stats.started_at).as_secs_f64();
            stats.kbs = if elapsed > 0.0 {
                stats.trans_bytes as f64 / 1024.0 / elapsed
            } else {
                stats.trans_bytes as f64 / 1024.0
            };

            if maxkbs > 0.0 && stats.kbs > maxkbs {
                throttle_wait(n, maxkbs, now.duration_since(stats.last_update))
            } else {
                stats.last_update = now;
                Duration::ZERO
            }
        };

        if !wait.is_zero() {
            std::thread::sleep(wait);
            self.stats.lock().unwrap().last_update = Instant::now();
        }
    }

    /// After a transient failure: disconnect both sides, back off, and
    /// reconnect, converting the current file to a resume. Gives up when
    /// the retry budget is spent.
    fn recover(&mut self) -> Result<Recover> {
        self.source.disconnect();
        self.dest.disconnect();

        if self.cancel.is_set() && !self.skip.load(Ordering::SeqCst) {
            self.state = TransferState::Cancelled;
            return Err(Error::Cancelled);
        }

        let skip_requested = self.skip.load(Ordering::SeqCst);
        loop {
            // Options are re-read each round so runtime changes apply.
            let retries = self.source.core.opt_int("retries");
            let sleep_time = self.source.core.opt_int("sleep_time");

            {
                let stats = self.stats.lock().unwrap();
                if retries != 0 && stats.current_file_retries >= retries {
                    log::error!(
                        "Error: Remote site {} disconnected. Max retries reached...giving up",
                        self.source.core.hostname
                    );
                    return Err(Error::RetriesExhausted);
                }
            }

            if !skip_requested && sleep_time > 0 {
                log::error!(
                    "Error: Remote site {} disconnected. Will reconnect in {sleep_time} seconds",
                    self.source.core.hostname
                );
                std::thread::sleep(Duration::from_secs(sleep_time as u64));
            }

            self.stats.lock().unwrap().current_file_retries += 1;

            let first = self.source.connect();
            let second = if first.is_ok() {
                self.dest.connect()
            } else {
                Ok(())
            };

            match (first, second) {
                (Ok(()), Ok(())) => break,
                (a, b) => {
                    let failed = a.err().or_else(|| b.err()).unwrap();
                    if failed.is_fatal() {
                        self.source.disconnect();
                        self.dest.disconnect();
                        return Err(failed);
                    }
                }
            }
        }

        let mut stats = self.stats.lock().unwrap();
        stats.resumed_bytes += stats.trans_bytes - stats.curresumed - stats.curtrans;
        stats.trans_bytes = 0;

        if skip_requested {
            stats.total_bytes -= self.files[self.cursor].size.max(0);
            stats.curtrans = 0;
            drop(stats);
            return Ok(Recover::SkipFile);
        }

        let record = &mut self.files[self.cursor];
        record.action = TransferAction::Resume;
        record.start_size = stats.curtrans + stats.curresumed;
        stats.curresumed = 0;
        stats.restart_clock();
        Ok(Recover::Retry)
    }

    /// Carries the source's mode and mtime over to the destination, where
    /// the destination protocol can express them.
    fn apply_attributes(&mut self, record: &FileRecord, dest_name: &str) {
        let caps = self.dest.capabilities();
        if caps.mutate && record.mode & 0o7777 != 0 {
            if let Err(e) = self.dest.chmod(dest_name, record.mode) {
                log::debug!("cannot chmod {dest_name}: {e}");
            }
        }
        if caps.metadata && record.mtime != 0 {
            if let Err(e) = self.dest.set_file_time(dest_name, record.mtime) {
                log::debug!("cannot set mtime on {dest_name}: {e}");
            }
        }
    }
}

fn join_path(base: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        rel.to_string()
    } else if base.is_empty() {
        rel.to_string()
    } else {
        format!("{}/{rel}", base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::file::FileRecord;
    use crate::options::Value;
    use crate::request::{Capabilities, Driver, Protocol, RequestCore};

    fn ctx() -> Arc<Context> {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(Context::new(dir.path().to_path_buf()));
        ctx.set_option("sleep_time", Value::Int(0));
        ctx.set_option("retries", Value::Int(3));
        ctx
    }

    /// In-memory source that drops the connection once, partway through.
    struct FlakySource {
        data: Vec<u8>,
        pos: usize,
        fail_at: Option<usize>,
        connected: bool,
    }

    impl Driver for FlakySource {
        fn protocol(&self) -> Protocol {
            Protocol::Sftp
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                listing: true,
                download: true,
                upload: false,
                mutate: false,
                metadata: false,
                raw_commands: false,
            }
        }
        fn connect(&mut self, _core: &mut RequestCore) -> Result<()> {
            self.connected = true;
            Ok(())
        }
        fn disconnect(&mut self, _core: &mut RequestCore) {
            self.connected = false;
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        fn list_files(&mut self, _core: &mut RequestCore) -> Result<()> {
            Ok(())
        }
        fn next_file(&mut self, _core: &mut RequestCore) -> Result<Option<FileRecord>> {
            Ok(None)
        }
        fn get_file(&mut self, _core: &mut RequestCore, _name: &str, start: u64) -> Result<i64> {
            if !self.connected {
                return Err(Error::NotConnected);
            }
            self.pos = start as usize;
            Ok(self.data.len() as i64)
        }
        fn read_chunk(&mut self, _core: &mut RequestCore, buf: &mut [u8]) -> Result<usize> {
            if !self.connected {
                return Err(Error::NotConnected);
            }
            if let Some(fail_at) = self.fail_at {
                if self.pos >= fail_at {
                    self.fail_at = None;
                    self.connected = false;
                    return Err(Error::ConnectionLost);
                }
            }
            let remaining = &self.data[self.pos.min(self.data.len())..];
            let mut n = remaining.len().min(buf.len());
            if let Some(fail_at) = self.fail_at {
                n = n.min(fail_at - self.pos);
            }
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }
        fn end_transfer(&mut self, _core: &mut RequestCore) -> Result<()> {
            Ok(())
        }
        fn chdir(&mut self, _core: &mut RequestCore, _dir: &str) -> Result<()> {
            Ok(())
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    /// Collecting destination; remembers the offset writes started at.
    struct MemDest {
        out: Arc<Mutex<Vec<u8>>>,
        opened_at: Arc<Mutex<Vec<u64>>>,
        connected: bool,
    }

    impl Driver for MemDest {
        fn protocol(&self) -> Protocol {
            Protocol::Local
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                listing: false,
                download: false,
                upload: true,
                mutate: false,
                metadata: false,
                raw_commands: false,
            }
        }
        fn connect(&mut self, _core: &mut RequestCore) -> Result<()> {
            self.connected = true;
            Ok(())
        }
        fn disconnect(&mut self, _core: &mut RequestCore) {
            self.connected = false;
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        fn list_files(&mut self, _core: &mut RequestCore) -> Result<()> {
            Ok(())
        }
        fn next_file(&mut self, _core: &mut RequestCore) -> Result<Option<FileRecord>> {
            Ok(None)
        }
        fn put_file(
            &mut self,
            _core: &mut RequestCore,
            _name: &str,
            start: u64,
            _total: i64,
        ) -> Result<()> {
            self.opened_at.lock().unwrap().push(start);
            self.out.lock().unwrap().truncate(start as usize);
            Ok(())
        }
        fn write_chunk(&mut self, _core: &mut RequestCore, buf: &[u8]) -> Result<usize> {
            self.out.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn end_transfer(&mut self, _core: &mut RequestCore) -> Result<()> {
            Ok(())
        }
        fn chdir(&mut self, _core: &mut RequestCore, _dir: &str) -> Result<()> {
            Ok(())
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn request_with(driver: Box<dyn Driver>) -> Request {
        Request {
            core: RequestCore::new(driver.protocol(), ctx()),
            driver,
        }
    }

    #[test]
    fn clean_transfer_moves_all_bytes() {
        let payload: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
        let out = Arc::new(Mutex::new(Vec::new()));

        let source = request_with(Box::new(FlakySource {
            data: payload.clone(),
            pos: 0,
            fail_at: None,
            connected: false,
        }));
        let dest = request_with(Box::new(MemDest {
            out: Arc::clone(&out),
            opened_at: Arc::new(Mutex::new(Vec::new())),
            connected: false,
        }));

        let mut record = FileRecord::new("payload.bin");
        record.size = payload.len() as i64;

        let mut transfer = Transfer::new(source, dest, vec![record]);
        transfer.run().unwrap();

        assert_eq!(*out.lock().unwrap(), payload);
        assert_eq!(transfer.state(), TransferState::Done);
        let stats = transfer.stats();
        assert_eq!(stats.trans_bytes, payload.len() as i64);
        assert_eq!(stats.resumed_bytes, 0);
    }

    #[test]
    fn mid_stream_drop_resumes_where_it_left_off() {
        let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
        let out = Arc::new(Mutex::new(Vec::new()));
        let opened_at = Arc::new(Mutex::new(Vec::new()));

        let source = request_with(Box::new(FlakySource {
            data: payload.clone(),
            pos: 0,
            fail_at: Some(250_000),
            connected: false,
        }));
        let dest = request_with(Box::new(MemDest {
            out: Arc::clone(&out),
            opened_at: Arc::clone(&opened_at),
            connected: false,
        }));

        let mut record = FileRecord::new("big.bin");
        record.size = payload.len() as i64;

        let mut transfer = Transfer::new(source, dest, vec![record]);
        transfer.run().unwrap();

        assert_eq!(*out.lock().unwrap(), payload);
        // Second open happened at the resume offset.
        assert_eq!(*opened_at.lock().unwrap(), vec![0, 250_000]);

        let stats = transfer.stats();
        assert_eq!(stats.resumed_bytes, 250_000);
        assert_eq!(stats.trans_bytes, 750_000);
        assert_eq!(stats.current_file_retries, 1);
        assert!(transfer.files()[0].done);
    }

    #[test]
    fn retries_exhaust_into_fatal() {
        struct AlwaysFails;
        impl Driver for AlwaysFails {
            fn protocol(&self) -> Protocol {
                Protocol::Sftp
            }
            fn capabilities(&self) -> Capabilities {
                Capabilities {
                    listing: false,
                    download: true,
                    upload: false,
                    mutate: false,
                    metadata: false,
                    raw_commands: false,
                }
            }
            fn connect(&mut self, _core: &mut RequestCore) -> Result<()> {
                Ok(())
            }
            fn disconnect(&mut self, _core: &mut RequestCore) {}
            fn is_connected(&self) -> bool {
                true
            }
            fn list_files(&mut self, _core: &mut RequestCore) -> Result<()> {
                Ok(())
            }
            fn next_file(&mut self, _core: &mut RequestCore) -> Result<Option<FileRecord>> {
                Ok(None)
            }
            fn get_file(
                &mut self,
                _core: &mut RequestCore,
                _name: &str,
                _start: u64,
            ) -> Result<i64> {
                Err(Error::ConnectionLost)
            }
            fn end_transfer(&mut self, _core: &mut RequestCore) -> Result<()> {
                Ok(())
            }
            fn chdir(&mut self, _core: &mut RequestCore, _dir: &str) -> Result<()> {
                Ok(())
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }

        let source = request_with(Box::new(AlwaysFails));
        let dest = request_with(Box::new(MemDest {
            out: Arc::new(Mutex::new(Vec::new())),
            opened_at: Arc::new(Mutex::new(Vec::new())),
            connected: false,
        }));

        let mut record = FileRecord::new("never.bin");
        record.size = 10;

        let mut transfer = Transfer::new(source, dest, vec![record]);
        match transfer.run() {
            Err(Error::RetriesExhausted) => (),
            other => panic!("expected retries-exhausted, got {other:?}"),
        }
        assert_eq!(transfer.stats().current_file_retries, 3);
    }

    #[test]
    fn logical_failure_skips_just_that_file() {
        struct MissingFirst {
            data: Vec<u8>,
            pos: usize,
        }
        impl Driver for MissingFirst {
            fn protocol(&self) -> Protocol {
                Protocol::Sftp
            }
            fn capabilities(&self) -> Capabilities {
                Capabilities {
                    listing: false,
                    download: true,
                    upload: false,
                    mutate: false,
                    metadata: false,
                    raw_commands: false,
                }
            }
            fn connect(&mut self, _core: &mut RequestCore) -> Result<()> {
                Ok(())
            }
            fn disconnect(&mut self, _core: &mut RequestCore) {}
            fn is_connected(&self) -> bool {
                true
            }
            fn list_files(&mut self, _core: &mut RequestCore) -> Result<()> {
                Ok(())
            }
            fn next_file(&mut self, _core: &mut RequestCore) -> Result<Option<FileRecord>> {
                Ok(None)
            }
            fn get_file(&mut self, _core: &mut RequestCore, name: &str, start: u64) -> Result<i64> {
                if name == "ghost.txt" {
                    return Err(Error::NotFound(name.to_string()));
                }
                self.pos = start as usize;
                Ok(self.data.len() as i64)
            }
            fn read_chunk(&mut self, _core: &mut RequestCore, buf: &mut [u8]) -> Result<usize> {
                let remaining = &self.data[self.pos..];
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                self.pos += n;
                Ok(n)
            }
            fn end_transfer(&mut self, _core: &mut RequestCore) -> Result<()> {
                Ok(())
            }
            fn chdir(&mut self, _core: &mut RequestCore, _dir: &str) -> Result<()> {
                Ok(())
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }

        let out = Arc::new(Mutex::new(Vec::new()));
        let source = request_with(Box::new(MissingFirst {
            data: b"present".to_vec(),
            pos: 0,
        }));
        let dest = request_with(Box::new(MemDest {
            out: Arc::clone(&out),
            opened_at: Arc::new(Mutex::new(Vec::new())),
            connected: false,
        }));

        let mut ghost = FileRecord::new("ghost.txt");
        ghost.size = 100;
        let mut present = FileRecord::new("present.txt");
        present.size = 7;

        let mut transfer = Transfer::new(source, dest, vec![ghost, present]);
        transfer.run().unwrap();

        assert_eq!(*out.lock().unwrap(), b"present");
        assert_eq!(transfer.files()[0].action, TransferAction::Skip);
        assert!(!transfer.files()[0].done);
        assert!(transfer.files()[1].done);
    }

    #[test]
    fn cancel_stops_the_transfer() {
        let payload = vec![0u8; 64 * 1024];
        let source = request_with(Box::new(FlakySource {
            data: payload,
            pos: 0,
            fail_at: None,
            connected: false,
        }));
        let dest = request_with(Box::new(MemDest {
            out: Arc::new(Mutex::new(Vec::new())),
            opened_at: Arc::new(Mutex::new(Vec::new())),
            connected: false,
        }));

        let mut record = FileRecord::new("x.bin");
        record.size = 64 * 1024;

        let mut transfer = Transfer::new(source, dest, vec![record]);
        transfer.control().cancel();

        match transfer.run() {
            Err(Error::Cancelled) => (),
            other => panic!("expected cancelled, got {other:?}"),
        }
        assert_eq!(transfer.state(), TransferState::Cancelled);
    }

    #[test]
    fn local_to_local_recursive_copy() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();

        std::fs::create_dir(src_dir.path().join("sub")).unwrap();
        std::fs::write(src_dir.path().join("top.txt"), b"top").unwrap();
        std::fs::write(src_dir.path().join("sub/inner.txt"), b"inner").unwrap();

        let mut source = Request::new(Protocol::Local, ctx());
        source.core.directory = src_dir.path().to_string_lossy().into_owned();
        let mut dest = Request::new(Protocol::Local, ctx());
        dest.core.directory = dst_dir.path().to_string_lossy().into_owned();

        let mut top = FileRecord::new("top.txt");
        top.size = 3;
        top.mode = crate::mode::S_IFREG | 0o644;
        let mut sub = FileRecord::new("sub");
        sub.mode = crate::mode::S_IFDIR | 0o755;

        let mut transfer = Transfer::new(source, dest, vec![top, sub]);
        transfer.expand_directories().unwrap();
        transfer.run().unwrap();

        assert_eq!(
            std::fs::read(dst_dir.path().join("top.txt")).unwrap(),
            b"top"
        );
        assert_eq!(
            std::fs::read(dst_dir.path().join("sub/inner.txt")).unwrap(),
            b"inner"
        );
    }

    #[test]
    fn expansion_marks_existing_destination_files() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();

        std::fs::create_dir(src_dir.path().join("sub")).unwrap();
        std::fs::write(src_dir.path().join("sub/file.bin"), vec![7u8; 100]).unwrap();
        std::fs::create_dir(dst_dir.path().join("sub")).unwrap();
        std::fs::write(dst_dir.path().join("sub/file.bin"), vec![7u8; 40]).unwrap();

        let mut source = Request::new(Protocol::Local, ctx());
        source.core.directory = src_dir.path().to_string_lossy().into_owned();
        let mut dest = Request::new(Protocol::Local, ctx());
        dest.core.directory = dst_dir.path().to_string_lossy().into_owned();

        let mut sub = FileRecord::new("sub");
        sub.mode = crate::mode::S_IFDIR | 0o755;

        let mut transfer = Transfer::new(source, dest, vec![sub]);
        transfer.expand_directories().unwrap();

        let files = transfer.files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].name, "sub/file.bin");
        assert!(files[1].exists_on_destination);
        assert_eq!(files[1].start_size, 40);
    }

    #[test]
    fn throttle_wait_is_proportional() {
        // 8192 bytes at 8 KB/s should take one second.
        let wait = throttle_wait(8192, 8.0, Duration::from_millis(200));
        assert_eq!(wait, Duration::from_millis(800));

        // Already slower than the cap: no wait.
        let wait = throttle_wait(1024, 100.0, Duration::from_secs(1));
        assert_eq!(wait, Duration::ZERO);
    }
}
