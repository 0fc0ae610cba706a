//! SFTP v3 driver over an `ssh` subprocess.
//!
//! The transport is a child `ssh` process with piped stdio, started with
//! `BatchMode=yes` so authentication comes from keys or an agent and never
//! from an interactive prompt. After the `INIT`/`VERSION` handshake every
//! request carries a fresh id, and the response must echo it back; an id
//! mismatch is a protocol violation that ends the session.
//!
//! Paths are absolutized on the client against the working directory
//! before they go on the wire.

use std::collections::VecDeque;

use xfer_sftp_msg::{
    decode_frame_len, encode_request, FileAttrs, InitRequest, NameEntry, OpenFlags,
    Response, SftpRequest, StatusCode, StatusPayload, WireString, PROTOCOL_VERSION,
    WRITE_CHUNK_SIZE,
};
use xfer_sftp_msg::{
    CloseRequest, LstatRequest, MkdirRequest, OpendirRequest, OpenRequest, ReaddirRequest,
    ReadRequest, RealpathRequest, RemoveRequest, RenameRequest, RmdirRequest, SetstatRequest,
    StatRequest, WriteRequest,
};
use xfer_transport::{Channel, LineReader};

use crate::cache::{EntryWriter, ReplayChannel};
use crate::file::FileRecord;
use crate::listing::{parse_ls, NoExtraLines};
use crate::request::{Capabilities, Driver, Protocol, RequestCore};
use crate::{Error, Result};

pub struct SftpDriver {
    child: Option<std::process::Child>,
    chan: Option<Box<dyn Channel + Send>>,
    next_id: u32,

    /// Open file handle and read/write position of the current transfer.
    handle: Option<Vec<u8>>,
    offset: u64,
    /// Open directory handle plus entries already received but not yet
    /// handed out.
    dir_handle: Option<Vec<u8>>,
    pending: VecDeque<NameEntry>,
    /// Suppresses per-packet STATUS logging inside the write loop.
    quiet_status: bool,

    replay: Option<ReplayChannel>,
    replay_rbuf: LineReader,
    cache_writer: Option<EntryWriter>,
}

impl SftpDriver {
    pub fn new() -> Self {
        Self {
            child: None,
            chan: None,
            next_id: 0,
            handle: None,
            offset: 0,
            dir_handle: None,
            pending: VecDeque::new(),
            quiet_status: false,
            replay: None,
            replay_rbuf: LineReader::default(),
            cache_writer: None,
        }
    }

    /// Test hook: runs the driver over an arbitrary channel instead of a
    /// spawned ssh process.
    #[cfg(test)]
    fn with_channel(chan: Box<dyn Channel + Send>) -> Self {
        let mut driver = Self::new();
        driver.chan = Some(chan);
        driver
    }

    fn drop_session(&mut self, core: &mut RequestCore) {
        if self.chan.take().is_some() {
            log::info!("Disconnecting from site {}", core.hostname);
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.handle = None;
        self.dir_handle = None;
        self.pending.clear();
        self.replay = None;
        self.cache_writer = None;
        self.quiet_status = false;
        core.cached = false;
    }

    fn take_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    fn send<T: SftpRequest>(&mut self, core: &mut RequestCore, request: &T) -> Result<()> {
        let bytes = match encode_request(request) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Error: {e}");
                self.drop_session(core);
                return Err(e.into());
            }
        };
        let chan = self.chan.as_mut().ok_or(Error::NotConnected)?;
        if let Err(e) = chan.write_all(&bytes) {
            self.drop_session(core);
            return Err(e.into());
        }
        Ok(())
    }

    fn recv(&mut self, core: &mut RequestCore) -> Result<Response> {
        let chan = self.chan.as_mut().ok_or(Error::NotConnected)?;

        let mut prefix = [0u8; 4];
        if let Err(e) = chan.read_exact(&mut prefix) {
            self.drop_session(core);
            return Err(e.into());
        }
        let frame_len = match decode_frame_len(prefix) {
            Ok(len) => len,
            Err(e) => {
                log::error!("Error: {e}");
                self.drop_session(core);
                return Err(e.into());
            }
        };

        let chan = self.chan.as_mut().ok_or(Error::NotConnected)?;
        let mut frame = vec![0u8; frame_len];
        if let Err(e) = chan.read_exact(&mut frame) {
            self.drop_session(core);
            return Err(e.into());
        }

        let response = match Response::decode(frame[0], &frame[1..]) {
            Ok(response) => response,
            Err(e) => {
                log::error!("Received wrong response from server, disconnecting");
                self.drop_session(core);
                return Err(e.into());
            }
        };

        if let Response::Status(status) = &response {
            if !self.quiet_status {
                log::debug!("{}: {}", status.id, status.code);
            }
        } else {
            log::trace!("{} packet", response.kind_name());
        }

        Ok(response)
    }

    /// Sends a request and reads the response, enforcing the id match.
    fn roundtrip<T: SftpRequest>(
        &mut self,
        core: &mut RequestCore,
        request: &T,
        id: u32,
    ) -> Result<Response> {
        self.send(core, request)?;
        let response = self.recv(core)?;

        if response.id() != Some(id) {
            log::error!("Received wrong response from server, disconnecting");
            self.drop_session(core);
            return Err(Error::Protocol(format!(
                "response id {:?} does not match request id {id}",
                response.id()
            )));
        }
        Ok(response)
    }

    /// Maps a non-OK status onto the engine error model. Session-fatal
    /// codes tear the session down; per-file codes leave it open.
    fn status_error(&mut self, core: &mut RequestCore, status: &StatusPayload, what: &str) -> Error {
        core.last_response = status
            .message
            .as_ref()
            .map(|m| m.as_str_lossy().into_owned())
            .unwrap_or_else(|| status.code.to_string());

        if status.code.is_session_fatal() {
            self.drop_session(core);
            return Error::Protocol(format!("{}: {}", status.code, what));
        }

        match status.code {
            StatusCode::NoSuchFile => Error::NotFound(what.to_string()),
            StatusCode::PermissionDenied => Error::PermissionDenied(what.to_string()),
            StatusCode::Failure => Error::RemoteFailure(core.last_response.clone()),
            _ => Error::ServerResponse(core.last_response.clone()),
        }
    }

    fn expect_ok(&mut self, core: &mut RequestCore, response: Response, what: &str) -> Result<()> {
        match response {
            Response::Status(status) if status.code == StatusCode::Ok => Ok(()),
            Response::Status(status) => Err(self.status_error(core, &status, what)),
            other => {
                self.drop_session(core);
                Err(Error::Protocol(format!(
                    "unexpected {} response to {what}",
                    other.kind_name()
                )))
            }
        }
    }

    fn expect_handle(
        &mut self,
        core: &mut RequestCore,
        response: Response,
        what: &str,
    ) -> Result<Vec<u8>> {
        match response {
            Response::Handle(handle) => Ok(handle.handle.0),
            Response::Status(status) => Err(self.status_error(core, &status, what)),
            other => {
                self.drop_session(core);
                Err(Error::Protocol(format!(
                    "unexpected {} response to {what}",
                    other.kind_name()
                )))
            }
        }
    }

    fn absolutize(&self, core: &RequestCore, path: &str) -> String {
        if path.starts_with('/') {
            return path.to_string();
        }
        let dir = core.directory.trim_end_matches('/');
        if dir.is_empty() {
            format!("/{path}")
        } else {
            format!("{dir}/{path}")
        }
    }

    fn realpath(&mut self, core: &mut RequestCore, path: &str) -> Result<String> {
        let id = self.take_id();
        log::debug!("{id}: Realpath {path}");
        let request = RealpathRequest {
            id,
            path: WireString::from(path),
        };
        match self.roundtrip(core, &request, id)? {
            Response::Name(name) if !name.entries.is_empty() => {
                Ok(name.entries[0].filename.as_str_lossy().into_owned())
            }
            Response::Status(status) => Err(self.status_error(core, &status, path)),
            other => {
                self.drop_session(core);
                Err(Error::Protocol(format!(
                    "unexpected {} response to realpath",
                    other.kind_name()
                )))
            }
        }
    }

    fn stat_attrs(&mut self, core: &mut RequestCore, path: &str) -> Result<FileAttrs> {
        let id = self.take_id();
        log::debug!("{id}: Stat {path}");
        let request = StatRequest {
            id,
            path: WireString::from(path),
        };
        match self.roundtrip(core, &request, id)? {
            Response::Attrs(attrs) => Ok(attrs.attrs),
            Response::Status(status) => Err(self.status_error(core, &status, path)),
            other => {
                self.drop_session(core);
                Err(Error::Protocol(format!(
                    "unexpected {} response to stat",
                    other.kind_name()
                )))
            }
        }
    }

    /// Like [`Self::stat_attrs`] but does not follow symlinks; directory
    /// entries report the link itself.
    fn lstat_attrs(&mut self, core: &mut RequestCore, path: &str) -> Result<FileAttrs> {
        let id = self.take_id();
        log::debug!("{id}: Lstat {path}");
        let request = LstatRequest {
            id,
            path: WireString::from(path),
        };
        match self.roundtrip(core, &request, id)? {
            Response::Attrs(attrs) => Ok(attrs.attrs),
            Response::Status(status) => Err(self.status_error(core, &status, path)),
            other => {
                self.drop_session(core);
                Err(Error::Protocol(format!(
                    "unexpected {} response to lstat",
                    other.kind_name()
                )))
            }
        }
    }

    fn close_handle(&mut self, core: &mut RequestCore, handle: Vec<u8>) -> Result<()> {
        let id = self.take_id();
        let request = CloseRequest {
            id,
            handle: WireString(handle),
        };
        let response = self.roundtrip(core, &request, id)?;
        self.expect_ok(core, response, "close")
    }

    #[cfg(unix)]
    fn spawn_ssh(&mut self, core: &mut RequestCore) -> Result<()> {
        use std::process::{Command, Stdio};

        let prog = core.opt_text("ssh_prog_name");
        let prog = if prog.is_empty() { "ssh".to_string() } else { prog };

        log::info!("Opening SSH connection to {}", core.hostname);

        let mut command = Command::new(&prog);
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-x")
            .arg("-e")
            .arg("none");

        if let Some(port) = core.port {
            command.arg("-p").arg(port.to_string());
        }
        if !core.username.is_empty() {
            command.arg("-l").arg(&core.username);
        }
        for extra in core.context().with_options(|o| o.list("ssh_extra_params")) {
            command.arg(extra);
        }

        let server_path = core.opt_text("sftp_server_path");
        if server_path.is_empty() {
            command.arg("-s").arg(&core.hostname).arg("sftp");
        } else {
            command.arg(&core.hostname).arg(server_path);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                log::error!("Cannot execute {prog}: {e}");
                Error::Io(e)
            })?;

        let stdout = child.stdout.take().ok_or(Error::NotConnected)?;
        let stdin = child.stdin.take().ok_or(Error::NotConnected)?;
        self.chan = Some(Box::new(xfer_transport::PipeChannel::new(
            stdout,
            stdin,
            core.hostname.clone(),
            core.timeout(),
            core.cancel.clone(),
        )));
        self.child = Some(child);
        Ok(())
    }

    #[cfg(not(unix))]
    fn spawn_ssh(&mut self, _core: &mut RequestCore) -> Result<()> {
        Err(Error::Unsupported("sftp"))
    }

    fn handshake(&mut self, core: &mut RequestCore) -> Result<()> {
        self.send(
            core,
            &InitRequest {
                version: PROTOCOL_VERSION,
            },
        )?;
        match self.recv(core)? {
            Response::Version(version) => {
                log::debug!("Protocol version {}", version.version);
                Ok(())
            }
            _ => {
                log::error!("Received wrong response from server, disconnecting");
                self.drop_session(core);
                Err(Error::Protocol("expected VERSION after INIT".to_string()))
            }
        }
    }
}

impl Default for SftpDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for SftpDriver {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
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
        if self.chan.is_some() {
            return Ok(());
        }

        self.spawn_ssh(core)?;
        self.handshake(core)?;

        let directory = if core.directory.is_empty() {
            ".".to_string()
        } else {
            core.directory.clone()
        };
        core.directory = self.realpath(core, &directory)?;

        log::info!("Successfully logged into SSH server {}", core.hostname);
        Ok(())
    }

    fn disconnect(&mut self, core: &mut RequestCore) {
        self.drop_session(core);
    }

    fn is_connected(&self) -> bool {
        self.chan.is_some()
    }

    fn list_files(&mut self, core: &mut RequestCore) -> Result<()> {
        self.replay = None;
        self.cache_writer = None;
        self.pending.clear();
        core.cached = false;

        let use_cache = core.opt_bool("use_cache");
        let key = core.cache_key();
        if use_cache {
            let ctx = core.context().clone();
            if let Some(entry) = ctx.cache().open(&key) {
                self.replay = Some(ReplayChannel(entry));
                self.replay_rbuf = LineReader::default();
                core.cached = true;
                return Ok(());
            }
        }

        log::info!("Retrieving directory listing...");

        let id = self.take_id();
        let directory = core.directory.clone();
        log::debug!("{id}: Open Directory {directory}");
        let request = OpendirRequest {
            id,
            path: WireString::from(directory.as_str()),
        };
        let response = self.roundtrip(core, &request, id)?;
        let handle = self.expect_handle(core, response, &directory)?;
        self.dir_handle = Some(handle);

        if use_cache {
            let ctx = core.context().clone();
            self.cache_writer = ctx.cache().create(&key);
        }
        Ok(())
    }

    fn next_file(&mut self, core: &mut RequestCore) -> Result<Option<FileRecord>> {
        loop {
            if let Some(replay) = self.replay.as_mut() {
                let Some(line) = self.replay_rbuf.read_line(replay)? else {
                    return Ok(None);
                };
                let text = String::from_utf8_lossy(&line).into_owned();
                match parse_ls(&text, core.server_type, &mut NoExtraLines) {
                    Ok(record) => return Ok(Some(record)),
                    Err(_) => continue,
                }
            }

            if let Some(entry) = self.pending.pop_front() {
                let mut longname = entry.longname.as_str_lossy().into_owned();
                // Some servers decorate entries like `ls -F`.
                while longname.ends_with('*') || longname.ends_with('/') {
                    longname.pop();
                }

                if let Some(writer) = self.cache_writer.as_mut() {
                    writer
                        .write_line(longname.as_bytes())
                        .map_err(|e| Error::Protocol(format!("cannot write cache entry: {e}")))?;
                }

                match parse_ls(&longname, core.server_type, &mut NoExtraLines) {
                    Ok(record) => return Ok(Some(record)),
                    Err(_) => {
                        log::warn!("Warning: Cannot parse listing {longname}");
                        continue;
                    }
                }
            }

            let Some(handle) = self.dir_handle.clone() else {
                return Ok(None);
            };
            let id = self.take_id();
            log::debug!("{id}: Read Directory");
            let request = ReaddirRequest {
                id,
                handle: WireString(handle),
            };
            match self.roundtrip(core, &request, id)? {
                Response::Name(name) => self.pending.extend(name.entries),
                Response::Status(status) if status.code == StatusCode::Eof => {
                    return Ok(None);
                }
                Response::Status(status) => {
                    return Err(self.status_error(core, &status, "readdir"))
                }
                other => {
                    self.drop_session(core);
                    return Err(Error::Protocol(format!(
                        "unexpected {} response to readdir",
                        other.kind_name()
                    )));
                }
            }
        }
    }

    fn get_file(&mut self, core: &mut RequestCore, name: &str, start: u64) -> Result<i64> {
        let path = self.absolutize(core, name);

        let size = match self.stat_attrs(core, &path) {
            Ok(attrs) => attrs.size.map(|s| s as i64).unwrap_or(-1),
            Err(e @ Error::NotFound(_)) => return Err(e),
            Err(_) => -1,
        };

        let id = self.take_id();
        log::debug!("{id}: Open {path}");
        let request = OpenRequest {
            id,
            path: WireString::from(path.as_str()),
            pflags: OpenFlags::READ,
            attrs: FileAttrs::empty(),
        };
        let response = self.roundtrip(core, &request, id)?;
        let handle = self.expect_handle(core, response, &path)?;

        self.handle = Some(handle);
        self.offset = start;
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

        let mut pflags = OpenFlags::WRITE | OpenFlags::CREAT;
        if start == 0 {
            pflags |= OpenFlags::TRUNC;
        }

        let id = self.take_id();
        log::debug!("{id}: Open {path}");
        let request = OpenRequest {
            id,
            path: WireString::from(path.as_str()),
            pflags,
            attrs: FileAttrs::empty(),
        };
        let response = self.roundtrip(core, &request, id)?;
        let handle = self.expect_handle(core, response, &path)?;

        self.handle = Some(handle);
        self.offset = start;
        self.quiet_status = true;
        Ok(())
    }

    fn read_chunk(&mut self, core: &mut RequestCore, buf: &mut [u8]) -> Result<usize> {
        let handle = self.handle.clone().ok_or(Error::NotConnected)?;
        let length = buf.len().min(WRITE_CHUNK_SIZE) as u32;

        let id = self.take_id();
        let request = ReadRequest {
            id,
            handle: WireString(handle),
            offset: self.offset,
            length,
        };
        match self.roundtrip(core, &request, id)? {
            Response::Data(data) => {
                let bytes = data.data.0;
                if bytes.len() > buf.len() {
                    self.drop_session(core);
                    return Err(Error::Protocol(format!(
                        "server sent {} bytes for a {} byte read",
                        bytes.len(),
                        buf.len()
                    )));
                }
                buf[..bytes.len()].copy_from_slice(&bytes);
                self.offset += bytes.len() as u64;
                Ok(bytes.len())
            }
            Response::Status(status) if status.code == StatusCode::Eof => Ok(0),
            Response::Status(status) => Err(self.status_error(core, &status, "read")),
            other => {
                self.drop_session(core);
                Err(Error::Protocol(format!(
                    "unexpected {} response to read",
                    other.kind_name()
                )))
            }
        }
    }

    fn write_chunk(&mut self, core: &mut RequestCore, buf: &[u8]) -> Result<usize> {
        let handle = self.handle.clone().ok_or(Error::NotConnected)?;
        let chunk = &buf[..buf.len().min(WRITE_CHUNK_SIZE)];

        let id = self.take_id();
        let request = WriteRequest {
            id,
            handle: WireString(handle),
            offset: self.offset,
            data: WireString(chunk.to_vec()),
        };
        let response = self.roundtrip(core, &request, id)?;
        self.expect_ok(core, response, "write")?;

        self.offset += chunk.len() as u64;
        Ok(chunk.len())
    }

    fn end_transfer(&mut self, core: &mut RequestCore) -> Result<()> {
        self.quiet_status = false;
        let was_replay = self.replay.take().is_some();
        self.pending.clear();

        if let Some(writer) = self.cache_writer.take() {
            writer
                .commit()
                .map_err(|e| Error::Protocol(format!("cannot write cache entry: {e}")))?;
        }
        core.cached = false;
        if was_replay {
            return Ok(());
        }

        if let Some(handle) = self.handle.take() {
            self.close_handle(core, handle)?;
        }
        if let Some(handle) = self.dir_handle.take() {
            self.close_handle(core, handle)?;
        }
        Ok(())
    }

    fn chdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        let path = self.absolutize(core, dir);
        let canonical = self.realpath(core, &path)?;

        // Make sure the target really is a directory before adopting it.
        let attrs = self.stat_attrs(core, &canonical)?;
        if let Some(permissions) = attrs.permissions {
            if permissions & crate::mode::S_IFMT != crate::mode::S_IFDIR {
                return Err(Error::RemoteFailure(format!("{canonical} is not a directory")));
            }
        }

        core.directory = canonical;
        Ok(())
    }

    fn mkdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        let path = self.absolutize(core, dir);
        let id = self.take_id();
        log::debug!("{id}: Make directory {path}");
        let request = MkdirRequest {
            id,
            path: WireString::from(path.as_str()),
            attrs: FileAttrs::empty(),
        };
        let response = self.roundtrip(core, &request, id)?;
        self.expect_ok(core, response, &path)
    }

    fn rmdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        let path = self.absolutize(core, dir);
        let id = self.take_id();
        log::debug!("{id}: Remove directory {path}");
        let request = RmdirRequest {
            id,
            path: WireString::from(path.as_str()),
        };
        let response = self.roundtrip(core, &request, id)?;
        self.expect_ok(core, response, &path)
    }

    fn remove_file(&mut self, core: &mut RequestCore, name: &str) -> Result<()> {
        let path = self.absolutize(core, name);
        let id = self.take_id();
        log::debug!("{id}: Remove file {path}");
        let request = RemoveRequest {
            id,
            filename: WireString::from(path.as_str()),
        };
        let response = self.roundtrip(core, &request, id)?;
        self.expect_ok(core, response, &path)
    }

    fn rename(&mut self, core: &mut RequestCore, old: &str, new: &str) -> Result<()> {
        let oldpath = self.absolutize(core, old);
        let newpath = self.absolutize(core, new);
        let id = self.take_id();
        log::debug!("{id}: Rename {oldpath} to {newpath}");
        let request = RenameRequest {
            id,
            oldpath: WireString::from(oldpath.as_str()),
            newpath: WireString::from(newpath.as_str()),
        };
        let response = self.roundtrip(core, &request, id)?;
        self.expect_ok(core, response, &oldpath)
    }

    fn chmod(&mut self, core: &mut RequestCore, name: &str, mode: u32) -> Result<()> {
        let path = self.absolutize(core, name);
        let id = self.take_id();
        log::debug!("{id}: Chmod {path} {:o}", mode & 0o7777);
        let request = SetstatRequest {
            id,
            path: WireString::from(path.as_str()),
            attrs: FileAttrs::with_permissions(mode & 0o7777),
        };
        let response = self.roundtrip(core, &request, id)?;
        self.expect_ok(core, response, &path)
    }

    fn set_file_time(&mut self, core: &mut RequestCore, name: &str, mtime: i64) -> Result<()> {
        let path = self.absolutize(core, name);
        let id = self.take_id();
        log::debug!("{id}: Utime {path} {mtime}");
        let request = SetstatRequest {
            id,
            path: WireString::from(path.as_str()),
            attrs: FileAttrs::with_times(mtime as u32, mtime as u32),
        };
        let response = self.roundtrip(core, &request, id)?;
        self.expect_ok(core, response, &path)
    }

    fn file_size(&mut self, core: &mut RequestCore, name: &str) -> Result<i64> {
        let path = self.absolutize(core, name);
        let attrs = self.stat_attrs(core, &path)?;
        Ok(attrs.size.map(|s| s as i64).unwrap_or(-1))
    }

    fn stat(&mut self, core: &mut RequestCore, name: &str) -> Result<FileRecord> {
        let path = self.absolutize(core, name);
        let attrs = self.lstat_attrs(core, &path)?;

        let mut record = FileRecord::new(name);
        record.mode = attrs.permissions.unwrap_or(0);
        record.size = attrs.size.map(|s| s as i64).unwrap_or(-1);
        record.mtime = attrs.times.map(|(_, m)| m as i64).unwrap_or(0);
        if let Some((uid, gid)) = attrs.uid_gid {
            record.user = uid.to_string();
            record.group = gid.to_string();
        }
        Ok(record)
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
