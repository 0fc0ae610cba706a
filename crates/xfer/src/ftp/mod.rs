//! FTP driver (RFC 959).
//!
//! One control connection carries commands and multi-line responses; data
//! flows over per-transfer data connections, passive (`PASV`/`EPSV`) first
//! with an active-mode (`PORT`/`EPRT`) fallback. Transfers switch between
//! ASCII and binary `TYPE` per file based on the extension rules, resume
//! with `REST`, and abort with `ABOR`.

mod ascii;
pub mod parse;
pub mod proxy_script;

use std::net::{SocketAddr, TcpListener, TcpStream};

use xfer_transport::{accept_with_timeout, connect_to, Channel, LineReader, SocketChannel};

use crate::cache::{EntryWriter, ReplayChannel};
use crate::file::FileRecord;
use crate::listing::{parse_ls, decode_listing, ExtraLines, ServerType};
use crate::options::Value;
use crate::request::{Capabilities, Driver, Protocol, Request, RequestCore};
use crate::{Error, Result};

use ascii::{AsciiDecoder, AsciiEncoder};

pub struct FtpDriver {
    control: Option<SocketChannel>,
    control_rbuf: LineReader,
    data: Option<SocketChannel>,
    data_rbuf: LineReader,
    /// Active-mode listener, pending accept after the data command.
    listener: Option<TcpListener>,
    /// Cached listing being replayed instead of a data connection.
    replay: Option<ReplayChannel>,
    cache_writer: Option<EntryWriter>,

    /// Mode currently in effect on the server (`TYPE A` vs `TYPE I`).
    is_ascii: bool,
    /// The transfer being streamed right now is ASCII.
    ascii_transfer: bool,
    decoder: AsciiDecoder,
    encoder: AsciiEncoder,
    scratch: Vec<u8>,
}

impl FtpDriver {
    pub fn new() -> Self {
        Self {
            control: None,
            control_rbuf: LineReader::default(),
            data: None,
            data_rbuf: LineReader::default(),
            listener: None,
            replay: None,
            cache_writer: None,
            is_ascii: false,
            ascii_transfer: false,
            decoder: AsciiDecoder::new(),
            encoder: AsciiEncoder::new(),
            scratch: Vec::new(),
        }
    }

    fn drop_connections(&mut self, core: &mut RequestCore) {
        if self.control.take().is_some() {
            log::info!("Disconnecting from site {}", core.hostname);
        }
        self.data = None;
        self.listener = None;
        self.replay = None;
        self.cache_writer = None;
        self.control_rbuf = LineReader::default();
        core.cached = false;
    }

    fn close_data(&mut self) {
        self.data = None;
        self.listener = None;
    }

    /// Reads one logical response. Continuation lines accumulate until a
    /// line starts with the response code followed by a space; only the
    /// final line is retained. A 42x response tears the connection down.
    fn read_response(&mut self, core: &mut RequestCore) -> Result<char> {
        let mut code: Option<[u8; 3]> = None;
        let last;

        loop {
            let chan = self.control.as_mut().ok_or(Error::NotConnected)?;
            let line = match self.control_rbuf.read_line(chan) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.drop_connections(core);
                    return Err(Error::ConnectionLost);
                }
                Err(e) => {
                    self.drop_connections(core);
                    return Err(e.into());
                }
            };

            let text = String::from_utf8_lossy(&line).into_owned();
            log::debug!("{text}");

            let b = text.as_bytes();
            if b.len() >= 3 && b[..3].iter().all(u8::is_ascii_digit) {
                code = Some([b[0], b[1], b[2]]);
            }

            if let Some(code) = code {
                let b = text.as_bytes();
                if b.len() >= 4 && b[..3] == code && b[3] == b' ' {
                    last = text;
                    break;
                }
                if b.len() == 3 && b[..3] == code {
                    last = text;
                    break;
                }
            }
        }

        core.last_response = last;
        if core.last_response.starts_with("42") {
            self.drop_connections(core);
        }
        Ok(core.last_response.as_bytes()[0] as char)
    }

    /// Sends one command line and reads its response. `PASS` and `ACCT`
    /// arguments are redacted from the log.
    fn send_command(&mut self, core: &mut RequestCore, command: &str) -> Result<char> {
        let display = command.trim_end();
        if let Some(verb) = display.get(..4).filter(|v| *v == "PASS" || *v == "ACCT") {
            log::debug!("{verb} xxxx");
        } else {
            log::debug!("{display}");
        }

        let chan = self.control.as_mut().ok_or(Error::NotConnected)?;
        if let Err(e) = chan.write_all(command.as_bytes()) {
            self.drop_connections(core);
            return Err(e.into());
        }
        self.read_response(core)
    }

    /// Sends a command without waiting for its response. The FXP path uses
    /// this to start both halves before reading either acknowledgement.
    fn send_command_no_reply(&mut self, core: &mut RequestCore, command: &str) -> Result<()> {
        log::debug!("{}", command.trim_end());
        let chan = self.control.as_mut().ok_or(Error::NotConnected)?;
        if let Err(e) = chan.write_all(command.as_bytes()) {
            self.drop_connections(core);
            return Err(e.into());
        }
        Ok(())
    }

    fn login(&mut self, core: &mut RequestCore) -> Result<()> {
        let mut resp;
        if core.use_proxy {
            let proxy_config = core.opt_text("proxy_config");
            let Some(template) = proxy_script::template_for(&proxy_config) else {
                return Err(Error::Protocol(
                    "proxy configured but proxy_config is empty".to_string(),
                ));
            };
            let template = template.to_string();
            resp = '3';
            for command in proxy_script::expand(&template, core) {
                if resp != '2' && resp != '3' {
                    break;
                }
                resp = self.send_command(core, &format!("{command}\r\n"))?;
            }
        } else {
            let username = core.username.clone();
            resp = self.send_command(core, &format!("USER {username}\r\n"))?;
            if resp == '3' {
                let password = core.password.clone();
                resp = self.send_command(core, &format!("PASS {password}\r\n"))?;
            }
            if resp == '3' && !core.account.is_empty() {
                let account = core.account.clone();
                resp = self.send_command(core, &format!("ACCT {account}\r\n"))?;
            }
        }

        if resp != '2' {
            let last = core.last_response.clone();
            self.drop_connections(core);
            return Err(Error::ServerResponse(last));
        }
        Ok(())
    }

    fn syst(&mut self, core: &mut RequestCore) -> Result<()> {
        if self.send_command(core, "SYST\r\n")? == '2' {
            core.server_type = ServerType::from_syst(&core.last_response);
        }
        Ok(())
    }

    fn getcwd(&mut self, core: &mut RequestCore) -> Result<()> {
        if self.send_command(core, "PWD\r\n")? == '2' {
            if let Some(dir) = parse::parse_pwd_response(&core.last_response) {
                core.directory = dir;
            }
        }
        Ok(())
    }

    /// Picks ASCII or binary for this file and issues `TYPE` only when the
    /// decision changed since the last transfer.
    fn set_data_type(&mut self, core: &mut RequestCore, filename: &str) -> Result<()> {
        let new_ascii = core
            .context()
            .ascii_by_extension(filename)
            .unwrap_or_else(|| core.opt_bool("ascii_transfers"));

        if self.control.is_some() && new_ascii != self.is_ascii {
            let command = if new_ascii { "TYPE A\r\n" } else { "TYPE I\r\n" };
            self.send_command(core, command)?;
            self.is_ascii = new_ascii;
        }

        self.ascii_transfer = new_ascii;
        self.decoder = AsciiDecoder::new();
        self.encoder = AsciiEncoder::new();
        Ok(())
    }

    fn new_data_connection(&mut self, core: &mut RequestCore) -> Result<()> {
        if self.data.is_some() || self.listener.is_some() {
            return Ok(());
        }
        let local = self
            .control
            .as_ref()
            .ok_or(Error::NotConnected)?
            .stream()
            .local_addr()
            .map_err(Error::Io)?;

        if core.opt_bool("passive_transfer") {
            match self.passive_data_connection(core, local) {
                Ok(()) => return Ok(()),
                // A refused PASV/EPSV falls back to active mode on the
                // same connection; anything else propagates.
                Err(Error::Transient(_)) if self.control.is_some() => (),
                Err(e) => return Err(e),
            }
        }
        self.active_data_connection(core, local)
    }

    fn passive_data_connection(
        &mut self,
        core: &mut RequestCore,
        local: SocketAddr,
    ) -> Result<()> {
        let (host, port) = if local.is_ipv4() {
            if self.send_command(core, "PASV\r\n")? != '2' {
                core.set_option("passive_transfer", Value::Bool(false));
                return Err(Error::Transient(core.last_response.clone()));
            }
            let (ip, port) = parse::parse_pasv_response(&core.last_response).ok_or_else(|| {
                let last = core.last_response.clone();
                self.drop_connections(core);
                Error::Protocol(format!("cannot find an IP address in PASV response '{last}'"))
            })?;
            (std::net::IpAddr::V4(ip), port)
        } else {
            if self.send_command(core, "EPSV\r\n")? != '2' {
                core.set_option("passive_transfer", Value::Bool(false));
                return Err(Error::Transient(core.last_response.clone()));
            }
            let port = parse::parse_epsv_response(&core.last_response).ok_or_else(|| {
                let last = core.last_response.clone();
                self.drop_connections(core);
                Error::Protocol(format!("invalid EPSV response '{last}'"))
            })?;
            let peer = self
                .control
                .as_ref()
                .ok_or(Error::NotConnected)?
                .stream()
                .peer_addr()
                .map_err(Error::Io)?;
            (peer.ip(), port)
        };

        let addr = SocketAddr::new(host, port);
        let stream = TcpStream::connect_timeout(&addr, core.timeout()).map_err(|e| {
            log::error!("Cannot create a data connection: {e}");
            self.drop_connections(core);
            Error::Transport(xfer_transport::TransportError::Connect {
                host: addr.to_string(),
                source: e,
            })
        })?;

        self.data = Some(SocketChannel::new(
            stream,
            addr.to_string(),
            core.timeout(),
            core.cancel.clone(),
        )?);
        self.data_rbuf = LineReader::default();
        Ok(())
    }

    fn active_data_connection(
        &mut self,
        core: &mut RequestCore,
        local: SocketAddr,
    ) -> Result<()> {
        let listener = TcpListener::bind(SocketAddr::new(local.ip(), 0)).map_err(|e| {
            log::error!("Cannot bind a port: {e}");
            Error::Io(e)
        })?;
        let bound = listener.local_addr().map_err(Error::Io)?;

        let command = match bound {
            SocketAddr::V4(v4) => {
                let ip = v4.ip().octets();
                let port = v4.port().to_be_bytes();
                format!(
                    "PORT {},{},{},{},{},{}\r\n",
                    ip[0], ip[1], ip[2], ip[3], port[0], port[1]
                )
            }
            SocketAddr::V6(v6) => {
                format!("EPRT |2|{}|{}|\r\n", v6.ip(), v6.port())
            }
        };

        if self.send_command(core, &command)? != '2' {
            let last = core.last_response.clone();
            self.drop_connections(core);
            return Err(Error::Transient(last));
        }

        self.listener = Some(listener);
        self.data_rbuf = LineReader::default();
        Ok(())
    }

    /// Active mode: the server connects back to us after the data command.
    fn accept_if_active(&mut self, core: &mut RequestCore) -> Result<()> {
        if let Some(listener) = self.listener.take() {
            match accept_with_timeout(&listener, core.timeout(), &core.cancel) {
                Ok(stream) => {
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| core.hostname.clone());
                    self.data = Some(SocketChannel::new(
                        stream,
                        peer,
                        core.timeout(),
                        core.cancel.clone(),
                    )?);
                }
                Err(e) => {
                    log::error!("Cannot accept connection from server: {e}");
                    self.drop_connections(core);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Maps a failed transfer-command response to an error kind.
    fn classify_failure(&self, core: &RequestCore, what: &str) -> Error {
        let last = &core.last_response;
        if last.starts_with("550") {
            Error::NotFound(what.to_string())
        } else if last.starts_with("553") || last.starts_with("532") {
            Error::PermissionDenied(what.to_string())
        } else if last.starts_with('5') {
            Error::RemoteFailure(last.clone())
        } else {
            Error::Transient(last.clone())
        }
    }
}

impl Default for FtpDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Line source for listings: the data connection or a cache replay, with
/// write-through to a fresh cache entry. Also feeds the VMS parser its
/// continuation lines.
struct FtpLineSource<'a> {
    rbuf: &'a mut LineReader,
    wire: Option<&'a mut SocketChannel>,
    replay: Option<&'a mut ReplayChannel>,
    writer: Option<&'a mut EntryWriter>,
    charsets: &'a str,
}

impl FtpLineSource<'_> {
    fn next_line(&mut self) -> Result<Option<String>> {
        let line = if let Some(replay) = self.replay.as_deref_mut() {
            self.rbuf.read_line(replay)?
        } else if let Some(wire) = self.wire.as_deref_mut() {
            self.rbuf.read_line(wire)?
        } else {
            return Err(Error::NotConnected);
        };

        let Some(line) = line else {
            return Ok(None);
        };

        if let Some(writer) = self.writer.as_deref_mut() {
            writer
                .write_line(&line)
                .map_err(|e| Error::Protocol(format!("cannot write cache entry: {e}")))?;
        }

        Ok(Some(decode_listing(&line, self.charsets)))
    }
}

impl ExtraLines for FtpLineSource<'_> {
    fn next_extra_line(&mut self) -> Result<Option<String>> {
        self.next_line()
    }
}

impl Driver for FtpDriver {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            listing: true,
            download: true,
            upload: true,
            mutate: true,
            metadata: false,
            raw_commands: true,
        }
    }

    fn connect(&mut self, core: &mut RequestCore) -> Result<()> {
        if self.control.is_some() {
            return Ok(());
        }

        if core.username.is_empty() || core.username.eq_ignore_ascii_case("anonymous") {
            core.username = "anonymous".to_string();
            core.password = core.opt_text("email");
        }

        let proxy_host = core.opt_text("ftp_proxy_host");
        let proxy_port = core.opt_int("ftp_proxy_port") as u16;
        core.decide_proxy(&proxy_host);

        let (host, port) = if core.use_proxy {
            (proxy_host, proxy_port)
        } else {
            (core.hostname.clone(), core.port_or_default())
        };

        let (stream, addr) = connect_to(&host, port, core.timeout(), core.opt_bool("enable_ipv6"))?;
        core.resolved_addr = Some(addr);
        self.control = Some(SocketChannel::new(
            stream,
            format!("{host}:{port}"),
            core.timeout(),
            core.cancel.clone(),
        )?);
        self.control_rbuf = LineReader::default();

        // Greeting.
        if self.read_response(core)? != '2' {
            let last = core.last_response.clone();
            self.drop_connections(core);
            return Err(Error::ServerResponse(last));
        }

        self.login(core)?;
        self.syst(core)?;

        let ascii = core.opt_bool("ascii_transfers");
        let type_cmd = if ascii { "TYPE A\r\n" } else { "TYPE I\r\n" };
        self.send_command(core, type_cmd)?;
        self.is_ascii = ascii;

        if core.directory.is_empty() {
            self.getcwd(core)?;
        } else {
            let directory = core.directory.clone();
            self.chdir(core, &directory)?;
        }

        if self.control.is_none() {
            return Err(Error::ConnectionLost);
        }
        log::info!("Connected to {}", core.hostname);
        Ok(())
    }

    fn disconnect(&mut self, core: &mut RequestCore) {
        self.drop_connections(core);
    }

    fn is_connected(&self) -> bool {
        self.control.is_some()
    }

    fn list_files(&mut self, core: &mut RequestCore) -> Result<()> {
        self.replay = None;
        self.cache_writer = None;
        core.cached = false;

        let use_cache = core.opt_bool("use_cache");
        let key = core.cache_key();
        if use_cache {
            let ctx = core.context().clone();
            if let Some(entry) = ctx.cache().open(&key) {
                self.replay = Some(ReplayChannel(entry));
                self.data_rbuf = LineReader::default();
                core.cached = true;
                return Ok(());
            }
        }

        self.new_data_connection(core)?;

        let mut flags = String::new();
        if core.opt_bool("show_hidden_files") {
            flags.push('a');
        }
        if core.opt_bool("resolve_symlinks") {
            flags.push('L');
        }
        let command = if flags.is_empty() {
            "LIST\r\n".to_string()
        } else {
            format!("LIST -{flags}\r\n")
        };

        if self.send_command(core, &command)? != '1' {
            self.close_data();
            return Err(Error::Transient(core.last_response.clone()));
        }
        self.accept_if_active(core)?;
        self.data_rbuf = LineReader::default();

        if use_cache {
            let ctx = core.context().clone();
            self.cache_writer = ctx.cache().create(&key);
        }
        log::info!("Retrieving directory listing...");
        Ok(())
    }

    fn next_file(&mut self, core: &mut RequestCore) -> Result<Option<FileRecord>> {
        let charsets = core.opt_text("remote_charsets");
        let mut source = FtpLineSource {
            rbuf: &mut self.data_rbuf,
            wire: self.data.as_mut(),
            replay: self.replay.as_mut(),
            writer: self.cache_writer.as_mut(),
            charsets: &charsets,
        };

        loop {
            let Some(line) = source.next_line()? else {
                return Ok(None);
            };

            match parse_ls(&line, core.server_type, &mut source) {
                Ok(record) => return Ok(Some(record)),
                Err(_) => {
                    if !line.starts_with("total") {
                        log::warn!("Warning: Cannot parse listing {line}");
                    }
                }
            }
        }
    }

    fn get_file(&mut self, core: &mut RequestCore, name: &str, start: u64) -> Result<i64> {
        self.set_data_type(core, name)?;
        self.new_data_connection(core)?;

        if start > 0 {
            if self.send_command(core, &format!("REST {start}\r\n"))? != '3' {
                self.close_data();
                return Err(Error::Transient(core.last_response.clone()));
            }
        }

        if self.send_command(core, &format!("RETR {name}\r\n"))? != '1' {
            self.close_data();
            return Err(self.classify_failure(core, name));
        }
        self.accept_if_active(core)?;

        Ok(match parse::parse_transfer_size(&core.last_response) {
            Some(size) => size + start as i64,
            None => -1,
        })
    }

    fn put_file(
        &mut self,
        core: &mut RequestCore,
        name: &str,
        start: u64,
        _total: i64,
    ) -> Result<()> {
        self.set_data_type(core, name)?;
        self.new_data_connection(core)?;

        if start > 0 {
            if self.send_command(core, &format!("REST {start}\r\n"))? != '3' {
                self.close_data();
                return Err(Error::Transient(core.last_response.clone()));
            }
        }

        if self.send_command(core, &format!("STOR {name}\r\n"))? != '1' {
            self.close_data();
            return Err(self.classify_failure(core, name));
        }
        self.accept_if_active(core)
    }

    fn read_chunk(&mut self, core: &mut RequestCore, buf: &mut [u8]) -> Result<usize> {
        loop {
            // Translated bytes left over from a previous undersized read.
            if !self.scratch.is_empty() {
                let n = self.scratch.len().min(buf.len());
                buf[..n].copy_from_slice(&self.scratch[..n]);
                self.scratch.drain(..n);
                return Ok(n);
            }

            let chan = self.data.as_mut().ok_or(Error::NotConnected)?;

            if !self.ascii_transfer {
                match chan.read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) => {
                        self.drop_connections(core);
                        return Err(e.into());
                    }
                }
            }

            // ASCII: read raw, strip CR-before-LF, deliver on the next
            // loop pass.
            let mut raw = vec![0u8; buf.len()];
            let n = match chan.read(&mut raw) {
                Ok(n) => n,
                Err(e) => {
                    self.drop_connections(core);
                    return Err(e.into());
                }
            };

            if n == 0 {
                self.decoder.finish(&mut self.scratch);
                if self.scratch.is_empty() {
                    return Ok(0);
                }
            } else {
                self.decoder.decode(&raw[..n], &mut self.scratch);
                // An all-CR chunk can translate to nothing; read again.
            }
        }
    }

    fn write_chunk(&mut self, core: &mut RequestCore, buf: &[u8]) -> Result<usize> {
        let ascii = self.ascii_transfer;
        if ascii {
            let mut encoded = Vec::with_capacity(buf.len() * 2);
            self.encoder.encode(buf, &mut encoded);
            let chan = self.data.as_mut().ok_or(Error::NotConnected)?;
            if let Err(e) = chan.write_all(&encoded) {
                self.drop_connections(core);
                return Err(e.into());
            }
        } else {
            let chan = self.data.as_mut().ok_or(Error::NotConnected)?;
            if let Err(e) = chan.write_all(buf) {
                self.drop_connections(core);
                return Err(e.into());
            }
        }
        Ok(buf.len())
    }

    fn end_transfer(&mut self, core: &mut RequestCore) -> Result<()> {
        self.close_data();

        let was_replay = self.replay.take().is_some();
        if let Some(writer) = self.cache_writer.take() {
            writer
                .commit()
                .map_err(|e| Error::Protocol(format!("cannot write cache entry: {e}")))?;
        }

        if was_replay {
            core.cached = false;
            return Ok(());
        }

        match self.read_response(core)? {
            '2' => Ok(()),
            _ => Err(Error::Transient(core.last_response.clone())),
        }
    }

    fn abort_transfer(&mut self, core: &mut RequestCore) -> Result<()> {
        self.close_data();
        self.replay = None;
        self.cache_writer = None;
        core.cached = false;

        if self.control.is_none() {
            return Ok(());
        }

        // Two acknowledgements follow: one for the aborted transfer, one
        // for the ABOR itself.
        self.send_command(core, "ABOR\r\n")?;
        if self.control.is_some() && self.read_response(core).is_err() {
            self.drop_connections(core);
        }
        Ok(())
    }

    fn chdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        if self.send_command(core, &format!("CWD {dir}\r\n"))? != '2' {
            return Err(self.classify_failure(core, dir));
        }
        core.directory = dir.to_string();
        Ok(())
    }

    fn mkdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        if self.send_command(core, &format!("MKD {dir}\r\n"))? != '2' {
            return Err(self.classify_failure(core, dir));
        }
        Ok(())
    }

    fn rmdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        if self.send_command(core, &format!("RMD {dir}\r\n"))? != '2' {
            return Err(self.classify_failure(core, dir));
        }
        Ok(())
    }

    fn remove_file(&mut self, core: &mut RequestCore, name: &str) -> Result<()> {
        if self.send_command(core, &format!("DELE {name}\r\n"))? != '2' {
            return Err(self.classify_failure(core, name));
        }
        Ok(())
    }

    fn rename(&mut self, core: &mut RequestCore, old: &str, new: &str) -> Result<()> {
        if self.send_command(core, &format!("RNFR {old}\r\n"))? != '3' {
            return Err(self.classify_failure(core, old));
        }
        if self.send_command(core, &format!("RNTO {new}\r\n"))? != '2' {
            return Err(self.classify_failure(core, new));
        }
        Ok(())
    }

    fn chmod(&mut self, core: &mut RequestCore, name: &str, mode: u32) -> Result<()> {
        let command = format!("SITE CHMOD {:o} {}\r\n", mode & 0o7777, name);
        if self.send_command(core, &command)? != '2' {
            return Err(self.classify_failure(core, name));
        }
        Ok(())
    }

    fn site(&mut self, core: &mut RequestCore, command: &str) -> Result<String> {
        if self.send_command(core, &format!("SITE {command}\r\n"))? != '2' {
            return Err(self.classify_failure(core, command));
        }
        Ok(core.last_response.clone())
    }

    fn file_size(&mut self, core: &mut RequestCore, name: &str) -> Result<i64> {
        if self.send_command(core, &format!("SIZE {name}\r\n"))? != '2' {
            return Err(self.classify_failure(core, name));
        }
        parse::parse_size_response(&core.last_response)
            .ok_or_else(|| Error::Protocol(core.last_response.clone()))
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Third-party ("FXP") transfer: the source server sends straight to the
/// destination server. `PASV` on the source yields the address tuple, a
/// `PORT` with the same tuple points the destination at it, then `RETR` and
/// `STOR` run concurrently. Both control connections still owe a completion
/// response, which `end_transfer` collects.
pub fn transfer_between(
    from: &mut Request,
    to: &mut Request,
    from_file: &str,
    to_file: &str,
) -> Result<()> {
    let Request {
        core: from_core,
        driver: from_driver,
    } = from;
    let Request {
        core: to_core,
        driver: to_driver,
    } = to;

    let from_driver = from_driver
        .as_any_mut()
        .downcast_mut::<FtpDriver>()
        .ok_or(Error::Unsupported("fxp"))?;
    let to_driver = to_driver
        .as_any_mut()
        .downcast_mut::<FtpDriver>()
        .ok_or(Error::Unsupported("fxp"))?;

    if from_driver.send_command(from_core, "PASV\r\n")? != '2' {
        return Err(Error::Transient(from_core.last_response.clone()));
    }
    let tuple = parse::pasv_tuple(&from_core.last_response)
        .ok_or_else(|| {
            Error::Protocol(format!(
                "cannot find an IP address in PASV response '{}'",
                from_core.last_response
            ))
        })?
        .to_string();

    if to_driver.send_command(to_core, &format!("PORT {tuple}\r\n"))? != '2' {
        return Err(Error::Transient(to_core.last_response.clone()));
    }

    from_driver.send_command_no_reply(from_core, &format!("RETR {from_file}\r\n"))?;
    to_driver.send_command_no_reply(to_core, &format!("STOR {to_file}\r\n"))?;

    if from_driver.read_response(from_core)? != '1' {
        return Err(from_driver.classify_failure(from_core, from_file));
    }
    if to_driver.read_response(to_core)? != '1' {
        return Err(to_driver.classify_failure(to_core, to_file));
    }
    Ok(())
}

/// True when both endpoints can run a third-party transfer.
pub fn supports_fxp(from: &Request, to: &Request) -> bool {
    from.protocol() == Protocol::Ftp && to.protocol() == Protocol::Ftp
}
