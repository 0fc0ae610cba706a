//! HTTP/1.x driver: downloads and directory browsing.
//!
//! Each operation runs on a fresh connection (`always_connected` in the
//! request model). Requests are composed with the full URL form so the same
//! request line works through a proxy; responses are consumed header by
//! header, then the body streams either by `Content-Length` or through the
//! chunked decoder. Directory listings come from HTML index pages.
//!
//! HTTP endpoints are read-only: no upload, no mutation operations.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use memchr::memchr;
use xfer_transport::{connect_to, Channel, LineReader, SocketChannel};

use crate::cache::{EntryWriter, ReplayChannel};
use crate::file::FileRecord;
use crate::listing::parse_html_line;
use crate::request::{Capabilities, Driver, Protocol, RequestCore};
use crate::{Error, Result};

const USER_AGENT: &str = concat!("xfer/", env!("CARGO_PKG_VERSION"));

pub struct HttpDriver {
    conn: Option<SocketChannel>,
    rbuf: LineReader,

    /// Body framing state for the current response.
    content_length: i64,
    read_bytes: i64,
    chunked: bool,
    chunk_remaining: i64,
    first_chunk: bool,
    body_done: bool,
    /// Wire bytes the header reader over-read, not yet handed to the body.
    pushback: Vec<u8>,
    /// Pending bytes while assembling listing lines from the body.
    line_buf: Vec<u8>,

    replay: Option<ReplayChannel>,
    replay_rbuf: LineReader,
    cache_writer: Option<EntryWriter>,
}

impl HttpDriver {
    pub fn new() -> Self {
        Self {
            conn: None,
            rbuf: LineReader::default(),
            content_length: 0,
            read_bytes: 0,
            chunked: false,
            chunk_remaining: 0,
            first_chunk: true,
            body_done: false,
            pushback: Vec::new(),
            line_buf: Vec::new(),
            replay: None,
            replay_rbuf: LineReader::default(),
            cache_writer: None,
        }
    }

    fn reset_body_state(&mut self) {
        self.content_length = 0;
        self.read_bytes = 0;
        self.chunked = false;
        self.chunk_remaining = 0;
        self.first_chunk = true;
        self.body_done = false;
        self.pushback.clear();
        self.line_buf.clear();
    }

    fn ensure_conn(&mut self, core: &mut RequestCore) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let proxy_host = core.opt_text("http_proxy_host");
        let proxy_port = core.opt_int("http_proxy_port") as u16;
        core.decide_proxy(&proxy_host);

        let (host, port) = if core.use_proxy {
            (proxy_host, proxy_port)
        } else {
            (core.hostname.clone(), core.port_or_default())
        };

        let (stream, addr) = connect_to(&host, port, core.timeout(), core.opt_bool("enable_ipv6"))?;
        core.resolved_addr = Some(addr);
        self.conn = Some(SocketChannel::new(
            stream,
            format!("{host}:{port}"),
            core.timeout(),
            core.cancel.clone(),
        )?);
        self.rbuf = LineReader::default();
        Ok(())
    }

    /// Builds and sends a request, then consumes the response headers.
    /// Returns the status code.
    fn send_request(
        &mut self,
        core: &mut RequestCore,
        verb: &str,
        path: &str,
        range_start: u64,
    ) -> Result<u16> {
        self.ensure_conn(core)?;
        self.reset_body_state();

        let use_http11 = core.opt_bool("use_http11");
        let version = if use_http11 { "HTTP/1.1" } else { "HTTP/1.0" };

        let target = compose_target(core, path);
        let mut request = format!("{verb} {target} {version}\r\n");
        request.push_str(&format!("User-Agent: {USER_AGENT}\r\n"));
        request.push_str(&format!("Host: {}\r\n", core.hostname));
        request.push_str("Connection: close\r\n");

        log::debug!("{verb} {target} {version}");

        if core.use_proxy {
            let proxy_user = core.opt_text("http_proxy_username");
            if !proxy_user.is_empty() {
                let raw = format!("{proxy_user}:{}", core.opt_text("http_proxy_password"));
                request.push_str(&format!(
                    "Proxy-Authorization: Basic {}\r\n",
                    BASE64.encode(raw.as_bytes())
                ));
                log::debug!("Proxy-Authorization: Basic xxxx");
            }
        }

        if !core.username.is_empty() {
            let raw = format!("{}:{}", core.username, core.password);
            request.push_str(&format!(
                "Authorization: Basic {}\r\n",
                BASE64.encode(raw.as_bytes())
            ));
            log::debug!("Authorization: Basic xxxx");
        }

        if range_start > 0 && use_http11 {
            log::info!("Starting the file transfer at offset {range_start}");
            request.push_str(&format!("Range: bytes={range_start}-\r\n"));
        }

        request.push_str("\r\n");

        let chan = self.conn.as_mut().ok_or(Error::NotConnected)?;
        if let Err(e) = chan.write_all(request.as_bytes()) {
            self.conn = None;
            return Err(e.into());
        }

        self.read_response(core)
    }

    /// Reads the status line and headers, capturing `Content-Length` and
    /// `Transfer-Encoding: chunked`.
    fn read_response(&mut self, core: &mut RequestCore) -> Result<u16> {
        let mut status_code = None;

        loop {
            let chan = self.conn.as_mut().ok_or(Error::NotConnected)?;
            let line = match self.rbuf.read_line(chan) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.conn = None;
                    return Err(Error::ConnectionLost);
                }
                Err(e) => {
                    self.conn = None;
                    return Err(e.into());
                }
            };

            let text = String::from_utf8_lossy(&line).into_owned();
            if text.is_empty() {
                break;
            }
            log::debug!("{text}");

            if status_code.is_none() {
                core.last_response = text.clone();
                let code = text
                    .split_whitespace()
                    .nth(1)
                    .and_then(|t| t.parse::<u16>().ok())
                    .ok_or_else(|| Error::Protocol(format!("bad status line: {text}")))?;
                status_code = Some(code);
                continue;
            }

            let lower = text.to_ascii_lowercase();
            if let Some(value) = lower.strip_prefix("content-length:") {
                self.content_length = value.trim().parse().unwrap_or(0);
            } else if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
                self.chunked = true;
            }
        }

        // Whatever the header reader over-read belongs to the body.
        self.pushback = self.rbuf.take_buffered();
        status_code.ok_or(Error::ConnectionLost)
    }

    /// One body read, honoring `Content-Length` or chunked framing. The
    /// line reader's buffered bytes are drained before touching the wire,
    /// so headers and body can share the connection.
    fn body_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.body_done || buf.is_empty() {
            return Ok(0);
        }

        if self.chunked {
            if self.chunk_remaining == 0 {
                self.next_chunk_header()?;
                if self.body_done {
                    return Ok(0);
                }
            }

            let want = (self.chunk_remaining as usize).min(buf.len());
            let n = self.raw_body_read(&mut buf[..want])?;
            if n == 0 {
                self.conn = None;
                return Err(Error::ConnectionLost);
            }
            self.chunk_remaining -= n as i64;
            self.read_bytes += n as i64;
            return Ok(n);
        }

        if self.content_length > 0 {
            if self.read_bytes >= self.content_length {
                self.body_done = true;
                return Ok(0);
            }
            let want = ((self.content_length - self.read_bytes) as usize).min(buf.len());
            let n = self.raw_body_read(&mut buf[..want])?;
            if n == 0 {
                // The peer closed before delivering everything promised.
                self.conn = None;
                return Err(Error::ConnectionLost);
            }
            self.read_bytes += n as i64;
            return Ok(n);
        }

        // No framing: read until EOF.
        let n = self.raw_body_read(buf)?;
        if n == 0 {
            self.body_done = true;
        }
        self.read_bytes += n as i64;
        Ok(n)
    }

    /// Reads `<hex>\r\n`; a zero-size chunk ends the body.
    fn next_chunk_header(&mut self) -> Result<()> {
        if !self.first_chunk {
            // The CRLF closing the previous chunk.
            self.read_body_line()?;
        }
        self.first_chunk = false;

        let line = self
            .read_body_line()?
            .ok_or(Error::ConnectionLost)?;
        let size_text = line.split(';').next().unwrap_or("").trim();
        let size = i64::from_str_radix(size_text, 16).map_err(|_| {
            log::error!("Received wrong response from server, disconnecting");
            self.conn = None;
            Error::Protocol(format!("bad chunk header: {size_text:?}"))
        })?;

        if size == 0 {
            // Trailer section ends with an empty line; best effort.
            let _ = self.read_body_line();
            self.body_done = true;
        } else {
            self.chunk_remaining = size;
        }
        Ok(())
    }

    /// One `\n`-terminated line at the wire level; chunk headers and chunk
    /// trailers are framed this way between the data runs.
    fn read_body_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = memchr(b'\n', &self.pushback) {
                let mut line: Vec<u8> = self.pushback.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            let mut tmp = [0u8; 512];
            let chan = self.conn.as_mut().ok_or(Error::NotConnected)?;
            let n = match chan.read(&mut tmp) {
                Ok(n) => n,
                Err(e) => {
                    self.conn = None;
                    return Err(e.into());
                }
            };
            if n == 0 {
                if self.pushback.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.pushback);
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            self.pushback.extend_from_slice(&tmp[..n]);
        }
    }

    /// Raw body bytes: drain the pushback from header parsing first.
    fn raw_body_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.pushback.is_empty() {
            let n = self.pushback.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pushback[..n]);
            self.pushback.drain(..n);
            return Ok(n);
        }

        let chan = self.conn.as_mut().ok_or(Error::NotConnected)?;
        match chan.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.conn = None;
                Err(e.into())
            }
        }
    }

    /// Assembles listing lines on top of the framed body.
    fn next_listing_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = memchr(b'\n', &self.line_buf) {
                let mut line: Vec<u8> = self.line_buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            let mut tmp = [0u8; 2048];
            let n = self.body_read(&mut tmp)?;
            if n == 0 {
                if self.line_buf.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.line_buf);
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            self.line_buf.extend_from_slice(&tmp[..n]);
        }
    }

    fn classify_status(&self, core: &RequestCore, code: u16, what: &str) -> Error {
        match code {
            404 | 410 => Error::NotFound(what.to_string()),
            401 | 403 => Error::PermissionDenied(what.to_string()),
            500..=599 => Error::Transient(core.last_response.clone()),
            _ => Error::ServerResponse(core.last_response.clone()),
        }
    }
}

impl Default for HttpDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins a relative name onto the working directory.
fn absolutize(core: &RequestCore, name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("{}/{name}", core.directory.trim_end_matches('/'))
    }
}

/// The request target: the absolute URL, proxy-compatible, with double
/// slashes in the path collapsed.
fn compose_target(core: &RequestCore, path: &str) -> String {
    let mut clean = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        clean.push('/');
    }
    let mut last_slash = false;
    for c in path.chars() {
        if c == '/' && last_slash {
            continue;
        }
        last_slash = c == '/';
        clean.push(c);
    }

    if core.username.is_empty() {
        format!("http://{}{}", core.hostname, clean)
    } else {
        format!("http://{}@{}{}", core.username, core.hostname, clean)
    }
}

impl Driver for HttpDriver {
    fn protocol(&self) -> Protocol {
        Protocol::Http
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

    fn connect(&mut self, core: &mut RequestCore) -> Result<()> {
        if core.directory.is_empty() {
            core.directory = "/".to_string();
        }
        self.ensure_conn(core)
    }

    fn disconnect(&mut self, core: &mut RequestCore) {
        if self.conn.take().is_some() {
            log::info!("Disconnecting from site {}", core.hostname);
        }
        self.replay = None;
        self.cache_writer = None;
        core.cached = false;
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn always_connected(&self) -> bool {
        true
    }

    fn list_files(&mut self, core: &mut RequestCore) -> Result<()> {
        self.replay = None;
        self.cache_writer = None;
        core.cached = false;

        if core.directory.is_empty() {
            core.directory = "/".to_string();
        }

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

        let path = format!("{}/", core.directory);
        let code = self.send_request(core, "GET", &path, 0)?;
        if code != 200 {
            return Err(self.classify_status(core, code, &path));
        }

        if use_cache {
            let ctx = core.context().clone();
            self.cache_writer = ctx.cache().create(&key);
        }
        log::info!("Retrieving directory listing...");
        Ok(())
    }

    fn next_file(&mut self, core: &mut RequestCore) -> Result<Option<FileRecord>> {
        loop {
            let line = if self.replay.is_some() {
                let replay = self.replay.as_mut().unwrap();
                self.replay_rbuf
                    .read_line(replay)?
                    .map(|l| String::from_utf8_lossy(&l).into_owned())
            } else {
                self.next_listing_line()?
            };

            let Some(line) = line else {
                return Ok(None);
            };

            if let Some(record) = parse_html_line(&line) {
                if !core.cached {
                    if let Some(writer) = self.cache_writer.as_mut() {
                        writer.write_line(line.as_bytes()).map_err(|e| {
                            Error::Protocol(format!("cannot write cache entry: {e}"))
                        })?;
                    }
                }
                return Ok(Some(record));
            }
        }
    }

    fn get_file(&mut self, core: &mut RequestCore, name: &str, start: u64) -> Result<i64> {
        let path = absolutize(core, name);
        let code = self.send_request(core, "GET", &path, start)?;
        match code {
            206 => Ok(self.content_length + start as i64),
            200 if start > 0 => {
                // The server ignored the Range header; a blind restart
                // would corrupt the destination.
                Err(Error::RemoteFailure(
                    "server does not support resuming".to_string(),
                ))
            }
            200 => Ok(if self.content_length > 0 {
                self.content_length
            } else {
                -1
            }),
            _ => Err(self.classify_status(core, code, name)),
        }
    }

    fn read_chunk(&mut self, _core: &mut RequestCore, buf: &mut [u8]) -> Result<usize> {
        self.body_read(buf)
    }

    fn end_transfer(&mut self, core: &mut RequestCore) -> Result<()> {
        let was_replay = self.replay.take().is_some();
        if let Some(writer) = self.cache_writer.take() {
            writer
                .commit()
                .map_err(|e| Error::Protocol(format!("cannot write cache entry: {e}")))?;
        }
        core.cached = false;

        // One response per connection; the next operation reconnects.
        self.conn = None;
        self.reset_body_state();

        if !was_replay {
            log::info!("Finished retrieving data");
        }
        Ok(())
    }

    fn chdir(&mut self, core: &mut RequestCore, dir: &str) -> Result<()> {
        core.directory = dir.to_string();
        Ok(())
    }

    fn file_size(&mut self, core: &mut RequestCore, name: &str) -> Result<i64> {
        let path = absolutize(core, name);
        let code = self.send_request(core, "HEAD", &path, 0)?;
        let size = self.content_length;
        self.end_transfer(core)?;
        if (200..300).contains(&code) {
            Ok(size)
        } else {
            Err(self.classify_status(core, code, name))
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;

    fn ctx() -> Arc<Context> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(Context::new(dir.path().to_path_buf()))
    }

    fn core_for(addr: std::net::SocketAddr) -> RequestCore {
        let mut core = RequestCore::new(Protocol::Http, ctx());
        core.hostname = "127.0.0.1".to_string();
        core.port = Some(addr.port());
        core
    }

    /// Serves one canned response, capturing the request into the returned
    /// receiver.
    fn one_shot_server(response: &'static str) -> (std::net::SocketAddr, std::sync::mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            tx.send(String::from_utf8_lossy(&request).into_owned())
                .unwrap();
            stream.write_all(response.as_bytes()).unwrap();
        });
        (addr, rx)
    }

    fn read_all(driver: &mut HttpDriver, core: &mut RequestCore) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 7]; // deliberately small to cross chunk edges
        loop {
            let n = driver.read_chunk(core, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn content_length_body() {
        let (addr, rx) = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
        );
        let mut core = core_for(addr);
        let mut driver = HttpDriver::new();

        let size = driver.get_file(&mut core, "/file.txt", 0).unwrap();
        assert_eq!(size, 5);
        assert_eq!(read_all(&mut driver, &mut core), b"hello");

        let request = rx.recv().unwrap();
        assert!(request.starts_with("GET http://127.0.0.1/file.txt HTTP/1.1"));
        assert!(request.contains("Host: 127.0.0.1"));
    }

    #[test]
    fn chunked_body_reassembles() {
        let (addr, _rx) = one_shot_server(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        );
        let mut core = core_for(addr);
        let mut driver = HttpDriver::new();

        let size = driver.get_file(&mut core, "/wiki", 0).unwrap();
        assert_eq!(size, -1);
        assert_eq!(read_all(&mut driver, &mut core), b"Wikipedia");
    }

    #[test]
    fn resume_uses_range_and_206() {
        let (addr, rx) = one_shot_server(
            "HTTP/1.1 206 Partial Content\r\nContent-Length: 10\r\n\r\n0123456789",
        );
        let mut core = core_for(addr);
        let mut driver = HttpDriver::new();

        let size = driver.get_file(&mut core, "/big.iso", 250_000).unwrap();
        assert_eq!(size, 250_010);

        let request = rx.recv().unwrap();
        assert!(request.contains("Range: bytes=250000-"));
    }

    #[test]
    fn missing_file_is_logical() {
        let (addr, _rx) = one_shot_server("HTTP/1.1 404 Not Found\r\n\r\n");
        let mut core = core_for(addr);
        let mut driver = HttpDriver::new();

        match driver.get_file(&mut core, "/ghost", 0) {
            Err(Error::NotFound(name)) => assert_eq!(name, "/ghost"),
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[test]
    fn listing_parses_html_index() {
        let (addr, rx) = one_shot_server(
            "HTTP/1.1 200 OK\r\n\r\n<html>\n<a href=\"src/\">src/</a> 10-Jan-2003 09:14 -\n<a href=\"readme.txt\">readme.txt</a> 10-Jan-2003 09:14 2k\n",
        );
        let mut core = core_for(addr);
        core.directory = "/pub".to_string();
        core.set_option("use_cache", crate::options::Value::Bool(false));

        let mut driver = HttpDriver::new();
        driver.list_files(&mut core).unwrap();
        let first = driver.next_file(&mut core).unwrap().unwrap();
        let second = driver.next_file(&mut core).unwrap().unwrap();
        assert!(driver.next_file(&mut core).unwrap().is_none());
        driver.end_transfer(&mut core).unwrap();

        assert_eq!(first.name, "src");
        assert!(first.is_dir());
        assert_eq!(second.name, "readme.txt");
        assert_eq!(second.size, 2048);

        let request = rx.recv().unwrap();
        assert!(request.starts_with("GET http://127.0.0.1/pub/ HTTP/1.1"));
    }

    #[test]
    fn double_slashes_collapse() {
        let core = {
            let mut c = RequestCore::new(Protocol::Http, ctx());
            c.hostname = "h".into();
            c
        };
        assert_eq!(compose_target(&core, "//pub//files"), "http://h/pub/files");
    }

    #[test]
    fn credentials_go_out_as_basic_auth() {
        let (addr, rx) = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
        );
        let mut core = core_for(addr);
        core.username = "alice".to_string();
        core.password = "secret".to_string();

        let mut driver = HttpDriver::new();
        driver.get_file(&mut core, "/private.txt", 0).unwrap();

        let request = rx.recv().unwrap();
        // "alice:secret", standard alphabet.
        assert!(request.contains("Authorization: Basic YWxpY2U6c2VjcmV0"));
    }
}
