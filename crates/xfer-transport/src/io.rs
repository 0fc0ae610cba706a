//! Blocking byte channels with timeout and cancellation.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::cancel::CancelFlag;
use crate::error::TransportError;
use crate::Result;

/// A blocking byte channel.
///
/// Reads block for at most the configured network timeout; writes loop until
/// the whole buffer has been written. Both directions check the cancel flag
/// around every blocking call and fail with [`TransportError::Cancelled`]
/// once it is set.
pub trait Channel {
    /// Reads up to `buf.len()` bytes. Returns 0 at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes the entire buffer.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Reads exactly `buf.len()` bytes, failing with
    /// [`TransportError::Closed`] if the stream ends first.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            filled += n;
        }
        Ok(())
    }
}

impl Channel for Box<dyn Channel> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_all(buf)
    }
}

/// TCP stream wrapper enforcing the timeout/cancellation contract.
#[derive(Debug)]
pub struct SocketChannel {
    stream: TcpStream,
    peer: String,
    cancel: CancelFlag,
}

impl SocketChannel {
    /// Wraps a connected stream. `peer` only feeds log and error messages.
    pub fn new(
        stream: TcpStream,
        peer: impl Into<String>,
        timeout: Duration,
        cancel: CancelFlag,
    ) -> Result<Self> {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(Self {
            stream,
            peer: peer.into(),
            cancel,
        })
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_set() {
            return Err(TransportError::Cancelled);
        }
        Ok(())
    }

    fn timed_out(&self) -> TransportError {
        if self.cancel.is_set() {
            return TransportError::Cancelled;
        }
        log::error!("connection to {} timed out", self.peer);
        TransportError::Timeout(self.peer.clone())
    }
}

impl Channel for SocketChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            self.check_cancel()?;
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) => match e.kind() {
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                        return Err(self.timed_out())
                    }
                    std::io::ErrorKind::Interrupted => continue,
                    _ => return Err(e.into()),
                },
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            self.check_cancel()?;
            match self.stream.write(&buf[written..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => written += n,
                Err(e) => match e.kind() {
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                        return Err(self.timed_out())
                    }
                    std::io::ErrorKind::Interrupted => continue,
                    _ => return Err(e.into()),
                },
            }
        }
        Ok(())
    }
}

/// Half-duplex pipe pair to a child process, with poll-based timeouts.
///
/// `std` cannot put a read timeout on a pipe, so each call waits for
/// readiness with `poll(2)` first.
#[cfg(unix)]
#[derive(Debug)]
pub struct PipeChannel<R, W> {
    reader: R,
    writer: W,
    peer: String,
    timeout: Duration,
    cancel: CancelFlag,
}

#[cfg(unix)]
impl<R, W> PipeChannel<R, W>
where
    R: Read + std::os::fd::AsFd,
    W: Write + std::os::fd::AsFd,
{
    pub fn new(
        reader: R,
        writer: W,
        peer: impl Into<String>,
        timeout: Duration,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            reader,
            writer,
            peer: peer.into(),
            timeout,
            cancel,
        }
    }

    fn wait(&self, fd: std::os::fd::BorrowedFd<'_>, flags: nix::poll::PollFlags) -> Result<()> {
        use nix::poll::{poll, PollFd, PollTimeout};

        let timeout = PollTimeout::try_from(self.timeout).unwrap_or(PollTimeout::MAX);
        loop {
            if self.cancel.is_set() {
                return Err(TransportError::Cancelled);
            }
            let mut fds = [PollFd::new(fd, flags)];
            match poll(&mut fds, timeout) {
                Ok(0) => {
                    if self.cancel.is_set() {
                        return Err(TransportError::Cancelled);
                    }
                    log::error!("connection to {} timed out", self.peer);
                    return Err(TransportError::Timeout(self.peer.clone()));
                }
                Ok(_) => return Ok(()),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(std::io::Error::from(e).into()),
            }
        }
    }
}

#[cfg(unix)]
impl<R, W> Channel for PipeChannel<R, W>
where
    R: Read + std::os::fd::AsFd,
    W: Write + std::os::fd::AsFd,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        use nix::poll::PollFlags;

        loop {
            self.wait(self.reader.as_fd(), PollFlags::POLLIN)?;
            match self.reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        use nix::poll::PollFlags;

        let mut written = 0;
        while written < buf.len() {
            self.wait(self.writer.as_fd(), PollFlags::POLLOUT)?;
            match self.writer.write(&buf[written..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (server, client.join().unwrap())
    }

    #[test]
    fn read_returns_written_bytes() {
        let (server, client) = pair();
        let mut chan = SocketChannel::new(
            client,
            "test",
            Duration::from_secs(5),
            CancelFlag::new(),
        )
        .unwrap();

        let mut server = server;
        std::io::Write::write_all(&mut server, b"hello").unwrap();

        let mut buf = [0u8; 16];
        let n = chan.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn read_times_out_without_data() {
        let (_server, client) = pair();
        let mut chan = SocketChannel::new(
            client,
            "test",
            Duration::from_millis(50),
            CancelFlag::new(),
        )
        .unwrap();

        let mut buf = [0u8; 16];
        match chan.read(&mut buf) {
            Err(TransportError::Timeout(_)) => (),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_flag_wins_over_timeout() {
        let (_server, client) = pair();
        let cancel = CancelFlag::new();
        cancel.set();
        let mut chan =
            SocketChannel::new(client, "test", Duration::from_secs(5), cancel).unwrap();

        let mut buf = [0u8; 16];
        match chan.read(&mut buf) {
            Err(TransportError::Cancelled) => (),
            other => panic!("expected cancelled, got {other:?}"),
        }
    }

    #[test]
    fn read_exact_reports_closed_on_short_stream() {
        let (server, client) = pair();
        let mut chan = SocketChannel::new(
            client,
            "test",
            Duration::from_secs(5),
            CancelFlag::new(),
        )
        .unwrap();

        let mut server = server;
        std::io::Write::write_all(&mut server, b"ab").unwrap();
        drop(server);

        let mut buf = [0u8; 4];
        match chan.read_exact(&mut buf) {
            Err(TransportError::Closed) => (),
            other => panic!("expected closed, got {other:?}"),
        }
    }
}
