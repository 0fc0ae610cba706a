//! Name resolution and outbound connections.

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::cancel::CancelFlag;
use crate::error::TransportError;
use crate::Result;

/// Resolves `host:port` to a candidate address list.
///
/// With `prefer_ipv6` set, IPv6 addresses are tried before IPv4; otherwise
/// the list is restricted to IPv4, matching the resolver family the rest of
/// the engine expects.
pub fn resolve(host: &str, port: u16, prefer_ipv6: bool) -> Result<Vec<SocketAddr>> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Lookup {
            host: host.to_string(),
            source,
        })?;

    let mut addrs: Vec<SocketAddr> = if prefer_ipv6 {
        addrs.collect()
    } else {
        addrs.filter(SocketAddr::is_ipv4).collect()
    };

    if prefer_ipv6 {
        addrs.sort_by_key(|a| a.is_ipv4());
    }

    if addrs.is_empty() {
        return Err(TransportError::Lookup {
            host: host.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no usable addresses",
            ),
        });
    }

    Ok(addrs)
}

/// Connects to `host:port`, iterating over every resolved address.
pub fn connect_to(
    host: &str,
    port: u16,
    timeout: Duration,
    prefer_ipv6: bool,
) -> Result<(TcpStream, SocketAddr)> {
    log::info!("Looking up {host}");
    let addrs = resolve(host, port, prefer_ipv6)?;

    let mut last_err = None;
    for addr in addrs {
        log::info!("Trying {}:{}", addr.ip(), addr.port());
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                log::info!("Connected to {}:{}", addr.ip(), addr.port());
                return Ok((stream, addr));
            }
            Err(e) => {
                log::warn!("Cannot connect to {}: {e}", addr.ip());
                last_err = Some(e);
            }
        }
    }

    Err(TransportError::Connect {
        host: host.to_string(),
        source: last_err
            .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "no address")),
    })
}

/// Accepts one inbound connection with a bounded wait.
///
/// The listener runs non-blocking only around the accept; the accepted
/// stream is switched back to blocking before it is returned. Used by the
/// FTP active-mode data path, where the server connects back to us after
/// the data command.
pub fn accept_with_timeout(
    listener: &TcpListener,
    timeout: Duration,
    cancel: &CancelFlag,
) -> Result<TcpStream> {
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + timeout;

    loop {
        if cancel.is_set() {
            return Err(TransportError::Cancelled);
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("accepted data connection from {peer}");
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    let local = listener
                        .local_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "data port".to_string());
                    return Err(TransportError::Timeout(local));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn resolve_localhost_ipv4() {
        let addrs = resolve("127.0.0.1", 21, false).unwrap();
        assert!(addrs.iter().all(SocketAddr::is_ipv4));
        assert_eq!(addrs[0].port(), 21);
    }

    #[test]
    fn resolve_unknown_host_is_lookup_error() {
        match resolve("no-such-host.invalid.", 21, false) {
            Err(TransportError::Lookup { host, .. }) => {
                assert_eq!(host, "no-such-host.invalid.")
            }
            other => panic!("expected lookup failure, got {other:?}"),
        }
    }

    #[test]
    fn accept_times_out_when_nobody_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let cancel = CancelFlag::new();
        match accept_with_timeout(&listener, Duration::from_millis(60), &cancel) {
            Err(TransportError::Timeout(_)) => (),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn accept_returns_blocking_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());

        let cancel = CancelFlag::new();
        let stream =
            accept_with_timeout(&listener, Duration::from_secs(5), &cancel).unwrap();
        client.join().unwrap();

        // A blocking stream with a read timeout must report a timeout
        // rather than WouldBlock-looping forever.
        stream
            .set_read_timeout(Some(Duration::from_millis(30)))
            .unwrap();
        let mut buf = [0u8; 1];
        let err = std::io::Read::read(&mut { &stream }, &mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));
    }
}
