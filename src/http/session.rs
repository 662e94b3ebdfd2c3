//! Session operations abstraction
//!
//! `SessionOps` hides whether a server connection is plain TCP or TLS so the
//! request/response code is written once.

use super::{Error, Result};
use crate::conn::ssl::{SslContext, SslError};
use openssl::ssl::{HandshakeError, SslStream, SslVerifyMode};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Session operations trait
pub trait SessionOps {
    /// Poll the session for events
    ///
    /// Returns true if the session is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn close(&mut self) -> Result<()>;

    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// Wait for `events` on a raw descriptor
///
/// Returns false on timeout. `None` waits indefinitely.
pub(crate) fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, EINTR, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    loop {
        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };
        if result >= 0 {
            return Ok(result > 0);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(EINTR) {
            return Err(Error::Io(err));
        }
    }
}

fn shutdown_stream(stream: &TcpStream) -> Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(Error::Io(e)),
        _ => Ok(()),
    }
}

/// Plain TCP session operations
pub struct PlainSessionOps {
    stream: TcpStream,
}

impl PlainSessionOps {
    pub fn new(stream: TcpStream) -> Self {
        PlainSessionOps { stream }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl SessionOps for PlainSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        shutdown_stream(&self.stream)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }
}

/// Server-side TLS session operations
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
}

impl TlsSessionOps {
    /// Run the server handshake on an accepted connection
    ///
    /// Client certificates are not requested.
    pub fn accept(stream: TcpStream, context: &SslContext) -> Result<Self> {
        let mut ssl = context.new_ssl(&stream)?;
        ssl.set_verify(SslVerifyMode::NONE);

        let stream = match ssl.accept(stream) {
            Ok(stream) => stream,
            Err(HandshakeError::SetupFailure(e)) => return Err(SslError::OpenSsl(e).into()),
            Err(HandshakeError::Failure(mid)) | Err(HandshakeError::WouldBlock(mid)) => {
                return Err(SslError::Handshake(format!("Accept failed: {}", mid.error())).into());
            }
        };

        Ok(TlsSessionOps { stream })
    }

    /// Established TLS stream, for inspecting the negotiated session
    pub fn ssl_stream(&self) -> &SslStream<TcpStream> {
        &self.stream
    }
}

impl SessionOps for TlsSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        // Decrypted bytes may already be buffered inside OpenSSL
        if events != PollEvents::Write && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }
        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            // Peer dropped the TCP connection without close_notify
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        if let Err(e) = self.stream.shutdown() {
            log::trace!("TLS close_notify failed: {}", e);
        }
        shutdown_stream(self.stream.get_ref())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.get_ref().peer_addr().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ssl::{SslConnector, SslMethod};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_plain_session_ops() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Hello").unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut session = PlainSessionOps::new(stream);

        assert!(session.poll(PollEvents::Read, Some(Duration::from_secs(1))).unwrap());

        let mut buf = [0u8; 5];
        let n = session.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"Hello");
        assert_eq!(session.peer_addr(), Some(addr));

        handle.join().unwrap();
        session.close().unwrap();
    }

    #[test]
    fn test_tls_session_ops() {
        let context = crate::localserver::create_server_ssl_context().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut session = TlsSessionOps::accept(stream, &context).unwrap();
            let version = session.ssl_stream().ssl().version_str().to_string();
            session.write(b"Hello").unwrap();
            session.close().unwrap();
            version
        });

        let mut connector = SslConnector::builder(SslMethod::tls()).unwrap();
        connector.set_verify(SslVerifyMode::NONE);
        let tcp = TcpStream::connect(addr).unwrap();
        let mut tls = connector.build().connect("localhost", tcp).unwrap();

        // The server certificate travels without its issuer
        assert_eq!(tls.ssl().peer_cert_chain().map(|chain| chain.len()), Some(1));

        let mut buf = Vec::new();
        let _ = tls.read_to_end(&mut buf);
        assert_eq!(buf, b"Hello");
        assert_eq!(handle.join().unwrap(), tls.ssl().version_str());
    }

    #[test]
    fn test_poll_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let session = PlainSessionOps::new(stream);

        assert!(!session
            .poll(PollEvents::Read, Some(Duration::from_millis(20)))
            .unwrap());
        assert!(session
            .poll(PollEvents::Write, Some(Duration::from_millis(20)))
            .unwrap());
    }
}
