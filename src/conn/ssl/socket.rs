//! Connected TLS sockets
//!
//! `TlsSocket` owns the OpenSSL stream produced by a successful handshake
//! together with a summary of the negotiated session.

use super::cert::CertInfo;
use log::trace;
use openssl::ssl::{NameType, SslRef, SslSessionRef, SslStream};
use openssl::x509::X509;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// Negotiated session parameters, captured right after the handshake
#[derive(Clone)]
pub struct SessionInfo {
    /// Negotiated protocol (e.g. "TLSv1.3")
    pub protocol: String,
    /// Negotiated cipher suite
    pub cipher: String,
    /// SNI servername sent by the client
    pub servername: Option<String>,
    /// Whether the session was resumed
    pub reused: bool,
    peer_certificates: Vec<X509>,
}

impl SessionInfo {
    pub fn from_ssl(ssl: &SslRef) -> Self {
        let mut peer_certificates = Vec::new();
        if let Some(peer) = ssl.peer_certificate() {
            peer_certificates.push(peer);
        }
        if let Some(chain) = ssl.peer_cert_chain() {
            // Client side the stack repeats the leaf; server side it does not
            let skip = if ssl.is_server() { 0 } else { peer_certificates.len() };
            for cert in chain.iter().skip(skip) {
                peer_certificates.push(cert.to_owned());
            }
        }

        SessionInfo {
            protocol: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            reused: ssl.session_reused(),
            peer_certificates,
        }
    }

    /// Peer certificate chain, leaf first
    pub fn peer_certificates(&self) -> &[X509] {
        &self.peer_certificates
    }

    /// Summaries of the peer chain
    pub fn peer_chain(&self) -> Vec<CertInfo> {
        self.peer_certificates
            .iter()
            .map(|c| CertInfo::from_x509(c))
            .collect()
    }
}

impl std::fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInfo")
            .field("protocol", &self.protocol)
            .field("cipher", &self.cipher)
            .field("servername", &self.servername)
            .field("reused", &self.reused)
            .field("peer_chain", &self.peer_chain())
            .finish()
    }
}

/// A TCP connection with a completed TLS handshake
pub struct TlsSocket {
    stream: SslStream<TcpStream>,
    info: SessionInfo,
    closed: bool,
}

impl TlsSocket {
    pub(crate) fn new(stream: SslStream<TcpStream>) -> Self {
        let info = SessionInfo::from_ssl(stream.ssl());
        TlsSocket {
            stream,
            info,
            closed: false,
        }
    }

    /// The negotiated TLS session, `None` only if no handshake took place
    pub fn session(&self) -> Option<&SslSessionRef> {
        self.stream.ssl().session()
    }

    pub fn session_info(&self) -> &SessionInfo {
        &self.info
    }

    /// Leaf certificate presented by the peer
    pub fn peer_certificate(&self) -> Option<X509> {
        self.stream.ssl().peer_certificate()
    }

    pub fn ssl(&self) -> &SslRef {
        self.stream.ssl()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.get_ref().peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.get_ref().local_addr()
    }

    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send close-notify and shut down the TCP connection
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.stream.shutdown() {
            trace!("TLS close-notify not sent: {}", e);
        }

        match self.stream.get_mut().shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

impl Read for TlsSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TlsSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl std::fmt::Debug for TlsSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSocket")
            .field("peer", &self.peer_addr().ok())
            .field("session", &self.info)
            .field("closed", &self.closed)
            .finish()
    }
}
