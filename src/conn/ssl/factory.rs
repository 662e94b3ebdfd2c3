//! TLS connection socket factory

use super::cert;
use super::context::{SslContext, SslContexts};
use super::socket::TlsSocket;
use super::verifier::{BrowserCompatHostnameVerifier, HostnameVerifier};
use super::{Result, SslError};
use crate::conn::{self, ConnectionSocketFactory, LayeredConnectionSocketFactory};
use crate::http::{context as attrs, HttpContext, HttpHost};
use log::{debug, warn};
use openssl::ssl::HandshakeError;
use socket2::{Domain, Socket};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

/// Connects sockets and layers TLS over them
///
/// After every successful handshake the configured `HostnameVerifier` checks
/// the peer against the target host before the socket is handed out.
#[derive(Clone)]
pub struct SslConnectionSocketFactory {
    context: SslContext,
    hostname_verifier: Arc<dyn HostnameVerifier>,
}

impl SslConnectionSocketFactory {
    /// Create a factory; `None` selects the browser-compatible verifier
    pub fn new(context: SslContext, hostname_verifier: Option<Arc<dyn HostnameVerifier>>) -> Self {
        SslConnectionSocketFactory {
            context,
            hostname_verifier: hostname_verifier
                .unwrap_or_else(|| Arc::new(BrowserCompatHostnameVerifier)),
        }
    }

    /// Factory over the platform default trust roots
    pub fn system_default() -> Result<Self> {
        Ok(Self::new(SslContexts::create_default()?, None))
    }

    pub fn hostname_verifier(&self) -> &Arc<dyn HostnameVerifier> {
        &self.hostname_verifier
    }

    pub fn ssl_context(&self) -> &SslContext {
        &self.context
    }

    /// Create an unconnected socket
    pub fn create_socket(&self, _context: &mut HttpContext) -> io::Result<Socket> {
        conn::new_socket(Domain::IPV4)
    }

    /// Connect, handshake and verify
    ///
    /// `connect_timeout_ms` of zero means no timeout. The verifier is run
    /// against `host.hostname()`; its failure closes the socket and is
    /// reported as `SslError::Io`.
    pub fn connect_socket(
        &self,
        connect_timeout_ms: u32,
        socket: Socket,
        host: &HttpHost,
        remote_address: SocketAddr,
        local_address: Option<SocketAddr>,
        context: &mut HttpContext,
    ) -> Result<TlsSocket> {
        let stream = conn::connect(connect_timeout_ms, socket, remote_address, local_address)?;
        context.set_attribute(attrs::TARGET_HOST, host.clone());
        self.create_layered_socket(stream, host.hostname(), host.port(), context)
    }

    /// Layer TLS over an already connected stream
    pub fn create_layered_socket(
        &self,
        stream: TcpStream,
        target: &str,
        port: u16,
        context: &mut HttpContext,
    ) -> Result<TlsSocket> {
        let mut ssl = self.context.new_ssl(&stream)?;
        if !cert::is_ip_address(target) {
            ssl.set_hostname(target)?;
        }

        debug!("Starting TLS handshake with {}:{}", target, port);
        let ssl_stream = match ssl.connect(stream) {
            Ok(stream) => stream,
            Err(HandshakeError::SetupFailure(e)) => return Err(SslError::OpenSsl(e)),
            Err(HandshakeError::Failure(mid)) => {
                let verify = mid.ssl().verify_result();
                return Err(SslError::Handshake(format!(
                    "{} (certificate verification: {})",
                    mid.error(),
                    verify
                )));
            }
            Err(HandshakeError::WouldBlock(mid)) => {
                return Err(SslError::Handshake(format!(
                    "Handshake interrupted: {}",
                    mid.error()
                )));
            }
        };

        let mut socket = TlsSocket::new(ssl_stream);
        debug!(
            "TLS session with {}:{} established: {} {}",
            target,
            port,
            socket.session_info().protocol,
            socket.session_info().cipher
        );

        if let Err(e) = self.hostname_verifier.verify_socket(target, &socket) {
            warn!("Hostname verification failed for {}: {}", target, e);
            if let Err(close_err) = socket.close() {
                debug!("Error closing rejected socket: {}", close_err);
            }
            return Err(SslError::Io(e));
        }

        context.set_attribute(attrs::SSL_SESSION, socket.session_info().clone());
        Ok(socket)
    }
}

impl ConnectionSocketFactory for SslConnectionSocketFactory {
    type Connection = TlsSocket;
    type Error = SslError;

    fn create_socket(&self, context: &mut HttpContext) -> io::Result<Socket> {
        SslConnectionSocketFactory::create_socket(self, context)
    }

    fn connect_socket(
        &self,
        connect_timeout_ms: u32,
        socket: Socket,
        host: &HttpHost,
        remote_address: SocketAddr,
        local_address: Option<SocketAddr>,
        context: &mut HttpContext,
    ) -> Result<TlsSocket> {
        SslConnectionSocketFactory::connect_socket(
            self,
            connect_timeout_ms,
            socket,
            host,
            remote_address,
            local_address,
            context,
        )
    }
}

impl LayeredConnectionSocketFactory for SslConnectionSocketFactory {
    fn create_layered_socket(
        &self,
        stream: TcpStream,
        target: &str,
        port: u16,
        context: &mut HttpContext,
    ) -> Result<TlsSocket> {
        SslConnectionSocketFactory::create_layered_socket(self, stream, target, port, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::ssl::socket::SessionInfo;
    use crate::conn::ssl::verifier::StrictHostnameVerifier;
    use crate::localserver;
    use std::net::TcpListener;
    use std::thread;

    /// Accepts one TLS connection with the test server context
    fn spawn_tls_acceptor() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server_context = localserver::create_server_ssl_context().unwrap();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ssl = server_context.new_ssl(&stream).unwrap();
            ssl.set_verify(openssl::ssl::SslVerifyMode::NONE);
            // The client may abort the handshake; that is what some tests check
            if let Ok(mut stream) = ssl.accept(stream) {
                let _ = stream.shutdown();
            }
        });

        addr
    }

    #[test]
    fn test_default_verifier_is_browser_compat() {
        let factory = SslConnectionSocketFactory::system_default().unwrap();
        let leaf = localserver::server_keystore()
            .unwrap()
            .certificate_chain("hc-test-server")
            .unwrap();

        // Browser-compatible matching accepts nested subdomains of a wildcard
        let cns = vec!["*.foo.com".to_string()];
        assert!(factory.hostname_verifier().verify_names("a.b.foo.com", &cns, &[]).is_ok());
        assert!(factory.hostname_verifier().verify_certificate("localhost", &leaf[0]).is_ok());
    }

    #[test]
    fn test_context_attributes_after_connect() {
        let addr = spawn_tls_acceptor();
        let factory =
            SslConnectionSocketFactory::new(localserver::create_client_ssl_context().unwrap(), None);
        let mut context = HttpContext::new();
        let socket = factory.create_socket(&mut context).unwrap();
        let host = HttpHost::new("localhost", addr.port(), "https");

        let mut tls = factory
            .connect_socket(0, socket, &host, addr, None, &mut context)
            .unwrap();

        assert_eq!(context.attribute::<HttpHost>(attrs::TARGET_HOST), Some(&host));
        let info = context.attribute::<SessionInfo>(attrs::SSL_SESSION).unwrap();
        assert_eq!(info.servername.as_deref(), Some("localhost"));
        assert_eq!(info.peer_chain()[0].subject, "localhost");

        tls.close().unwrap();
        assert!(tls.is_closed());
    }

    #[test]
    fn test_hostname_mismatch_is_io_error() {
        let addr = spawn_tls_acceptor();
        let factory = SslConnectionSocketFactory::new(
            localserver::create_client_ssl_context().unwrap(),
            Some(Arc::new(StrictHostnameVerifier)),
        );
        let mut context = HttpContext::new();
        let socket = factory.create_socket(&mut context).unwrap();

        // The certificate is trusted but was not issued for this name
        let host = HttpHost::new("www.example.com", addr.port(), "https");
        let err = factory
            .connect_socket(0, socket, &host, addr, None, &mut context)
            .unwrap_err();

        assert!(err.is_io());
        assert!(!context.contains(attrs::SSL_SESSION));
    }

    #[test]
    fn test_connect_refused_is_io_error() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let factory =
            SslConnectionSocketFactory::new(localserver::create_client_ssl_context().unwrap(), None);
        let mut context = HttpContext::new();
        let socket = factory.create_socket(&mut context).unwrap();
        let host = HttpHost::new("localhost", addr.port(), "https");

        let err = factory
            .connect_socket(0, socket, &host, addr, None, &mut context)
            .unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_layered_over_ip_target() {
        let addr = spawn_tls_acceptor();
        let factory =
            SslConnectionSocketFactory::new(localserver::create_client_ssl_context().unwrap(), None);
        let mut context = HttpContext::new();

        let stream = TcpStream::connect(addr).unwrap();
        let tls = factory
            .create_layered_socket(stream, "127.0.0.1", addr.port(), &mut context)
            .unwrap();

        // No SNI for IP literals
        assert_eq!(tls.session_info().servername, None);
        assert!(tls.session().is_some());
    }
}
