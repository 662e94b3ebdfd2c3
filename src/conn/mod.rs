//! Connection socket factories
//!
//! A connection socket factory creates unconnected sockets and connects them
//! to a remote endpoint. Factories for secure schemes additionally layer TLS
//! over an already connected stream.

pub mod ssl;

use crate::http::{HttpContext, HttpHost};
use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Creates and connects sockets for one scheme
pub trait ConnectionSocketFactory {
    /// Connected stream handed back to the caller
    type Connection;
    /// Failure type; every factory can fail with plain I/O errors
    type Error: From<io::Error>;

    /// Create a new, unconnected socket
    fn create_socket(&self, context: &mut HttpContext) -> io::Result<Socket>;

    /// Connect `socket` to `remote_address`, optionally binding it to `local_address` first
    ///
    /// A `connect_timeout_ms` of zero waits indefinitely.
    fn connect_socket(
        &self,
        connect_timeout_ms: u32,
        socket: Socket,
        host: &HttpHost,
        remote_address: SocketAddr,
        local_address: Option<SocketAddr>,
        context: &mut HttpContext,
    ) -> Result<Self::Connection, Self::Error>;
}

/// A factory that can also upgrade an existing connection, e.g. through a proxy tunnel
pub trait LayeredConnectionSocketFactory: ConnectionSocketFactory {
    fn create_layered_socket(
        &self,
        stream: TcpStream,
        target: &str,
        port: u16,
        context: &mut HttpContext,
    ) -> Result<Self::Connection, Self::Error>;
}

/// Factory for the plain `http` scheme
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainConnectionSocketFactory;

impl PlainConnectionSocketFactory {
    pub fn new() -> Self {
        PlainConnectionSocketFactory
    }
}

impl ConnectionSocketFactory for PlainConnectionSocketFactory {
    type Connection = TcpStream;
    type Error = io::Error;

    fn create_socket(&self, _context: &mut HttpContext) -> io::Result<Socket> {
        new_socket(Domain::IPV4)
    }

    fn connect_socket(
        &self,
        connect_timeout_ms: u32,
        socket: Socket,
        _host: &HttpHost,
        remote_address: SocketAddr,
        local_address: Option<SocketAddr>,
        _context: &mut HttpContext,
    ) -> io::Result<TcpStream> {
        connect(connect_timeout_ms, socket, remote_address, local_address)
    }
}

/// New blocking TCP socket for `domain`
pub(crate) fn new_socket(domain: Domain) -> io::Result<Socket> {
    Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
}

/// Bind (if requested) and connect a raw socket
///
/// A socket of the wrong address family for `remote_address` is replaced.
/// On failure the socket is dropped, which closes it.
pub(crate) fn connect(
    connect_timeout_ms: u32,
    socket: Socket,
    remote_address: SocketAddr,
    local_address: Option<SocketAddr>,
) -> io::Result<TcpStream> {
    let socket = match socket.local_addr().ok().and_then(|a| a.as_socket()) {
        Some(addr) if addr.is_ipv4() != remote_address.is_ipv4() => {
            debug!("Replacing socket for {} address family", remote_address);
            new_socket(Domain::for_address(remote_address))?
        }
        _ => socket,
    };

    if let Some(local) = local_address {
        socket.bind(&SockAddr::from(local))?;
    }

    let remote = SockAddr::from(remote_address);
    debug!("Connecting to {}", remote_address);
    if connect_timeout_ms > 0 {
        socket.connect_timeout(&remote, Duration::from_millis(u64::from(connect_timeout_ms)))?;
    } else {
        socket.connect(&remote)?;
    }

    Ok(socket.into())
}
