//! Server bootstrap and the running server handle
//!
//! `ServerBootstrap` collects the listener settings, TLS context and request
//! handlers; `create()` binds the listener and starts the accept loop on a
//! background thread. Each accepted connection is served on its own thread
//! until the peer closes it or the server shuts down.

use super::handler::{HandlerMapper, HttpRequestHandler};
use super::session::{poll_fd, PlainSessionOps, PollEvents, SessionOps, TlsSessionOps};
use super::{Error, HttpContext, HttpResponse, Result, ServerConnection};
use crate::conn::ssl::SslContext;
use log::{debug, info, trace, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the accept loop checks for shutdown
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Listener and connection socket options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
    /// Read/write timeout on accepted connections; `None` waits indefinitely
    pub so_timeout: Option<Duration>,
    pub so_reuseaddr: bool,
    pub tcp_nodelay: bool,
    pub backlog: i32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            so_timeout: None,
            so_reuseaddr: true,
            tcp_nodelay: true,
            backlog: 128,
        }
    }
}

/// Fluent builder for `HttpServer`
pub struct ServerBootstrap {
    listener_port: u16,
    local_address: Option<IpAddr>,
    socket_config: SocketConfig,
    server_info: Option<String>,
    ssl_context: Option<SslContext>,
    handlers: HandlerMapper,
}

impl ServerBootstrap {
    pub fn bootstrap() -> Self {
        ServerBootstrap {
            listener_port: 0,
            local_address: None,
            socket_config: SocketConfig::default(),
            server_info: None,
            ssl_context: None,
            handlers: HandlerMapper::new(),
        }
    }

    /// Port to listen on; 0 picks an ephemeral port
    pub fn set_listener_port(mut self, port: u16) -> Self {
        self.listener_port = port;
        self
    }

    /// Address to bind; defaults to `127.0.0.1`
    pub fn set_local_address(mut self, address: IpAddr) -> Self {
        self.local_address = Some(address);
        self
    }

    pub fn set_socket_config(mut self, config: SocketConfig) -> Self {
        self.socket_config = config;
        self
    }

    /// Value of the `Server` header on every response
    pub fn set_server_info(mut self, info: impl Into<String>) -> Self {
        self.server_info = Some(info.into());
        self
    }

    /// Serve TLS with this context's key material
    pub fn set_ssl_context(mut self, context: SslContext) -> Self {
        self.ssl_context = Some(context);
        self
    }

    pub fn register_handler(
        mut self,
        pattern: impl Into<String>,
        handler: impl HttpRequestHandler + 'static,
    ) -> Self {
        self.handlers.register(pattern, Arc::new(handler));
        self
    }

    /// Bind the listener and start accepting connections
    pub fn create(self) -> Result<HttpServer> {
        let address = SocketAddr::new(
            self.local_address
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            self.listener_port,
        );
        let config = self.socket_config;

        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(config.so_reuseaddr)?;
        socket.bind(&address.into())?;
        socket.listen(config.backlog)?;

        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            server_info: self
                .server_info
                .unwrap_or_else(|| format!("hc-ssl/{}", env!("CARGO_PKG_VERSION"))),
            socket_config: config,
            ssl_context: self.ssl_context,
            handlers: self.handlers,
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            connections: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
        });

        let acceptor = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("hc-listener-{}", local_addr.port()))
                .spawn(move || accept_loop(listener, shared))?
        };

        info!(
            "Listening on {} ({})",
            local_addr,
            if shared.ssl_context.is_some() { "https" } else { "http" }
        );

        Ok(HttpServer {
            local_addr,
            shared,
            acceptor: Mutex::new(Some(acceptor)),
        })
    }
}

struct Shared {
    server_info: String,
    socket_config: SocketConfig,
    ssl_context: Option<SslContext>,
    handlers: HandlerMapper,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    /// Live connections, kept so shutdown can interrupt blocked workers
    connections: Mutex<HashMap<u64, TcpStream>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running server
///
/// Dropping the handle shuts the server down without a grace period.
pub struct HttpServer {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl HttpServer {
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Stop accepting, close live connections and wait for worker threads
    ///
    /// Threads still running after `grace` are left to finish on their own.
    pub fn shutdown(&self, grace: Duration) {
        if !self.shared.shutdown.swap(true, Ordering::SeqCst) {
            info!("Shutting down server on {}", self.local_addr);
        }
        let deadline = Instant::now() + grace;

        if let Some(acceptor) = lock(&self.acceptor).take() {
            join_until(acceptor, deadline);
        }

        for (_, stream) in lock(&self.shared.connections).drain() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                trace!("Connection shutdown: {}", e);
            }
        }

        let workers: Vec<_> = lock(&self.shared.workers).drain(..).collect();
        let mut pending = 0;
        for worker in workers {
            if !join_until(worker, deadline) {
                pending += 1;
            }
        }
        if pending > 0 {
            warn!("{} connection thread(s) still running after shutdown", pending);
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.shutdown(Duration::ZERO);
    }
}

/// Wait for `handle` until `deadline`; returns false if it is still running
fn join_until(handle: JoinHandle<()>, deadline: Instant) -> bool {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
    if handle.join().is_err() {
        warn!("Server thread panicked");
    }
    true
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while !shared.is_shutdown() {
        match poll_fd(listener.as_raw_fd(), PollEvents::Read, Some(ACCEPT_POLL_INTERVAL)) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!("Listener poll failed: {}", e);
                break;
            }
        }

        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        if shared.is_shutdown() {
            break;
        }
        debug!("Accepted connection from {}", peer);

        let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("hc-worker-{}", id))
                .spawn(move || run_worker(id, stream, peer, &shared))
        };
        match worker {
            Ok(handle) => {
                let mut workers = lock(&shared.workers);
                workers.retain(|w| !w.is_finished());
                workers.push(handle);
            }
            Err(e) => warn!("Failed to spawn connection thread: {}", e),
        }
    }
    debug!("Accept loop stopped");
}

fn run_worker(id: u64, stream: TcpStream, peer: SocketAddr, shared: &Shared) {
    match stream.try_clone() {
        Ok(handle) => {
            lock(&shared.connections).insert(id, handle);
        }
        Err(e) => {
            warn!("Cannot track connection from {}: {}", peer, e);
            return;
        }
    }

    if shared.is_shutdown() {
        let _ = stream.shutdown(Shutdown::Both);
    } else {
        match serve_connection(stream, shared) {
            Ok(()) => debug!("Connection from {} closed", peer),
            Err(Error::Timeout) => debug!("Connection from {} timed out", peer),
            Err(e) => debug!("Connection from {} failed: {}", peer, e),
        }
    }

    lock(&shared.connections).remove(&id);
}

fn serve_connection(stream: TcpStream, shared: &Shared) -> Result<()> {
    let config = &shared.socket_config;
    let timeout = config.so_timeout.filter(|t| !t.is_zero());
    stream.set_nonblocking(false)?;
    stream.set_nodelay(config.tcp_nodelay)?;
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    match &shared.ssl_context {
        Some(context) => {
            let session = TlsSessionOps::accept(stream, context)?;
            let ssl = session.ssl_stream().ssl();
            debug!(
                "TLS session established: {} {}",
                ssl.version_str(),
                ssl.current_cipher().map_or("-", |cipher| cipher.name())
            );
            serve(ServerConnection::new(session), timeout, shared)
        }
        None => serve(
            ServerConnection::new(PlainSessionOps::new(stream)),
            timeout,
            shared,
        ),
    }
}

fn serve<S: SessionOps>(
    mut conn: ServerConnection<S>,
    timeout: Option<Duration>,
    shared: &Shared,
) -> Result<()> {
    conn.set_timeout(timeout);

    loop {
        let request = match conn.receive_request() {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e @ (Error::Parse(_) | Error::InvalidHeader(_) | Error::Protocol(_))) => {
                let mut response = HttpResponse::new(400);
                finish_response(&mut response, &shared.server_info, false);
                // Best effort; the connection is dropped either way
                let _ = conn.send_response(&response);
                let _ = conn.close();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut response = HttpResponse::new(200);
        let mut context = HttpContext::new();
        match shared.handlers.lookup(request.path()) {
            Some(handler) => {
                trace!("{} {} dispatched", request.method(), request.uri());
                if let Err(e) = handler.handle(&request, &mut response, &mut context) {
                    warn!("Handler for {} failed: {}", request.path(), e);
                    response = HttpResponse::new(500);
                    response.set_body(e.to_string(), "text/plain");
                }
            }
            None => {
                debug!("No handler for {}", request.path());
                response.set_status(501);
            }
        }

        let keep_alive = request.keep_alive() && !shared.is_shutdown();
        finish_response(&mut response, &shared.server_info, keep_alive);
        conn.send_response(&response)?;

        if !keep_alive {
            break;
        }
    }

    conn.close()
}

fn finish_response(response: &mut HttpResponse, server_info: &str, keep_alive: bool) {
    response.headers_mut().set("Server", server_info);
    if !keep_alive {
        response.headers_mut().set("Connection", "close");
    }
}
