//! HTTP primitives shared by the connection layer and the local server
//!
//! The client side only needs the target descriptor (`HttpHost`) and the
//! per-call scratch map (`HttpContext`). The rest of this module is a small
//! HTTP/1.1 server used to exercise the connection socket factories.
//!
//! # Architecture
//!
//! The server uses a session operations abstraction that hides whether a
//! connection is plain TCP or TLS:
//!
//! - `SessionOps` trait defines operations (poll, read, write, close)
//! - `ServerConnection` parses requests and writes responses over any `SessionOps`
//! - `ServerBootstrap` binds the listener and runs the accept loop
//!
//! # Examples
//!
//! ```no_run
//! use hc_ssl::http::{EchoHandler, ServerBootstrap};
//! use std::time::Duration;
//!
//! let server = ServerBootstrap::bootstrap()
//!     .set_server_info("TEST/1.1")
//!     .register_handler("/echo*", EchoHandler)
//!     .create()
//!     .unwrap();
//! println!("listening on {}", server.local_port());
//! server.shutdown(Duration::from_secs(10));
//! ```

pub mod bootstrap;
pub mod context;
pub mod handler;
pub mod headers;
pub mod host;
pub mod message;
pub mod parser;
pub mod server;
pub mod session;

pub use bootstrap::{HttpServer, ServerBootstrap, SocketConfig};
pub use context::HttpContext;
pub use handler::{EchoHandler, HandlerMapper, HttpRequestHandler};
pub use headers::Headers;
pub use host::HttpHost;
pub use message::{HttpRequest, HttpResponse};
pub use parser::RequestParser;
pub use server::ServerConnection;
pub use session::{PlainSessionOps, SessionOps, TlsSessionOps};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Ssl(#[from] crate::conn::ssl::SslError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Maximum number of headers per message
pub const MAX_HEADERS: usize = 64;

/// Maximum size of a request head
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
