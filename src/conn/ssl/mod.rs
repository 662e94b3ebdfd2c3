//! TLS support for client connections
//!
//! This module layers TLS over plain TCP connections created by the
//! connection socket factories.
//!
//! # Architecture
//!
//! 1. `SslContexts` / `SslContextBuilder` assemble an immutable `SslContext`
//!    from trust material, key material and protocol parameters
//! 2. `TrustStrategy` and `PrivateKeyStrategy` are single-operation hooks
//!    consulted while the handshake runs
//! 3. `SslConnectionSocketFactory` connects, performs the handshake and hands
//!    the result to a `HostnameVerifier` before returning a `TlsSocket`
//!
//! # Examples
//!
//! ```no_run
//! use hc_ssl::conn::ssl::{SslConnectionSocketFactory, SslContexts};
//! use hc_ssl::http::{HttpContext, HttpHost};
//!
//! let factory = SslConnectionSocketFactory::new(SslContexts::create_default().unwrap(), None);
//! let mut context = HttpContext::new();
//! let socket = factory.create_socket(&mut context).unwrap();
//! let target = HttpHost::new("example.com", 443, "https");
//! let remote = "93.184.216.34:443".parse().unwrap();
//! let tls = factory
//!     .connect_socket(0, socket, &target, remote, None, &mut context)
//!     .unwrap();
//! assert!(tls.session().is_some());
//! ```

pub mod cert;
pub mod context;
pub mod factory;
pub mod keystore;
pub mod socket;
pub mod strategy;
pub mod verifier;

pub use context::{SslContext, SslContextBuilder, SslContexts, TlsVersion};
pub use factory::SslConnectionSocketFactory;
pub use keystore::{KeyStore, KeyStoreEntry};
pub use socket::{SessionInfo, TlsSocket};
pub use strategy::{
    PrivateKeyDetails, PrivateKeyStrategy, TrustAllStrategy, TrustSelfSignedStrategy,
    TrustStrategy,
};
pub use verifier::{
    AllowAllHostnameVerifier, BrowserCompatHostnameVerifier, HostnameVerifier,
    StrictHostnameVerifier,
};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, SslError>;

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum SslError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Peer not verified: {0}")]
    PeerUnverified(String),

    #[error("{0}")]
    HostnameMismatch(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Unknown key alias: {0}")]
    UnknownAlias(String),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SslError {
    /// True if the TLS handshake itself was rejected
    pub fn is_handshake(&self) -> bool {
        matches!(self, SslError::Handshake(_))
    }

    /// True for transport-level failures, including failed hostname checks
    pub fn is_io(&self) -> bool {
        matches!(self, SslError::Io(_))
    }
}
