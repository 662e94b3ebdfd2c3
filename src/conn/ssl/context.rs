//! TLS context construction
//!
//! `SslContexts::create_default()` gives a context that trusts the platform
//! roots. `SslContexts::custom()` returns a builder for contexts with their
//! own trust material, key material and protocol range.

use super::cert;
use super::keystore::KeyStore;
use super::strategy::{PrivateKeyDetails, PrivateKeyStrategy, TrustStrategy};
use super::{Result, SslError};
use log::{debug, trace};
use openssl::pkey::{PKey, Private};
use openssl::ssl::{Ssl, SslMethod, SslVerifyMode};
use openssl::x509::{X509StoreContext, X509StoreContextRef, X509};
use std::collections::{BTreeMap, HashMap};
use std::net::TcpStream;
use std::str::FromStr;
use std::sync::Arc;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// SSL 3.0 (deprecated, rarely available)
    Ssl3,
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Ssl3 => SslVersion::SSL3,
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Ssl3 => "SSLv3",
            TlsVersion::Tls10 => "TLSv1",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

impl FromStr for TlsVersion {
    type Err = SslError;

    /// Parse a protocol name (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "SSLV3" | "SSL3" => Ok(TlsVersion::Ssl3),
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" => Ok(TlsVersion::Tls10),
            "TLSV1.1" | "TLS1.1" => Ok(TlsVersion::Tls11),
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(SslError::InvalidVersion(s.to_string())),
        }
    }
}

/// Key entries plus the strategy that picks among them
struct KeyMaterial {
    entries: BTreeMap<String, (PKey<Private>, Vec<X509>)>,
    strategy: Option<Arc<dyn PrivateKeyStrategy>>,
}

impl KeyMaterial {
    fn choose_alias(&self, socket: &TcpStream) -> Result<Option<String>> {
        let alias = match &self.strategy {
            Some(strategy) => {
                let details: HashMap<String, PrivateKeyDetails> = self
                    .entries
                    .iter()
                    .map(|(alias, (_, chain))| {
                        let key_type = chain.first().map(|c| cert::key_algorithm(c)).unwrap_or("UNKNOWN");
                        (alias.clone(), PrivateKeyDetails::new(key_type, chain.clone()))
                    })
                    .collect();
                strategy.choose_alias(&details, socket)
            }
            None => self.entries.keys().next().cloned(),
        };

        match alias {
            Some(alias) if !self.entries.contains_key(&alias) => Err(SslError::UnknownAlias(alias)),
            other => Ok(other),
        }
    }
}

/// Immutable TLS context
///
/// Cloning is cheap; clones share the underlying OpenSSL context.
#[derive(Clone)]
pub struct SslContext {
    inner: openssl::ssl::SslContext,
    key_material: Option<Arc<KeyMaterial>>,
}

impl SslContext {
    pub fn has_key_material(&self) -> bool {
        self.key_material.is_some()
    }

    /// Alias whose key would be presented on `socket`, if any
    pub fn choose_key_alias(&self, socket: &TcpStream) -> Result<Option<String>> {
        match &self.key_material {
            Some(material) => material.choose_alias(socket),
            None => Ok(None),
        }
    }

    /// Create a TLS engine for one connection on `socket`
    ///
    /// The key selected by the key material, if any, is installed on the engine
    /// together with the rest of its certificate chain.
    pub(crate) fn new_ssl(&self, socket: &TcpStream) -> Result<Ssl> {
        let mut ssl = Ssl::new(&self.inner)?;

        if let Some(material) = &self.key_material {
            if let Some(alias) = material.choose_alias(socket)? {
                if let Some((key, chain)) = material.entries.get(&alias) {
                    debug!("Presenting key alias '{}'", alias);
                    if let Some(leaf) = chain.first() {
                        ssl.set_certificate(leaf)?;
                    }
                    for extra in chain.iter().skip(1) {
                        ssl.add_chain_cert(extra.clone())?;
                    }
                    ssl.set_private_key(key)?;
                }
            }
        }

        Ok(ssl)
    }
}

/// Factory functions for TLS contexts
pub struct SslContexts;

impl SslContexts {
    /// Context trusting the platform default roots
    pub fn create_default() -> Result<SslContext> {
        SslContextBuilder::new().build()
    }

    /// Builder for a customized context
    pub fn custom() -> SslContextBuilder {
        SslContextBuilder::new()
    }
}

/// TLS context builder
pub struct SslContextBuilder {
    trust_loaded: bool,
    platform_trust: bool,
    trust_anchors: Vec<X509>,
    trust_strategy: Option<Arc<dyn TrustStrategy>>,
    key_entries: BTreeMap<String, (PKey<Private>, Vec<X509>)>,
    key_strategy: Option<Arc<dyn PrivateKeyStrategy>>,
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    cipher_list: Option<String>,
    ciphersuites: Option<String>,
}

impl Default for SslContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SslContextBuilder {
    pub fn new() -> Self {
        SslContextBuilder {
            trust_loaded: false,
            platform_trust: false,
            trust_anchors: Vec::new(),
            trust_strategy: None,
            key_entries: BTreeMap::new(),
            key_strategy: None,
            min_version: Some(TlsVersion::Tls12),
            max_version: None,
            cipher_list: None,
            ciphersuites: None,
        }
    }

    /// Load trust material
    ///
    /// With no trust store the platform default roots are trusted. The
    /// strategy, if given, is consulted whenever standard verification
    /// rejects part of the peer chain.
    pub fn load_trust_material(
        mut self,
        truststore: Option<&KeyStore>,
        trust_strategy: Option<Arc<dyn TrustStrategy>>,
    ) -> Self {
        self.trust_loaded = true;
        match truststore {
            Some(store) => self.trust_anchors.extend(store.trust_anchors()),
            None => self.platform_trust = true,
        }
        if trust_strategy.is_some() {
            self.trust_strategy = trust_strategy;
        }
        self
    }

    /// Load key material for client authentication
    pub fn load_key_material(
        mut self,
        keystore: &KeyStore,
        key_strategy: Option<Arc<dyn PrivateKeyStrategy>>,
    ) -> Self {
        for (alias, key, chain) in keystore.key_entries() {
            self.key_entries
                .insert(alias.to_string(), (key.clone(), chain.to_vec()));
        }
        if key_strategy.is_some() {
            self.key_strategy = key_strategy;
        }
        self
    }

    /// Pin the protocol to a single version
    pub fn use_protocol(mut self, version: TlsVersion) -> Self {
        self.min_version = Some(version);
        self.max_version = Some(version);
        self
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.cipher_list = Some(ciphers.into());
        self
    }

    /// Set cipher suites (for TLS 1.3)
    pub fn ciphersuites(mut self, ciphers: impl Into<String>) -> Self {
        self.ciphersuites = Some(ciphers.into());
        self
    }

    /// Build the TLS context
    pub fn build(self) -> Result<SslContext> {
        if let (Some(min), Some(max)) = (self.min_version, self.max_version) {
            if min > max {
                return Err(SslError::InvalidConfig(format!(
                    "Minimum protocol {} is above maximum {}",
                    min.as_str(),
                    max.as_str()
                )));
            }
        }

        let mut builder = openssl::ssl::SslContext::builder(SslMethod::tls())?;
        builder.set_min_proto_version(self.min_version.map(TlsVersion::to_openssl_version))?;
        builder.set_max_proto_version(self.max_version.map(TlsVersion::to_openssl_version))?;

        if let Some(ciphers) = &self.cipher_list {
            builder.set_cipher_list(ciphers)?;
        }
        if let Some(ciphers) = &self.ciphersuites {
            builder.set_ciphersuites(ciphers)?;
        }

        if !self.trust_loaded || self.platform_trust {
            builder.set_default_verify_paths()?;
        }
        for anchor in self.trust_anchors {
            builder.cert_store_mut().add_cert(anchor)?;
        }

        match self.trust_strategy {
            Some(strategy) => {
                builder.set_verify_callback(SslVerifyMode::PEER, move |preverify_ok, store_ctx| {
                    preverify_ok || consult_trust_strategy(strategy.as_ref(), store_ctx)
                });
            }
            None => builder.set_verify(SslVerifyMode::PEER),
        }

        let key_material = if self.key_entries.is_empty() {
            None
        } else {
            Some(Arc::new(KeyMaterial {
                entries: self.key_entries,
                strategy: self.key_strategy,
            }))
        };

        Ok(SslContext {
            inner: builder.build(),
            key_material,
        })
    }
}

/// Ask the trust strategy about the chain that failed standard verification
fn consult_trust_strategy(strategy: &dyn TrustStrategy, store_ctx: &mut X509StoreContextRef) -> bool {
    let chain = presented_chain(store_ctx);
    let Some(leaf) = chain.first() else {
        return false;
    };

    let auth_type = cert::key_algorithm(leaf);
    trace!(
        "Verification error at depth {}: {}; consulting trust strategy",
        store_ctx.error_depth(),
        store_ctx.error()
    );

    match strategy.is_trusted(&chain, auth_type) {
        Ok(trusted) => {
            debug!("Trust strategy decided {} for chain of {}", trusted, chain.len());
            trusted
        }
        Err(e) => {
            debug!("Trust strategy rejected chain: {}", e);
            false
        }
    }
}

/// Certificates the peer sent, leaf first
///
/// Falls back to the chain built by the verifier when the connection has not
/// recorded the peer chain yet.
fn presented_chain(store_ctx: &X509StoreContextRef) -> Vec<X509> {
    let built: Vec<X509> = store_ctx
        .chain()
        .map(|stack| stack.iter().map(|c| c.to_owned()).collect())
        .unwrap_or_default();
    let leaf = built
        .first()
        .cloned()
        .or_else(|| store_ctx.current_cert().map(|c| c.to_owned()));

    let sent: Vec<X509> = X509StoreContext::ssl_idx()
        .ok()
        .and_then(|idx| store_ctx.ex_data(idx))
        .and_then(|ssl| ssl.peer_cert_chain())
        .map(|stack| stack.iter().map(|c| c.to_owned()).collect())
        .unwrap_or_default();

    if sent.is_empty() {
        return if built.is_empty() {
            leaf.into_iter().collect()
        } else {
            built
        };
    }

    // A server's view of the peer chain leaves out the client certificate
    let mut chain = Vec::with_capacity(sent.len() + 1);
    if let Some(leaf) = leaf {
        if !same_certificate(&leaf, &sent[0]) {
            chain.push(leaf);
        }
    }
    chain.extend(sent);
    chain
}

fn same_certificate(a: &X509, b: &X509) -> bool {
    matches!((a.to_der(), b.to_der()), (Ok(a), Ok(b)) if a == b)
}
