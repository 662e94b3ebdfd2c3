//! Local test server support
//!
//! Test key material and TLS contexts for running the connection socket
//! factories against `http::ServerBootstrap` on the loopback interface.
//!
//! The PKI is generated with OpenSSL on first use and shared for the life of
//! the process:
//!
//! - `hc-test-ca`: self-signed CA
//! - `hc-test-server`: `CN=localhost`, valid for `localhost`, `127.0.0.1` and `::1`
//! - `hc-test-key-1`, `hc-test-key-2`: client authentication keys
//!
//! The server presents its certificate alone, without the CA.

mod pki;

use crate::conn::ssl::{KeyStore, Result, SslContext, SslContexts};
use std::sync::OnceLock;

pub use pki::{TestChain, TestIdentity, TestPki};

/// Server info banner sent by the local test server
pub const ORIGIN: &str = "TEST/1.1";

/// Alias of the server key in `server_keystore()`
pub const SERVER_KEY_ALIAS: &str = "hc-test-server";

/// Aliases of the client keys in `test_keystore()`
pub const CLIENT_KEY_ALIASES: [&str; 2] = ["hc-test-key-1", "hc-test-key-2"];

/// Alias of the CA certificate in `test_keystore()`
pub const CA_ALIAS: &str = "hc-test-ca";

/// Alias of the key in `create_self_signed_server_ssl_context()`
pub const SELF_SIGNED_KEY_ALIAS: &str = "hc-test-self-signed";

static PKI: OnceLock<TestPki> = OnceLock::new();

/// The process-wide test PKI, generated on first call
pub fn pki() -> Result<&'static TestPki> {
    if let Some(pki) = PKI.get() {
        return Ok(pki);
    }
    let generated = TestPki::generate()?;
    Ok(PKI.get_or_init(|| generated))
}

/// Client keys plus the trusted CA certificate
pub fn test_keystore() -> Result<KeyStore> {
    let pki = pki()?;
    let mut keystore = KeyStore::new();
    keystore.set_certificate_entry(CA_ALIAS, pki.ca_cert.clone());
    for client in &pki.clients {
        keystore.set_key_entry(client.alias.clone(), client.key.clone(), vec![client.cert.clone()])?;
    }
    Ok(keystore)
}

/// The server key and certificate
pub fn server_keystore() -> Result<KeyStore> {
    let pki = pki()?;
    let mut keystore = KeyStore::new();
    keystore.set_key_entry(
        SERVER_KEY_ALIAS,
        pki.server.key.clone(),
        vec![pki.server.cert.clone()],
    )?;
    Ok(keystore)
}

/// Server-side context presenting the test server certificate
///
/// No trust material is loaded, so the handshake carries the server
/// certificate without the CA.
pub fn create_server_ssl_context() -> Result<SslContext> {
    SslContexts::custom()
        .load_key_material(&server_keystore()?, None)
        .build()
}

/// Server-side context presenting a fresh self-signed `localhost` certificate
pub fn create_self_signed_server_ssl_context() -> Result<SslContext> {
    let identity = pki::self_signed_server(SELF_SIGNED_KEY_ALIAS)?;
    let mut keystore = KeyStore::new();
    keystore.set_key_entry(identity.alias, identity.key, vec![identity.cert])?;
    SslContexts::custom().load_key_material(&keystore, None).build()
}

/// Client-side context trusting the test CA
pub fn create_client_ssl_context() -> Result<SslContext> {
    SslContexts::custom()
        .load_trust_material(Some(&test_keystore()?), None)
        .build()
}
