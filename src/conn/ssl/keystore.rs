//! In-memory key store
//!
//! A key store maps aliases to either a private key with its certificate
//! chain, or a single trusted certificate. It is the source of both trust
//! material and key material for `SslContextBuilder`.

use super::{Result, SslError};
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A single key store entry
#[derive(Clone)]
pub enum KeyStoreEntry {
    /// Private key and its certificate chain (leaf first)
    PrivateKey {
        key: PKey<Private>,
        chain: Vec<X509>,
    },
    /// Certificate trusted as an anchor
    TrustedCertificate(X509),
}

/// Alias-indexed collection of keys and certificates
///
/// Aliases are kept sorted so iteration order is stable.
#[derive(Clone, Default)]
pub struct KeyStore {
    entries: BTreeMap<String, KeyStoreEntry>,
}

impl KeyStore {
    pub fn new() -> Self {
        KeyStore {
            entries: BTreeMap::new(),
        }
    }

    /// Store a private key with its certificate chain
    pub fn set_key_entry(
        &mut self,
        alias: impl Into<String>,
        key: PKey<Private>,
        chain: Vec<X509>,
    ) -> Result<()> {
        let alias = alias.into();
        let leaf = chain.first().ok_or_else(|| {
            SslError::Certificate(format!("Key entry '{}' has an empty certificate chain", alias))
        })?;

        if !leaf.public_key()?.public_eq(&*key) {
            return Err(SslError::Certificate(format!(
                "Private key for '{}' does not match its certificate",
                alias
            )));
        }

        self.entries
            .insert(alias, KeyStoreEntry::PrivateKey { key, chain });
        Ok(())
    }

    /// Store a trusted certificate
    pub fn set_certificate_entry(&mut self, alias: impl Into<String>, cert: X509) {
        self.entries
            .insert(alias.into(), KeyStoreEntry::TrustedCertificate(cert));
    }

    /// Load a key entry from a PEM bundle holding the certificate chain and the private key
    pub fn load_pem(&mut self, alias: impl Into<String>, pem: &[u8]) -> Result<()> {
        let chain = X509::stack_from_pem(pem)
            .map_err(|e| SslError::Certificate(format!("Failed to load certificate: {}", e)))?;
        let key = PKey::private_key_from_pem(pem)
            .map_err(|e| SslError::Certificate(format!("Failed to load private key: {}", e)))?;

        self.set_key_entry(alias, key, chain)
    }

    /// Load a key entry from a PEM file
    pub fn load_pem_file<P: AsRef<Path>>(&mut self, alias: impl Into<String>, path: P) -> Result<()> {
        let mut pem = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut pem)?;
        self.load_pem(alias, &pem)
    }

    /// Load a trusted certificate from a PEM file
    pub fn load_certificate_file<P: AsRef<Path>>(
        &mut self,
        alias: impl Into<String>,
        path: P,
    ) -> Result<()> {
        let mut pem = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut pem)?;
        let cert = X509::from_pem(&pem)
            .map_err(|e| SslError::Certificate(format!("Failed to load certificate: {}", e)))?;
        self.set_certificate_entry(alias, cert);
        Ok(())
    }

    pub fn entry(&self, alias: &str) -> Option<&KeyStoreEntry> {
        self.entries.get(alias)
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if the alias names a private key entry
    pub fn is_key_entry(&self, alias: &str) -> bool {
        matches!(self.entries.get(alias), Some(KeyStoreEntry::PrivateKey { .. }))
    }

    /// Certificate chain stored under `alias`
    ///
    /// For trusted certificate entries this is a chain of one.
    pub fn certificate_chain(&self, alias: &str) -> Option<Vec<X509>> {
        match self.entries.get(alias)? {
            KeyStoreEntry::PrivateKey { chain, .. } => Some(chain.clone()),
            KeyStoreEntry::TrustedCertificate(cert) => Some(vec![cert.clone()]),
        }
    }

    /// Private key entries as (alias, key, chain)
    pub fn key_entries(&self) -> impl Iterator<Item = (&str, &PKey<Private>, &[X509])> {
        self.entries.iter().filter_map(|(alias, entry)| match entry {
            KeyStoreEntry::PrivateKey { key, chain } => {
                Some((alias.as_str(), key, chain.as_slice()))
            }
            KeyStoreEntry::TrustedCertificate(_) => None,
        })
    }

    /// Certificates usable as trust anchors
    ///
    /// Trusted certificate entries plus the leaf certificate of every key entry.
    pub fn trust_anchors(&self) -> Vec<X509> {
        self.entries
            .values()
            .filter_map(|entry| match entry {
                KeyStoreEntry::TrustedCertificate(cert) => Some(cert.clone()),
                KeyStoreEntry::PrivateKey { chain, .. } => chain.first().cloned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localserver;
    use std::io::Write;

    #[test]
    fn test_test_keystore_aliases() {
        let keystore = localserver::test_keystore().unwrap();
        let aliases: Vec<&str> = keystore.aliases().collect();

        assert_eq!(aliases, vec!["hc-test-ca", "hc-test-key-1", "hc-test-key-2"]);
        assert!(keystore.is_key_entry("hc-test-key-1"));
        assert!(keystore.is_key_entry("hc-test-key-2"));
        assert!(!keystore.is_key_entry("hc-test-ca"));
        assert_eq!(keystore.key_entries().count(), 2);
        assert_eq!(keystore.trust_anchors().len(), 3);
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let keystore = localserver::test_keystore().unwrap();
        let server = localserver::server_keystore().unwrap();

        let (_, key, _) = keystore.key_entries().next().unwrap();
        let chain = server.certificate_chain("hc-test-server").unwrap();

        let mut store = KeyStore::new();
        let result = store.set_key_entry("broken", key.clone(), chain);
        assert!(matches!(result, Err(SslError::Certificate(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_chain_rejected() {
        let keystore = localserver::test_keystore().unwrap();
        let (_, key, _) = keystore.key_entries().next().unwrap();

        let mut store = KeyStore::new();
        assert!(store.set_key_entry("empty", key.clone(), Vec::new()).is_err());
    }

    #[test]
    fn test_load_pem_file() {
        let keystore = localserver::server_keystore().unwrap();
        let (_, key, chain) = keystore.key_entries().next().unwrap();

        let mut pem = chain[0].to_pem().unwrap();
        pem.extend_from_slice(&key.private_key_to_pem_pkcs8().unwrap());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&pem).unwrap();
        file.flush().unwrap();

        let mut store = KeyStore::new();
        store.load_pem_file("server", file.path()).unwrap();

        assert!(store.is_key_entry("server"));
        assert_eq!(store.certificate_chain("server").unwrap().len(), 1);
    }

    #[test]
    fn test_load_certificate_file() {
        let keystore = localserver::test_keystore().unwrap();
        let ca = keystore.certificate_chain("hc-test-ca").unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&ca[0].to_pem().unwrap()).unwrap();
        file.flush().unwrap();

        let mut store = KeyStore::new();
        store.load_certificate_file("ca", file.path()).unwrap();

        assert!(store.contains_alias("ca"));
        assert!(!store.is_key_entry("ca"));
    }

    #[test]
    fn test_load_missing_file() {
        let mut store = KeyStore::new();
        let result = store.load_pem_file("missing", "/nonexistent/hc-ssl/key.pem");
        assert!(matches!(result, Err(SslError::Io(_))));
    }
}
