//! Trust and private-key strategies
//!
//! Strategies are single-operation hooks installed on an `SslContext`:
//! a `TrustStrategy` may accept a peer chain that standard verification
//! rejects, and a `PrivateKeyStrategy` picks which client key to present.

use super::Result;
use openssl::x509::X509;
use std::collections::HashMap;
use std::net::TcpStream;

/// Decides whether a certificate chain is trusted without consulting the trust store
pub trait TrustStrategy: Send + Sync {
    /// Returns `true` to accept `chain` outright, `false` to leave the
    /// decision to standard verification.
    ///
    /// `chain` is leaf first. `auth_type` is the key algorithm of the leaf.
    fn is_trusted(&self, chain: &[X509], auth_type: &str) -> Result<bool>;
}

/// Trusts self-signed certificates, i.e. chains of exactly one certificate
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustSelfSignedStrategy;

impl TrustStrategy for TrustSelfSignedStrategy {
    fn is_trusted(&self, chain: &[X509], _auth_type: &str) -> Result<bool> {
        Ok(chain.len() == 1)
    }
}

/// Trusts every chain
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustAllStrategy;

impl TrustStrategy for TrustAllStrategy {
    fn is_trusted(&self, _chain: &[X509], _auth_type: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Key entry details offered to a `PrivateKeyStrategy`
#[derive(Clone)]
pub struct PrivateKeyDetails {
    key_type: String,
    cert_chain: Vec<X509>,
}

impl PrivateKeyDetails {
    pub fn new(key_type: impl Into<String>, cert_chain: Vec<X509>) -> Self {
        PrivateKeyDetails {
            key_type: key_type.into(),
            cert_chain,
        }
    }

    /// Key algorithm, e.g. "RSA" or "EC"
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn cert_chain(&self) -> &[X509] {
        &self.cert_chain
    }
}

impl std::fmt::Debug for PrivateKeyDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} cert(s)", self.key_type, self.cert_chain.len())
    }
}

/// Chooses the key alias presented for client authentication
pub trait PrivateKeyStrategy: Send + Sync {
    /// Pick one of `aliases` for the connection on `socket`.
    ///
    /// Returning `None` presents no client certificate.
    fn choose_alias(
        &self,
        aliases: &HashMap<String, PrivateKeyDetails>,
        socket: &TcpStream,
    ) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localserver;

    #[test]
    fn test_trust_self_signed() {
        let keystore = localserver::test_keystore().unwrap();
        let ca = keystore.certificate_chain("hc-test-ca").unwrap();
        let server = localserver::server_keystore().unwrap();
        let mut chain = server.certificate_chain("hc-test-server").unwrap();

        assert!(TrustSelfSignedStrategy.is_trusted(&ca, "EC").unwrap());

        chain.extend(ca);
        assert!(!TrustSelfSignedStrategy.is_trusted(&chain, "EC").unwrap());
        assert!(TrustAllStrategy.is_trusted(&chain, "EC").unwrap());
    }

    #[test]
    fn test_private_key_details() {
        let keystore = localserver::test_keystore().unwrap();
        let chain = keystore.certificate_chain("hc-test-key-1").unwrap();
        let details = PrivateKeyDetails::new("EC", chain);

        assert_eq!(details.key_type(), "EC");
        assert_eq!(details.cert_chain().len(), 1);
        assert_eq!(format!("{:?}", details), "EC:1 cert(s)");
    }
}
