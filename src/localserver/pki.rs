//! Test certificate generation

use crate::conn::ssl::Result;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509Ref, X509};

const VALIDITY_DAYS: u32 = 365;

/// A generated key with its certificate
pub struct TestIdentity {
    pub alias: String,
    pub key: PKey<Private>,
    pub cert: X509,
}

/// A key with a certificate chain, leaf first
pub struct TestChain {
    pub key: PKey<Private>,
    pub chain: Vec<X509>,
}

/// CA, server identity and client identities for local tests
pub struct TestPki {
    pub ca_key: PKey<Private>,
    pub ca_cert: X509,
    pub server: TestIdentity,
    pub clients: Vec<TestIdentity>,
}

#[derive(Clone, Copy)]
enum Usage {
    Server,
    Client,
}

impl TestPki {
    pub fn generate() -> Result<Self> {
        let ca_key = generate_key()?;
        let ca_cert = build_ca(&ca_key, super::CA_ALIAS, None)?;

        let server_key = generate_key()?;
        let server_cert = build_leaf(
            &server_key,
            "localhost",
            Usage::Server,
            Some((&ca_cert, &ca_key)),
        )?;
        let server = TestIdentity {
            alias: super::SERVER_KEY_ALIAS.to_string(),
            key: server_key,
            cert: server_cert,
        };

        let mut clients = Vec::new();
        for alias in super::CLIENT_KEY_ALIASES {
            let key = generate_key()?;
            let cert = build_leaf(&key, alias, Usage::Client, Some((&ca_cert, &ca_key)))?;
            clients.push(TestIdentity {
                alias: alias.to_string(),
                key,
                cert,
            });
        }

        Ok(TestPki {
            ca_key,
            ca_cert,
            server,
            clients,
        })
    }

    /// Client key for `cn` issued by an intermediate CA under the test CA
    ///
    /// The chain is leaf, intermediate, root.
    pub fn issue_with_intermediate(&self, cn: &str) -> Result<TestChain> {
        let intermediate_key = generate_key()?;
        let intermediate = build_ca(
            &intermediate_key,
            &format!("{} intermediate", cn),
            Some((&self.ca_cert, &self.ca_key)),
        )?;

        let key = generate_key()?;
        let leaf = build_leaf(&key, cn, Usage::Client, Some((&intermediate, &intermediate_key)))?;

        Ok(TestChain {
            key,
            chain: vec![leaf, intermediate, self.ca_cert.clone()],
        })
    }
}

/// Server identity for `localhost` whose certificate signs itself
pub fn self_signed_server(alias: &str) -> Result<TestIdentity> {
    let key = generate_key()?;
    let cert = build_leaf(&key, "localhost", Usage::Server, None)?;
    Ok(TestIdentity {
        alias: alias.to_string(),
        key,
        cert,
    })
}

fn generate_key() -> Result<PKey<Private>> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    let ec_key = EcKey::generate(&group)?;
    Ok(PKey::from_ec_key(ec_key)?)
}

fn name(cn: &str) -> Result<X509Name> {
    let mut builder = X509NameBuilder::new()?;
    builder.append_entry_by_nid(Nid::ORGANIZATIONNAME, "hc-ssl test")?;
    builder.append_entry_by_nid(Nid::COMMONNAME, cn)?;
    Ok(builder.build())
}

fn base_builder(key: &PKey<Private>, subject: &X509Name) -> Result<X509Builder> {
    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;

    let serial = {
        let mut serial = BigNum::new()?;
        serial.rand(127, MsbOption::MAYBE_ZERO, false)?;
        serial.to_asn1_integer()?
    };
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(subject)?;
    builder.set_pubkey(key)?;

    let not_before = Asn1Time::days_from_now(0)?;
    builder.set_not_before(&not_before)?;
    let not_after = Asn1Time::days_from_now(VALIDITY_DAYS)?;
    builder.set_not_after(&not_after)?;

    Ok(builder)
}

/// Issuing certificate and key; `None` means self-signed
type Issuer<'a> = Option<(&'a X509Ref, &'a PKey<Private>)>;

fn build_ca(key: &PKey<Private>, cn: &str, issuer: Issuer<'_>) -> Result<X509> {
    let subject = name(cn)?;
    let mut builder = base_builder(key, &subject)?;
    match issuer {
        Some((issuer_cert, _)) => builder.set_issuer_name(issuer_cert.subject_name())?,
        None => builder.set_issuer_name(&subject)?,
    }

    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build()?)?;
    let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(ski)?;

    let signing_key = issuer.map_or(key, |(_, issuer_key)| issuer_key);
    builder.sign(signing_key, MessageDigest::sha256())?;
    Ok(builder.build())
}

fn build_leaf(key: &PKey<Private>, cn: &str, usage: Usage, issuer: Issuer<'_>) -> Result<X509> {
    let subject = name(cn)?;
    let mut builder = base_builder(key, &subject)?;
    let issuer_cert = issuer.map(|(cert, _)| cert);
    match issuer_cert {
        Some(cert) => builder.set_issuer_name(cert.subject_name())?,
        None => builder.set_issuer_name(&subject)?,
    }

    builder.append_extension(BasicConstraints::new().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_agreement()
            .build()?,
    )?;

    let eku = match usage {
        Usage::Server => ExtendedKeyUsage::new().server_auth().build()?,
        Usage::Client => ExtendedKeyUsage::new().client_auth().build()?,
    };
    builder.append_extension(eku)?;

    if let Usage::Server = usage {
        let san = SubjectAlternativeName::new()
            .dns("localhost")
            .ip("127.0.0.1")
            .ip("::1")
            .build(&builder.x509v3_context(issuer_cert, None))?;
        builder.append_extension(san)?;
    }

    let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(issuer_cert, None))?;
    builder.append_extension(ski)?;
    if let Some(cert) = issuer_cert {
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .issuer(false)
            .build(&builder.x509v3_context(Some(cert), None))?;
        builder.append_extension(aki)?;
    }

    let signing_key = issuer.map_or(key, |(_, issuer_key)| issuer_key);
    builder.sign(signing_key, MessageDigest::sha256())?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::stack::Stack;
    use openssl::x509::store::X509StoreBuilder;
    use openssl::x509::X509StoreContext;

    #[test]
    fn test_leaves_chain_to_ca() {
        let pki = TestPki::generate().unwrap();

        let mut store = X509StoreBuilder::new().unwrap();
        store.add_cert(pki.ca_cert.clone()).unwrap();
        let store = store.build();

        let leaves = std::iter::once(&pki.server).chain(pki.clients.iter());
        for identity in leaves {
            let untrusted: Stack<X509> = Stack::new().unwrap();
            let mut ctx = X509StoreContext::new().unwrap();
            let verified = ctx
                .init(&store, &identity.cert, &untrusted, |c| c.verify_cert())
                .unwrap();
            assert!(verified, "{} does not chain to the CA", identity.alias);
        }
    }

    #[test]
    fn test_keys_match_certificates() {
        let pki = TestPki::generate().unwrap();
        assert!(pki.ca_cert.public_key().unwrap().public_eq(&*pki.ca_key));
        assert!(pki.server.cert.public_key().unwrap().public_eq(&*pki.server.key));
        assert_eq!(pki.clients.len(), 2);
    }

    #[test]
    fn test_intermediate_chain_verifies() {
        let pki = TestPki::generate().unwrap();
        let issued = pki.issue_with_intermediate("hc-test-chained").unwrap();
        assert_eq!(issued.chain.len(), 3);

        let mut store = X509StoreBuilder::new().unwrap();
        store.add_cert(pki.ca_cert.clone()).unwrap();
        let store = store.build();

        let mut untrusted: Stack<X509> = Stack::new().unwrap();
        untrusted.push(issued.chain[1].clone()).unwrap();
        let mut ctx = X509StoreContext::new().unwrap();
        let verified = ctx
            .init(&store, &issued.chain[0], &untrusted, |c| c.verify_cert())
            .unwrap();
        assert!(verified);

        // The leaf alone does not reach the root
        let empty: Stack<X509> = Stack::new().unwrap();
        let verified = ctx
            .init(&store, &issued.chain[0], &empty, |c| c.verify_cert())
            .unwrap();
        assert!(!verified);
    }

    #[test]
    fn test_self_signed_server() {
        let identity = self_signed_server("hc-test-self-signed").unwrap();
        assert_eq!(
            identity.cert.subject_name().to_der().unwrap(),
            identity.cert.issuer_name().to_der().unwrap()
        );
        assert!(identity.cert.verify(&identity.key).unwrap());
    }
}
