//! Certificate name extraction
//!
//! Hostname verification needs the subject common names and the subject
//! alternative names of the peer certificate. This module pulls them out of
//! OpenSSL certificates in the form the verifiers compare against.

use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Kind of subject alternative name to extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltNameKind {
    Dns,
    Ip,
}

impl AltNameKind {
    /// IP literals are verified against IP alt names, everything else against DNS names
    pub fn for_host(host: &str) -> Self {
        if is_ip_address(host) {
            AltNameKind::Ip
        } else {
            AltNameKind::Dns
        }
    }
}

/// Summary of a certificate, used for session descriptions and logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Subject common name
    pub subject: String,
    /// Issuer common name
    pub issuer: String,
    /// Subject alternative names, prefixed with `DNS:` or `IP:`
    pub subject_alt_names: Vec<String>,
}

impl CertInfo {
    pub fn from_x509(cert: &X509Ref) -> Self {
        let mut subject_alt_names: Vec<String> = subject_alts(cert, AltNameKind::Dns)
            .into_iter()
            .map(|name| format!("DNS:{}", name))
            .collect();
        subject_alt_names.extend(
            subject_alts(cert, AltNameKind::Ip)
                .into_iter()
                .map(|ip| format!("IP:{}", ip)),
        );

        CertInfo {
            subject: first_cn(cert.subject_name()).unwrap_or_else(|| "<undef>".to_string()),
            issuer: first_cn(cert.issuer_name()).unwrap_or_else(|| "<undef>".to_string()),
            subject_alt_names,
        }
    }
}

fn first_cn(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().to_string().ok())
}

/// All subject common names, in certificate order
pub fn common_names(cert: &X509Ref) -> Vec<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .filter_map(|entry| entry.data().to_string().ok())
        .collect()
}

/// Subject alternative names of the given kind
///
/// IP addresses are rendered in their canonical textual form.
pub fn subject_alts(cert: &X509Ref, kind: AltNameKind) -> Vec<String> {
    let mut names = Vec::new();

    if let Some(san_ext) = cert.subject_alt_names() {
        for name in san_ext.iter() {
            match kind {
                AltNameKind::Dns => {
                    if let Some(dns) = name.dnsname() {
                        names.push(dns.to_string());
                    }
                }
                AltNameKind::Ip => {
                    if let Some(ip) = name.ipaddress().and_then(ip_from_bytes) {
                        names.push(ip.to_string());
                    }
                }
            }
        }
    }

    names
}

fn ip_from_bytes(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => {
            let octets: [u8; 4] = raw.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = raw.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// True if `host` is an IPv4 or IPv6 literal (brackets allowed for IPv6)
pub fn is_ip_address(host: &str) -> bool {
    parse_ip(host).is_some()
}

pub(crate) fn parse_ip(host: &str) -> Option<IpAddr> {
    let trimmed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    trimmed.parse::<IpAddr>().ok()
}

/// Key algorithm name of a certificate's public key
pub fn key_algorithm(cert: &X509Ref) -> &'static str {
    use openssl::pkey::Id;

    match cert.public_key().map(|key| key.id()) {
        Ok(Id::RSA) => "RSA",
        Ok(Id::EC) => "EC",
        Ok(Id::DSA) => "DSA",
        Ok(Id::ED25519) => "Ed25519",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localserver;

    #[test]
    fn test_server_cert_names() {
        let keystore = localserver::server_keystore().unwrap();
        let chain = keystore.certificate_chain("hc-test-server").unwrap();
        let leaf = &chain[0];

        assert_eq!(common_names(leaf), vec!["localhost".to_string()]);
        assert_eq!(subject_alts(leaf, AltNameKind::Dns), vec!["localhost".to_string()]);

        let ips = subject_alts(leaf, AltNameKind::Ip);
        assert!(ips.contains(&"127.0.0.1".to_string()));
        assert!(ips.contains(&"::1".to_string()));
    }

    #[test]
    fn test_common_names_utf8() {
        use openssl::x509::{X509Builder, X509NameBuilder};

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, "bücher.example").unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, "www.example").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        let cert = builder.build();

        assert_eq!(
            common_names(&cert),
            vec!["bücher.example".to_string(), "www.example".to_string()]
        );
        assert_eq!(CertInfo::from_x509(&cert).subject, "bücher.example");
    }

    #[test]
    fn test_cert_info() {
        let keystore = localserver::server_keystore().unwrap();
        let chain = keystore.certificate_chain("hc-test-server").unwrap();
        let info = CertInfo::from_x509(&chain[0]);

        assert_eq!(info.subject, "localhost");
        assert_eq!(info.issuer, "hc-test-ca");
        assert!(info.subject_alt_names.contains(&"DNS:localhost".to_string()));
        assert!(info.subject_alt_names.contains(&"IP:127.0.0.1".to_string()));
    }

    #[test]
    fn test_is_ip_address() {
        assert!(is_ip_address("127.0.0.1"));
        assert!(is_ip_address("::1"));
        assert!(is_ip_address("[::1]"));
        assert!(!is_ip_address("localhost"));
        assert!(!is_ip_address("1.2.3"));
        assert_eq!(AltNameKind::for_host("10.0.0.1"), AltNameKind::Ip);
        assert_eq!(AltNameKind::for_host("example.com"), AltNameKind::Dns);
    }

    #[test]
    fn test_key_algorithm() {
        let keystore = localserver::server_keystore().unwrap();
        let chain = keystore.certificate_chain("hc-test-server").unwrap();
        assert_eq!(key_algorithm(&chain[0]), "EC");
    }
}
