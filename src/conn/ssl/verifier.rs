//! Hostname verification
//!
//! After the handshake the connection socket factory checks that the peer
//! certificate was issued for the host it meant to reach. A
//! `HostnameVerifier` exposes one operation per kind of evidence; the
//! built-in verifiers only implement name matching and inherit the rest.

use super::cert::{self, AltNameKind};
use super::socket::{SessionInfo, TlsSocket};
use super::{Result, SslError};
use openssl::x509::X509Ref;
use std::io;

/// Second-level domains that may not be wildcarded under a two-letter country code
const BAD_COUNTRY_2LDS: &[&str] = &[
    "ac", "co", "com", "ed", "edu", "go", "gouv", "gov", "info", "lg", "ne", "net", "or", "org",
];

/// Checks that a peer certificate matches the target host
pub trait HostnameVerifier: Send + Sync {
    /// Match `host` against the certificate's common names and subject alternative names
    fn verify_names(&self, host: &str, cns: &[String], subject_alts: &[String]) -> Result<()>;

    /// Match `host` against a certificate
    fn verify_certificate(&self, host: &str, cert: &X509Ref) -> Result<()> {
        let cns = cert::common_names(cert);
        let subject_alts = cert::subject_alts(cert, AltNameKind::for_host(host));
        self.verify_names(host, &cns, &subject_alts)
    }

    /// Match `host` against the peer of an established TLS connection
    ///
    /// This is the check `SslConnectionSocketFactory` runs after every handshake.
    fn verify_socket(&self, host: &str, socket: &TlsSocket) -> io::Result<()> {
        let peer = socket.peer_certificate().ok_or_else(|| {
            io::Error::other(SslError::PeerUnverified(format!(
                "No peer certificate presented by {}",
                host
            )))
        })?;
        self.verify_certificate(host, &peer).map_err(io::Error::other)
    }

    /// Non-failing variant over a negotiated session
    fn verify_session(&self, host: &str, session: &SessionInfo) -> bool {
        match session.peer_certificates().first() {
            Some(peer) => self.verify_certificate(host, peer).is_ok(),
            None => false,
        }
    }
}

/// Accepts any host
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllHostnameVerifier;

impl HostnameVerifier for AllowAllHostnameVerifier {
    fn verify_names(&self, _host: &str, _cns: &[String], _subject_alts: &[String]) -> Result<()> {
        Ok(())
    }

    fn verify_socket(&self, _host: &str, _socket: &TlsSocket) -> io::Result<()> {
        Ok(())
    }
}

/// Browser-style matching: `*.foo.com` matches any number of leading labels
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserCompatHostnameVerifier;

impl HostnameVerifier for BrowserCompatHostnameVerifier {
    fn verify_names(&self, host: &str, cns: &[String], subject_alts: &[String]) -> Result<()> {
        verify_names(host, cns, subject_alts, false)
    }
}

impl std::fmt::Display for BrowserCompatHostnameVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BROWSER_COMPATIBLE")
    }
}

/// Strict matching: a wildcard stands for exactly one label
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictHostnameVerifier;

impl HostnameVerifier for StrictHostnameVerifier {
    fn verify_names(&self, host: &str, cns: &[String], subject_alts: &[String]) -> Result<()> {
        verify_names(host, cns, subject_alts, true)
    }
}

impl std::fmt::Display for StrictHostnameVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("STRICT")
    }
}

fn verify_names(host: &str, cns: &[String], subject_alts: &[String], strict: bool) -> Result<()> {
    let mut names: Vec<&str> = Vec::new();
    if let Some(cn) = cns.first() {
        names.push(cn);
    }
    names.extend(subject_alts.iter().map(|s| s.as_str()));

    if names.is_empty() {
        return Err(SslError::HostnameMismatch(format!(
            "Certificate for <{}> doesn't contain CN or DNS subjectAlt",
            host
        )));
    }

    let normalized_host = host.trim().to_ascii_lowercase();
    if names
        .iter()
        .any(|name| match_identity(&normalized_host, &name.trim().to_ascii_lowercase(), strict))
    {
        return Ok(());
    }

    Err(SslError::HostnameMismatch(format!(
        "hostname in certificate didn't match: <{}> != <{}>",
        host,
        names.join("> OR <")
    )))
}

fn match_identity(host: &str, name: &str, strict: bool) -> bool {
    if let (Some(host_ip), Some(name_ip)) = (cert::parse_ip(host), cert::parse_ip(name)) {
        return host_ip == name_ip;
    }

    let parts: Vec<&str> = name.split('.').collect();
    let wildcard = parts.len() >= 3
        && parts[0].ends_with('*')
        && valid_country_wildcard(&parts)
        && !cert::is_ip_address(host);

    if !wildcard {
        return host == name;
    }

    let first = parts[0];
    let matched = if first.len() > 1 {
        let prefix = &first[..first.len() - 1];
        let suffix = &name[first.len()..];
        host.starts_with(prefix) && host[prefix.len()..].ends_with(suffix)
    } else {
        host.ends_with(&name[1..])
    };

    matched && (!strict || count_dots(host) == count_dots(name))
}

fn valid_country_wildcard(parts: &[&str]) -> bool {
    if parts.len() != 3 || parts[2].len() != 2 {
        return true;
    }
    !BAD_COUNTRY_2LDS.contains(&parts[1])
}

fn count_dots(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'.').count()
}
