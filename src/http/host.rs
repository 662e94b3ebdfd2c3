//! Connection target descriptor

use std::fmt;

/// Host, port and scheme of a connection target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HttpHost {
    hostname: String,
    port: u16,
    scheme: String,
}

impl HttpHost {
    pub fn new(hostname: impl Into<String>, port: u16, scheme: impl Into<String>) -> Self {
        HttpHost {
            hostname: hostname.into(),
            port,
            scheme: scheme.into().to_ascii_lowercase(),
        }
    }

    /// Target with the scheme's default port
    pub fn with_default_port(hostname: impl Into<String>, scheme: impl Into<String>) -> Self {
        let scheme = scheme.into();
        let port = match scheme.to_ascii_lowercase().as_str() {
            "https" => 443,
            _ => 80,
        };
        HttpHost::new(hostname, port, scheme)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// `hostname:port`
    pub fn to_host_string(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

impl fmt::Display for HttpHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.to_host_string())
    }
}
