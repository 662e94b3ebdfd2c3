//! HTTP headers handling
//!
//! Headers keep insertion order and compare names case-insensitively.

use super::{Error, Result, CRLF, MAX_HEADERS};
use std::fmt;

/// HTTP headers collection
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers {
            headers: Vec::new(),
        }
    }

    /// Append a header, keeping any existing values with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        if self.headers.len() >= MAX_HEADERS {
            return Err(Error::InvalidHeader(format!(
                "More than {} headers",
                MAX_HEADERS
            )));
        }
        self.headers.push((name.into(), value.into()));
        Ok(())
    }

    /// Replace all values of `name` with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.headers.push((name, value.into()));
    }

    /// First value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Remove all instances of a header, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let initial_len = self.headers.len();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        initial_len - self.headers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Serialize as `Name: value\r\n` lines
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(CRLF.as_bytes());
        }
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{}: {}{}", name, value, CRLF)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain").unwrap();

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_set_replaces() {
        let mut headers = Headers::new();
        headers.insert("Via", "a").unwrap();
        headers.insert("via", "b").unwrap();
        headers.set("VIA", "c");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("via"), Some("c"));
    }

    #[test]
    fn test_header_limit() {
        let mut headers = Headers::new();
        for i in 0..MAX_HEADERS {
            headers.insert(format!("X-{}", i), "v").unwrap();
        }
        assert!(matches!(
            headers.insert("X-Overflow", "v"),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_write_to() {
        let mut headers = Headers::new();
        headers.insert("Server", "TEST/1.1").unwrap();
        headers.insert("Content-Length", "0").unwrap();

        let mut out = Vec::new();
        headers.write_to(&mut out);
        assert_eq!(out, b"Server: TEST/1.1\r\nContent-Length: 0\r\n");
        assert_eq!(headers.to_string().as_bytes(), out.as_slice());
    }
}
