//! HTTP request and response messages

use super::{Headers, CRLF};
use bytes::Bytes;

/// Standard reason phrase for a status code
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// A parsed HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: String,
    uri: String,
    version: String,
    headers: Headers,
    body: Bytes,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        HttpRequest {
            method: method.into(),
            uri: uri.into(),
            version: "HTTP/1.1".to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub(crate) fn from_parts(
        method: String,
        uri: String,
        version: String,
        headers: Headers,
        body: Bytes,
    ) -> Self {
        HttpRequest {
            method,
            uri,
            version,
            headers,
            body,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Request URI without the query string
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or(&self.uri)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the connection stays open after this exchange
    pub fn keep_alive(&self) -> bool {
        match self.headers.get("Connection") {
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version != "HTTP/1.0",
        }
    }

    /// Serialize for sending; `Content-Length` is added for non-empty bodies
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(128 + self.body.len());
        wire.extend_from_slice(
            format!("{} {} {}{}", self.method, self.uri, self.version, CRLF).as_bytes(),
        );
        self.headers.write_to(&mut wire);
        if !self.body.is_empty() && !self.headers.contains("Content-Length") {
            wire.extend_from_slice(format!("Content-Length: {}{}", self.body.len(), CRLF).as_bytes());
        }
        wire.extend_from_slice(CRLF.as_bytes());
        wire.extend_from_slice(&self.body);
        wire
    }
}

/// An HTTP response under construction or ready to send
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    headers: Headers,
    body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        HttpResponse {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn reason(&self) -> &'static str {
        reason_phrase(self.status)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Set the body and its content type
    pub fn set_body(&mut self, body: impl Into<Bytes>, content_type: &str) {
        self.body = body.into();
        self.headers.set("Content-Type", content_type);
    }

    /// Serialize as HTTP/1.1; `Content-Length` always reflects the body
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(128 + self.body.len());
        wire.extend_from_slice(
            format!("HTTP/1.1 {} {}{}", self.status, self.reason(), CRLF).as_bytes(),
        );

        let mut headers = self.headers.clone();
        headers.set("Content-Length", self.body.len().to_string());
        headers.write_to(&mut wire);

        wire.extend_from_slice(CRLF.as_bytes());
        wire.extend_from_slice(&self.body);
        wire
    }
}
