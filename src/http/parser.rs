//! HTTP message parsing
//!
//! Requests are parsed incrementally from a connection buffer. Bodies are
//! delimited by `Content-Length`; chunked request bodies are rejected.

use super::{Error, Headers, HttpRequest, HttpResponse, Result, MAX_HEAD_SIZE};
use bytes::{Buf, BytesMut};

/// Find the end of a message head (the position after `\r\n\r\n`)
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

/// Parse a request line
///
/// Format: METHOD URI VERSION
pub fn parse_request_line(line: &str) -> Result<(String, String, String)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::Parse(format!(
            "Invalid request line: expected 3 parts, got {}",
            parts.len()
        )));
    }
    if !parts[2].starts_with("HTTP/1.") {
        return Err(Error::Parse(format!("Unsupported version: {}", parts[2])));
    }
    Ok((parts[0].to_string(), parts[1].to_string(), parts[2].to_string()))
}

/// Parse a status line
///
/// Format: VERSION STATUS [REASON]
pub fn parse_status_line(line: &str) -> Result<u16> {
    let mut parts = line.splitn(3, ' ');
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map_err(|_| Error::Parse(format!("Invalid status code: {}", code))),
        _ => Err(Error::Parse(format!("Invalid status line: {}", line))),
    }
}

fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Headers> {
    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeader(line.to_string()))?;
        if name.is_empty() || name.ends_with(' ') {
            return Err(Error::InvalidHeader(line.to_string()));
        }
        headers.insert(name, value.trim())?;
    }
    Ok(headers)
}

fn content_length(headers: &Headers) -> Result<usize> {
    match headers.get("Content-Length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| Error::Parse(format!("Invalid Content-Length: {}", value))),
        None => Ok(0),
    }
}

fn head_str(head: &[u8]) -> Result<&str> {
    std::str::from_utf8(head).map_err(|_| Error::Parse("Message head is not UTF-8".to_string()))
}

/// Incremental HTTP/1.1 request parser
///
/// Bytes are fed as they arrive; `next_request` yields a request once its head
/// and body are complete. Pipelined bytes stay buffered for the next call.
#[derive(Debug, Default)]
pub struct RequestParser {
    buffer: BytesMut,
}

impl RequestParser {
    pub fn new() -> Self {
        RequestParser {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_request(&mut self) -> Result<Option<HttpRequest>> {
        let head_len = match find_head_end(&self.buffer) {
            Some(len) => len,
            None if self.buffer.len() > MAX_HEAD_SIZE => {
                return Err(Error::Protocol(format!(
                    "Request head exceeds {} bytes",
                    MAX_HEAD_SIZE
                )));
            }
            None => return Ok(None),
        };

        let head = head_str(&self.buffer[..head_len])?;
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let (method, uri, version) = parse_request_line(request_line)?;
        let headers = parse_header_lines(lines)?;

        if headers
            .get("Transfer-Encoding")
            .is_some_and(|te| te.eq_ignore_ascii_case("chunked"))
        {
            return Err(Error::Protocol(
                "Chunked request bodies are not supported".to_string(),
            ));
        }
        let body_len = content_length(&headers)?;
        if self.buffer.len() < head_len + body_len {
            return Ok(None);
        }

        self.buffer.advance(head_len);
        let body = self.buffer.split_to(body_len).freeze();
        Ok(Some(HttpRequest::from_parts(method, uri, version, headers, body)))
    }
}

/// Parse a complete response from `buf`
///
/// Returns the response and the number of bytes it occupied, or `None` if
/// more data is needed.
pub fn parse_response(buf: &[u8]) -> Result<Option<(HttpResponse, usize)>> {
    let head_len = match find_head_end(buf) {
        Some(len) => len,
        None => return Ok(None),
    };

    let head = head_str(&buf[..head_len])?;
    let mut lines = head.split("\r\n");
    let status = parse_status_line(lines.next().unwrap_or_default())?;
    let headers = parse_header_lines(lines)?;

    let body_len = content_length(&headers)?;
    if buf.len() < head_len + body_len {
        return Ok(None);
    }

    let mut response = HttpResponse::new(status);
    for (name, value) in headers.iter() {
        response.headers_mut().insert(name, value)?;
    }
    if body_len > 0 {
        let content_type = headers.get("Content-Type").unwrap_or("application/octet-stream");
        response.set_body(buf[head_len..head_len + body_len].to_vec(), content_type);
    }
    Ok(Some((response, head_len + body_len)))
}
