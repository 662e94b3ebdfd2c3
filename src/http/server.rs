//! Server side of a single HTTP/1.1 connection

use super::session::{PollEvents, SessionOps};
use super::{Error, HttpRequest, HttpResponse, RequestParser, Result};
use std::time::Duration;

/// Receives requests and sends responses over one session
pub struct ServerConnection<S: SessionOps> {
    session: S,
    parser: RequestParser,
    timeout: Option<Duration>,
}

impl<S: SessionOps> ServerConnection<S> {
    pub fn new(session: S) -> Self {
        ServerConnection {
            session,
            parser: RequestParser::new(),
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Set the timeout for each read and write; `None` waits indefinitely
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Receive the next request
    ///
    /// Returns `None` when the peer closes the connection between requests.
    pub fn receive_request(&mut self) -> Result<Option<HttpRequest>> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(request) = self.parser.next_request()? {
                return Ok(Some(request));
            }

            if !self.session.poll(PollEvents::Read, self.timeout)? {
                return Err(Error::Timeout);
            }
            let n = self.session.read(&mut buf)?;
            if n == 0 {
                return if self.parser.buffered() == 0 {
                    Ok(None)
                } else {
                    Err(Error::ConnectionClosed)
                };
            }
            self.parser.feed(&buf[..n]);
        }
    }

    pub fn send_response(&mut self, response: &HttpResponse) -> Result<()> {
        let wire = response.to_wire();
        let mut written = 0;
        while written < wire.len() {
            if !self.session.poll(PollEvents::Write, self.timeout)? {
                return Err(Error::Timeout);
            }
            let n = self.session.write(&wire[written..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            written += n;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    pub fn session(&self) -> &S {
        &self.session
    }
}
