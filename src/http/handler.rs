//! Request handlers and their URI pattern registry

use super::{HttpContext, HttpRequest, HttpResponse, Result};
use std::sync::Arc;

/// Produces the response for a request
///
/// The response arrives with status 200 and no body; the server adds the
/// `Server` and `Content-Length` headers after the handler returns.
pub trait HttpRequestHandler: Send + Sync {
    fn handle(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        context: &mut HttpContext,
    ) -> Result<()>;
}

impl<F> HttpRequestHandler for F
where
    F: Fn(&HttpRequest, &mut HttpResponse, &mut HttpContext) -> Result<()> + Send + Sync,
{
    fn handle(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        context: &mut HttpContext,
    ) -> Result<()> {
        self(request, response, context)
    }
}

/// Echoes the request body back
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl HttpRequestHandler for EchoHandler {
    fn handle(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        _context: &mut HttpContext,
    ) -> Result<()> {
        let content_type = request
            .headers()
            .get("Content-Type")
            .filter(|_| !request.body().is_empty())
            .unwrap_or("text/plain")
            .to_string();
        response.set_status(200);
        response.set_body(request.body().to_vec(), &content_type);
        Ok(())
    }
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        true
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        path.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        path.ends_with(suffix)
    } else {
        pattern == path
    }
}

/// Maps request paths to handlers
///
/// Patterns are `*`, `prefix*`, `*suffix` or an exact path. An exact match
/// wins; otherwise the longest matching pattern is used.
#[derive(Clone, Default)]
pub struct HandlerMapper {
    handlers: Vec<(String, Arc<dyn HttpRequestHandler>)>,
}

impl HandlerMapper {
    pub fn new() -> Self {
        HandlerMapper {
            handlers: Vec::new(),
        }
    }

    /// Register a handler, replacing any handler with the same pattern
    pub fn register(&mut self, pattern: impl Into<String>, handler: Arc<dyn HttpRequestHandler>) {
        let pattern = pattern.into();
        self.handlers.retain(|(p, _)| *p != pattern);
        self.handlers.push((pattern, handler));
    }

    pub fn lookup(&self, path: &str) -> Option<&Arc<dyn HttpRequestHandler>> {
        if let Some((_, handler)) = self.handlers.iter().find(|(p, _)| p == path) {
            return Some(handler);
        }
        self.handlers
            .iter()
            .filter(|(p, _)| matches_pattern(p, path))
            .max_by_key(|(p, _)| p.len())
            .map(|(_, handler)| handler)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
