//! Per-call execution context
//!
//! `HttpContext` is a scratch map threaded through socket factory calls so
//! collaborators can hand state to each other. Keys are owned by the
//! collaborator that writes them; the well-known ones are constants here.

use std::any::Any;
use std::collections::HashMap;

/// Target host of the connection (`HttpHost`), written by `connect_socket`
pub const TARGET_HOST: &str = "http.target_host";

/// Negotiated TLS session (`SessionInfo`), written after a TLS handshake
pub const SSL_SESSION: &str = "http.ssl.session";

/// String-keyed map of opaque values
#[derive(Default)]
pub struct HttpContext {
    attributes: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl HttpContext {
    pub fn new() -> Self {
        HttpContext {
            attributes: HashMap::new(),
        }
    }

    /// Store a value, replacing any previous value under `name`
    pub fn set_attribute<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.attributes.insert(name.into(), Box::new(value));
    }

    /// Typed lookup; `None` if absent or of another type
    pub fn attribute<T: Any>(&self, name: &str) -> Option<&T> {
        self.attributes.get(name)?.downcast_ref::<T>()
    }

    pub fn attribute_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.attributes.get_mut(name)?.downcast_mut::<T>()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Remove a value, returning it if it had type `T`
    pub fn remove_attribute<T: Any>(&mut self, name: &str) -> Option<T> {
        let value = self.attributes.remove(name)?;
        let value: Box<dyn Any> = value;
        value.downcast::<T>().ok().map(|b| *b)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl std::fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.attributes.keys().collect();
        keys.sort();
        f.debug_struct("HttpContext").field("attributes", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_attributes() {
        let mut context = HttpContext::new();
        assert!(context.is_empty());

        context.set_attribute("count", 3u32);
        context.set_attribute("name", String::from("local"));

        assert_eq!(context.attribute::<u32>("count"), Some(&3));
        assert_eq!(context.attribute::<String>("name").map(|s| s.as_str()), Some("local"));
        assert_eq!(context.attribute::<i64>("count"), None);
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn test_mutate_and_remove() {
        let mut context = HttpContext::new();
        context.set_attribute("count", 1u32);

        *context.attribute_mut::<u32>("count").unwrap() += 1;
        assert_eq!(context.remove_attribute::<u32>("count"), Some(2));
        assert!(!context.contains("count"));
        assert_eq!(context.remove_attribute::<u32>("count"), None);
    }
}
