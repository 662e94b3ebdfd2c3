//! hc-ssl - TLS connection socket factories for an HTTP client
//!
//! This crate provides the client-side connection layer of an HTTP client:
//! plain and TLS socket factories, TLS context builders with pluggable trust
//! and private-key strategies, hostname verifiers, and a small local HTTP/1.1
//! server used to exercise them.

pub mod conn;
pub mod http;
pub mod localserver;
