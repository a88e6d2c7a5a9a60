//! Network-facing types and the live transport.

pub mod client;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use client::{HttpTransport, Transport};
pub use types::{Method, Request, Response};
