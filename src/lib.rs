//! Blocking single-connection client for Redis-compatible cache servers.
//!
//! One [`CacheClient`] owns at most one connection. It dials lazily, sends
//! AUTH when a password is configured, and re-dials once per call after the
//! connection is lost. Values are binary safe.
//!
//! # Example
//!
//! ```no_run
//! use cachelink::CacheClient;
//!
//! let client = CacheClient::new();
//! if !client.configure("127.0.0.1", 6379, None) {
//!     eprintln!("cache unavailable, continuing without it");
//! }
//!
//! client.store(b"session:42", b"\x00\x01payload", 60);
//! if let Some(value) = client.fetch(b"session:42", 1024) {
//!     assert_eq!(value, b"\x00\x01payload");
//! }
//! assert!(client.exists(b"session:42") || !client.is_ready());
//! ```

mod client;
mod error;

pub mod config;
pub mod logging;
pub mod metrics;
pub mod resp;
pub mod transport;

pub use client::CacheClient;
pub use config::{CONNECT_TIMEOUT, Config, ConfigError, ConnectionConfig};
pub use error::ClientError;
pub use transport::{Connector, TcpConnector, Transport};
