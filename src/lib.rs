//! Waypoint - A caching DNS forwarding proxy.
//!
//! Queries arrive over UDP, are answered from a TTL-bounded cache when
//! possible, and are otherwise relayed to an upstream resolver whose answer
//! is cached and sent back under the client's transaction ID.

pub mod cache;
pub mod dns;
pub mod error;
pub mod inflight;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
