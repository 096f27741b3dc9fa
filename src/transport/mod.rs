//! Transport layer for the DNS proxy.
//!
//! Receives DNS queries from clients over UDP and forwards cache misses to
//! the upstream resolver.

pub mod udp;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dns::Question;
use crate::error::{DecodeError, Error};

/// Structured events for the lifecycle of one query.
#[derive(Debug, Clone, Copy)]
pub struct QueryLogger {
    verbose: bool,
}

impl QueryLogger {
    /// With `verbose`, every answered query is logged at `info` instead of
    /// `debug`.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn cached(&self, question: &Question, client: SocketAddr, elapsed: Duration) {
        if self.verbose {
            info!(domain = %question.name, qtype = question.qtype, %client, total_ms = ms(elapsed), "CACHED");
        } else {
            debug!(domain = %question.name, qtype = question.qtype, %client, total_ms = ms(elapsed), "CACHED");
        }
    }

    pub fn forwarded(
        &self,
        question: Option<&Question>,
        client: SocketAddr,
        rcode: u8,
        total: Duration,
        upstream: Duration,
    ) {
        let domain = domain(question);
        if self.verbose {
            info!(domain, %client, rcode, total_ms = ms(total), upstream_ms = ms(upstream), "FORWARDED");
        } else {
            debug!(domain, %client, rcode, total_ms = ms(total), upstream_ms = ms(upstream), "FORWARDED");
        }
    }

    pub fn coalesced(&self, question: &Question, client: SocketAddr, elapsed: Duration) {
        if self.verbose {
            info!(domain = %question.name, qtype = question.qtype, %client, total_ms = ms(elapsed), "COALESCED");
        } else {
            debug!(domain = %question.name, qtype = question.qtype, %client, total_ms = ms(elapsed), "COALESCED");
        }
    }

    pub fn malformed_query(&self, client: SocketAddr, error: &DecodeError) {
        warn!(%client, %error, "dropping malformed query");
    }

    pub fn partial_response(&self, question: Option<&Question>, error: &DecodeError) {
        warn!(domain = domain(question), %error, "relaying malformed upstream response without caching");
    }

    pub fn bad_response(&self, question: Option<&Question>, error: &DecodeError) {
        warn!(domain = domain(question), %error, "dropping undecodable upstream response");
    }

    pub fn upstream_failed(&self, question: Option<&Question>, client: SocketAddr, error: &Error) {
        warn!(domain = domain(question), %client, %error, "upstream query failed");
    }

    pub fn leader_failed(&self, question: &Question, client: SocketAddr) {
        debug!(domain = %question.name, %client, "dropping query, shared upstream query failed");
    }

    pub fn reply_failed(&self, client: SocketAddr, error: &std::io::Error) {
        warn!(%client, %error, "failed to send reply");
    }
}

fn domain(question: Option<&Question>) -> &str {
    question.map_or("<none>", |q| q.name.as_str())
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
