//! DNS proxy orchestration.
//!
//! Binds the transport and runs the proxy server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::cache::ResponseCache;
use crate::error::{Error, Result};
use crate::resolver::Resolver;
use crate::transport::udp::{ForwardConfig, UdpTransport};

pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_PORT: u16 = 1053;
pub const DEFAULT_UPSTREAM: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the DNS proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to bind (e.g., 127.0.0.1:1053)
    pub bind_addr: SocketAddr,
    /// Upstream resolver that cache misses are forwarded to
    pub upstream: SocketAddr,
    /// How long to wait for the upstream before dropping a query
    pub timeout: Duration,
    /// Handle one query at a time instead of one task per query
    pub sequential: bool,
    /// How often to log statistics; `None` disables the report
    pub stats_interval: Option<Duration>,
    /// Log every answered query at `info`
    pub verbose: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(DEFAULT_BIND, DEFAULT_PORT),
            upstream: DEFAULT_UPSTREAM,
            timeout: DEFAULT_TIMEOUT,
            sequential: false,
            stats_interval: Some(DEFAULT_STATS_INTERVAL),
            verbose: false,
        }
    }
}

/// Parse an upstream as `ip:port`, or a bare `ip` on port 53.
pub fn parse_upstream(s: &str) -> Result<SocketAddr> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| Error::Config(format!("invalid upstream address `{s}`")))
}

/// Run the DNS proxy with the given configuration.
///
/// Binds the UDP transport and forwards cache misses to the upstream.
/// Runs until the receive loop stops.
pub async fn run(config: ProxyConfig) -> Result<()> {
    let cache = Arc::new(ResponseCache::new());
    let resolver = Arc::new(Resolver::new(cache));

    let udp = UdpTransport::bind(config.bind_addr).await.map_err(|e| {
        Error::Config(format!("failed to bind {}: {}", config.bind_addr, e))
    })?;

    info!(
        bind = %config.bind_addr,
        upstream = %config.upstream,
        timeout_ms = config.timeout.as_millis() as u64,
        sequential = config.sequential,
        "DNS proxy listening"
    );

    let handle = udp.start(
        ForwardConfig {
            upstream: config.upstream,
            timeout: config.timeout,
            sequential: config.sequential,
            verbose: config.verbose,
        },
        resolver.clone(),
    );

    if let Some(period) = config.stats_interval.filter(|p| !p.is_zero()) {
        tokio::spawn(report_stats(resolver, period));
    }

    if let Err(e) = handle.await {
        error!(error = %e, "UDP transport task failed");
    }

    Ok(())
}

async fn report_stats(resolver: Arc<Resolver>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        let stats = resolver.stats_snapshot_and_reset();
        info!(
            uptime_secs = stats.uptime_secs,
            cache = resolver.cache_len(),
            requests = stats.requests,
            cached = stats.cached,
            forwarded = stats.forwarded,
            coalesced = stats.coalesced,
            dropped = stats.dropped,
            timeouts = stats.timeouts,
            avg_response_ms = stats.avg_response_ms,
            "stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_upstream_accepts_ip_and_port() {
        assert_eq!(
            parse_upstream("1.1.1.1:5353").unwrap(),
            "1.1.1.1:5353".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_upstream("[2001:4860:4860::8888]:53").unwrap(),
            "[2001:4860:4860::8888]:53".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn parse_upstream_defaults_port_53() {
        assert_eq!(parse_upstream("9.9.9.9").unwrap(), "9.9.9.9:53".parse::<SocketAddr>().unwrap());
        assert_eq!(parse_upstream("::1").unwrap(), "[::1]:53".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn parse_upstream_rejects_garbage() {
        assert!(matches!(parse_upstream("dns.google"), Err(Error::Config(_))));
    }

    #[test]
    fn default_config_matches_reference_behavior() {
        let config = ProxyConfig::default();

        assert_eq!(config.bind_addr, "127.0.0.1:1053".parse::<SocketAddr>().unwrap());
        assert_eq!(config.upstream, "8.8.8.8:53".parse::<SocketAddr>().unwrap());
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.sequential);
    }
}
