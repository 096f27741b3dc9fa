//! UDP transport for DNS queries.
//!
//! Each inbound datagram is handled on its own task: answered from cache,
//! or forwarded to the upstream over a fresh ephemeral socket that is
//! closed once the reply arrives or the timeout expires. In sequential
//! mode a datagram is fully handled before the next one is read.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{MAX_DNS_PACKET_SIZE, QueryLogger};
use crate::cache::CacheKey;
use crate::dns::{Header, Question, rewrite_id};
use crate::error::{Error, Result};
use crate::inflight::{Follower, Inflight, Role};
use crate::resolver::{QueryAction, Resolver, ResponseAction};

/// Upstream and dispatch settings for the UDP transport.
#[derive(Debug, Clone, Copy)]
pub struct ForwardConfig {
    pub upstream: SocketAddr,
    /// How long to wait for the upstream reply.
    pub timeout: Duration,
    /// Handle one query at a time instead of one task per query.
    pub sequential: bool,
    /// Log every answered query at `info`.
    pub verbose: bool,
}

/// UDP transport for the DNS proxy.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the client-facing socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop on a new task.
    pub fn start(self, config: ForwardConfig, resolver: Arc<Resolver>) -> JoinHandle<()> {
        let ctx = Arc::new(QueryContext {
            socket: self.socket,
            resolver,
            // Nothing can be in flight concurrently when sequential.
            inflight: (!config.sequential).then(Inflight::new),
            log: QueryLogger::new(config.verbose),
            config,
        });

        tokio::spawn(run(ctx))
    }
}

struct QueryContext {
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
    inflight: Option<Inflight>,
    log: QueryLogger,
    config: ForwardConfig,
}

async fn run(ctx: Arc<QueryContext>) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, client) = match ctx.socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "UDP recv error");
                continue;
            }
        };

        let query = buf[..len].to_vec();

        if ctx.config.sequential {
            handle_query(&ctx, &query, client).await;
        } else {
            let ctx = ctx.clone();
            tokio::spawn(async move { handle_query(&ctx, &query, client).await });
        }
    }
}

/// Handle one query from receipt to reply (or drop).
async fn handle_query(ctx: &QueryContext, query: &[u8], client: SocketAddr) {
    let start = Instant::now();
    let stats = ctx.resolver.stats();

    let action = match ctx.resolver.process_query(query) {
        Ok(action) => action,
        Err(e) => {
            ctx.log.malformed_query(client, &e);
            stats.record_dropped();
            return;
        }
    };

    match action {
        QueryAction::Cached { response, question } => {
            if let Err(e) = ctx.socket.send_to(&response, client).await {
                ctx.log.reply_failed(client, &e);
                stats.record_dropped();
                return;
            }
            stats.record_cached(start.elapsed());
            ctx.log.cached(&question, client, start.elapsed());
        }
        QueryAction::Forward { id, question } => {
            forward(ctx, query, id, question, client, start).await;
        }
    }
}

async fn forward(
    ctx: &QueryContext,
    query: &[u8],
    id: u16,
    question: Option<Question>,
    client: SocketAddr,
    start: Instant,
) {
    let stats = ctx.resolver.stats();

    let leader = match (&question, &ctx.inflight) {
        (Some(q), Some(inflight)) => match inflight.join(&CacheKey::from(q)) {
            Role::Leader(guard) => Some(guard),
            Role::Follower(follower) => {
                return follow(ctx, follower, id, q, client, start).await;
            }
        },
        _ => None,
    };

    let upstream_start = Instant::now();
    let response =
        match forward_to_upstream(query, ctx.config.upstream, ctx.config.timeout).await {
            Ok(r) => r,
            Err(e) => {
                ctx.log.upstream_failed(question.as_ref(), client, &e);
                match e {
                    Error::UpstreamTimeout { .. } => stats.record_timeout(),
                    _ => stats.record_dropped(),
                }
                return;
            }
        };
    let upstream_elapsed = upstream_start.elapsed();

    let action = ctx.resolver.process_response(&response);
    match &action {
        ResponseAction::Cached { key, ttl } => {
            debug!(domain = %key.name, qtype = key.qtype, ttl_secs = ttl.as_secs(), "cached response");
        }
        ResponseAction::Relay => {
            debug!(domain = question.as_ref().map_or("<none>", |q| q.name.as_str()), "response not cacheable");
        }
        ResponseAction::Partial(e) => ctx.log.partial_response(question.as_ref(), e),
        ResponseAction::Drop(e) => ctx.log.bad_response(question.as_ref(), e),
    }
    if !action.relays() {
        stats.record_dropped();
        return;
    }

    if let Some(guard) = leader {
        guard.complete(&response);
    }

    if let Err(e) = ctx.socket.send_to(&response, client).await {
        ctx.log.reply_failed(client, &e);
        stats.record_dropped();
        return;
    }

    // Relayed replies always carry a full header.
    let rcode = Header::decode(&response).map_or(0, |h| h.rcode());
    stats.record_forwarded(start.elapsed());
    ctx.log.forwarded(
        question.as_ref(),
        client,
        rcode,
        start.elapsed(),
        upstream_elapsed,
    );
}

/// Wait for the leader's reply and send it under this query's ID.
async fn follow(
    ctx: &QueryContext,
    follower: Follower,
    id: u16,
    question: &Question,
    client: SocketAddr,
    start: Instant,
) {
    let stats = ctx.resolver.stats();

    let Some(reply) = follower.wait().await.and_then(|r| rewrite_id(&r, id)) else {
        ctx.log.leader_failed(question, client);
        stats.record_dropped();
        return;
    };

    if let Err(e) = ctx.socket.send_to(&reply, client).await {
        ctx.log.reply_failed(client, &e);
        stats.record_dropped();
        return;
    }

    stats.record_coalesced(start.elapsed());
    ctx.log.coalesced(question, client, start.elapsed());
}

/// Send `query` to the upstream server and wait up to `timeout` for the
/// reply.
///
/// Uses a fresh ephemeral socket connected to the upstream, so datagrams
/// from any other source are ignored. The socket is closed on return.
pub async fn forward_to_upstream(
    query: &[u8],
    upstream: SocketAddr,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let local: SocketAddr = if upstream.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(upstream).await?;
    socket.send(query).await?;

    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
    let len = tokio::time::timeout(timeout, socket.recv(&mut buf))
        .await
        .map_err(|_| Error::UpstreamTimeout { upstream, timeout })??;

    buf.truncate(len);

    Ok(buf)
}
