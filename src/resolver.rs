//! DNS query resolution logic.
//!
//! Handles the decisions of the forwarding pipeline:
//! 1. Decode the query and look up its first question in the cache
//! 2. Decide whether to answer from cache or forward upstream
//! 3. Decode upstream responses and decide whether to cache them
//!
//! Transports handle the actual I/O, resolver handles decisions.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheKey, ResponseCache};
use crate::dns::{HEADER_LEN, Message, Question, rewrite_id};
use crate::error::DecodeError;
use crate::stats::{Stats, StatsSnapshot};

/// Action to take for a DNS query.
#[derive(Debug)]
pub enum QueryAction {
    /// Cache hit; `response` already carries the query's transaction ID.
    Cached {
        response: Vec<u8>,
        question: Question,
    },
    /// Query should be forwarded to upstream unmodified.
    Forward {
        id: u16,
        /// First question of the query, if it had one.
        question: Option<Question>,
    },
}

/// Action to take for an upstream response.
#[derive(Debug)]
pub enum ResponseAction {
    /// Relay to the client. The response was stored under `key`.
    Cached { key: CacheKey, ttl: Duration },
    /// Relay to the client. Nothing to cache (no question or no answer).
    Relay,
    /// Relay to the client without caching. The header decoded but the
    /// record sections did not.
    Partial(DecodeError),
    /// Too short to be a DNS message; nothing is sent.
    Drop(DecodeError),
}

impl ResponseAction {
    /// Whether the response bytes should go back to the client.
    pub fn relays(&self) -> bool {
        !matches!(self, ResponseAction::Drop(_))
    }
}

/// Resolver handles DNS query processing decisions.
///
/// Contains all shared logic between transports: decoding, caching
/// decisions and statistics. Transports call this to decide what to do with
/// queries and upstream responses.
pub struct Resolver {
    cache: Arc<ResponseCache>,
    stats: Stats,
}

impl Resolver {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self {
            cache,
            stats: Stats::new(),
        }
    }

    /// Process a DNS query and decide what action to take.
    ///
    /// Fails if the header or question section is malformed, in which case
    /// the query should be dropped.
    pub fn process_query(&self, query: &[u8]) -> Result<QueryAction, DecodeError> {
        let (header, mut questions) = Message::decode_query(query)?;

        if questions.is_empty() {
            return Ok(QueryAction::Forward {
                id: header.id,
                question: None,
            });
        }
        let question = questions.swap_remove(0);

        let cached = self
            .cache
            .lookup(&CacheKey::from(&question))
            .and_then(|cached| rewrite_id(&cached, header.id));

        Ok(match cached {
            Some(response) => QueryAction::Cached { response, question },
            None => QueryAction::Forward {
                id: header.id,
                question: Some(question),
            },
        })
    }

    /// Called when we receive a response from upstream.
    ///
    /// Responses with at least one question and one answer are cached under
    /// their own first question.
    pub fn process_response(&self, response: &[u8]) -> ResponseAction {
        let message = match Message::decode(response) {
            Ok(message) => message,
            Err(e) if response.len() >= HEADER_LEN => return ResponseAction::Partial(e),
            Err(e) => return ResponseAction::Drop(e),
        };

        for answer in &message.answers {
            debug!(%answer, "upstream answer");
        }

        match message.first_question() {
            Some(question) if !message.answers.is_empty() => {
                let key = CacheKey::from(question);
                let ttl = self.cache.store(key.clone(), response, &message.answers);
                ResponseAction::Cached { key, ttl }
            }
            _ => ResponseAction::Relay,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::dns::{Answer, CLASS_IN, Header, TYPE_A};

    fn query(id: u16, name: &str) -> Vec<u8> {
        Message {
            header: Header {
                id,
                flags: 0x0100,
                ..Header::default()
            },
            questions: vec![Question::new(name, TYPE_A, CLASS_IN)],
            answers: vec![],
        }
        .to_bytes()
        .unwrap()
    }

    fn response(id: u16, name: &str, ttls: &[u32]) -> Vec<u8> {
        Message {
            header: Header {
                id,
                flags: 0x8180,
                ..Header::default()
            },
            questions: vec![Question::new(name, TYPE_A, CLASS_IN)],
            answers: ttls
                .iter()
                .map(|&ttl| Answer {
                    name: name.to_string(),
                    rtype: TYPE_A,
                    class: CLASS_IN,
                    ttl,
                    rdata: vec![93, 184, 216, 34],
                })
                .collect(),
        }
        .to_bytes()
        .unwrap()
    }

    fn resolver() -> (Arc<ManualClock>, Resolver) {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(ResponseCache::with_clock(clock.clone()));
        (clock, Resolver::new(cache))
    }

    #[test]
    fn miss_forwards_with_first_question() {
        let (_, resolver) = resolver();

        let action = resolver.process_query(&query(0x0001, "example.com")).unwrap();

        let QueryAction::Forward { id, question } = action else {
            panic!("expected forward, got {action:?}");
        };
        assert_eq!(id, 0x0001);
        assert_eq!(question, Some(Question::new("example.com", TYPE_A, CLASS_IN)));
    }

    #[test]
    fn hit_rewrites_transaction_id() {
        let (_, resolver) = resolver();
        let upstream = response(0x1234, "example.com", &[300]);
        resolver.process_response(&upstream);

        let action = resolver.process_query(&query(0xABCD, "example.com")).unwrap();

        let QueryAction::Cached { response, question } = action else {
            panic!("expected cache hit, got {action:?}");
        };
        assert_eq!(question.name, "example.com");
        assert_eq!(&response[..2], &[0xAB, 0xCD]);
        assert_eq!(&response[2..], &upstream[2..]);
    }

    #[test]
    fn expired_entry_forwards_again() {
        let (clock, resolver) = resolver();
        resolver.process_response(&response(1, "example.com", &[30, 300, 10]));

        clock.advance(Duration::from_secs(10));

        assert!(matches!(
            resolver.process_query(&query(2, "example.com")),
            Ok(QueryAction::Forward { .. })
        ));
        assert_eq!(resolver.cache_len(), 0);
    }

    #[test]
    fn query_without_question_skips_cache() {
        let (_, resolver) = resolver();
        let mut bytes = Vec::new();
        Header {
            id: 9,
            ..Header::default()
        }
        .encode(&mut bytes);

        let action = resolver.process_query(&bytes).unwrap();

        assert!(matches!(
            action,
            QueryAction::Forward {
                id: 9,
                question: None
            }
        ));
    }

    #[test]
    fn malformed_query_is_rejected() {
        let (_, resolver) = resolver();
        let mut bytes = query(1, "example.com");
        bytes.truncate(bytes.len() - 3);

        assert!(resolver.process_query(&bytes).is_err());
        assert!(resolver.process_query(&[0u8; 5]).is_err());
    }

    #[test]
    fn response_with_answers_is_cached_with_min_ttl() {
        let (_, resolver) = resolver();

        let action = resolver.process_response(&response(1, "example.com", &[30, 300, 10]));

        let ResponseAction::Cached { key, ttl } = action else {
            panic!("expected cached, got {action:?}");
        };
        assert_eq!(key, CacheKey::new("example.com", TYPE_A, CLASS_IN));
        assert_eq!(ttl, Duration::from_secs(10));
        assert_eq!(resolver.cache_len(), 1);
    }

    #[test]
    fn response_without_answers_is_relayed_uncached() {
        let (_, resolver) = resolver();

        let action = resolver.process_response(&response(1, "nxdomain.example", &[]));

        assert!(matches!(action, ResponseAction::Relay));
        assert!(action.relays());
        assert_eq!(resolver.cache_len(), 0);
    }

    #[test]
    fn partial_response_is_relayed_uncached() {
        let (_, resolver) = resolver();
        let mut bytes = response(1, "example.com", &[300]);
        bytes.truncate(bytes.len() - 2);

        let action = resolver.process_response(&bytes);

        assert!(matches!(action, ResponseAction::Partial(_)));
        assert!(action.relays());
        assert_eq!(resolver.cache_len(), 0);
    }

    #[test]
    fn short_response_is_dropped() {
        let (_, resolver) = resolver();

        let action = resolver.process_response(&[0x12, 0x34, 0x81]);

        assert!(matches!(action, ResponseAction::Drop(_)));
        assert!(!action.relays());
    }

    #[test]
    fn response_is_keyed_by_its_own_question() {
        let (_, resolver) = resolver();
        resolver.process_response(&response(1, "other.example", &[60]));

        assert!(matches!(
            resolver.process_query(&query(2, "other.example")),
            Ok(QueryAction::Cached { .. })
        ));
    }
}
