//! Response Cache.
//!
//! Content-addressed cache keyed by a fingerprint of the normalized query,
//! mode, model class, and constraint signature. Coalesces concurrent
//! identical queries so only one synthesis runs per fingerprint; a miss
//! never fails the request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use moka::future::Cache;
use moka::Expiry;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use crate::envelope::AnswerEvent;
use crate::query::QueryMode;

/// Compute the cache fingerprint.
pub fn fingerprint(normalized_query: &str, mode: QueryMode, model_class: &str, constraint_signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_query.as_bytes());
    hasher.update([0u8]);
    hasher.update(mode.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(model_class.as_bytes());
    hasher.update([0u8]);
    hasher.update(constraint_signature.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The stored, replayable result for one fingerprint. Holds the full event
/// sequence so that a replayed cache hit is byte-faithful to the original
/// stream.
#[derive(Debug, Clone)]
pub struct CachedEnvelope {
    pub events: Arc<Vec<AnswerEvent>>,
    pub mode: QueryMode,
}

/// Per-mode TTL table. Research/multimedia lean on time-sensitive lanes
/// (news, markets) so their entries expire sooner than `simple`'s.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtlTable {
    pub simple: Duration,
    pub technical: Duration,
    pub research: Duration,
    pub multimedia: Duration,
}

impl Default for CacheTtlTable {
    fn default() -> Self {
        Self {
            simple: Duration::from_secs(600),
            technical: Duration::from_secs(300),
            research: Duration::from_secs(180),
            multimedia: Duration::from_secs(180),
        }
    }
}

impl CacheTtlTable {
    fn for_mode(&self, mode: QueryMode) -> Duration {
        match mode {
            QueryMode::Simple => self.simple,
            QueryMode::Technical => self.technical,
            QueryMode::Research => self.research,
            QueryMode::Multimedia => self.multimedia,
        }
    }
}

struct ModeAwareExpiry {
    table: CacheTtlTable,
}

impl Expiry<String, CachedEnvelope> for ModeAwareExpiry {
    fn expire_after_create(&self, _key: &String, value: &CachedEnvelope, _created_at: Instant) -> Option<Duration> {
        Some(self.table.for_mode(value.mode))
    }
}

/// Role returned by [`ResponseCache::join_or_lead`]: exactly one caller per
/// fingerprint becomes the leader and runs synthesis; every other
/// concurrent caller with the same fingerprint follows along.
pub enum CoalesceRole {
    Leader(broadcast::Sender<AnswerEvent>),
    Follower(broadcast::Receiver<AnswerEvent>),
}

pub struct ResponseCache {
    store: Cache<String, CachedEnvelope>,
    in_flight: DashMap<String, broadcast::Sender<AnswerEvent>>,
}

impl ResponseCache {
    pub fn new(ttl_table: CacheTtlTable, max_capacity: u64) -> Self {
        let store = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(ModeAwareExpiry { table: ttl_table })
            .build();
        Self {
            store,
            in_flight: DashMap::new(),
        }
    }

    /// A miss never fails the request — callers treat `None` as "run the
    /// full pipeline".
    pub async fn get(&self, fingerprint: &str) -> Option<CachedEnvelope> {
        self.store.get(fingerprint).await
    }

    pub async fn put(&self, fingerprint: String, envelope: CachedEnvelope) {
        self.store.insert(fingerprint, envelope).await;
    }

    /// Join the in-flight request for `fingerprint`, becoming its leader if
    /// none exists yet.
    pub fn join_or_lead(&self, fingerprint: &str) -> CoalesceRole {
        if let Some(existing) = self.in_flight.get(fingerprint) {
            return CoalesceRole::Follower(existing.subscribe());
        }
        let (tx, _rx) = broadcast::channel(256);
        match self.in_flight.entry(fingerprint.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => CoalesceRole::Follower(entry.get().subscribe()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let sub = tx.subscribe();
                entry.insert(tx);
                CoalesceRole::Leader(sub.resubscribe())
            }
        }
    }

    /// Leader calls this once synthesis is done so the next caller with the
    /// same fingerprint starts a fresh run instead of joining a dead one.
    pub fn retire(&self, fingerprint: &str) {
        self.in_flight.remove(fingerprint);
    }

    /// Approximate occupancy, for the admin surface only — moka's counter is
    /// eventually consistent with in-flight inserts.
    pub fn entry_count(&self) -> u64 {
        self.store.entry_count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_mode() -> impl Strategy<Value = QueryMode> {
        prop_oneof![
            Just(QueryMode::Simple),
            Just(QueryMode::Technical),
            Just(QueryMode::Research),
            Just(QueryMode::Multimedia),
        ]
    }

    proptest! {
        #[test]
        fn fingerprint_is_stable_across_repeated_hashing(
            query in ".*",
            mode in arb_mode(),
            model_class in "[a-z]*",
            signature in ".*",
        ) {
            let a = fingerprint(&query, mode, &model_class, &signature);
            let b = fingerprint(&query, mode, &model_class, &signature);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn fingerprint_changes_when_any_input_changes(
            query in "[a-z]{1,12}",
            mode in arb_mode(),
            model_class in "[a-z]{1,8}",
            signature in "[a-z]{1,8}",
            extra in "[a-z]{1,12}",
        ) {
            prop_assume!(query != extra);
            let a = fingerprint(&query, mode, &model_class, &signature);
            let b = fingerprint(&extra, mode, &model_class, &signature);
            prop_assert_ne!(a, b);
        }
    }

    #[test]
    fn same_inputs_yield_same_fingerprint() {
        let a = fingerprint("what is rag", QueryMode::Simple, "standard", "sig");
        let b = fingerprint("what is rag", QueryMode::Simple, "standard", "sig");
        assert_eq!(a, b);
    }

    #[test]
    fn different_modes_yield_different_fingerprints() {
        let a = fingerprint("q", QueryMode::Simple, "standard", "sig");
        let b = fingerprint("q", QueryMode::Technical, "standard", "sig");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = ResponseCache::new(CacheTtlTable::default(), 100);
        assert!(cache.get("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = ResponseCache::new(CacheTtlTable::default(), 100);
        let envelope = CachedEnvelope { events: Arc::new(vec![]), mode: QueryMode::Simple };
        cache.put("fp1".to_string(), envelope).await;
        assert!(cache.get("fp1").await.is_some());
    }

    #[test]
    fn second_caller_for_same_fingerprint_becomes_a_follower() {
        let cache = ResponseCache::new(CacheTtlTable::default(), 100);
        let first = cache.join_or_lead("fp1");
        assert!(matches!(first, CoalesceRole::Leader(_)));
        let second = cache.join_or_lead("fp1");
        assert!(matches!(second, CoalesceRole::Follower(_)));
    }

    #[test]
    fn retiring_allows_a_fresh_leader() {
        let cache = ResponseCache::new(CacheTtlTable::default(), 100);
        let _first = cache.join_or_lead("fp1");
        cache.retire("fp1");
        let second = cache.join_or_lead("fp1");
        assert!(matches!(second, CoalesceRole::Leader(_)));
    }
}
