//! Score Cache
//! Mission: Keep closed-round scores hot without hammering the provider
//!
//! Capacity-bounded with LRU eviction plus a TTL so a stale entry cannot
//! outlive a provider correction window. Only closed rounds belong here;
//! open-round scores change until the market closes.

use crate::models::{LeagueId, ParticipantScore, Round};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    league: LeagueId,
    round: Round,
}

struct CacheEntry {
    scores: Vec<ParticipantScore>,
    inserted_at: Instant,
}

pub struct ScoreCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    capacity: usize,
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    recency: VecDeque<CacheKey>,
}

impl ScoreCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                recency: VecDeque::new(),
            }),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, league: &LeagueId, round: Round) -> Option<Vec<ParticipantScore>> {
        let key = CacheKey {
            league: league.clone(),
            round,
        };
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            inner.entries.remove(&key);
            inner.recency.retain(|k| k != &key);
            debug!(league = %league, %round, "Score cache entry expired");
            return None;
        }

        // Refresh recency on hit.
        inner.recency.retain(|k| k != &key);
        inner.recency.push_back(key.clone());
        inner.entries.get(&key).map(|e| e.scores.clone())
    }

    pub fn put(&self, league: &LeagueId, round: Round, scores: Vec<ParticipantScore>) {
        let key = CacheKey {
            league: league.clone(),
            round,
        };
        let mut inner = self.inner.lock();

        inner.recency.retain(|k| k != &key);
        inner.recency.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                scores,
                inserted_at: Instant::now(),
            },
        );

        while inner.entries.len() > self.capacity {
            if let Some(oldest) = inner.recency.pop_front() {
                inner.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}
