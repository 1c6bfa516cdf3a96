//! Response cache for stage calls
//!
//! Successful completions are kept per step and prompt pair for a fixed
//! lifetime, so an identical call (a sequential rerun after a failed parallel
//! phase, or a repeated request) is answered without reaching the model.
//! Failures are never stored.

use super::{StepName, WorkUnit};
use crate::config::CacheSettings;
use dashmap::DashMap;
use llm::CompletionResponse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    step: StepName,
    system_prompt: String,
    user_prompt: String,
}

impl CacheKey {
    fn for_unit(unit: &WorkUnit) -> Self {
        let request = unit.request();
        Self {
            step: unit.name(),
            system_prompt: request.system_prompt.clone(),
            user_prompt: request.user_prompt.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CompletionResponse,
    stored_at: Instant,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Thread-safe store of successful responses
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.ttl(), settings.max_entries)
    }

    /// Cached response for `unit`, if one is still fresh
    pub fn get(&self, unit: &WorkUnit) -> Option<CompletionResponse> {
        let key = CacheKey::for_unit(unit);

        let fresh = match self.entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.response.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match fresh {
            Some(response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(step = %unit.name(), "Response cache hit");
                Some(response)
            }
            None => {
                self.entries.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a successful response for `unit`
    pub fn insert(&self, unit: &WorkUnit, response: CompletionResponse) {
        let key = CacheKey::for_unit(unit);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict();
        }
        self.entries.insert(
            key,
            CacheEntry {
                response,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries, then the oldest one if the cache is still full
    fn evict(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);

        if self.entries.len() < self.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
