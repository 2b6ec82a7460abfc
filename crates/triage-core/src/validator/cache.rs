//! TTL caches shared across cascade invocations.
//!
//! Entries are immutable once written; expiry is checked on read. Racing
//! writers for the same key are last-write-wins.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::extract::{article_id, normalize_url};

/// Concurrent map whose entries expire `ttl` after insertion.
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V> {
    entries: DashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Fresh value for `key`, evicting it if expired.
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            let (value, inserted) = entry.value();
            if inserted.elapsed() < self.ttl {
                return Some(value.clone());
            }
        }
        // Re-checked under the shard lock so a fresh concurrent insert survives.
        self.entries
            .remove_if(key, |_, (_, inserted)| inserted.elapsed() >= self.ttl);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Published references from one listing fetch.
///
/// Article pages are matched by id: the slug after `/articles/<id>` is
/// optional and case-insensitive, and the locale segment varies. Every
/// other page is matched by its normalized URL.
#[derive(Debug, Default)]
pub struct KnownReferences {
    urls: HashSet<String>,
    article_ids: HashSet<u64>,
}

impl KnownReferences {
    pub fn from_urls<'a>(urls: impl IntoIterator<Item = &'a str>) -> Self {
        let mut known = Self::default();
        for url in urls {
            if let Some(id) = article_id(url) {
                known.article_ids.insert(id);
            }
            known.urls.insert(normalize_url(url));
        }
        known
    }

    /// Whether `url` names a listed page.
    pub fn contains(&self, url: &str) -> bool {
        match article_id(url) {
            Some(id) => self.article_ids.contains(&id),
            None => self.urls.contains(&normalize_url(url)),
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// A fetched reference listing and when it was fetched.
#[derive(Debug, Clone)]
struct ListingSnapshot {
    known: Arc<KnownReferences>,
    fetched_at: Instant,
}

/// Single-slot cache for the reference listing that keeps the last good
/// copy past its TTL so it can stand in when a refetch fails.
#[derive(Debug)]
pub struct ListingCache {
    slot: RwLock<Option<ListingSnapshot>>,
    ttl: Duration,
}

impl ListingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    /// The listing if it is younger than the TTL.
    pub fn fresh(&self) -> Option<Arc<KnownReferences>> {
        let guard = self.slot.read().ok()?;
        guard
            .as_ref()
            .filter(|s| s.fetched_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.known))
    }

    /// The last stored listing regardless of age.
    pub fn stale(&self) -> Option<Arc<KnownReferences>> {
        let guard = self.slot.read().ok()?;
        guard.as_ref().map(|s| Arc::clone(&s.known))
    }

    pub fn store(&self, known: KnownReferences) -> Arc<KnownReferences> {
        let known = Arc::new(known);
        if let Ok(mut guard) = self.slot.write() {
            *guard = Some(ListingSnapshot {
                known: Arc::clone(&known),
                fetched_at: Instant::now(),
            });
        }
        known
    }
}
