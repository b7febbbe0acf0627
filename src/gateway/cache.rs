//! Result Cache: sanitized documents keyed by source URL.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    document: Arc<str>,
    expires_at: Instant,
}

/// Short-TTL map of sanitized documents, shared across request handlers.
///
/// Concurrent misses for the same URL may each fetch and overwrite the slot;
/// the result is the same document either way. Entries expire silently.
#[derive(Debug, Clone)]
pub struct ResultCache {
    entries: Arc<DashMap<String, Entry>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached document for `url`, if present and not expired.
    pub fn get(&self, url: &str) -> Option<Arc<str>> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(url)
            .map(|entry| (entry.expires_at > now, entry.document.clone()));

        match hit {
            Some((true, document)) => Some(document),
            Some((false, _)) => {
                self.entries.remove_if(url, |_, entry| entry.expires_at <= now);
                None
            }
            None => None,
        }
    }

    /// Store `document` for `url`. Expired entries are swept first.
    pub fn insert(&self, url: &str, document: impl Into<Arc<str>>) {
        if self.ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.entries.insert(
            url.to_string(),
            Entry {
                document: document.into(),
                expires_at: now + self.ttl,
            },
        );
    }

    /// Number of stored entries, expired ones included until the next
    /// insert or lookup.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ResultCache::new(Duration::from_secs(600));
        cache.insert("https://site.example/", "<p>clean</p>");
        assert_eq!(cache.get("https://site.example/").as_deref(), Some("<p>clean</p>"));

        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(cache.get("https://site.example/").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn insert_sweeps_expired_entries() {
        let cache = ResultCache::new(Duration::from_secs(1));
        for i in 0..1000 {
            cache.insert(&format!("https://site.example/{i}"), "doc");
        }
        assert_eq!(cache.len(), 1000);

        tokio::time::advance(Duration::from_secs(10)).await;
        cache.insert("https://site.example/fresh", "doc");
        assert_eq!(cache.len(), 1);
        assert!(cache.get("https://site.example/fresh").is_some());
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = ResultCache::new(Duration::ZERO);
        cache.insert("https://site.example/", "doc");
        assert!(cache.get("https://site.example/").is_none());
        assert_eq!(cache.len(), 0);
    }
}
