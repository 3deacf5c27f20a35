//! Popular-topic cache tier
//!
//! Small curated map from known high-frequency topic keywords to pre-baked
//! answers, checked before the semantic search. The keyword list is
//! configuration, not a compiled-in constant.

use std::collections::HashMap;

use tracing::debug;

use super::entry::CachedResponse;

pub struct PopularCache {
    /// Keywords eligible for this tier, already lowercased
    keywords: Vec<String>,
    entries: HashMap<String, CachedResponse>,
}

impl PopularCache {
    pub fn new(keywords: Vec<String>) -> Self {
        let keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        Self {
            keywords,
            entries: HashMap::new(),
        }
    }

    /// Substring match in both directions: a short query may be contained in
    /// a keyword, a long query may contain one.
    pub fn find(&mut self, normalized_query: &str) -> Option<CachedResponse> {
        if normalized_query.is_empty() {
            return None;
        }

        let matched = self
            .entries
            .iter()
            .find(|(keyword, _)| {
                normalized_query.contains(keyword.as_str())
                    || keyword.contains(normalized_query)
            })
            .map(|(keyword, _)| keyword.clone())?;

        if self.entries[&matched].is_expired() {
            debug!("popular tier entry expired: {}", matched);
            self.entries.remove(&matched);
            return None;
        }

        let entry = self.entries.get_mut(&matched)?;
        entry.mark_used();
        Some(entry.clone())
    }

    /// Store under the first configured keyword the query contains, if any
    pub fn maybe_insert(&mut self, normalized_query: &str, entry: &CachedResponse) {
        for keyword in &self.keywords {
            if normalized_query.contains(keyword.as_str()) {
                debug!("popular tier storing under keyword: {}", keyword);
                self.entries.insert(keyword.clone(), entry.clone());
                return;
            }
        }
    }

    /// Drop all expired entries, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(ttl: Duration) -> CachedResponse {
        CachedResponse::new(
            "golden visa answer with details".to_string(),
            vec!["golden_visa.md".to_string()],
            "k".to_string(),
            "c".to_string(),
            ttl,
        )
    }

    fn cache() -> PopularCache {
        PopularCache::new(vec!["golden visa".to_string(), "дубай".to_string()])
    }

    #[test]
    fn test_store_and_find_by_keyword() {
        let mut cache = cache();
        cache.maybe_insert(
            "how do i get a golden visa in the uae",
            &entry(Duration::from_secs(60)),
        );
        assert_eq!(cache.len(), 1);

        // Longer query containing the keyword
        let hit = cache.find("requirements for golden visa renewal");
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().usage_count, 1);

        // Shorter query contained in the keyword
        assert!(cache.find("golden").is_some());
    }

    #[test]
    fn test_no_keyword_no_store() {
        let mut cache = cache();
        cache.maybe_insert("completely unrelated question", &entry(Duration::from_secs(60)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_no_match() {
        let mut cache = cache();
        cache.maybe_insert("golden visa info", &entry(Duration::from_secs(60)));
        assert!(cache.find("tax residency rules").is_none());
    }

    #[test]
    fn test_expired_entry_is_miss() {
        let mut cache = cache();
        cache.maybe_insert("golden visa info", &entry(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(30));

        assert!(cache.find("golden visa info").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_empty_query_no_match() {
        let mut cache = cache();
        cache.maybe_insert("golden visa info", &entry(Duration::from_secs(60)));
        // Empty query would otherwise be a substring of every keyword
        assert!(cache.find("").is_none());
    }
}
