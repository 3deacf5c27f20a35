//! Semantic-similarity cache tier
//!
//! Maintains a bag-of-terms TF-IDF space fitted over recently cached
//! queries and answers lookups by cosine similarity against that space.
//! The vectorizer is refit on every insert: the vocabulary changes with
//! each new query, and the corpus is bounded, so the O(corpus) refit is a
//! deliberate simplicity/cost tradeoff rather than an oversight.

use std::collections::HashMap;

use tracing::debug;

use super::entry::CachedResponse;

pub struct SemanticCache {
    threshold: f32,
    max_entries: usize,

    /// Normalized query text per entry, in insertion order
    queries: Vec<String>,
    entries: Vec<CachedResponse>,

    /// L2-normalized TF-IDF row per entry, aligned with `entries`
    vectors: Vec<Vec<f32>>,

    /// Term -> column index in the fitted space
    vocab: HashMap<String, usize>,
    idf: Vec<f32>,
}

impl SemanticCache {
    pub fn new(threshold: f32, max_entries: usize) -> Self {
        Self {
            threshold,
            max_entries,
            queries: Vec::new(),
            entries: Vec::new(),
            vectors: Vec::new(),
            vocab: HashMap::new(),
            idf: Vec::new(),
        }
    }

    /// Index a new query/response pair, refitting the vector space
    pub fn insert(&mut self, normalized_query: &str, mut entry: CachedResponse) {
        self.purge_expired();

        self.queries.push(normalized_query.to_string());
        entry.embedding = None;
        self.entries.push(entry);

        // Amortized eviction: drop the oldest half once over the cap
        if self.entries.len() > self.max_entries {
            let drop = self.entries.len() / 2;
            debug!("semantic tier evicting oldest {} entries", drop);
            self.queries.drain(..drop);
            self.entries.drain(..drop);
        }

        self.refit();
    }

    /// Find the closest cached answer, if its similarity clears the
    /// threshold. Internal inconsistencies surface as `Err` so the caller
    /// can degrade to a miss; an unfitted or empty space is just `None`.
    pub fn find_similar(
        &mut self,
        normalized_query: &str,
    ) -> std::result::Result<Option<CachedResponse>, String> {
        self.purge_expired();

        if self.entries.is_empty() {
            return Ok(None);
        }

        if self.vectors.len() != self.entries.len() {
            return Err(format!(
                "vector index out of sync: {} vectors for {} entries",
                self.vectors.len(),
                self.entries.len()
            ));
        }

        let query_vector = self.transform(normalized_query);
        if query_vector.is_empty() {
            // No shared vocabulary with the fitted space
            return Ok(None);
        }

        let mut best_idx = 0usize;
        let mut best_sim = f32::MIN;
        for (idx, vector) in self.vectors.iter().enumerate() {
            let sim = dot(&query_vector, vector);
            if sim > best_sim {
                best_sim = sim;
                best_idx = idx;
            }
        }

        if best_sim >= self.threshold {
            debug!(
                "semantic tier hit: similarity {:.3} against '{}'",
                best_sim, self.queries[best_idx]
            );
            let entry = &mut self.entries[best_idx];
            entry.mark_used();
            Ok(Some(entry.clone()))
        } else {
            Ok(None)
        }
    }

    /// Drop expired entries, keeping the parallel vectors consistent
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        if before == 0 {
            return 0;
        }

        let keep: Vec<bool> = self.entries.iter().map(|e| !e.is_expired()).collect();
        if keep.iter().all(|k| *k) {
            return 0;
        }

        let mut idx = 0;
        self.entries.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
        let mut idx = 0;
        self.queries.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
        if self.vectors.len() == keep.len() {
            let mut idx = 0;
            self.vectors.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }

        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.queries.clear();
        self.entries.clear();
        self.vectors.clear();
        self.vocab.clear();
        self.idf.clear();
    }

    /// Rebuild vocabulary, IDF weights and all row vectors from the corpus
    fn refit(&mut self) {
        self.vocab.clear();
        let mut doc_freq: Vec<u32> = Vec::new();

        let tokenized: Vec<Vec<String>> = self.queries.iter().map(|q| terms(q)).collect();

        for tokens in &tokenized {
            let mut seen: Vec<usize> = Vec::new();
            for term in tokens {
                let next_id = self.vocab.len();
                let id = *self.vocab.entry(term.clone()).or_insert(next_id);
                if id == doc_freq.len() {
                    doc_freq.push(0);
                }
                if !seen.contains(&id) {
                    doc_freq[id] += 1;
                    seen.push(id);
                }
            }
        }

        let n = self.queries.len() as f32;
        self.idf = doc_freq
            .iter()
            .map(|df| ((n + 1.0) / (*df as f32 + 1.0)).ln() + 1.0)
            .collect();

        self.vectors = tokenized
            .iter()
            .map(|tokens| self.vectorize(tokens))
            .collect();

        for (entry, vector) in self.entries.iter_mut().zip(self.vectors.iter()) {
            entry.embedding = Some(vector.clone());
        }
    }

    /// Project a query into the current fitted space; empty when the query
    /// shares no vocabulary with the corpus
    fn transform(&self, normalized_query: &str) -> Vec<f32> {
        let tokens = terms(normalized_query);
        if tokens.iter().all(|t| !self.vocab.contains_key(t)) {
            return Vec::new();
        }
        self.vectorize(&tokens)
    }

    fn vectorize(&self, tokens: &[String]) -> Vec<f32> {
        let mut row = vec![0.0f32; self.vocab.len()];
        for term in tokens {
            if let Some(&id) = self.vocab.get(term) {
                row[id] += 1.0;
            }
        }
        for (id, value) in row.iter_mut().enumerate() {
            *value *= self.idf[id];
        }

        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in row.iter_mut() {
                *value /= norm;
            }
        }
        row
    }
}

/// Unigrams plus adjacent bigrams over alphanumeric word boundaries
fn terms(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect();

    let mut out = words.clone();
    for pair in words.windows(2) {
        out.push(format!("{} {}", pair[0], pair[1]));
    }
    out
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
