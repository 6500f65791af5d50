//! In-memory lexical index over facts: token postings.
//!
//! The index is a derived cache over the store, never the source of truth.
//! It can be rebuilt from a full fact scan at any time, and single-fact
//! updates cost O(fact tokens), not O(corpus).

use crate::types::Fact;
use std::collections::{HashMap, HashSet};

/// Tokens shorter than this are dropped.
const MIN_TOKEN_LEN: usize = 2;

/// Words carrying no retrieval signal, dropped by the tokenizer.
const STOPWORDS: &[&str] = &[
    "a", "am", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did",
    "do", "does", "for", "from", "had", "has", "have", "he", "her", "him", "his", "how", "if",
    "in", "is", "it", "its", "ll", "me", "of", "on", "or", "our", "re", "she", "so", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "to", "ve", "was", "we", "were",
    "what", "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Split text into lowercase alphanumeric tokens, dropping stopwords.
///
/// The same tokenizer serves index construction and query planning, so a
/// query term can only miss a fact term by actually differing.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() >= MIN_TOKEN_LEN && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Per-fact term statistics kept by the index.
#[derive(Debug, Clone)]
struct IndexedFact {
    /// Term frequency per token.
    terms: HashMap<String, u32>,
    /// Total token count (including repeats).
    len: u32,
}

/// Lexical inverted index: token -> posting set of fact ids.
#[derive(Debug, Default)]
pub struct FactIndex {
    postings: HashMap<String, HashSet<String>>,
    facts: HashMap<String, IndexedFact>,
}

impl FactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed facts.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Index a single fact. O(fact tokens).
    pub fn insert(&mut self, fact: &Fact) {
        // Re-inserting the same id replaces the old postings.
        self.remove(&fact.id);

        let tokens = tokenize(&fact.text);
        if tokens.is_empty() {
            return;
        }

        let mut terms: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *terms.entry(token.clone()).or_insert(0) += 1;
        }

        for token in terms.keys() {
            self.postings
                .entry(token.clone())
                .or_default()
                .insert(fact.id.clone());
        }

        self.facts.insert(
            fact.id.clone(),
            IndexedFact {
                terms,
                len: tokens.len() as u32,
            },
        );
    }

    /// Remove a fact's postings. O(fact tokens).
    pub fn remove(&mut self, fact_id: &str) {
        let Some(indexed) = self.facts.remove(fact_id) else {
            return;
        };

        for token in indexed.terms.keys() {
            if let Some(ids) = self.postings.get_mut(token) {
                ids.remove(fact_id);
                if ids.is_empty() {
                    self.postings.remove(token);
                }
            }
        }
    }

    /// Rebuild the index from a full store scan. Maintenance/recovery path,
    /// never required on the hot path.
    pub fn rebuild<'a>(&mut self, facts: impl IntoIterator<Item = &'a Fact>) {
        self.postings.clear();
        self.facts.clear();
        for fact in facts {
            self.insert(fact);
        }
    }

    /// Fact ids matching at least one query token.
    pub fn candidates(&self, query_tokens: &[String]) -> HashSet<String> {
        let mut out = HashSet::new();
        for token in query_tokens {
            if let Some(ids) = self.postings.get(token) {
                out.extend(ids.iter().cloned());
            }
        }
        out
    }

    /// Capture everything the ranker needs for one query: candidate ids
    /// plus per-candidate match statistics. Callers holding the index
    /// behind a lock can release it once the snapshot exists, keeping
    /// store round-trips off the lock's critical section.
    pub fn query_snapshot(&self, query_tokens: &[String]) -> QuerySnapshot {
        let mut seen = HashSet::new();
        let distinct: Vec<&String> = query_tokens
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .collect();

        let mut matches = HashMap::new();
        for fact_id in self.candidates(query_tokens) {
            let Some(indexed) = self.facts.get(&fact_id) else {
                continue;
            };
            let mut matched = 0u32;
            let mut matched_tf = 0u32;
            for token in &distinct {
                if let Some(tf) = indexed.terms.get(*token) {
                    matched += 1;
                    matched_tf += tf;
                }
            }
            matches.insert(
                fact_id,
                TermMatch {
                    matched,
                    matched_tf,
                    fact_len: indexed.len,
                },
            );
        }

        QuerySnapshot {
            query_len: distinct.len() as u32,
            matches,
        }
    }

    /// Term frequency of a token within a fact.
    pub fn term_frequency(&self, fact_id: &str, token: &str) -> u32 {
        self.facts
            .get(fact_id)
            .and_then(|f| f.terms.get(token))
            .copied()
            .unwrap_or(0)
    }

    /// Total token count of an indexed fact.
    pub fn fact_len(&self, fact_id: &str) -> u32 {
        self.facts.get(fact_id).map(|f| f.len).unwrap_or(0)
    }

    /// All indexed fact ids, for consistency checks against the store.
    pub fn fact_ids(&self) -> impl Iterator<Item = &str> {
        self.facts.keys().map(String::as_str)
    }
}

/// Per-fact match statistics for one query.
#[derive(Debug, Clone, Copy)]
struct TermMatch {
    /// Distinct query tokens present in the fact.
    matched: u32,
    /// Summed term frequency of the matched tokens.
    matched_tf: u32,
    /// Total token count of the fact.
    fact_len: u32,
}

/// Frozen view of the index for a fixed query: candidate ids and the
/// statistics behind their lexical scores. Owns its data, so it stays
/// valid after the index moves on.
#[derive(Debug, Default)]
pub struct QuerySnapshot {
    query_len: u32,
    matches: HashMap<String, TermMatch>,
}

impl QuerySnapshot {
    /// True when no fact matched any query token (including the empty
    /// query).
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Candidate fact ids in a deterministic order.
    pub fn candidate_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.matches.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Lexical relevance in [0, 1]: geometric mean of query coverage (how
    /// much of the query the fact answers) and fact density (how much of
    /// the fact is about the query). None for facts outside the snapshot.
    pub fn lexical_score(&self, fact_id: &str) -> Option<f32> {
        let stats = self.matches.get(fact_id)?;
        if stats.matched == 0 || stats.fact_len == 0 || self.query_len == 0 {
            return None;
        }

        let coverage = stats.matched as f32 / self.query_len as f32;
        let density = (stats.matched_tf as f32 / stats.fact_len as f32).min(1.0);
        Some((coverage * density).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(id_hint: usize, text: &str) -> Fact {
        Fact::derived("conv-test", 0, id_hint, text, chrono::Utc::now())
    }

    #[test]
    fn tokenizer_lowercases_and_drops_stopwords() {
        let tokens = tokenize("Meeting with Caroline tomorrow at West Lake!");
        assert_eq!(tokens, vec!["meeting", "caroline", "tomorrow", "west", "lake"]);
    }

    #[test]
    fn tokenizer_keeps_digits() {
        let tokens = tokenize("meeting at 3pm on 2025-01-07");
        assert!(tokens.contains(&"3pm".to_string()));
        assert!(tokens.contains(&"2025".to_string()));
    }

    #[test]
    fn insert_makes_fact_discoverable() {
        let mut index = FactIndex::new();
        let f = fact(0, "Caroline went to a support group");
        index.insert(&f);

        let candidates = index.candidates(&tokenize("support group"));
        assert!(candidates.contains(&f.id));
        assert_eq!(index.term_frequency(&f.id, "support"), 1);
        assert_eq!(index.fact_len(&f.id), 4);
    }

    #[test]
    fn remove_clears_all_postings() {
        let mut index = FactIndex::new();
        let f = fact(0, "Caroline went to a support group");
        index.insert(&f);
        index.remove(&f.id);

        assert!(index.is_empty());
        assert!(index.candidates(&tokenize("support group")).is_empty());
        assert_eq!(index.fact_len(&f.id), 0);
    }

    #[test]
    fn reinsert_replaces_postings() {
        let mut index = FactIndex::new();
        let mut f = fact(0, "likes green tea");
        index.insert(&f);
        f.text = "moved to Berlin".to_string();
        index.insert(&f);

        assert_eq!(index.len(), 1);
        assert!(index.candidates(&tokenize("tea")).is_empty());
        assert!(index.candidates(&tokenize("berlin")).contains(&f.id));
    }

    #[test]
    fn rebuild_matches_incremental_inserts() {
        let facts: Vec<Fact> = [
            "Meeting with Caroline tomorrow at West Lake",
            "User prefers short answers",
            "Alex moved to Berlin last month",
        ]
        .iter()
        .enumerate()
        .map(|(i, text)| fact(i, text))
        .collect();

        let mut incremental = FactIndex::new();
        for f in &facts {
            incremental.insert(f);
        }

        let mut rebuilt = FactIndex::new();
        rebuilt.rebuild(&facts);

        assert_eq!(incremental.len(), rebuilt.len());
        for f in &facts {
            for token in tokenize(&f.text) {
                assert_eq!(
                    incremental.term_frequency(&f.id, &token),
                    rebuilt.term_frequency(&f.id, &token),
                );
            }
        }
    }

    #[test]
    fn query_snapshot_stands_alone_after_index_changes() {
        let mut index = FactIndex::new();
        let f = fact(0, "Meeting with Caroline tomorrow at West Lake");
        index.insert(&f);

        // Repeated query tokens collapse to one distinct token.
        let snapshot = index.query_snapshot(&tokenize("west lake lake"));
        assert_eq!(snapshot.candidate_ids(), vec![f.id.clone()]);

        let score = snapshot
            .lexical_score(&f.id)
            .expect("matched fact should score");
        // Full coverage (2/2), density 2/5.
        assert!((score - (2.0f32 / 5.0).sqrt()).abs() < 1e-6);
        assert!(snapshot.lexical_score("missing").is_none());

        // The snapshot is a frozen view: mutating the index afterwards
        // does not move its scores.
        index.remove(&f.id);
        assert_eq!(
            snapshot.lexical_score(&f.id),
            Some(score),
            "snapshot should be unaffected by later index mutation"
        );
    }

    #[test]
    fn empty_query_yields_empty_snapshot() {
        let mut index = FactIndex::new();
        index.insert(&fact(0, "Caroline likes tea"));
        let snapshot = index.query_snapshot(&tokenize("the a of"));
        assert!(snapshot.is_empty());
        assert!(snapshot.candidate_ids().is_empty());
    }

    #[test]
    fn facts_with_no_tokens_are_not_indexed() {
        let mut index = FactIndex::new();
        index.insert(&fact(0, "a to the !!"));
        assert!(index.is_empty());
    }
}
