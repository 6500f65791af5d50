//! Query planning and ranking over the fact index.
//!
//! Relevance is deliberately corpus-independent: a fact's score is a
//! function of the query and that fact alone (token coverage, token
//! density, optional embedding similarity, optional recency decay).
//! Corpus statistics such as IDF would let unrelated additions move the
//! score of an existing fact, which the ranking contract forbids.

use crate::index::QuerySnapshot;
use crate::types::{Fact, RankedFact, SearchResult};

/// Per-call search option overrides.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum facts returned; defaults to the configured `top_k`.
    pub top_k: Option<usize>,
    /// Minimum relevance score; defaults to the configured `min_score`.
    pub min_score: Option<f32>,
}

/// Resolved ranking parameters for one search call.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub recency_decay: bool,
    pub recency_half_life_days: f32,
    pub empty_result_text: Option<String>,
    /// Query embedding, when the embeddings feature is active and a model
    /// is loaded. Blended with the lexical score where facts carry vectors.
    pub query_embedding: Option<Vec<f32>>,
}

/// Rank candidate facts against a query snapshot and assemble the result.
///
/// `snapshot` carries the query's match statistics, taken from the index;
/// `candidates` are the store-backed facts for the snapshot's ids. Facts
/// sharing no token with the query score zero and are dropped. Ordering
/// is deterministic: descending score, then ascending fact id.
pub fn rank(
    snapshot: &QuerySnapshot,
    candidates: Vec<Fact>,
    config: &RankerConfig,
) -> SearchResult {
    if snapshot.is_empty() || candidates.is_empty() {
        return SearchResult::empty(config.empty_result_text.clone());
    }

    let now = chrono::Utc::now();
    let mut scored: Vec<RankedFact> = Vec::with_capacity(candidates.len());

    for fact in candidates {
        let Some(mut score) = snapshot.lexical_score(&fact.id) else {
            continue;
        };

        if let (Some(query_vec), Some(fact_vec)) =
            (config.query_embedding.as_deref(), fact.embedding.as_deref())
        {
            let similarity = cosine_similarity(query_vec, fact_vec).max(0.0);
            score = 0.5 * score + 0.5 * similarity;
        }

        if config.recency_decay {
            score *= recency_factor(fact.created_at, now, config.recency_half_life_days);
        }

        if score < config.min_score {
            continue;
        }

        scored.push(RankedFact {
            fact_id: fact.id,
            text: fact.text,
            score,
            source_conversation_id: fact.conversation_id,
            created_at: fact.created_at,
        });
    }

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.fact_id.cmp(&b.fact_id))
    });
    scored.truncate(config.top_k);

    if scored.is_empty() {
        return SearchResult::empty(config.empty_result_text.clone());
    }

    SearchResult {
        items: scored,
        empty_text: config.empty_result_text.clone(),
    }
}

/// Exponential decay by fact age: halves every `half_life_days`.
fn recency_factor(
    created_at: chrono::DateTime<chrono::Utc>,
    now: chrono::DateTime<chrono::Utc>,
    half_life_days: f32,
) -> f32 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    let age_days = (now - created_at).num_seconds().max(0) as f32 / 86_400.0;
    (-age_days / half_life_days).exp2()
}

/// Cosine similarity of two vectors; 0.0 on dimension mismatch or zero norm.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
