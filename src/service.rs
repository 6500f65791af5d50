//! The memory service façade: `add` and `search` over store + index.
//!
//! Composition rules, in order, for every add:
//! conversation persists first (the durability point), then facts persist,
//! then facts index. A concurrent search therefore observes either the
//! pre- or post-state of an add, never a half-indexed fact. Adds for the
//! same conversation id are serialized through a per-id lock; distinct ids
//! and all searches proceed concurrently.

use crate::config::{MAX_TOP_K, MemoryConfig};
use crate::error::{AddError, IndexError, SearchError, StoreError};
use crate::extract::{Extractor, ExtractorConfig};
use crate::index::{FactIndex, tokenize};
use crate::search::{RankerConfig, SearchOptions, rank};
use crate::store::MemoryStore;
use crate::types::{Conversation, SearchResult, Turn};
use anyhow::Context as _;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Summary of a completed add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub conversation_id: String,
    pub facts_extracted: usize,
}

/// Store-level counters, for maintenance tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub conversations: i64,
    pub facts: i64,
}

/// Conversational memory engine: durable storage, fact extraction,
/// indexing, and ranked retrieval behind two public operations.
pub struct MemoryService {
    store: MemoryStore,
    index: RwLock<FactIndex>,
    extractor: Extractor,
    config: MemoryConfig,
    /// Per-conversation-id add serialization. Entries are never evicted;
    /// the map is bounded by the distinct ids added in-process.
    add_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    #[cfg(feature = "embeddings")]
    embedder: Option<Arc<crate::embedding::EmbeddingModel>>,
}

impl MemoryService {
    /// Connect to the configured SQLite database and bring the service up.
    pub async fn connect(config: MemoryConfig) -> crate::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .connect(&config.sqlite_url())
            .await
            .with_context(|| format!("failed to open database at {}", config.sqlite_url()))?;

        Self::with_pool(config, pool).await
    }

    /// Build the service over an existing pool. Initializes the schema and
    /// rebuilds the index from a full store scan (the recovery path — the
    /// index is a derived cache and the store is the source of truth).
    pub async fn with_pool(config: MemoryConfig, pool: SqlitePool) -> crate::Result<Self> {
        let store = MemoryStore::new(pool);
        store.initialize().await?;

        let facts = store.all_facts().await?;
        let mut index = FactIndex::new();
        index.rebuild(&facts);
        tracing::info!(facts = facts.len(), "index rebuilt from store");

        #[cfg(feature = "embeddings")]
        let embedder = match crate::embedding::EmbeddingModel::new() {
            Ok(model) => Some(Arc::new(model)),
            Err(error) => {
                tracing::warn!(%error, "embedding model unavailable, lexical search only");
                None
            }
        };

        let extractor = Extractor::new(ExtractorConfig {
            max_facts: config.max_facts_per_conversation,
            ..ExtractorConfig::default()
        });

        Ok(Self {
            store,
            index: RwLock::new(index),
            extractor,
            config,
            add_locks: Mutex::new(HashMap::new()),
            #[cfg(feature = "embeddings")]
            embedder,
        })
    }

    /// Store a conversation under a caller-assigned id and index the facts
    /// extracted from it.
    ///
    /// The conversation persists before anything else; extraction failures
    /// degrade to zero facts and are logged, never surfaced. A duplicate id
    /// is rejected without touching previously stored data.
    pub async fn add(&self, id: &str, turns: Vec<Turn>) -> Result<AddOutcome, AddError> {
        if id.trim().is_empty() {
            return Err(AddError::InvalidConversation(
                "conversation id must be non-empty".to_string(),
            ));
        }
        if turns.len() > self.config.max_turns_per_conversation {
            return Err(AddError::TooManyTurns {
                count: turns.len(),
                max: self.config.max_turns_per_conversation,
            });
        }
        for (seq, turn) in turns.iter().enumerate() {
            if turn.content.len() > self.config.max_turn_content_bytes {
                return Err(AddError::TurnTooLarge {
                    seq,
                    size: turn.content.len(),
                    max: self.config.max_turn_content_bytes,
                });
            }
        }

        // At most one in-flight add per conversation id; a racing
        // double-submit resolves to one success and one DuplicateId.
        let id_lock = {
            let mut locks = self.add_locks.lock().await;
            locks.entry(id.to_string()).or_default().clone()
        };
        let _guard = id_lock.lock().await;

        let conversation = Conversation::new(id, turns);
        match self.store.put_conversation(&conversation).await {
            Ok(()) => {}
            Err(StoreError::DuplicateId { id }) => return Err(AddError::DuplicateId { id }),
            Err(error) => return Err(AddError::Persist(error)),
        }

        #[allow(unused_mut)]
        let mut facts = match self.extractor.extract(&conversation) {
            Ok(facts) => facts,
            Err(error) => {
                tracing::warn!(conversation_id = %conversation.id, %error, "extraction failed, conversation stored without facts");
                Vec::new()
            }
        };

        #[cfg(feature = "embeddings")]
        if let Some(embedder) = &self.embedder {
            for fact in &mut facts {
                match embedder.embed_one(&fact.text) {
                    Ok(vector) => fact.embedding = Some(vector),
                    Err(error) => {
                        tracing::warn!(fact_id = %fact.id, %error, "embedding generation failed")
                    }
                }
            }
        }

        // Persist before indexing: the index must never hold a fact id
        // that is absent from the store.
        for fact in &facts {
            self.store
                .put_fact(fact)
                .await
                .map_err(AddError::Persist)?;
            self.index.write().await.insert(fact);
        }

        tracing::info!(
            conversation_id = %conversation.id,
            facts = facts.len(),
            "conversation added"
        );

        Ok(AddOutcome {
            conversation_id: conversation.id,
            facts_extracted: facts.len(),
        })
    }

    /// Search stored memories with a natural-language query.
    ///
    /// Read-only and freely concurrent. "Nothing relevant" is an empty
    /// result, not an error; errors cover malformed input and backend
    /// failure only.
    pub async fn search(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<SearchResult, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if query.len() > self.config.max_query_bytes {
            return Err(SearchError::QueryTooLong {
                size: query.len(),
                max: self.config.max_query_bytes,
            });
        }

        let top_k = options
            .top_k
            .unwrap_or(self.config.top_k)
            .clamp(1, MAX_TOP_K);

        let ranker_config = RankerConfig {
            top_k,
            min_score: options.min_score.unwrap_or(self.config.min_score),
            recency_decay: self.config.recency_decay,
            recency_half_life_days: self.config.recency_half_life_days,
            empty_result_text: self.config.empty_result_text.clone(),
            query_embedding: self.query_embedding(query),
        };

        // Snapshot the match statistics and release the read guard before
        // the store round-trip, so a queued index writer never stalls
        // other searches behind database latency.
        let snapshot = {
            let index = self.index.read().await;
            index.query_snapshot(&tokenize(query))
        };

        let candidates = self
            .store
            .get_facts_by_ids(&snapshot.candidate_ids())
            .await
            .map_err(SearchError::Backend)?;

        Ok(rank(&snapshot, candidates, &ranker_config))
    }

    /// Rebuild the index from a full store scan. Maintenance operation;
    /// also the repair path for a detected inconsistency.
    pub async fn rebuild_index(&self) -> crate::Result<usize> {
        let facts = self.store.all_facts().await?;
        let mut index = self.index.write().await;
        index.rebuild(&facts);
        tracing::info!(facts = facts.len(), "index rebuilt");
        Ok(facts.len())
    }

    /// Check that every indexed fact id exists in the store. A mismatch is
    /// reported, never silently ignored; `rebuild_index` repairs it.
    pub async fn verify_index(&self) -> crate::Result<()> {
        let stored: std::collections::HashSet<String> = self
            .store
            .all_facts()
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();

        let index = self.index.read().await;
        let missing = index
            .fact_ids()
            .filter(|id| !stored.contains(*id))
            .count();

        if missing > 0 {
            tracing::error!(missing, "index references facts absent from the store");
            return Err(IndexError::Inconsistency { missing }.into());
        }
        Ok(())
    }

    /// Store-level counters.
    pub async fn stats(&self) -> crate::Result<StoreStats> {
        Ok(StoreStats {
            conversations: self.store.conversation_count().await?,
            facts: self.store.fact_count().await?,
        })
    }

    #[cfg(feature = "embeddings")]
    fn query_embedding(&self, query: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed_one(query) {
            Ok(vector) => Some(vector),
            Err(error) => {
                tracing::warn!(%error, "query embedding failed, lexical search only");
                None
            }
        }
    }

    #[cfg(not(feature = "embeddings"))]
    fn query_embedding(&self, _query: &str) -> Option<Vec<f32>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fact;

    async fn setup_service() -> MemoryService {
        setup_service_with(MemoryConfig::default()).await
    }

    async fn setup_service_with(config: MemoryConfig) -> MemoryService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should connect");

        MemoryService::with_pool(config, pool)
            .await
            .expect("service should start")
    }

    fn west_lake_turns() -> Vec<Turn> {
        vec![
            Turn::user("Meeting with Caroline tomorrow at West Lake"),
            Turn::assistant("Got it, I'll remember that"),
        ]
    }

    #[tokio::test]
    async fn add_then_search_finds_the_source_conversation() {
        let service = setup_service().await;
        let outcome = service
            .add("conv-002", west_lake_turns())
            .await
            .expect("add should succeed");
        assert_eq!(outcome.facts_extracted, 1);

        let result = service
            .search("When am I going to West Lake?", SearchOptions::default())
            .await
            .expect("search should succeed");

        assert!(!result.is_empty());
        let top = &result.items[0];
        assert_eq!(top.source_conversation_id, "conv-002");
        assert!(top.text.contains("Caroline") || top.text.contains("West Lake"));
        assert!(!result.to_prompt().is_empty());
    }

    #[tokio::test]
    async fn search_is_idempotent_on_a_fixed_store() {
        let service = setup_service().await;
        service
            .add("conv-002", west_lake_turns())
            .await
            .expect("add should succeed");

        let first = service
            .search("meeting at West Lake", SearchOptions::default())
            .await
            .expect("search should succeed");
        let second = service
            .search("meeting at West Lake", SearchOptions::default())
            .await
            .expect("search should succeed");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected_without_touching_stored_facts() {
        let service = setup_service().await;
        service
            .add("conv-002", west_lake_turns())
            .await
            .expect("first add should succeed");
        let before = service
            .store
            .get_facts("conv-002")
            .await
            .expect("facts should load");

        let error = service
            .add("conv-002", vec![Turn::user("Completely different content")])
            .await
            .expect_err("duplicate add must fail");
        assert!(matches!(error, AddError::DuplicateId { ref id } if id == "conv-002"));

        let after = service
            .store
            .get_facts("conv-002")
            .await
            .expect("facts should load");
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn empty_conversation_is_accepted_and_never_surfaces() {
        let service = setup_service().await;
        let outcome = service
            .add("conv-empty", Vec::new())
            .await
            .expect("empty add should succeed");
        assert_eq!(outcome.facts_extracted, 0);

        service
            .add("conv-002", west_lake_turns())
            .await
            .expect("add should succeed");

        let result = service
            .search("West Lake meeting Caroline", SearchOptions::default())
            .await
            .expect("search should succeed");
        assert!(
            result
                .iter()
                .all(|item| item.source_conversation_id != "conv-empty")
        );
    }

    #[tokio::test]
    async fn blank_turns_degrade_to_zero_facts() {
        let service = setup_service().await;
        let outcome = service
            .add("conv-blank", vec![Turn::user("   ")])
            .await
            .expect("add should succeed despite failed extraction");
        assert_eq!(outcome.facts_extracted, 0);

        let stats = service.stats().await.expect("stats should load");
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.facts, 0);
    }

    #[tokio::test]
    async fn empty_search_result_formats_with_configured_text() {
        let config = MemoryConfig {
            empty_result_text: Some("Nothing on file.".to_string()),
            ..MemoryConfig::default()
        };
        let service = setup_service_with(config).await;

        let result = service
            .search("anything at all", SearchOptions::default())
            .await
            .expect("search should succeed");
        assert!(result.is_empty());
        assert_eq!(result.to_prompt(), "Nothing on file.");
    }

    #[tokio::test]
    async fn empty_query_is_an_error() {
        let service = setup_service().await;
        let error = service
            .search("   ", SearchOptions::default())
            .await
            .expect_err("blank query must fail");
        assert!(matches!(error, SearchError::EmptyQuery));
    }

    #[tokio::test]
    async fn oversized_query_is_an_error() {
        let service = setup_service().await;
        let query = "lake ".repeat(2000);
        let error = service
            .search(&query, SearchOptions::default())
            .await
            .expect_err("oversized query must fail");
        assert!(matches!(error, SearchError::QueryTooLong { .. }));
    }

    #[tokio::test]
    async fn turn_limits_are_enforced() {
        let config = MemoryConfig {
            max_turns_per_conversation: 2,
            max_turn_content_bytes: 16,
            ..MemoryConfig::default()
        };
        let service = setup_service_with(config).await;

        let error = service
            .add(
                "conv-long",
                vec![Turn::user("a"), Turn::user("b"), Turn::user("c")],
            )
            .await
            .expect_err("too many turns must fail");
        assert!(matches!(error, AddError::TooManyTurns { count: 3, max: 2 }));

        let error = service
            .add(
                "conv-big",
                vec![Turn::user("this content is longer than sixteen bytes")],
            )
            .await
            .expect_err("oversized turn must fail");
        assert!(matches!(error, AddError::TurnTooLarge { seq: 0, .. }));
    }

    #[tokio::test]
    async fn adds_for_distinct_ids_run_concurrently() {
        let service = Arc::new(setup_service().await);
        let a = {
            let service = service.clone();
            tokio::spawn(async move { service.add("conv-a", west_lake_turns()).await })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(
                async move { service.add("conv-b", vec![Turn::user("I moved to Berlin")]).await },
            )
        };

        a.await.expect("task should join").expect("add a should succeed");
        b.await.expect("task should join").expect("add b should succeed");

        let stats = service.stats().await.expect("stats should load");
        assert_eq!(stats.conversations, 2);
    }

    #[tokio::test]
    async fn racing_adds_for_one_id_resolve_to_a_single_winner() {
        let service = Arc::new(setup_service().await);
        let a = {
            let service = service.clone();
            tokio::spawn(async move { service.add("conv-race", west_lake_turns()).await })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move { service.add("conv-race", west_lake_turns()).await })
        };

        let first = a.await.expect("task should join");
        let second = b.await.expect("task should join");

        let loser = match (first, second) {
            (Ok(_), Err(error)) | (Err(error), Ok(_)) => error,
            other => panic!("expected exactly one winner, got {other:?}"),
        };
        assert!(matches!(loser, AddError::DuplicateId { ref id } if id == "conv-race"));

        // The losing add must not have persisted a second copy of anything.
        let facts = service
            .store
            .get_facts("conv-race")
            .await
            .expect("facts should load");
        assert_eq!(facts.len(), 1);

        let stats = service.stats().await.expect("stats should load");
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.facts, 1);
    }

    #[tokio::test]
    async fn rebuild_reproduces_the_incremental_index() {
        let service = setup_service().await;
        service
            .add("conv-002", west_lake_turns())
            .await
            .expect("add should succeed");
        service
            .add("conv-003", vec![Turn::user("I prefer short answers")])
            .await
            .expect("add should succeed");

        let before = service
            .search("short answers", SearchOptions::default())
            .await
            .expect("search should succeed");

        let rebuilt = service.rebuild_index().await.expect("rebuild should succeed");
        assert_eq!(rebuilt, 2);

        let after = service
            .search("short answers", SearchOptions::default())
            .await
            .expect("search should succeed");
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn verify_detects_and_rebuild_repairs_inconsistency() {
        let service = setup_service().await;
        service
            .add("conv-002", west_lake_turns())
            .await
            .expect("add should succeed");
        service.verify_index().await.expect("index should be consistent");

        // Inject a fact that was never persisted.
        let stray = Fact::derived("conv-ghost", 0, 0, "phantom entry", chrono::Utc::now());
        service.index.write().await.insert(&stray);

        let error = service
            .verify_index()
            .await
            .expect_err("inconsistency must be reported");
        assert!(error.to_string().contains("absent from the store"));

        service.rebuild_index().await.expect("rebuild should succeed");
        service.verify_index().await.expect("rebuild should repair the index");
    }

    #[tokio::test]
    async fn facts_survive_restart() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let config = MemoryConfig {
            data_dir: dir.path().to_path_buf(),
            ..MemoryConfig::default()
        };

        {
            let service = MemoryService::connect(config.clone())
                .await
                .expect("service should start");
            service
                .add("conv-002", west_lake_turns())
                .await
                .expect("add should succeed");
        }

        let service = MemoryService::connect(config)
            .await
            .expect("service should restart");
        let result = service
            .search("meeting at West Lake", SearchOptions::default())
            .await
            .expect("search should succeed");
        assert_eq!(result.items[0].source_conversation_id, "conv-002");
    }

    #[tokio::test]
    async fn top_k_override_truncates_results() {
        let service = setup_service().await;
        for i in 0..6 {
            service
                .add(
                    &format!("conv-{i}"),
                    vec![Turn::user(format!("Caroline visited museum number {i}"))],
                )
                .await
                .expect("add should succeed");
        }

        let result = service
            .search(
                "Caroline museum",
                SearchOptions {
                    top_k: Some(2),
                    ..SearchOptions::default()
                },
            )
            .await
            .expect("search should succeed");
        assert_eq!(result.len(), 2);
    }
}
