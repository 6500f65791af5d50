//! Omem: a conversational-memory storage and retrieval engine.
//!
//! Callers submit labeled conversations (`add`) and later issue free-text
//! queries (`search`) that return ranked, prompt-formatted memory excerpts.
//! The [`MemoryService`] façade composes the pieces: a durable SQLite
//! store, a rule-based fact extractor, an in-memory lexical index, a
//! corpus-independent ranker, and a deterministic prompt formatter.
//! Transport, auth, and response generation are the caller's concern.

pub mod config;
#[cfg(feature = "embeddings")]
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod prompt;
pub mod search;
pub mod service;
pub mod store;
pub mod types;

pub use config::MemoryConfig;
pub use error::{AddError, Error, Result, SearchError};
pub use search::SearchOptions;
pub use service::{AddOutcome, MemoryService};
pub use types::{Conversation, Fact, RankedFact, Role, SearchResult, Turn};
