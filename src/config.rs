//! Configuration loading and validation.

use crate::error::{ConfigError, Result};

/// Hard cap on `top_k`, matching the public contract (1-50).
pub const MAX_TOP_K: usize = 50;

/// Omem configuration.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Data directory path.
    pub data_dir: std::path::PathBuf,

    /// Maximum facts returned by a search.
    pub top_k: usize,

    /// Minimum relevance score; candidates below it are dropped as noise.
    pub min_score: f32,

    /// Whether older facts are down-weighted during ranking.
    pub recency_decay: bool,

    /// Half-life in days for the recency decay, when enabled.
    pub recency_half_life_days: f32,

    /// What `to_prompt()` emits for an empty result. `None` means an
    /// empty string.
    pub empty_result_text: Option<String>,

    /// Ingestion limits.
    pub max_turns_per_conversation: usize,
    pub max_turn_content_bytes: usize,
    pub max_query_bytes: usize,
    pub max_facts_per_conversation: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: std::path::PathBuf::from("./data"),
            top_k: 5,
            min_score: 0.15,
            recency_decay: false,
            recency_half_life_days: 30.0,
            empty_result_text: Some("No relevant memories found.".to_string()),
            max_turns_per_conversation: 1000,
            max_turn_content_bytes: 32 * 1024,
            max_query_bytes: 4 * 1024,
            max_facts_per_conversation: 64,
        }
    }
}

impl MemoryConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let data_dir = match std::env::var("OMEM_DATA_DIR") {
            Ok(dir) => std::path::PathBuf::from(dir),
            Err(_) => dirs::data_dir()
                .map(|d| d.join("omem"))
                .unwrap_or(defaults.data_dir),
        };

        std::fs::create_dir_all(&data_dir).map_err(|source| ConfigError::DataDir {
            path: data_dir.display().to_string(),
            source,
        })?;

        let top_k = read_env("OMEM_TOP_K", defaults.top_k)?;
        if top_k == 0 || top_k > MAX_TOP_K {
            return Err(ConfigError::Invalid(format!(
                "OMEM_TOP_K must be between 1 and {MAX_TOP_K}, got {top_k}"
            ))
            .into());
        }

        let min_score: f32 = read_env("OMEM_MIN_SCORE", defaults.min_score)?;
        if !(0.0..=1.0).contains(&min_score) {
            return Err(ConfigError::Invalid(format!(
                "OMEM_MIN_SCORE must be between 0.0 and 1.0, got {min_score}"
            ))
            .into());
        }

        let recency_decay = read_env("OMEM_RECENCY_DECAY", defaults.recency_decay)?;

        let empty_result_text = match std::env::var("OMEM_EMPTY_RESULT_TEXT") {
            Ok(text) if text.is_empty() => None,
            Ok(text) => Some(text),
            Err(_) => defaults.empty_result_text.clone(),
        };

        Ok(Self {
            data_dir,
            top_k,
            min_score,
            recency_decay,
            empty_result_text,
            ..defaults
        })
    }

    /// Get the SQLite database path.
    pub fn sqlite_path(&self) -> std::path::PathBuf {
        self.data_dir.join("omem.db")
    }

    /// Get the SQLite connection URL, creating the database on first use.
    pub fn sqlite_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.sqlite_path().display())
    }
}

/// Parse an env var, falling back to a default when unset.
fn read_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{key} has unparseable value: {raw}")).into()),
        Err(_) => Ok(default),
    }
}
