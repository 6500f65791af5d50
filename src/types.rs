//! Core data types: conversations, turns, facts, search results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a single conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A single message in a conversation. Value type, no identity of its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    /// Message content. Accepts `text` as a wire alias.
    #[serde(alias = "text")]
    pub content: String,
    /// Speaker name for multi-speaker conversations; drives speaker
    /// attribution during extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Caller-supplied stable identifier for this turn, for evidence
    /// tracing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    /// When the turn was uttered, for temporal queries. Accepts
    /// `timestamp_iso` as a wire alias.
    #[serde(default, alias = "timestamp_iso", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            turn_id: None,
            timestamp: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Set the speaker name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the stable turn identifier.
    pub fn with_turn_id(mut self, turn_id: impl Into<String>) -> Self {
        self.turn_id = Some(turn_id.into());
        self
    }

    /// Set the utterance timestamp.
    pub fn with_timestamp(mut self, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A caller-submitted, identified sequence of dialogue turns.
///
/// Immutable once persisted; re-adding the same id is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub turns: Vec<Turn>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Conversation {
    /// Create a new conversation stamped with the current time.
    pub fn new(id: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            id: id.into(),
            turns,
            created_at: chrono::Utc::now(),
        }
    }
}

/// A discrete memory statement extracted from a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fact {
    pub id: String,
    pub conversation_id: String,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Fact {
    /// Create a fact with an id derived from its provenance.
    ///
    /// The id is a UUIDv5 over `conversation_id:turn_seq:ordinal:text`, so
    /// extraction is a pure function of its input: the same conversation
    /// always yields the same fact ids. Conversation ids are unique, which
    /// makes fact ids unique store-wide.
    pub fn derived(
        conversation_id: &str,
        turn_seq: usize,
        ordinal: usize,
        text: impl Into<String>,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let text = text.into();
        let name = format!("{conversation_id}:{turn_seq}:{ordinal}:{text}");
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();

        Self {
            id,
            conversation_id: conversation_id.to_string(),
            text,
            embedding: None,
            created_at,
        }
    }
}

/// A single ranked search hit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedFact {
    pub fact_id: String,
    pub text: String,
    pub score: f32,
    pub source_conversation_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Ordered result of a search, most relevant first.
///
/// "Nothing relevant found" is an empty result, never an error. A fresh
/// search recomputes; results are not restartable cursors.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub items: Vec<RankedFact>,
    /// What [`to_prompt`](Self::to_prompt) emits when there are no items.
    /// `None` means an empty string.
    pub empty_text: Option<String>,
}

impl SearchResult {
    /// An empty result carrying the configured placeholder text.
    pub fn empty(empty_text: Option<String>) -> Self {
        Self {
            items: Vec::new(),
            empty_text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RankedFact> {
        self.items.iter()
    }

    /// Render the result as a text block for LLM context injection.
    ///
    /// Deterministic: identical results always format identically.
    pub fn to_prompt(&self) -> String {
        crate::prompt::format_results(self)
    }
}

impl<'a> IntoIterator for &'a SearchResult {
    type Item = &'a RankedFact;
    type IntoIter = std::slice::Iter<'a, RankedFact>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
