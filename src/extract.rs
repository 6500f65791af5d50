//! Rule-based fact extraction from conversations.
//!
//! The extractor is a pure function of the conversation and its own
//! configuration: the same input always yields the same facts with the
//! same derived ids, and output is bounded by `max_facts`. It keeps the
//! sentences that look like durable memory material (names, dates,
//! numbers, stated preferences and plans) and drops questions,
//! acknowledgements, and filler.

use crate::error::ExtractError;
use crate::index::tokenize;
use crate::types::{Conversation, Fact, Role};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Matches acknowledgement openers ("ok", "got it", "thanks", ...).
static ACK_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)^(ok(ay)?|got it|thanks(\s+you)?|thank you|sure|no problem|sounds good|will do|done|great|cool|alright|yes|yep|no|nope)\b",
    )
    .expect("ack regex should compile")
});

/// Matches "I'll remember that" style assistant confirmations.
static REMEMBER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\bi\W?ll remember\b|\bi will remember\b")
        .expect("remember regex should compile")
});

/// Matches first-person statements of preference, state, or plan.
static FIRST_PERSON_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)^\s*(i|we)\s+(like|love|hate|prefer|want|need|am|have|had|went|go|will|plan|bought|use|work|live|moved)\b|^\s*(my|our)\s",
    )
    .expect("first-person regex should compile")
});

/// Words that signal a time reference.
const TEMPORAL_WORDS: &[&str] = &[
    "tomorrow", "today", "yesterday", "tonight", "morning", "afternoon", "evening", "noon",
    "midnight", "weekend", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday",
    "sunday", "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december", "next", "week", "month", "year",
];

/// Extractor configuration. Determinism is fixed by contract; these knobs
/// only bound and tune the heuristic.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Hard cap on facts per conversation.
    pub max_facts: usize,
    /// Minimum content tokens (post-stopword) for a sentence to qualify.
    pub min_content_tokens: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_facts: 64,
            min_content_tokens: 2,
        }
    }
}

/// Rule-based salient-sentence extractor.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Extract zero or more facts from a conversation.
    ///
    /// An empty conversation yields zero facts (success). Turns that are
    /// present but entirely blank are unextractable and reported as
    /// [`ExtractError::EmptyContent`]; the service treats that as a
    /// degraded add, not a failure.
    pub fn extract(&self, conversation: &Conversation) -> Result<Vec<Fact>, ExtractError> {
        if conversation.turns.is_empty() {
            return Ok(Vec::new());
        }

        if conversation
            .turns
            .iter()
            .all(|turn| turn.content.trim().is_empty())
        {
            return Err(ExtractError::EmptyContent);
        }

        let mut facts = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (seq, turn) in conversation.turns.iter().enumerate() {
            // System prompts and tool output are plumbing, not memories.
            if !matches!(turn.role, Role::User | Role::Assistant) {
                continue;
            }

            for sentence in split_sentences(&turn.content) {
                let text = normalize_whitespace(&sentence.text);
                if text.is_empty() || sentence.is_question {
                    continue;
                }
                if is_filler(&text) {
                    continue;
                }

                let tokens = tokenize(&text);
                if tokens.len() < self.config.min_content_tokens {
                    continue;
                }
                if !is_salient(&text, &tokens) {
                    continue;
                }

                // Multi-speaker conversations attribute facts to their
                // speaker, so "I went..." from Caroline stays hers and
                // her name becomes a retrieval token.
                let text = match &turn.name {
                    Some(name) => format!("{name}: {text}"),
                    None => text,
                };
                if !seen.insert(text.to_lowercase()) {
                    continue;
                }

                let ordinal = facts.len();
                facts.push(Fact::derived(
                    &conversation.id,
                    seq,
                    ordinal,
                    text,
                    conversation.created_at,
                ));

                if facts.len() >= self.config.max_facts {
                    return Ok(facts);
                }
            }
        }

        Ok(facts)
    }
}

/// A sentence with its terminator classification.
struct Sentence {
    text: String,
    is_question: bool,
}

/// Split on sentence terminators, tagging questions so they can be dropped.
fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut out = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        match c {
            '?' => {
                out.push(Sentence {
                    text: std::mem::take(&mut current),
                    is_question: true,
                });
            }
            '.' | '!' | ';' | '\n' => {
                out.push(Sentence {
                    text: std::mem::take(&mut current),
                    is_question: false,
                });
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        out.push(Sentence {
            text: current,
            is_question: false,
        });
    }

    out
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Acknowledgements and confirmations carry no memory content.
fn is_filler(sentence: &str) -> bool {
    if REMEMBER_RE.is_match(sentence) {
        return true;
    }
    if ACK_RE.is_match(sentence) {
        // A short ack-opener sentence is pure filler; a longer one may
        // still restate a fact and gets a second look from salience.
        return tokenize(sentence).len() <= 3;
    }
    false
}

/// A sentence is salient when it carries at least one concrete signal:
/// a number, a time reference, a proper-noun-looking word past the
/// sentence start, or a first-person statement.
fn is_salient(sentence: &str, tokens: &[String]) -> bool {
    if sentence.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    if tokens.iter().any(|t| TEMPORAL_WORDS.contains(&t.as_str())) {
        return true;
    }
    if FIRST_PERSON_RE.is_match(sentence) {
        return true;
    }

    sentence
        .split_whitespace()
        .skip(1)
        .any(|word| word.chars().next().is_some_and(char::is_uppercase))
}
