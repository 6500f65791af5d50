//! Rendering search results into LLM-ready context blocks.

use crate::types::SearchResult;

/// Format a result as a deterministic text block: a fixed header, then one
/// fact per line, most relevant first. Identical results always format
/// identically. An empty result renders the configured placeholder text
/// (empty string when unset).
pub fn format_results(result: &SearchResult) -> String {
    if result.is_empty() {
        return result.empty_text.clone().unwrap_or_default();
    }

    let mut out = String::from("Relevant memories:");
    for item in &result.items {
        out.push_str("\n- ");
        out.push_str(&item.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RankedFact;
    use indoc::indoc;

    fn item(fact_id: &str, text: &str, score: f32) -> RankedFact {
        RankedFact {
            fact_id: fact_id.to_string(),
            text: text.to_string(),
            score,
            source_conversation_id: "conv-001".to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn formats_one_fact_per_line_most_relevant_first() {
        let result = SearchResult {
            items: vec![
                item("f1", "Meeting with Caroline tomorrow at West Lake", 0.92),
                item("f2", "User prefers short answers", 0.41),
            ],
            empty_text: None,
        };

        assert_eq!(
            result.to_prompt(),
            indoc! {"
                Relevant memories:
                - Meeting with Caroline tomorrow at West Lake
                - User prefers short answers"
            }
        );
    }

    #[test]
    fn empty_result_uses_configured_text() {
        let result = SearchResult::empty(Some("No relevant memories found.".to_string()));
        assert_eq!(result.to_prompt(), "No relevant memories found.");

        let silent = SearchResult::empty(None);
        assert_eq!(silent.to_prompt(), "");
    }

    #[test]
    fn identical_results_format_identically() {
        let result = SearchResult {
            items: vec![item("f1", "Caroline likes green tea", 0.8)],
            empty_text: Some("nothing".to_string()),
        };
        assert_eq!(format_results(&result), format_results(&result.clone()));
    }
}
