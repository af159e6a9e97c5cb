//! Reflect stage
//!
//! Classifies the user's reaction to the action just taken and, on a
//! negative reaction, asks the LLM to extract a durable lesson. The
//! classifier is a pluggable strategy; the default is the keyword table
//! carried over from production, including its positive-before-negative
//! precedence (kept verbatim, intentional or not).

use once_cell::sync::Lazy;
use serde_json::json;
use tracing::{info, warn};

use crate::agent::prompts::reflect_prompt;
use crate::llm::LlmPort;
use crate::memory::MemoryManager;
use crate::state::{AgentState, Reaction};

/// Turns free-form reaction text into a reaction class. Swap in a real
/// sentiment model without touching the loop.
pub trait ReactionClassifier: Send + Sync {
    fn classify(&self, text: Option<&str>) -> Reaction;
}

static POSITIVE_KEYWORDS: Lazy<Vec<&str>> = Lazy::new(|| {
    vec![
        "고마워", "감사", "좋아", "도움", "잘", "완벽", "thanks", "thank you", "great", "helpful",
    ]
});

static NEGATIVE_KEYWORDS: Lazy<Vec<&str>> = Lazy::new(|| {
    vec![
        "그만", "됐어", "필요없", "귀찮", "시끄러", "알았어", "네네", "stop", "quiet", "enough",
    ]
});

/// Default rule-table classifier. Positive keywords are checked before
/// negative ones so phrases like "도움이 됐어" classify positive.
#[derive(Debug, Default)]
pub struct KeywordClassifier;

impl ReactionClassifier for KeywordClassifier {
    fn classify(&self, text: Option<&str>) -> Reaction {
        let Some(text) = text else {
            return Reaction::Neutral;
        };
        let lower = text.to_lowercase();
        if lower.trim().is_empty() {
            return Reaction::Neutral;
        }

        if POSITIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Reaction::Positive;
        }
        if NEGATIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Reaction::Negative;
        }
        Reaction::Neutral
    }
}

pub async fn reflect(
    mut state: AgentState,
    llm: Option<&dyn LlmPort>,
    reaction_text: Option<&str>,
    classifier: &dyn ReactionClassifier,
    memory: &MemoryManager,
) -> AgentState {
    let succeeded = state
        .action_result
        .as_ref()
        .map(|r| r.success)
        .unwrap_or(false);
    if !succeeded {
        state.lesson = None;
        state.user_reaction = None;
        return state;
    }

    let reaction = classifier.classify(reaction_text);
    info!(reaction = reaction.as_str(), "user reaction classified");
    state.user_reaction = Some(reaction);
    state.lesson = None;

    if reaction != Reaction::Negative {
        return state;
    }

    let Some(llm) = llm else {
        warn!("no LLM port configured, skipping lesson extraction");
        return state;
    };

    let prompt = reflect_prompt(&state, reaction_text.unwrap_or("no response"));
    match llm.extract_lesson(&prompt).await {
        Ok(extraction) => {
            if !extraction.should_save {
                return state;
            }
            let Some(draft) = extraction.lesson else {
                return state;
            };

            let content = format!("{} -> {}", draft.should_not, draft.should_instead);
            let context = json!({
                "context": draft.context,
                "importance": draft.importance,
                "analysis": extraction.analysis,
            });

            match memory.record_lesson(&content, context, Reaction::Negative) {
                Ok(lesson) => {
                    info!(lesson_id = %lesson.id, "lesson saved");
                    state.lesson = Some(lesson);
                }
                Err(e) => warn!("lesson persistence failed: {e}"),
            }
        }
        Err(e) => warn!("lesson extraction failed: {e}"),
    }

    state
}
