//! Think stage
//!
//! Business rules first, then LLM judgment under a confidence gate. Every
//! failure path - missing port, transport error, malformed response - maps
//! to waiting; nothing propagates out of this stage.

use tracing::{info, warn};

use crate::agent::prompts::think_prompt;
use crate::agent::rules::apply_rules;
use crate::llm::LlmPort;
use crate::state::{AgentState, Decision};

/// Model decisions below this confidence are downgraded to waiting.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

pub async fn think(mut state: AgentState, llm: Option<&dyn LlmPort>) -> AgentState {
    let gate = apply_rules(&state);
    if gate.decision == Decision::Wait {
        info!(reasoning = %gate.reasoning, "rule gate: wait");
        state.decision = Decision::Wait;
        state.reasoning = gate.reasoning;
        state.confidence = gate.confidence;
        state.action = None;
        return state;
    }

    let Some(llm) = llm else {
        warn!("no LLM port configured, waiting");
        state.decision = Decision::Wait;
        state.reasoning = "no LLM port configured".to_string();
        state.confidence = 0.0;
        state.action = None;
        return state;
    };

    let prompt = think_prompt(&state);
    match llm.decide(&prompt).await {
        Ok(outcome) => {
            let mut decision = if outcome.decision == "act" {
                Decision::Act
            } else {
                Decision::Wait
            };
            let mut reasoning = outcome.reasoning;

            if outcome.confidence < CONFIDENCE_THRESHOLD {
                if decision == Decision::Act {
                    info!(
                        confidence = outcome.confidence,
                        "confidence below threshold, downgrading to wait"
                    );
                }
                decision = Decision::Wait;
                reasoning.push_str(" (confidence below threshold, waiting)");
            }

            info!(
                decision = decision.as_str(),
                confidence = outcome.confidence,
                "think complete"
            );

            state.decision = decision;
            state.reasoning = reasoning;
            state.confidence = outcome.confidence;
            state.action = outcome.action;
        }
        Err(e) => {
            warn!("llm decide failed: {e}");
            state.decision = Decision::Wait;
            state.reasoning = format!("llm call failed: {e}");
            state.confidence = 0.0;
            state.action = None;
        }
    }

    state
}
