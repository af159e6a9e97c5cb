//! Business-rule gate
//!
//! Hard pre-filters evaluated before any LLM call. Zero I/O; the ordering
//! ahead of the model call is load-bearing for cost control and for the
//! quiet-hours guarantee.

use crate::state::{AgentState, Decision};

/// Hard ceiling on proactive notifications per user per day.
pub const DAILY_NOTIFICATION_CAP: u32 = 7;

/// Verdict of the rule gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub decision: Decision,
    pub reasoning: String,
    pub confidence: f64,
}

/// Apply the hard rules. Returns `Wait` with full confidence when a rule
/// fires, otherwise `Pending` meaning LLM judgment is required.
pub fn apply_rules(state: &AgentState) -> GateOutcome {
    // Rule 1: quiet hours. No urgency exceptions.
    if state.is_quiet_hours {
        return GateOutcome {
            decision: Decision::Wait,
            reasoning: "quiet hours".to_string(),
            confidence: 1.0,
        };
    }

    // Rule 2: daily notification cap.
    if state.today_notification_count >= DAILY_NOTIFICATION_CAP {
        return GateOutcome {
            decision: Decision::Wait,
            reasoning: format!(
                "daily notification cap reached ({}/{DAILY_NOTIFICATION_CAP})",
                state.today_notification_count
            ),
            confidence: 1.0,
        };
    }

    GateOutcome {
        decision: Decision::Pending,
        reasoning: "rules passed, LLM judgment required".to_string(),
        confidence: 0.0,
    }
}
