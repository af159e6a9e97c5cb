//! Act stage
//!
//! Executes the chosen action and records the outcome. Every outcome when
//! `decision == act` - success or failure - lands in the notification
//! history for audit and later pattern learning. Messenger failures are
//! captured in the result; the loop never raises.

use chrono::Local;
use tracing::{error, info, warn};

use crate::memory::MemoryManager;
use crate::messenger::MessengerPort;
use crate::state::{ActionResult, AgentState, Decision};

/// Fixed prefix on every outbound proactive message.
pub const MESSAGE_PREFIX: &str = "\u{1f916} *nudgebot*";

pub async fn act(
    mut state: AgentState,
    messenger: Option<&dyn MessengerPort>,
    memory: &MemoryManager,
) -> AgentState {
    if state.decision != Decision::Act {
        state.action_result = None;
        return state;
    }

    let Some(action) = state.action.clone() else {
        // Think produced act without an action: a logic error, surfaced as a
        // failed result instead of a crash.
        warn!("decision is act but no action specified");
        let result = ActionResult::failure("unknown", "", "no action specified");
        record(memory, &state.user_id, &result);
        state.action_result = Some(result);
        return state;
    };

    let mut result = ActionResult {
        success: false,
        kind: action.kind.clone(),
        message: action.message.clone(),
        error: None,
        timestamp: Local::now(),
    };

    match action.kind.as_str() {
        "notify" => match messenger {
            Some(messenger) => {
                let text = format!("{MESSAGE_PREFIX}\n\n{}", action.message);
                match messenger.send(&state.user_id, &text).await {
                    Ok(()) => {
                        info!(user_id = %state.user_id, "notification sent");
                        result.success = true;
                        state.today_notification_count += 1;
                    }
                    Err(e) => {
                        warn!("notification send failed: {e}");
                        result.error = Some(e.to_string());
                    }
                }
            }
            None => {
                warn!("no messenger port configured");
                result.error = Some("no messenger port configured".to_string());
            }
        },
        "schedule" => {
            // Present in the wire format, not implemented in this core.
            result.error = Some("schedule action not implemented".to_string());
        }
        other => {
            warn!(kind = other, "unknown action type");
            result.error = Some(format!("unknown action type: {other}"));
        }
    }

    record(memory, &state.user_id, &result);
    state.action_result = Some(result);
    state
}

fn record(memory: &MemoryManager, user_id: &str, result: &ActionResult) {
    if let Err(e) = memory.record_notification(
        user_id,
        &result.message,
        &result.kind,
        result.success,
        result.error.as_deref(),
    ) {
        error!("failed to record notification outcome: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::MessengerError;
    use crate::state::AgentAction;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CollectingMessenger {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl MessengerPort for CollectingMessenger {
        async fn send(&self, user_id: &str, text: &str) -> Result<(), MessengerError> {
            if self.fail {
                return Err(MessengerError::SendFailed("socket closed".to_string()));
            }
            self.sent.lock().push((user_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn temp_memory() -> (TempDir, MemoryManager) {
        let dir = TempDir::new().unwrap();
        let memory = MemoryManager::open(&dir.path().join("memory.db")).unwrap();
        (dir, memory)
    }

    fn acting_state(kind: &str) -> AgentState {
        let mut state = AgentState::new("U1", Local::now());
        state.decision = Decision::Act;
        state.action = Some(AgentAction {
            kind: kind.to_string(),
            message: "rain at 9, take an umbrella".to_string(),
        });
        state
    }

    #[tokio::test]
    async fn test_wait_decision_is_a_noop() {
        let (_dir, memory) = temp_memory();
        let mut state = AgentState::new("U1", Local::now());
        state.decision = Decision::Wait;

        let state = act(state, None, &memory).await;
        assert!(state.action_result.is_none());
        assert_eq!(memory.notifications().count_for_user("U1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notify_sends_prefixed_message_and_records() {
        let (_dir, memory) = temp_memory();
        let messenger = CollectingMessenger::default();

        let state = act(acting_state("notify"), Some(&messenger), &memory).await;

        let result = state.action_result.unwrap();
        assert!(result.success);
        assert_eq!(state.today_notification_count, 1);

        let sent = messenger.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with(MESSAGE_PREFIX));
        assert!(sent[0].1.contains("umbrella"));

        assert_eq!(memory.notifications().count_for_user("U1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_messenger_failure_is_captured_and_recorded() {
        let (_dir, memory) = temp_memory();
        let messenger = CollectingMessenger {
            fail: true,
            ..Default::default()
        };

        let state = act(acting_state("notify"), Some(&messenger), &memory).await;

        let result = state.action_result.unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("socket closed"));
        assert_eq!(state.today_notification_count, 0);

        // Failures land in the audit trail too.
        let records = memory.notifications().recent("U1", 5).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
    }

    #[tokio::test]
    async fn test_missing_action_is_a_failed_result() {
        let (_dir, memory) = temp_memory();
        let mut state = AgentState::new("U1", Local::now());
        state.decision = Decision::Act;
        state.action = None;

        let state = act(state, None, &memory).await;
        let result = state.action_result.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("no action specified"));
        assert_eq!(memory.notifications().count_for_user("U1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_action_kind_is_a_failure() {
        let (_dir, memory) = temp_memory();
        let messenger = CollectingMessenger::default();

        let state = act(acting_state("launch_rocket"), Some(&messenger), &memory).await;

        let result = state.action_result.unwrap();
        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("unknown action type: launch_rocket"));
        assert!(messenger.sent.lock().is_empty());
        assert_eq!(memory.notifications().count_for_user("U1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_schedule_kind_records_not_implemented() {
        let (_dir, memory) = temp_memory();

        let state = act(acting_state("schedule"), None, &memory).await;
        let result = state.action_result.unwrap();
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("schedule action not implemented")
        );
    }

    #[tokio::test]
    async fn test_every_act_produces_exactly_one_record() {
        let (_dir, memory) = temp_memory();
        let messenger = CollectingMessenger::default();

        // success, failure, unknown kind: one record each
        act(acting_state("notify"), Some(&messenger), &memory).await;
        act(acting_state("notify"), None, &memory).await;
        act(acting_state("bogus"), Some(&messenger), &memory).await;

        assert_eq!(memory.notifications().count_for_user("U1").unwrap(), 3);
    }
}
