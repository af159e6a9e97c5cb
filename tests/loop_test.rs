//! End-to-end tests for the decision loop against a real SQLite store,
//! with scripted ports standing in for the LLM and messenger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use tempfile::TempDir;

use nudgebot::agent::MESSAGE_PREFIX;
use nudgebot::context::{CalendarProvider, ScheduleEntry, WeatherProvider, WeatherSnapshot};
use nudgebot::llm::{DecideOutcome, LessonDraft, LessonExtraction, LlmError, LlmPort};
use nudgebot::messenger::{MessengerError, MessengerPort};
use nudgebot::state::{AgentAction, Decision, Reaction};
use nudgebot::{AdaptiveScheduler, Agent, MemoryManager};

struct ScriptedLlm {
    decide_calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new() -> Self {
        Self {
            decide_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmPort for ScriptedLlm {
    async fn decide(&self, _prompt: &str) -> Result<DecideOutcome, LlmError> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DecideOutcome {
            reasoning: "rain expected before the next meeting".to_string(),
            decision: "act".to_string(),
            confidence: 0.85,
            action: Some(AgentAction {
                kind: "notify".to_string(),
                message: "Take an umbrella, rain before your 14:00 meeting".to_string(),
            }),
        })
    }

    async fn extract_lesson(&self, _prompt: &str) -> Result<LessonExtraction, LlmError> {
        Ok(LessonExtraction {
            should_save: true,
            analysis: "weather nudges annoy this user".to_string(),
            lesson: Some(LessonDraft {
                context: "weather notifications".to_string(),
                should_not: "send weather nudges unprompted".to_string(),
                should_instead: "mention weather only alongside schedule reminders".to_string(),
                importance: "medium".to_string(),
            }),
        })
    }
}

struct RecordingMessenger {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessengerPort for RecordingMessenger {
    async fn send(&self, user_id: &str, text: &str) -> Result<(), MessengerError> {
        self.sent.lock().push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

struct RainyWeather;

#[async_trait]
impl WeatherProvider for RainyWeather {
    async fn current(&self) -> anyhow::Result<WeatherSnapshot> {
        Ok(WeatherSnapshot {
            description: "heavy rain".to_string(),
            needs_umbrella: true,
        })
    }
}

struct FailingCalendar;

#[async_trait]
impl CalendarProvider for FailingCalendar {
    async fn today(&self, _user_id: &str) -> anyhow::Result<Vec<ScheduleEntry>> {
        anyhow::bail!("calendar backend unreachable")
    }
}

fn harness() -> (
    TempDir,
    Arc<MemoryManager>,
    Arc<ScriptedLlm>,
    Arc<RecordingMessenger>,
    Agent,
) {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(MemoryManager::open(&dir.path().join("memory.db")).unwrap());
    let llm = Arc::new(ScriptedLlm::new());
    let messenger = Arc::new(RecordingMessenger {
        sent: Mutex::new(Vec::new()),
    });
    let agent = Agent::new(memory.clone())
        .with_llm(llm.clone())
        .with_messenger(messenger.clone())
        .with_weather(Arc::new(RainyWeather))
        .with_calendar(Arc::new(FailingCalendar));
    (dir, memory, llm, messenger, agent)
}

#[tokio::test]
async fn full_loop_acts_and_learns_from_negative_reaction() {
    let (_dir, memory, _llm, messenger, agent) = harness();
    memory.record_user_activity("U1").unwrap();

    let state = agent.run_with_feedback("U1", Some("그만 좀 보내")).await;

    if state.is_quiet_hours {
        // Inside the quiet window the gate wins; nothing goes out.
        assert_eq!(state.decision, Decision::Wait);
        assert!(messenger.sent.lock().is_empty());
        return;
    }

    assert_eq!(state.decision, Decision::Act);
    assert!(state.action_result.as_ref().unwrap().success);

    let sent = messenger.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "U1");
    assert!(sent[0].1.starts_with(MESSAGE_PREFIX));

    // Negative reaction plus a successful action yields a stored lesson.
    assert_eq!(state.user_reaction, Some(Reaction::Negative));
    let lessons = memory.lessons().recent(10).unwrap();
    assert_eq!(lessons.len(), 1);
    assert!(lessons[0].content.contains("send weather nudges unprompted"));

    // The outcome itself landed in the notification history.
    let records = memory.notifications().recent("U1", 10).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
}

#[tokio::test]
async fn daily_cap_blocks_the_run_before_the_model() {
    let (_dir, memory, llm, messenger, agent) = harness();
    memory.record_user_activity("U1").unwrap();
    for i in 0..7 {
        memory
            .record_notification("U1", &format!("nudge {i}"), "notify", true, None)
            .unwrap();
    }

    let state = agent.run_once("U1").await;

    assert_eq!(state.decision, Decision::Wait);
    assert_eq!(llm.decide_calls.load(Ordering::SeqCst), 0);
    assert!(messenger.sent.lock().is_empty());
    // No new record: Act is a no-op on wait.
    assert_eq!(memory.notifications().count_for_user("U1").unwrap(), 7);
}

#[tokio::test]
async fn provider_failures_degrade_instead_of_aborting() {
    let (_dir, memory, _llm, _messenger, agent) = harness();
    memory.record_user_activity("U1").unwrap();

    let state = agent.run_once("U1").await;

    // The calendar provider always fails; the run still completes with an
    // empty schedule and the weather snapshot intact.
    assert!(state.today_schedules.is_empty());
    assert!(state.upcoming_schedule.is_none());
    assert_eq!(state.weather.unwrap().description, "heavy rain");
}

#[tokio::test]
async fn scheduler_sees_users_the_loop_created() {
    let (_dir, memory, _llm, _messenger, agent) = harness();
    let scheduler = AdaptiveScheduler::new(memory.clone());
    let now = Local::now();

    assert!(!scheduler.should_run_now(now).unwrap());

    agent.record_user_activity("U1").unwrap();
    agent.record_user_activity("U2").unwrap();

    let status = scheduler.status(now).unwrap();
    assert_eq!(status.active_users.len(), 2);
    // Fresh users have no learned times and are default-permissive.
    assert_eq!(status.users_to_notify.len(), 2);
    assert!(status.should_run_now);
    assert!(status.next_trigger_per_user["U1"] > now);
}
