//! Autonomous decision loop
//!
//! One run of the loop is Observe -> Think -> Act -> Reflect over a fresh
//! per-run `AgentState`. The `Agent` service owns the wiring: memory, the
//! context providers, the LLM and messenger ports, and the reaction
//! classifier. Runs are re-entrant; nothing a run learns lives outside
//! memory.

pub mod act;
pub mod observe;
pub mod prompts;
pub mod reflect;
pub mod rules;
pub mod think;

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tracing::info;

use crate::context::{CalendarProvider, ScheduleEntry, WeatherProvider};
use crate::llm::LlmPort;
use crate::memory::patterns::{self, TimedMessage};
use crate::memory::profiles::UserPatterns;
use crate::memory::{MemoryManager, UserContext};
use crate::messenger::MessengerPort;
use crate::state::{AgentState, Reaction};

pub use act::MESSAGE_PREFIX;
pub use reflect::{KeywordClassifier, ReactionClassifier};
pub use rules::DAILY_NOTIFICATION_CAP;
pub use think::CONFIDENCE_THRESHOLD;

/// The proactive agent. All ports are optional; a missing port degrades the
/// corresponding stage instead of failing the run.
pub struct Agent {
    memory: Arc<MemoryManager>,
    llm: Option<Arc<dyn LlmPort>>,
    messenger: Option<Arc<dyn MessengerPort>>,
    weather: Option<Arc<dyn WeatherProvider>>,
    calendar: Option<Arc<dyn CalendarProvider>>,
    classifier: Box<dyn ReactionClassifier>,
}

impl Agent {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self {
            memory,
            llm: None,
            messenger: None,
            weather: None,
            calendar: None,
            classifier: Box::new(KeywordClassifier),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmPort>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn MessengerPort>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    pub fn with_weather(mut self, weather: Arc<dyn WeatherProvider>) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarProvider>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ReactionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Run the full loop once for one user. Reflect runs without reaction
    /// text; feedback arriving later goes through [`Agent::record_feedback`].
    pub async fn run_once(&self, user_id: &str) -> AgentState {
        self.run_with_feedback(user_id, None).await
    }

    /// Run the full loop once with reaction text already in hand (used by
    /// tests and synchronous channels where the reply is immediate).
    pub async fn run_with_feedback(
        &self,
        user_id: &str,
        reaction_text: Option<&str>,
    ) -> AgentState {
        let now = Local::now();
        info!(user_id, "agent run started");

        let state = observe::observe(
            user_id,
            now,
            self.weather.as_deref(),
            self.calendar.as_deref(),
            &self.memory,
        )
        .await;

        let state = think::think(state, self.llm.as_deref()).await;
        let state = act::act(state, self.messenger.as_deref(), &self.memory).await;
        let state = reflect::reflect(
            state,
            self.llm.as_deref(),
            reaction_text,
            self.classifier.as_ref(),
            &self.memory,
        )
        .await;

        info!(
            user_id,
            decision = state.decision.as_str(),
            acted = state.action_result.is_some(),
            "agent run finished"
        );
        state
    }

    pub fn user_context(&self, user_id: &str) -> Result<UserContext> {
        self.memory.user_context(user_id)
    }

    pub fn record_user_activity(&self, user_id: &str) -> Result<bool> {
        self.memory.record_user_activity(user_id)
    }

    /// Classify an out-of-band user reply and attach it to the latest
    /// notification. Returns the classified reaction.
    pub fn record_feedback(&self, user_id: &str, text: &str) -> Result<Reaction> {
        let reaction = self.classifier.classify(Some(text));
        if let Some(record) = self.memory.notifications().recent(user_id, 1)?.first() {
            self.memory
                .notifications()
                .record_reaction(&record.id, reaction)?;
        }
        Ok(reaction)
    }

    /// Derive patterns from the user's schedules, messages and stored
    /// notification feedback, then merge them into the profile.
    pub fn learn_patterns(
        &self,
        user_id: &str,
        schedules: &[ScheduleEntry],
        messages: &[TimedMessage],
    ) -> Result<UserPatterns> {
        let mut derived = patterns::extract_from_schedules(schedules);

        let texts: Vec<String> = messages.iter().map(|m| m.text.clone()).collect();
        derived.interests = patterns::extract_interests(&texts);

        if let Some(quiet) = patterns::extract_quiet_hours(messages) {
            let profile = self.memory.profiles().get_or_create(user_id)?;
            let mut preferences = profile.preferences;
            preferences.quiet_hours = Some(quiet);
            self.memory
                .profiles()
                .update_preferences(user_id, &preferences)?;
        }

        let recent = self.memory.notifications().recent(user_id, 100)?;
        derived
            .preferred_notification_times
            .extend(patterns::analyze_feedback(&recent));

        self.memory.update_patterns(user_id, &derived)
    }
}
