//! Per-run agent state
//!
//! One `AgentState` is created fresh for every loop run, owned exclusively
//! by that run, and discarded after side effects are persisted. Only the
//! memory repositories carry information across runs.

use chrono::{DateTime, Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::context::{ScheduleEntry, WeatherSnapshot};
use crate::memory::lessons::Lesson;
use crate::memory::notifications::NotificationRecord;

/// Coarse time-of-day bucket used in prompts and pattern learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimePeriod {
    /// Bucket an hour of day: morning 5-12, afternoon 12-17, evening 17-21,
    /// night otherwise.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }
}

/// Outcome of the Think stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// No verdict yet (business rules passed, LLM judgment required).
    Pending,
    /// Perform the chosen action.
    Act,
    /// Do nothing this run.
    Wait,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Act => "act",
            Self::Wait => "wait",
        }
    }
}

/// Classified user reaction to a proactive message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Positive,
    Negative,
    Neutral,
}

impl Reaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

/// Action chosen by the Think stage.
///
/// `kind` is kept as a string because it comes straight from model output;
/// the Act stage records unrecognized kinds as explicit failures instead of
/// rejecting them at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// Result of executing an action in the Act stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl ActionResult {
    pub fn failure(kind: &str, message: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: kind.to_string(),
            message: message.to_string(),
            error: Some(error.into()),
            timestamp: Local::now(),
        }
    }
}

/// Snapshot of one loop run: time and environment observations, the decision
/// taken, and what came of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub user_id: String,

    // Time
    pub current_time: DateTime<Local>,
    pub time_period: TimePeriod,
    pub is_quiet_hours: bool,

    // Environment
    pub weather: Option<WeatherSnapshot>,
    pub today_schedules: Vec<ScheduleEntry>,
    pub upcoming_schedule: Option<ScheduleEntry>,
    pub minutes_to_next: Option<i64>,

    // Notification history
    pub today_notification_count: u32,
    pub recent_notifications: Vec<NotificationRecord>,

    // Learned lessons relevant to this run
    pub relevant_lessons: Vec<Lesson>,

    // Think
    pub decision: Decision,
    pub reasoning: String,
    pub confidence: f64,
    pub action: Option<AgentAction>,

    // Act
    pub action_result: Option<ActionResult>,

    // Reflect
    pub user_reaction: Option<Reaction>,
    pub lesson: Option<Lesson>,
}

impl AgentState {
    /// Fresh state for a new run at the given clock reading.
    pub fn new(user_id: &str, now: DateTime<Local>) -> Self {
        Self {
            user_id: user_id.to_string(),
            current_time: now,
            time_period: TimePeriod::from_hour(now.hour()),
            is_quiet_hours: default_quiet_hours(now),
            weather: None,
            today_schedules: Vec::new(),
            upcoming_schedule: None,
            minutes_to_next: None,
            today_notification_count: 0,
            recent_notifications: Vec::new(),
            relevant_lessons: Vec::new(),
            decision: Decision::Pending,
            reasoning: String::new(),
            confidence: 0.0,
            action: None,
            action_result: None,
            user_reaction: None,
            lesson: None,
        }
    }
}

/// Built-in quiet window (23:00-07:00) used when the profile carries no
/// configured window.
pub fn default_quiet_hours(now: DateTime<Local>) -> bool {
    let hour = now.hour();
    hour >= 23 || hour < 7
}

/// Local wall-clock time from a stored unix timestamp. Falls back to now for
/// out-of-range values rather than panicking.
pub fn local_from_epoch(ts: i64) -> DateTime<Local> {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .unwrap_or_else(Local::now)
}
