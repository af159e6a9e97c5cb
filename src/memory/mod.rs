//! Memory subsystem
//!
//! Three repositories (profiles, lessons, notifications) plus the pure
//! pattern analyzer, fronted by `MemoryManager` - a stateless façade that
//! aggregates them into a per-user context and answers policy queries for
//! the scheduler and the loop.

pub mod lessons;
pub mod notifications;
pub mod patterns;
pub mod profiles;

use anyhow::Result;
use chrono::{DateTime, Local, Timelike};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::state::Reaction;
use lessons::{Lesson, LessonRepository};
use notifications::{NotificationRecord, NotificationRepository};
use profiles::{UserPatterns, UserProfile, UserProfileRepository};

/// Everything the loop knows about a user at the start of a run.
#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    pub profile: UserProfile,
    pub lessons: Vec<Lesson>,
    pub notifications: Vec<NotificationRecord>,
}

/// Façade over the memory repositories. Holds no state of its own beyond
/// the repository handles; constructed once at process start and injected
/// everywhere it is needed.
pub struct MemoryManager {
    profiles: UserProfileRepository,
    lessons: LessonRepository,
    notifications: NotificationRepository,
}

impl MemoryManager {
    /// Open all repositories against one SQLite file.
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            profiles: UserProfileRepository::open(db_path)?,
            lessons: LessonRepository::open(db_path)?,
            notifications: NotificationRepository::open(db_path)?,
        })
    }

    pub fn profiles(&self) -> &UserProfileRepository {
        &self.profiles
    }

    pub fn lessons(&self) -> &LessonRepository {
        &self.lessons
    }

    pub fn notifications(&self) -> &NotificationRepository {
        &self.notifications
    }

    /// Profile (created on first contact) plus recent lessons and
    /// notifications.
    pub fn user_context(&self, user_id: &str) -> Result<UserContext> {
        Ok(UserContext {
            profile: self.profiles.get_or_create(user_id)?,
            lessons: self.lessons.recent(5)?,
            notifications: self.notifications.recent(user_id, 5)?,
        })
    }

    /// Mark the user as active now, creating the profile if needed.
    pub fn record_user_activity(&self, user_id: &str) -> Result<bool> {
        self.profiles.get_or_create(user_id)?;
        self.profiles.update_last_active(user_id)
    }

    /// Record an Act outcome into the notification history.
    pub fn record_notification(
        &self,
        user_id: &str,
        message: &str,
        kind: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<String> {
        self.notifications.save(user_id, message, kind, success, error)
    }

    /// Persist a lesson extracted by the Reflect stage.
    pub fn record_lesson(
        &self,
        content: &str,
        context: serde_json::Value,
        user_reaction: Reaction,
    ) -> Result<Lesson> {
        self.lessons.save(content, context, user_reaction)
    }

    /// Lessons to surface in the next Think prompt.
    pub fn relevant_lessons(&self, limit: usize) -> Result<Vec<Lesson>> {
        self.lessons.recent(limit)
    }

    /// Merge newly derived patterns into the stored profile.
    pub fn update_patterns(&self, user_id: &str, derived: &UserPatterns) -> Result<UserPatterns> {
        let profile = self.profiles.get_or_create(user_id)?;
        let merged = patterns::merge(&profile.patterns, derived);
        self.profiles.update_patterns(user_id, &merged)?;
        debug!(user_id, "user patterns updated");
        Ok(merged)
    }

    /// Whether this user is eligible for a proactive contact right now.
    ///
    /// Unknown users are not notified. Users without learned preferred
    /// times are default-permissive; otherwise the current hour has to
    /// match one of the preferred times (hour granularity: 08:15 matches a
    /// preference for 08:00).
    pub fn should_notify(&self, user_id: &str, now: DateTime<Local>) -> Result<bool> {
        let Some(profile) = self.profiles.get(user_id)? else {
            return Ok(false);
        };

        let preferred = &profile.patterns.preferred_notification_times;
        if preferred.is_empty() {
            return Ok(true);
        }

        let hour = now.hour();
        Ok(preferred.iter().any(|t| t.hour() == hour))
    }

    /// All known users, for the scheduler's eligibility sweep.
    pub fn active_users(&self) -> Result<Vec<UserProfile>> {
        self.profiles.get_all()
    }
}
