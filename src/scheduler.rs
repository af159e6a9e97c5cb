//! Adaptive scheduler
//!
//! Decides when the decision loop should run, and for whom, from the
//! active-user set and each user's learned patterns. Trigger times come
//! from `preferred_notification_times`; users without learned times get
//! the fixed defaults.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone, Timelike};
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::memory::profiles::{UserPatterns, UserPreferences};
use crate::memory::MemoryManager;

/// Trigger times used when a user has no learned preferred times.
pub static DEFAULT_TRIGGER_TIMES: Lazy<Vec<NaiveTime>> = Lazy::new(|| {
    vec![
        NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
    ]
});

/// Snapshot of the scheduler's view of the world, for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub active_users: Vec<String>,
    pub users_to_notify: Vec<String>,
    pub next_trigger_per_user: BTreeMap<String, DateTime<Local>>,
    pub should_run_now: bool,
}

pub struct AdaptiveScheduler {
    memory: Arc<MemoryManager>,
}

impl AdaptiveScheduler {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self { memory }
    }

    /// True iff there is at least one user eligible for contact right now.
    pub fn should_run_now(&self, now: DateTime<Local>) -> Result<bool> {
        if self.memory.active_users()?.is_empty() {
            return Ok(false);
        }
        Ok(!self.users_to_notify(now)?.is_empty())
    }

    /// Active users whose preferred times (or default permissiveness) match
    /// the current hour.
    pub fn users_to_notify(&self, now: DateTime<Local>) -> Result<Vec<String>> {
        let mut eligible = Vec::new();
        for profile in self.memory.active_users()? {
            if self.memory.should_notify(&profile.user_id, now)? {
                eligible.push(profile.user_id);
            }
        }
        Ok(eligible)
    }

    /// Next trigger instant for one user, from their stored patterns.
    pub fn next_trigger_for(&self, user_id: &str, now: DateTime<Local>) -> Result<DateTime<Local>> {
        let patterns = self
            .memory
            .profiles()
            .get(user_id)?
            .map(|p| p.patterns)
            .unwrap_or_default();
        Ok(calculate_next_trigger(&patterns, now))
    }

    pub fn status(&self, now: DateTime<Local>) -> Result<SchedulerStatus> {
        let active: Vec<String> = self
            .memory
            .active_users()?
            .into_iter()
            .map(|p| p.user_id)
            .collect();

        let users_to_notify = self.users_to_notify(now)?;

        let mut next_trigger_per_user = BTreeMap::new();
        for user_id in &active {
            next_trigger_per_user.insert(user_id.clone(), self.next_trigger_for(user_id, now)?);
        }

        Ok(SchedulerStatus {
            should_run_now: !active.is_empty() && !users_to_notify.is_empty(),
            active_users: active,
            users_to_notify,
            next_trigger_per_user,
        })
    }

    /// Poll loop: every `poll_interval`, run the loop once for each user
    /// eligible at that moment. Runs until the task is dropped.
    pub async fn run(&self, agent: Arc<Agent>, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = poll_interval.as_secs(), "scheduler started");

        loop {
            ticker.tick().await;
            let now = Local::now();

            let eligible = match self.users_to_notify(now) {
                Ok(users) => users,
                Err(e) => {
                    warn!("eligibility sweep failed: {e}");
                    continue;
                }
            };

            if eligible.is_empty() {
                continue;
            }
            info!(count = eligible.len(), "running loop for eligible users");
            for user_id in eligible {
                agent.run_once(&user_id).await;
            }
        }
    }
}

/// Earliest trigger strictly later than `now` today; failing that, the
/// earliest trigger tomorrow; with no trigger times at all, one hour from
/// now.
pub fn calculate_next_trigger(patterns: &UserPatterns, now: DateTime<Local>) -> DateTime<Local> {
    let times: Vec<NaiveTime> = if patterns.preferred_notification_times.is_empty() {
        DEFAULT_TRIGGER_TIMES.clone()
    } else {
        patterns
            .preferred_notification_times
            .iter()
            .copied()
            .collect()
    };

    if times.is_empty() {
        return now + chrono::Duration::hours(1);
    }

    let today = now.date_naive();
    for &time in &times {
        let candidate = at_local(today, time, now);
        if candidate > now {
            return candidate;
        }
    }

    let earliest = times.iter().copied().min().unwrap_or_else(|| times[0]);
    at_local(today + chrono::Duration::days(1), earliest, now)
}

/// Quiet-hours check with wraparound support. No configured window means
/// never quiet.
pub fn is_quiet_hours(preferences: &UserPreferences, now: DateTime<Local>) -> bool {
    match &preferences.quiet_hours {
        Some(window) => window.contains(now.time()),
        None => false,
    }
}

fn at_local(date: chrono::NaiveDate, time: NaiveTime, fallback: DateTime<Local>) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(
            date.year(),
            date.month(),
            date.day(),
            time.hour(),
            time.minute(),
            time.second(),
        )
        .single()
        // DST gaps make some local times unrepresentable; skip ahead rather
        // than crash.
        .unwrap_or_else(|| fallback + chrono::Duration::hours(1))
}
