//! Observe stage
//!
//! Builds the fresh per-run state: clock reading, weather and schedule
//! snapshots from the context providers, notification history and relevant
//! lessons from memory. Provider failures degrade the run (no weather,
//! empty schedule) instead of aborting it.

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::context::{CalendarProvider, WeatherProvider};
use crate::memory::MemoryManager;
use crate::state::AgentState;

pub async fn observe(
    user_id: &str,
    now: DateTime<Local>,
    weather: Option<&dyn WeatherProvider>,
    calendar: Option<&dyn CalendarProvider>,
    memory: &MemoryManager,
) -> AgentState {
    let mut state = AgentState::new(user_id, now);

    if let Some(provider) = weather {
        match provider.current().await {
            Ok(snapshot) => {
                debug!(description = %snapshot.description, "weather observed");
                state.weather = Some(snapshot);
            }
            Err(e) => warn!("weather fetch failed: {e}"),
        }
    }

    if let Some(provider) = calendar {
        match provider.today(user_id).await {
            Ok(mut schedules) => {
                schedules.sort_by_key(|s| s.start_time);
                state.upcoming_schedule = schedules.iter().find(|s| s.start_time > now).cloned();
                state.minutes_to_next = state
                    .upcoming_schedule
                    .as_ref()
                    .map(|s| (s.start_time - now).num_minutes());
                state.today_schedules = schedules;
            }
            Err(e) => warn!("calendar fetch failed: {e}"),
        }
    }

    match memory.notifications().today_count(user_id, now) {
        Ok(count) => state.today_notification_count = count,
        Err(e) => warn!("notification count lookup failed: {e}"),
    }
    match memory.notifications().recent(user_id, 5) {
        Ok(recent) => state.recent_notifications = recent,
        Err(e) => warn!("recent notification lookup failed: {e}"),
    }
    match memory.relevant_lessons(5) {
        Ok(lessons) => state.relevant_lessons = lessons,
        Err(e) => warn!("lesson lookup failed: {e}"),
    }

    debug!(
        user_id,
        period = state.time_period.as_str(),
        quiet = state.is_quiet_hours,
        schedules = state.today_schedules.len(),
        "observe complete"
    );
    state
}
