//! Context provider ports
//!
//! Read-only snapshot fetchers consulted once per Observe stage. Provider
//! failure degrades the run (no weather, empty schedule) instead of aborting
//! it.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Current weather, reduced to what the decision prompt needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub description: String,
    pub needs_umbrella: bool,
}

/// One calendar entry for the current day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub title: String,
    pub start_time: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Local>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ScheduleEntry {
    pub fn new(title: &str, start_time: DateTime<Local>) -> Self {
        Self {
            title: title.to_string(),
            start_time,
            end_time: None,
            location: None,
        }
    }
}

/// Weather snapshot source (OpenWeatherMap, KMA, a cache... the core does
/// not care).
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self) -> Result<WeatherSnapshot>;
}

/// Today's schedule source for a user.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn today(&self, user_id: &str) -> Result<Vec<ScheduleEntry>>;
}
