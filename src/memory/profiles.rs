//! User profile repository
//!
//! One row per user: identity timestamps plus two JSON columns for
//! preferences (configured) and patterns (learned). Profiles are created on
//! first contact and never deleted automatically.

use anyhow::Result;
use chrono::{DateTime, Local, NaiveTime};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::state::local_from_epoch;

/// A quiet window during which no proactive contact happens. Supports
/// wraparound (start > end spans midnight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether `time` falls inside the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start > self.end {
            time >= self.start || time < self.end
        } else {
            self.start <= time && time < self.end
        }
    }
}

/// Explicitly configured per-user settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Behavioral signals learned from schedules, messages and notification
/// feedback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatterns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wake_up_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commute_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub preferred_notification_times: BTreeSet<NaiveTime>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub interests: BTreeSet<String>,
}

/// Stored profile for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub first_seen_at: DateTime<Local>,
    pub last_active_at: DateTime<Local>,
    pub preferences: UserPreferences,
    pub patterns: UserPatterns,
}

pub struct UserProfileRepository {
    conn: Mutex<Connection>,
}

impl UserProfileRepository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;
        info!("user profile repository opened: {}", path.display());
        Ok(repo)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                first_seen_at INTEGER NOT NULL,
                last_active_at INTEGER NOT NULL,
                preferences TEXT NOT NULL DEFAULT '{}',
                patterns TEXT NOT NULL DEFAULT '{}'
            );
            "#,
        )?;
        Ok(())
    }

    /// Create a profile if none exists. Returns false when the user was
    /// already known.
    pub fn create(&self, user_id: &str) -> Result<bool> {
        let now = Local::now().timestamp();
        let rows = self.conn.lock().execute(
            r#"
            INSERT OR IGNORE INTO user_profiles
                (user_id, first_seen_at, last_active_at, preferences, patterns)
            VALUES (?1, ?2, ?2, '{}', '{}')
            "#,
            params![user_id, now],
        )?;
        if rows > 0 {
            debug!(user_id, "user profile created");
        }
        Ok(rows > 0)
    }

    pub fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id, first_seen_at, last_active_at, preferences, patterns
             FROM user_profiles WHERE user_id = ?1",
        )?;
        let result = stmt.query_row(params![user_id], row_to_profile);
        match result {
            Ok(profile) => Ok(Some(profile)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_or_create(&self, user_id: &str) -> Result<UserProfile> {
        if let Some(profile) = self.get(user_id)? {
            return Ok(profile);
        }
        self.create(user_id)?;
        self.get(user_id)?
            .ok_or_else(|| anyhow::anyhow!("profile vanished after create: {user_id}"))
    }

    pub fn get_all(&self) -> Result<Vec<UserProfile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id, first_seen_at, last_active_at, preferences, patterns
             FROM user_profiles ORDER BY user_id",
        )?;
        let profiles = stmt
            .query_map([], row_to_profile)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(profiles)
    }

    /// Bump the last-active timestamp. Monotonically non-decreasing: a stale
    /// clock never moves it backwards.
    pub fn update_last_active(&self, user_id: &str) -> Result<bool> {
        let now = Local::now().timestamp();
        let rows = self.conn.lock().execute(
            "UPDATE user_profiles SET last_active_at = MAX(last_active_at, ?1) WHERE user_id = ?2",
            params![now, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn update_preferences(&self, user_id: &str, preferences: &UserPreferences) -> Result<bool> {
        let json = serde_json::to_string(preferences)?;
        let rows = self.conn.lock().execute(
            "UPDATE user_profiles SET preferences = ?1 WHERE user_id = ?2",
            params![json, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn update_patterns(&self, user_id: &str, patterns: &UserPatterns) -> Result<bool> {
        let json = serde_json::to_string(patterns)?;
        let rows = self.conn.lock().execute(
            "UPDATE user_profiles SET patterns = ?1 WHERE user_id = ?2",
            params![json, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn delete(&self, user_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM user_profiles WHERE user_id = ?1", params![user_id])?;
        Ok(rows > 0)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let preferences: String = row.get(3)?;
    let patterns: String = row.get(4)?;
    Ok(UserProfile {
        user_id: row.get(0)?,
        first_seen_at: local_from_epoch(row.get(1)?),
        last_active_at: local_from_epoch(row.get(2)?),
        preferences: serde_json::from_str(&preferences).unwrap_or_default(),
        patterns: serde_json::from_str(&patterns).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_repo() -> (TempDir, UserProfileRepository) {
        let dir = TempDir::new().unwrap();
        let repo = UserProfileRepository::open(&dir.path().join("memory.db")).unwrap();
        (dir, repo)
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (_dir, repo) = temp_repo();

        let first = repo.get_or_create("U1").unwrap();
        let second = repo.get_or_create("U1").unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert_eq!(first.first_seen_at, second.first_seen_at);
        assert_eq!(repo.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_profile_is_none() {
        let (_dir, repo) = temp_repo();
        assert!(repo.get("nobody").unwrap().is_none());
    }

    #[test]
    fn test_patterns_round_trip() {
        let (_dir, repo) = temp_repo();
        repo.create("U1").unwrap();

        let mut patterns = UserPatterns::default();
        patterns.commute_time = Some(hm(8, 30));
        patterns.wake_up_time = Some(hm(7, 0));
        patterns.preferred_notification_times.insert(hm(8, 0));
        patterns.interests.insert("weather".to_string());

        assert!(repo.update_patterns("U1", &patterns).unwrap());
        let loaded = repo.get("U1").unwrap().unwrap();
        assert_eq!(loaded.patterns, patterns);
    }

    #[test]
    fn test_preferences_round_trip() {
        let (_dir, repo) = temp_repo();
        repo.create("U1").unwrap();

        let preferences = UserPreferences {
            quiet_hours: Some(QuietHours::new(hm(22, 0), hm(8, 0))),
            channel: Some("dm".to_string()),
            city: Some("Seoul".to_string()),
        };
        assert!(repo.update_preferences("U1", &preferences).unwrap());
        let loaded = repo.get("U1").unwrap().unwrap();
        assert_eq!(loaded.preferences, preferences);
    }

    #[test]
    fn test_update_last_active_requires_profile() {
        let (_dir, repo) = temp_repo();
        assert!(!repo.update_last_active("ghost").unwrap());
        repo.create("U1").unwrap();
        assert!(repo.update_last_active("U1").unwrap());
    }

    #[test]
    fn test_quiet_hours_wraparound() {
        let window = QuietHours::new(hm(22, 0), hm(8, 0));
        assert!(window.contains(hm(23, 30)));
        assert!(window.contains(hm(3, 0)));
        assert!(!window.contains(hm(12, 0)));
        assert!(!window.contains(hm(8, 0)));

        let same_day = QuietHours::new(hm(13, 0), hm(15, 0));
        assert!(same_day.contains(hm(14, 0)));
        assert!(!same_day.contains(hm(15, 0)));
        assert!(!same_day.contains(hm(20, 0)));
    }
}
