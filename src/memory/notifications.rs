//! Notification history repository
//!
//! Every Act outcome, success or failure, lands here for audit and pattern
//! learning. History is capped at 100 records per user; the insert and the
//! eviction of the oldest records run in one transaction.

use anyhow::Result;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::state::{local_from_epoch, Reaction};

/// Maximum records kept per user; oldest evicted first.
pub const MAX_NOTIFICATIONS_PER_USER: usize = 100;

/// One delivered (or attempted) proactive message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub kind: String,
    pub sent_at: DateTime<Local>,
    /// Whether delivery succeeded. Failed attempts stay in the audit trail.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_reaction: Option<Reaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction_at: Option<DateTime<Local>>,
}

pub struct NotificationRepository {
    conn: Mutex<Connection>,
}

impl NotificationRepository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;
        info!("notification repository opened: {}", path.display());
        Ok(repo)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notification_history (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                message TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'general',
                sent_at INTEGER NOT NULL,
                success INTEGER NOT NULL DEFAULT 1,
                error TEXT,
                user_reaction TEXT,
                reaction_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_user
                ON notification_history(user_id, sent_at DESC);
            "#,
        )?;
        Ok(())
    }

    /// Record an Act outcome and evict past the per-user cap atomically.
    pub fn save(
        &self,
        user_id: &str,
        message: &str,
        kind: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let sent_at = Local::now().timestamp();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO notification_history (id, user_id, message, kind, sent_at, success, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, user_id, message, kind, sent_at, success, error],
        )?;
        tx.execute(
            "DELETE FROM notification_history WHERE id IN (
                SELECT id FROM notification_history
                WHERE user_id = ?1
                ORDER BY sent_at DESC, rowid DESC
                LIMIT -1 OFFSET ?2
            )",
            params![user_id, MAX_NOTIFICATIONS_PER_USER],
        )?;
        tx.commit()?;

        debug!(notification_id = %id, user_id, success, "notification recorded");
        Ok(id)
    }

    pub fn get(&self, notification_id: &str) -> Result<Option<NotificationRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
        match stmt.query_row(params![notification_id], row_to_record) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Most recent records for a user, newest first.
    pub fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY sent_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let records = stmt
            .query_map(params![user_id, limit], row_to_record)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    pub fn count_for_user(&self, user_id: &str) -> Result<usize> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM notification_history WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Successful deliveries since local midnight. Feeds the daily cap.
    pub fn today_count(&self, user_id: &str, now: DateTime<Local>) -> Result<u32> {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| {
                dt.and_local_timezone(Local)
                    .earliest()
                    .map(|t| t.timestamp())
                    .unwrap_or_else(|| now.timestamp() - 86_400)
            })
            .unwrap_or_else(|| now.timestamp() - 86_400);

        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM notification_history
             WHERE user_id = ?1 AND success = 1 AND sent_at >= ?2",
            params![user_id, midnight],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Attach a user reaction to an already-sent notification.
    pub fn record_reaction(&self, notification_id: &str, reaction: Reaction) -> Result<bool> {
        let reaction_at = Local::now().timestamp();
        let rows = self.conn.lock().execute(
            "UPDATE notification_history SET user_reaction = ?1, reaction_at = ?2 WHERE id = ?3",
            params![reaction.as_str(), reaction_at, notification_id],
        )?;
        Ok(rows > 0)
    }
}

const SELECT_COLUMNS: &str = "SELECT id, user_id, message, kind, sent_at, success, error, \
     user_reaction, reaction_at FROM notification_history";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRecord> {
    let reaction: Option<String> = row.get(7)?;
    let reaction_at: Option<i64> = row.get(8)?;
    Ok(NotificationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message: row.get(2)?,
        kind: row.get(3)?,
        sent_at: local_from_epoch(row.get(4)?),
        success: row.get(5)?,
        error: row.get(6)?,
        user_reaction: reaction.as_deref().map(Reaction::parse),
        reaction_at: reaction_at.map(local_from_epoch),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_repo() -> (TempDir, NotificationRepository) {
        let dir = TempDir::new().unwrap();
        let repo = NotificationRepository::open(&dir.path().join("memory.db")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_save_and_get() {
        let (_dir, repo) = temp_repo();

        let id = repo
            .save("U1", "rain expected at 9", "notify", true, None)
            .unwrap();
        let record = repo.get(&id).unwrap().unwrap();
        assert_eq!(record.user_id, "U1");
        assert!(record.success);
        assert!(record.user_reaction.is_none());
    }

    #[test]
    fn test_failures_are_kept_in_audit_trail() {
        let (_dir, repo) = temp_repo();

        let id = repo
            .save("U1", "oops", "notify", false, Some("send failed: timeout"))
            .unwrap();
        let record = repo.get(&id).unwrap().unwrap();
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("send failed: timeout"));
    }

    #[test]
    fn test_per_user_cap_evicts_oldest() {
        let (_dir, repo) = temp_repo();

        for i in 0..120 {
            repo.save("U1", &format!("msg {i}"), "notify", true, None)
                .unwrap();
        }
        // Another user's history is untouched by U1's eviction.
        repo.save("U2", "other", "notify", true, None).unwrap();

        assert_eq!(repo.count_for_user("U1").unwrap(), MAX_NOTIFICATIONS_PER_USER);
        assert_eq!(repo.count_for_user("U2").unwrap(), 1);

        let recent = repo.recent("U1", MAX_NOTIFICATIONS_PER_USER).unwrap();
        assert_eq!(recent.first().unwrap().message, "msg 119");
        assert_eq!(recent.last().unwrap().message, "msg 20");
    }

    #[test]
    fn test_today_count_ignores_failures() {
        let (_dir, repo) = temp_repo();

        repo.save("U1", "sent", "notify", true, None).unwrap();
        repo.save("U1", "sent again", "notify", true, None).unwrap();
        repo.save("U1", "failed", "notify", false, Some("boom")).unwrap();

        assert_eq!(repo.today_count("U1", Local::now()).unwrap(), 2);
    }

    #[test]
    fn test_record_reaction() {
        let (_dir, repo) = temp_repo();

        let id = repo.save("U1", "ping", "notify", true, None).unwrap();
        assert!(repo.record_reaction(&id, Reaction::Positive).unwrap());

        let record = repo.get(&id).unwrap().unwrap();
        assert_eq!(record.user_reaction, Some(Reaction::Positive));
        assert!(record.reaction_at.is_some());

        assert!(!repo.record_reaction("missing", Reaction::Negative).unwrap());
    }
}
