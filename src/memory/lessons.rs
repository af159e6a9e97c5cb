//! Lesson repository
//!
//! Durable lessons extracted by the Reflect stage from negative user
//! reactions. The collection is capped at 50 entries; inserting past the cap
//! evicts the oldest entries in the same transaction so a concurrent reader
//! never observes the collection over capacity.

use anyhow::Result;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::state::{local_from_epoch, Reaction};

/// Maximum lessons kept; oldest evicted first.
pub const MAX_LESSONS: usize = 50;

/// A durable statement of behavior to avoid and what to do instead, learned
/// from a negative reaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    /// `should_not -> should_instead` form.
    pub content: String,
    /// Free-form context map (situation, importance, analysis...).
    pub context: serde_json::Value,
    pub user_reaction: Reaction,
    pub created_at: DateTime<Local>,
}

pub struct LessonRepository {
    conn: Mutex<Connection>,
}

impl LessonRepository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;
        info!("lesson repository opened: {}", path.display());
        Ok(repo)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS lessons (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                context TEXT NOT NULL DEFAULT '{}',
                user_reaction TEXT NOT NULL DEFAULT 'neutral',
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_lessons_created ON lessons(created_at DESC);
            "#,
        )?;
        Ok(())
    }

    /// Insert a lesson and evict past the cap atomically.
    pub fn save(
        &self,
        content: &str,
        context: serde_json::Value,
        user_reaction: Reaction,
    ) -> Result<Lesson> {
        let id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let created_at = Local::now();
        let context_json = serde_json::to_string(&context)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO lessons (id, content, context, user_reaction, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                content,
                context_json,
                user_reaction.as_str(),
                created_at.timestamp()
            ],
        )?;
        // rowid breaks ties between lessons created in the same second
        tx.execute(
            "DELETE FROM lessons WHERE id IN (
                SELECT id FROM lessons
                ORDER BY created_at DESC, rowid DESC
                LIMIT -1 OFFSET ?1
            )",
            params![MAX_LESSONS],
        )?;
        tx.commit()?;

        debug!(lesson_id = %id, "lesson saved");
        Ok(Lesson {
            id,
            content: content.to_string(),
            context,
            user_reaction,
            created_at,
        })
    }

    pub fn get(&self, lesson_id: &str) -> Result<Option<Lesson>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, content, context, user_reaction, created_at FROM lessons WHERE id = ?1",
        )?;
        match stmt.query_row(params![lesson_id], row_to_lesson) {
            Ok(lesson) => Ok(Some(lesson)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Most recent lessons, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Lesson>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, content, context, user_reaction, created_at
             FROM lessons ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let lessons = stmt
            .query_map(params![limit], row_to_lesson)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(lessons)
    }

    pub fn by_reaction(&self, reaction: Reaction) -> Result<Vec<Lesson>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, content, context, user_reaction, created_at
             FROM lessons WHERE user_reaction = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let lessons = stmt
            .query_map(params![reaction.as_str()], row_to_lesson)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(lessons)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM lessons", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn delete(&self, lesson_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM lessons WHERE id = ?1", params![lesson_id])?;
        Ok(rows > 0)
    }
}

fn row_to_lesson(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lesson> {
    let context: String = row.get(2)?;
    let reaction: String = row.get(3)?;
    Ok(Lesson {
        id: row.get(0)?,
        content: row.get(1)?,
        context: serde_json::from_str(&context).unwrap_or(serde_json::Value::Null),
        user_reaction: Reaction::parse(&reaction),
        created_at: local_from_epoch(row.get(4)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_repo() -> (TempDir, LessonRepository) {
        let dir = TempDir::new().unwrap();
        let repo = LessonRepository::open(&dir.path().join("memory.db")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_save_and_get() {
        let (_dir, repo) = temp_repo();

        let lesson = repo
            .save(
                "no weather pings before 8 -> wait for the commute window",
                json!({"context": "early morning", "importance": "high"}),
                Reaction::Negative,
            )
            .unwrap();

        let loaded = repo.get(&lesson.id).unwrap().unwrap();
        assert_eq!(loaded.content, lesson.content);
        assert_eq!(loaded.user_reaction, Reaction::Negative);
        assert_eq!(loaded.context["importance"], "high");
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let (_dir, repo) = temp_repo();

        for i in 0..60 {
            repo.save(&format!("lesson {i}"), json!({}), Reaction::Negative)
                .unwrap();
        }

        assert_eq!(repo.count().unwrap(), MAX_LESSONS);

        // The 10 oldest (0..10) are gone; everything else survives in
        // newest-first order.
        let all = repo.recent(MAX_LESSONS).unwrap();
        assert_eq!(all.len(), MAX_LESSONS);
        assert_eq!(all.first().unwrap().content, "lesson 59");
        assert_eq!(all.last().unwrap().content, "lesson 10");
    }

    #[test]
    fn test_recent_is_newest_first() {
        let (_dir, repo) = temp_repo();

        repo.save("first", json!({}), Reaction::Neutral).unwrap();
        repo.save("second", json!({}), Reaction::Neutral).unwrap();
        repo.save("third", json!({}), Reaction::Neutral).unwrap();

        let recent = repo.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "third");
        assert_eq!(recent[1].content, "second");
    }

    #[test]
    fn test_by_reaction_filter() {
        let (_dir, repo) = temp_repo();

        repo.save("bad timing", json!({}), Reaction::Negative).unwrap();
        repo.save("meh", json!({}), Reaction::Neutral).unwrap();

        let negative = repo.by_reaction(Reaction::Negative).unwrap();
        assert_eq!(negative.len(), 1);
        assert_eq!(negative[0].content, "bad timing");
    }
}
