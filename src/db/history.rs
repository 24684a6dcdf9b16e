//! Conversation history repository with window and expiry policies
//!
//! Durable history holds only completed exchanges (user text plus the final
//! assistant reply). Intermediate tool traffic lives in the per-message
//! working transcript and is never persisted.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::{Error, Result};

/// Retention policy for per-user conversation history
///
/// The window bounds how many turns survive a write; the optional TTL clears
/// a user's history entirely once the conversation has been idle longer than
/// the duration. The two are independent. Profiles are never expired.
#[derive(Debug, Clone, Copy)]
pub struct HistoryPolicy {
    /// Maximum persisted turns per user (oldest trimmed first)
    pub window: usize,

    /// Clear history when the last activity is older than this
    pub ttl: Option<Duration>,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            window: 10,
            ttl: None,
        }
    }
}

/// A persisted conversation turn
#[derive(Debug, Clone)]
pub struct StoredTurn {
    pub seq: i64,
    pub user_id: String,
    pub role: TurnRole,
    pub content: String,
    pub tool_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Turn role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

impl TurnRole {
    const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// History repository
#[derive(Clone)]
pub struct HistoryRepo {
    pool: DbPool,
    policy: HistoryPolicy,
}

impl HistoryRepo {
    /// Create a new history repository with the given retention policy
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool, policy: HistoryPolicy) -> Self {
        Self { pool, policy }
    }

    /// The retention policy this repository enforces
    #[must_use]
    pub const fn policy(&self) -> HistoryPolicy {
        self.policy
    }

    /// Load the most recent turns for a user, oldest first
    ///
    /// Applies the expiry policy before reading: a conversation idle beyond
    /// the TTL is cleared and an empty history returned.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn load_recent(&self, user_id: &str) -> Result<Vec<StoredTurn>> {
        if let Some(ttl) = self.policy.ttl {
            self.expire_stale(user_id, ttl)?;
        }

        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT seq, user_id, role, content, tool_name, created_at
                 FROM turns WHERE user_id = ?1
                 ORDER BY seq DESC LIMIT ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        #[allow(clippy::cast_possible_wrap)]
        let turns = stmt
            .query_map(
                rusqlite::params![user_id, self.policy.window as i64],
                |row| {
                    Ok(StoredTurn {
                        seq: row.get(0)?,
                        user_id: row.get(1)?,
                        role: TurnRole::from_str(&row.get::<_, String>(2)?)
                            .unwrap_or(TurnRole::User),
                        content: row.get(3)?,
                        tool_name: row.get(4)?,
                        created_at: parse_datetime(&row.get::<_, String>(5)?),
                    })
                },
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        Ok(turns)
    }

    /// Append a completed exchange and trim to the window, atomically
    ///
    /// Either both turns land and the trim applies, or nothing changes.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn append_exchange(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;

        tx.execute(
            "INSERT INTO turns (user_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, TurnRole::User.as_str(), user_text, &now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.execute(
            "INSERT INTO turns (user_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, TurnRole::Assistant.as_str(), assistant_text, &now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        #[allow(clippy::cast_possible_wrap)]
        tx.execute(
            "DELETE FROM turns WHERE user_id = ?1 AND seq NOT IN (
                 SELECT seq FROM turns WHERE user_id = ?1 ORDER BY seq DESC LIMIT ?2
             )",
            rusqlite::params![user_id, self.policy.window as i64],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Clear a user's history if it has been idle longer than `ttl`
    ///
    /// Returns true if the history was cleared.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn expire_stale(&self, user_id: &str, ttl: Duration) -> Result<bool> {
        let Some(last) = self.last_activity(user_id)? else {
            return Ok(false);
        };

        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return Ok(false);
        };

        if Utc::now().signed_duration_since(last) <= ttl {
            return Ok(false);
        }

        self.clear(user_id)?;
        tracing::debug!(user_id = %user_id, "expired stale conversation history");
        Ok(true)
    }

    /// Delete all turns for a user
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn clear(&self, user_id: &str) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute("DELETE FROM turns WHERE user_id = ?1", [user_id])
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Timestamp of the most recent turn for a user
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn last_activity(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let last: Option<String> = conn
            .query_row(
                "SELECT MAX(created_at) FROM turns WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(last.map(|s| parse_datetime(&s)))
    }

    /// Count persisted turns for a user
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn turn_count(&self, user_id: &str) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM turns WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn setup(policy: HistoryPolicy) -> HistoryRepo {
        let pool = init_memory().unwrap();
        HistoryRepo::new(pool, policy)
    }

    #[test]
    fn test_append_and_load() {
        let repo = setup(HistoryPolicy::default());

        repo.append_exchange("u1", "Hello", "Hi there!").unwrap();

        let turns = repo.load_recent("u1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[0].content, "Hello");
        assert_eq!(turns[1].role, TurnRole::Assistant);
        assert_eq!(turns[1].content, "Hi there!");
    }

    #[test]
    fn test_window_trims_oldest() {
        let repo = setup(HistoryPolicy {
            window: 4,
            ttl: None,
        });

        for i in 0..5 {
            repo.append_exchange("u1", &format!("question {i}"), &format!("answer {i}"))
                .unwrap();
        }

        // Only the window survives, oldest trimmed first
        assert_eq!(repo.turn_count("u1").unwrap(), 4);

        let turns = repo.load_recent("u1").unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "question 3");
        assert_eq!(turns[3].content, "answer 4");
    }

    #[test]
    fn test_window_is_per_user() {
        let repo = setup(HistoryPolicy {
            window: 2,
            ttl: None,
        });

        repo.append_exchange("u1", "a", "b").unwrap();
        repo.append_exchange("u2", "c", "d").unwrap();

        assert_eq!(repo.turn_count("u1").unwrap(), 2);
        assert_eq!(repo.turn_count("u2").unwrap(), 2);
    }

    #[test]
    fn test_expire_stale_clears_idle_history() {
        let repo = setup(HistoryPolicy {
            window: 10,
            ttl: Some(Duration::from_secs(3600)),
        });

        // Backdate a turn beyond the TTL
        let old = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
        let conn = repo.pool.get().unwrap();
        conn.execute(
            "INSERT INTO turns (user_id, role, content, created_at) VALUES ('u1', 'user', 'old', ?1)",
            [&old],
        )
        .unwrap();
        drop(conn);

        let turns = repo.load_recent("u1").unwrap();
        assert!(turns.is_empty());
        assert_eq!(repo.turn_count("u1").unwrap(), 0);
    }

    #[test]
    fn test_fresh_history_survives_ttl() {
        let repo = setup(HistoryPolicy {
            window: 10,
            ttl: Some(Duration::from_secs(3600)),
        });

        repo.append_exchange("u1", "Hello", "Hi!").unwrap();

        let turns = repo.load_recent("u1").unwrap();
        assert_eq!(turns.len(), 2);
    }

    #[test]
    fn test_no_ttl_keeps_history() {
        let repo = setup(HistoryPolicy {
            window: 10,
            ttl: None,
        });

        let old = (Utc::now() - chrono::Duration::days(30)).to_rfc3339();
        let conn = repo.pool.get().unwrap();
        conn.execute(
            "INSERT INTO turns (user_id, role, content, created_at) VALUES ('u1', 'user', 'old', ?1)",
            [&old],
        )
        .unwrap();
        drop(conn);

        let turns = repo.load_recent("u1").unwrap();
        assert_eq!(turns.len(), 1);
    }
}
