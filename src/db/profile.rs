//! Profile repository for per-user remembered facts

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::{Error, Result};

/// A user's remembered facts
#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub preferences: Option<String>,
    pub timezone: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A partial profile update; `None` fields leave stored values untouched
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub preferences: Option<String>,
    pub timezone: Option<String>,
}

impl ProfilePatch {
    /// Whether the patch carries no fields at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.preferences.is_none() && self.timezone.is_none()
    }
}

/// Profile repository
#[derive(Clone)]
pub struct ProfileRepo {
    pool: DbPool,
}

impl ProfileRepo {
    /// Create a new profile repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Fetch a user's profile
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, user_id: &str) -> Result<Option<Profile>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let profile = conn
            .query_row(
                "SELECT user_id, display_name, preferences, timezone, updated_at
                 FROM profiles WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(Profile {
                        user_id: row.get(0)?,
                        display_name: row.get(1)?,
                        preferences: row.get(2)?,
                        timezone: row.get(3)?,
                        updated_at: parse_datetime(&row.get::<_, String>(4)?),
                    })
                },
            )
            .ok();

        Ok(profile)
    }

    /// Merge a patch into a user's profile
    ///
    /// Fields absent from the patch never erase stored values; a present
    /// field overwrites. Creates the row if the user has no profile yet.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn upsert(&self, user_id: &str, patch: &ProfilePatch) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO profiles (user_id, display_name, preferences, timezone, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = COALESCE(excluded.display_name, display_name),
                 preferences = COALESCE(excluded.preferences, preferences),
                 timezone = COALESCE(excluded.timezone, timezone),
                 updated_at = excluded.updated_at",
            rusqlite::params![
                user_id,
                patch.display_name,
                patch.preferences,
                patch.timezone,
                &now
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Read a single profile field by name
    ///
    /// # Errors
    ///
    /// Returns error if the field name is unknown or the query fails
    pub fn field(&self, user_id: &str, name: &str) -> Result<Option<String>> {
        let column = column_for(name)
            .ok_or_else(|| Error::NotFound(format!("unknown profile field: {name}")))?;

        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        // Column name comes from the fixed set above, never from input
        let value: Option<String> = conn
            .query_row(
                &format!("SELECT {column} FROM profiles WHERE user_id = ?1"),
                [user_id],
                |row| row.get(0),
            )
            .unwrap_or(None);

        Ok(value)
    }
}

/// Map a caller-facing field name onto its profile column
fn column_for(name: &str) -> Option<&'static str> {
    match name {
        "name" | "display_name" => Some("display_name"),
        "preferences" => Some("preferences"),
        "timezone" => Some("timezone"),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn setup() -> ProfileRepo {
        let pool = init_memory().unwrap();
        ProfileRepo::new(pool)
    }

    #[test]
    fn test_upsert_creates_profile() {
        let repo = setup();

        repo.upsert(
            "u1",
            &ProfilePatch {
                display_name: Some("Ana".to_string()),
                ..ProfilePatch::default()
            },
        )
        .unwrap();

        let profile = repo.get("u1").unwrap().unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Ana"));
        assert!(profile.preferences.is_none());
    }

    #[test]
    fn test_absent_field_keeps_stored_value() {
        let repo = setup();

        repo.upsert(
            "u1",
            &ProfilePatch {
                display_name: Some("Ana".to_string()),
                ..ProfilePatch::default()
            },
        )
        .unwrap();

        // A later patch without display_name must not erase it
        repo.upsert(
            "u1",
            &ProfilePatch {
                preferences: Some("prefers morning meetings".to_string()),
                ..ProfilePatch::default()
            },
        )
        .unwrap();

        let profile = repo.get("u1").unwrap().unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Ana"));
        assert_eq!(
            profile.preferences.as_deref(),
            Some("prefers morning meetings")
        );
    }

    #[test]
    fn test_present_field_overwrites() {
        let repo = setup();

        repo.upsert(
            "u1",
            &ProfilePatch {
                display_name: Some("Ana".to_string()),
                ..ProfilePatch::default()
            },
        )
        .unwrap();
        repo.upsert(
            "u1",
            &ProfilePatch {
                display_name: Some("Ana Lopez".to_string()),
                ..ProfilePatch::default()
            },
        )
        .unwrap();

        let profile = repo.get("u1").unwrap().unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Ana Lopez"));
    }

    #[test]
    fn test_field_lookup() {
        let repo = setup();

        repo.upsert(
            "u1",
            &ProfilePatch {
                timezone: Some("America/Mexico_City".to_string()),
                ..ProfilePatch::default()
            },
        )
        .unwrap();

        assert_eq!(
            repo.field("u1", "timezone").unwrap().as_deref(),
            Some("America/Mexico_City")
        );
        assert!(repo.field("u1", "preferences").unwrap().is_none());
        assert!(repo.field("u1", "favorite_color").is_err());
    }

    #[test]
    fn test_missing_profile_is_none() {
        let repo = setup();
        assert!(repo.get("nobody").unwrap().is_none());
    }
}
