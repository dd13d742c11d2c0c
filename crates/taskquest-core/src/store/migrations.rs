//! Database schema migrations for the local SQLite backend.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::warn;

/// Current local schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: profiles, tasks and cohorts.
///
/// Profiles written by this version record activity in `last_login` as a
/// full timestamp.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS profiles (
            id               TEXT PRIMARY KEY,
            xp               INTEGER NOT NULL DEFAULT 0,
            league           TEXT NOT NULL DEFAULT 'Bronze',
            cohort_id        TEXT,
            streak           INTEGER NOT NULL DEFAULT 0,
            last_login       TEXT,
            streak_7_count   INTEGER NOT NULL DEFAULT 0,
            night_owl_count  INTEGER NOT NULL DEFAULT 0,
            early_bird_count INTEGER NOT NULL DEFAULT 0,
            completed_tasks  INTEGER NOT NULL DEFAULT 0,
            finals_won       INTEGER NOT NULL DEFAULT 0,
            top_3_finishes   INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL,
            title        TEXT NOT NULL,
            completed    INTEGER NOT NULL DEFAULT 0,
            reward_value INTEGER NOT NULL,
            proof_url    TEXT,
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cohorts (
            seq          INTEGER PRIMARY KEY AUTOINCREMENT,
            id           TEXT NOT NULL UNIQUE,
            league       TEXT NOT NULL,
            member_count INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_user_id ON tasks(user_id);
        CREATE INDEX IF NOT EXISTS idx_cohorts_league ON cohorts(league);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: calendar-day activity date and avatars.
///
/// Adds:
/// - last_activity_date: `YYYY-MM-DD`, backfilled from `last_login`
/// - avatar_url: Object Store URL of the profile picture
/// - an index on cohort_id for member lookups
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE profiles ADD COLUMN last_activity_date TEXT;
         ALTER TABLE profiles ADD COLUMN avatar_url TEXT;
         CREATE INDEX IF NOT EXISTS idx_profiles_cohort_id ON profiles(cohort_id);",
    )?;

    tx.execute(
        "UPDATE profiles SET last_activity_date = substr(last_login, 1, 10)
         WHERE last_activity_date IS NULL AND last_login IS NOT NULL",
        [],
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("SELECT name FROM pragma_table_info('{table}')"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);

        let cols = columns(&conn, "profiles");
        assert!(cols.contains(&"last_activity_date".to_string()));
        assert!(cols.contains(&"avatar_url".to_string()));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn test_v2_backfills_activity_date() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        conn.execute(
            "INSERT INTO profiles (id, last_login, created_at)
             VALUES ('old', '2025-03-09T21:15:00+00:00', '2025-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();
        let date: String = conn
            .query_row(
                "SELECT last_activity_date FROM profiles WHERE id = 'old'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(date, "2025-03-09");
    }
}
