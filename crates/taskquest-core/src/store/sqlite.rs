//! SQLite-backed stores for a single device.
//!
//! Provides persistent storage for:
//! - Profiles (same column layout as the remote Profile Store)
//! - Tasks
//! - Cohorts
//!
//! Profile writes are published on an in-process [`FeedHub`], so watchers
//! in the same process see them like remote changes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::feed::{ChangeEvent, ChangeRecord, FeedFilter, FeedHub, FeedSubscription};
use super::migrations;
use super::schema::{self, Row};
use super::{ChangeFeed, CohortStore, ProfileStore, TaskStore};
use crate::error::StoreError;
use crate::league::{Cohort, League};
use crate::progression::{ProgressionPatch, UserProgression};
use crate::task::{NewTask, Task, TaskPatch};

/// Local database implementing the Profile, Task and Cohort stores.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    feed: FeedHub,
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => i.into(),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Run `sql` and collect every result row as a column-keyed map.
fn query_rows(conn: &Connection, sql: &str, args: &[&str]) -> Result<Vec<Row>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let rows = stmt.query_map(params_from_iter(args.iter()), |r| {
        let mut row = Row::new();
        for (i, name) in names.iter().enumerate() {
            row.insert(name.clone(), sql_to_json(r.get_ref(i)?));
        }
        Ok(row)
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

fn profile_row(conn: &Connection, id: &str) -> Result<Option<Row>, StoreError> {
    Ok(query_rows(conn, "SELECT * FROM profiles WHERE id = ?1", &[id])?
        .into_iter()
        .next())
}

/// SQLite stores booleans as integers.
fn decode_task_row(mut row: Row) -> Result<Task, StoreError> {
    if let Some(Value::Number(n)) = row.get("completed") {
        let completed = n.as_i64().unwrap_or(0) != 0;
        row.insert("completed".into(), Value::Bool(completed));
    }
    schema::decode_task(&row)
}

fn parse_timestamp(column: &str, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::decode(column, e.to_string()))
}

impl SqliteBackend {
    /// Open (creating if needed) and migrate the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            feed: FeedHub::new(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }

    /// Every stored profile, for local leaderboards and inspection.
    pub fn all_profiles(&self) -> Result<Vec<UserProgression>, StoreError> {
        query_rows(&self.conn(), "SELECT * FROM profiles ORDER BY id", &[])?
            .iter()
            .map(schema::decode_profile)
            .collect()
    }
}

#[async_trait]
impl ProfileStore for SqliteBackend {
    async fn fetch(&self, id: &str) -> Result<Option<UserProgression>, StoreError> {
        profile_row(&self.conn(), id)?
            .as_ref()
            .map(schema::decode_profile)
            .transpose()
    }

    async fn create(&self, profile: &UserProgression) -> Result<UserProgression, StoreError> {
        let row = schema::encode_profile(profile);
        {
            let conn = self.conn();
            if profile_row(&conn, &profile.id)?.is_some() {
                return Err(StoreError::Conflict {
                    kind: "profile",
                    id: profile.id.clone(),
                });
            }
            let columns: Vec<&str> = row.keys().map(String::as_str).collect();
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO profiles ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            );
            conn.execute(&sql, params_from_iter(row.values().map(json_to_sql)))?;
        }

        self.feed.publish(&ChangeRecord {
            event: ChangeEvent::Insert,
            table: schema::PROFILES_TABLE.to_string(),
            old: None,
            new: Some(row),
        });
        Ok(profile.clone())
    }

    async fn update(&self, id: &str, patch: &ProgressionPatch) -> Result<(), StoreError> {
        let changes = schema::encode_patch(patch);
        let (old, new) = {
            let conn = self.conn();
            let old = profile_row(&conn, id)?.ok_or_else(|| StoreError::NotFound {
                kind: "profile",
                id: id.to_string(),
            })?;
            if changes.is_empty() {
                return Ok(());
            }

            let assignments: Vec<String> = changes
                .keys()
                .enumerate()
                .map(|(i, column)| format!("{column} = ?{}", i + 1))
                .collect();
            let sql = format!(
                "UPDATE profiles SET {} WHERE id = ?{}",
                assignments.join(", "),
                changes.len() + 1
            );
            let mut values: Vec<SqlValue> = changes.values().map(json_to_sql).collect();
            values.push(SqlValue::Text(id.to_string()));
            conn.execute(&sql, params_from_iter(values))?;

            let new = profile_row(&conn, id)?.unwrap_or_default();
            (old, new)
        };

        self.feed.publish(&ChangeRecord {
            event: ChangeEvent::Update,
            table: schema::PROFILES_TABLE.to_string(),
            old: Some(old),
            new: Some(new),
        });
        Ok(())
    }

    async fn cohort_members(&self, cohort_id: &str) -> Result<Vec<UserProgression>, StoreError> {
        query_rows(
            &self.conn(),
            "SELECT * FROM profiles WHERE cohort_id = ?1",
            &[cohort_id],
        )?
        .iter()
        .map(schema::decode_profile)
        .collect()
    }
}

#[async_trait]
impl TaskStore for SqliteBackend {
    async fn create(&self, task: &NewTask) -> Result<Task, StoreError> {
        let stored = Task {
            id: format!("task-{}", Uuid::new_v4()),
            owner: task.owner.clone(),
            title: task.title.clone(),
            completed: false,
            proof_url: None,
            reward_value: task.reward_value,
            created_at: Utc::now(),
        };
        let row = schema::encode_task(&stored);
        let placeholders: Vec<String> = (1..=schema::TASK_COLUMNS.len())
            .map(|i| format!("?{i}"))
            .collect();
        let sql = format!(
            "INSERT INTO tasks ({}) VALUES ({})",
            schema::TASK_COLUMNS.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<SqlValue> = schema::TASK_COLUMNS
            .iter()
            .map(|column| row.get(*column).map(json_to_sql).unwrap_or(SqlValue::Null))
            .collect();
        self.conn().execute(&sql, params_from_iter(values))?;
        Ok(stored)
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        let changes = schema::encode_task_patch(patch);
        if changes.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = changes
            .keys()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE tasks SET {} WHERE id = ?{}",
            assignments.join(", "),
            changes.len() + 1
        );
        let mut values: Vec<SqlValue> = changes.values().map(json_to_sql).collect();
        values.push(SqlValue::Text(id.to_string()));

        let updated = self.conn().execute(&sql, params_from_iter(values))?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind: "task",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        query_rows(
            &self.conn(),
            "SELECT * FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            &[owner],
        )?
        .into_iter()
        .map(decode_task_row)
        .collect()
    }
}

#[async_trait]
impl CohortStore for SqliteBackend {
    async fn cohorts_for(&self, league: League) -> Result<Vec<Cohort>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, member_count, created_at FROM cohorts
             WHERE league = ?1 ORDER BY seq DESC",
        )?;
        let rows = stmt.query_map(params![league.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut cohorts = Vec::new();
        for row in rows {
            let (id, member_count, created_at) = row?;
            cohorts.push(Cohort {
                id,
                league,
                member_count: u32::try_from(member_count)
                    .map_err(|_| StoreError::decode("member_count", member_count.to_string()))?,
                created_at: parse_timestamp("created_at", &created_at)?,
            });
        }
        Ok(cohorts)
    }

    async fn create(&self, league: League) -> Result<Cohort, StoreError> {
        let cohort = Cohort {
            id: format!("cohort-{}", Uuid::new_v4()),
            league,
            member_count: 0,
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO cohorts (id, league, member_count, created_at) VALUES (?1, ?2, 0, ?3)",
            params![cohort.id, league.as_str(), cohort.created_at.to_rfc3339()],
        )?;
        Ok(cohort)
    }

    async fn record_join(&self, cohort_id: &str) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE cohorts SET member_count = member_count + 1 WHERE id = ?1",
            params![cohort_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind: "cohort",
                id: cohort_id.to_string(),
            });
        }
        Ok(())
    }
}

impl ChangeFeed for SqliteBackend {
    fn subscribe(&self, filter: FeedFilter) -> Result<FeedSubscription, StoreError> {
        self.feed.subscribe(filter)
    }
}

impl SqliteBackend {
    /// Version recorded in `schema_version`.
    pub fn schema_version(&self) -> i32 {
        migrations::get_schema_version(&self.conn())
    }

    /// Whether a profile row exists, without decoding it.
    pub fn has_profile(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .conn()
            .query_row("SELECT 1 FROM profiles WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn backend() -> SqliteBackend {
        SqliteBackend::open_in_memory().unwrap()
    }

    fn profile(id: &str) -> UserProgression {
        UserProgression::new_user(
            id,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            "2025-01-01T00:00:00Z".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_profile_create_fetch() {
        let db = backend();
        let mut p = profile("u1");
        p.avatar_url = Some("file:///a.png".into());
        ProfileStore::create(&db, &p).await.unwrap();
        assert_eq!(db.fetch("u1").await.unwrap(), Some(p));
        assert!(db.fetch("nobody").await.unwrap().is_none());
        assert!(db.has_profile("u1").unwrap());
    }

    #[tokio::test]
    async fn test_profile_conflict() {
        let db = backend();
        ProfileStore::create(&db, &profile("u1")).await.unwrap();
        assert!(matches!(
            ProfileStore::create(&db, &profile("u1")).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_profile_update_and_clear() {
        let db = backend();
        let mut p = profile("u1");
        p.cohort_id = Some("c1".into());
        ProfileStore::create(&db, &p).await.unwrap();

        let patch = ProgressionPatch {
            xp: Some(150),
            league: Some(League::Gold),
            cohort_id: Some(None),
            ..Default::default()
        };
        ProfileStore::update(&db, "u1", &patch).await.unwrap();

        let stored = db.fetch("u1").await.unwrap().unwrap();
        assert_eq!(stored.xp, 150);
        assert_eq!(stored.league, League::Gold);
        assert_eq!(stored.cohort_id, None);
        assert_eq!(stored.streak, 1);
    }

    #[tokio::test]
    async fn test_update_missing_profile() {
        let db = backend();
        let patch = ProgressionPatch {
            xp: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            ProfileStore::update(&db, "ghost", &patch).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_publishes_change() {
        let db = backend();
        ProfileStore::create(&db, &profile("u1")).await.unwrap();
        let mut sub = db.subscribe(FeedFilter::profiles_in(League::Bronze)).unwrap();

        let patch = ProgressionPatch {
            xp: Some(40),
            ..Default::default()
        };
        ProfileStore::update(&db, "u1", &patch).await.unwrap();
        let record = sub.try_recv().unwrap();
        assert_eq!(record.old.unwrap()["xp"], 0);
        assert_eq!(record.new.unwrap()["xp"], 40);
    }

    #[tokio::test]
    async fn test_legacy_last_login_is_read() {
        let db = backend();
        db.conn()
            .execute(
                "INSERT INTO profiles (id, last_login, created_at)
                 VALUES ('old', '2025-03-09T23:59:00+00:00', '2025-01-01T00:00:00+00:00')",
                [],
            )
            .unwrap();
        let p = db.fetch("old").await.unwrap().unwrap();
        assert_eq!(p.last_activity_date, NaiveDate::from_ymd_opt(2025, 3, 9));
    }

    #[tokio::test]
    async fn test_cohort_members() {
        let db = backend();
        for (id, cohort) in [("a", "c1"), ("b", "c1"), ("c", "c2")] {
            let mut p = profile(id);
            p.cohort_id = Some(cohort.into());
            ProfileStore::create(&db, &p).await.unwrap();
        }
        let mut ids: Vec<_> = db
            .cohort_members("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(db.all_profiles().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let db = backend();
        let new = NewTask {
            owner: "u1".into(),
            title: "Write report".into(),
            reward_value: 50,
        };
        let first = TaskStore::create(&db, &new).await.unwrap();
        let second = TaskStore::create(&db, &NewTask {
            title: "Review".into(),
            ..new.clone()
        })
        .await
        .unwrap();

        let listed = db.list_by_owner("u1").await.unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);

        TaskStore::update(
            &db,
            &first.id,
            &TaskPatch {
                completed: Some(true),
                proof_url: Some(Some("file:///proof.png".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let listed = db.list_by_owner("u1").await.unwrap();
        let done = listed.iter().find(|t| t.id == first.id).unwrap();
        assert!(done.completed);
        assert_eq!(done.proof_url.as_deref(), Some("file:///proof.png"));

        db.delete(&second.id).await.unwrap();
        assert_eq!(db.list_by_owner("u1").await.unwrap().len(), 1);
        assert!(db.list_by_owner("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cohorts_newest_first_and_join() {
        let db = backend();
        let a = CohortStore::create(&db, League::Silver).await.unwrap();
        let b = CohortStore::create(&db, League::Silver).await.unwrap();
        CohortStore::create(&db, League::Gold).await.unwrap();

        db.record_join(&a.id).await.unwrap();
        db.record_join(&a.id).await.unwrap();

        let silver = db.cohorts_for(League::Silver).await.unwrap();
        assert_eq!(silver.len(), 2);
        assert_eq!(silver[0].id, b.id);
        assert_eq!(silver[1].member_count, 2);
        assert!(db.record_join("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data/taskquest.db");
        {
            let db = SqliteBackend::open(&path).unwrap();
            ProfileStore::create(&db, &profile("u1")).await.unwrap();
        }
        let db = SqliteBackend::open(&path).unwrap();
        assert!(db.fetch("u1").await.unwrap().is_some());
        assert_eq!(db.schema_version(), migrations::CURRENT_VERSION);
    }
}
