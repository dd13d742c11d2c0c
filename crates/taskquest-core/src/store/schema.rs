//! Field mapping between domain types and remote store columns.
//!
//! The remote stores use snake_case column names that do not always match
//! the Rust field names (`streak_7_count` vs `streak7_count`). This table is
//! the single place that knows both spellings; adapters and the change
//! feed decoder go through it instead of translating inline.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::league::League;
use crate::progression::{ProgressionPatch, UserProgression};
use crate::task::{Task, TaskPatch};

pub const PROFILES_TABLE: &str = "profiles";

/// Column-keyed row as exchanged with the stores and the change feed.
pub type Row = Map<String, Value>;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
/// Timestamp column written by earlier clients before `last_activity_date`.
pub const LEGACY_LAST_LOGIN_COLUMN: &str = "last_login";

/// Persistable profile fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Xp,
    League,
    CohortId,
    Streak,
    LastActivityDate,
    Streak7Count,
    NightOwlCount,
    EarlyBirdCount,
    CompletedTasks,
    FinalsWon,
    Top3Finishes,
    AvatarUrl,
}

const PROFILE_COLUMNS: [(ProfileField, &str); 12] = [
    (ProfileField::Xp, "xp"),
    (ProfileField::League, "league"),
    (ProfileField::CohortId, "cohort_id"),
    (ProfileField::Streak, "streak"),
    (ProfileField::LastActivityDate, "last_activity_date"),
    (ProfileField::Streak7Count, "streak_7_count"),
    (ProfileField::NightOwlCount, "night_owl_count"),
    (ProfileField::EarlyBirdCount, "early_bird_count"),
    (ProfileField::CompletedTasks, "completed_tasks"),
    (ProfileField::FinalsWon, "finals_won"),
    (ProfileField::Top3Finishes, "top_3_finishes"),
    (ProfileField::AvatarUrl, "avatar_url"),
];

impl ProfileField {
    pub const ALL: [ProfileField; 12] = [
        ProfileField::Xp,
        ProfileField::League,
        ProfileField::CohortId,
        ProfileField::Streak,
        ProfileField::LastActivityDate,
        ProfileField::Streak7Count,
        ProfileField::NightOwlCount,
        ProfileField::EarlyBirdCount,
        ProfileField::CompletedTasks,
        ProfileField::FinalsWon,
        ProfileField::Top3Finishes,
        ProfileField::AvatarUrl,
    ];

    pub fn column(self) -> &'static str {
        PROFILE_COLUMNS
            .iter()
            .find(|(field, _)| *field == self)
            .map(|(_, column)| *column)
            .unwrap_or_default()
    }

    pub fn from_column(column: &str) -> Option<ProfileField> {
        PROFILE_COLUMNS
            .iter()
            .find(|(_, c)| *c == column)
            .map(|(field, _)| *field)
    }
}

/// Task store columns.
pub const TASK_COLUMNS: [&str; 7] = [
    "id",
    "user_id",
    "title",
    "completed",
    "reward_value",
    "proof_url",
    "created_at",
];

fn date_value(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

fn opt_string_value(v: &Option<String>) -> Value {
    v.clone().map(Value::String).unwrap_or(Value::Null)
}

fn profile_value(p: &UserProgression, field: ProfileField) -> Value {
    match field {
        ProfileField::Xp => p.xp.into(),
        ProfileField::League => p.league.as_str().into(),
        ProfileField::CohortId => opt_string_value(&p.cohort_id),
        ProfileField::Streak => p.streak.into(),
        ProfileField::LastActivityDate => p.last_activity_date.map(date_value).unwrap_or(Value::Null),
        ProfileField::Streak7Count => p.streak7_count.into(),
        ProfileField::NightOwlCount => p.night_owl_count.into(),
        ProfileField::EarlyBirdCount => p.early_bird_count.into(),
        ProfileField::CompletedTasks => p.completed_tasks.into(),
        ProfileField::FinalsWon => p.finals_won.into(),
        ProfileField::Top3Finishes => p.top3_finishes.into(),
        ProfileField::AvatarUrl => opt_string_value(&p.avatar_url),
    }
}

fn patch_value(patch: &ProgressionPatch, field: ProfileField) -> Option<Value> {
    match field {
        ProfileField::Xp => patch.xp.map(Value::from),
        ProfileField::League => patch.league.map(|l| l.as_str().into()),
        ProfileField::CohortId => patch.cohort_id.as_ref().map(opt_string_value),
        ProfileField::Streak => patch.streak.map(Value::from),
        ProfileField::LastActivityDate => patch.last_activity_date.map(date_value),
        ProfileField::Streak7Count => patch.streak7_count.map(Value::from),
        ProfileField::NightOwlCount => patch.night_owl_count.map(Value::from),
        ProfileField::EarlyBirdCount => patch.early_bird_count.map(Value::from),
        ProfileField::CompletedTasks => patch.completed_tasks.map(Value::from),
        ProfileField::FinalsWon => patch.finals_won.map(Value::from),
        ProfileField::Top3Finishes => patch.top3_finishes.map(Value::from),
        ProfileField::AvatarUrl => patch.avatar_url.as_ref().map(opt_string_value),
    }
}

/// Full profile row, including the read-only `id` and `created_at`.
pub fn encode_profile(p: &UserProgression) -> Row {
    let mut row = Row::new();
    row.insert(ID_COLUMN.into(), p.id.clone().into());
    for field in ProfileField::ALL {
        row.insert(field.column().into(), profile_value(p, field));
    }
    row.insert(CREATED_AT_COLUMN.into(), p.created_at.to_rfc3339().into());
    row
}

/// Only the columns a patch writes.
pub fn encode_patch(patch: &ProgressionPatch) -> Row {
    patch
        .fields()
        .into_iter()
        .filter_map(|field| patch_value(patch, field).map(|v| (field.column().to_string(), v)))
        .collect()
}

/// Decode a profile row. Missing counter columns read as zero so rows
/// written by older clients still load.
pub fn decode_profile(row: &Row) -> Result<UserProgression, StoreError> {
    let id = read_string(row, ID_COLUMN)?
        .ok_or_else(|| StoreError::decode(ID_COLUMN, "missing"))?;

    let league = match read_string(row, ProfileField::League.column())? {
        Some(s) => s
            .parse::<League>()
            .map_err(|e| StoreError::decode(ProfileField::League.column(), e))?,
        None => League::Bronze,
    };

    let last_activity_date = match read_date(row, ProfileField::LastActivityDate.column())? {
        Some(d) => Some(d),
        None => read_date(row, LEGACY_LAST_LOGIN_COLUMN)?,
    };

    Ok(UserProgression {
        id,
        xp: read_u64(row, ProfileField::Xp.column())?,
        league,
        cohort_id: read_string(row, ProfileField::CohortId.column())?,
        streak: read_u32(row, ProfileField::Streak.column())?,
        last_activity_date,
        completed_tasks: read_u64(row, ProfileField::CompletedTasks.column())?,
        streak7_count: read_u32(row, ProfileField::Streak7Count.column())?,
        night_owl_count: read_u32(row, ProfileField::NightOwlCount.column())?,
        early_bird_count: read_u32(row, ProfileField::EarlyBirdCount.column())?,
        finals_won: read_u32(row, ProfileField::FinalsWon.column())?,
        top3_finishes: read_u32(row, ProfileField::Top3Finishes.column())?,
        avatar_url: read_string(row, ProfileField::AvatarUrl.column())?,
        created_at: read_timestamp(row, CREATED_AT_COLUMN)?.unwrap_or_default(),
    })
}

/// Full task row, keyed by [`TASK_COLUMNS`].
pub fn encode_task(task: &Task) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), task.id.clone().into());
    row.insert("user_id".into(), task.owner.clone().into());
    row.insert("title".into(), task.title.clone().into());
    row.insert("completed".into(), task.completed.into());
    row.insert("reward_value".into(), task.reward_value.into());
    row.insert("proof_url".into(), opt_string_value(&task.proof_url));
    row.insert("created_at".into(), task.created_at.to_rfc3339().into());
    row
}

pub fn encode_task_patch(patch: &TaskPatch) -> Row {
    let mut row = Row::new();
    if let Some(title) = &patch.title {
        row.insert("title".into(), title.clone().into());
    }
    if let Some(completed) = patch.completed {
        row.insert("completed".into(), completed.into());
    }
    if let Some(proof) = &patch.proof_url {
        row.insert("proof_url".into(), opt_string_value(proof));
    }
    row
}

pub fn decode_task(row: &Row) -> Result<Task, StoreError> {
    Ok(Task {
        id: read_string(row, "id")?.ok_or_else(|| StoreError::decode("id", "missing"))?,
        owner: read_string(row, "user_id")?
            .ok_or_else(|| StoreError::decode("user_id", "missing"))?,
        title: read_string(row, "title")?.unwrap_or_default(),
        completed: match row.get("completed") {
            None | Some(Value::Null) => false,
            Some(v) => v
                .as_bool()
                .ok_or_else(|| StoreError::decode("completed", format!("not a bool: {v}")))?,
        },
        proof_url: read_string(row, "proof_url")?,
        reward_value: read_u64(row, "reward_value")?,
        created_at: read_timestamp(row, "created_at")?.unwrap_or_default(),
    })
}

/// Read an unsigned column; absent or null reads as zero.
pub fn read_u64(row: &Row, column: &str) -> Result<u64, StoreError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| StoreError::decode(column, format!("not a non-negative integer: {v}"))),
    }
}

fn read_u32(row: &Row, column: &str) -> Result<u32, StoreError> {
    let v = read_u64(row, column)?;
    u32::try_from(v).map_err(|_| StoreError::decode(column, format!("out of range: {v}")))
}

pub fn read_string(row: &Row, column: &str) -> Result<Option<String>, StoreError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v) => Err(StoreError::decode(column, format!("not a string: {v}"))),
    }
}

/// Accepts a plain `YYYY-MM-DD` date or a full RFC 3339 timestamp, whose
/// UTC calendar date is used.
fn read_date(row: &Row, column: &str) -> Result<Option<NaiveDate>, StoreError> {
    let Some(s) = read_string(row, column)? else {
        return Ok(None);
    };
    if let Ok(date) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(&s)
        .map(|ts| Some(ts.with_timezone(&Utc).date_naive()))
        .map_err(|e| StoreError::decode(column, e.to_string()))
}

fn read_timestamp(row: &Row, column: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    read_string(row, column)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| StoreError::decode(column, e.to_string()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> UserProgression {
        UserProgression {
            id: "u1".into(),
            xp: 120,
            league: League::Gold,
            cohort_id: Some("c9".into()),
            streak: 6,
            last_activity_date: NaiveDate::from_ymd_opt(2025, 3, 10),
            completed_tasks: 42,
            streak7_count: 1,
            night_owl_count: 2,
            early_bird_count: 3,
            finals_won: 1,
            top3_finishes: 4,
            avatar_url: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    fn as_row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_column_mapping_is_bijective() {
        let mut seen = std::collections::HashSet::new();
        for field in ProfileField::ALL {
            let column = field.column();
            assert!(!column.is_empty());
            assert!(seen.insert(column), "duplicate column {column}");
            assert_eq!(ProfileField::from_column(column), Some(field));
        }
        assert_eq!(ProfileField::from_column("streak7_count"), None);
    }

    #[test]
    fn test_remote_spellings() {
        assert_eq!(ProfileField::Streak7Count.column(), "streak_7_count");
        assert_eq!(ProfileField::Top3Finishes.column(), "top_3_finishes");
        assert_eq!(ProfileField::LastActivityDate.column(), "last_activity_date");
    }

    #[test]
    fn test_profile_row_contains_every_column() {
        let row = encode_profile(&sample());
        for field in ProfileField::ALL {
            assert!(row.contains_key(field.column()));
        }
        assert_eq!(row["league"], "Gold");
        assert_eq!(row["last_activity_date"], "2025-03-10");
        assert_eq!(decode_profile(&row).unwrap(), sample());
    }

    #[test]
    fn test_patch_row_only_touched_columns() {
        let patch = ProgressionPatch {
            xp: Some(0),
            cohort_id: Some(None),
            ..Default::default()
        };
        let row = encode_patch(&patch);
        assert_eq!(row.len(), 2);
        assert_eq!(row["xp"], 0);
        assert_eq!(row["cohort_id"], Value::Null);
    }

    #[test]
    fn test_decode_legacy_row() {
        let row = as_row(json!({
            "id": "old",
            "xp": 30,
            "league": "Silver",
            "streak": 2,
            "last_login": "2024-12-31T23:10:00Z",
        }));
        let p = decode_profile(&row).unwrap();
        assert_eq!(p.league, League::Silver);
        assert_eq!(p.last_activity_date, NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(p.completed_tasks, 0);
        assert_eq!(p.cohort_id, None);
    }

    #[test]
    fn test_decode_rejects_negative_xp() {
        let row = as_row(json!({"id": "u", "xp": -5}));
        assert!(matches!(
            decode_profile(&row),
            Err(StoreError::Decode { column, .. }) if column == "xp"
        ));
    }

    #[test]
    fn test_decode_requires_id() {
        let row = as_row(json!({"xp": 5}));
        assert!(decode_profile(&row).is_err());
    }

    #[test]
    fn test_task_row() {
        let task = Task {
            id: "t1".into(),
            owner: "u1".into(),
            title: "Write report".into(),
            completed: true,
            proof_url: Some("https://cdn/x.png".into()),
            reward_value: 50,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        };
        let row = encode_task(&task);
        for column in TASK_COLUMNS {
            assert!(row.contains_key(column), "missing {column}");
        }
        assert_eq!(decode_task(&row).unwrap(), task);
    }

    #[test]
    fn test_task_patch_row() {
        let row = encode_task_patch(&TaskPatch {
            completed: Some(false),
            ..Default::default()
        });
        assert_eq!(row.len(), 1);
        assert_eq!(row["completed"], false);
    }
}
