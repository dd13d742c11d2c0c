//! Per-user progression state and typed partial updates.
//!
//! [`UserProgression`] is the local view of one profile row. Every change
//! that is sent to the Profile Store travels as a [`ProgressionPatch`], so
//! the set of persistable fields is closed.

pub mod achievements;
pub mod streak;

pub use achievements::{AchievementId, AchievementStatus, AchievementTracker};
pub use streak::StreakUpdate;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::league::League;
use crate::store::schema::ProfileField;

/// Progression counters for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgression {
    pub id: String,
    /// Points in the current league cycle; reset at each weekly transition.
    pub xp: u64,
    pub league: League,
    pub cohort_id: Option<String>,
    pub streak: u32,
    /// Authoritative (server stored) date of the last recorded activity.
    pub last_activity_date: Option<NaiveDate>,
    pub completed_tasks: u64,
    pub streak7_count: u32,
    pub night_owl_count: u32,
    pub early_bird_count: u32,
    pub finals_won: u32,
    pub top3_finishes: u32,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProgression {
    /// Fresh Bronze profile for a first login on `today`.
    pub fn new_user(id: impl Into<String>, today: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            league: League::Bronze,
            streak: 1,
            last_activity_date: Some(today),
            created_at: now,
            ..Default::default()
        }
    }

    /// Lifetime points, derived from completed tasks.
    pub fn total_points(&self, task_reward: u64) -> u64 {
        self.completed_tasks.saturating_mul(task_reward)
    }
}

/// Partial profile update. `None` leaves a field untouched; the nested
/// options on `cohort_id` and `avatar_url` allow clearing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionPatch {
    pub xp: Option<u64>,
    pub league: Option<League>,
    pub cohort_id: Option<Option<String>>,
    pub streak: Option<u32>,
    pub last_activity_date: Option<NaiveDate>,
    pub streak7_count: Option<u32>,
    pub night_owl_count: Option<u32>,
    pub early_bird_count: Option<u32>,
    pub completed_tasks: Option<u64>,
    pub finals_won: Option<u32>,
    pub top3_finishes: Option<u32>,
    pub avatar_url: Option<Option<String>>,
}

impl ProgressionPatch {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Fields this patch writes, in schema order.
    pub fn fields(&self) -> Vec<ProfileField> {
        let mut out = Vec::new();
        let mut push = |set: bool, field| {
            if set {
                out.push(field);
            }
        };
        push(self.xp.is_some(), ProfileField::Xp);
        push(self.league.is_some(), ProfileField::League);
        push(self.cohort_id.is_some(), ProfileField::CohortId);
        push(self.streak.is_some(), ProfileField::Streak);
        push(self.last_activity_date.is_some(), ProfileField::LastActivityDate);
        push(self.streak7_count.is_some(), ProfileField::Streak7Count);
        push(self.night_owl_count.is_some(), ProfileField::NightOwlCount);
        push(self.early_bird_count.is_some(), ProfileField::EarlyBirdCount);
        push(self.completed_tasks.is_some(), ProfileField::CompletedTasks);
        push(self.finals_won.is_some(), ProfileField::FinalsWon);
        push(self.top3_finishes.is_some(), ProfileField::Top3Finishes);
        push(self.avatar_url.is_some(), ProfileField::AvatarUrl);
        out
    }

    /// Write every set field into `profile`.
    pub fn apply_to(&self, profile: &mut UserProgression) {
        if let Some(v) = self.xp {
            profile.xp = v;
        }
        if let Some(v) = self.league {
            profile.league = v;
        }
        if let Some(v) = &self.cohort_id {
            profile.cohort_id = v.clone();
        }
        if let Some(v) = self.streak {
            profile.streak = v;
        }
        if let Some(v) = self.last_activity_date {
            profile.last_activity_date = Some(v);
        }
        if let Some(v) = self.streak7_count {
            profile.streak7_count = v;
        }
        if let Some(v) = self.night_owl_count {
            profile.night_owl_count = v;
        }
        if let Some(v) = self.early_bird_count {
            profile.early_bird_count = v;
        }
        if let Some(v) = self.completed_tasks {
            profile.completed_tasks = v;
        }
        if let Some(v) = self.finals_won {
            profile.finals_won = v;
        }
        if let Some(v) = self.top3_finishes {
            profile.top3_finishes = v;
        }
        if let Some(v) = &self.avatar_url {
            profile.avatar_url = v.clone();
        }
    }

    /// Combine with a later patch; fields set in `newer` win.
    pub fn merge(self, newer: ProgressionPatch) -> ProgressionPatch {
        ProgressionPatch {
            xp: newer.xp.or(self.xp),
            league: newer.league.or(self.league),
            cohort_id: newer.cohort_id.or(self.cohort_id),
            streak: newer.streak.or(self.streak),
            last_activity_date: newer.last_activity_date.or(self.last_activity_date),
            streak7_count: newer.streak7_count.or(self.streak7_count),
            night_owl_count: newer.night_owl_count.or(self.night_owl_count),
            early_bird_count: newer.early_bird_count.or(self.early_bird_count),
            completed_tasks: newer.completed_tasks.or(self.completed_tasks),
            finals_won: newer.finals_won.or(self.finals_won),
            top3_finishes: newer.top3_finishes.or(self.top3_finishes),
            avatar_url: newer.avatar_url.or(self.avatar_url),
        }
    }

    /// Drop the fields whose value equals the one in `persisted`. Fields
    /// changed again since then stay pending.
    pub fn settle(self, persisted: &ProgressionPatch) -> ProgressionPatch {
        fn keep<T: PartialEq>(mine: Option<T>, done: &Option<T>) -> Option<T> {
            match (&mine, done) {
                (Some(a), Some(b)) if a == b => None,
                _ => mine,
            }
        }
        ProgressionPatch {
            xp: keep(self.xp, &persisted.xp),
            league: keep(self.league, &persisted.league),
            cohort_id: keep(self.cohort_id, &persisted.cohort_id),
            streak: keep(self.streak, &persisted.streak),
            last_activity_date: keep(self.last_activity_date, &persisted.last_activity_date),
            streak7_count: keep(self.streak7_count, &persisted.streak7_count),
            night_owl_count: keep(self.night_owl_count, &persisted.night_owl_count),
            early_bird_count: keep(self.early_bird_count, &persisted.early_bird_count),
            completed_tasks: keep(self.completed_tasks, &persisted.completed_tasks),
            finals_won: keep(self.finals_won, &persisted.finals_won),
            top3_finishes: keep(self.top3_finishes, &persisted.top3_finishes),
            avatar_url: keep(self.avatar_url, &persisted.avatar_url),
        }
    }
}
