//! Day-granularity streak accounting.
//!
//! The last activity date always comes from the stored profile, never from
//! the local clock, so a client cannot extend its own streak by adjusting
//! the device time. Only "today" is taken from the caller.

use chrono::NaiveDate;

use super::{ProgressionPatch, UserProgression};

/// Streak length that earns an "on fire" milestone.
pub const STREAK_MILESTONE: u32 = 7;

/// Result of comparing the stored activity date with today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakUpdate {
    pub streak: u32,
    pub streak7_count: u32,
    /// The new streak landed on a multiple of [`STREAK_MILESTONE`].
    pub milestone: bool,
    /// Fields to persist as one unit. Empty when nothing changed.
    pub patch: ProgressionPatch,
}

impl StreakUpdate {
    pub fn changed(&self) -> bool {
        !self.patch.is_empty()
    }
}

/// Advance a streak from `last_activity` to `today`.
///
/// - same day: unchanged, except a stored streak below 1 is repaired to 1
/// - one day later: streak + 1
/// - a longer gap, a date in the future, or no recorded activity: streak = 1
pub fn advance(
    last_activity: Option<NaiveDate>,
    today: NaiveDate,
    streak: u32,
    streak7_count: u32,
) -> StreakUpdate {
    let elapsed = last_activity.map(|last| (today - last).num_days());

    if elapsed == Some(0) {
        let mut patch = ProgressionPatch::default();
        let streak = if streak < 1 {
            patch.streak = Some(1);
            1
        } else {
            streak
        };
        return StreakUpdate {
            streak,
            streak7_count,
            milestone: false,
            patch,
        };
    }

    let streak = match elapsed {
        Some(1) => streak.saturating_add(1),
        _ => 1,
    };

    let milestone = streak > 0 && streak % STREAK_MILESTONE == 0;
    let streak7_count = if milestone {
        streak7_count.saturating_add(1)
    } else {
        streak7_count
    };

    StreakUpdate {
        streak,
        streak7_count,
        milestone,
        patch: ProgressionPatch {
            streak: Some(streak),
            last_activity_date: Some(today),
            streak7_count: Some(streak7_count),
            ..Default::default()
        },
    }
}

/// [`advance`] using the counters stored on `profile`.
pub fn evaluate(profile: &UserProgression, today: NaiveDate) -> StreakUpdate {
    advance(
        profile.last_activity_date,
        today,
        profile.streak,
        profile.streak7_count,
    )
}
