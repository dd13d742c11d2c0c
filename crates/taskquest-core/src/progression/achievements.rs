//! Achievement predicates and unlock-edge detection.
//!
//! Evaluation is a pure function of a progression snapshot. A "new unlock"
//! is the transition of an achievement's count from zero to non-zero
//! between two snapshots, so re-evaluating the same state never fires
//! twice.

use serde::{Deserialize, Serialize};

use super::UserProgression;
use crate::league::League;

/// Completed tasks per Centurion level.
pub const CENTURION_STEP: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AchievementId {
    Podium,
    Champion,
    OnFire,
    Centurion,
    NightOwl,
    DiamondTier,
    EarlyBird,
}

impl AchievementId {
    pub const ALL: [AchievementId; 7] = [
        AchievementId::Podium,
        AchievementId::Champion,
        AchievementId::OnFire,
        AchievementId::Centurion,
        AchievementId::NightOwl,
        AchievementId::DiamondTier,
        AchievementId::EarlyBird,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AchievementId::Podium => "podium",
            AchievementId::Champion => "champion",
            AchievementId::OnFire => "on-fire",
            AchievementId::Centurion => "centurion",
            AchievementId::NightOwl => "night-owl",
            AchievementId::DiamondTier => "diamond-tier",
            AchievementId::EarlyBird => "early-bird",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AchievementId::Podium => "Podium Finish",
            AchievementId::Champion => "Champion",
            AchievementId::OnFire => "On Fire",
            AchievementId::Centurion => "Centurion",
            AchievementId::NightOwl => "Night Owl",
            AchievementId::DiamondTier => "Diamond",
            AchievementId::EarlyBird => "Early Bird",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AchievementId::Podium => "Finish a week in the top 3 of your cohort",
            AchievementId::Champion => "Finish a week first in your cohort",
            AchievementId::OnFire => "Reach a 7 day streak",
            AchievementId::Centurion => "Complete 100 tasks",
            AchievementId::NightOwl => "Complete a task between 22:00 and 04:00",
            AchievementId::DiamondTier => "Reach the Diamond league",
            AchievementId::EarlyBird => "Complete a task between 05:00 and 09:00",
        }
    }

    /// Repeat count for this achievement; zero means locked.
    pub fn count(self, p: &UserProgression) -> u64 {
        match self {
            AchievementId::Podium => p.top3_finishes as u64,
            AchievementId::Champion => p.finals_won as u64,
            AchievementId::OnFire => p.streak7_count as u64,
            AchievementId::Centurion => p.completed_tasks / CENTURION_STEP,
            AchievementId::NightOwl => p.night_owl_count as u64,
            AchievementId::DiamondTier => u64::from(p.league == League::Diamond),
            AchievementId::EarlyBird => p.early_bird_count as u64,
        }
    }
}

/// Evaluated state of one achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementStatus {
    pub id: AchievementId,
    pub unlocked: bool,
    pub count: u64,
}

/// Evaluate every achievement against `p`.
pub fn evaluate(p: &UserProgression) -> Vec<AchievementStatus> {
    AchievementId::ALL
        .iter()
        .map(|&id| {
            let count = id.count(p);
            AchievementStatus {
                id,
                unlocked: count > 0,
                count,
            }
        })
        .collect()
}

/// Achievements whose count moved from zero to non-zero.
pub fn newly_unlocked(previous: &UserProgression, current: &UserProgression) -> Vec<AchievementId> {
    AchievementId::ALL
        .iter()
        .copied()
        .filter(|id| id.count(previous) == 0 && id.count(current) > 0)
        .collect()
}

/// Keeps the last observed snapshot so unlocks fire once per edge.
#[derive(Debug, Clone, Default)]
pub struct AchievementTracker {
    previous: Option<UserProgression>,
}

impl AchievementTracker {
    /// Record `current`; returns the achievements unlocked since the last
    /// observation. The first observation only sets the baseline.
    pub fn observe(&mut self, current: &UserProgression) -> Vec<AchievementId> {
        let unlocked = match &self.previous {
            Some(prev) => newly_unlocked(prev, current),
            None => Vec::new(),
        };
        self.previous = Some(current.clone());
        unlocked
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }
}
