use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::league::{League, TransitionKind};
use crate::progression::AchievementId;

const ENCOURAGEMENTS: [&str; 8] = [
    "Great job! Keep the momentum going!",
    "One step closer to your goals!",
    "You're on fire!",
    "Consistency is key, and you're nailing it!",
    "Small progress is still progress!",
    "Unstoppable!",
    "Task crushed! What's next?",
    "Leveling up, one task at a time!",
];

/// Encouragement shown after a completion, rotating with the lifetime count.
pub fn encouragement(completed_tasks: u64) -> &'static str {
    ENCOURAGEMENTS[(completed_tasks % ENCOURAGEMENTS.len() as u64) as usize]
}

/// User-facing signals raised by the sync layer.
/// The UI drains them; nothing in the engine waits on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    TaskCompleted {
        task_id: String,
        xp_awarded: u64,
        message: String,
        at: DateTime<Utc>,
    },
    /// The streak reached a multiple of seven.
    StreakMilestone {
        streak: u32,
        streak7_count: u32,
        at: DateTime<Utc>,
    },
    AchievementUnlocked {
        id: AchievementId,
        at: DateTime<Utc>,
    },
    LeagueTransition {
        kind: TransitionKind,
        from: League,
        to: League,
        rank: Option<usize>,
        message: String,
        at: DateTime<Utc>,
    },
    /// A cohort peer moved from at-or-below the user's xp to above it.
    Overtaken {
        peer_id: String,
        peer_xp: u64,
        my_xp: u64,
        at: DateTime<Utc>,
    },
    UploadFailed {
        path: String,
        message: String,
        at: DateTime<Utc>,
    },
}

impl Notification {
    /// One-line text for a toast.
    pub fn text(&self) -> String {
        match self {
            Notification::TaskCompleted { message, .. } => message.clone(),
            Notification::StreakMilestone { streak, .. } => {
                format!("{streak}-day streak!")
            }
            Notification::AchievementUnlocked { id, .. } => {
                format!("Achievement unlocked: {}", id.title())
            }
            Notification::LeagueTransition { message, .. } => message.clone(),
            Notification::Overtaken {
                peer_id, peer_xp, ..
            } => format!("{peer_id} overtook you with {peer_xp} XP"),
            Notification::UploadFailed { message, .. } => format!("Upload failed: {message}"),
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Notification::TaskCompleted { at, .. }
            | Notification::StreakMilestone { at, .. }
            | Notification::AchievementUnlocked { at, .. }
            | Notification::LeagueTransition { at, .. }
            | Notification::Overtaken { at, .. }
            | Notification::UploadFailed { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tagged() {
        let n = Notification::StreakMilestone {
            streak: 14,
            streak7_count: 2,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "StreakMilestone");
        let back: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn test_text() {
        let n = Notification::AchievementUnlocked {
            id: AchievementId::NightOwl,
            at: Utc::now(),
        };
        assert!(n.text().starts_with("Achievement unlocked: "));
        assert_eq!(encouragement(0), encouragement(8));
    }
}
