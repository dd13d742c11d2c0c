//! League tiers, weekly thresholds and cohort standings.
//!
//! A league is an ordered tier; within it, users are compared against the
//! members of their cohort only. Weekly transitions move a user at most one
//! tier up or down.

pub mod cohort;
pub mod transition;

pub use cohort::{Cohort, CohortAllocator};
pub use transition::{
    LeagueScheduler, TransitionKind, TransitionOutcome, WeeklyCheck, WeeklyCycleMarker,
};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::progression::UserProgression;

/// Ordered league tier. `Bronze < Silver < Gold < Diamond`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub enum League {
    #[default]
    Bronze,
    Silver,
    Gold,
    Diamond,
}

/// Promotion/relegation counts for one league.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Top `promote` ranks move up one tier. Zero means no promotion.
    pub promote: usize,
    /// Bottom `relegate` ranks move down one tier. Zero means no relegation.
    pub relegate: usize,
}

impl League {
    pub const ALL: [League; 4] = [League::Bronze, League::Silver, League::Gold, League::Diamond];

    pub fn thresholds(self) -> Thresholds {
        match self {
            League::Bronze => Thresholds { promote: 5, relegate: 0 },
            League::Silver => Thresholds { promote: 5, relegate: 5 },
            League::Gold => Thresholds { promote: 8, relegate: 5 },
            League::Diamond => Thresholds { promote: 0, relegate: 5 },
        }
    }

    /// Next tier up, or `None` at Diamond.
    pub fn promoted(self) -> Option<League> {
        match self {
            League::Bronze => Some(League::Silver),
            League::Silver => Some(League::Gold),
            League::Gold => Some(League::Diamond),
            League::Diamond => None,
        }
    }

    /// Next tier down, or `None` at the Bronze floor.
    pub fn relegated(self) -> Option<League> {
        match self {
            League::Bronze => None,
            League::Silver => Some(League::Bronze),
            League::Gold => Some(League::Silver),
            League::Diamond => Some(League::Gold),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            League::Bronze => "Bronze",
            League::Silver => "Silver",
            League::Gold => "Gold",
            League::Diamond => "Diamond",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for League {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bronze" => Ok(League::Bronze),
            "silver" => Ok(League::Silver),
            "gold" => Ok(League::Gold),
            "diamond" => Ok(League::Diamond),
            other => Err(format!("unknown league: {other}")),
        }
    }
}

/// Zone a cohort rank falls into if the week ended now.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    Promotion,
    Safe,
    Relegation,
}

impl Standing {
    /// Classify a 1-based `rank` among `total` members of `league`.
    ///
    /// Promotion is checked first, so a tiny cohort where the same rank
    /// falls in both zones promotes.
    pub fn classify(league: League, rank: usize, total: usize) -> Standing {
        let t = league.thresholds();
        if t.promote > 0 && rank <= t.promote {
            Standing::Promotion
        } else if total > t.relegate && rank > total - t.relegate {
            Standing::Relegation
        } else {
            Standing::Safe
        }
    }
}

/// Ranking order for cohort members: xp descending, then earliest account
/// creation, then id.
pub fn rank_order(a: &UserProgression, b: &UserProgression) -> Ordering {
    b.xp.cmp(&a.xp)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort `members` in ranking order.
pub fn rank_members(members: &mut [UserProgression]) {
    members.sort_by(rank_order);
}

/// One row of a cohort leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub xp: u64,
    pub standing: Standing,
}

/// Rank `members` of `league` and tag each with its projected standing.
pub fn leaderboard(league: League, mut members: Vec<UserProgression>) -> Vec<LeaderboardEntry> {
    rank_members(&mut members);
    let total = members.len();
    members
        .into_iter()
        .enumerate()
        .map(|(i, m)| LeaderboardEntry {
            rank: i + 1,
            standing: Standing::classify(league, i + 1, total),
            user_id: m.id,
            xp: m.xp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn member(id: &str, xp: u64, created_secs: i64) -> UserProgression {
        UserProgression {
            id: id.to_string(),
            xp,
            created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_league_ordering() {
        assert!(League::Bronze < League::Silver);
        assert!(League::Silver < League::Gold);
        assert!(League::Gold < League::Diamond);
    }

    #[test]
    fn test_adjacent_tiers_only() {
        assert_eq!(League::Bronze.promoted(), Some(League::Silver));
        assert_eq!(League::Gold.promoted(), Some(League::Diamond));
        assert_eq!(League::Diamond.promoted(), None);
        assert_eq!(League::Bronze.relegated(), None);
        assert_eq!(League::Diamond.relegated(), Some(League::Gold));
    }

    #[test]
    fn test_thresholds_table() {
        assert_eq!(League::Bronze.thresholds(), Thresholds { promote: 5, relegate: 0 });
        assert_eq!(League::Silver.thresholds(), Thresholds { promote: 5, relegate: 5 });
        assert_eq!(League::Gold.thresholds(), Thresholds { promote: 8, relegate: 5 });
        assert_eq!(League::Diamond.thresholds(), Thresholds { promote: 0, relegate: 5 });
    }

    #[test]
    fn test_parse_league() {
        assert_eq!("gold".parse::<League>().unwrap(), League::Gold);
        assert_eq!("Diamond".parse::<League>().unwrap(), League::Diamond);
        assert!("platinum".parse::<League>().is_err());
    }

    #[test]
    fn test_standing_bronze_never_relegates() {
        assert_eq!(Standing::classify(League::Bronze, 3, 25), Standing::Promotion);
        assert_eq!(Standing::classify(League::Bronze, 13, 25), Standing::Safe);
        assert_eq!(Standing::classify(League::Bronze, 23, 25), Standing::Safe);
    }

    #[test]
    fn test_standing_silver_bottom_five() {
        assert_eq!(Standing::classify(League::Silver, 20, 25), Standing::Safe);
        assert_eq!(Standing::classify(League::Silver, 21, 25), Standing::Relegation);
    }

    #[test]
    fn test_standing_small_cohort_cannot_relegate() {
        // total must exceed the relegation count
        assert_eq!(Standing::classify(League::Diamond, 5, 5), Standing::Safe);
        assert_eq!(Standing::classify(League::Diamond, 6, 6), Standing::Relegation);
    }

    #[test]
    fn test_rank_order_ties_by_creation() {
        let mut members = vec![
            member("late", 100, 2_000),
            member("early", 100, 1_000),
            member("top", 150, 3_000),
        ];
        rank_members(&mut members);
        let ids: Vec<_> = members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "early", "late"]);
    }

    #[test]
    fn test_leaderboard_tags_standings() {
        let members = (0..10)
            .map(|i| member(&format!("u{i}"), 100 - i as u64, i))
            .collect();
        let board = leaderboard(League::Silver, members);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].user_id, "u0");
        assert_eq!(board[0].standing, Standing::Promotion);
        assert_eq!(board[5].standing, Standing::Relegation);
        assert_eq!(board[9].standing, Standing::Relegation);
    }
}
