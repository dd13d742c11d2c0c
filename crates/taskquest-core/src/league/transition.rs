//! Weekly promotion/relegation.
//!
//! There is no central scheduler: whichever client first observes a new
//! ISO week for its own user runs that user's transition. A per-install
//! [`WeeklyCycleMarker`] makes this idempotent locally. The marker only
//! advances after the combined profile update was persisted, so a failed
//! transition is retried on the next check.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use super::{rank_members, CohortAllocator, League, Standing};
use crate::error::{MarkerError, StoreError, SyncError};
use crate::progression::{ProgressionPatch, UserProgression};
use crate::storage::marker::WeekMarkerStore;
use crate::store::ProfileStore;

/// ISO week for which this installation last ran its user's transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCycleMarker {
    pub week: u32,
    /// ISO week-based year, which differs from the calendar year around
    /// New Year.
    pub year: i32,
}

impl WeeklyCycleMarker {
    pub fn for_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            week: iso.week(),
            year: iso.year(),
        }
    }
}

impl fmt::Display for WeeklyCycleMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Promoted,
    Relegated,
    Stable,
}

/// Result of one weekly transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub kind: TransitionKind,
    pub from: League,
    pub to: League,
    /// 1-based cohort rank; `None` when the user had no cohort to rank in.
    pub rank: Option<usize>,
    pub total: usize,
    /// Fields persisted for the transition.
    pub patch: ProgressionPatch,
}

impl TransitionOutcome {
    /// One-line notice for the UI.
    pub fn message(&self) -> String {
        match self.kind {
            TransitionKind::Promoted => format!("Promoted to {}!", self.to),
            TransitionKind::Relegated => format!("Relegated to {}", self.to),
            TransitionKind::Stable => format!("Stayed in {} League", self.to),
        }
    }
}

/// What a weekly check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeeklyCheck {
    /// First run on this installation; the current week became the baseline.
    Baseline(WeeklyCycleMarker),
    /// The transition for the current week already ran here.
    UpToDate,
    Transitioned(TransitionOutcome),
}

/// Movement for a 1-based `rank` among `total` members of `league`.
pub fn decide(league: League, rank: usize, total: usize) -> (TransitionKind, League) {
    match Standing::classify(league, rank, total) {
        Standing::Promotion => match league.promoted() {
            Some(up) => (TransitionKind::Promoted, up),
            None => (TransitionKind::Stable, league),
        },
        Standing::Relegation => match league.relegated() {
            Some(down) => (TransitionKind::Relegated, down),
            None => (TransitionKind::Stable, league),
        },
        Standing::Safe => (TransitionKind::Stable, league),
    }
}

/// Rank `user` within `members` and build the transition patch, except for
/// the new cohort reference. The local snapshot of `user` replaces any
/// (possibly stale) stored copy.
pub fn plan(user: &UserProgression, mut members: Vec<UserProgression>) -> TransitionOutcome {
    members.retain(|m| m.id != user.id);
    members.push(user.clone());
    rank_members(&mut members);

    let total = members.len();
    let rank = members.iter().position(|m| m.id == user.id).map(|i| i + 1);
    let (kind, to) = match rank {
        Some(rank) => decide(user.league, rank, total),
        None => (TransitionKind::Stable, user.league),
    };

    let mut patch = ProgressionPatch {
        xp: Some(0),
        league: Some(to),
        ..Default::default()
    };
    if rank == Some(1) {
        patch.finals_won = Some(user.finals_won.saturating_add(1));
    }
    if matches!(rank, Some(r) if r <= 3) {
        patch.top3_finishes = Some(user.top3_finishes.saturating_add(1));
    }

    TransitionOutcome {
        kind,
        from: user.league,
        to,
        rank,
        total,
        patch,
    }
}

/// Runs the weekly transition for the local user.
#[derive(Clone)]
pub struct LeagueScheduler {
    profiles: Arc<dyn ProfileStore>,
    allocator: CohortAllocator,
    markers: Arc<dyn WeekMarkerStore>,
}

impl LeagueScheduler {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        allocator: CohortAllocator,
        markers: Arc<dyn WeekMarkerStore>,
    ) -> Self {
        Self {
            profiles,
            allocator,
            markers,
        }
    }

    /// Compare the stored marker with the ISO week of `today` and run the
    /// transition at most once per week.
    pub async fn check(
        &self,
        user: &UserProgression,
        today: NaiveDate,
    ) -> Result<WeeklyCheck, SyncError> {
        let current = WeeklyCycleMarker::for_date(today);

        let stored = match self.markers.load() {
            Ok(stored) => stored,
            Err(MarkerError::InvalidFormat { path, message }) => {
                warn!(path = %path.display(), error = %message, "unreadable week marker, starting a new baseline");
                None
            }
            Err(e) => return Err(e.into()),
        };

        match stored {
            None => {
                self.markers.save(&current)?;
                info!(week = %current, "recorded first weekly baseline");
                Ok(WeeklyCheck::Baseline(current))
            }
            Some(marker) if marker == current => Ok(WeeklyCheck::UpToDate),
            Some(marker) => {
                info!(from = %marker, to = %current, user = %user.id, "running weekly league transition");
                let outcome = self.run(user).await?;
                if let Err(e) = self.markers.save(&current) {
                    // The transition is already persisted; a rerun here is
                    // the same duplicate window as two devices racing.
                    warn!(week = %current, error = %e, "transition applied but marker not saved");
                }
                Ok(WeeklyCheck::Transitioned(outcome))
            }
        }
    }

    /// Rank, move, reset and persist. Does not touch the marker.
    pub async fn run(&self, user: &UserProgression) -> Result<TransitionOutcome, StoreError> {
        let members = match &user.cohort_id {
            Some(cohort) => self.profiles.cohort_members(cohort).await?,
            None => Vec::new(),
        };

        let mut outcome = if user.cohort_id.is_some() {
            plan(user, members)
        } else {
            // Unranked: no comparison group this week.
            TransitionOutcome {
                kind: TransitionKind::Stable,
                from: user.league,
                to: user.league,
                rank: None,
                total: 0,
                patch: ProgressionPatch {
                    xp: Some(0),
                    league: Some(user.league),
                    ..Default::default()
                },
            }
        };

        let cohort = self.allocator.assign_or_none(outcome.to).await;
        outcome.patch.cohort_id = Some(cohort);

        self.profiles.update(&user.id, &outcome.patch).await?;
        info!(
            user = %user.id,
            kind = ?outcome.kind,
            from = %outcome.from,
            to = %outcome.to,
            rank = ?outcome.rank,
            total = outcome.total,
            "weekly transition persisted"
        );
        Ok(outcome)
    }
}
