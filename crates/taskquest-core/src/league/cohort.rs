//! Cohort allocation.
//!
//! Cohorts are opened lazily and never closed. Two clients assigning at the
//! same moment can both pick the same cohort and push it slightly past the
//! soft cap; cohort size only bounds the comparison group approximately, so
//! this drift is tolerated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::League;
use crate::error::StoreError;
use crate::progression::{ProgressionPatch, UserProgression};
use crate::store::{CohortStore, ProfileStore};

/// Default soft cap on cohort members.
pub const DEFAULT_COHORT_CAPACITY: u32 = 25;

/// A peer group within one league.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: String,
    pub league: League,
    pub member_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Cohort {
    pub fn has_room(&self, capacity: u32) -> bool {
        self.member_count < capacity
    }
}

/// Assigns users to open cohorts.
#[derive(Clone)]
pub struct CohortAllocator {
    cohorts: Arc<dyn CohortStore>,
    capacity: u32,
}

impl CohortAllocator {
    pub fn new(cohorts: Arc<dyn CohortStore>, capacity: u32) -> Self {
        Self { cohorts, capacity }
    }

    /// Join the newest cohort of `league` with room, opening one if none
    /// qualifies. Returns the cohort id.
    pub async fn assign(&self, league: League) -> Result<String, StoreError> {
        let open = self
            .cohorts
            .cohorts_for(league)
            .await?
            .into_iter()
            .find(|c| c.has_room(self.capacity));

        let cohort = match open {
            Some(cohort) => cohort,
            None => {
                let cohort = self.cohorts.create(league).await?;
                info!(cohort = %cohort.id, %league, "opened new cohort");
                cohort
            }
        };

        self.cohorts.record_join(&cohort.id).await?;
        debug!(cohort = %cohort.id, %league, "assigned cohort");
        Ok(cohort.id)
    }

    /// [`assign`](Self::assign), degrading to no cohort on failure.
    pub async fn assign_or_none(&self, league: League) -> Option<String> {
        match self.assign(league).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(%league, error = %e, "cohort assignment failed, continuing without cohort");
                None
            }
        }
    }

    /// Give a profile without a cohort one, persisting the reference before
    /// returning. On failure the profile stays unassigned and is retried on
    /// the next load.
    pub async fn repair(
        &self,
        profiles: &dyn ProfileStore,
        profile: &UserProgression,
    ) -> Option<String> {
        if profile.cohort_id.is_some() {
            return profile.cohort_id.clone();
        }

        let cohort_id = self.assign_or_none(profile.league).await?;
        let patch = ProgressionPatch {
            cohort_id: Some(Some(cohort_id.clone())),
            ..Default::default()
        };
        match profiles.update(&profile.id, &patch).await {
            Ok(()) => {
                info!(user = %profile.id, cohort = %cohort_id, "repaired missing cohort");
                Some(cohort_id)
            }
            Err(e) => {
                warn!(user = %profile.id, error = %e, "failed to persist repaired cohort");
                None
            }
        }
    }
}
