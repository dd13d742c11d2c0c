//! In-process backend implementing every collaborator trait.
//!
//! Profiles are kept as raw schema rows so that what the change feed
//! publishes is exactly what a remote store would send. Any operation can be
//! made to fail with [`MemoryBackend::fail`] until [`MemoryBackend::recover`].

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::feed::{ChangeEvent, ChangeRecord, FeedFilter, FeedHub, FeedSubscription};
use super::schema::{self, Row};
use super::{ChangeFeed, CohortStore, ObjectStore, ProfileStore, TaskStore};
use crate::error::StoreError;
use crate::league::{Cohort, League};
use crate::progression::{ProgressionPatch, UserProgression};
use crate::task::{NewTask, Task, TaskPatch};

/// Operations that can be targeted by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchProfile,
    CreateProfile,
    UpdateProfile,
    CohortMembers,
    CreateTask,
    UpdateTask,
    DeleteTask,
    ListTasks,
    ListCohorts,
    CreateCohort,
    JoinCohort,
    PutObject,
    Subscribe,
}

#[derive(Debug, Default)]
struct Inner {
    profiles: BTreeMap<String, Row>,
    /// Newest first.
    tasks: Vec<Task>,
    /// Oldest first.
    cohorts: Vec<Cohort>,
    objects: HashMap<String, (Vec<u8>, String)>,
    failing: HashSet<Op>,
    calls: HashMap<Op, usize>,
    profile_updates: Vec<(String, Row)>,
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
    feed: FeedHub,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a call to `op` and fail it if injection is active.
    fn enter(&self, op: Op) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.lock();
        *inner.calls.entry(op).or_default() += 1;
        if inner.failing.contains(&op) {
            return Err(StoreError::Unreachable(format!("injected failure: {op:?}")));
        }
        Ok(inner)
    }

    /// Make every subsequent `op` fail as unreachable.
    pub fn fail(&self, op: Op) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: Op) {
        self.lock().failing.remove(&op);
    }

    /// Fail every operation, as if the remote were offline.
    pub fn go_offline(&self) {
        let mut inner = self.lock();
        inner.failing.extend([
            Op::FetchProfile,
            Op::CreateProfile,
            Op::UpdateProfile,
            Op::CohortMembers,
            Op::CreateTask,
            Op::UpdateTask,
            Op::DeleteTask,
            Op::ListTasks,
            Op::ListCohorts,
            Op::CreateCohort,
            Op::JoinCohort,
            Op::PutObject,
            Op::Subscribe,
        ]);
    }

    pub fn go_online(&self) {
        self.lock().failing.clear();
    }

    /// Number of times `op` was attempted, including failed attempts.
    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Columns written by each successful profile update, in order.
    pub fn profile_updates(&self) -> Vec<(String, Row)> {
        self.lock().profile_updates.clone()
    }

    /// Insert a profile directly, bypassing failure injection and the feed.
    pub fn seed_profile(&self, profile: &UserProgression) {
        self.lock()
            .profiles
            .insert(profile.id.clone(), schema::encode_profile(profile));
    }

    /// Insert an arbitrary row, e.g. one written by an older client.
    pub fn seed_row(&self, row: Row) {
        if let Ok(Some(id)) = schema::read_string(&row, schema::ID_COLUMN) {
            self.lock().profiles.insert(id, row);
        }
    }

    /// Raw stored row for `id`.
    pub fn fetch_row(&self, id: &str) -> Option<Row> {
        self.lock().profiles.get(id).cloned()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).map(|(bytes, _)| bytes.clone())
    }

    /// Feed hub, for publishing changes made by other clients.
    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn fetch(&self, id: &str) -> Result<Option<UserProgression>, StoreError> {
        let inner = self.enter(Op::FetchProfile)?;
        inner.profiles.get(id).map(schema::decode_profile).transpose()
    }

    async fn create(&self, profile: &UserProgression) -> Result<UserProgression, StoreError> {
        let row = {
            let mut inner = self.enter(Op::CreateProfile)?;
            if inner.profiles.contains_key(&profile.id) {
                return Err(StoreError::Conflict {
                    kind: "profile",
                    id: profile.id.clone(),
                });
            }
            let row = schema::encode_profile(profile);
            inner.profiles.insert(profile.id.clone(), row.clone());
            row
        };

        self.feed.publish(&ChangeRecord {
            event: ChangeEvent::Insert,
            table: schema::PROFILES_TABLE.to_string(),
            old: None,
            new: Some(row),
        });
        Ok(profile.clone())
    }

    async fn update(&self, id: &str, patch: &ProgressionPatch) -> Result<(), StoreError> {
        let (old, new) = {
            let mut inner = self.enter(Op::UpdateProfile)?;
            let changes = schema::encode_patch(patch);
            let Some(row) = inner.profiles.get_mut(id) else {
                return Err(StoreError::NotFound {
                    kind: "profile",
                    id: id.to_string(),
                });
            };
            let old = row.clone();
            row.extend(changes.clone());
            let new = row.clone();
            inner.profile_updates.push((id.to_string(), changes));
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
        let inner = self.enter(Op::CohortMembers)?;
        inner
            .profiles
            .values()
            .filter(|row| {
                schema::read_string(row, "cohort_id")
                    .ok()
                    .flatten()
                    .as_deref()
                    == Some(cohort_id)
            })
            .map(schema::decode_profile)
            .collect()
    }
}

#[async_trait]
impl TaskStore for MemoryBackend {
    async fn create(&self, task: &NewTask) -> Result<Task, StoreError> {
        let mut inner = self.enter(Op::CreateTask)?;
        let stored = Task {
            id: format!("task-{}", Uuid::new_v4()),
            owner: task.owner.clone(),
            title: task.title.clone(),
            completed: false,
            proof_url: None,
            reward_value: task.reward_value,
            created_at: Utc::now(),
        };
        inner.tasks.insert(0, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        let mut inner = self.enter(Op::UpdateTask)?;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "task",
                id: id.to_string(),
            })?;
        task.apply(patch);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.enter(Op::DeleteTask)?;
        inner.tasks.retain(|t| t.id != id);
        Ok(())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        let inner = self.enter(Op::ListTasks)?;
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CohortStore for MemoryBackend {
    async fn cohorts_for(&self, league: League) -> Result<Vec<Cohort>, StoreError> {
        let inner = self.enter(Op::ListCohorts)?;
        Ok(inner
            .cohorts
            .iter()
            .rev()
            .filter(|c| c.league == league)
            .cloned()
            .collect())
    }

    async fn create(&self, league: League) -> Result<Cohort, StoreError> {
        let mut inner = self.enter(Op::CreateCohort)?;
        let cohort = Cohort {
            id: format!("cohort-{}", Uuid::new_v4()),
            league,
            member_count: 0,
            created_at: Utc::now(),
        };
        inner.cohorts.push(cohort.clone());
        Ok(cohort)
    }

    async fn record_join(&self, cohort_id: &str) -> Result<(), StoreError> {
        let mut inner = self.enter(Op::JoinCohort)?;
        let cohort = inner
            .cohorts
            .iter_mut()
            .find(|c| c.id == cohort_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "cohort",
                id: cohort_id.to_string(),
            })?;
        cohort.member_count = cohort.member_count.saturating_add(1);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let mut inner = self.enter(Op::PutObject)?;
        inner
            .objects
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://objects/{path}"))
    }
}

impl ChangeFeed for MemoryBackend {
    fn subscribe(&self, filter: FeedFilter) -> Result<FeedSubscription, StoreError> {
        drop(self.enter(Op::Subscribe)?);
        self.feed.subscribe(filter)
    }
}
