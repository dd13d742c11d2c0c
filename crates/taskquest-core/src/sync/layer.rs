//! Optimistic sync layer.
//!
//! Every user intent is applied to the local snapshot first and persisted
//! afterwards. Remote failures never roll back progression; they leave the
//! unsent fields in a pending patch that the next mutation resends. The
//! snapshot lives behind a mutex that is never held across an `.await`.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::peers::{self, PeerWatch};
use crate::clock::Clock;
use crate::error::SyncError;
use crate::events::{encouragement, Notification};
use crate::league::{
    self, CohortAllocator, LeaderboardEntry, LeagueScheduler, WeeklyCheck, WeeklyCycleMarker,
};
use crate::progression::achievements::{self, AchievementStatus};
use crate::progression::{streak, AchievementTracker, ProgressionPatch, UserProgression};
use crate::storage::config::HourClass;
use crate::storage::{Config, WeekMarkerStore};
use crate::store::{
    ChangeFeed, ChangeRecord, CohortStore, FeedFilter, ObjectStore, ProfileStore, TaskStore,
};
use crate::task::{NewTask, Task, TaskPatch};

const AVATAR_UPLOAD: &str = "avatar";

/// External collaborators of the sync layer.
#[derive(Clone)]
pub struct Collaborators {
    pub profiles: Arc<dyn ProfileStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub cohorts: Arc<dyn CohortStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub markers: Arc<dyn WeekMarkerStore>,
}

impl Collaborators {
    /// Use one backend for every remote role.
    pub fn shared<B>(
        backend: Arc<B>,
        objects: Arc<dyn ObjectStore>,
        markers: Arc<dyn WeekMarkerStore>,
    ) -> Self
    where
        B: ProfileStore + TaskStore + CohortStore + ChangeFeed + 'static,
    {
        Self {
            profiles: backend.clone(),
            tasks: backend.clone(),
            cohorts: backend.clone(),
            objects,
            feed: backend,
            markers,
        }
    }
}

/// What a completion or toggle did to progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task was completed and its reward granted.
    Awarded { xp: u64 },
    /// Evidence was attached to an already completed task.
    ProofAttached,
    /// Already completed and nothing to attach.
    Unchanged,
    /// A completed task was reopened and its reward removed.
    Reverted { xp: u64 },
}

enum Completion {
    AlreadyDone,
    AttachProof(String),
    Award(ProgressionPatch, TaskPatch),
}

#[derive(Debug, Default)]
struct LocalState {
    profile: Option<UserProgression>,
    tasks: Vec<Task>,
    /// Profile fields applied locally but not yet confirmed by the store.
    pending: ProgressionPatch,
    achievements: AchievementTracker,
    uploading: HashSet<String>,
    peer_xp: HashMap<String, u64>,
    /// Hour classes of completions granted to tasks still being created.
    unconfirmed_awards: HashMap<String, HourClass>,
    notifications: VecDeque<Notification>,
    streak_committed: bool,
    /// ISO week the session last ran or skipped the weekly check for.
    week_seen: Option<WeeklyCycleMarker>,
}

impl LocalState {
    fn notify(&mut self, notification: Notification) {
        debug!(text = %notification.text(), "queued notification");
        self.notifications.push_back(notification);
    }

    /// Diff the current profile against the tracker and queue unlocks.
    fn observe_achievements(&mut self, at: DateTime<Utc>) {
        let Some(profile) = self.profile.clone() else {
            return;
        };
        for id in self.achievements.observe(&profile) {
            info!(achievement = id.as_str(), "achievement unlocked");
            self.notify(Notification::AchievementUnlocked { id, at });
        }
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, SyncError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| SyncError::TaskNotFound(id.to_string()))
    }
}

fn content_type(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Mediator between user intents, local state and the remote stores.
pub struct SyncLayer {
    user_id: String,
    config: Config,
    clock: Arc<dyn Clock>,
    stores: Collaborators,
    allocator: CohortAllocator,
    scheduler: LeagueScheduler,
    state: Mutex<LocalState>,
}

impl SyncLayer {
    pub fn new(
        user_id: impl Into<String>,
        config: Config,
        clock: Arc<dyn Clock>,
        stores: Collaborators,
    ) -> Self {
        let allocator = CohortAllocator::new(stores.cohorts.clone(), config.league.cohort_capacity);
        let scheduler = LeagueScheduler::new(
            stores.profiles.clone(),
            allocator.clone(),
            stores.markers.clone(),
        );
        Self {
            user_id: user_id.into(),
            config,
            clock,
            stores,
            allocator,
            scheduler,
            state: Mutex::new(LocalState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Local profile snapshot, once loaded.
    pub fn profile(&self) -> Option<UserProgression> {
        self.state().profile.clone()
    }

    /// Local task list, newest first.
    pub fn tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    /// Fields applied locally that the Profile Store has not confirmed.
    pub fn pending_patch(&self) -> ProgressionPatch {
        self.state().pending.clone()
    }

    /// Whether the last streak update reached the Profile Store.
    pub fn streak_committed(&self) -> bool {
        self.state().streak_committed
    }

    /// Whether an evidence upload for `task_id` is in flight.
    pub fn is_uploading(&self, task_id: &str) -> bool {
        self.state().uploading.contains(task_id)
    }

    pub fn is_uploading_avatar(&self) -> bool {
        self.state().uploading.contains(AVATAR_UPLOAD)
    }

    /// Lifetime points derived from completed tasks.
    pub fn total_points(&self) -> Option<u64> {
        self.profile()
            .map(|p| p.total_points(self.config.rewards.task_reward))
    }

    /// Status of every achievement for the local snapshot.
    pub fn achievements(&self) -> Vec<AchievementStatus> {
        self.profile()
            .map(|p| achievements::evaluate(&p))
            .unwrap_or_default()
    }

    /// Take every queued notification, oldest first.
    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.state().notifications.drain(..).collect()
    }

    /// Merge `patch` into the pending patch and send everything pending as
    /// one update. On failure the fields stay pending.
    async fn persist_profile(&self, patch: ProgressionPatch) -> Result<(), SyncError> {
        let outgoing = {
            let mut state = self.state();
            let pending = std::mem::take(&mut state.pending).merge(patch);
            state.pending = pending.clone();
            pending
        };
        if outgoing.is_empty() {
            return Ok(());
        }

        match self.stores.profiles.update(&self.user_id, &outgoing).await {
            Ok(()) => {
                let mut state = self.state();
                let pending = std::mem::take(&mut state.pending);
                state.pending = pending.settle(&outgoing);
                if outgoing.last_activity_date.is_some() {
                    state.streak_committed = state.pending.last_activity_date.is_none();
                }
                Ok(())
            }
            Err(e) => {
                if outgoing.last_activity_date.is_some() {
                    self.state().streak_committed = false;
                }
                warn!(
                    user = %self.user_id,
                    fields = ?outgoing.fields(),
                    error = %e,
                    "profile update failed, keeping local state"
                );
                Err(e.into())
            }
        }
    }

    /// Session start: fetch or create the profile, repair the cohort,
    /// advance the streak, load tasks and run any due weekly transition.
    pub async fn load(&self) -> Result<UserProgression, SyncError> {
        let now = self.clock.now();

        let fetched = self.stores.profiles.fetch(&self.user_id).await.map_err(|e| {
            warn!(user = %self.user_id, error = %e, "profile fetch failed");
            SyncError::from(e)
        })?;

        let profile = match fetched {
            Some(stored) => self.resume(stored, now).await,
            None => self.create_profile(now).await,
        };

        match self.stores.tasks.list_by_owner(&self.user_id).await {
            Ok(tasks) => {
                let mut state = self.state();
                // Keep optimistic records the store has not confirmed yet.
                let unconfirmed: Vec<Task> = state
                    .tasks
                    .iter()
                    .filter(|t| t.is_provisional())
                    .cloned()
                    .collect();
                state.tasks = unconfirmed.into_iter().chain(tasks).collect();
            }
            Err(e) => warn!(user = %self.user_id, error = %e, "task list failed, keeping local tasks"),
        }

        info!(user = %self.user_id, league = %profile.league, streak = profile.streak, "profile loaded");
        self.roll_week(now).await;
        Ok(self.profile().unwrap_or(profile))
    }

    async fn resume(&self, mut profile: UserProgression, now: DateTime<Utc>) -> UserProgression {
        {
            let mut state = self.state();
            if !state.achievements.has_baseline() {
                state.achievements.observe(&profile);
            }
        }

        if profile.cohort_id.is_none() {
            profile.cohort_id = self
                .allocator
                .repair(self.stores.profiles.as_ref(), &profile)
                .await;
        }

        let update = {
            let mut state = self.state();
            state.pending.apply_to(&mut profile);
            let update = streak::evaluate(&profile, now.date_naive());
            update.patch.apply_to(&mut profile);
            state.profile = Some(profile.clone());
            if update.milestone {
                state.notify(Notification::StreakMilestone {
                    streak: update.streak,
                    streak7_count: update.streak7_count,
                    at: now,
                });
            }
            state.observe_achievements(now);
            update
        };

        if update.changed() {
            // Failures stay pending and are logged by persist_profile.
            let _ = self.persist_profile(update.patch).await;
        } else {
            let mut state = self.state();
            state.streak_committed = state.pending.last_activity_date.is_none();
        }
        profile
    }

    async fn create_profile(&self, now: DateTime<Utc>) -> UserProgression {
        let mut profile = UserProgression::new_user(&self.user_id, now.date_naive(), now);
        profile.cohort_id = self.allocator.assign_or_none(profile.league).await;

        let committed = match self.stores.profiles.create(&profile).await {
            Ok(stored) => {
                info!(user = %self.user_id, cohort = ?stored.cohort_id, "created profile");
                profile = stored;
                true
            }
            Err(e) => {
                warn!(user = %self.user_id, error = %e, "profile creation failed, continuing locally");
                false
            }
        };

        let mut state = self.state();
        state.profile = Some(profile.clone());
        state.streak_committed = committed;
        state.achievements.observe(&profile);
        profile
    }

    /// Insert a provisional task and create it remotely. The provisional
    /// record is replaced on success and removed on failure.
    pub async fn add_task(&self, title: &str) -> Result<Task, SyncError> {
        let local = Task::provisional(
            &self.user_id,
            title,
            self.config.rewards.task_reward,
            self.clock.now(),
        );
        self.state().tasks.insert(0, local.clone());

        match self.stores.tasks.create(&NewTask::from(&local)).await {
            Ok(stored) => {
                let followup = {
                    let mut state = self.state();
                    state.unconfirmed_awards.remove(&local.id);
                    match state.tasks.iter_mut().find(|t| t.id == local.id) {
                        Some(slot) => {
                            // Edits made while the create was in flight win.
                            let patch = TaskPatch {
                                title: (slot.title != stored.title).then(|| slot.title.clone()),
                                completed: slot.completed.then_some(true),
                                proof_url: slot.proof_url.clone().map(Some),
                            };
                            let mut confirmed = stored.clone();
                            confirmed.apply(&patch);
                            *slot = confirmed.clone();
                            (!patch.is_empty()).then_some((confirmed, Some(patch)))
                        }
                        None => Some((stored.clone(), None)),
                    }
                };

                match followup {
                    Some((confirmed, Some(patch))) => {
                        if let Err(e) = self.stores.tasks.update(&confirmed.id, &patch).await {
                            warn!(task = %confirmed.id, error = %e, "follow-up task update failed");
                        }
                        Ok(confirmed)
                    }
                    Some((confirmed, None)) => {
                        // Deleted locally before the store confirmed it.
                        if let Err(e) = self.stores.tasks.delete(&confirmed.id).await {
                            warn!(task = %confirmed.id, error = %e, "follow-up task delete failed");
                        }
                        Ok(confirmed)
                    }
                    None => Ok(stored),
                }
            }
            Err(e) => {
                let reversal = {
                    let mut guard = self.state();
                    let state = &mut *guard;
                    let index = state.tasks.iter().position(|t| t.id == local.id);
                    let removed = index.map(|i| state.tasks.remove(i));
                    let hours = state.unconfirmed_awards.remove(&local.id);
                    match (removed, state.profile.as_mut()) {
                        // Completed while the create was in flight.
                        (Some(task), Some(profile)) if task.completed => {
                            Some(self.revoke_reward(profile, hours.unwrap_or_default()))
                        }
                        _ => None,
                    }
                };
                warn!(title, error = %e, "task create failed, rolled back");
                if let Some(patch) = reversal {
                    let _ = self.persist_profile(patch).await;
                }
                Err(e.into())
            }
        }
    }

    /// Take one completion's reward back out of `profile`, including the
    /// hour counters flagged in `hours`. Every counter stops at zero.
    fn revoke_reward(&self, profile: &mut UserProgression, hours: HourClass) -> ProgressionPatch {
        let reward = self.config.rewards.task_reward;
        let mut patch = ProgressionPatch {
            xp: Some(profile.xp.saturating_sub(reward)),
            completed_tasks: Some(profile.completed_tasks.saturating_sub(1)),
            ..Default::default()
        };
        if hours.night_owl {
            patch.night_owl_count = Some(profile.night_owl_count.saturating_sub(1));
        }
        if hours.early_bird {
            patch.early_bird_count = Some(profile.early_bird_count.saturating_sub(1));
        }
        patch.apply_to(profile);
        patch
    }

    /// Remove locally, then delete remotely. Remote failures are logged.
    pub async fn delete_task(&self, id: &str) -> Result<(), SyncError> {
        let removed = {
            let mut state = self.state();
            let index = state
                .tasks
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| SyncError::TaskNotFound(id.to_string()))?;
            state.unconfirmed_awards.remove(id);
            state.tasks.remove(index)
        };

        if removed.is_provisional() {
            return Ok(());
        }
        if let Err(e) = self.stores.tasks.delete(id).await {
            warn!(task = id, error = %e, "task delete failed, not retried");
        }
        Ok(())
    }

    /// Rename locally, then update remotely. Remote failures are logged.
    pub async fn edit_task(&self, id: &str, title: &str) -> Result<(), SyncError> {
        let provisional = {
            let mut state = self.state();
            let task = state.task_mut(id)?;
            task.title = title.to_string();
            task.is_provisional()
        };

        if provisional {
            return Ok(());
        }
        let patch = TaskPatch {
            title: Some(title.to_string()),
            ..Default::default()
        };
        if let Err(e) = self.stores.tasks.update(id, &patch).await {
            warn!(task = id, error = %e, "task edit failed, not retried");
        }
        Ok(())
    }

    async fn send_task_patch(&self, id: &str, patch: TaskPatch) {
        if id.starts_with(crate::task::TEMP_ID_PREFIX) {
            return;
        }
        if let Err(e) = self.stores.tasks.update(id, &patch).await {
            warn!(task = id, error = %e, "task update failed, keeping local state");
        }
    }

    /// Complete a task, or attach `proof` to one that already is.
    ///
    /// A fresh completion grants the configured reward, bumps the time of
    /// day counters and folds in the day's streak update, then persists the
    /// whole profile delta as one update. If that update fails the local
    /// state is kept and the error returned.
    pub async fn complete_task(
        &self,
        id: &str,
        proof: Option<String>,
    ) -> Result<TaskOutcome, SyncError> {
        let now = self.clock.now();
        let reward = self.config.rewards.task_reward;
        self.roll_week(now).await;

        let plan = {
            let mut state = self.state();
            let task = state.task_mut(id)?;
            if task.completed {
                match proof {
                    Some(url) => {
                        task.proof_url = Some(url.clone());
                        Completion::AttachProof(url)
                    }
                    None => Completion::AlreadyDone,
                }
            } else {
                self.award(&mut state, id, proof, now)?
            }
        };

        let (patch, task_patch) = match plan {
            Completion::AlreadyDone => return Ok(TaskOutcome::Unchanged),
            Completion::AttachProof(url) => {
                let patch = TaskPatch {
                    proof_url: Some(Some(url)),
                    ..Default::default()
                };
                self.send_task_patch(id, patch).await;
                return Ok(TaskOutcome::ProofAttached);
            }
            Completion::Award(patch, task_patch) => (patch, task_patch),
        };

        let persisted = self.persist_profile(patch).await;
        self.send_task_patch(id, task_patch).await;

        persisted.map(|()| TaskOutcome::Awarded { xp: reward })
    }

    /// Local half of a fresh completion.
    fn award(
        &self,
        state: &mut LocalState,
        id: &str,
        proof: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Completion, SyncError> {
        let reward = self.config.rewards.task_reward;
        let Some(profile) = state.profile.as_mut() else {
            return Err(SyncError::NotLoaded);
        };

        let hours = self.config.time_windows.classify(now);
        let mut patch = ProgressionPatch {
            xp: Some(profile.xp.saturating_add(reward)),
            completed_tasks: Some(profile.completed_tasks.saturating_add(1)),
            ..Default::default()
        };
        if hours.night_owl {
            patch.night_owl_count = Some(profile.night_owl_count.saturating_add(1));
        }
        if hours.early_bird {
            patch.early_bird_count = Some(profile.early_bird_count.saturating_add(1));
        }
        let day = streak::evaluate(profile, now.date_naive());
        let patch = patch.merge(day.patch.clone());
        patch.apply_to(profile);
        let completed_tasks = profile.completed_tasks;
        if id.starts_with(crate::task::TEMP_ID_PREFIX) {
            state.unconfirmed_awards.insert(id.to_string(), hours);
        }

        let task = state.task_mut(id)?;
        task.completed = true;
        if proof.is_some() {
            task.proof_url = proof.clone();
        }
        let task_patch = TaskPatch {
            completed: Some(true),
            proof_url: proof.map(Some),
            ..Default::default()
        };

        state.notify(Notification::TaskCompleted {
            task_id: id.to_string(),
            xp_awarded: reward,
            message: encouragement(completed_tasks).to_string(),
            at: now,
        });
        if day.milestone {
            state.notify(Notification::StreakMilestone {
                streak: day.streak,
                streak7_count: day.streak7_count,
                at: now,
            });
        }
        state.observe_achievements(now);
        Ok(Completion::Award(patch, task_patch))
    }

    /// Upload evidence, then complete the task with its URL. An upload
    /// failure changes nothing and is recoverable by retrying.
    pub async fn complete_task_with_upload(
        &self,
        id: &str,
        image: Vec<u8>,
        ext: &str,
    ) -> Result<TaskOutcome, SyncError> {
        {
            let mut state = self.state();
            state.task_mut(id)?;
            state.uploading.insert(id.to_string());
        }

        let path = format!("task-proofs/{}-{}-{}.{}", self.user_id, id, Uuid::new_v4(), ext);
        let uploaded = self
            .stores
            .objects
            .put(&path, image, content_type(ext))
            .await;
        self.state().uploading.remove(id);

        match uploaded {
            Ok(url) => self.complete_task(id, Some(url)).await,
            Err(e) => Err(self.upload_failed(path, e.to_string())),
        }
    }

    fn upload_failed(&self, path: String, message: String) -> SyncError {
        warn!(path = %path, error = %message, "upload failed");
        self.state().notify(Notification::UploadFailed {
            path: path.clone(),
            message: message.clone(),
            at: self.clock.now(),
        });
        SyncError::Upload { path, message }
    }

    /// Upload a new profile picture and store its URL.
    pub async fn set_avatar(&self, image: Vec<u8>, ext: &str) -> Result<String, SyncError> {
        if self.state().profile.is_none() {
            return Err(SyncError::NotLoaded);
        }
        self.state().uploading.insert(AVATAR_UPLOAD.to_string());

        let path = format!(
            "avatars/{}-{}.{}",
            self.user_id,
            self.clock.now().timestamp_millis(),
            ext
        );
        let uploaded = self
            .stores
            .objects
            .put(&path, image, content_type(ext))
            .await;
        self.state().uploading.remove(AVATAR_UPLOAD);

        let url = uploaded.map_err(|e| self.upload_failed(path, e.to_string()))?;
        let patch = ProgressionPatch {
            avatar_url: Some(Some(url.clone())),
            ..Default::default()
        };
        {
            let mut state = self.state();
            if let Some(profile) = state.profile.as_mut() {
                patch.apply_to(profile);
            }
        }
        self.persist_profile(patch).await?;
        Ok(url)
    }

    /// Complete an open task, or reopen a completed one. Reopening removes
    /// the configured reward, not the task's own `reward_value`; both
    /// counters stop at zero.
    pub async fn toggle_task(&self, id: &str) -> Result<TaskOutcome, SyncError> {
        let completed = self.state().task_mut(id)?.completed;
        if !completed {
            return self.complete_task(id, None).await;
        }
        self.roll_week(self.clock.now()).await;

        let reward = self.config.rewards.task_reward;
        let patch = {
            let mut state = self.state();
            let Some(profile) = state.profile.as_mut() else {
                return Err(SyncError::NotLoaded);
            };
            let patch = self.revoke_reward(profile, HourClass::default());
            state.task_mut(id)?.completed = false;
            state.unconfirmed_awards.remove(id);
            patch
        };

        let persisted = self.persist_profile(patch).await;
        self.send_task_patch(
            id,
            TaskPatch {
                completed: Some(false),
                ..Default::default()
            },
        )
        .await;
        persisted.map(|()| TaskOutcome::Reverted { xp: reward })
    }

    /// Run this week's league transition if it has not run here yet, and
    /// apply its result to the local snapshot.
    pub async fn check_weekly_transition(&self) -> Result<WeeklyCheck, SyncError> {
        let user = self.profile().ok_or(SyncError::NotLoaded)?;
        let now = self.clock.now();
        let check = self.scheduler.check(&user, now.date_naive()).await?;
        self.state().week_seen = Some(WeeklyCycleMarker::for_date(now.date_naive()));

        if let WeeklyCheck::Transitioned(outcome) = &check {
            let mut state = self.state();
            if let Some(profile) = state.profile.as_mut() {
                outcome.patch.apply_to(profile);
            }
            // The transition supersedes any unsent values for its fields.
            let pending = std::mem::take(&mut state.pending).merge(outcome.patch.clone());
            state.pending = pending.settle(&outcome.patch);
            state.peer_xp.clear();
            state.notify(Notification::LeagueTransition {
                kind: outcome.kind,
                from: outcome.from,
                to: outcome.to,
                rank: outcome.rank,
                message: outcome.message(),
                at: now,
            });
            state.observe_achievements(now);
        }
        Ok(check)
    }

    /// Run the weekly check unless it already ran for the ISO week of
    /// `now` in this session. Failures are logged and retried by the next
    /// intent.
    async fn roll_week(&self, now: DateTime<Utc>) {
        let current = WeeklyCycleMarker::for_date(now.date_naive());
        if self.state().week_seen == Some(current) {
            return;
        }
        debug!(week = %current, "new week observed, checking league transition");
        if let Err(e) = self.check_weekly_transition().await {
            warn!(week = %current, error = %e, "weekly check failed, will retry");
        }
    }

    /// Subscribe to profile changes in the user's league and seed the peer
    /// xp cache from the current cohort.
    pub async fn watch_peers(&self) -> Result<PeerWatch, SyncError> {
        let user = self.profile().ok_or(SyncError::NotLoaded)?;
        let subscription = self
            .stores
            .feed
            .subscribe(FeedFilter::profiles_in(user.league))?;

        if let Some(cohort) = &user.cohort_id {
            match self.stores.profiles.cohort_members(cohort).await {
                Ok(members) => {
                    let mut state = self.state();
                    for m in members.into_iter().filter(|m| m.id != self.user_id) {
                        state.peer_xp.insert(m.id, m.xp);
                    }
                }
                Err(e) => warn!(cohort = %cohort, error = %e, "could not seed peer xp"),
            }
        }
        Ok(PeerWatch::new(user.league, subscription))
    }

    /// Apply one feed record. Returns the overtake signal when a cohort
    /// peer just crossed above the user's xp.
    pub fn process_change(&self, record: &ChangeRecord) -> Option<Notification> {
        let update = peers::peer_update(record)?;
        let mut state = self.state();
        let (mine, my_cohort) = {
            let profile = state.profile.as_ref()?;
            (profile.xp, profile.cohort_id.clone())
        };
        if update.peer_id == self.user_id || my_cohort.is_none() || update.cohort_id != my_cohort {
            return None;
        }

        let previous = update
            .previous_xp
            .or_else(|| state.peer_xp.get(&update.peer_id).copied());
        state.peer_xp.insert(update.peer_id.clone(), update.xp);

        let previous = previous?;
        if !peers::crossed(previous, update.xp, mine) {
            return None;
        }
        info!(peer = %update.peer_id, peer_xp = update.xp, my_xp = mine, "overtaken by peer");
        let notification = Notification::Overtaken {
            peer_id: update.peer_id,
            peer_xp: update.xp,
            my_xp: mine,
            at: self.clock.now(),
        };
        state.notify(notification.clone());
        Some(notification)
    }

    /// Process every record already delivered to `watch`.
    pub fn poll_peers(&self, watch: &mut PeerWatch) -> Vec<Notification> {
        let mut raised = Vec::new();
        while let Some(record) = watch.try_next() {
            raised.extend(self.process_change(&record));
        }
        raised
    }

    /// Current cohort ranking with the local snapshot in place of the
    /// stored copy.
    pub async fn standings(&self) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let user = self.profile().ok_or(SyncError::NotLoaded)?;
        let mut members = match &user.cohort_id {
            Some(cohort) => self.stores.profiles.cohort_members(cohort).await?,
            None => Vec::new(),
        };
        members.retain(|m| m.id != user.id);
        members.push(user.clone());
        Ok(league::leaderboard(user.league, members))
    }
}
