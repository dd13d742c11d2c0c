//! Contracts the engine requires from its external collaborators.
//!
//! The engine never talks to a transport directly. It sees a Profile
//! Store, a Task Store, a Cohort Store, an Object Store and a Change
//! Notification Feed through the traits below. Two backends ship with the
//! crate: [`memory`] (in-process, with failure injection) and [`sqlite`]
//! (single-device local persistence).

pub mod feed;
pub mod fs_objects;
pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use feed::{ChangeEvent, ChangeRecord, FeedFilter, FeedHub, FeedSubscription};
pub use fs_objects::FsObjectStore;
pub use memory::{MemoryBackend, Op};
pub use sqlite::SqliteBackend;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::league::{Cohort, League};
use crate::progression::{ProgressionPatch, UserProgression};
use crate::task::{NewTask, Task, TaskPatch};

/// Profile Store, keyed by user id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Point read. `Ok(None)` means the profile does not exist yet.
    async fn fetch(&self, id: &str) -> Result<Option<UserProgression>, StoreError>;

    /// Insert a new profile; returns the stored record.
    async fn create(&self, profile: &UserProgression) -> Result<UserProgression, StoreError>;

    /// Partial update of the fields set in `patch`, sent as one request.
    async fn update(&self, id: &str, patch: &ProgressionPatch) -> Result<(), StoreError>;

    /// All profiles assigned to `cohort_id`, in no particular order.
    async fn cohort_members(&self, cohort_id: &str) -> Result<Vec<UserProgression>, StoreError>;
}

/// Task Store, keyed by task id and foreign-keyed to the owner.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert; the store assigns the id and creation timestamp.
    async fn create(&self, task: &NewTask) -> Result<Task, StoreError>;

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Tasks of `owner`, newest first.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError>;
}

/// Cohort bookkeeping used by the allocator.
#[async_trait]
pub trait CohortStore: Send + Sync {
    /// Cohorts of `league`, most recently opened first.
    async fn cohorts_for(&self, league: League) -> Result<Vec<Cohort>, StoreError>;

    /// Open a new, empty cohort.
    async fn create(&self, league: League) -> Result<Cohort, StoreError>;

    /// Count one more member in `cohort_id`.
    async fn record_join(&self, cohort_id: &str) -> Result<(), StoreError>;
}

/// Blob storage returning durable public URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, StoreError>;
}

/// Subscribe-by-filter stream of profile changes.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, filter: FeedFilter) -> Result<FeedSubscription, StoreError>;
}
