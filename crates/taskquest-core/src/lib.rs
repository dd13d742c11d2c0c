//! # TaskQuest Core Library
//!
//! This library provides the progression and league synchronization engine
//! for TaskQuest, a gamified task tracker. Users complete tasks to earn XP,
//! keep daily streaks, and are ranked inside a cohort of their league; the
//! cohorts are re-ranked every ISO week.
//!
//! ## Architecture
//!
//! - **Progression**: streak accounting and achievement rules over a
//!   [`UserProgression`] snapshot, changed only through [`ProgressionPatch`]
//! - **League**: cohort allocation and the weekly promotion/relegation
//!   scheduler, run by whichever client first sees a new week
//! - **Sync**: the [`SyncLayer`], which applies every intent locally first
//!   and reconciles with the remote stores afterwards
//! - **Store**: traits for the Profile, Task, Cohort and Object stores and the
//!   change feed, with in-memory and SQLite backends
//! - **Storage**: TOML configuration and the local weekly marker
//!
//! ## Key Components
//!
//! - [`SyncLayer`]: Owner of the local snapshot and its mutation API
//! - [`LeagueScheduler`]: Weekly transition state machine
//! - [`CohortAllocator`]: Cohort assignment and repair
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod league;
pub mod progression;
pub mod storage;
pub mod store;
pub mod sync;
pub mod task;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ConfigError, CoreError, MarkerError, StoreError, SyncError};
pub use events::Notification;
pub use league::{
    CohortAllocator, League, LeagueScheduler, Standing, TransitionKind, TransitionOutcome,
    WeeklyCheck, WeeklyCycleMarker,
};
pub use progression::{AchievementId, ProgressionPatch, UserProgression};
pub use storage::{Config, FileMarkerStore, MemoryMarkerStore, WeekMarkerStore};
pub use store::{FsObjectStore, MemoryBackend, SqliteBackend};
pub use sync::{Collaborators, PeerWatch, SyncLayer, TaskOutcome};
pub use task::{Task, TaskPatch};
