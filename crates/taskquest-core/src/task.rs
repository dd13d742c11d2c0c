//! Task records owned by exactly one user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of client-side identifiers not yet confirmed by the Task Store.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// A task as seen by the owning client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Owning user id.
    pub owner: String,
    pub title: String,
    pub completed: bool,
    /// Object Store URL of the completion evidence.
    pub proof_url: Option<String>,
    /// Reward fixed at creation time.
    pub reward_value: u64,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Optimistic local record with a temporary id.
    pub fn provisional(owner: &str, title: &str, reward_value: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4()),
            owner: owner.to_string(),
            title: title.to_string(),
            completed: false,
            proof_url: None,
            reward_value,
            created_at: now,
        }
    }

    /// Whether the Task Store has not yet assigned this task an id.
    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(proof) = &patch.proof_url {
            self.proof_url = proof.clone();
        }
    }
}

/// Create request for the Task Store. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub owner: String,
    pub title: String,
    pub reward_value: u64,
}

impl From<&Task> for NewTask {
    fn from(task: &Task) -> Self {
        Self {
            owner: task.owner.clone(),
            title: task.title.clone(),
            reward_value: task.reward_value,
        }
    }
}

/// Partial task update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub proof_url: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.completed.is_none() && self.proof_url.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisional_ids_are_unique() {
        let now = Utc::now();
        let a = Task::provisional("u1", "Read", 50, now);
        let b = Task::provisional("u1", "Read", 50, now);
        assert!(a.is_provisional());
        assert_ne!(a.id, b.id);
        assert!(!a.completed);
        assert_eq!(a.reward_value, 50);
    }

    #[test]
    fn test_apply_patch() {
        let mut task = Task::provisional("u1", "Draft", 50, Utc::now());
        task.apply(&TaskPatch {
            completed: Some(true),
            proof_url: Some(Some("https://cdn/p.png".into())),
            ..Default::default()
        });
        assert!(task.completed);
        assert_eq!(task.title, "Draft");
        assert_eq!(task.proof_url.as_deref(), Some("https://cdn/p.png"));
        assert!(TaskPatch::default().is_empty());
    }
}
