//! Change notification records and scoped subscriptions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::schema::{self, Row};
use super::ChangeFeed;
use crate::error::StoreError;
use crate::league::League;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert,
    Update,
    Delete,
}

/// One change as delivered by the feed. Rows are raw column-keyed maps;
/// `old` may be partial or absent depending on the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub event: ChangeEvent,
    pub table: String,
    pub old: Option<Row>,
    pub new: Option<Row>,
}

/// Server-side filter for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilter {
    pub table: String,
    /// Only deliver rows whose new `league` equals this one.
    pub league: Option<League>,
}

impl FeedFilter {
    pub fn profiles_in(league: League) -> Self {
        Self {
            table: schema::PROFILES_TABLE.to_string(),
            league: Some(league),
        }
    }

    pub fn matches(&self, record: &ChangeRecord) -> bool {
        if record.table != self.table {
            return false;
        }
        let Some(league) = self.league else {
            return true;
        };
        record
            .new
            .as_ref()
            .and_then(|row| schema::read_string(row, "league").ok().flatten())
            .and_then(|s| s.parse::<League>().ok())
            == Some(league)
    }
}

/// Live subscription. Released by [`FeedSubscription::cancel`] or, on any
/// other exit path, when dropped.
pub struct FeedSubscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<ChangeRecord>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl FeedSubscription {
    pub fn new(
        id: u64,
        receiver: mpsc::UnboundedReceiver<ChangeRecord>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next record; `None` once the feed side is gone.
    pub async fn recv(&mut self) -> Option<ChangeRecord> {
        self.receiver.recv().await
    }

    /// Next already-delivered record without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeRecord> {
        self.receiver.try_recv().ok()
    }

    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            self.receiver.close();
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}

type Subscribers = HashMap<u64, (FeedFilter, mpsc::UnboundedSender<ChangeRecord>)>;

/// In-process fan-out used by the bundled backends.
#[derive(Clone, Default)]
pub struct FeedHub {
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl FeedHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver `record` to every matching subscriber.
    pub fn publish(&self, record: &ChangeRecord) {
        let mut subs = self.subscribers();
        subs.retain(|_, (filter, tx)| {
            if !filter.matches(record) {
                return true;
            }
            tx.send(record.clone()).is_ok()
        });
    }

    /// Number of live subscriptions.
    pub fn active(&self) -> usize {
        self.subscribers().len()
    }
}

impl ChangeFeed for FeedHub {
    fn subscribe(&self, filter: FeedFilter) -> Result<FeedSubscription, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().insert(id, (filter, tx));

        let subscribers = Arc::clone(&self.subscribers);
        Ok(FeedSubscription::new(id, rx, move || {
            subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
        }))
    }
}
