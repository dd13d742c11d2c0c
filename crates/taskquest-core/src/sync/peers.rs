//! Peer observation over the change feed.
//!
//! Feed records may arrive out of order relative to local mutations, so
//! overtakes are derived from a before/after pair on each record rather
//! than from the peer's absolute position.

use crate::league::League;
use crate::store::feed::{ChangeEvent, ChangeRecord, FeedSubscription};
use crate::store::schema::{self, ProfileField, Row};

/// Live subscription to profile changes in one league.
#[derive(Debug)]
pub struct PeerWatch {
    league: League,
    subscription: FeedSubscription,
}

impl PeerWatch {
    pub(crate) fn new(league: League, subscription: FeedSubscription) -> Self {
        Self {
            league,
            subscription,
        }
    }

    /// League the subscription is filtered on. A transition to another
    /// league needs a fresh watch.
    pub fn league(&self) -> League {
        self.league
    }

    /// Wait for the next record; `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<ChangeRecord> {
        self.subscription.recv().await
    }

    /// Next record already delivered, without waiting.
    pub fn try_next(&mut self) -> Option<ChangeRecord> {
        self.subscription.try_recv()
    }

    /// Release the subscription.
    pub fn cancel(self) {
        self.subscription.cancel();
    }
}

/// The parts of a profile change needed for overtake detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerUpdate {
    pub peer_id: String,
    pub cohort_id: Option<String>,
    pub xp: u64,
    /// `xp` from the record's before-image, when the store sent one.
    pub previous_xp: Option<u64>,
}

fn xp_of(row: &Row) -> Option<u64> {
    let column = ProfileField::Xp.column();
    if !row.contains_key(column) {
        return None;
    }
    schema::read_u64(row, column).ok()
}

/// Extract a peer update from a profile insert or update. Records without
/// an id or an `xp` value are ignored.
pub fn peer_update(record: &ChangeRecord) -> Option<PeerUpdate> {
    if record.table != schema::PROFILES_TABLE || record.event == ChangeEvent::Delete {
        return None;
    }
    let new = record.new.as_ref()?;
    let peer_id = schema::read_string(new, schema::ID_COLUMN).ok().flatten()?;
    let xp = xp_of(new)?;
    let cohort_id = schema::read_string(new, ProfileField::CohortId.column())
        .ok()
        .flatten();
    let previous_xp = record.old.as_ref().and_then(xp_of);

    Some(PeerUpdate {
        peer_id,
        cohort_id,
        xp,
        previous_xp,
    })
}

/// Crossing edge: the peer was at or below `mine` and is now above it.
pub fn crossed(previous: u64, new: u64, mine: u64) -> bool {
    previous <= mine && new > mine
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(old: Option<serde_json::Value>, new: serde_json::Value) -> ChangeRecord {
        ChangeRecord {
            event: ChangeEvent::Update,
            table: schema::PROFILES_TABLE.into(),
            old: old.and_then(|v| v.as_object().cloned()),
            new: new.as_object().cloned(),
        }
    }

    #[test]
    fn test_crossing_edge() {
        assert!(crossed(40, 50, 45));
        assert!(crossed(45, 46, 45));
        assert!(!crossed(46, 50, 45));
        assert!(!crossed(40, 45, 45));
    }

    #[test]
    fn test_peer_update_reads_before_image() {
        let update = peer_update(&record(
            Some(json!({"id": "p", "xp": 40})),
            json!({"id": "p", "xp": 50, "cohort_id": "c1"}),
        ))
        .unwrap();
        assert_eq!(update.previous_xp, Some(40));
        assert_eq!(update.xp, 50);
        assert_eq!(update.cohort_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_partial_before_image_has_no_previous() {
        let update = peer_update(&record(
            Some(json!({"id": "p"})),
            json!({"id": "p", "xp": 50}),
        ))
        .unwrap();
        assert_eq!(update.previous_xp, None);
    }

    #[test]
    fn test_ignores_other_tables_and_missing_xp() {
        let mut other = record(None, json!({"id": "t", "xp": 1}));
        other.table = "tasks".into();
        assert!(peer_update(&other).is_none());
        assert!(peer_update(&record(None, json!({"id": "p", "streak": 3}))).is_none());
    }
}
