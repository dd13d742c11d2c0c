//! Optimistic synchronization between the local snapshot and the stores.

pub mod layer;
pub mod peers;


pub use layer::{Collaborators, SyncLayer, TaskOutcome};
pub use peers::{PeerUpdate, PeerWatch};
