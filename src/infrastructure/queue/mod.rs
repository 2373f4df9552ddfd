//! Queue persistence and snapshots

mod store;

pub use store::{QueueSnapshot, QueueStore};
