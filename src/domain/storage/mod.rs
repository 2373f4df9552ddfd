//! Storage domain - generic persistence abstraction shared by workflows and queue items

mod repository;

pub use repository::{Storage, StorageEntity, StorageKey};

#[cfg(test)]
pub use repository::mock;
