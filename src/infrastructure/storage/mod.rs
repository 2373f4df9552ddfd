//! Storage infrastructure - Storage implementations

mod factory;
mod in_memory;
mod json_file;

pub use factory::{StorageConfig, StorageFactory, StorageType};
pub use in_memory::InMemoryStorage;
pub use json_file::JsonFileStorage;
