//! Storage factory for runtime storage selection

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::StorageSettings;
use crate::domain::storage::{Storage, StorageEntity};
use crate::domain::DomainError;

use super::in_memory::InMemoryStorage;
use super::json_file::JsonFileStorage;

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// In-memory storage (for testing/single runs)
    InMemory,
    /// One JSON document per collection
    File,
}

impl FromStr for StorageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Ok(Self::InMemory),
            "file" | "json" | "json_file" => Ok(Self::File),
            other => Err(DomainError::configuration(format!(
                "Unknown storage backend '{}'",
                other
            ))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    File { data_dir: PathBuf },
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self::InMemory
    }

    pub fn file(data_dir: impl Into<PathBuf>) -> Self {
        Self::File {
            data_dir: data_dir.into(),
        }
    }

    pub fn from_settings(settings: &StorageSettings) -> Result<Self, DomainError> {
        Ok(match settings.backend.parse::<StorageType>()? {
            StorageType::InMemory => Self::InMemory,
            StorageType::File => Self::file(&settings.data_dir),
        })
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::InMemory => StorageType::InMemory,
            Self::File { .. } => StorageType::File,
        }
    }
}

/// Factory for creating storage instances
#[derive(Debug)]
pub struct StorageFactory;

impl StorageFactory {
    /// Creates the storage of one collection, e.g. `workflows` or `queue`
    pub async fn create<E>(
        config: &StorageConfig,
        collection: &str,
    ) -> Result<Arc<dyn Storage<E>>, DomainError>
    where
        E: StorageEntity + 'static,
    {
        match config {
            StorageConfig::InMemory => Ok(Arc::new(InMemoryStorage::<E>::new())),
            StorageConfig::File { data_dir } => {
                let path = data_dir.join(format!("{}.json", collection));
                Ok(Arc::new(JsonFileStorage::<E>::open(path).await?))
            }
        }
    }
}
