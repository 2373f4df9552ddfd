//! JSON document storage
//!
//! Each entity type lives in a single file holding a JSON array. Every
//! mutation rewrites the whole document through a temporary file and a
//! rename, so a crash never leaves a half-written file behind.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::storage::{Storage, StorageEntity, StorageKey};
use crate::domain::DomainError;

#[derive(Debug)]
pub struct JsonFileStorage<E>
where
    E: StorageEntity,
{
    path: PathBuf,
    entities: Mutex<Vec<E>>,
}

impl<E> JsonFileStorage<E>
where
    E: StorageEntity,
{
    /// Opens the document at `path`, starting empty when it does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let path = path.into();
        let entities = load(&path).await?;

        debug!(path = %path.display(), entities = entities.len(), "Opened JSON storage");

        Ok(Self {
            path,
            entities: Mutex::new(entities),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entities: &[E]) -> Result<(), DomainError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DomainError::storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let body = serde_json::to_vec_pretty(entities)
            .map_err(|e| DomainError::storage(format!("Failed to serialize entities: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(|e| {
            DomainError::storage(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            DomainError::storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        Ok(())
    }
}

async fn load<E: StorageEntity>(path: &Path) -> Result<Vec<E>, DomainError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(DomainError::storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| DomainError::storage(format!("Corrupt document {}: {}", path.display(), e)))
}

fn position<E: StorageEntity>(entities: &[E], key: &str) -> Option<usize> {
    entities.iter().position(|e| e.key().as_str() == key)
}

#[async_trait]
impl<E> Storage<E> for JsonFileStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        let entities = self.entities.lock().await;
        Ok(position(&entities, key.as_str()).map(|i| entities[i].clone()))
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        Ok(self.entities.lock().await.clone())
    }

    async fn create(&self, entity: E) -> Result<E, DomainError> {
        let mut entities = self.entities.lock().await;

        if position(&entities, entity.key().as_str()).is_some() {
            return Err(DomainError::conflict(format!(
                "Entity with key '{}' already exists",
                entity.key().as_str()
            )));
        }

        let mut next = entities.clone();
        next.push(entity.clone());
        self.persist(&next).await?;
        *entities = next;

        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E, DomainError> {
        let mut entities = self.entities.lock().await;

        let index = position(&entities, entity.key().as_str()).ok_or_else(|| {
            DomainError::not_found(format!(
                "Entity with key '{}' not found",
                entity.key().as_str()
            ))
        })?;

        let mut next = entities.clone();
        next[index] = entity.clone();
        self.persist(&next).await?;
        *entities = next;

        Ok(entity)
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
        let mut entities = self.entities.lock().await;

        let Some(index) = position(&entities, key.as_str()) else {
            return Ok(false);
        };

        let mut next = entities.clone();
        next.remove(index);
        self.persist(&next).await?;
        *entities = next;

        Ok(true)
    }

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        let entities = self.entities.lock().await;
        Ok(position(&entities, key.as_str()).is_some())
    }

    async fn clear(&self) -> Result<(), DomainError> {
        let mut entities = self.entities.lock().await;
        self.persist(&[]).await?;
        entities.clear();
        Ok(())
    }
}
