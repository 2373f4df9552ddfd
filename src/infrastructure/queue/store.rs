//! Versioned queue record store
//!
//! Every write persists the item through [`Storage`] and then publishes a new
//! [`QueueSnapshot`] on a watch channel. Readers never see a partially
//! applied write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::domain::{DomainError, QueueItem, QueueItemId, QueueStatus, Storage};

/// Error recorded on items a previous process left running
pub const INTERRUPTED: &str = "Interrupted before the run finished";

/// Immutable view of the queue, items in queue order
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSnapshot {
    pub version: u64,
    pub items: Vec<QueueItem>,
}

impl QueueSnapshot {
    pub fn get(&self, id: &QueueItemId) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id() == id)
    }
}

pub struct QueueStore {
    storage: Arc<dyn Storage<QueueItem>>,
    next_sequence: AtomicU64,
    snapshots: watch::Sender<Arc<QueueSnapshot>>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("version", &self.snapshots.borrow().version)
            .field("next_sequence", &self.next_sequence.load(Ordering::SeqCst))
            .finish()
    }
}

impl QueueStore {
    /// Loads the persisted queue and publishes it as version 0.
    /// Items still marked running are failed, no run owns them anymore.
    pub async fn open(storage: Arc<dyn Storage<QueueItem>>) -> Result<Self, DomainError> {
        let mut items = sorted(storage.list().await?);

        for item in items
            .iter_mut()
            .filter(|item| item.status() == QueueStatus::Running)
        {
            warn!(item_id = %item.id(), "Queue item was left running, marking it failed");
            item.fail(INTERRUPTED);
            *item = storage.save(item.clone()).await?;
        }
        let next_sequence = items.iter().map(QueueItem::sequence).max().unwrap_or(0) + 1;

        debug!(items = items.len(), "Loaded queue");

        let (snapshots, _) = watch::channel(Arc::new(QueueSnapshot { version: 0, items }));

        Ok(Self {
            storage,
            next_sequence: AtomicU64::new(next_sequence),
            snapshots,
            write_lock: Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> Arc<QueueSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<QueueSnapshot>> {
        self.snapshots.subscribe()
    }

    pub async fn list(&self) -> Result<Vec<QueueItem>, DomainError> {
        Ok(sorted(self.storage.list().await?))
    }

    pub async fn get(&self, id: &QueueItemId) -> Result<Option<QueueItem>, DomainError> {
        self.storage.get(id).await
    }

    /// Like [`QueueStore::get`] but a missing item is an error
    pub async fn require(&self, id: &QueueItemId) -> Result<QueueItem, DomainError> {
        self.storage
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Queue item '{}' not found", id)))
    }

    /// Appends items to the end of the queue
    pub async fn append(&self, items: Vec<QueueItem>) -> Result<Vec<QueueItem>, DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut created = Vec::with_capacity(items.len());

        for mut item in items {
            item.set_sequence(self.next_sequence.fetch_add(1, Ordering::SeqCst));
            created.push(self.storage.create(item).await?);
        }

        self.publish().await?;
        Ok(created)
    }

    /// Persists a changed item, which must still exist
    pub async fn save(&self, item: QueueItem) -> Result<QueueItem, DomainError> {
        let _guard = self.write_lock.lock().await;
        let saved = self.storage.update(item).await?;
        self.publish().await?;
        Ok(saved)
    }

    pub async fn delete(&self, id: &QueueItemId) -> Result<bool, DomainError> {
        let _guard = self.write_lock.lock().await;
        let deleted = self.storage.delete(id).await?;
        if deleted {
            self.publish().await?;
        }
        Ok(deleted)
    }

    pub async fn clear(&self) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        self.storage.clear().await?;
        self.publish().await
    }

    async fn publish(&self) -> Result<(), DomainError> {
        let items = sorted(self.storage.list().await?);
        let version = self.snapshots.borrow().version + 1;

        self.snapshots
            .send_replace(Arc::new(QueueSnapshot { version, items }));
        Ok(())
    }
}

fn sorted(mut items: Vec<QueueItem>) -> Vec<QueueItem> {
    items.sort_by(|a, b| {
        a.sequence()
            .cmp(&b.sequence())
            .then_with(|| a.id().as_str().cmp(b.id().as_str()))
    });
    items
}
