//! Registry of live objects, keyed by object id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::bus::ParticipantId;
use crate::channel::DoId;
use crate::object::DistributedObject;

/// An object's state, shared between its actor and inspectors.
pub type SharedObject = Arc<Mutex<DistributedObject>>;

/// Errors returned by directory mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Object {0} already exists")]
    AlreadyExists(DoId),
}

/// Directory record for one live object.
#[derive(Clone)]
pub struct ObjectEntry {
    /// Bus participant that owns the object's mailbox.
    pub participant: ParticipantId,
    pub object: SharedObject,
}

/// At most one live object per id.
#[derive(Default)]
pub struct ObjectDirectory {
    objects: RwLock<HashMap<DoId, ObjectEntry>>,
}

impl ObjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `do_id` for a new object. Fails if the id is taken.
    pub async fn insert(&self, do_id: DoId, entry: ObjectEntry) -> Result<(), DirectoryError> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(&do_id) {
            return Err(DirectoryError::AlreadyExists(do_id));
        }
        objects.insert(do_id, entry);
        debug!(do_id, live = objects.len(), "Object registered");
        Ok(())
    }

    pub async fn remove(&self, do_id: DoId) -> Option<ObjectEntry> {
        let removed = self.objects.write().await.remove(&do_id);
        if removed.is_some() {
            debug!(do_id, "Object unregistered");
        }
        removed
    }

    pub async fn get(&self, do_id: DoId) -> Option<ObjectEntry> {
        self.objects.read().await.get(&do_id).cloned()
    }

    pub async fn contains(&self, do_id: DoId) -> bool {
        self.objects.read().await.contains_key(&do_id)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Live ids, ascending.
    pub async fn ids(&self) -> Vec<DoId> {
        let mut ids: Vec<_> = self.objects.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Forget every object. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut objects = self.objects.write().await;
        let count = objects.len();
        objects.clear();
        count
    }
}
