//! In-memory ObjectStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::channel::DoId;
use crate::interfaces::object_store::{ObjectData, ObjectStore, Result, StorageError};

struct MemoryState {
    next_id: Option<DoId>,
    objects: HashMap<DoId, ObjectData>,
}

/// Object store that keeps snapshots in a map and hands out ids
/// sequentially from a starting value.
pub struct MemoryObjectStore {
    state: RwLock<MemoryState>,
}

impl MemoryObjectStore {
    pub fn new(first_id: DoId) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                next_id: Some(first_id),
                objects: HashMap::new(),
            }),
        }
    }

    pub async fn stored_count(&self) -> usize {
        self.state.read().await.objects.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn create_object(&self, data: ObjectData) -> Result<DoId> {
        let mut state = self.state.write().await;
        let do_id = state.next_id.ok_or(StorageError::Exhausted)?;
        state.next_id = do_id.checked_add(1);
        state.objects.insert(do_id, data);
        Ok(do_id)
    }

    async fn delete_object(&self, do_id: DoId) -> Result<()> {
        self.state.write().await.objects.remove(&do_id);
        Ok(())
    }

    async fn get_object(&self, do_id: DoId) -> Result<Option<ObjectData>> {
        Ok(self.state.read().await.objects.get(&do_id).cloned())
    }
}
