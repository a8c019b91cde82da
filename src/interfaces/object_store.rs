//! Object persistence interface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::channel::DoId;
use crate::schema::{ClassId, FieldId};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object id space exhausted")]
    Exhausted,

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Persisted snapshot of one object: its class and encoded field values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectData {
    pub class_id: ClassId,
    pub fields: BTreeMap<FieldId, Bytes>,
}

impl ObjectData {
    pub fn new(class_id: ClassId) -> Self {
        Self {
            class_id,
            fields: BTreeMap::new(),
        }
    }
}

/// Interface for object snapshot persistence.
///
/// Implementations:
/// - `MemoryObjectStore`: in-process map, ids allocated sequentially
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist a new object and return its allocated id.
    async fn create_object(&self, data: ObjectData) -> Result<DoId>;

    /// Remove an object. Deleting an unknown id is not an error.
    async fn delete_object(&self, do_id: DoId) -> Result<()>;

    /// Fetch an object snapshot.
    ///
    /// Returns `None` if no object exists with this id.
    async fn get_object(&self, do_id: DoId) -> Result<Option<ObjectData>>;
}
