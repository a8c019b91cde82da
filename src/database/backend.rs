//! Range-checked database front over an [`ObjectStore`].

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::{DatabaseError, Result};
use crate::channel::DoId;
use crate::config::IdRange;
use crate::interfaces::{ObjectData, ObjectStore, SchemaCatalog};
use crate::schema::{ClassDef, ClassId, FieldId};

/// A request against the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbOperation {
    Create {
        class_id: ClassId,
        fields: BTreeMap<FieldId, Bytes>,
    },
    Delete {
        do_id: DoId,
    },
    Get {
        do_id: DoId,
    },
}

/// Stored object resolved against its class descriptor.
#[derive(Debug, Clone)]
pub struct ObjectSnapshot {
    pub class: Arc<ClassDef>,
    pub fields: BTreeMap<FieldId, Bytes>,
}

#[derive(Debug, Clone)]
pub enum DbResponse {
    Created(DoId),
    Deleted(DoId),
    Found(ObjectSnapshot),
}

/// Database backend: allocates ids inside a configured range and resolves
/// stored classes through the catalog.
pub struct DatabaseBackend {
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn SchemaCatalog>,
    range: IdRange,
}

impl DatabaseBackend {
    pub fn new(store: Arc<dyn ObjectStore>, catalog: Arc<dyn SchemaCatalog>, range: IdRange) -> Self {
        Self {
            store,
            catalog,
            range,
        }
    }

    pub fn range(&self) -> IdRange {
        self.range
    }

    /// Run one operation to completion.
    pub async fn submit(&self, operation: DbOperation) -> Result<DbResponse> {
        match operation {
            DbOperation::Create { class_id, fields } => self.create(class_id, fields).await,
            DbOperation::Delete { do_id } => {
                self.store.delete_object(do_id).await?;
                debug!(do_id, "Object removed from database");
                Ok(DbResponse::Deleted(do_id))
            }
            DbOperation::Get { do_id } => self.get(do_id).await,
        }
    }

    async fn create(&self, class_id: ClassId, fields: BTreeMap<FieldId, Bytes>) -> Result<DbResponse> {
        if self.catalog.class_by_id(class_id).is_none() {
            return Err(DatabaseError::UnknownClass(class_id));
        }

        let do_id = self
            .store
            .create_object(ObjectData { class_id, fields })
            .await?;

        if do_id == 0 || !self.range.contains(do_id) {
            if let Err(e) = self.store.delete_object(do_id).await {
                warn!(do_id, error = %e, "Failed to roll back out-of-range object");
            }
            return Err(DatabaseError::OutOfRange {
                do_id,
                min: self.range.min,
                max: self.range.max,
            });
        }

        debug!(do_id, class_id, "Object created in database");
        Ok(DbResponse::Created(do_id))
    }

    async fn get(&self, do_id: DoId) -> Result<DbResponse> {
        let data = self
            .store
            .get_object(do_id)
            .await?
            .ok_or(DatabaseError::UnknownObject(do_id))?;
        let class = self
            .catalog
            .class_by_id(data.class_id)
            .ok_or(DatabaseError::UnknownClass(data.class_id))?;
        Ok(DbResponse::Found(ObjectSnapshot {
            class,
            fields: data.fields,
        }))
    }
}
