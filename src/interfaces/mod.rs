//! Abstract interfaces for external collaborators.
//!
//! These traits define the contracts for:
//! - Schema lookup (class and field descriptors)
//! - Object persistence (create/read/delete of object snapshots)

pub mod object_store;
pub mod schema_catalog;

pub use object_store::{ObjectData, ObjectStore, StorageError};
pub use schema_catalog::SchemaCatalog;
