//! Database role.
//!
//! This module contains:
//! - `MemoryObjectStore`: in-process snapshot store with sequential ids
//! - `DatabaseBackend`: id-range enforcement and class resolution
//! - `DatabaseServer`: bus participant answering create/get/delete requests

mod backend;
mod memory;
mod server;

pub use backend::{DatabaseBackend, DbOperation, DbResponse, ObjectSnapshot};
pub use memory::MemoryObjectStore;
pub use server::DatabaseServer;

use crate::channel::DoId;
use crate::codec::CodecError;
use crate::datagram::DatagramError;
use crate::interfaces::StorageError;
use crate::schema::{ClassId, FieldId};

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Errors raised by the database backend and by malformed requests.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Unknown class {0}")]
    UnknownClass(ClassId),

    #[error("Class {class_id} has no field {field}")]
    UnknownField { class_id: ClassId, field: FieldId },

    #[error("Unknown object {0}")]
    UnknownObject(DoId),

    #[error("Allocated id {do_id} outside {min}..={max}")]
    OutOfRange { do_id: DoId, min: DoId, max: DoId },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Malformed request: {0}")]
    Datagram(#[from] DatagramError),

    #[error("Malformed field value: {0}")]
    Codec(#[from] CodecError),
}
