//! Schema catalog interface.

use std::sync::Arc;

use crate::schema::{ClassDef, ClassId, FieldDef, FieldId};

/// Read-only registry of class descriptors.
///
/// Consulted by the field codec callers and by every distributed object.
/// Implementations:
/// - `StaticCatalog`: YAML-loaded, immutable after startup
pub trait SchemaCatalog: Send + Sync {
    /// Look up a class by id.
    fn class_by_id(&self, id: ClassId) -> Option<Arc<ClassDef>>;

    /// Look up one field of a class.
    fn field_by_index(&self, class: ClassId, field: FieldId) -> Option<FieldDef> {
        self.class_by_id(class)?.field(field).cloned()
    }
}
