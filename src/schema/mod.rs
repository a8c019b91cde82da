//! Class and field descriptors.
//!
//! Schemas are loaded from YAML documents of the form:
//!
//! ```yaml
//! classes:
//!   - id: 1
//!     name: DistributedAvatar
//!     fields:
//!       - id: 0
//!         name: setName
//!         layout: { prefixed: 2 }
//!         flags: [required, broadcast, ram]
//!       - id: 1
//!         name: setXyz
//!         layout:
//!           composite:
//!             - layout: { fixed: 4 }
//!             - layout: { fixed: 4 }
//!         flags: [ram, broadcast]
//!       - id: 2
//!         name: setNameXyz
//!         layout: { molecular: [0, 1] }
//!         flags: [broadcast]
//! ```
//!
//! Fields are listed in declared order, inherited fields first. Wire encodings
//! of snapshots follow this order.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::codec::MAX_NESTING_DEPTH;
use crate::interfaces::SchemaCatalog;

/// Class identifier.
pub type ClassId = u16;
/// Field identifier, unique within a class.
pub type FieldId = u16;

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Errors raised while loading or validating schemas.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to read schema file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse schema: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Duplicate class id {0}")]
    DuplicateClass(ClassId),

    #[error("Duplicate field id {field} in class {class}")]
    DuplicateField { class: ClassId, field: FieldId },

    #[error("Field {field} in class {class} nests deeper than {MAX_NESTING_DEPTH} levels")]
    TooDeep { class: ClassId, field: FieldId },

    #[error("Molecular field {field} in class {class} references invalid component {component}")]
    InvalidMolecular {
        class: ClassId,
        field: FieldId,
        component: FieldId,
    },
}

/// Width of a length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum PrefixWidth {
    U16,
    U32,
}

impl PrefixWidth {
    /// Prefix size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

impl TryFrom<u8> for PrefixWidth {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::U16),
            4 => Ok(Self::U32),
            other => Err(format!("length prefix must be 2 or 4 bytes, got {other}")),
        }
    }
}

/// Byte layout of a field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "LayoutSpec")]
pub enum FieldLayout {
    /// Exactly N raw bytes.
    Fixed(usize),
    /// Length prefix followed by that many bytes.
    Prefixed(PrefixWidth),
    /// Subfields encoded back to back.
    Composite(Vec<FieldDef>),
    /// Alias over other fields of the same class. Never stored or decoded directly.
    Molecular(Vec<FieldId>),
}

/// Layout as written in schema files: a map with exactly one key.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutSpec {
    fixed: Option<usize>,
    prefixed: Option<PrefixWidth>,
    composite: Option<Vec<FieldDef>>,
    molecular: Option<Vec<FieldId>>,
}

impl TryFrom<LayoutSpec> for FieldLayout {
    type Error = String;

    fn try_from(spec: LayoutSpec) -> std::result::Result<Self, Self::Error> {
        match (spec.fixed, spec.prefixed, spec.composite, spec.molecular) {
            (Some(size), None, None, None) => Ok(Self::Fixed(size)),
            (None, Some(width), None, None) => Ok(Self::Prefixed(width)),
            (None, None, Some(fields), None) => Ok(Self::Composite(fields)),
            (None, None, None, Some(ids)) => Ok(Self::Molecular(ids)),
            _ => Err(
                "layout must have exactly one of: fixed, prefixed, composite, molecular"
                    .to_string(),
            ),
        }
    }
}

/// A single replication flag, as written in schema files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFlag {
    Required,
    Ram,
    Broadcast,
    Airecv,
}

/// Replication flags of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<FieldFlag>")]
pub struct FieldFlags {
    pub required: bool,
    pub ram: bool,
    pub broadcast: bool,
    pub airecv: bool,
}

impl From<Vec<FieldFlag>> for FieldFlags {
    fn from(flags: Vec<FieldFlag>) -> Self {
        flags.into_iter().fold(Self::default(), |mut acc, flag| {
            match flag {
                FieldFlag::Required => acc.required = true,
                FieldFlag::Ram => acc.ram = true,
                FieldFlag::Broadcast => acc.broadcast = true,
                FieldFlag::Airecv => acc.airecv = true,
            }
            acc
        })
    }
}

impl<const N: usize> From<[FieldFlag; N]> for FieldFlags {
    fn from(flags: [FieldFlag; N]) -> Self {
        Self::from(flags.to_vec())
    }
}

/// Descriptor of one field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldDef {
    /// Stable numeric id. Ignored for composite subfields.
    #[serde(default)]
    pub id: FieldId,
    #[serde(default)]
    pub name: String,
    pub layout: FieldLayout,
    #[serde(default)]
    pub flags: FieldFlags,
}

impl FieldDef {
    pub fn new(id: FieldId, name: impl Into<String>, layout: FieldLayout) -> Self {
        Self {
            id,
            name: name.into(),
            layout,
            flags: FieldFlags::default(),
        }
    }

    /// Anonymous subfield for composite layouts.
    pub fn sub(layout: FieldLayout) -> Self {
        Self::new(0, "", layout)
    }

    pub fn with_flags(mut self, flags: impl Into<FieldFlags>) -> Self {
        self.flags = flags.into();
        self
    }

    pub fn is_required(&self) -> bool {
        self.flags.required
    }

    pub fn is_ram(&self) -> bool {
        self.flags.ram
    }

    pub fn is_broadcast(&self) -> bool {
        self.flags.broadcast
    }

    pub fn is_airecv(&self) -> bool {
        self.flags.airecv
    }

    pub fn is_molecular(&self) -> bool {
        matches!(self.layout, FieldLayout::Molecular(_))
    }

    /// Byte size when the layout is fixed.
    pub fn fixed_size(&self) -> Option<usize> {
        match self.layout {
            FieldLayout::Fixed(size) => Some(size),
            _ => None,
        }
    }

    /// Length-prefix width when the layout is prefixed.
    pub fn length_bytes(&self) -> Option<usize> {
        match self.layout {
            FieldLayout::Prefixed(width) => Some(width.bytes()),
            _ => None,
        }
    }

    /// Nested subfields of a composite layout; empty otherwise.
    pub fn nested(&self) -> &[FieldDef] {
        match &self.layout {
            FieldLayout::Composite(fields) => fields,
            _ => &[],
        }
    }

    /// Component ids of a molecular layout; empty otherwise.
    pub fn components(&self) -> &[FieldId] {
        match &self.layout {
            FieldLayout::Molecular(ids) => ids,
            _ => &[],
        }
    }

    fn depth(&self) -> usize {
        1 + self.nested().iter().map(FieldDef::depth).max().unwrap_or(0)
    }
}

/// Descriptor of a class: its id and fields in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassDef {
    pub id: ClassId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl ClassDef {
    pub fn new(id: ClassId, name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            id,
            name: name.into(),
            fields,
        }
    }

    /// Look up a field by id.
    pub fn field(&self, id: FieldId) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Fields in declared order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }

    /// Required, non-molecular fields in declared order.
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| f.is_required() && !f.is_molecular())
    }

    /// Ram, non-required, non-molecular fields in declared order.
    pub fn other_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| f.is_ram() && !f.is_required() && !f.is_molecular())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.id) {
                return Err(SchemaError::DuplicateField {
                    class: self.id,
                    field: field.id,
                });
            }
            if field.depth() > MAX_NESTING_DEPTH {
                return Err(SchemaError::TooDeep {
                    class: self.id,
                    field: field.id,
                });
            }
        }
        for field in self.fields.iter().filter(|f| f.is_molecular()) {
            for &component in field.components() {
                let valid = self
                    .field(component)
                    .map(|c| !c.is_molecular())
                    .unwrap_or(false);
                if !valid {
                    return Err(SchemaError::InvalidMolecular {
                        class: self.id,
                        field: field.id,
                        component,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    classes: Vec<ClassDef>,
}

/// Read-only catalog built once at startup.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    classes: HashMap<ClassId, Arc<ClassDef>>,
}

impl StaticCatalog {
    /// Build a catalog from class definitions, validating each.
    pub fn from_classes(classes: impl IntoIterator<Item = ClassDef>) -> Result<Self> {
        let mut catalog = Self::default();
        catalog.extend(classes)?;
        Ok(catalog)
    }

    /// Parse a YAML schema document.
    pub fn from_yaml(source: &str) -> Result<Self> {
        let doc: SchemaDocument = serde_yaml::from_str(source)?;
        Self::from_classes(doc.classes)
    }

    /// Load and merge several YAML schema files.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut catalog = Self::default();
        for path in paths {
            let path = path.as_ref();
            let source = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let doc: SchemaDocument = serde_yaml::from_str(&source)?;
            catalog.extend(doc.classes)?;
            info!(path = %path.display(), "Loaded schema file");
        }
        info!(classes = catalog.len(), "Schema catalog ready");
        Ok(catalog)
    }

    fn extend(&mut self, classes: impl IntoIterator<Item = ClassDef>) -> Result<()> {
        for class in classes {
            class.validate()?;
            if self.classes.contains_key(&class.id) {
                return Err(SchemaError::DuplicateClass(class.id));
            }
            self.classes.insert(class.id, Arc::new(class));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl SchemaCatalog for StaticCatalog {
    fn class_by_id(&self, id: ClassId) -> Option<Arc<ClassDef>> {
        self.classes.get(&id).cloned()
    }
}
