use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;
use tracing::instrument;

use crate::error::{RegistryError, RegistryResult};
use crate::value::FieldValue;

/// Semantic type of a stored field. Should match `crate::value::Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Bool,
    Float,
    Double,
    String,
    Binary,
    Timestamp,
    /// Reference to a single row of the named model type.
    Object(&'static str),
    /// Reference to an ordered list of rows of the named model type.
    List(&'static str),
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int => "Int",
            FieldType::Bool => "Bool",
            FieldType::Float => "Float",
            FieldType::Double => "Double",
            FieldType::String => "String",
            FieldType::Binary => "Binary",
            FieldType::Timestamp => "Timestamp",
            FieldType::Object(_) => "Object",
            FieldType::List(_) => "List",
        }
    }

    /// Whether a search index can be built over the type.
    pub(crate) fn is_indexable(&self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::Bool | FieldType::String | FieldType::Timestamp
        )
    }
}

/// Declarative description of a single field, the input to registration.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: &'static str,
    field_type: FieldType,
    nullable: bool,
    indexed: bool,
    primary_key: bool,
}

impl FieldSpec {
    /// Describe a field stored as the Rust type `V`. `Option<..>` marks the
    /// field nullable; object references are always nullable, matching the
    /// reference semantics of the storage model.
    pub fn of<V: FieldValue>(name: &'static str) -> Self {
        let field_type = V::field_type();
        Self {
            name,
            field_type,
            nullable: V::NULLABLE || matches!(field_type, FieldType::Object(_)),
            indexed: false,
            primary_key: false,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Mark the field as the primary key. Primary keys are implicitly
    /// indexed.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.indexed = true;
        self
    }
}

/// Declarative description of a model type: the name plus its ordered field
/// list. Produced by the `realm_object!` expansion, consumed by
/// [`SchemaRegistry::register`].
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    type_name: &'static str,
    fields: Vec<FieldSpec>,
}

impl SchemaDescriptor {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// A registered field: the spec plus its assigned column index. Column
/// indices follow declaration order and are stable for the lifetime of the
/// store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub column_index: usize,
    pub field_type: FieldType,
    pub nullable: bool,
    pub indexed: bool,
    pub primary_key: bool,
}

/// The registered, immutable layout of one model type. Shared as
/// `Arc<SchemaEntry>` by every proxy and collection of that type.
#[derive(Debug)]
pub struct SchemaEntry {
    type_name: &'static str,
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<&'static str, usize>,
    primary_key: Option<usize>,
}

impl SchemaEntry {
    fn from_descriptor(descriptor: &SchemaDescriptor) -> RegistryResult<Self> {
        let invalid = |reason: String| RegistryError::InvalidSchema {
            name: descriptor.type_name.to_string(),
            reason,
        };

        let mut fields = Vec::with_capacity(descriptor.fields.len());
        let mut by_name = HashMap::with_capacity(descriptor.fields.len());
        let mut primary_key = None;

        for (column_index, spec) in descriptor.fields.iter().enumerate() {
            if by_name.insert(spec.name, column_index).is_some() {
                return Err(invalid(format!("duplicate field '{}'", spec.name)));
            }
            if spec.indexed && !spec.field_type.is_indexable() {
                return Err(invalid(format!(
                    "field '{}' of type {} cannot be indexed",
                    spec.name,
                    spec.field_type.name()
                )));
            }
            if spec.primary_key {
                if primary_key.is_some() {
                    return Err(invalid("more than one primary key".to_string()));
                }
                primary_key = Some(column_index);
            }

            fields.push(FieldDescriptor {
                name: spec.name,
                column_index,
                field_type: spec.field_type,
                nullable: spec.nullable,
                indexed: spec.indexed,
                primary_key: spec.primary_key,
            });
        }

        Ok(Self {
            type_name: descriptor.type_name,
            fields,
            by_name,
            primary_key,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&index| &self.fields[index])
    }

    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.primary_key.map(|index| &self.fields[index])
    }

    /// Describe the first mismatch against another layout, if any. Used to
    /// build the `SchemaConflict` reason.
    fn mismatch(&self, other: &SchemaEntry) -> Option<String> {
        if self.fields.len() != other.fields.len() {
            return Some(format!(
                "field count changed from {} to {}",
                self.fields.len(),
                other.fields.len()
            ));
        }

        self.fields
            .iter()
            .zip(&other.fields)
            .find(|(a, b)| a != b)
            .map(|(a, b)| format!("field '{}' redeclared as '{}' ({:?})", a.name, b.name, b))
    }
}

/// Process-wide mapping from type name to registered layout. Registration is
/// serialized behind the write lock; lookups run concurrently.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: RwLock<HashMap<String, Arc<SchemaEntry>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model type. Idempotent: an identical re-registration
    /// returns the existing entry; an incompatible one fails with
    /// `SchemaConflict`.
    #[instrument(target = "SchemaRegistry", level = "debug", skip(self))]
    pub fn register(&self, descriptor: &SchemaDescriptor) -> RegistryResult<Arc<SchemaEntry>> {
        let candidate = SchemaEntry::from_descriptor(descriptor)?;

        let mut entries = self.entries.write().expect("schema registry poisoned");
        if let Some(existing) = entries.get(descriptor.type_name) {
            return match existing.mismatch(&candidate) {
                None => Ok(Arc::clone(existing)),
                Some(reason) => Err(RegistryError::SchemaConflict {
                    name: descriptor.type_name.to_string(),
                    reason,
                }),
            };
        }

        debug!(target: "SchemaRegistry", "registered type {}", descriptor.type_name);

        let entry = Arc::new(candidate);
        entries.insert(descriptor.type_name.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    pub fn lookup(&self, type_name: &str) -> RegistryResult<Arc<SchemaEntry>> {
        self.entries
            .read()
            .expect("schema registry poisoned")
            .get(type_name)
            .map(Arc::clone)
            .ok_or_else(|| RegistryError::UnknownType {
                name: type_name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;

    fn person() -> SchemaDescriptor {
        SchemaDescriptor::new("Person")
            .field(FieldSpec::of::<String>("name").indexed())
            .field(FieldSpec::of::<i64>("age"))
            .field(FieldSpec::of::<Option<String>>("email"))
    }

    #[test]
    fn register_is_idempotent() {
        let registry = SchemaRegistry::new();

        let first = registry.register(&person()).unwrap();
        let second = registry.register(&person()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let looked_up = registry.lookup("Person").unwrap();
        assert!(Arc::ptr_eq(&first, &looked_up));
    }

    #[test]
    fn conflicting_registration_fails() {
        let registry = SchemaRegistry::new();
        registry.register(&person()).unwrap();

        let conflicting = SchemaDescriptor::new("Person")
            .field(FieldSpec::of::<String>("name").indexed())
            .field(FieldSpec::of::<String>("age"))
            .field(FieldSpec::of::<Option<String>>("email"));

        let err = registry.register(&conflicting).unwrap_err();
        assert!(matches!(err, RegistryError::SchemaConflict { .. }));
    }

    #[test]
    fn lookup_of_unregistered_type_fails() {
        let registry = SchemaRegistry::new();
        let err = registry.lookup("Ghost").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType { name } if name == "Ghost"));
    }

    #[test]
    fn malformed_schemas_are_rejected() {
        let registry = SchemaRegistry::new();

        let duplicate = SchemaDescriptor::new("Dup")
            .field(FieldSpec::of::<i64>("a"))
            .field(FieldSpec::of::<i64>("a"));
        assert!(matches!(
            registry.register(&duplicate),
            Err(RegistryError::InvalidSchema { .. })
        ));

        let two_keys = SchemaDescriptor::new("TwoKeys")
            .field(FieldSpec::of::<String>("a").primary_key())
            .field(FieldSpec::of::<String>("b").primary_key());
        assert!(matches!(
            registry.register(&two_keys),
            Err(RegistryError::InvalidSchema { .. })
        ));

        let bad_index = SchemaDescriptor::new("BadIndex")
            .field(FieldSpec::of::<Vec<u8>>("blob").indexed());
        assert!(matches!(
            registry.register(&bad_index),
            Err(RegistryError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn column_indices_follow_declaration_order() {
        let registry = SchemaRegistry::new();
        let entry = registry.register(&person()).unwrap();

        assert_eq!(entry.field("name").unwrap().column_index, 0);
        assert_eq!(entry.field("age").unwrap().column_index, 1);
        assert_eq!(entry.field("email").unwrap().column_index, 2);
        assert!(entry.field("email").unwrap().nullable);
        assert!(entry.field("missing").is_none());
        assert!(entry.primary_key().is_none());
    }
}
