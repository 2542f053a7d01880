use std::fmt::Debug;
use std::sync::Arc;

use crate::accessor;
use crate::error::{AccessError, AccessResult};
use crate::schema::{FieldDescriptor, SchemaDescriptor, SchemaEntry};
use crate::store::{RowHandle, RowKey};
use crate::value::{FieldValue, Value};

/// Contract fulfilled by every type the `realm_object!` expansion emits: a
/// name, a declarative schema, and conversion to and from the proxy it wraps.
/// The collection engine and the session construct instances exclusively
/// through [`from_proxy`](Self::from_proxy); user code never binds a proxy to
/// an arbitrary handle itself.
pub trait RealmObject: Sized {
    const TYPE_NAME: &'static str;

    /// The declarative field layout, consumed by schema registration.
    fn object_schema() -> SchemaDescriptor;

    fn from_proxy(proxy: ObjectProxy) -> Self;

    fn proxy(&self) -> &ObjectProxy;
}

/// A live stand-in for one model instance: a storage handle bound to the
/// registered schema entry of its type. All state lives in the store; the
/// proxy is a view. Two proxies are equal when they reference the same row of
/// the same table, regardless of how either was obtained.
#[derive(Clone)]
pub struct ObjectProxy {
    handle: RowHandle,
    entry: Arc<SchemaEntry>,
}

impl Debug for ObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("type", &self.entry.type_name())
            .field("handle", &self.handle)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl ObjectProxy {
    pub(crate) fn new(handle: RowHandle, entry: Arc<SchemaEntry>) -> Self {
        Self { handle, entry }
    }

    pub fn type_name(&self) -> &'static str {
        self.entry.type_name()
    }

    pub fn entry(&self) -> &Arc<SchemaEntry> {
        &self.entry
    }

    pub(crate) fn handle(&self) -> &RowHandle {
        &self.handle
    }

    pub fn row_key(&self) -> RowKey {
        self.handle.key()
    }

    /// Whether the underlying row still exists. Reports without failing.
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    fn descriptor(&self, field: &str) -> AccessResult<&FieldDescriptor> {
        self.entry
            .field(field)
            .ok_or_else(|| AccessError::UnknownField {
                name: field.to_string(),
            })
    }

    /// Read a field by name as a raw storage value.
    pub fn get(&self, field: &str) -> AccessResult<Value> {
        accessor::get(&self.handle, self.descriptor(field)?)
    }

    /// Read a field by name, converted to the requested Rust type.
    pub fn get_typed<V: FieldValue>(&self, field: &str) -> AccessResult<V> {
        V::from_value(self.get(field)?, field)
    }

    /// Write a field by name. Requires an active write transaction.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> AccessResult<()> {
        accessor::set(&self.handle, self.descriptor(field)?, value.into())
    }

    /// Write a field by name from a typed value.
    pub fn set_typed<V: FieldValue>(&self, field: &str, value: V) -> AccessResult<()> {
        accessor::set(&self.handle, self.descriptor(field)?, value.into_value())
    }

    /// Produce a disconnected snapshot of all current field values: the only
    /// sanctioned escape from liveness, for crossing outside the storage
    /// session. Fails with `InvalidatedHandle` once the row is gone.
    pub fn detach(&self) -> AccessResult<DetachedObject> {
        let mut values = Vec::with_capacity(self.entry.field_count());
        for descriptor in self.entry.fields() {
            values.push((descriptor.name, accessor::get(&self.handle, descriptor)?));
        }

        Ok(DetachedObject {
            type_name: self.entry.type_name(),
            values,
        })
    }
}

impl PartialEq for ObjectProxy {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for ObjectProxy {}

impl std::hash::Hash for ObjectProxy {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

/// A plain, disconnected value snapshot of one object: no storage handle, no
/// liveness. Field order follows the schema entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedObject {
    type_name: &'static str,
    values: Vec<(&'static str, Value)>,
}

impl DetachedObject {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }
}
