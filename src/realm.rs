use std::sync::Arc;

use log::debug;
use tracing::instrument;

use crate::error::{AccessError, RealmResult};
use crate::object::{ObjectProxy, RealmObject};
use crate::query::RealmQuery;
use crate::results::RealmResults;
use crate::schema::{FieldDescriptor, FieldType, SchemaEntry, SchemaRegistry};
use crate::store::{Store, TableId, Version, WriteTransaction};
use crate::value::{Link, Value};

/// An open session: the storage engine plus the schema registry every proxy
/// and collection constructed through it is bound to. Cloning shares the
/// session; all clones observe the same data and the same single write
/// context.
#[derive(Debug, Clone)]
pub struct Realm {
    store: Arc<Store>,
    registry: Arc<SchemaRegistry>,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl Realm {
    /// Open a fresh in-memory session with its own registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(SchemaRegistry::new()))
    }

    /// Open a session sharing an existing registry, for processes that keep
    /// one canonical registry across several stores.
    pub fn with_registry(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            store: Arc::new(Store::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Register a model type and create its backing table. Idempotent, like
    /// the registry itself.
    #[instrument(target = "Realm", level = "debug", skip(self), fields(type_name = T::TYPE_NAME))]
    pub fn register<T: RealmObject>(&self) -> RealmResult<()> {
        let entry = self.registry.register(&T::object_schema())?;
        self.store.create_table(entry);
        debug!(target: "Realm", "registered {}", T::TYPE_NAME);
        Ok(())
    }

    /// Enter the write context. Blocks while another thread holds it; see
    /// [`Store::begin_write`] for the nesting rules.
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        self.store.begin_write()
    }

    /// Run a closure inside a write transaction.
    pub fn write<R>(&self, f: impl FnOnce() -> R) -> R {
        let _txn = self.store.begin_write();
        f()
    }

    pub fn is_in_write_transaction(&self) -> bool {
        self.store.is_in_write_transaction()
    }

    pub fn version(&self) -> Version {
        self.store.current_version()
    }

    fn table_for<T: RealmObject>(&self) -> RealmResult<(TableId, Arc<SchemaEntry>)> {
        let entry = self.registry.lookup(T::TYPE_NAME)?;
        let table = self.store.create_table(Arc::clone(&entry));
        Ok((table, entry))
    }

    /// Create a new object with default field values. Only legal inside a
    /// write transaction, and only for types without a primary key — those
    /// go through [`create_with_key`](Self::create_with_key).
    #[instrument(target = "Realm", level = "debug", skip(self), fields(type_name = T::TYPE_NAME))]
    pub fn create<T: RealmObject>(&self) -> RealmResult<T> {
        let (table, entry) = self.table_for::<T>()?;
        if let Some(pk) = entry.primary_key() {
            return Err(AccessError::ConstraintViolation {
                reason: format!(
                    "type {} declares primary key '{}'; use create_with_key",
                    T::TYPE_NAME,
                    pk.name
                ),
            }
            .into());
        }

        self.insert_defaults::<T>(table, &entry, None)
    }

    /// Create a new object with the given primary-key value and defaults for
    /// every other field.
    #[instrument(target = "Realm", level = "debug", skip(self, key), fields(type_name = T::TYPE_NAME))]
    pub fn create_with_key<T: RealmObject>(&self, key: impl Into<Value>) -> RealmResult<T> {
        let (table, entry) = self.table_for::<T>()?;
        let Some(pk) = entry.primary_key() else {
            return Err(AccessError::ConstraintViolation {
                reason: format!("type {} has no primary key", T::TYPE_NAME),
            }
            .into());
        };

        let key = key.into();
        if key.is_none() {
            if !pk.nullable {
                return Err(AccessError::NullNotAllowed {
                    field: pk.name.to_string(),
                }
                .into());
            }
        } else if !key.matches(&pk.field_type) {
            return Err(AccessError::TypeMismatch {
                field: pk.name.to_string(),
                expected: pk.field_type.name(),
                found: key.kind(),
            }
            .into());
        }

        self.insert_defaults::<T>(table, &entry, Some((pk.column_index, key)))
    }

    fn insert_defaults<T: RealmObject>(
        &self,
        table: TableId,
        entry: &Arc<SchemaEntry>,
        key_override: Option<(usize, Value)>,
    ) -> RealmResult<T> {
        let mut values: Vec<Value> = entry.fields().iter().map(default_value).collect();
        if let Some((column, value)) = key_override {
            values[column] = value;
        }

        let key = self.store.insert_row(table, values)?;
        let handle = self.store.open_row(table, key)?;
        Ok(T::from_proxy(ObjectProxy::new(handle, Arc::clone(entry))))
    }

    /// Start a query over every object of the type.
    pub fn query<T: RealmObject>(&self) -> RealmResult<RealmQuery<T>> {
        let (table, entry) = self.table_for::<T>()?;
        Ok(RealmQuery::new(Arc::clone(&self.store), entry, table))
    }

    /// The unfiltered live collection of all objects of the type, in
    /// insertion order.
    pub fn find_all<T: RealmObject>(&self) -> RealmResult<RealmResults<T>> {
        Ok(self.query::<T>()?.find_all())
    }

    /// Point lookup through a field's search index.
    pub fn find_first_by<T: RealmObject>(
        &self,
        field: &str,
        value: impl Into<Value>,
    ) -> RealmResult<Option<T>> {
        let (table, entry) = self.table_for::<T>()?;
        let descriptor = entry
            .field(field)
            .ok_or_else(|| AccessError::UnknownField {
                name: field.to_string(),
            })?;

        let keys = self
            .store
            .find_indexed(table, descriptor.column_index, &value.into())?;
        let Some(&key) = keys.first() else {
            return Ok(None);
        };

        let handle = self.store.open_row(table, key)?;
        Ok(Some(T::from_proxy(ObjectProxy::new(
            handle,
            Arc::clone(&entry),
        ))))
    }

    /// Materialize the object a link points at. Construction is the only
    /// work done here; field reads stay lazy, against the live row.
    pub fn resolve<T: RealmObject>(&self, link: &Link<T>) -> RealmResult<T> {
        let (table, entry) = self.table_for::<T>()?;
        let handle = self.store.open_row(table, link.key())?;
        Ok(T::from_proxy(ObjectProxy::new(handle, entry)))
    }

    /// Delete an object's row. Requires an active write transaction; every
    /// outstanding proxy for the row becomes invalid.
    #[instrument(target = "Realm", level = "debug", skip(self, object), fields(type_name = T::TYPE_NAME))]
    pub fn delete<T: RealmObject>(&self, object: &T) -> RealmResult<()> {
        object.proxy().handle().delete()?;
        Ok(())
    }
}

/// The value a freshly created object carries in each field before the first
/// explicit write.
fn default_value(descriptor: &FieldDescriptor) -> Value {
    if descriptor.nullable {
        return Value::None;
    }

    match descriptor.field_type {
        FieldType::Int => Value::Int(0),
        FieldType::Bool => Value::Bool(false),
        FieldType::Float => Value::Float(0.0),
        FieldType::Double => Value::Double(0.0),
        FieldType::String => Value::String(String::new()),
        FieldType::Binary => Value::Binary(Vec::new()),
        FieldType::Timestamp => Value::Timestamp(chrono::DateTime::UNIX_EPOCH),
        // object references are registered nullable; lists default to empty
        FieldType::Object(_) => Value::None,
        FieldType::List(_) => Value::LinkList(Vec::new()),
    }
}
