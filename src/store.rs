use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, ThreadId};

use log::debug;
use tracing::instrument;

use crate::error::{AccessError, AccessResult};
use crate::query::Query;
use crate::schema::SchemaEntry;
use crate::value::Value;

/// Identifies one table for the lifetime of an open store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub(crate) usize);

/// Stable identity of one row. Keys are handed out monotonically and never
/// reused, so a missing key below the high-water mark means the row was
/// deleted, not that it never existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(pub(crate) u64);

/// Engine version token. Changes whenever stored state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version(u64);

/// Hashable projection of an indexable value, used as the key of a search
/// index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IndexKey {
    Int(i64),
    Bool(bool),
    Str(String),
    Time(i64),
}

impl IndexKey {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(IndexKey::Int(*v)),
            Value::Bool(v) => Some(IndexKey::Bool(*v)),
            Value::String(v) => Some(IndexKey::Str(v.clone())),
            Value::Timestamp(v) => Some(IndexKey::Time(v.timestamp_micros())),
            _ => None,
        }
    }
}

struct TableData {
    entry: Arc<SchemaEntry>,
    rows: BTreeMap<RowKey, Vec<Value>>,
    next_key: u64,
    /// Search index per indexed column: value projection to row keys, in key
    /// order.
    indexes: HashMap<usize, HashMap<IndexKey, Vec<RowKey>>>,
}

impl Debug for TableData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableData")
            .field("type", &self.entry.type_name())
            .field("rows", &self.rows.len())
            .finish()
    }
}

impl TableData {
    fn new(entry: Arc<SchemaEntry>) -> Self {
        let indexes = entry
            .fields()
            .iter()
            .filter(|field| field.indexed)
            .map(|field| (field.column_index, HashMap::new()))
            .collect();

        Self {
            entry,
            rows: BTreeMap::new(),
            next_key: 0,
            indexes,
        }
    }

    fn index_insert(&mut self, column: usize, value: &Value, key: RowKey) {
        if let Some(index) = self.indexes.get_mut(&column)
            && let Some(index_key) = IndexKey::of(value)
        {
            index.entry(index_key).or_default().push(key);
        }
    }

    fn index_remove(&mut self, column: usize, value: &Value, key: RowKey) {
        if let Some(index) = self.indexes.get_mut(&column)
            && let Some(index_key) = IndexKey::of(value)
            && let Some(keys) = index.get_mut(&index_key)
        {
            keys.retain(|&k| k != key);
            if keys.is_empty() {
                index.remove(&index_key);
            }
        }
    }

    /// Whether another row already holds `value` in the primary-key column.
    fn violates_primary_key(&self, column: usize, value: &Value) -> bool {
        let Some(index) = self.indexes.get(&column) else {
            return false;
        };
        let Some(index_key) = IndexKey::of(value) else {
            return false;
        };

        index.get(&index_key).is_some_and(|keys| !keys.is_empty())
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    tables: Vec<TableData>,
    by_name: HashMap<String, usize>,
}

/// The storage engine behind all handles: tables of rows addressed by stable
/// keys, a monotonic version counter, and a single-writer gate. All field and
/// collection access in the layers above funnels into this narrow surface.
#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<StoreInner>,
    version: AtomicU64,
    write_gate: Mutex<()>,
    active_writer: RwLock<Option<ThreadId>>,
}

/// RAII write context. Holding one makes mutation legal on every thread-safe
/// handle into the same store; dropping it ends the transaction. Only one can
/// exist at a time.
pub struct WriteTransaction<'a> {
    store: &'a Store,
    _gate: MutexGuard<'a, ()>,
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        *self
            .store
            .active_writer
            .write()
            .expect("writer flag poisoned") = None;
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or find) the table backing a registered schema entry. Not a
    /// transactional operation; tables come into existence at registration
    /// time and live as long as the store.
    pub(crate) fn create_table(&self, entry: Arc<SchemaEntry>) -> TableId {
        let mut inner = self.inner.write().expect("store poisoned");
        if let Some(&index) = inner.by_name.get(entry.type_name()) {
            return TableId(index);
        }

        let index = inner.tables.len();
        inner.by_name.insert(entry.type_name().to_string(), index);
        inner.tables.push(TableData::new(entry));

        debug!(target: "Store", "created table {index}");
        TableId(index)
    }

    pub fn current_version(&self) -> Version {
        Version(self.version.load(Ordering::SeqCst))
    }

    /// Whether a write transaction is currently active (on any thread).
    pub fn is_in_write_transaction(&self) -> bool {
        self.active_writer
            .read()
            .expect("writer flag poisoned")
            .is_some()
    }

    /// Enter the single write context. Blocks while another thread holds it.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread already holds a write transaction;
    /// nesting write contexts is a programming error.
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        let current = thread::current().id();
        if *self.active_writer.read().expect("writer flag poisoned") == Some(current) {
            panic!("write transaction already active on this thread");
        }

        let gate = self.write_gate.lock().expect("write gate poisoned");
        *self.active_writer.write().expect("writer flag poisoned") = Some(current);

        WriteTransaction {
            store: self,
            _gate: gate,
        }
    }

    fn require_write(&self) -> AccessResult<()> {
        if self.is_in_write_transaction() {
            Ok(())
        } else {
            Err(AccessError::ReadOnlyContext)
        }
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Resolve a row key into a handle. A key at or above the table's
    /// high-water mark was never issued (`NotFound`); one below it whose row
    /// is gone has expired (`InvalidatedHandle`).
    pub fn open_row(self: &Arc<Self>, table: TableId, key: RowKey) -> AccessResult<RowHandle> {
        let inner = self.inner.read().expect("store poisoned");
        let data = &inner.tables[table.0];

        if data.rows.contains_key(&key) {
            Ok(RowHandle {
                store: Arc::clone(self),
                table,
                key,
            })
        } else if key.0 >= data.next_key {
            Err(AccessError::NotFound { key: key.0 })
        } else {
            Err(AccessError::InvalidatedHandle)
        }
    }

    pub fn row_exists(&self, table: TableId, key: RowKey) -> bool {
        self.inner.read().expect("store poisoned").tables[table.0]
            .rows
            .contains_key(&key)
    }

    pub fn get_field(&self, table: TableId, key: RowKey, column: usize) -> AccessResult<Value> {
        let inner = self.inner.read().expect("store poisoned");
        let data = &inner.tables[table.0];

        match data.rows.get(&key) {
            Some(values) => Ok(values[column].clone()),
            None if key.0 >= data.next_key => Err(AccessError::NotFound { key: key.0 }),
            None => Err(AccessError::InvalidatedHandle),
        }
    }

    #[instrument(target = "Store", level = "debug", skip(self))]
    pub fn set_field(
        &self,
        table: TableId,
        key: RowKey,
        column: usize,
        value: Value,
    ) -> AccessResult<()> {
        self.require_write()?;

        let mut inner = self.inner.write().expect("store poisoned");
        let data = &mut inner.tables[table.0];

        let old = match data.rows.get(&key) {
            Some(values) => values[column].clone(),
            None if key.0 >= data.next_key => return Err(AccessError::NotFound { key: key.0 }),
            None => return Err(AccessError::InvalidatedHandle),
        };

        data.index_remove(column, &old, key);
        data.index_insert(column, &value, key);
        data.rows.get_mut(&key).expect("row checked above")[column] = value;

        self.bump_version();
        Ok(())
    }

    /// Insert a complete row. `values` must match the table's column layout;
    /// the accessor layer and the session are the only callers and both build
    /// the row from the schema entry.
    #[instrument(target = "Store", level = "debug", skip(self, values))]
    pub fn insert_row(&self, table: TableId, values: Vec<Value>) -> AccessResult<RowKey> {
        self.require_write()?;

        let mut inner = self.inner.write().expect("store poisoned");
        let data = &mut inner.tables[table.0];
        assert_eq!(
            values.len(),
            data.entry.field_count(),
            "row arity must match the table layout"
        );

        if let Some(pk) = data.entry.primary_key()
            && data.violates_primary_key(pk.column_index, &values[pk.column_index])
        {
            return Err(AccessError::ConstraintViolation {
                reason: format!(
                    "duplicate primary key {:?} for type {}",
                    values[pk.column_index],
                    data.entry.type_name()
                ),
            });
        }

        let key = RowKey(data.next_key);
        data.next_key += 1;
        for (column, value) in values.iter().enumerate() {
            data.index_insert(column, value, key);
        }
        data.rows.insert(key, values);

        self.bump_version();
        Ok(key)
    }

    #[instrument(target = "Store", level = "debug", skip(self))]
    pub fn delete_row(&self, table: TableId, key: RowKey) -> AccessResult<()> {
        self.require_write()?;

        let mut inner = self.inner.write().expect("store poisoned");
        let data = &mut inner.tables[table.0];

        let Some(values) = data.rows.remove(&key) else {
            return if key.0 >= data.next_key {
                Err(AccessError::NotFound { key: key.0 })
            } else {
                Err(AccessError::InvalidatedHandle)
            };
        };

        for (column, value) in values.iter().enumerate() {
            data.index_remove(column, value, key);
        }

        self.bump_version();
        Ok(())
    }

    /// Look up rows by value through a column's search index.
    pub fn find_indexed(
        &self,
        table: TableId,
        column: usize,
        value: &Value,
    ) -> AccessResult<Vec<RowKey>> {
        let inner = self.inner.read().expect("store poisoned");
        let data = &inner.tables[table.0];

        let Some(index) = data.indexes.get(&column) else {
            return Err(AccessError::ConstraintViolation {
                reason: format!("column {column} is not indexed"),
            });
        };

        Ok(IndexKey::of(value)
            .and_then(|index_key| index.get(&index_key).cloned())
            .unwrap_or_default())
    }

    /// Run a query and return the ordered row keys together with the version
    /// they were derived at. Both come from the same critical section, so a
    /// caller holding the pair knows exactly which state it reflects.
    #[instrument(target = "Store", level = "debug", skip(self, query), fields(table = query.table().0))]
    pub fn evaluate(&self, query: &Query) -> (Version, Vec<RowKey>) {
        let inner = self.inner.read().expect("store poisoned");
        let data = &inner.tables[query.table().0];

        let mut keys: Vec<RowKey> = data
            .rows
            .iter()
            .filter(|(_, values)| query.matches(values))
            .map(|(&key, _)| key)
            .collect();

        if let Some(sort) = query.sort() {
            keys.sort_by(|a, b| {
                let ordering = data.rows[a][sort.column].compare(&data.rows[b][sort.column]);
                if sort.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        (Version(self.version.load(Ordering::SeqCst)), keys)
    }
}

/// Opaque reference to one row in one table: the storage handle all field
/// I/O goes through. Cheap to clone; owns nothing but the store reference.
#[derive(Clone)]
pub struct RowHandle {
    store: Arc<Store>,
    table: TableId,
    key: RowKey,
}

impl Debug for RowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowHandle")
            .field("table", &self.table.0)
            .field("key", &self.key.0)
            .finish()
    }
}

impl RowHandle {
    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn key(&self) -> RowKey {
        self.key
    }

    pub(crate) fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Whether the row still exists. Never fails; expired handles simply
    /// report `false`.
    pub fn is_valid(&self) -> bool {
        self.store.row_exists(self.table, self.key)
    }

    pub fn get(&self, column: usize) -> AccessResult<Value> {
        self.store.get_field(self.table, self.key, column)
    }

    pub fn set(&self, column: usize, value: Value) -> AccessResult<()> {
        self.store.set_field(self.table, self.key, column, value)
    }

    pub fn delete(&self) -> AccessResult<()> {
        self.store.delete_row(self.table, self.key)
    }
}

/// Handles are equal when they reference the same row of the same table in
/// the same store.
impl PartialEq for RowHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store, &other.store) && self.table == other.table && self.key == other.key
    }
}

impl Eq for RowHandle {}

impl std::hash::Hash for RowHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.key.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, SchemaDescriptor, SchemaRegistry};

    fn store_with_table() -> (Arc<Store>, TableId) {
        let registry = SchemaRegistry::new();
        let entry = registry
            .register(
                &SchemaDescriptor::new("Item")
                    .field(FieldSpec::of::<String>("name").indexed())
                    .field(FieldSpec::of::<i64>("count")),
            )
            .unwrap();

        let store = Arc::new(Store::new());
        let table = store.create_table(entry);
        (store, table)
    }

    fn insert(store: &Store, table: TableId, name: &str, count: i64) -> RowKey {
        store
            .insert_row(table, vec![Value::String(name.to_string()), Value::Int(count)])
            .unwrap()
    }

    #[test]
    fn mutation_requires_write_transaction() {
        let (store, table) = store_with_table();

        let err = store
            .insert_row(table, vec![Value::String("a".into()), Value::Int(1)])
            .unwrap_err();
        assert!(matches!(err, AccessError::ReadOnlyContext));

        let key = {
            let _txn = store.begin_write();
            insert(&store, table, "a", 1)
        };

        let err = store.set_field(table, key, 1, Value::Int(2)).unwrap_err();
        assert!(matches!(err, AccessError::ReadOnlyContext));
        let err = store.delete_row(table, key).unwrap_err();
        assert!(matches!(err, AccessError::ReadOnlyContext));
    }

    #[test]
    fn version_changes_on_mutation_only() {
        let (store, table) = store_with_table();

        let v0 = store.current_version();
        let key = {
            let _txn = store.begin_write();
            insert(&store, table, "a", 1)
        };
        let v1 = store.current_version();
        assert_ne!(v0, v1);

        let _ = store.get_field(table, key, 0).unwrap();
        assert!(store.row_exists(table, key));
        assert_eq!(store.current_version(), v1);
    }

    #[test]
    fn expired_and_never_issued_keys_are_distinct() {
        let (store, table) = store_with_table();

        let key = {
            let _txn = store.begin_write();
            let key = insert(&store, table, "a", 1);
            store.delete_row(table, key).unwrap();
            key
        };

        assert!(matches!(
            store.open_row(table, key),
            Err(AccessError::InvalidatedHandle)
        ));
        assert!(matches!(
            store.open_row(table, RowKey(999)),
            Err(AccessError::NotFound { key: 999 })
        ));
    }

    #[test]
    fn indexed_lookup_matches_linear_scan() {
        let (store, table) = store_with_table();

        let _txn = store.begin_write();
        let a = insert(&store, table, "apple", 1);
        let _b = insert(&store, table, "pear", 2);
        let c = insert(&store, table, "apple", 3);

        let found = store
            .find_indexed(table, 0, &Value::String("apple".into()))
            .unwrap();
        assert_eq!(found, vec![a, c]);

        store.delete_row(table, a).unwrap();
        let found = store
            .find_indexed(table, 0, &Value::String("apple".into()))
            .unwrap();
        assert_eq!(found, vec![c]);

        // `count` carries no index
        assert!(store.find_indexed(table, 1, &Value::Int(1)).is_err());
    }

    #[test]
    fn set_field_keeps_index_current() {
        let (store, table) = store_with_table();

        let _txn = store.begin_write();
        let key = insert(&store, table, "before", 1);
        store
            .set_field(table, key, 0, Value::String("after".into()))
            .unwrap();

        assert!(
            store
                .find_indexed(table, 0, &Value::String("before".into()))
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store
                .find_indexed(table, 0, &Value::String("after".into()))
                .unwrap(),
            vec![key]
        );
    }

    #[test]
    #[should_panic(expected = "write transaction already active")]
    fn nested_write_transaction_panics() {
        let (store, _) = store_with_table();
        let _outer = store.begin_write();
        let _inner = store.begin_write();
    }
}
