use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{AccessError, AccessResult, CollectionResult};
use crate::object::RealmObject;
use crate::results::RealmResults;
use crate::schema::{FieldDescriptor, FieldType, SchemaEntry};
use crate::store::{Store, TableId};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilterOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    IsNull,
    IsNotNull,
}

/// One predicate over one column. A query matches a row when every filter
/// matches.
#[derive(Debug, Clone)]
pub(crate) struct Filter {
    column: usize,
    op: FilterOp,
    value: Value,
}

impl Filter {
    fn matches(&self, row: &[Value]) -> bool {
        use std::cmp::Ordering;

        let stored = &row[self.column];
        match self.op {
            FilterOp::Equal => *stored == self.value,
            FilterOp::NotEqual => *stored != self.value,
            FilterOp::IsNull => stored.is_none(),
            FilterOp::IsNotNull => !stored.is_none(),
            // null never participates in an ordering comparison
            FilterOp::GreaterThan | FilterOp::GreaterThanOrEqual | FilterOp::LessThan
            | FilterOp::LessThanOrEqual => {
                if stored.is_none() || self.value.is_none() {
                    return false;
                }
                let ordering = stored.compare(&self.value);
                match self.op {
                    FilterOp::GreaterThan => ordering == Ordering::Greater,
                    FilterOp::GreaterThanOrEqual => ordering != Ordering::Less,
                    FilterOp::LessThan => ordering == Ordering::Less,
                    FilterOp::LessThanOrEqual => ordering != Ordering::Greater,
                    _ => unreachable!(),
                }
            }
            FilterOp::Contains => match (stored, &self.value) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Sort {
    pub(crate) column: usize,
    pub(crate) ascending: bool,
}

/// The descriptor the storage engine evaluates: a table, a filter
/// conjunction, and an optional sort. Field names are resolved to column
/// indices at build time, so evaluation never touches the schema.
#[derive(Debug, Clone)]
pub struct Query {
    table: TableId,
    filters: Vec<Filter>,
    sort: Option<Sort>,
}

impl Query {
    /// An unfiltered scan of a whole table, in insertion order.
    pub(crate) fn scan(table: TableId) -> Self {
        Self {
            table,
            filters: Vec::new(),
            sort: None,
        }
    }

    pub(crate) fn table(&self) -> TableId {
        self.table
    }

    pub(crate) fn sort(&self) -> Option<Sort> {
        self.sort
    }

    pub(crate) fn matches(&self, row: &[Value]) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }
}

/// Fluent query over a registered model type. Conditions are conjunctive;
/// every builder step validates the field name and the operand type up
/// front, so a malformed query fails at build time, not at evaluation.
#[derive(Debug)]
pub struct RealmQuery<T: RealmObject> {
    store: Arc<Store>,
    entry: Arc<SchemaEntry>,
    query: Query,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RealmObject> RealmQuery<T> {
    pub(crate) fn new(store: Arc<Store>, entry: Arc<SchemaEntry>, table: TableId) -> Self {
        Self {
            store,
            entry,
            query: Query::scan(table),
            _marker: PhantomData,
        }
    }

    fn descriptor(&self, field: &str) -> AccessResult<&FieldDescriptor> {
        self.entry
            .field(field)
            .ok_or_else(|| AccessError::UnknownField {
                name: field.to_string(),
            })
    }

    fn filter(mut self, field: &str, op: FilterOp, value: Value) -> AccessResult<Self> {
        let descriptor = self.descriptor(field)?;
        let (column, field_type) = (descriptor.column_index, descriptor.field_type);
        if !value.is_none() && !value.matches(&field_type) {
            return Err(AccessError::TypeMismatch {
                field: field.to_string(),
                expected: field_type.name(),
                found: value.kind(),
            });
        }

        self.query.filters.push(Filter { column, op, value });
        Ok(self)
    }

    pub fn equal_to(self, field: &str, value: impl Into<Value>) -> AccessResult<Self> {
        self.filter(field, FilterOp::Equal, value.into())
    }

    pub fn not_equal_to(self, field: &str, value: impl Into<Value>) -> AccessResult<Self> {
        self.filter(field, FilterOp::NotEqual, value.into())
    }

    pub fn greater_than(self, field: &str, value: impl Into<Value>) -> AccessResult<Self> {
        self.filter(field, FilterOp::GreaterThan, value.into())
    }

    pub fn greater_than_or_equal(self, field: &str, value: impl Into<Value>) -> AccessResult<Self> {
        self.filter(field, FilterOp::GreaterThanOrEqual, value.into())
    }

    pub fn less_than(self, field: &str, value: impl Into<Value>) -> AccessResult<Self> {
        self.filter(field, FilterOp::LessThan, value.into())
    }

    pub fn less_than_or_equal(self, field: &str, value: impl Into<Value>) -> AccessResult<Self> {
        self.filter(field, FilterOp::LessThanOrEqual, value.into())
    }

    /// Substring match on a string field.
    pub fn contains(self, field: &str, needle: &str) -> AccessResult<Self> {
        let field_type = self.descriptor(field)?.field_type;
        if field_type != FieldType::String {
            return Err(AccessError::TypeMismatch {
                field: field.to_string(),
                expected: "String",
                found: field_type.name(),
            });
        }
        self.filter(field, FilterOp::Contains, Value::String(needle.to_string()))
    }

    pub fn is_null(self, field: &str) -> AccessResult<Self> {
        self.filter(field, FilterOp::IsNull, Value::None)
    }

    pub fn is_not_null(self, field: &str) -> AccessResult<Self> {
        self.filter(field, FilterOp::IsNotNull, Value::None)
    }

    /// Order the results by a field. Without a sort, results keep table
    /// insertion order.
    pub fn sort(mut self, field: &str, ascending: bool) -> AccessResult<Self> {
        let column = self.descriptor(field)?.column_index;
        self.query.sort = Some(Sort { column, ascending });
        Ok(self)
    }

    /// Produce the live collection for this query. Evaluation is deferred to
    /// the first access.
    pub fn find_all(self) -> RealmResults<T> {
        RealmResults::new(self.store, self.entry, self.query)
    }

    /// The first match, or `None` when nothing matches.
    pub fn find_first(self) -> CollectionResult<Option<T>> {
        use crate::collection::OrderedRealmCollection;

        self.find_all().first_or_default(None)
    }

    pub fn count(self) -> usize {
        use crate::collection::RealmCollection;

        self.find_all().size()
    }
}
