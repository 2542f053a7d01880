use std::fmt::Debug;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use crate::schema::FieldType;
use crate::store::RowKey;

mod from;
mod typed;

pub use typed::FieldValue;

/// A raw storage value. Should match `crate::schema::FieldType`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Link(RowKey),
    LinkList(Vec<RowKey>),

    // Nullable
    None,
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::String(_) => "String",
            Value::Binary(_) => "Binary",
            Value::Timestamp(_) => "Timestamp",
            Value::Link(_) => "Link",
            Value::LinkList(_) => "LinkList",
            Value::None => "null",
        }
    }

    /// Whether this value can be stored in a column of the given semantic
    /// type. Null is handled separately by the nullability rules.
    pub(crate) fn matches(&self, field_type: &FieldType) -> bool {
        matches!(
            (self, field_type),
            (Value::Int(_), FieldType::Int)
                | (Value::Bool(_), FieldType::Bool)
                | (Value::Float(_), FieldType::Float)
                | (Value::Double(_), FieldType::Double)
                | (Value::String(_), FieldType::String)
                | (Value::Binary(_), FieldType::Binary)
                | (Value::Timestamp(_), FieldType::Timestamp)
                | (Value::Link(_), FieldType::Object(_))
                | (Value::LinkList(_), FieldType::List(_))
        )
    }

    /// Total order used by query sorting: null sorts before everything,
    /// values of different kinds compare as equal (cannot happen for a
    /// schema-typed column).
    pub(crate) fn compare(&self, other: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        match (self, other) {
            (Value::None, Value::None) => Ordering::Equal,
            (Value::None, _) => Ordering::Less,
            (_, Value::None) => Ordering::Greater,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Link(a), Value::Link(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// A typed reference to a row of the model type `T`. Links are plain row
/// keys; resolving one into a live object goes through
/// [`Realm::resolve`](crate::Realm::resolve), which constructs the target
/// proxy only when actually asked for.
pub struct Link<T> {
    key: RowKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Link<T> {
    pub(crate) fn new(key: RowKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> RowKey {
        self.key
    }
}

impl<T: crate::object::RealmObject> Link<T> {
    /// Create a link pointing at a live object.
    pub fn to(object: &T) -> Self {
        Self::new(object.proxy().row_key())
    }
}

impl<T> Debug for Link<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Link").field(&self.key).finish()
    }
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Link<T> {}

impl<T> PartialEq for Link<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Link<T> {}

impl<T> std::hash::Hash for Link<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
