use chrono::{DateTime, Utc};

use crate::error::{AccessError, AccessResult};
use crate::object::RealmObject;
use crate::schema::FieldType;
use crate::value::{Link, Value};

/// A Rust type that can live in a stored field. Implementations define the
/// semantic type the field is registered with and the checked conversion in
/// both directions; `Option<T>` marks the field nullable.
pub trait FieldValue: Sized {
    /// Whether the type admits engine-null.
    const NULLABLE: bool = false;

    /// Semantic type of the field as registered with the schema.
    fn field_type() -> FieldType;

    fn into_value(self) -> Value;

    /// Convert a raw storage value back. `field` is only used for error
    /// reporting.
    fn from_value(value: Value, field: &str) -> AccessResult<Self>;
}

macro_rules! field_value {
    ($ty:ty, $variant:ident, $field_type:ident) => {
        impl FieldValue for $ty {
            fn field_type() -> FieldType {
                FieldType::$field_type
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value, field: &str) -> AccessResult<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(AccessError::TypeMismatch {
                        field: field.to_string(),
                        expected: stringify!($variant),
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

field_value!(i64, Int, Int);
field_value!(bool, Bool, Bool);
field_value!(f32, Float, Float);
field_value!(f64, Double, Double);
field_value!(String, String, String);
field_value!(Vec<u8>, Binary, Binary);
field_value!(DateTime<Utc>, Timestamp, Timestamp);

impl<T: RealmObject> FieldValue for Link<T> {
    fn field_type() -> FieldType {
        FieldType::Object(T::TYPE_NAME)
    }

    fn into_value(self) -> Value {
        Value::Link(self.key())
    }

    fn from_value(value: Value, field: &str) -> AccessResult<Self> {
        match value {
            Value::Link(key) => Ok(Link::new(key)),
            other => Err(AccessError::TypeMismatch {
                field: field.to_string(),
                expected: "Link",
                found: other.kind(),
            }),
        }
    }
}

impl<T: RealmObject> FieldValue for Vec<Link<T>> {
    fn field_type() -> FieldType {
        FieldType::List(T::TYPE_NAME)
    }

    fn into_value(self) -> Value {
        Value::LinkList(self.into_iter().map(|link| link.key()).collect())
    }

    fn from_value(value: Value, field: &str) -> AccessResult<Self> {
        match value {
            Value::LinkList(keys) => Ok(keys.into_iter().map(Link::new).collect()),
            other => Err(AccessError::TypeMismatch {
                field: field.to_string(),
                expected: "LinkList",
                found: other.kind(),
            }),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const NULLABLE: bool = true;

    fn field_type() -> FieldType {
        T::field_type()
    }

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::None,
        }
    }

    fn from_value(value: Value, field: &str) -> AccessResult<Self> {
        match value {
            Value::None => Ok(None),
            other => T::from_value(other, field).map(Some),
        }
    }
}
