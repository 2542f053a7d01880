//! The field accessor layer: every generated getter and setter funnels into
//! [`get`] and [`set`], which translate a field descriptor into storage
//! handle calls and enforce the coercion rules.

use crate::error::{AccessError, AccessResult};
use crate::schema::FieldDescriptor;
use crate::store::RowHandle;
use crate::value::Value;

/// Read one field through its descriptor. A null in a nullable field comes
/// back as [`Value::None`]; a null in a non-nullable field, or a stored value
/// of the wrong kind, is reported as corruption via `TypeMismatch` rather
/// than coerced to a default.
pub fn get(handle: &RowHandle, descriptor: &FieldDescriptor) -> AccessResult<Value> {
    let value = handle.get(descriptor.column_index)?;

    if value.is_none() {
        if descriptor.nullable {
            Ok(Value::None)
        } else {
            Err(AccessError::TypeMismatch {
                field: descriptor.name.to_string(),
                expected: descriptor.field_type.name(),
                found: "null",
            })
        }
    } else if !value.matches(&descriptor.field_type) {
        Err(AccessError::TypeMismatch {
            field: descriptor.name.to_string(),
            expected: descriptor.field_type.name(),
            found: value.kind(),
        })
    } else {
        Ok(value)
    }
}

/// Write one field through its descriptor. Checked in order: write context,
/// primary-key immutability, nullability, semantic type; the handle call then
/// reports invalidation.
pub fn set(handle: &RowHandle, descriptor: &FieldDescriptor, value: Value) -> AccessResult<()> {
    if !handle.store().is_in_write_transaction() {
        return Err(AccessError::ReadOnlyContext);
    }

    if descriptor.primary_key {
        return Err(AccessError::ConstraintViolation {
            reason: format!(
                "primary key '{}' cannot be changed after creation",
                descriptor.name
            ),
        });
    }

    if value.is_none() {
        if !descriptor.nullable {
            return Err(AccessError::NullNotAllowed {
                field: descriptor.name.to_string(),
            });
        }
    } else if !value.matches(&descriptor.field_type) {
        return Err(AccessError::TypeMismatch {
            field: descriptor.name.to_string(),
            expected: descriptor.field_type.name(),
            found: value.kind(),
        });
    }

    handle.set(descriptor.column_index, value)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::{FieldSpec, SchemaDescriptor, SchemaEntry, SchemaRegistry};
    use crate::store::{Store, TableId};

    fn setup() -> (Arc<Store>, TableId, Arc<SchemaEntry>) {
        let registry = SchemaRegistry::new();
        let entry = registry
            .register(
                &SchemaDescriptor::new("Track")
                    .field(FieldSpec::of::<String>("id").primary_key())
                    .field(FieldSpec::of::<String>("title"))
                    .field(FieldSpec::of::<Option<i64>>("rating")),
            )
            .unwrap();

        let store = Arc::new(Store::new());
        let table = store.create_table(Arc::clone(&entry));
        (store, table, entry)
    }

    fn insert(store: &Arc<Store>, table: TableId, id: &str) -> RowHandle {
        let key = store
            .insert_row(
                table,
                vec![
                    Value::String(id.to_string()),
                    Value::String(String::new()),
                    Value::None,
                ],
            )
            .unwrap();
        store.open_row(table, key).unwrap()
    }

    #[test]
    fn read_after_write_round_trips() {
        let (store, table, entry) = setup();
        let _txn = store.begin_write();
        let handle = insert(&store, table, "t1");

        let title = entry.field("title").unwrap();
        set(&handle, title, Value::String("Blue in Green".into())).unwrap();
        assert_eq!(
            get(&handle, title).unwrap(),
            Value::String("Blue in Green".into())
        );
    }

    #[test]
    fn null_rules_are_enforced() {
        let (store, table, entry) = setup();
        let _txn = store.begin_write();
        let handle = insert(&store, table, "t1");

        let rating = entry.field("rating").unwrap();
        set(&handle, rating, Value::Int(5)).unwrap();
        set(&handle, rating, Value::None).unwrap();
        assert_eq!(get(&handle, rating).unwrap(), Value::None);

        let title = entry.field("title").unwrap();
        let err = set(&handle, title, Value::None).unwrap_err();
        assert!(matches!(err, AccessError::NullNotAllowed { field } if field == "title"));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let (store, table, entry) = setup();
        let _txn = store.begin_write();
        let handle = insert(&store, table, "t1");

        let err = set(&handle, entry.field("title").unwrap(), Value::Int(7)).unwrap_err();
        assert!(matches!(err, AccessError::TypeMismatch { expected: "String", found: "Int", .. }));
    }

    #[test]
    fn writes_outside_transaction_fail() {
        let (store, table, entry) = setup();
        let handle = {
            let _txn = store.begin_write();
            insert(&store, table, "t1")
        };

        let err = set(&handle, entry.field("title").unwrap(), Value::String("x".into()))
            .unwrap_err();
        assert!(matches!(err, AccessError::ReadOnlyContext));

        // reading stays legal
        assert!(get(&handle, entry.field("title").unwrap()).is_ok());
    }

    #[test]
    fn primary_key_is_immutable() {
        let (store, table, entry) = setup();
        let _txn = store.begin_write();
        let handle = insert(&store, table, "t1");

        let err = set(&handle, entry.field("id").unwrap(), Value::String("t2".into()))
            .unwrap_err();
        assert!(matches!(err, AccessError::ConstraintViolation { .. }));
    }

    #[test]
    fn deleted_row_invalidates_the_handle() {
        let (store, table, entry) = setup();
        let _txn = store.begin_write();
        let handle = insert(&store, table, "t1");

        handle.delete().unwrap();
        assert!(matches!(
            get(&handle, entry.field("title").unwrap()),
            Err(AccessError::InvalidatedHandle)
        ));
    }
}
