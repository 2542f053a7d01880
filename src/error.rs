use thiserror::Error;

/// Errors raised by the schema registry, such as looking up a type that was
/// never registered or re-registering a type with a different field layout.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Tried to look up a type that has not been registered.
    #[error("Unknown type '{name}'")]
    UnknownType {
        /// Name of the type that was not found.
        name: String,
    },

    /// A second registration for the same type name declared an incompatible
    /// field list. The first registration always wins; an identical
    /// re-registration is accepted and returns the existing entry.
    #[error("Schema conflict for type '{name}': {reason}")]
    SchemaConflict {
        /// Name of the conflicting type.
        name: String,
        /// Description of the first mismatching field.
        reason: String,
    },

    /// The declared schema itself is malformed, e.g. duplicate field names or
    /// more than one primary key.
    #[error("Invalid schema for type '{name}': {reason}")]
    InvalidSchema {
        /// Name of the offending type.
        name: String,
        /// Description of the problem.
        reason: String,
    },
}

/// Errors raised by the field accessor layer and the storage handle protocol.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The handle's row no longer exists: it was deleted after the handle was
    /// obtained. Distinct from [`NotFound`](Self::NotFound), which means the
    /// row never existed.
    #[error("Handle invalidated: the underlying row was deleted")]
    InvalidatedHandle,

    /// No row with the given key was ever created in this table.
    #[error("No such row: {key}")]
    NotFound {
        /// The key that was requested.
        key: u64,
    },

    /// Tried to access a field that does not exist in the schema entry.
    #[error("Unknown field '{name}'")]
    UnknownField {
        /// Name of the field that was not found.
        name: String,
    },

    /// The descriptor's semantic type disagrees with the value that was read
    /// or written.
    #[error("Type mismatch for field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Name of the field being accessed.
        field: String,
        /// The expected semantic type.
        expected: &'static str,
        /// What was actually present.
        found: &'static str,
    },

    /// Tried to store null into a non-nullable field.
    #[error("Field '{field}' is not nullable")]
    NullNotAllowed {
        /// Name of the field being written.
        field: String,
    },

    /// Tried to mutate outside of an active write transaction.
    #[error("Cannot mutate outside a write transaction")]
    ReadOnlyContext,

    /// A schema constraint was violated, e.g. writing a primary-key field
    /// after creation, or inserting a duplicate primary-key value.
    #[error("Constraint violation: {reason}")]
    ConstraintViolation {
        /// Description of the violated constraint.
        reason: String,
    },
}

/// Errors raised by ordered collections. The `or_default` and bool-returning
/// operations convert [`EmptyCollection`](Self::EmptyCollection) into a
/// non-error default; everything else always surfaces.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The requested position is outside `[0, size)`.
    #[error("Index {index} out of bounds (size {size})")]
    IndexOutOfBounds {
        /// The requested position.
        index: usize,
        /// The collection size at the time of the access.
        size: usize,
    },

    /// `first()` or `last()` was called on an empty collection.
    #[error("Collection is empty")]
    EmptyCollection,

    /// An accessor- or handle-level error occurred while resolving an
    /// element. See [`AccessError`].
    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Top-level error for session operations that cross layers, e.g. creating
/// an object (registry lookup plus row insertion). Each layer's errors stay
/// distinct and matchable through the transparent wrappers.
#[derive(Debug, Error)]
pub enum RealmError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Collection(#[from] CollectionError),
}

/// Convenience type alias for `Result<T, RealmError>`.
pub type RealmResult<T> = std::result::Result<T, RealmError>;

/// Convenience type alias for `Result<T, RegistryError>`.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Convenience type alias for `Result<T, AccessError>`.
pub type AccessResult<T> = std::result::Result<T, AccessError>;

/// Convenience type alias for `Result<T, CollectionError>`.
pub type CollectionResult<T> = std::result::Result<T, CollectionError>;
