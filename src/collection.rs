//! The collection contracts: a base capability set shared by every
//! storage-backed collection, plus the ordered surface with positional
//! access, two-tier first/last accessors, and deletion through the view.

use crate::error::{CollectionError, CollectionResult};

/// Capabilities common to every storage-backed collection. `size` is where
/// the live contract lives: each call resynchronizes the collection with the
/// current storage version before answering.
pub trait RealmCollection<E> {
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn contains(&self, element: &E) -> bool;
}

/// An ordered, indexable collection over live storage. The strict accessors
/// (`first`, `last`, `get`) fail on empty or out-of-range access; the
/// `or_default` and bool-returning tier converts exactly the empty case into
/// a caller-supplied default, and nothing else — handle-level failures still
/// surface through both tiers.
pub trait OrderedRealmCollection<E>: RealmCollection<E> {
    /// Resolve the element at `index` against current storage. Implementors
    /// construct a fresh proxy per call so the element always reflects
    /// current field values.
    fn get(&self, index: usize) -> CollectionResult<E>;

    /// Position of the element in the collection, by row identity.
    fn index_of(&self, element: &E) -> Option<usize>;

    /// Delete the element at `index` from the underlying storage. Requires
    /// an active write transaction. Renumbering is observed on the next
    /// access, not eagerly.
    fn delete_from_realm(&self, index: usize) -> CollectionResult<()>;

    fn first(&self) -> CollectionResult<E> {
        match self.get(0) {
            Err(CollectionError::IndexOutOfBounds { .. }) => Err(CollectionError::EmptyCollection),
            other => other,
        }
    }

    fn last(&self) -> CollectionResult<E> {
        match self.size() {
            0 => Err(CollectionError::EmptyCollection),
            size => match self.get(size - 1) {
                Err(CollectionError::IndexOutOfBounds { .. }) => {
                    Err(CollectionError::EmptyCollection)
                }
                other => other,
            },
        }
    }

    fn first_or_default(&self, default: Option<E>) -> CollectionResult<Option<E>> {
        match self.first() {
            Ok(element) => Ok(Some(element)),
            Err(CollectionError::EmptyCollection) => Ok(default),
            Err(err) => Err(err),
        }
    }

    fn last_or_default(&self, default: Option<E>) -> CollectionResult<Option<E>> {
        match self.last() {
            Ok(element) => Ok(Some(element)),
            Err(CollectionError::EmptyCollection) => Ok(default),
            Err(err) => Err(err),
        }
    }

    /// Delete the first element. Returns `false` instead of failing when the
    /// collection is empty.
    fn delete_first_from_realm(&self) -> CollectionResult<bool> {
        match self.delete_from_realm(0) {
            Ok(()) => Ok(true),
            Err(CollectionError::IndexOutOfBounds { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Delete the last element. Returns `false` instead of failing when the
    /// collection is empty.
    fn delete_last_from_realm(&self) -> CollectionResult<bool> {
        match self.size() {
            0 => Ok(false),
            size => match self.delete_from_realm(size - 1) {
                Ok(()) => Ok(true),
                Err(CollectionError::IndexOutOfBounds { .. }) => Ok(false),
                Err(err) => Err(err),
            },
        }
    }
}
