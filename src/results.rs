use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use log::debug;
use tracing::instrument;

use crate::collection::{OrderedRealmCollection, RealmCollection};
use crate::error::{CollectionError, CollectionResult};
use crate::object::{ObjectProxy, RealmObject};
use crate::query::Query;
use crate::schema::SchemaEntry;
use crate::store::{RowKey, Store, Version};

/// Evaluation state of a results sequence. `Evaluated` pins the ordered row
/// keys to the engine version they were derived at; any access that finds the
/// engine has moved on re-derives the list.
enum ResultsState {
    Unevaluated,
    Evaluated { version: Version, rows: Vec<RowKey> },
}

/// The live, lazily evaluated result of a query: an ordered view over row
/// identities that resynchronizes with the storage engine on every access.
/// Callers never refresh explicitly; a stale sequence is not an error state,
/// only a trigger to re-derive.
///
/// Elements are materialized per access — `get` wraps a fresh proxy each
/// call, so field reads always reflect current storage without a refresh
/// step.
pub struct RealmResults<T: RealmObject> {
    store: Arc<Store>,
    entry: Arc<SchemaEntry>,
    query: Query,
    state: Mutex<ResultsState>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RealmObject> Debug for RealmResults<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmResults")
            .field("type", &self.entry.type_name())
            .field("query", &self.query)
            .finish()
    }
}

impl<T: RealmObject> RealmResults<T> {
    pub(crate) fn new(store: Arc<Store>, entry: Arc<SchemaEntry>, query: Query) -> Self {
        Self {
            store,
            entry,
            query,
            state: Mutex::new(ResultsState::Unevaluated),
            _marker: PhantomData,
        }
    }

    /// The check-then-resolve step behind every operation: compare the
    /// evaluated version against the engine and re-derive the row list when
    /// they differ. Returns the keys valid as of one single engine version.
    #[instrument(target = "RealmResults", level = "debug", skip(self))]
    fn synchronized_rows(&self) -> Vec<RowKey> {
        let mut state = self.state.lock().expect("results state poisoned");

        if let ResultsState::Evaluated { version, rows } = &*state
            && *version == self.store.current_version()
        {
            return rows.clone();
        }

        let (version, rows) = self.store.evaluate(&self.query);
        debug!(
            target: "RealmResults",
            "re-evaluated {} rows at {version:?}",
            rows.len()
        );
        *state = ResultsState::Evaluated {
            version,
            rows: rows.clone(),
        };
        rows
    }

    /// Drop the evaluated row list. The next access re-derives it; this is
    /// how deletion through the view defers renumbering.
    fn mark_stale(&self) {
        *self.state.lock().expect("results state poisoned") = ResultsState::Unevaluated;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            results: self,
            index: 0,
        }
    }
}

impl<T: RealmObject> RealmCollection<T> for RealmResults<T> {
    fn size(&self) -> usize {
        self.synchronized_rows().len()
    }

    fn contains(&self, element: &T) -> bool {
        self.index_of(element).is_some()
    }
}

impl<T: RealmObject> OrderedRealmCollection<T> for RealmResults<T> {
    fn get(&self, index: usize) -> CollectionResult<T> {
        let rows = self.synchronized_rows();
        let Some(&key) = rows.get(index) else {
            return Err(CollectionError::IndexOutOfBounds {
                index,
                size: rows.len(),
            });
        };

        let handle = self.store.open_row(self.query.table(), key)?;
        Ok(T::from_proxy(ObjectProxy::new(
            handle,
            Arc::clone(&self.entry),
        )))
    }

    fn index_of(&self, element: &T) -> Option<usize> {
        let handle = element.proxy().handle();
        if !Arc::ptr_eq(handle.store(), &self.store) || handle.table() != self.query.table() {
            return None;
        }

        let key = handle.key();
        self.synchronized_rows().iter().position(|&k| k == key)
    }

    #[instrument(target = "RealmResults", level = "debug", skip(self))]
    fn delete_from_realm(&self, index: usize) -> CollectionResult<()> {
        let rows = self.synchronized_rows();
        let Some(&key) = rows.get(index) else {
            return Err(CollectionError::IndexOutOfBounds {
                index,
                size: rows.len(),
            });
        };

        self.store.delete_row(self.query.table(), key)?;
        self.mark_stale();
        Ok(())
    }
}

/// Lazy iterator over a live results sequence: each step resolves one index
/// against current storage, so it inherits the collection's liveness rather
/// than iterating a frozen snapshot.
pub struct Iter<'a, T: RealmObject> {
    results: &'a RealmResults<T>,
    index: usize,
}

impl<T: RealmObject> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self.results.get(self.index) {
            Ok(element) => {
                self.index += 1;
                Some(element)
            }
            Err(_) => None,
        }
    }
}

impl<'a, T: RealmObject> IntoIterator for &'a RealmResults<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use crate::collection::{OrderedRealmCollection, RealmCollection};
    use crate::error::CollectionError;
    use crate::realm::Realm;
    use crate::realm_object;

    realm_object!(Person =>
        name set_name: String,
        age set_age: i64,
    );

    fn realm_with_people(ages: &[i64]) -> Realm {
        let realm = Realm::new();
        realm.register::<Person>().unwrap();
        realm.write(|| {
            for &age in ages {
                let person: Person = realm.create().unwrap();
                person.set_name(format!("age-{age}")).unwrap();
                person.set_age(age).unwrap();
            }
        });
        realm
    }

    fn by_age(realm: &Realm) -> crate::results::RealmResults<Person> {
        realm
            .query::<Person>()
            .unwrap()
            .sort("age", true)
            .unwrap()
            .find_all()
    }

    #[test]
    fn sorted_collection_first_last_and_delete() {
        // write three rows out of order; the query sorts by age ascending
        let realm = realm_with_people(&[20, 10, 30]);
        let collection = by_age(&realm);

        assert_eq!(collection.size(), 3);
        assert_eq!(collection.first().unwrap().age().unwrap(), 10);
        assert_eq!(collection.last().unwrap().age().unwrap(), 30);

        realm.write(|| collection.delete_from_realm(0).unwrap());

        assert_eq!(collection.size(), 2);
        assert_eq!(collection.first().unwrap().age().unwrap(), 20);
    }

    #[test]
    fn deletion_renumbers_on_next_access() {
        let realm = realm_with_people(&[10, 20, 30, 40]);
        let collection = by_age(&realm);

        let at_two = collection.get(2).unwrap().age().unwrap();
        realm.write(|| collection.delete_from_realm(1).unwrap());

        // what was at index 2 is observed at index 1 on the next access
        assert_eq!(collection.get(1).unwrap().age().unwrap(), at_two);
        assert_eq!(collection.size(), 3);
    }

    #[test]
    fn empty_collection_tiers() {
        let realm = realm_with_people(&[]);
        let collection = by_age(&realm);

        assert!(matches!(
            collection.first(),
            Err(CollectionError::EmptyCollection)
        ));
        assert!(matches!(
            collection.last(),
            Err(CollectionError::EmptyCollection)
        ));
        assert_eq!(collection.first_or_default(None).unwrap(), None);

        realm.write(|| {
            assert!(!collection.delete_first_from_realm().unwrap());
            assert!(!collection.delete_last_from_realm().unwrap());
        });
        assert_eq!(collection.size(), 0);
    }

    #[test]
    fn delete_first_and_last_shrink_by_one() {
        let realm = realm_with_people(&[10, 20, 30]);
        let collection = by_age(&realm);

        realm.write(|| {
            assert!(collection.delete_first_from_realm().unwrap());
            assert!(collection.delete_last_from_realm().unwrap());
        });

        assert_eq!(collection.size(), 1);
        assert_eq!(collection.first().unwrap().age().unwrap(), 20);
    }

    #[test]
    fn deletion_requires_write_context() {
        let realm = realm_with_people(&[10]);
        let collection = by_age(&realm);

        assert!(matches!(
            collection.delete_from_realm(0),
            Err(CollectionError::Access(
                crate::error::AccessError::ReadOnlyContext
            ))
        ));
        // the bool tier does not swallow the write-context failure
        assert!(collection.delete_first_from_realm().is_err());
        assert_eq!(collection.size(), 1);
    }

    #[test]
    fn out_of_bounds_reports_index_and_size() {
        let realm = realm_with_people(&[10, 20]);
        let collection = by_age(&realm);

        assert!(matches!(
            collection.get(2),
            Err(CollectionError::IndexOutOfBounds { index: 2, size: 2 })
        ));
    }

    #[test]
    fn collection_is_live_without_explicit_refresh() {
        let realm = realm_with_people(&[10]);
        let collection = by_age(&realm);
        assert_eq!(collection.size(), 1);

        realm.write(|| {
            let person: Person = realm.create().unwrap();
            person.set_age(5).unwrap();
        });

        assert_eq!(collection.size(), 2);
        assert_eq!(collection.first().unwrap().age().unwrap(), 5);
    }

    #[test]
    fn elements_are_materialized_fresh_per_access() {
        let realm = realm_with_people(&[10]);
        let collection = by_age(&realm);

        let before = collection.get(0).unwrap();
        realm.write(|| before.set_age(11).unwrap());

        // a new proxy for the same row observes the write, and compares
        // equal to the old one by row identity
        let after = collection.get(0).unwrap();
        assert_eq!(after.age().unwrap(), 11);
        assert_eq!(before, after);
        assert_eq!(collection.index_of(&before), Some(0));
        assert!(collection.contains(&after));
    }

    #[test]
    fn filtered_results_stay_consistent_with_writes() {
        let realm = realm_with_people(&[10, 20, 30, 40]);
        let adults = realm
            .query::<Person>()
            .unwrap()
            .greater_than_or_equal("age", 18)
            .unwrap()
            .sort("age", true)
            .unwrap()
            .find_all();

        assert_eq!(adults.size(), 3);

        // aging one minor into the filter is visible on the next access
        let minor: Person = realm
            .query::<Person>()
            .unwrap()
            .equal_to("age", 10)
            .unwrap()
            .find_first()
            .unwrap()
            .unwrap();
        realm.write(|| minor.set_age(18).unwrap());

        let ages = adults.iter().map(|p| p.age().unwrap()).collect_vec();
        assert_eq!(ages, vec![18, 20, 30, 40]);
    }

    #[test]
    fn iteration_is_lazy_against_current_state() {
        let realm = realm_with_people(&[10, 20, 30]);
        let collection = by_age(&realm);

        let mut iter = collection.iter();
        assert_eq!(iter.next().unwrap().age().unwrap(), 10);

        // deleting the head mid-iteration shifts the remaining elements;
        // the iterator observes the post-mutation view, never a torn one
        realm.write(|| collection.delete_from_realm(0).unwrap());
        assert_eq!(iter.next().unwrap().age().unwrap(), 30);
        assert!(iter.next().is_none());
    }
}
