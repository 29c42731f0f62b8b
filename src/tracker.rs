//! Dependency tracking for property list reads.

use crate::property_list::{DerivedPropertyKey, PropertyKey, PropertyKeyLookup, PropertyList};
use crate::unique_id::UniqueId;
use core::any::{Any, TypeId};
use core::fmt;
use core::marker::PhantomData;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A value read through a tracker, able to tell whether a list still holds it.
trait TrackedValue: Send + Sync {
    /// The recorded value, as `&K::Value` of the key it was recorded for.
    fn value(&self) -> &dyn Any;

    fn has_matching_value(&self, plist: &PropertyList) -> bool;
}

struct Stored<K: PropertyKey> {
    value: K::Value,
    _key: PhantomData<fn() -> K>,
}

impl<K: PropertyKey> TrackedValue for Stored<K> {
    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn has_matching_value(&self, plist: &PropertyList) -> bool {
        match plist.value_if_present::<K>() {
            Some(current) => K::values_equal(&self.value, current),
            None => K::values_equal(&self.value, &K::default_value()),
        }
    }
}

struct Derived<K: DerivedPropertyKey> {
    value: K::Value,
    _key: PhantomData<fn() -> K>,
}

impl<K: DerivedPropertyKey> TrackedValue for Derived<K> {
    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn has_matching_value(&self, plist: &PropertyList) -> bool {
        self.value == K::value(plist)
    }
}

struct SecondaryLookup<L: PropertyKeyLookup> {
    value: <L::Primary as PropertyKey>::Value,
    _lookup: PhantomData<fn() -> L>,
}

impl<L: PropertyKeyLookup> TrackedValue for SecondaryLookup<L> {
    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn has_matching_value(&self, plist: &PropertyList) -> bool {
        L::Primary::values_equal(&self.value, &plist.value_with_secondary_lookup::<L>())
    }
}

#[derive(Clone, Default)]
struct TrackerData {
    plist_id: UniqueId,
    values: HashMap<TypeId, Arc<dyn TrackedValue>>,
    derived_values: HashMap<TypeId, Arc<dyn TrackedValue>>,
    invalid_values: Vec<Arc<dyn TrackedValue>>,
    unrecorded_dependencies: bool,
}

impl TrackerData {
    /// Moves every entry of `values` to the invalid bucket.
    fn invalidate(
        values: &mut HashMap<TypeId, Arc<dyn TrackedValue>>,
        invalid_values: &mut Vec<Arc<dyn TrackedValue>>,
    ) {
        invalid_values.extend(values.drain().map(|(_, value)| value));
    }

    fn all_match(values: &HashMap<TypeId, Arc<dyn TrackedValue>>, plist: &PropertyList) -> bool {
        values.values().all(|value| value.has_matching_value(plist))
    }

    fn form_union(&mut self, other: &TrackerData) {
        if !other.plist_id.is_valid() || self.plist_id == other.plist_id {
            return;
        }
        if !self.plist_id.is_valid() {
            self.values = other.values.clone();
            self.derived_values = other.derived_values.clone();
            self.invalid_values = other.invalid_values.clone();
            self.unrecorded_dependencies = other.unrecorded_dependencies;
        } else {
            for (key, value) in &other.values {
                self.values.entry(*key).or_insert_with(|| Arc::clone(value));
            }
            for (key, value) in &other.derived_values {
                self.derived_values.entry(*key).or_insert_with(|| Arc::clone(value));
            }
            self.invalid_values.extend(other.invalid_values.iter().cloned());
            self.unrecorded_dependencies |= other.unrecorded_dependencies;
        }
        self.plist_id = other.plist_id;
    }
}

/// Records which keys a consumer read from a property list, so it can later tell whether a new
/// list would give it different values without recomputing.
///
/// A tracker is bound to one list snapshot by identity. Reads from any other list are not recorded
/// and make [`has_different_used_values`](Tracker::has_different_used_values) answer `true`.
#[derive(Default)]
pub struct Tracker {
    data: Mutex<TrackerData>,
}

impl Tracker {
    pub fn new() -> Tracker {
        Tracker::default()
    }

    /// Reads `K` from `plist`, recording the value if `plist` is the bound list.
    pub fn value<K: PropertyKey>(&self, plist: &PropertyList) -> K::Value {
        let mut data = self.data.lock();
        if data.plist_id != plist.id() {
            data.unrecorded_dependencies = true;
            return plist.get::<K>();
        }
        if let Some(tracked) = data.values.get(&TypeId::of::<K>()) {
            return recorded::<K::Value>(&**tracked);
        }
        let value = plist.get::<K>();
        data.values.insert(
            TypeId::of::<K>(),
            Arc::new(Stored::<K> {
                value: value.clone(),
                _key: PhantomData,
            }),
        );
        value
    }

    pub fn derived_value<K: DerivedPropertyKey>(&self, plist: &PropertyList) -> K::Value {
        let mut data = self.data.lock();
        if data.plist_id != plist.id() {
            data.unrecorded_dependencies = true;
            return K::value(plist);
        }
        if let Some(tracked) = data.derived_values.get(&TypeId::of::<K>()) {
            return recorded::<K::Value>(&**tracked);
        }
        let value = K::value(plist);
        data.derived_values.insert(
            TypeId::of::<K>(),
            Arc::new(Derived::<K> {
                value: value.clone(),
                _key: PhantomData,
            }),
        );
        value
    }

    /// Like [`value`](Tracker::value), for a lookup with a secondary fallback key. The result is
    /// recorded under the primary key.
    pub fn value_with_secondary_lookup<L: PropertyKeyLookup>(
        &self,
        plist: &PropertyList,
    ) -> <L::Primary as PropertyKey>::Value {
        let mut data = self.data.lock();
        if data.plist_id != plist.id() {
            data.unrecorded_dependencies = true;
            return plist.value_with_secondary_lookup::<L>();
        }
        let key = TypeId::of::<L::Primary>();
        if let Some(tracked) = data.values.get(&key) {
            return recorded::<<L::Primary as PropertyKey>::Value>(&**tracked);
        }
        let value = plist.value_with_secondary_lookup::<L>();
        data.values.insert(
            key,
            Arc::new(SecondaryLookup::<L> {
                value: value.clone(),
                _lookup: PhantomData,
            }),
        );
        value
    }

    /// Binds the tracker to `plist`.
    pub fn initialize_values(&self, plist: &PropertyList) {
        self.data.lock().plist_id = plist.id();
    }

    /// Forgets the recorded value of `K` and every derived value, and rebinds to `to`.
    ///
    /// Only takes effect if the tracker is bound to `from` and `to` is a different list.
    pub fn invalidate_value<K: PropertyKey>(&self, from: &PropertyList, to: &PropertyList) {
        let mut data = self.data.lock();
        if data.plist_id != from.id() || data.plist_id == to.id() {
            return;
        }
        let data = &mut *data;
        if let Some(value) = data.values.remove(&TypeId::of::<K>()) {
            data.invalid_values.push(value);
        }
        TrackerData::invalidate(&mut data.derived_values, &mut data.invalid_values);
        data.plist_id = to.id();
    }

    /// Forgets every recorded value and rebinds to `to`, under the same condition as
    /// [`invalidate_value`](Tracker::invalidate_value).
    pub fn invalidate_all_values(&self, from: &PropertyList, to: &PropertyList) {
        let mut data = self.data.lock();
        if data.plist_id != from.id() || data.plist_id == to.id() {
            return;
        }
        let data = &mut *data;
        TrackerData::invalidate(&mut data.values, &mut data.invalid_values);
        TrackerData::invalidate(&mut data.derived_values, &mut data.invalid_values);
        data.plist_id = to.id();
    }

    /// Returns true if `plist` may yield different values for the keys that were read.
    pub fn has_different_used_values(&self, plist: &PropertyList) -> bool {
        let data = self.data.lock();
        if data.unrecorded_dependencies {
            return true;
        }
        if data.plist_id != plist.id() {
            return true;
        }
        if !TrackerData::all_match(&data.values, plist)
            || !TrackerData::all_match(&data.derived_values, plist)
        {
            return true;
        }
        data.invalid_values.iter().any(|value| !value.has_matching_value(plist))
    }

    /// Unbinds the tracker and forgets everything it recorded.
    pub fn reset(&self) {
        let mut data = self.data.lock();
        data.plist_id = UniqueId::INVALID;
        data.values.clear();
        data.derived_values.clear();
        data.invalid_values.clear();
        data.unrecorded_dependencies = false;
    }

    /// Adds the reads recorded by `other` to this tracker.
    pub fn form_union(&self, other: &Tracker) {
        if core::ptr::eq(self, other) {
            return;
        }
        // never hold both locks
        let other = other.data.lock().clone();
        self.data.lock().form_union(&other);
    }

    /// The identity of the bound list.
    pub fn plist_id(&self) -> UniqueId {
        self.data.lock().plist_id
    }
}

fn recorded<V: Clone + 'static>(tracked: &dyn TrackedValue) -> V {
    tracked
        .value()
        .downcast_ref::<V>()
        .expect("tracked value recorded with a different type")
        .clone()
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let data = self.data.lock();
        f.debug_struct("Tracker")
            .field("plist_id", &data.plist_id)
            .field("values", &data.values.len())
            .field("derived_values", &data.derived_values.len())
            .field("invalid_values", &data.invalid_values.len())
            .field("unrecorded_dependencies", &data.unrecorded_dependencies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    property_key! {
        IntKey: i32 = 0;
        BoolKey: bool = false;
    }

    struct Negated;

    impl DerivedPropertyKey for Negated {
        type Value = i32;

        fn value(plist: &PropertyList) -> i32 {
            -plist.get::<IntKey>()
        }
    }

    fn list(value: i32) -> PropertyList {
        let mut plist = PropertyList::new();
        plist.set::<IntKey>(value);
        plist
    }

    #[test]
    fn unchanged_list_has_same_values() {
        let plist = list(1);
        let tracker = Tracker::new();
        tracker.initialize_values(&plist);
        assert_eq!(tracker.value::<IntKey>(&plist), 1);
        assert_eq!(tracker.value::<BoolKey>(&plist), false);
        assert_eq!(tracker.derived_value::<Negated>(&plist), -1);
        assert!(!tracker.has_different_used_values(&plist));
    }

    #[test]
    fn invalidated_value_is_rechecked() {
        let old = list(1);
        let mut new = old.clone();
        new.set::<IntKey>(2);

        let tracker = Tracker::new();
        tracker.initialize_values(&old);
        tracker.value::<IntKey>(&old);
        tracker.invalidate_value::<IntKey>(&old, &new);
        assert_eq!(tracker.plist_id(), new.id());
        assert!(tracker.has_different_used_values(&new), "read key changed");

        let tracker = Tracker::new();
        tracker.initialize_values(&old);
        tracker.value::<IntKey>(&old);
        let mut same = old.clone();
        same.set::<BoolKey>(true);
        tracker.invalidate_value::<BoolKey>(&old, &same);
        assert!(!tracker.has_different_used_values(&same), "unread key changed");
    }

    #[test]
    fn invalidation_requires_known_transition() {
        let a = list(1);
        let b = list(2);
        let tracker = Tracker::new();
        tracker.initialize_values(&a);
        tracker.invalidate_value::<IntKey>(&b, &a);
        assert_eq!(tracker.plist_id(), a.id(), "`from` must be the bound list");
        tracker.invalidate_all_values(&a, &a);
        assert_eq!(tracker.plist_id(), a.id(), "`to` must differ");
        tracker.invalidate_all_values(&a, &b);
        assert_eq!(tracker.plist_id(), b.id());
    }

    #[test]
    fn derived_values_are_invalidated_with_any_key() {
        let old = list(1);
        let mut new = old.clone();
        new.set::<IntKey>(5);

        let tracker = Tracker::new();
        tracker.initialize_values(&old);
        tracker.derived_value::<Negated>(&old);
        tracker.invalidate_value::<BoolKey>(&old, &new);
        assert!(tracker.has_different_used_values(&new));
    }

    #[test]
    fn unrecorded_reads_are_conservative() {
        let a = list(1);
        let tracker = Tracker::new();
        tracker.initialize_values(&a);
        assert_eq!(tracker.value::<IntKey>(&list(1)), 1);
        assert!(tracker.has_different_used_values(&a));

        tracker.reset();
        tracker.initialize_values(&a);
        assert!(!tracker.has_different_used_values(&a));
        assert!(tracker.has_different_used_values(&list(1)), "unknown identity");
    }

    #[test]
    fn union_adopts_other_binding() {
        let a = list(1);
        let other = Tracker::new();
        other.initialize_values(&a);
        other.value::<IntKey>(&a);

        let tracker = Tracker::new();
        tracker.form_union(&other);
        assert_eq!(tracker.plist_id(), a.id());
        assert!(!tracker.has_different_used_values(&a));
        assert!(tracker.has_different_used_values(&list(1)));
    }

    #[test]
    fn crossed_unions_do_not_deadlock() {
        let a = Arc::new(Tracker::new());
        let b = Arc::new(Tracker::new());
        let plist = list(1);
        a.initialize_values(&plist);
        b.initialize_values(&list(2));

        let threads: Vec<_> = [(Arc::clone(&a), Arc::clone(&b)), (Arc::clone(&b), Arc::clone(&a))]
            .into_iter()
            .map(|(lhs, rhs)| {
                std::thread::spawn(move || {
                    for _ in 0..20_000 {
                        lhs.form_union(&rhs);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert!(a.plist_id().is_valid() && b.plist_id().is_valid());
    }
}
