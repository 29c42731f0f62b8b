//! Environment values: inherited configuration read by views.

use crate::property_list::{PropertyKey, PropertyList};
use crate::tracker::Tracker;
use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

/// A key into [`EnvironmentValues`].
pub trait EnvironmentKey: 'static {
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    fn default_value() -> Self::Value;
}

/// Stores an environment key in the environment's property list.
pub struct EnvironmentPropertyKey<K>(PhantomData<fn() -> K>);

impl<K: EnvironmentKey> PropertyKey for EnvironmentPropertyKey<K> {
    type Value = K::Value;

    fn default_value() -> K::Value {
        K::default_value()
    }
}

/// A collection of environment values, optionally reading through a [`Tracker`].
#[derive(Clone, Default)]
pub struct EnvironmentValues {
    plist: PropertyList,
    tracker: Option<Arc<Tracker>>,
}

impl EnvironmentValues {
    pub fn new() -> EnvironmentValues {
        EnvironmentValues::default()
    }

    pub fn from_plist(plist: PropertyList) -> EnvironmentValues {
        EnvironmentValues {
            plist,
            tracker: None,
        }
    }

    /// Creates values whose reads are recorded by `tracker`.
    pub fn tracked(plist: PropertyList, tracker: Arc<Tracker>) -> EnvironmentValues {
        EnvironmentValues {
            plist,
            tracker: Some(tracker),
        }
    }

    pub fn plist(&self) -> &PropertyList {
        &self.plist
    }

    pub fn tracker(&self) -> Option<&Arc<Tracker>> {
        self.tracker.as_ref()
    }

    pub fn get<K: EnvironmentKey>(&self) -> K::Value {
        match &self.tracker {
            Some(tracker) => tracker.value::<EnvironmentPropertyKey<K>>(&self.plist),
            None => self.plist.get::<EnvironmentPropertyKey<K>>(),
        }
    }

    /// Sets a value. With a tracker attached, the tracker is told which key changed.
    pub fn set<K: EnvironmentKey>(&mut self, value: K::Value) {
        let old = self.plist.clone();
        self.plist.set::<EnvironmentPropertyKey<K>>(value);
        if let Some(tracker) = &self.tracker {
            tracker.invalidate_value::<EnvironmentPropertyKey<K>>(&old, &self.plist);
        }
    }

    /// Makes the values of `other` take priority.
    pub fn override_with(&mut self, other: &EnvironmentValues) {
        let old = self.plist.clone();
        self.plist.override_with(&other.plist);
        if let Some(tracker) = &self.tracker {
            tracker.invalidate_all_values(&old, &self.plist);
        }
    }

    /// Returns false only if both environments are known to hold the same values.
    pub fn may_not_be_equal(&self, other: &EnvironmentValues) -> bool {
        self.plist.may_not_be_equal(&other.plist)
    }
}

impl fmt::Debug for EnvironmentValues {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EnvironmentValues")
            .field("plist", &self.plist)
            .field("tracked", &self.tracker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scale;

    impl EnvironmentKey for Scale {
        type Value = f64;

        fn default_value() -> f64 {
            1.
        }
    }

    struct Locale;

    impl EnvironmentKey for Locale {
        type Value = String;

        fn default_value() -> String {
            "en".into()
        }
    }

    #[test]
    fn reads_are_tracked() {
        let mut base = PropertyList::new();
        base.set::<EnvironmentPropertyKey<Scale>>(2.);
        let tracker = Arc::new(Tracker::new());
        tracker.initialize_values(&base);

        let mut env = EnvironmentValues::tracked(base, Arc::clone(&tracker));
        assert_eq!(env.get::<Scale>(), 2.);
        assert!(!tracker.has_different_used_values(env.plist()));

        env.set::<Locale>("de".into());
        assert!(
            !tracker.has_different_used_values(env.plist()),
            "locale was never read"
        );

        env.set::<Scale>(3.);
        assert!(tracker.has_different_used_values(env.plist()));
    }

    #[test]
    fn override_values() {
        let mut outer = EnvironmentValues::new();
        outer.set::<Scale>(2.);
        let mut inner = EnvironmentValues::new();
        inner.set::<Locale>("fr".into());
        outer.override_with(&inner);
        assert_eq!(outer.get::<Scale>(), 2.);
        assert_eq!(outer.get::<Locale>(), "fr");
    }
}
