//! Preference lists: values flowing from children up to their ancestors.
//!
//! Unlike a [`PropertyList`](crate::PropertyList), where the most recent value wins, values for
//! the same preference key produced by siblings are combined with [`PreferenceKey::reduce`]. Each
//! node carries a [`VersionSeed`] so consumers can detect changes without comparing values.

use crate::property_list::short_type_name;
use crate::version_seed::VersionSeed;
use core::any::{Any, TypeId};
use core::fmt;
use core::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A named value produced by a view and combined across siblings.
pub trait PreferenceKey: 'static {
    type Value: Clone + fmt::Debug + Send + Sync + 'static;

    fn default_value() -> Self::Value;

    /// Combines the accumulated `value` with the next sibling's value.
    fn reduce(value: &mut Self::Value, next_value: impl FnOnce() -> Self::Value);

    /// Whether `reduce` also sees values of views that are being removed.
    fn includes_removed_values() -> bool {
        false
    }

    /// Whether the host may read this preference.
    fn is_readable_by_host() -> bool {
        false
    }
}

/// Declares preference keys reducing with a closure `|value, next| ...`.
///
/// ```text
/// preference_key! {
///     pub KeyName: ValueType = default_expr, |value, next| { ... };
/// }
/// ```
#[macro_export]
macro_rules! preference_key {
    ($(
        $(#[$attr:meta])*
        $vis:vis $name:ident: $value:ty = $default:expr, |$acc:ident, $next:ident| $reduce:block;
    )*) => {
        $(
            $(#[$attr])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            $vis struct $name;

            impl $crate::PreferenceKey for $name {
                type Value = $value;

                fn default_value() -> $value {
                    $default
                }

                fn reduce($acc: &mut $value, $next: impl FnOnce() -> $value) $reduce
            }
        )*
    };
}

/// A preference value together with the seed it was produced with.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceValue<T> {
    pub value: T,
    pub seed: VersionSeed,
}

impl<T> PreferenceValue<T> {
    pub fn new(value: T, seed: VersionSeed) -> PreferenceValue<T> {
        PreferenceValue { value, seed }
    }
}

trait ErasedPreference: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn describe(&self, f: &mut fmt::Formatter) -> fmt::Result;

    fn includes_removed_values(&self) -> bool;

    /// Reduces `other` (stored under the same key) into this value.
    fn reduce(&self, seed: VersionSeed, other: &Node) -> (Arc<dyn ErasedPreference>, VersionSeed);
}

struct Typed<K: PreferenceKey> {
    value: K::Value,
    _key: PhantomData<fn() -> K>,
}

impl<K: PreferenceKey> Typed<K> {
    fn new(value: K::Value) -> Arc<dyn ErasedPreference> {
        Arc::new(Typed::<K> {
            value,
            _key: PhantomData,
        })
    }
}

impl<K: PreferenceKey> ErasedPreference for Typed<K> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn describe(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {:?}", short_type_name::<K>(), self.value)
    }

    fn includes_removed_values(&self) -> bool {
        K::includes_removed_values()
    }

    fn reduce(&self, seed: VersionSeed, other: &Node) -> (Arc<dyn ErasedPreference>, VersionSeed) {
        let mut value = self.value.clone();
        let mut seed = seed;
        K::reduce(&mut value, || {
            seed.merge(other.seed);
            other.value::<K>().clone()
        });
        (Typed::<K>::new(value), seed)
    }
}

struct Node {
    key_type: TypeId,
    seed: VersionSeed,
    /// Seed of this node merged with the seeds of every following node.
    merged_seed: VersionSeed,
    next: Option<Arc<Node>>,
    value: Arc<dyn ErasedPreference>,
}

impl Node {
    fn new(
        key_type: TypeId,
        value: Arc<dyn ErasedPreference>,
        seed: VersionSeed,
        next: Option<Arc<Node>>,
    ) -> Arc<Node> {
        let merged_seed = match &next {
            Some(next) => next.merged_seed.merged(seed),
            None => seed,
        };
        Arc::new(Node {
            key_type,
            seed,
            merged_seed,
            next,
            value,
        })
    }

    fn copy(&self, next: Option<Arc<Node>>) -> Arc<Node> {
        Node::new(self.key_type, Arc::clone(&self.value), self.seed, next)
    }

    fn value<K: PreferenceKey>(&self) -> &K::Value {
        &self
            .value
            .as_any()
            .downcast_ref::<Typed<K>>()
            .expect("preference node does not hold a value of its key type")
            .value
    }

    fn iter(self: &Arc<Node>) -> Nodes {
        Nodes {
            next: Some(Arc::clone(self)),
        }
    }

    fn find(self: &Arc<Node>, key_type: TypeId) -> Option<Arc<Node>> {
        self.iter().find(|node| node.key_type == key_type)
    }

    /// Reduces the first node with the same key in `from` into this one.
    fn combine(&self, from: &Arc<Node>, next: Option<Arc<Node>>) -> Option<Arc<Node>> {
        let other = from.find(self.key_type)?;
        let (value, seed) = self.value.reduce(self.seed, &other);
        Some(Node::new(self.key_type, value, seed, next))
    }
}

struct Nodes {
    next: Option<Arc<Node>>,
}

impl Iterator for Nodes {
    type Item = Arc<Node>;

    fn next(&mut self) -> Option<Arc<Node>> {
        let node = self.next.take()?;
        self.next = node.next.clone();
        Some(node)
    }
}

/// An immutable list of preference values, one per key.
#[derive(Clone, Default)]
pub struct PreferenceList {
    first: Option<Arc<Node>>,
}

impl PreferenceList {
    pub fn new() -> PreferenceList {
        PreferenceList { first: None }
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    fn nodes(&self) -> impl Iterator<Item = Arc<Node>> {
        Nodes {
            next: self.first.clone(),
        }
    }

    fn find<K: PreferenceKey>(&self) -> Option<Arc<Node>> {
        self.first.as_ref()?.find(TypeId::of::<K>())
    }

    /// Returns the value for `K`, or its default with an empty seed.
    pub fn get<K: PreferenceKey>(&self) -> PreferenceValue<K::Value> {
        self.value_if_present::<K>()
            .unwrap_or_else(|| PreferenceValue::new(K::default_value(), VersionSeed::EMPTY))
    }

    pub fn value_if_present<K: PreferenceKey>(&self) -> Option<PreferenceValue<K::Value>> {
        let node = self.find::<K>()?;
        Some(PreferenceValue::new(node.value::<K>().clone(), node.seed))
    }

    pub fn contains<K: PreferenceKey>(&self) -> bool {
        self.find::<K>().is_some()
    }

    /// Sets the value for `K`, replacing any existing entry.
    pub fn set<K: PreferenceKey>(&mut self, value: PreferenceValue<K::Value>) {
        if self.contains::<K>() {
            self.remove_value::<K>();
        }
        self.first = Some(Node::new(
            TypeId::of::<K>(),
            Typed::<K>::new(value.value),
            value.seed,
            self.first.take(),
        ));
    }

    pub fn remove_value<K: PreferenceKey>(&mut self) {
        self.retain(|node| node.key_type != TypeId::of::<K>());
    }

    /// Applies `transform` to the value for `K`, merging its seed into the entry's seed.
    pub fn modify_value<K: PreferenceKey>(
        &mut self,
        transform: PreferenceValue<impl FnOnce(&mut K::Value)>,
    ) {
        let mut value = self.get::<K>();
        value.seed.merge(transform.seed);
        (transform.value)(&mut value.value);
        self.set::<K>(value);
    }

    /// Rebuilds the list from the nodes for which `keep` returns true.
    ///
    /// Nodes are copied in reverse order.
    fn retain(&mut self, mut keep: impl FnMut(&Node) -> bool) {
        let nodes = self.nodes();
        self.first = None;
        for node in nodes {
            if keep(&node) {
                self.first = Some(node.copy(self.first.take()));
            }
        }
    }

    /// Merged seed of every entry.
    pub fn seed(&self) -> VersionSeed {
        self.first.as_ref().map_or(VersionSeed::EMPTY, |node| node.merged_seed)
    }

    /// Returns false only if both lists are known to be equal.
    pub fn may_not_be_equal(&self, other: &PreferenceList) -> bool {
        !self.seed().matches(other.seed())
    }

    /// Merges `other` into this list.
    ///
    /// Keys present in both lists are reduced with the key's `reduce`, keys present in only one
    /// list are copied.
    pub fn combine(&mut self, other: &PreferenceList) {
        let other_first = match &other.first {
            Some(first) => first,
            None => return,
        };
        let self_first = match self.first.take() {
            Some(first) => first,
            None => {
                self.first = Some(Arc::clone(other_first));
                return;
            }
        };

        for node in self_first.iter() {
            let next = self.first.take();
            self.first = Some(match node.combine(other_first, next.clone()) {
                Some(merged) => merged,
                None => node.copy(next),
            });
        }
        for node in other_first.iter() {
            if self_first.find(node.key_type).is_none() {
                self.first = Some(node.copy(self.first.take()));
            }
        }
    }

    /// Drops the values of keys that do not include removed values.
    pub fn filter_removed(&mut self) {
        if self.first.is_some() {
            self.retain(|node| node.value.includes_removed_values());
        }
    }
}

impl fmt::Display for PreferenceList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: [", self.seed())?;
        for (i, node) in self.nodes().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            node.value.describe(f)?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for PreferenceList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PreferenceList({})", self)
    }
}

/// The preference carrying every preference a host asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPreferencesKey;

impl HostPreferencesKey {
    /// Returns a new node id for seeding host preference values.
    pub fn make_node_id() -> u32 {
        static NODE_ID: AtomicU32 = AtomicU32::new(0);
        NODE_ID.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }
}

impl PreferenceKey for HostPreferencesKey {
    type Value = PreferenceList;

    fn default_value() -> PreferenceList {
        PreferenceList::new()
    }

    fn reduce(value: &mut PreferenceList, next_value: impl FnOnce() -> PreferenceList) {
        value.combine(&next_value());
    }
}

/// An ordered set of preference key types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceKeys {
    keys: Vec<TypeId>,
}

impl PreferenceKeys {
    pub fn new() -> PreferenceKeys {
        PreferenceKeys::default()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn contains<K: PreferenceKey>(&self) -> bool {
        self.keys.contains(&TypeId::of::<K>())
    }

    pub fn add<K: PreferenceKey>(&mut self) {
        if !self.contains::<K>() {
            self.keys.push(TypeId::of::<K>());
        }
    }

    pub fn remove<K: PreferenceKey>(&mut self) {
        self.keys.retain(|key| *key != TypeId::of::<K>());
    }
}
