//! Persistent, structurally-shared key-value lists.
//!
//! A [`PropertyList`] is an immutable linked list of nodes keyed by type. Mutation allocates a new
//! head that points at the old list, so copies are cheap and every snapshot stays valid. Each node
//! carries a `before` subtree in addition to its `after` link, which lets a whole list be spliced
//! in front of another in constant time (see [`PropertyList::override_with`]).

use crate::bloom::BloomFilter;
use crate::unique_id::UniqueId;
use core::any::{Any, TypeId};
use core::fmt;
use core::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;

/// A key into a [`PropertyList`].
///
/// Keys are types; the most recently set value wins.
pub trait PropertyKey: 'static {
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// The value read when the key is absent.
    fn default_value() -> Self::Value;

    /// Setting a value equal to the existing one does not allocate a node.
    fn values_equal(lhs: &Self::Value, rhs: &Self::Value) -> bool {
        lhs == rhs
    }
}

/// A value computed from a whole list rather than stored in it.
pub trait DerivedPropertyKey: 'static {
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    fn value(plist: &PropertyList) -> Self::Value;
}

/// Reads `Primary`, falling back to a value extracted from `Secondary` when that one comes first.
pub trait PropertyKeyLookup: 'static {
    type Primary: PropertyKey;
    type Secondary: PropertyKey;

    fn lookup(
        secondary: &<Self::Secondary as PropertyKey>::Value,
    ) -> Option<<Self::Primary as PropertyKey>::Value>;
}

/// Declares property keys.
///
/// Syntax:
///
/// ```text
/// property_key! {
///     /// docs
///     pub KeyName: ValueType = default_expr;
/// }
/// ```
#[macro_export]
macro_rules! property_key {
    ($(
        $(#[$attr:meta])*
        $vis:vis $name:ident: $value:ty = $default:expr;
    )*) => {
        $(
            $(#[$attr])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            $vis struct $name;

            impl $crate::PropertyKey for $name {
                type Value = $value;

                fn default_value() -> $value {
                    $default
                }
            }
        )*
    };
}

/// Splice marker inserted by [`PropertyList::override_with`].
struct EmptyKey;

impl PropertyKey for EmptyKey {
    type Value = ();

    fn default_value() {}
}

/// Returns the type name with module paths stripped, e.g. `Foo<Bar>` for `a::Foo<b::Bar>`.
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    fn last_segment(path: &str) -> &str {
        path.rsplit("::").next().unwrap_or(path)
    }

    let full = core::any::type_name::<T>();
    let mut name = String::with_capacity(full.len());
    let mut start = 0;
    for (i, c) in full.char_indices() {
        if matches!(c, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&') {
            name.push_str(last_segment(&full[start..i]));
            name.push(c);
            start = i + c.len_utf8();
        }
    }
    name.push_str(last_segment(&full[start..]));
    name
}

/// Type-erased value of a single node.
trait ErasedValue: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn describe(&self, f: &mut fmt::Formatter) -> fmt::Result;

    /// Compares against a value that is known to be stored under the same key.
    fn equals(&self, other: &dyn ErasedValue) -> bool;
}

struct TypedValue<K: PropertyKey> {
    value: K::Value,
    _key: PhantomData<fn() -> K>,
}

impl<K: PropertyKey> ErasedValue for TypedValue<K> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn describe(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {:?}", short_type_name::<K>(), self.value)
    }

    fn equals(&self, other: &dyn ErasedValue) -> bool {
        match other.as_any().downcast_ref::<TypedValue<K>>() {
            Some(other) => K::values_equal(&self.value, &other.value),
            None => false,
        }
    }
}

/// A list node.
struct Element {
    key_type: TypeId,
    before: Option<Arc<Element>>,
    after: Option<Arc<Element>>,
    /// Number of nodes reachable from this one, including itself.
    length: usize,
    /// Union of the key filters of every reachable node.
    filter: BloomFilter,
    id: UniqueId,
    value: Arc<dyn ErasedValue>,
}

impl Element {
    fn new(
        key_type: TypeId,
        value: Arc<dyn ErasedValue>,
        before: Option<Arc<Element>>,
        after: Option<Arc<Element>>,
    ) -> Arc<Element> {
        let mut length = 1;
        let mut filter = BloomFilter::for_type(key_type);
        for link in [&before, &after].into_iter().flatten() {
            length += link.length;
            filter.form_union(link.filter);
        }

        Arc::new(Element {
            key_type,
            before,
            after,
            length,
            filter,
            id: UniqueId::new(),
            value,
        })
    }

    fn typed<K: PropertyKey>(
        value: K::Value,
        before: Option<Arc<Element>>,
        after: Option<Arc<Element>>,
    ) -> Arc<Element> {
        let value = TypedValue::<K> {
            value,
            _key: PhantomData,
        };
        Element::new(TypeId::of::<K>(), Arc::new(value), before, after)
    }

    /// Same key and value, new links.
    fn copy(&self, before: Option<Arc<Element>>, after: Option<Arc<Element>>) -> Arc<Element> {
        Element::new(self.key_type, Arc::clone(&self.value), before, after)
    }

    fn value<K: PropertyKey>(&self) -> &K::Value {
        &self
            .value
            .as_any()
            .downcast_ref::<TypedValue<K>>()
            .expect("property list node does not hold a value of its key type")
            .value
    }

    /// Returns a node that looks up `element` before anything in `self`.
    fn by_prepending(self: &Arc<Element>, element: Option<Arc<Element>>) -> Arc<Element> {
        let element = match element {
            Some(element) => element,
            None => return Arc::clone(self),
        };

        if self.before.is_some() {
            Element::typed::<EmptyKey>((), Some(element), Some(Arc::clone(self)))
        } else {
            self.copy(Some(element), self.after.clone())
        }
    }

    fn matches(&self, other: &Element, ignored_types: &mut Vec<TypeId>) -> bool {
        if self.key_type != other.key_type {
            return false;
        }
        if ignored_types.contains(&self.key_type) {
            return true;
        }
        if !self.value.equals(&*other.value) {
            return false;
        }
        ignored_types.push(self.key_type);
        true
    }

    /// Visits nodes in lookup order, skipping subtrees that cannot contain `filter`.
    fn walk(
        &self,
        filter: BloomFilter,
        body: &mut dyn FnMut(&Element) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        let mut element = self;
        loop {
            if !element.filter.may_contain(filter) {
                return ControlFlow::Continue(());
            }
            if let Some(before) = &element.before {
                before.walk(filter, body)?;
            }
            body(element)?;
            match &element.after {
                Some(after) => element = after,
                None => return ControlFlow::Continue(()),
            }
        }
    }
}

// Unlinks nodes iteratively so dropping a long list does not recurse once per node.
impl Drop for Element {
    fn drop(&mut self) {
        let mut pending: Vec<Arc<Element>> =
            self.before.take().into_iter().chain(self.after.take()).collect();
        while let Some(link) = pending.pop() {
            if let Some(mut element) = Arc::into_inner(link) {
                pending.extend(element.before.take());
                pending.extend(element.after.take());
            }
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.value.describe(f)
    }
}

fn find<'a>(
    mut element: Option<&'a Arc<Element>>,
    key_type: TypeId,
    filter: BloomFilter,
) -> Option<&'a Element> {
    while let Some(current) = element {
        if !current.filter.may_contain(filter) {
            return None;
        }
        if let Some(found) = find(current.before.as_ref(), key_type, filter) {
            return Some(found);
        }
        if current.key_type == key_type {
            return Some(current);
        }
        element = current.after.as_ref();
    }
    None
}

fn find_with_secondary_lookup<L: PropertyKeyLookup>(
    mut element: Option<&Arc<Element>>,
    filter: BloomFilter,
    secondary_filter: BloomFilter,
) -> Option<<L::Primary as PropertyKey>::Value> {
    while let Some(current) = element {
        if !current.filter.may_contain(filter) && !current.filter.may_contain(secondary_filter) {
            return None;
        }
        let before = current.before.as_ref();
        if let Some(found) = find_with_secondary_lookup::<L>(before, filter, secondary_filter) {
            return Some(found);
        }
        if current.key_type == TypeId::of::<L::Primary>() {
            return Some(current.value::<L::Primary>().clone());
        }
        if current.key_type == TypeId::of::<L::Secondary>() {
            if let Some(value) = L::lookup(current.value::<L::Secondary>()) {
                return Some(value);
            }
        }
        element = current.after.as_ref();
    }
    None
}

fn lists_equal(lhs: &Arc<Element>, rhs: &Arc<Element>, ignored_types: &mut Vec<TypeId>) -> bool {
    let mut lhs = lhs;
    let mut rhs = rhs;
    loop {
        if lhs.length != rhs.length {
            return false;
        }
        if Arc::ptr_eq(lhs, rhs) {
            return true;
        }
        if !lhs.matches(rhs, ignored_types) {
            return false;
        }
        match (&lhs.before, &rhs.before) {
            (Some(a), Some(b)) => {
                if !lists_equal(a, b, ignored_types) {
                    return false;
                }
            }
            (None, None) => (),
            _ => return false,
        }
        match (&lhs.after, &rhs.after) {
            (Some(a), Some(b)) => {
                lhs = a;
                rhs = b;
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// An immutable, structurally-shared map from key types to values.
#[derive(Clone, Default)]
pub struct PropertyList {
    elements: Option<Arc<Element>>,
}

impl PropertyList {
    pub fn new() -> PropertyList {
        PropertyList { elements: None }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_none()
    }

    /// Number of nodes in the list, including shadowed entries and splice markers.
    pub fn len(&self) -> usize {
        self.elements.as_ref().map_or(0, |e| e.length)
    }

    /// Identity of the head node; [`UniqueId::INVALID`] for the empty list.
    pub fn id(&self) -> UniqueId {
        self.elements.as_ref().map_or(UniqueId::INVALID, |e| e.id)
    }

    fn find<K: PropertyKey>(&self) -> Option<&Element> {
        let key_type = TypeId::of::<K>();
        find(self.elements.as_ref(), key_type, BloomFilter::for_type(key_type))
    }

    /// Returns the value for `K`, if it was set.
    pub fn value_if_present<K: PropertyKey>(&self) -> Option<&K::Value> {
        self.find::<K>().map(|element| element.value::<K>())
    }

    /// Returns the value for `K`, or its default.
    pub fn get<K: PropertyKey>(&self) -> K::Value {
        match self.value_if_present::<K>() {
            Some(value) => value.clone(),
            None => K::default_value(),
        }
    }

    /// Sets the value for `K`. Does nothing if the current value is equal.
    pub fn set<K: PropertyKey>(&mut self, value: K::Value) {
        let unchanged = self
            .value_if_present::<K>()
            .map_or(false, |current| K::values_equal(&value, current));
        if !unchanged {
            self.prepend_value::<K>(value);
        }
    }

    /// Prepends a node for `K` without checking the current value.
    pub fn prepend_value<K: PropertyKey>(&mut self, value: K::Value) {
        self.elements = Some(Element::typed::<K>(value, None, self.elements.take()));
    }

    pub fn derived<K: DerivedPropertyKey>(&self) -> K::Value {
        K::value(self)
    }

    pub fn value_with_secondary_lookup<L: PropertyKeyLookup>(
        &self,
    ) -> <L::Primary as PropertyKey>::Value {
        let found = find_with_secondary_lookup::<L>(
            self.elements.as_ref(),
            BloomFilter::for_type(TypeId::of::<L::Primary>()),
            BloomFilter::for_type(TypeId::of::<L::Secondary>()),
        );
        found.unwrap_or_else(<L::Primary as PropertyKey>::default_value)
    }

    /// Makes every value in `other` take priority over the values in `self`.
    ///
    /// Shadowed values stay in the list.
    pub fn override_with(&mut self, other: &PropertyList) {
        self.elements = match &self.elements {
            Some(elements) => Some(elements.by_prepending(other.elements.clone())),
            None => other.elements.clone(),
        };
    }

    /// Assigns `other`, keeping the current identity if both are the same list.
    pub fn set_list(&mut self, other: &PropertyList) {
        if self.same_elements(other) {
            return;
        }
        self.elements = other.elements.clone();
    }

    fn same_elements(&self, other: &PropertyList) -> bool {
        match (&self.elements, &other.elements) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Calls `body` with every value stored for `K`, most recent first.
    pub fn for_each<K: PropertyKey>(&self, mut body: impl FnMut(&K::Value) -> ControlFlow<()>) {
        let elements = match &self.elements {
            Some(elements) => elements,
            None => return,
        };
        let key_type = TypeId::of::<K>();
        let _ = elements.walk(BloomFilter::for_type(key_type), &mut |element| {
            if element.key_type == key_type {
                body(element.value::<K>())
            } else {
                ControlFlow::Continue(())
            }
        });
    }

    /// Returns false only if both lists are known to hold the same values.
    pub fn may_not_be_equal(&self, other: &PropertyList) -> bool {
        let mut ignored_types = Vec::new();
        self.may_not_be_equal_ignoring(other, &mut ignored_types)
    }

    /// Like [`may_not_be_equal`](Self::may_not_be_equal), but skips value comparison for key types
    /// in `ignored_types` and records every key type it confirmed as equal.
    pub fn may_not_be_equal_ignoring(
        &self,
        other: &PropertyList,
        ignored_types: &mut Vec<TypeId>,
    ) -> bool {
        match (&self.elements, &other.elements) {
            (Some(lhs), Some(rhs)) => !lists_equal(lhs, rhs, ignored_types),
            (None, None) => false,
            _ => true,
        }
    }
}

impl fmt::Display for PropertyList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        if let Some(elements) = &self.elements {
            let mut first = true;
            let mut result = Ok(());
            let _ = elements.walk(BloomFilter::EMPTY, &mut |element| {
                if !first {
                    result = write!(f, ", ");
                }
                first = false;
                result = result.and_then(|_| write!(f, "{}", element));
                if result.is_err() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });
            result?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for PropertyList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PropertyList{}", self)
    }
}
