//! Transactions: ambient per-update configuration.

use crate::property_list::{PropertyKey, PropertyList};
use core::fmt;
use core::marker::PhantomData;
use std::cell::{Cell, RefCell};
use std::time::Duration;

/// A key into a [`Transaction`].
pub trait TransactionKey: 'static {
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    fn default_value() -> Self::Value;

    fn values_equal(lhs: &Self::Value, rhs: &Self::Value) -> bool {
        lhs == rhs
    }
}

/// Stores a transaction key in the transaction's property list.
pub struct TransactionPropertyKey<K>(PhantomData<fn() -> K>);

impl<K: TransactionKey> PropertyKey for TransactionPropertyKey<K> {
    type Value = K::Value;

    fn default_value() -> K::Value {
        K::default_value()
    }

    fn values_equal(lhs: &K::Value, rhs: &K::Value) -> bool {
        K::values_equal(lhs, rhs)
    }
}

/// Describes an animation. Curves are interpreted by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub duration: Duration,
    pub delay: Duration,
    pub speed: f64,
}

impl Animation {
    pub fn new(duration: Duration) -> Animation {
        Animation {
            duration,
            delay: Duration::ZERO,
            speed: 1.,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Animation {
        self.delay = delay;
        self
    }

    pub fn speed(mut self, speed: f64) -> Animation {
        self.speed = speed;
        self
    }
}

impl Default for Animation {
    fn default() -> Animation {
        Animation::new(Duration::from_millis(350))
    }
}

/// The animation of a transaction.
pub struct AnimationKey;

impl TransactionKey for AnimationKey {
    type Value = Option<Animation>;

    fn default_value() -> Option<Animation> {
        None
    }
}

/// Whether animations are disabled in a transaction.
pub struct DisablesAnimationsKey;

impl TransactionKey for DisablesAnimationsKey {
    type Value = bool;

    fn default_value() -> bool {
        false
    }
}

/// Identifies the transactions created by one thread between two barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u32);

thread_local! {
    static CURRENT: RefCell<Transaction> = RefCell::new(Transaction::new());
    static THREAD_TRANSACTION_ID: Cell<u32> = Cell::new(1);
}

impl TransactionId {
    /// The id of the calling thread's transactions.
    pub fn current() -> TransactionId {
        TransactionId(THREAD_TRANSACTION_ID.with(Cell::get))
    }

    /// Starts a new id for the calling thread, so subsequent transactions are not concatenated with
    /// earlier ones.
    pub fn barrier() {
        THREAD_TRANSACTION_ID.with(|id| id.set(id.get().wrapping_add(1)));
    }
}

/// Per-update configuration, such as the animation to apply to the changes of an update.
#[derive(Clone, Default)]
pub struct Transaction {
    plist: PropertyList,
}

impl Transaction {
    pub fn new() -> Transaction {
        Transaction {
            plist: PropertyList::new(),
        }
    }

    pub fn from_plist(plist: PropertyList) -> Transaction {
        Transaction { plist }
    }

    pub fn with_animation(animation: Option<Animation>) -> Transaction {
        let mut transaction = Transaction::new();
        transaction.set_animation(animation);
        transaction
    }

    pub fn plist(&self) -> &PropertyList {
        &self.plist
    }

    pub fn is_empty(&self) -> bool {
        self.plist.is_empty()
    }

    pub fn get<K: TransactionKey>(&self) -> K::Value {
        self.plist.get::<TransactionPropertyKey<K>>()
    }

    pub fn set_value<K: TransactionKey>(&mut self, value: K::Value) {
        self.plist.set::<TransactionPropertyKey<K>>(value);
    }

    pub fn animation(&self) -> Option<Animation> {
        self.get::<AnimationKey>()
    }

    pub fn set_animation(&mut self, animation: Option<Animation>) {
        self.set_value::<AnimationKey>(animation);
    }

    pub fn disables_animations(&self) -> bool {
        self.get::<DisablesAnimationsKey>()
    }

    pub fn set_disables_animations(&mut self, disables: bool) {
        self.set_value::<DisablesAnimationsKey>(disables);
    }

    /// Makes the values of `other` take priority.
    pub fn override_with(&mut self, other: &Transaction) {
        self.plist.override_with(&other.plist);
    }

    /// Replaces this transaction with `other`.
    pub fn set(&mut self, other: &Transaction) {
        self.plist.set_list(&other.plist);
    }

    /// Whether mutations made under `other` may be merged into a pending update made under
    /// `self`.
    pub fn may_concatenate(&self, other: &Transaction) -> bool {
        !self.plist.may_not_be_equal(&other.plist)
    }

    /// A copy of the calling thread's current transaction.
    pub fn current() -> Transaction {
        CURRENT.with(|current| current.borrow().clone())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Transaction{}", self.plist)
    }
}

/// Restores the previous current transaction when dropped.
struct TransactionScope {
    previous: Option<Transaction>,
}

impl TransactionScope {
    fn push(transaction: &Transaction) -> TransactionScope {
        let previous = CURRENT.with(|current| {
            let mut merged = current.borrow().clone();
            merged.override_with(transaction);
            current.replace(merged)
        });
        TransactionScope {
            previous: Some(previous),
        }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // the thread-local may already be gone during thread teardown
            let _ = CURRENT.try_with(|current| current.replace(previous));
        }
    }
}

/// Runs `body` with `transaction` merged over the current transaction.
///
/// The previous transaction is restored when `body` returns or unwinds.
pub fn with_transaction<R>(transaction: &Transaction, body: impl FnOnce() -> R) -> R {
    let _scope = TransactionScope::push(transaction);
    body()
}

/// Runs `body` with a single transaction value set.
pub fn with_transaction_value<K: TransactionKey, R>(
    value: K::Value,
    body: impl FnOnce() -> R,
) -> R {
    let mut transaction = Transaction::new();
    transaction.set_value::<K>(value);
    with_transaction(&transaction, body)
}

/// Runs `body` in a transaction with the given animation.
pub fn with_animation<R>(animation: Option<Animation>, body: impl FnOnce() -> R) -> R {
    with_transaction(&Transaction::with_animation(animation), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn values() {
        let mut transaction = Transaction::new();
        assert!(transaction.is_empty());
        assert_eq!(transaction.animation(), None);
        transaction.set_disables_animations(true);
        assert!(transaction.disables_animations());
        assert_eq!(
            transaction.plist().to_string(),
            "[TransactionPropertyKey<DisablesAnimationsKey> = true]"
        );
    }

    #[test]
    fn scoped_current_transaction() {
        assert!(Transaction::current().is_empty());
        let animation = Some(Animation::default());

        with_animation(animation.clone(), || {
            assert_eq!(Transaction::current().animation(), animation);
            with_transaction_value::<DisablesAnimationsKey, _>(true, || {
                let current = Transaction::current();
                assert!(current.disables_animations());
                assert_eq!(current.animation(), animation, "outer values stay visible");
            });
            assert!(!Transaction::current().disables_animations());
        });
        assert!(Transaction::current().is_empty(), "restored after the scope");
    }

    #[test]
    fn restored_after_panic() {
        let result = panic::catch_unwind(|| {
            with_transaction_value::<DisablesAnimationsKey, _>(true, || panic!("boom"));
        });
        assert!(result.is_err());
        assert!(!Transaction::current().disables_animations());
    }

    #[test]
    fn concatenation() {
        let a = Transaction::with_animation(Some(Animation::default()));
        let b = Transaction::with_animation(Some(Animation::default()));
        let c = Transaction::with_animation(None);
        assert!(a.may_concatenate(&b));
        assert!(!a.may_concatenate(&c));
        assert!(Transaction::new().may_concatenate(&Transaction::new()));
    }

    #[test]
    fn barrier_changes_id() {
        let id = TransactionId::current();
        assert_eq!(id, TransactionId::current());
        TransactionId::barrier();
        assert_ne!(id, TransactionId::current());
    }
}
