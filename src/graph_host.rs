//! Hosting an attribute graph.
//!
//! A [`GraphHost`] owns a [`Graph`] together with its inputs (time, environment, transaction,
//! phase) and runs transactions against it: batches of mutations applied under a
//! [`Transaction`], followed by a bounded transactional update that drains continuations.
//!
//! Mutations may be queued from other code paths as async transactions, which are concatenated
//! when possible and applied by [`GraphHost::flush_transactions`]. Other threads queue them
//! through a [`TransactionSender`].

use crate::config::Config;
use crate::environment::EnvironmentValues;
use crate::error::ViewGraphError;
use crate::graph::{
    AttributeId, Continuation, Graph, NextUpdate, SubgraphFlags, Time, UpdateContext,
};
use crate::preference::{PreferenceKey, PreferenceKeys, PreferenceList};
use crate::transaction::{self, Transaction, TransactionId};
use crate::update;
use crate::version_seed::VersionSeed;
use bitflags::bitflags;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use std::mem;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, trace};

/// Phase of the graph's inputs; bumping the reset seed resets stateful views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Phase {
    pub reset_seed: u32,
}

/// The inputs a host provides to its graph.
#[derive(Debug, Clone, Default)]
pub struct HostData {
    pub time: Time,
    pub environment: EnvironmentValues,
    pub phase: Phase,
    /// The transaction being run, or an empty one outside of transactions.
    pub transaction: Transaction,
    pub update_seed: u32,
    pub transaction_seed: u32,
    pub host_preference_keys: PreferenceKeys,
    pub is_removed: bool,
    pub is_hidden_for_reuse: bool,
}

bitflags! {
    /// Why a host is detached from its parent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RemovedState: u8 {
        const UNATTACHED = 1;
        const HIDDEN_FOR_REUSE = 1 << 1;
    }
}

/// Receives notifications from a graph host.
///
/// Delegates are held weakly.
pub trait GraphDelegate: Send + Sync {
    /// The graph needs to be updated.
    fn graph_did_change(&self) {}

    /// An async transaction was queued on a host without pending transactions. The delegate
    /// should arrange for [`GraphHost::flush_transactions`] to be called.
    fn begin_transaction(&self) {}
}

type DelegateSlot = Arc<RwLock<Option<Weak<dyn GraphDelegate>>>>;

fn delegate_of(slot: &DelegateSlot) -> Option<Arc<dyn GraphDelegate>> {
    slot.read().as_ref().and_then(Weak::upgrade)
}

/// A change to apply to a graph inside a transaction.
pub enum Mutation<G> {
    Custom(Continuation<G>),
    /// Invalidates an attribute's value.
    Invalidating(AttributeId),
    /// Forces a transaction without changing anything.
    Empty,
}

impl<G: Graph> Mutation<G> {
    pub fn custom(
        body: impl FnOnce(&mut G, &mut UpdateContext<'_, G>) + Send + 'static,
    ) -> Mutation<G> {
        Mutation::Custom(Box::new(body))
    }

    /// Absorbs `other` if applying both is the same as applying `self`.
    fn combine(&self, other: &Mutation<G>) -> bool {
        match (self, other) {
            (Mutation::Invalidating(a), Mutation::Invalidating(b)) => a == b,
            (Mutation::Empty, Mutation::Empty) => true,
            _ => false,
        }
    }

    fn apply(self, graph: &mut G, cx: &mut UpdateContext<'_, G>) {
        match self {
            Mutation::Custom(body) => body(graph, cx),
            Mutation::Invalidating(attribute) => graph.invalidate_value(attribute),
            Mutation::Empty => (),
        }
    }
}

/// When a mutation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStyle {
    /// Flush right away unless the graph is being updated.
    Immediate,
    /// Wait for the next flush.
    Deferred,
}

/// Mutations queued to be applied under one transaction.
pub struct AsyncTransaction<G> {
    transaction: Transaction,
    id: TransactionId,
    mutations: Vec<Mutation<G>>,
}

impl<G: Graph> AsyncTransaction<G> {
    fn new(
        transaction: Transaction,
        id: TransactionId,
        mutation: Mutation<G>,
    ) -> AsyncTransaction<G> {
        AsyncTransaction {
            transaction,
            id,
            mutations: vec![mutation],
        }
    }

    fn append(&mut self, mutation: Mutation<G>) {
        match self.mutations.last() {
            Some(last) if last.combine(&mutation) => (),
            _ => self.mutations.push(mutation),
        }
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Queues async transactions on a graph host from any thread.
pub struct TransactionSender<G> {
    sender: Sender<AsyncTransaction<G>>,
    delegate: DelegateSlot,
    thread: ThreadId,
}

impl<G> Clone for TransactionSender<G> {
    fn clone(&self) -> TransactionSender<G> {
        TransactionSender {
            sender: self.sender.clone(),
            delegate: Arc::clone(&self.delegate),
            thread: self.thread,
        }
    }
}

impl<G: Graph> TransactionSender<G> {
    /// Queues `mutation` to be applied under `transaction`.
    ///
    /// Mutating the graph from a thread other than the host's is undefined behavior; it is
    /// reported as a runtime issue and proceeds anyway.
    pub fn send(
        &self,
        transaction: Transaction,
        mutation: Mutation<G>,
    ) -> Result<(), ViewGraphError> {
        let current = thread::current().id();
        if current != self.thread {
            runtime_issue!(
                expected = ?self.thread,
                actual = ?current,
                "graph mutated from a background thread; mutations must happen on the host's thread"
            );
        }
        let id = TransactionId::current();
        self.sender
            .send(AsyncTransaction::new(transaction, id, mutation))
            .map_err(|_| ViewGraphError::Invalidated)?;
        if let Some(delegate) = delegate_of(&self.delegate) {
            delegate.begin_transaction();
        }
        Ok(())
    }
}

/// Owns a graph and runs transactions on it.
pub struct GraphHost<G: Graph> {
    graph: Option<G>,
    data: HostData,
    config: Config,
    continuations: Vec<Continuation<G>>,
    next_update: NextUpdate,
    pending_transactions: Vec<AsyncTransaction<G>>,
    sender: Sender<AsyncTransaction<G>>,
    receiver: Receiver<AsyncTransaction<G>>,
    is_instantiated: bool,
    in_transaction: bool,
    may_defer_update: bool,
    last_host_preferences_seed: VersionSeed,
    removed_state: RemovedState,
    delegate: DelegateSlot,
    thread: ThreadId,
}

impl<G: Graph> GraphHost<G> {
    pub fn new(graph: G) -> GraphHost<G> {
        GraphHost::with_config(graph, Config::global().clone())
    }

    pub fn with_config(graph: G, config: Config) -> GraphHost<G> {
        let (sender, receiver) = channel::unbounded();

        GraphHost {
            graph: Some(graph),
            data: HostData::default(),
            config,
            continuations: Vec::new(),
            next_update: NextUpdate::default(),
            pending_transactions: Vec::new(),
            sender,
            receiver,
            is_instantiated: false,
            in_transaction: false,
            may_defer_update: true,
            last_host_preferences_seed: VersionSeed::INVALID,
            removed_state: RemovedState::empty(),
            delegate: Arc::new(RwLock::new(None)),
            thread: thread::current().id(),
        }
    }

    pub fn graph(&self) -> Option<&G> {
        self.graph.as_ref()
    }

    pub fn graph_mut(&mut self) -> Option<&mut G> {
        self.graph.as_mut()
    }

    pub fn data(&self) -> &HostData {
        &self.data
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The thread the host was created on.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn is_valid(&self) -> bool {
        self.graph.is_some()
    }

    pub fn is_instantiated(&self) -> bool {
        self.is_instantiated
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn may_defer_update(&self) -> bool {
        self.may_defer_update
    }

    pub fn next_update(&self) -> &NextUpdate {
        &self.next_update
    }

    pub fn set_delegate(&mut self, delegate: Weak<dyn GraphDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    fn delegate(&self) -> Option<Arc<dyn GraphDelegate>> {
        delegate_of(&self.delegate)
    }

    /// Runs `body` with the graph and an update context, if the host is valid.
    pub(crate) fn with_context<R>(
        &mut self,
        body: impl FnOnce(&mut G, &mut UpdateContext<'_, G>) -> R,
    ) -> Option<R> {
        let GraphHost {
            graph,
            data,
            continuations,
            next_update,
            ..
        } = self;
        let graph = graph.as_mut()?;
        let mut cx = UpdateContext {
            data: &*data,
            continuations,
            next_update,
        };
        Some(body(graph, &mut cx))
    }

    fn inputs_did_change(&mut self) {
        if let Some(graph) = &mut self.graph {
            graph.inputs_did_change(&self.data);
        }
    }

    pub fn instantiate(&mut self) {
        if self.is_instantiated {
            return;
        }
        if let Some(graph) = &mut self.graph {
            debug!("instantiating graph outputs");
            graph.instantiate_outputs(&self.data);
            self.is_instantiated = true;
        }
    }

    pub fn uninstantiate(&mut self) {
        if !self.is_instantiated {
            return;
        }
        if let Some(graph) = &mut self.graph {
            debug!("uninstantiating graph outputs");
            graph.uninstantiate_outputs();
        }
        self.is_instantiated = false;
    }

    /// Tears down the graph. The host can no longer be updated.
    pub fn invalidate(&mut self) {
        if !self.is_valid() {
            return;
        }
        update::perform(|| {
            self.uninstantiate();
            self.graph = None;
        });
        self.continuations.clear();
        self.pending_transactions.clear();
        debug!("graph host invalidated");
    }

    /// Sets the time. Returns false if it did not change.
    ///
    /// A new time drops the scheduled next update.
    pub fn set_time(&mut self, time: Time) -> bool {
        if self.data.time == time {
            return false;
        }
        self.data.time = time;
        self.next_update = NextUpdate::default();
        self.inputs_did_change();
        true
    }

    pub fn environment(&self) -> &EnvironmentValues {
        &self.data.environment
    }

    pub fn set_environment(&mut self, environment: EnvironmentValues) {
        self.data.environment = environment;
        self.inputs_did_change();
    }

    /// Resets the state of every stateful node.
    pub fn increment_phase(&mut self) {
        self.data.phase.reset_seed = self.data.phase.reset_seed.wrapping_add(1);
        self.inputs_did_change();
        if let Some(delegate) = self.delegate() {
            delegate.graph_did_change();
        }
    }

    pub(crate) fn begin_next_update(&mut self, time: Time) {
        self.set_time(time);
        self.data.update_seed = self.data.update_seed.wrapping_add(1);
    }

    pub fn removed_state(&self) -> RemovedState {
        self.removed_state
    }

    pub fn set_removed_state(&mut self, state: RemovedState) {
        self.removed_state = state;
        let is_removed = !state.is_empty();
        let is_hidden_for_reuse = state.contains(RemovedState::HIDDEN_FOR_REUSE);
        if is_removed == self.data.is_removed
            && is_hidden_for_reuse == self.data.is_hidden_for_reuse
        {
            return;
        }
        self.data.is_removed = is_removed;
        self.data.is_hidden_for_reuse = is_hidden_for_reuse;
        if let Some(graph) = &mut self.graph {
            graph.removed_state_did_change(is_removed, is_hidden_for_reuse);
        }
    }

    /// Marks the graph as needing an update.
    pub fn set_needs_update(&mut self, may_defer_update: bool) {
        self.may_defer_update = self.may_defer_update && may_defer_update;
        if let Some(delegate) = self.delegate() {
            delegate.graph_did_change();
        }
    }

    /// Returns a handle for queueing transactions from other threads.
    pub fn sender(&self) -> TransactionSender<G> {
        TransactionSender {
            sender: self.sender.clone(),
            delegate: Arc::clone(&self.delegate),
            thread: self.thread,
        }
    }

    pub fn has_pending_transactions(&self) -> bool {
        !self.pending_transactions.is_empty() || !self.receiver.is_empty()
    }

    /// Queues `mutation` to be applied under `transaction`.
    ///
    /// The mutation joins the last pending transaction if it has the same id and an equal
    /// transaction. Immediate mutations flush right away unless an update is running.
    pub fn async_transaction(
        &mut self,
        transaction: Transaction,
        id: TransactionId,
        mutation: Mutation<G>,
        style: MutationStyle,
        may_defer_update: bool,
    ) {
        let _lock = update::lock();
        if !self.is_valid() {
            return;
        }
        self.receive_transactions();

        let defers = match style {
            MutationStyle::Immediate => update::thread_is_updating(),
            MutationStyle::Deferred => true,
        };
        self.may_defer_update = self.may_defer_update || may_defer_update;

        if let Some(last) = self.pending_transactions.last_mut() {
            if last.id == id && last.transaction.may_concatenate(&transaction) {
                last.append(mutation);
                if !defers {
                    let last = self.pending_transactions.pop();
                    self.flush_transactions();
                    self.pending_transactions.extend(last);
                }
                return;
            }
            if !defers {
                self.flush_transactions();
            }
        } else if let Some(delegate) = self.delegate() {
            delegate.begin_transaction();
        }
        self.pending_transactions
            .push(AsyncTransaction::new(transaction, id, mutation));
    }

    /// Queues a custom mutation under an empty transaction.
    pub fn async_mutation(
        &mut self,
        body: impl FnOnce(&mut G, &mut UpdateContext<'_, G>) + Send + 'static,
    ) {
        self.async_transaction(
            Transaction::new(),
            TransactionId::current(),
            Mutation::custom(body),
            MutationStyle::Deferred,
            true,
        );
    }

    /// Queues the invalidation of `attribute`.
    pub fn async_invalidation(
        &mut self,
        transaction: Transaction,
        attribute: AttributeId,
        style: MutationStyle,
    ) {
        self.async_transaction(
            transaction,
            TransactionId::current(),
            Mutation::Invalidating(attribute),
            style,
            true,
        );
    }

    /// Queues a transaction that changes nothing, so the graph updates under `transaction`.
    pub fn empty_transaction(&mut self, transaction: Transaction) {
        self.async_transaction(
            transaction,
            TransactionId::current(),
            Mutation::Empty,
            MutationStyle::Deferred,
            true,
        );
    }

    /// Runs `body` as part of the current transaction, or in a new async transaction if none is
    /// running.
    pub fn continue_transaction(
        &mut self,
        body: impl FnOnce(&mut G, &mut UpdateContext<'_, G>) + Send + 'static,
    ) {
        update::assert_is_locked();
        if self.in_transaction {
            self.continuations.push(Box::new(body));
        } else {
            self.async_mutation(body);
        }
    }

    fn receive_transactions(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(transaction) => match self.pending_transactions.last_mut() {
                    Some(last)
                        if last.id == transaction.id
                            && last.transaction.may_concatenate(&transaction.transaction) =>
                    {
                        for mutation in transaction.mutations {
                            last.append(mutation);
                        }
                    }
                    _ => self.pending_transactions.push(transaction),
                },
                Err(TryRecvError::Empty) => break,
                // the host holds a sender itself
                Err(TryRecvError::Disconnected) => unreachable!("transaction channel disconnected"),
            }
        }
    }

    /// Applies all pending async transactions, in order.
    pub fn flush_transactions(&mut self) {
        self.receive_transactions();
        if !self.is_valid() {
            self.pending_transactions.clear();
            return;
        }
        if self.pending_transactions.is_empty() {
            return;
        }

        let transactions = mem::take(&mut self.pending_transactions);
        debug!(count = transactions.len(), "flushing transactions");
        update::perform(|| {
            for AsyncTransaction {
                transaction,
                mutations,
                ..
            } in transactions
            {
                self.run_transaction(Some(&transaction), |graph, cx| {
                    transaction::with_transaction(&transaction, || {
                        for mutation in mutations {
                            mutation.apply(graph, cx);
                        }
                    })
                });
            }
        });

        if let Some(delegate) = self.delegate() {
            delegate.graph_did_change();
        }
        self.may_defer_update = true;
    }

    /// Runs `body`, then updates the transactional nodes of the graph.
    ///
    /// A non-empty `transaction` is visible as [`HostData::transaction`] while this runs.
    pub fn run_transaction(
        &mut self,
        transaction: Option<&Transaction>,
        body: impl FnOnce(&mut G, &mut UpdateContext<'_, G>),
    ) {
        self.instantiate();
        let transaction = transaction.filter(|transaction| !transaction.is_empty());
        if let Some(transaction) = transaction {
            self.data.transaction = transaction.clone();
        }
        self.start_transaction_update();
        self.with_context(body);
        self.finish_transaction_update();
        if transaction.is_some() {
            self.data.transaction = Transaction::new();
        }
    }

    pub fn start_transaction_update(&mut self) {
        self.in_transaction = true;
        self.data.transaction_seed = self.data.transaction_seed.wrapping_add(1);
    }

    /// Drains continuations and updates transactional nodes until no continuations remain, at
    /// most [`Config::max_continuation_passes`] times.
    pub fn finish_transaction_update(&mut self) {
        let passes = self.run_continuations(SubgraphFlags::TRANSACTIONAL);
        trace!(passes, "finished transaction update");
        self.in_transaction = false;
    }

    /// Runs pending continuations and updates the nodes selected by `flags`, repeating while
    /// continuations remain. Returns the number of passes.
    pub(crate) fn run_continuations(&mut self, flags: SubgraphFlags) -> u32 {
        let max_passes = self.config.max_continuation_passes.max(1);
        let mut passes = 0;
        loop {
            let continuations = mem::take(&mut self.continuations);
            passes += 1;
            let updated = self.with_context(|graph, cx| {
                for continuation in continuations {
                    continuation(graph, cx);
                }
                graph.update(flags, cx);
            });
            if updated.is_none() || self.continuations.is_empty() || passes == max_passes {
                return passes;
            }
        }
    }

    /// Runs continuations and updates the active nodes, as one inner loop of a view graph update.
    pub(crate) fn update_active(&mut self) -> u32 {
        self.in_transaction = true;
        let passes = self.run_continuations(SubgraphFlags::ACTIVE);
        self.in_transaction = false;
        passes
    }

    pub(crate) fn has_continuations(&self) -> bool {
        !self.continuations.is_empty()
    }

    /// Whether transactional nodes need to be updated.
    pub fn needs_transaction(&self) -> bool {
        self.graph
            .as_ref()
            .map_or(false, |graph| graph.is_dirty(SubgraphFlags::TRANSACTIONAL))
    }

    /// Requests that the graph produce the values of `K` for the host.
    pub fn add_preference<K: PreferenceKey>(&mut self) {
        if !self.data.host_preference_keys.contains::<K>() {
            self.data.host_preference_keys.add::<K>();
            self.inputs_did_change();
        }
    }

    pub fn remove_preference<K: PreferenceKey>(&mut self) {
        if self.data.host_preference_keys.contains::<K>() {
            self.data.host_preference_keys.remove::<K>();
            self.inputs_did_change();
        }
    }

    /// The host preference values the graph produced.
    pub fn preference_values(&mut self) -> PreferenceList {
        self.instantiate();
        self.graph
            .as_ref()
            .and_then(G::host_preference_values)
            .unwrap_or_default()
    }

    /// The value of one host preference, requesting it for the duration of the call if needed.
    pub fn preference_value<K: PreferenceKey>(&mut self) -> K::Value {
        if self.data.host_preference_keys.contains::<K>() {
            return self.preference_values().get::<K>().value;
        }
        self.add_preference::<K>();
        let value = self.preference_values().get::<K>().value;
        self.remove_preference::<K>();
        value
    }

    /// Records the seed of the host preference values. Returns true if it changed since the last
    /// call and neither seed is invalid.
    pub fn update_preferences(&mut self) -> bool {
        let seed = self
            .graph
            .as_ref()
            .and_then(G::host_preference_values)
            .map_or(VersionSeed::EMPTY, |values| values.seed());
        let last_seed = mem::replace(&mut self.last_host_preferences_seed, seed);
        !seed.is_invalid() && !last_seed.is_invalid() && seed.value() != last_seed.value()
    }
}

impl<G: Graph> Drop for GraphHost<G> {
    fn drop(&mut self) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::PreferenceValue;
    use crate::transaction::Animation;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    preference_key! {
        TitleKey: String = String::new(), |value, next| { value.push_str(&next()); };
    }

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    struct TestGraph {
        log: Log,
        preferences: Option<PreferenceList>,
        dirty: bool,
    }

    impl TestGraph {
        fn new(log: &Log) -> TestGraph {
            TestGraph {
                log: Arc::clone(log),
                ..TestGraph::default()
            }
        }

        fn push(&self, entry: impl Into<String>) {
            self.log.lock().push(entry.into());
        }
    }

    impl Graph for TestGraph {
        fn instantiate_outputs(&mut self, _data: &HostData) {
            self.push("instantiate");
        }

        fn uninstantiate_outputs(&mut self) {
            self.push("uninstantiate");
        }

        fn update(&mut self, flags: SubgraphFlags, cx: &mut UpdateContext<'_, TestGraph>) {
            let subgraph = if flags == SubgraphFlags::ACTIVE { "active" } else { "transactional" };
            self.push(format!("update {} seed {}", subgraph, cx.data().transaction_seed));
        }

        fn is_dirty(&self, _flags: SubgraphFlags) -> bool {
            self.dirty
        }

        fn invalidate_value(&mut self, attribute: AttributeId) {
            self.push(format!("invalidate {}", attribute));
        }

        fn host_preference_values(&self) -> Option<PreferenceList> {
            self.preferences.clone()
        }
    }

    fn host() -> (GraphHost<TestGraph>, Log) {
        let log = Log::default();
        (GraphHost::with_config(TestGraph::new(&log), Config::default()), log)
    }

    #[derive(Default)]
    struct Delegate {
        began: AtomicUsize,
        changed: AtomicUsize,
    }

    impl GraphDelegate for Delegate {
        fn graph_did_change(&self) {
            self.changed.fetch_add(1, Ordering::SeqCst);
        }

        fn begin_transaction(&self) {
            self.began.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn instantiate_once_and_invalidate() {
        let (mut host, log) = host();
        host.instantiate();
        host.instantiate();
        assert!(host.is_instantiated());
        host.invalidate();
        assert!(!host.is_valid());
        assert_eq!(*log.lock(), vec!["instantiate", "uninstantiate"]);
    }

    #[test]
    fn transaction_runs_continuations_in_order() {
        let (mut host, log) = host();
        host.run_transaction(None, |graph, cx| {
            graph.push("body");
            cx.continue_transaction(|graph, cx| {
                graph.push("first");
                cx.continue_transaction(|graph, _| graph.push("third"));
            });
            cx.continue_transaction(|graph, _| graph.push("second"));
        });
        assert!(!host.in_transaction());
        assert_eq!(
            *log.lock(),
            vec![
                "instantiate",
                "body",
                "first",
                "second",
                "update transactional seed 1",
                "third",
                "update transactional seed 1",
            ]
        );
    }

    fn requeue(graph: &mut TestGraph, cx: &mut UpdateContext<'_, TestGraph>) {
        graph.push("again");
        cx.continue_transaction(requeue);
    }

    #[test]
    fn continuation_passes_are_bounded() {
        let (mut host, log) = host();
        host.run_transaction(None, |_, cx| cx.continue_transaction(requeue));
        let log = log.lock();
        let updates = log.iter().filter(|entry| entry.starts_with("update")).count();
        assert_eq!(updates, 8);
        assert!(host.has_continuations(), "the last continuation is left for the next update");
    }

    #[test]
    fn async_transactions_concatenate() {
        let (mut host, log) = host();
        let delegate = Arc::new(Delegate::default());
        let weak: Weak<Delegate> = Arc::downgrade(&delegate);
        host.set_delegate(weak);

        let animated = Transaction::with_animation(Some(Animation::default()));
        let id = TransactionId::current();
        let a = AttributeId::new(1);
        for _ in 0..2 {
            host.async_transaction(
                animated.clone(),
                id,
                Mutation::Invalidating(a),
                MutationStyle::Deferred,
                true,
            );
        }
        host.async_transaction(
            animated.clone(),
            id,
            Mutation::Invalidating(AttributeId::new(2)),
            MutationStyle::Deferred,
            true,
        );
        host.async_transaction(
            animated.clone(),
            id,
            Mutation::custom(|graph: &mut TestGraph, cx| {
                let animation = Transaction::current().animation();
                graph.push(format!("animated {}", animation.is_some()));
                assert!(cx.data().transaction.animation().is_some());
            }),
            MutationStyle::Deferred,
            true,
        );
        assert_eq!(host.pending_transactions.len(), 1);
        assert_eq!(host.pending_transactions[0].len(), 3);
        assert_eq!(delegate.began.load(Ordering::SeqCst), 1);

        host.async_transaction(
            Transaction::new(),
            id,
            Mutation::Empty,
            MutationStyle::Deferred,
            true,
        );
        assert_eq!(host.pending_transactions.len(), 2, "different transactions do not concatenate");

        host.flush_transactions();
        assert!(!host.has_pending_transactions());
        assert_eq!(delegate.changed.load(Ordering::SeqCst), 1);
        assert!(host.data().transaction.is_empty());
        assert_eq!(host.data().transaction_seed, 2);
        assert_eq!(
            *log.lock(),
            vec![
                "instantiate",
                "invalidate #1",
                "invalidate #2",
                "animated true",
                "update transactional seed 1",
                "update transactional seed 2",
            ]
        );
    }

    #[test]
    fn continue_outside_transaction_queues() {
        let (mut host, log) = host();
        update::ensure(|| host.continue_transaction(|graph, _| graph.push("continued")));
        assert!(host.has_pending_transactions());
        host.flush_transactions();
        assert!(log.lock().contains(&"continued".to_string()));
    }

    #[test]
    fn sender_delivers_from_other_threads() {
        let (mut host, log) = host();
        let sender = host.sender();
        thread::spawn(move || {
            let mutation = Mutation::custom(|graph: &mut TestGraph, _| graph.push("remote"));
            sender.send(Transaction::new(), mutation).unwrap();
        })
        .join()
        .unwrap();
        assert!(host.has_pending_transactions());
        host.flush_transactions();
        assert!(log.lock().contains(&"remote".to_string()));

        let sender = host.sender();
        drop(host);
        assert_eq!(
            sender.send(Transaction::new(), Mutation::Empty),
            Err(ViewGraphError::Invalidated)
        );
    }

    #[test]
    fn preferences_change_by_seed() {
        let (mut host, _) = host();
        assert!(!host.update_preferences(), "no previous seed");

        let mut values = PreferenceList::new();
        values.set::<TitleKey>(PreferenceValue::new("a".to_string(), VersionSeed::new(3)));
        host.graph_mut().unwrap().preferences = Some(values.clone());
        assert!(host.update_preferences());
        assert!(!host.update_preferences());

        host.add_preference::<TitleKey>();
        assert!(host.data().host_preference_keys.contains::<TitleKey>());
        assert_eq!(host.preference_value::<TitleKey>(), "a");
        host.remove_preference::<TitleKey>();
        assert_eq!(host.preference_value::<TitleKey>(), "a");
        assert!(host.data().host_preference_keys.is_empty());
    }

    #[test]
    fn time_and_removed_state() {
        let (mut host, _) = host();
        host.next_update.at(Time(1.));
        assert!(host.set_time(Time(0.5)));
        assert!(!host.next_update().is_scheduled());
        assert!(!host.set_time(Time(0.5)));

        host.set_removed_state(RemovedState::HIDDEN_FOR_REUSE);
        assert!(host.data().is_removed);
        assert!(host.data().is_hidden_for_reuse);
        host.set_removed_state(RemovedState::empty());
        assert!(!host.data().is_removed);

        host.increment_phase();
        assert_eq!(host.data().phase.reset_seed, 1);
    }
}
