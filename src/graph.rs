//! The attribute graph seam.
//!
//! The dependency-tracking engine that evaluates view attributes is provided by the embedder
//! through the [`Graph`] trait. The host drives it: it asks the graph to bring its active nodes up
//! to date, runs deferred work the graph queued while updating, and reads back the aggregate
//! outputs (host preferences, the root layout computer, changed outputs).

use crate::graph_host::HostData;
use crate::layout::LayoutComputer;
use crate::preference::PreferenceList;
use crate::view_graph::Outputs;
use bitflags::bitflags;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt;
use std::ops;

/// Identifies a node of the attribute graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeId(u32);

thread_local! {
    static CURRENT_ATTRIBUTE: Cell<AttributeId> = Cell::new(AttributeId::NIL);
}

impl AttributeId {
    pub const NIL: AttributeId = AttributeId(0);

    pub fn new(raw: u32) -> AttributeId {
        AttributeId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// The attribute whose rule is being evaluated on this thread.
    pub fn current() -> AttributeId {
        CURRENT_ATTRIBUTE.with(Cell::get)
    }

    /// Runs `body` with this attribute as the current one.
    pub fn with_current<R>(self, body: impl FnOnce() -> R) -> R {
        struct Restore(AttributeId);

        impl Drop for Restore {
            fn drop(&mut self) {
                CURRENT_ATTRIBUTE.with(|current| current.set(self.0));
            }
        }

        let _restore = Restore(CURRENT_ATTRIBUTE.with(|current| current.replace(self)));
        body()
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Selects which nodes of a subgraph an update or dirtiness check concerns.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SubgraphFlags: u32 {
        /// Nodes that produce the host's outputs.
        const ACTIVE = 1;
        /// Nodes that must be updated within a transaction.
        const TRANSACTIONAL = 1 << 1;
    }
}

/// A point in time, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Time(pub f64);

impl Time {
    pub const ZERO: Time = Time(0.);
    pub const INFINITY: Time = Time(f64::INFINITY);

    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl ops::Add<f64> for Time {
    type Output = Time;
    fn add(self, seconds: f64) -> Time {
        Time(self.0 + seconds)
    }
}

/// When the graph wants to be updated next, e.g. for an animation.
#[derive(Debug, Clone, PartialEq)]
pub struct NextUpdate {
    pub time: Time,
    interval: f64,
    pub reasons: BTreeSet<u32>,
}

impl NextUpdate {
    pub fn new(time: Time) -> NextUpdate {
        NextUpdate {
            time,
            interval: f64::INFINITY,
            reasons: BTreeSet::new(),
        }
    }

    /// Requests an update no later than `time`.
    pub fn at(&mut self, time: Time) {
        if time < self.time {
            self.time = time;
        }
    }

    /// Requests repeated updates every `interval` seconds.
    ///
    /// A zero interval only drops an interval longer than one frame.
    pub fn interval(&mut self, interval: f64, reason: Option<u32>) {
        if interval == 0. {
            if self.interval > 1. / 60. {
                self.interval = f64::INFINITY;
            }
        } else {
            self.interval = self.interval.min(interval);
        }
        if let Some(reason) = reason {
            self.reasons.insert(reason);
        }
    }

    pub fn current_interval(&self) -> f64 {
        self.interval
    }

    pub fn is_scheduled(&self) -> bool {
        self.time < Time::INFINITY || self.interval < f64::INFINITY
    }
}

impl Default for NextUpdate {
    fn default() -> NextUpdate {
        NextUpdate::new(Time::INFINITY)
    }
}

/// Deferred work run at the start of the next pass of an update.
pub type Continuation<G> = Box<dyn FnOnce(&mut G, &mut UpdateContext<'_, G>) + Send>;

/// What the graph may access while it is being updated.
pub struct UpdateContext<'a, G: ?Sized> {
    pub(crate) data: &'a HostData,
    pub(crate) continuations: &'a mut Vec<Continuation<G>>,
    pub(crate) next_update: &'a mut NextUpdate,
}

impl<'a, G: ?Sized> UpdateContext<'a, G> {
    pub fn data(&self) -> &HostData {
        self.data
    }

    /// Queues `body` to run before the graph is updated again.
    ///
    /// Continuations run in the order they were queued.
    pub fn continue_transaction(
        &mut self,
        body: impl FnOnce(&mut G, &mut UpdateContext<'_, G>) + Send + 'static,
    ) {
        self.continuations.push(Box::new(body));
    }

    pub fn has_continuations(&self) -> bool {
        !self.continuations.is_empty()
    }

    pub fn schedule_update(&mut self, time: Time, reason: Option<u32>) {
        self.next_update.at(time);
        if let Some(reason) = reason {
            self.next_update.reasons.insert(reason);
        }
    }

    pub fn schedule_interval(&mut self, interval: f64, reason: Option<u32>) {
        self.next_update.interval(interval, reason);
    }
}

/// The attribute graph driven by a [`GraphHost`](crate::GraphHost).
pub trait Graph: Send + Sized + 'static {
    /// Builds the nodes producing the host's outputs.
    fn instantiate_outputs(&mut self, data: &HostData);

    /// Tears down what [`instantiate_outputs`](Graph::instantiate_outputs) built.
    fn uninstantiate_outputs(&mut self);

    /// Brings the nodes selected by `flags` up to date.
    fn update(&mut self, flags: SubgraphFlags, cx: &mut UpdateContext<'_, Self>);

    fn is_dirty(&self, flags: SubgraphFlags) -> bool;

    /// Marks an attribute as needing reevaluation.
    fn invalidate_value(&mut self, _attribute: AttributeId) {}

    /// Called after the host's time, environment or phase changed.
    fn inputs_did_change(&mut self, _data: &HostData) {}

    fn removed_state_did_change(&mut self, _is_removed: bool, _is_hidden_for_reuse: bool) {}

    /// The aggregated values of the preferences the host requested.
    fn host_preference_values(&self) -> Option<PreferenceList> {
        None
    }

    fn root_layout_computer(&self) -> Option<LayoutComputer> {
        None
    }

    /// Returns which of the `requested` outputs changed since the last call.
    fn update_requested_outputs(&mut self, _requested: Outputs) -> Outputs {
        Outputs::empty()
    }

    /// Number of updates the graph performed on the host thread.
    fn main_updates(&self) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_attribute_is_scoped() {
        assert_eq!(AttributeId::current(), AttributeId::NIL);
        AttributeId::new(3).with_current(|| {
            assert_eq!(AttributeId::current().raw(), 3);
            AttributeId::new(4).with_current(|| assert_eq!(AttributeId::current().raw(), 4));
            assert_eq!(AttributeId::current().raw(), 3);
        });
        assert_eq!(AttributeId::current(), AttributeId::NIL);
    }

    #[test]
    fn next_update() {
        let mut next = NextUpdate::default();
        assert!(!next.is_scheduled());
        next.at(Time(2.));
        next.at(Time(5.));
        assert_eq!(next.time, Time(2.));
        next.interval(0.5, Some(7));
        next.interval(1., None);
        assert_eq!(next.current_interval(), 0.5);
        next.interval(0., None);
        assert_eq!(next.current_interval(), f64::INFINITY);
        assert!(next.reasons.contains(&7));
    }
}
