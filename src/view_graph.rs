//! The view graph: the root of one hosted view tree.
//!
//! [`ViewGraph::update_outputs`] is the per-frame update. It advances the time, then repeatedly
//! runs pending continuations and updates the active nodes of the graph until nothing is dirty.
//! Both loops are bounded (see [`Config`]); an update that hits a bound reports itself as not
//! converged and presents whatever state it reached. Afterwards the delegate learns what changed.

use crate::config::Config;
use crate::error::ViewGraphError;
use crate::geometry::{EdgeInsets, Point, ProposedSize, Rect, Size, ViewGeometry, ViewSize};
use crate::graph::{Graph, NextUpdate, SubgraphFlags, Time};
use crate::graph_host::{GraphDelegate, GraphHost};
use crate::layout::LayoutComputer;
use crate::update;
use bitflags::bitflags;
use cgmath::EuclideanSpace;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug_span, trace};

bitflags! {
    /// Outputs a view graph can produce for its host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Outputs: u8 {
        const DISPLAY_LIST = 1;
        const PLATFORM_ITEM_LIST = 1 << 1;
        const VIEW_RESPONDERS = 1 << 2;
        const LAYOUT = 1 << 4;
        const FOCUS = 1 << 5;
    }
}

impl Outputs {
    /// What a view graph produces unless told otherwise.
    pub fn defaults() -> Outputs {
        Outputs::DISPLAY_LIST | Outputs::VIEW_RESPONDERS | Outputs::LAYOUT | Outputs::FOCUS
    }
}

/// Receives notifications from a view graph.
pub trait ViewGraphDelegate: GraphDelegate {
    fn preferences_did_change(&self) {}

    fn outputs_did_change(&self, _outputs: Outputs) {}

    fn focus_did_change(&self) {}
}

/// Observes the size the root view wants for a fixed proposal.
pub struct SizeThatFitsObserver {
    pub proposal: ProposedSize,
    /// Called with the previous and new size.
    pub callback: Box<dyn FnMut(Option<Size>, Size) + Send>,
}

impl SizeThatFitsObserver {
    pub fn new(
        proposal: ProposedSize,
        callback: impl FnMut(Option<Size>, Size) + Send + 'static,
    ) -> SizeThatFitsObserver {
        SizeThatFitsObserver {
            proposal,
            callback: Box::new(callback),
        }
    }
}

impl fmt::Debug for SizeThatFitsObserver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SizeThatFitsObserver")
            .field("proposal", &self.proposal)
            .finish()
    }
}

/// What a call to [`ViewGraph::update_outputs`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateReport {
    /// Outer passes, each ending with a check of the graph's dirtiness.
    pub outer_passes: u32,
    /// Continuation-draining passes across all outer passes.
    pub inner_passes: u32,
    /// False if a bound was hit while the graph was still dirty or had continuations.
    pub converged: bool,
    pub preferences_changed: bool,
    pub size_that_fits_changed: bool,
    /// Requested outputs that changed.
    pub outputs: Outputs,
}

impl UpdateReport {
    /// Whether the update changed anything the delegate is told about.
    pub fn has_changes(&self) -> bool {
        self.preferences_changed || self.size_that_fits_changed || !self.outputs.is_empty()
    }
}

/// The root of a hosted view tree.
pub struct ViewGraph<G: Graph> {
    host: GraphHost<G>,
    delegate: Option<Weak<dyn ViewGraphDelegate>>,
    requested_outputs: Outputs,
    disabled_outputs: Outputs,
    centers_root_view: bool,
    cached_size_that_fits: Option<Size>,
    size_that_fits_observer: Option<SizeThatFitsObserver>,
    needs_focus_update: bool,
    main_updates: u32,
}

impl<G: Graph> ViewGraph<G> {
    pub fn new(graph: G, requested_outputs: Outputs) -> ViewGraph<G> {
        ViewGraph::with_config(graph, requested_outputs, Config::global().clone())
    }

    pub fn with_config(graph: G, requested_outputs: Outputs, config: Config) -> ViewGraph<G> {
        let centers_root_view = config.centers_root_view;
        ViewGraph {
            host: GraphHost::with_config(graph, config),
            delegate: None,
            requested_outputs,
            disabled_outputs: Outputs::empty(),
            centers_root_view,
            cached_size_that_fits: None,
            size_that_fits_observer: None,
            needs_focus_update: false,
            main_updates: 0,
        }
    }

    pub fn host(&self) -> &GraphHost<G> {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut GraphHost<G> {
        &mut self.host
    }

    pub fn graph(&self) -> Option<&G> {
        self.host.graph()
    }

    pub fn graph_mut(&mut self) -> Option<&mut G> {
        self.host.graph_mut()
    }

    /// Sets the delegate, which is also the host's delegate. It is held weakly.
    pub fn set_delegate<D: ViewGraphDelegate + 'static>(&mut self, delegate: &Arc<D>) {
        let weak = Arc::downgrade(delegate);
        self.host.set_delegate(weak.clone());
        self.delegate = Some(weak);
    }

    fn delegate(&self) -> Option<Arc<dyn ViewGraphDelegate>> {
        self.delegate.as_ref().and_then(Weak::upgrade)
    }

    pub fn requested_outputs(&self) -> Outputs {
        self.requested_outputs
    }

    pub fn disabled_outputs(&self) -> Outputs {
        self.disabled_outputs
    }

    /// Outputs that are requested but temporarily not produced.
    pub fn set_disabled_outputs(&mut self, outputs: Outputs) {
        self.disabled_outputs = outputs;
    }

    pub fn centers_root_view(&self) -> bool {
        self.centers_root_view
    }

    pub fn set_centers_root_view(&mut self, centers: bool) {
        self.centers_root_view = centers;
    }

    /// Graph updates made on the host thread, as of the last update.
    pub fn main_updates(&self) -> u32 {
        self.main_updates
    }

    /// When the graph asked to be updated next.
    pub fn next_update(&self) -> &NextUpdate {
        self.host.next_update()
    }

    pub fn set_needs_focus_update(&mut self) {
        self.needs_focus_update = true;
    }

    /// Installs an observer of the root view's size, notified after updates that change it.
    ///
    /// Observing requires the [`Outputs::LAYOUT`] output.
    pub fn set_size_that_fits_observer(
        &mut self,
        observer: Option<SizeThatFitsObserver>,
    ) -> Result<(), ViewGraphError> {
        if observer.is_some() && !self.requested_outputs.contains(Outputs::LAYOUT) {
            return Err(ViewGraphError::MissingLayoutOutput);
        }
        self.size_that_fits_observer = observer;
        Ok(())
    }

    fn root_layout_computer(&self) -> LayoutComputer {
        self.host
            .graph()
            .and_then(G::root_layout_computer)
            .unwrap_or_default()
    }

    /// The size the root view wants for `proposal`. Not cached.
    pub fn size_that_fits(&mut self, proposal: ProposedSize) -> Result<Size, ViewGraphError> {
        if !self.host.is_valid() {
            return Err(ViewGraphError::Invalidated);
        }
        if !self.requested_outputs.contains(Outputs::LAYOUT) {
            return Err(ViewGraphError::MissingLayoutOutput);
        }
        update::ensure(|| {
            self.host.instantiate();
            Ok(self.root_layout_computer().size_that_fits(proposal))
        })
    }

    /// Places the root view in a view of `proposed_size` with content `insets`.
    ///
    /// The root view is centered in the inset area if
    /// [`centers_root_view`](Self::centers_root_view), and at its top leading corner otherwise.
    pub fn root_geometry(&mut self, proposed_size: Size, insets: EdgeInsets) -> ViewGeometry {
        update::ensure(|| {
            self.host.instantiate();
            let bounds = Rect::new(Point::origin(), proposed_size).inset(insets);
            let proposal = ProposedSize::from(bounds.size);
            let fitting = self.root_layout_computer().size_that_fits(proposal);

            let origin = if self.centers_root_view {
                bounds.center() - fitting * 0.5
            } else {
                bounds.origin
            };
            ViewGeometry::new(origin, ViewSize::new(fitting, proposal))
        })
    }

    /// Brings the graph up to date at `time` and notifies the delegate of what changed.
    ///
    /// Delegate notification only happens on the thread that created the graph; from other
    /// threads the graph is updated but [`ViewGraphError::NotOnUpdateThread`] is returned.
    pub fn update_outputs(&mut self, time: Time) -> Result<UpdateReport, ViewGraphError> {
        if !self.host.is_valid() {
            return Err(ViewGraphError::Invalidated);
        }
        let _update = update::begin();
        self.begin_next_update(time);
        let _span = debug_span!("view_graph.update", seed = self.host.data().update_seed).entered();
        self.host.instantiate();

        let old_size_that_fits = self.cached_size_that_fits;
        let max_passes = self.host.config().max_update_passes.max(1);
        let mut report = UpdateReport::default();
        loop {
            report.outer_passes += 1;
            let inner_passes = self.host.update_active();
            report.inner_passes += inner_passes;
            trace!(pass = report.outer_passes, inner_passes, "updated active nodes");

            report.preferences_changed |= self.host.update_preferences();
            report.size_that_fits_changed |= self.update_observed_size_that_fits();
            report.outputs |= self.update_requested_outputs();

            let dirty = self
                .host
                .graph()
                .map_or(false, |graph| graph.is_dirty(SubgraphFlags::ACTIVE));
            if !dirty || report.outer_passes == max_passes {
                // leftover continuations mean the inner loop hit its bound
                report.converged = !dirty && !self.host.has_continuations();
                break;
            }
        }
        if !report.converged {
            runtime_issue!(
                outer_passes = report.outer_passes,
                inner_passes = report.inner_passes,
                "view graph update did not converge"
            );
        }

        if !report.has_changes() && !self.needs_focus_update {
            return Ok(report);
        }
        let current = thread::current().id();
        if current != self.host.thread() {
            runtime_issue!("view graph outputs changed on a background thread");
            return Err(ViewGraphError::NotOnUpdateThread {
                expected: self.host.thread(),
                actual: current,
            });
        }

        let delegate = self.delegate();
        if report.preferences_changed {
            if let Some(delegate) = &delegate {
                delegate.preferences_did_change();
            }
        }
        if report.size_that_fits_changed {
            let observer = self.size_that_fits_observer.as_mut();
            if let (Some(observer), Some(size)) = (observer, self.cached_size_that_fits) {
                (observer.callback)(old_size_that_fits, size);
            }
        }
        if !report.outputs.is_empty() {
            if let Some(delegate) = &delegate {
                delegate.outputs_did_change(report.outputs);
            }
        }
        if self.needs_focus_update {
            self.needs_focus_update = false;
            if let Some(delegate) = &delegate {
                delegate.focus_did_change();
            }
        }
        self.main_updates = self.main_updates.wrapping_sub(1);
        Ok(report)
    }

    fn begin_next_update(&mut self, time: Time) {
        self.host.begin_next_update(time);
        self.main_updates = self.host.graph().map_or(0, G::main_updates);
    }

    fn update_observed_size_that_fits(&mut self) -> bool {
        let proposal = match &self.size_that_fits_observer {
            Some(observer) => observer.proposal,
            None => return false,
        };
        let size = self.root_layout_computer().size_that_fits(proposal);
        if self.cached_size_that_fits == Some(size) {
            return false;
        }
        self.cached_size_that_fits = Some(size);
        true
    }

    fn update_requested_outputs(&mut self) -> Outputs {
        let outputs = self.requested_outputs - self.disabled_outputs;
        match self.host.graph_mut() {
            Some(graph) => graph.update_requested_outputs(outputs) & outputs,
            None => Outputs::empty(),
        }
    }

    /// Tears down the graph. Later updates fail with [`ViewGraphError::Invalidated`].
    pub fn invalidate(&mut self) {
        self.host.invalidate();
    }
}
