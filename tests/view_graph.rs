use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use viewgraph::geometry::{EdgeInsets, ProposedSize, Size};
use viewgraph::unary_layout::{FrameLayout, LayoutProxy, PaddingLayout, UnaryLayoutEngine};
use viewgraph::{
    AttributeId, Config, EnvironmentKey, EnvironmentValues, Graph, GraphDelegate, HostData,
    LayoutComputer, Mutation, MutationStyle, Outputs, SizeThatFitsObserver, SubgraphFlags, Time,
    Tracker, Transaction, UpdateContext, ViewGraph, ViewGraphDelegate,
};

struct ScaleKey;

impl EnvironmentKey for ScaleKey {
    type Value = f64;

    fn default_value() -> f64 {
        1.
    }
}

type Log = Arc<Mutex<Vec<String>>>;

fn body() -> AttributeId {
    AttributeId::new(1)
}

/// A graph with a single attribute that renders a padded, fixed-width box.
struct Document {
    log: Log,
    tracker: Arc<Tracker>,
    width: f64,
    dirty: BTreeSet<AttributeId>,
    layout: Option<LayoutComputer>,
    changed: Outputs,
}

impl Document {
    fn new(log: &Log) -> Document {
        Document {
            log: Arc::clone(log),
            tracker: Arc::new(Tracker::new()),
            width: 20.,
            dirty: BTreeSet::new(),
            layout: None,
            changed: Outputs::empty(),
        }
    }

    fn render(&mut self, data: &HostData) {
        let plist = data.environment.plist().clone();
        let environment = EnvironmentValues::tracked(plist, Arc::clone(&self.tracker));
        let scale = environment.get::<ScaleKey>();
        self.log.lock().push(format!("render scale {}", scale));

        let frame = LayoutComputer::new(UnaryLayoutEngine::new(
            FrameLayout::new(Some(self.width * scale), Some(10.)),
            LayoutProxy::empty(),
        ));
        self.layout = Some(LayoutComputer::new(UnaryLayoutEngine::new(
            PaddingLayout {
                insets: EdgeInsets::all(2.),
            },
            LayoutProxy::new(frame),
        )));
        self.changed |= Outputs::DISPLAY_LIST | Outputs::LAYOUT;
    }
}

impl Graph for Document {
    fn instantiate_outputs(&mut self, data: &HostData) {
        self.tracker.initialize_values(data.environment.plist());
        self.dirty.insert(body());
    }

    fn uninstantiate_outputs(&mut self) {
        self.layout = None;
    }

    fn update(&mut self, flags: SubgraphFlags, cx: &mut UpdateContext<'_, Document>) {
        if !flags.contains(SubgraphFlags::ACTIVE) {
            return;
        }
        for attribute in mem::take(&mut self.dirty) {
            if attribute == body() {
                self.render(cx.data());
            }
        }
    }

    fn is_dirty(&self, flags: SubgraphFlags) -> bool {
        flags.contains(SubgraphFlags::ACTIVE) && !self.dirty.is_empty()
    }

    fn invalidate_value(&mut self, attribute: AttributeId) {
        self.dirty.insert(attribute);
    }

    fn inputs_did_change(&mut self, data: &HostData) {
        let plist = data.environment.plist();
        if self.tracker.has_different_used_values(plist) {
            self.tracker.reset();
            self.tracker.initialize_values(plist);
            self.dirty.insert(body());
        }
    }

    fn root_layout_computer(&self) -> Option<LayoutComputer> {
        self.layout.clone()
    }

    fn update_requested_outputs(&mut self, requested: Outputs) -> Outputs {
        mem::take(&mut self.changed) & requested
    }
}

#[derive(Default)]
struct Host {
    began: AtomicUsize,
    changed: AtomicUsize,
    outputs: Mutex<Vec<Outputs>>,
}

impl GraphDelegate for Host {
    fn graph_did_change(&self) {
        self.changed.fetch_add(1, Ordering::SeqCst);
    }

    fn begin_transaction(&self) {
        self.began.fetch_add(1, Ordering::SeqCst);
    }
}

impl ViewGraphDelegate for Host {
    fn outputs_did_change(&self, outputs: Outputs) {
        self.outputs.lock().push(outputs);
    }
}

fn view_graph() -> (ViewGraph<Document>, Arc<Host>, Log) {
    let log = Log::default();
    let mut view_graph =
        ViewGraph::with_config(Document::new(&log), Outputs::defaults(), Config::default());
    let host = Arc::new(Host::default());
    view_graph.set_delegate(&host);
    (view_graph, host, log)
}

#[test]
fn first_update_renders_and_later_updates_are_quiet() {
    let (mut view_graph, host, log) = view_graph();

    let report = view_graph.update_outputs(Time::ZERO).unwrap();
    assert!(report.converged);
    assert_eq!(report.outer_passes, 1);
    assert_eq!(report.outputs, Outputs::DISPLAY_LIST | Outputs::LAYOUT);
    assert_eq!(*log.lock(), vec!["render scale 1"]);
    assert_eq!(host.outputs.lock().len(), 1);

    let report = view_graph.update_outputs(Time(1. / 60.)).unwrap();
    assert!(report.converged);
    assert_eq!(report.outer_passes, 1);
    assert!(!report.has_changes());
    assert_eq!(log.lock().len(), 1, "a new time alone does not rerender");
    assert_eq!(host.outputs.lock().len(), 1, "delegate is not told about quiet updates");
    assert_eq!(view_graph.size_that_fits(ProposedSize::UNSPECIFIED), Ok(Size::new(24., 14.)));
}

#[test]
fn async_invalidation_is_applied_on_flush() {
    let (mut view_graph, host, log) = view_graph();
    view_graph.update_outputs(Time::ZERO).unwrap();

    view_graph
        .host_mut()
        .async_invalidation(Transaction::new(), body(), MutationStyle::Deferred);
    view_graph
        .host_mut()
        .async_invalidation(Transaction::new(), body(), MutationStyle::Deferred);
    assert_eq!(host.began.load(Ordering::SeqCst), 1);
    assert!(view_graph.host().has_pending_transactions());
    assert_eq!(log.lock().len(), 1, "nothing happens before the flush");

    view_graph.host_mut().flush_transactions();
    assert!(!view_graph.host().has_pending_transactions());
    assert_eq!(host.changed.load(Ordering::SeqCst), 1);

    let report = view_graph.update_outputs(Time(1.)).unwrap();
    assert_eq!(report.outputs, Outputs::DISPLAY_LIST | Outputs::LAYOUT);
    assert_eq!(*log.lock(), vec!["render scale 1", "render scale 1"]);
}

#[test]
fn transactions_from_other_threads() {
    let (mut view_graph, host, log) = view_graph();
    view_graph.update_outputs(Time::ZERO).unwrap();

    let sender = view_graph.host().sender();
    let sent = thread::spawn(move || {
        sender.send(Transaction::new(), Mutation::Invalidating(body()))
    })
    .join()
    .unwrap();
    assert_eq!(sent, Ok(()));
    assert_eq!(host.began.load(Ordering::SeqCst), 1);
    assert!(view_graph.host().has_pending_transactions());

    view_graph.host_mut().flush_transactions();
    view_graph.update_outputs(Time(1.)).unwrap();
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn environment_changes_reach_readers() {
    let (mut view_graph, _host, log) = view_graph();
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::clone(&sizes);
    view_graph
        .set_size_that_fits_observer(Some(SizeThatFitsObserver::new(
            ProposedSize::UNSPECIFIED,
            move |old, new| observed.lock().push((old, new)),
        )))
        .unwrap();
    view_graph.update_outputs(Time::ZERO).unwrap();
    assert_eq!(*sizes.lock(), vec![(None, Size::new(24., 14.))]);

    let mut environment = EnvironmentValues::new();
    environment.set::<ScaleKey>(2.);
    view_graph.host_mut().set_environment(environment.clone());
    let report = view_graph.update_outputs(Time(1.)).unwrap();
    assert!(report.size_that_fits_changed);
    assert_eq!(*log.lock(), vec!["render scale 1", "render scale 2"]);
    assert_eq!(
        *sizes.lock(),
        vec![
            (None, Size::new(24., 14.)),
            (Some(Size::new(24., 14.)), Size::new(44., 14.)),
        ]
    );

    // equal values under a new list identity
    let mut same = EnvironmentValues::new();
    same.set::<ScaleKey>(2.);
    view_graph.host_mut().set_environment(same);
    let report = view_graph.update_outputs(Time(2.)).unwrap();
    assert_eq!(log.lock().len(), 3, "a list the tracker never saw counts as changed");
    assert!(!report.size_that_fits_changed);
}

#[test]
fn invalidated_view_graph_rejects_updates() {
    let (mut view_graph, _host, _log) = view_graph();
    view_graph.update_outputs(Time::ZERO).unwrap();
    view_graph.invalidate();
    assert!(view_graph.update_outputs(Time(1.)).is_err());
    assert!(view_graph.graph().is_none());
}
