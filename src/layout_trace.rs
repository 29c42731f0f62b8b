//! Layout tracing.
//!
//! A tracing layout computer reports every geometry query it answers, keyed by the attribute that
//! created it. Events always go to `tracing` at trace level; a [`LayoutTraceRecorder`] can be
//! installed to receive them as values.

use crate::config::Config;
use crate::geometry::{AlignmentKey, Axis, Point, ProposedSize, Size, ViewSize};
use crate::graph::AttributeId;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// A geometry query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayoutOperation {
    SizeThatFits(ProposedSize),
    LengthThatFits(ProposedSize, Axis),
    ChildGeometries(ViewSize, Point),
    ExplicitAlignment(AlignmentKey, ViewSize),
    Spacing,
}

/// The answer to a geometry query.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutResult {
    Size(Size),
    Length(f64),
    Geometries(usize),
    Alignment(Option<f64>),
    Spacing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutTraceEvent {
    Enter {
        attribute: AttributeId,
        engine: &'static str,
        operation: LayoutOperation,
    },
    Exit {
        attribute: AttributeId,
        operation: LayoutOperation,
        result: LayoutResult,
    },
}

/// Receives layout trace events.
pub trait LayoutTraceRecorder: Send + Sync {
    fn record(&self, event: LayoutTraceEvent);
}

static RECORDER: RwLock<Option<Arc<dyn LayoutTraceRecorder>>> = parking_lot::const_rwlock(None);

/// Installs `recorder`, replacing any installed one.
pub fn install(recorder: Arc<dyn LayoutTraceRecorder>) {
    *RECORDER.write() = Some(recorder);
}

/// Removes the installed recorder.
pub fn uninstall() {
    *RECORDER.write() = None;
}

/// Whether newly created layout computers should trace.
pub fn is_enabled() -> bool {
    Config::global().layout_trace || RECORDER.read().is_some()
}

pub(crate) fn record(event: LayoutTraceEvent) {
    match &event {
        LayoutTraceEvent::Enter {
            attribute,
            engine,
            operation,
        } => trace!(target: "viewgraph::layout", %attribute, engine, ?operation, "enter"),
        LayoutTraceEvent::Exit {
            attribute,
            operation,
            result,
        } => trace!(target: "viewgraph::layout", %attribute, ?operation, ?result, "exit"),
    }

    let recorder = RECORDER.read().clone();
    if let Some(recorder) = recorder {
        recorder.record(event);
    }
}
