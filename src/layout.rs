//! Layout negotiation.
//!
//! A [`LayoutEngine`] answers geometry queries for one view: how big it wants to be for a proposed
//! size, where its children go, where its alignment guides are. A [`LayoutComputer`] erases the
//! engine's type so parents can query children uniformly.

use crate::geometry::{
    AlignmentKey, Axis, Point, ProposedSize, Size, Spacing, ViewGeometry, ViewSize,
};
use crate::graph::AttributeId;
use crate::layout_trace::{self, LayoutOperation, LayoutResult, LayoutTraceEvent};
use crate::update;
use core::any::Any;
use core::fmt;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// A layout algorithm.
///
/// Engines may keep caches, so every query takes `&mut self`.
pub trait LayoutEngine: Send + 'static {
    fn layout_priority(&self) -> f64 {
        0.
    }

    fn ignores_automatic_padding(&self) -> bool {
        false
    }

    fn requires_spacing_projection(&self) -> bool {
        false
    }

    fn spacing(&mut self) -> Spacing {
        Spacing::default()
    }

    fn size_that_fits(&mut self, proposal: ProposedSize) -> Size;

    /// Length along `axis` for `proposal`. Engines with a cheaper one-dimensional path override
    /// this.
    fn length_that_fits(&mut self, proposal: ProposedSize, axis: Axis) -> f64 {
        axis.select(self.size_that_fits(proposal))
    }

    /// Places the children in a view of `size` at `origin`.
    ///
    /// Engines of views with children must implement this.
    fn child_geometries(&mut self, _size: ViewSize, _origin: Point) -> Vec<ViewGeometry> {
        panic!("implement or don't call me!");
    }

    fn explicit_alignment(&mut self, _key: AlignmentKey, _size: ViewSize) -> Option<f64> {
        None
    }

    fn debug_content_description(&self) -> Option<String> {
        None
    }
}

/// Object-safe view of an engine that can be downcast.
trait AnyLayoutEngine: LayoutEngine {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn type_name(&self) -> &'static str;
}

impl<E: LayoutEngine> AnyLayoutEngine for E {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        core::any::type_name::<E>()
    }
}

/// The shared box behind a layout computer.
struct EngineBox {
    engine: Mutex<Box<dyn AnyLayoutEngine>>,
    /// Attribute to report trace events for; `None` if the box does not trace.
    trace: Option<AttributeId>,
}

impl EngineBox {
    fn query<R>(
        &self,
        operation: LayoutOperation,
        result: impl FnOnce(&R) -> LayoutResult,
        body: impl FnOnce(&mut dyn AnyLayoutEngine) -> R,
    ) -> R {
        update::assert_is_locked();
        let mut engine = self.engine.lock();
        let attribute = match self.trace {
            Some(attribute) => attribute,
            None => return body(&mut **engine),
        };

        layout_trace::record(LayoutTraceEvent::Enter {
            attribute,
            engine: engine.type_name(),
            operation,
        });
        let value = body(&mut **engine);
        layout_trace::record(LayoutTraceEvent::Exit {
            attribute,
            operation,
            result: result(&value),
        });
        value
    }

    fn read<R>(&self, body: impl FnOnce(&dyn AnyLayoutEngine) -> R) -> R {
        update::assert_is_locked();
        body(&**self.engine.lock())
    }
}

/// A type-erased, shared layout engine.
///
/// Two computers are equal if they share the same engine box and seed. Modifying the engine bumps
/// the seed, so cached results keyed by a computer go stale.
#[derive(Clone)]
pub struct LayoutComputer {
    engine: Arc<EngineBox>,
    seed: u32,
}

impl LayoutComputer {
    /// Wraps `engine`. The computer traces if [`layout_trace::is_enabled`].
    pub fn new(engine: impl LayoutEngine) -> LayoutComputer {
        let trace = if layout_trace::is_enabled() {
            Some(AttributeId::current())
        } else {
            None
        };
        LayoutComputer::with_box(Box::new(engine), trace)
    }

    /// Wraps `engine` in a computer that traces as `attribute`.
    pub fn tracing(engine: impl LayoutEngine, attribute: AttributeId) -> LayoutComputer {
        LayoutComputer::with_box(Box::new(engine), Some(attribute))
    }

    fn with_box(engine: Box<dyn AnyLayoutEngine>, trace: Option<AttributeId>) -> LayoutComputer {
        LayoutComputer {
            engine: Arc::new(EngineBox {
                engine: Mutex::new(engine),
                trace,
            }),
            seed: 0,
        }
    }

    /// The shared computer of views without a layout of their own.
    pub fn default_value() -> LayoutComputer {
        static DEFAULT: OnceLock<LayoutComputer> = OnceLock::new();
        DEFAULT
            .get_or_init(|| LayoutComputer::with_box(Box::new(DefaultLayoutEngine), None))
            .clone()
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn is_tracing(&self) -> bool {
        self.engine.trace.is_some()
    }

    pub fn layout_priority(&self) -> f64 {
        self.engine.read(|engine| engine.layout_priority())
    }

    pub fn ignores_automatic_padding(&self) -> bool {
        self.engine.read(|engine| engine.ignores_automatic_padding())
    }

    pub fn requires_spacing_projection(&self) -> bool {
        self.engine.read(|engine| engine.requires_spacing_projection())
    }

    pub fn debug_content_description(&self) -> Option<String> {
        self.engine.read(|engine| engine.debug_content_description())
    }

    pub fn spacing(&self) -> Spacing {
        self.engine.query(
            LayoutOperation::Spacing,
            |_: &Spacing| LayoutResult::Spacing,
            |engine| engine.spacing(),
        )
    }

    pub fn size_that_fits(&self, proposal: ProposedSize) -> Size {
        self.engine.query(
            LayoutOperation::SizeThatFits(proposal),
            |size: &Size| LayoutResult::Size(*size),
            |engine| engine.size_that_fits(proposal),
        )
    }

    pub fn length_that_fits(&self, proposal: ProposedSize, axis: Axis) -> f64 {
        self.engine.query(
            LayoutOperation::LengthThatFits(proposal, axis),
            |length: &f64| LayoutResult::Length(*length),
            |engine| engine.length_that_fits(proposal, axis),
        )
    }

    pub fn child_geometries(&self, size: ViewSize, origin: Point) -> Vec<ViewGeometry> {
        self.engine.query(
            LayoutOperation::ChildGeometries(size, origin),
            |geometries: &Vec<ViewGeometry>| LayoutResult::Geometries(geometries.len()),
            |engine| engine.child_geometries(size, origin),
        )
    }

    pub fn explicit_alignment(&self, key: AlignmentKey, size: ViewSize) -> Option<f64> {
        self.engine.query(
            LayoutOperation::ExplicitAlignment(key, size),
            |value: &Option<f64>| LayoutResult::Alignment(*value),
            |engine| engine.explicit_alignment(key, size),
        )
    }

    /// Runs `body` on the engine, which must be an `E`.
    ///
    /// Does not change the seed.
    pub fn with_mutable_engine<E: LayoutEngine, R>(&self, body: impl FnOnce(&mut E) -> R) -> R {
        update::assert_is_locked();
        let mut engine = self.engine.engine.lock();
        let type_name = engine.type_name();
        match engine.as_any_mut().downcast_mut::<E>() {
            Some(engine) => body(engine),
            None => panic!(
                "layout computer holds a {}, not a {}",
                type_name,
                core::any::type_name::<E>()
            ),
        }
    }

    /// Modifies the engine in place and bumps the seed.
    pub fn update<E: LayoutEngine>(&mut self, modify: impl FnOnce(&mut E)) {
        self.with_mutable_engine(modify);
        self.seed = self.seed.wrapping_add(1);
    }

    /// Replaces the engine with `engine`, bumping the seed only if they differ.
    pub fn update_if_not_equal<E: LayoutEngine + PartialEq>(&mut self, engine: E) {
        let changed = self.with_mutable_engine(|current: &mut E| {
            if *current == engine {
                false
            } else {
                *current = engine;
                true
            }
        });
        if changed {
            self.seed = self.seed.wrapping_add(1);
        }
    }
}

impl Default for LayoutComputer {
    fn default() -> LayoutComputer {
        LayoutComputer::default_value()
    }
}

impl PartialEq for LayoutComputer {
    fn eq(&self, other: &LayoutComputer) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine) && self.seed == other.seed
    }
}

impl fmt::Debug for LayoutComputer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let engine = match self.engine.engine.try_lock() {
            Some(engine) => engine.type_name(),
            None => "<busy>",
        };
        f.debug_struct("LayoutComputer")
            .field("engine", &engine)
            .field("seed", &self.seed)
            .field("tracing", &self.is_tracing())
            .finish()
    }
}

/// Size of a view without a layout when the proposal leaves a dimension open.
pub const DEFAULT_LAYOUT_SIZE: f64 = 10.;

/// The engine of views without a layout of their own: takes what is proposed and has no children.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DefaultLayoutEngine;

impl LayoutEngine for DefaultLayoutEngine {
    fn size_that_fits(&mut self, proposal: ProposedSize) -> Size {
        proposal.fixing(Size::new(DEFAULT_LAYOUT_SIZE, DEFAULT_LAYOUT_SIZE))
    }

    fn child_geometries(&mut self, _size: ViewSize, _origin: Point) -> Vec<ViewGeometry> {
        Vec::new()
    }
}
