//! Layouts with a single child.

use crate::cache::Cache3;
use crate::geometry::{
    EdgeInsets, Placement, Point, ProposedSize, Size, Spacing, UnitPoint, ViewGeometry, ViewSize,
};
use crate::layout::{LayoutComputer, LayoutEngine};
use cgmath::{EuclideanSpace, Zero};

/// Access to the child of a layout. A missing child behaves like an empty view.
#[derive(Debug, Clone, Default)]
pub struct LayoutProxy(Option<LayoutComputer>);

impl LayoutProxy {
    pub fn new(computer: LayoutComputer) -> LayoutProxy {
        LayoutProxy(Some(computer))
    }

    pub fn empty() -> LayoutProxy {
        LayoutProxy(None)
    }

    pub fn computer(&self) -> Option<&LayoutComputer> {
        self.0.as_ref()
    }

    pub fn size_that_fits(&self, proposal: ProposedSize) -> Size {
        match &self.0 {
            Some(computer) => computer.size_that_fits(proposal),
            None => Size::zero(),
        }
    }

    pub fn spacing(&self) -> Spacing {
        match &self.0 {
            Some(computer) => computer.spacing(),
            None => Spacing::ZERO,
        }
    }

    pub fn layout_priority(&self) -> f64 {
        self.0.as_ref().map_or(0., LayoutComputer::layout_priority)
    }
}

impl PartialEq for LayoutProxy {
    fn eq(&self, other: &LayoutProxy) -> bool {
        self.0 == other.0
    }
}

/// A layout that sizes and places one child.
pub trait UnaryLayout: Send + 'static {
    fn size_that_fits(&self, proposal: ProposedSize, child: &LayoutProxy) -> Size;

    /// Where the child goes in a view of `size`.
    fn placement(&self, size: ViewSize, child: &LayoutProxy) -> Placement;

    fn spacing(&self, child: &LayoutProxy) -> Spacing {
        child.spacing()
    }

    fn layout_priority(&self, child: &LayoutProxy) -> f64 {
        child.layout_priority()
    }
}

/// Runs a [`UnaryLayout`], caching its answers.
pub struct UnaryLayoutEngine<L> {
    layout: L,
    child: LayoutProxy,
    dimensions_cache: Cache3<ProposedSize, Size>,
    placement_cache: Cache3<ViewSize, Placement>,
}

impl<L: UnaryLayout> UnaryLayoutEngine<L> {
    pub fn new(layout: L, child: LayoutProxy) -> UnaryLayoutEngine<L> {
        UnaryLayoutEngine {
            layout,
            child,
            dimensions_cache: Cache3::new(),
            placement_cache: Cache3::new(),
        }
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }
}

impl<L: UnaryLayout + PartialEq> PartialEq for UnaryLayoutEngine<L> {
    fn eq(&self, other: &UnaryLayoutEngine<L>) -> bool {
        self.layout == other.layout && self.child == other.child
    }
}

impl<L: UnaryLayout> LayoutEngine for UnaryLayoutEngine<L> {
    fn layout_priority(&self) -> f64 {
        self.layout.layout_priority(&self.child)
    }

    fn spacing(&mut self) -> Spacing {
        self.layout.spacing(&self.child)
    }

    fn size_that_fits(&mut self, proposal: ProposedSize) -> Size {
        let UnaryLayoutEngine {
            layout,
            child,
            dimensions_cache,
            ..
        } = self;
        *dimensions_cache.get(proposal, || layout.size_that_fits(proposal, child))
    }

    fn child_geometries(&mut self, size: ViewSize, origin: Point) -> Vec<ViewGeometry> {
        let UnaryLayoutEngine {
            layout,
            child,
            placement_cache,
            ..
        } = self;
        let placement = *placement_cache.get(size, || layout.placement(size, child));

        let child_size = child.size_that_fits(placement.proposal);
        let child_origin = placement.origin(child_size) + origin.to_vec();
        vec![ViewGeometry::new(
            child_origin,
            ViewSize::new(child_size, placement.proposal),
        )]
    }
}

/// Insets its child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddingLayout {
    pub insets: EdgeInsets,
}

impl UnaryLayout for PaddingLayout {
    fn size_that_fits(&self, proposal: ProposedSize, child: &LayoutProxy) -> Size {
        let size = child.size_that_fits(proposal.inset(self.insets));
        Size::new(
            size.x + self.insets.horizontal(),
            size.y + self.insets.vertical(),
        )
    }

    fn placement(&self, size: ViewSize, _child: &LayoutProxy) -> Placement {
        let inner = size.inset(self.insets);
        Placement::new(
            inner.proposal,
            UnitPoint::TOP_LEADING,
            Point::new(self.insets.leading, self.insets.top),
        )
    }

    fn spacing(&self, child: &LayoutProxy) -> Spacing {
        child.spacing().inset(self.insets)
    }
}

/// Gives its child a fixed width and/or height and aligns it inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLayout {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub alignment: UnitPoint,
}

impl FrameLayout {
    pub fn new(width: Option<f64>, height: Option<f64>) -> FrameLayout {
        FrameLayout {
            width,
            height,
            alignment: UnitPoint::CENTER,
        }
    }

    fn child_proposal(&self, proposal: ProposedSize) -> ProposedSize {
        ProposedSize::new(
            self.width.or(proposal.width),
            self.height.or(proposal.height),
        )
    }
}

impl UnaryLayout for FrameLayout {
    fn size_that_fits(&self, proposal: ProposedSize, child: &LayoutProxy) -> Size {
        let (width, height) = match (self.width, self.height) {
            (Some(width), Some(height)) => return Size::new(width, height),
            fixed => fixed,
        };
        let size = child.size_that_fits(self.child_proposal(proposal));
        Size::new(width.unwrap_or(size.x), height.unwrap_or(size.y))
    }

    fn placement(&self, size: ViewSize, _child: &LayoutProxy) -> Placement {
        Placement::new(
            self.child_proposal(size.value.into()),
            self.alignment,
            self.alignment.in_size(size.value),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DefaultLayoutEngine;
    use crate::update;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Fixed(Size);

    impl LayoutEngine for Fixed {
        fn size_that_fits(&mut self, _proposal: ProposedSize) -> Size {
            self.0
        }
    }

    #[test]
    fn padding() {
        update::ensure(|| {
            let child = LayoutProxy::new(LayoutComputer::new(DefaultLayoutEngine));
            let mut engine = UnaryLayoutEngine::new(
                PaddingLayout {
                    insets: EdgeInsets::all(5.),
                },
                child,
            );
            let size = engine.size_that_fits(ProposedSize::new(Some(100.), None));
            assert_eq!(size, Size::new(100., 20.));

            let geometries = engine.child_geometries(
                ViewSize::new(size, ProposedSize::new(Some(100.), None)),
                Point::new(10., 10.),
            );
            assert_eq!(geometries.len(), 1);
            assert_eq!(geometries[0].origin, Point::new(15., 15.));
            assert_eq!(geometries[0].size.value, Size::new(90., 10.));
        });
    }

    #[test]
    fn frame_centers_child() {
        update::ensure(|| {
            let child = LayoutProxy::new(LayoutComputer::new(Fixed(Size::new(10., 10.))));
            let computer = LayoutComputer::new(UnaryLayoutEngine::new(
                FrameLayout::new(Some(50.), None),
                child,
            ));
            let size = computer.size_that_fits(ProposedSize::UNSPECIFIED);
            assert_eq!(size, Size::new(50., 10.));

            let geometries =
                computer.child_geometries(ViewSize::fixed(Size::new(50., 30.)), Point::origin());
            assert_eq!(geometries[0].origin, Point::new(20., 10.));
        });
    }

    #[test]
    fn missing_child_is_empty() {
        update::ensure(|| {
            let mut engine =
                UnaryLayoutEngine::new(FrameLayout::new(None, Some(4.)), LayoutProxy::empty());
            assert_eq!(engine.size_that_fits(ProposedSize::UNSPECIFIED), Size::new(0., 4.));
            assert_eq!(engine.spacing(), Spacing::ZERO);
        });
    }

    #[test]
    fn answers_are_cached() {
        update::ensure(|| {
            let child = LayoutComputer::new(Fixed(Size::new(10., 10.)));
            let mut engine = UnaryLayoutEngine::new(
                FrameLayout::new(None, None),
                LayoutProxy::new(child.clone()),
            );
            let proposal = ProposedSize::new(Some(30.), Some(30.));
            assert_eq!(engine.size_that_fits(proposal), Size::new(10., 10.));

            // the cache does not see changes made behind its back
            child.with_mutable_engine(|fixed: &mut Fixed| fixed.0 = Size::new(1., 1.));
            assert_eq!(engine.size_that_fits(proposal), Size::new(10., 10.));
            assert_eq!(
                engine.size_that_fits(ProposedSize::UNSPECIFIED),
                Size::new(1., 1.)
            );
        });
    }
}
