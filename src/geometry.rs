//! Geometry types used by layout.

use cgmath::{EuclideanSpace, Point2, Vector2, Zero};

/// A size. `x` is the width, `y` the height.
pub type Size = Vector2<f64>;

/// A point.
pub type Point = Point2<f64>;

/// Default distance between adjacent views, in points.
pub const DEFAULT_SPACING: f64 = 8.;

/// A layout axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::Horizontal => Axis::Vertical,
            Axis::Vertical => Axis::Horizontal,
        }
    }

    /// Returns the component of `size` along this axis.
    pub fn select(self, size: Size) -> f64 {
        match self {
            Axis::Horizontal => size.x,
            Axis::Vertical => size.y,
        }
    }
}

/// A rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(origin: Point, size: Size) -> Rect {
        Rect { origin, size }
    }

    pub fn center(&self) -> Point {
        self.origin + self.size / 2.
    }

    /// Returns a new rectangle inset by the given insets.
    pub fn inset(&self, insets: EdgeInsets) -> Rect {
        Rect {
            origin: (self.origin.x + insets.leading, self.origin.y + insets.top).into(),
            size: (
                (self.size.x - insets.horizontal()).max(0.),
                (self.size.y - insets.vertical()).max(0.),
            )
                .into(),
        }
    }
}

/// Insets on the four edges of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EdgeInsets {
    pub top: f64,
    pub leading: f64,
    pub bottom: f64,
    pub trailing: f64,
}

impl EdgeInsets {
    pub fn new(top: f64, leading: f64, bottom: f64, trailing: f64) -> EdgeInsets {
        EdgeInsets {
            top,
            leading,
            bottom,
            trailing,
        }
    }

    pub fn all(value: f64) -> EdgeInsets {
        EdgeInsets::new(value, value, value, value)
    }

    pub fn horizontal(&self) -> f64 {
        self.leading + self.trailing
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }
}

/// A size proposed by a parent, where `None` leaves a dimension up to the child.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProposedSize {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl ProposedSize {
    pub const UNSPECIFIED: ProposedSize = ProposedSize {
        width: None,
        height: None,
    };
    pub const ZERO: ProposedSize = ProposedSize {
        width: Some(0.),
        height: Some(0.),
    };
    pub const INFINITY: ProposedSize = ProposedSize {
        width: Some(f64::INFINITY),
        height: Some(f64::INFINITY),
    };

    pub fn new(width: Option<f64>, height: Option<f64>) -> ProposedSize {
        ProposedSize { width, height }
    }

    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::Horizontal => self.width,
            Axis::Vertical => self.height,
        }
    }

    /// Replaces unspecified dimensions with those of `default`.
    pub fn fixing(&self, default: Size) -> Size {
        Size::new(self.width.unwrap_or(default.x), self.height.unwrap_or(default.y))
    }

    /// Shrinks the specified dimensions by `insets`, never below zero.
    pub fn inset(&self, insets: EdgeInsets) -> ProposedSize {
        ProposedSize {
            width: self.width.map(|w| (w - insets.horizontal()).max(0.)),
            height: self.height.map(|h| (h - insets.vertical()).max(0.)),
        }
    }
}

impl From<Size> for ProposedSize {
    fn from(size: Size) -> ProposedSize {
        ProposedSize::new(Some(size.x), Some(size.y))
    }
}

/// A view's chosen size together with the proposal it was chosen for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSize {
    pub value: Size,
    pub proposal: ProposedSize,
}

impl ViewSize {
    pub fn new(value: Size, proposal: ProposedSize) -> ViewSize {
        ViewSize { value, proposal }
    }

    /// A size that was proposed exactly.
    pub fn fixed(value: Size) -> ViewSize {
        ViewSize {
            value,
            proposal: value.into(),
        }
    }

    pub fn zero() -> ViewSize {
        ViewSize::fixed(Size::zero())
    }

    pub fn width(&self) -> f64 {
        self.value.x
    }

    pub fn height(&self) -> f64 {
        self.value.y
    }

    pub fn inset(&self, insets: EdgeInsets) -> ViewSize {
        ViewSize {
            value: Size::new(
                (self.value.x - insets.horizontal()).max(0.),
                (self.value.y - insets.vertical()).max(0.),
            ),
            proposal: self.proposal.inset(insets),
        }
    }
}

/// The placement of a view in its parent's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewGeometry {
    pub origin: Point,
    pub size: ViewSize,
}

impl ViewGeometry {
    pub fn new(origin: Point, size: ViewSize) -> ViewGeometry {
        ViewGeometry { origin, size }
    }

    pub fn zero() -> ViewGeometry {
        ViewGeometry::new(Point::origin(), ViewSize::zero())
    }

    pub fn frame(&self) -> Rect {
        Rect::new(self.origin, self.size.value)
    }
}

/// A point in a rectangle's unit coordinate space, e.g. `(0.5, 0.5)` for its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitPoint {
    pub x: f64,
    pub y: f64,
}

impl UnitPoint {
    pub const TOP_LEADING: UnitPoint = UnitPoint { x: 0., y: 0. };
    pub const CENTER: UnitPoint = UnitPoint { x: 0.5, y: 0.5 };
    pub const BOTTOM_TRAILING: UnitPoint = UnitPoint { x: 1., y: 1. };

    pub fn new(x: f64, y: f64) -> UnitPoint {
        UnitPoint { x, y }
    }

    /// The point in a rectangle of the given size.
    pub fn in_size(&self, size: Size) -> Point {
        Point::new(self.x * size.x, self.y * size.y)
    }
}

/// Where a parent places a child: the child's `anchor` lands on `anchor_position`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub proposal: ProposedSize,
    pub anchor: UnitPoint,
    pub anchor_position: Point,
}

impl Placement {
    pub fn new(proposal: ProposedSize, anchor: UnitPoint, anchor_position: Point) -> Placement {
        Placement {
            proposal,
            anchor,
            anchor_position,
        }
    }

    /// The child's frame origin given its chosen size.
    pub fn origin(&self, size: Size) -> Point {
        self.anchor_position - self.anchor.in_size(size).to_vec()
    }
}

/// Identifies an alignment guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignmentId {
    Leading,
    Center,
    Trailing,
    Custom(u32),
}

/// An alignment guide along an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentKey {
    pub id: AlignmentId,
    pub axis: Axis,
}

impl AlignmentKey {
    pub const LEADING: AlignmentKey = AlignmentKey::new(AlignmentId::Leading, Axis::Horizontal);
    pub const HORIZONTAL_CENTER: AlignmentKey =
        AlignmentKey::new(AlignmentId::Center, Axis::Horizontal);
    pub const TRAILING: AlignmentKey = AlignmentKey::new(AlignmentId::Trailing, Axis::Horizontal);
    pub const TOP: AlignmentKey = AlignmentKey::new(AlignmentId::Leading, Axis::Vertical);
    pub const VERTICAL_CENTER: AlignmentKey =
        AlignmentKey::new(AlignmentId::Center, Axis::Vertical);
    pub const BOTTOM: AlignmentKey = AlignmentKey::new(AlignmentId::Trailing, Axis::Vertical);

    pub const fn new(id: AlignmentId, axis: Axis) -> AlignmentKey {
        AlignmentKey { id, axis }
    }

    /// The guide's position in a view of the given size when the view defines none.
    pub fn default_value(&self, size: Size) -> f64 {
        let length = self.axis.select(size);
        match self.id {
            AlignmentId::Leading => 0.,
            AlignmentId::Center | AlignmentId::Custom(_) => length / 2.,
            AlignmentId::Trailing => length,
        }
    }
}

/// Preferred minimum distances to neighboring views, per edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spacing {
    pub top: f64,
    pub leading: f64,
    pub bottom: f64,
    pub trailing: f64,
}

impl Spacing {
    pub const ZERO: Spacing = Spacing {
        top: 0.,
        leading: 0.,
        bottom: 0.,
        trailing: 0.,
    };

    pub fn all(value: f64) -> Spacing {
        Spacing {
            top: value,
            leading: value,
            bottom: value,
            trailing: value,
        }
    }

    /// The larger spacing on every edge.
    pub fn union(&self, other: &Spacing) -> Spacing {
        Spacing {
            top: self.top.max(other.top),
            leading: self.leading.max(other.leading),
            bottom: self.bottom.max(other.bottom),
            trailing: self.trailing.max(other.trailing),
        }
    }

    /// Distance between this view and a `next` view placed after it along `axis`.
    pub fn distance_to(&self, next: &Spacing, axis: Axis) -> f64 {
        match axis {
            Axis::Horizontal => self.trailing.max(next.leading),
            Axis::Vertical => self.bottom.max(next.top),
        }
    }

    /// Removes spacing on edges covered by `insets`.
    pub fn inset(&self, insets: EdgeInsets) -> Spacing {
        let clear = |spacing: f64, inset: f64| if inset > 0. { 0. } else { spacing };
        Spacing {
            top: clear(self.top, insets.top),
            leading: clear(self.leading, insets.leading),
            bottom: clear(self.bottom, insets.bottom),
            trailing: clear(self.trailing, insets.trailing),
        }
    }
}

impl Default for Spacing {
    fn default() -> Spacing {
        Spacing::all(DEFAULT_SPACING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_fixing() {
        let proposal = ProposedSize::new(Some(10.), None);
        assert_eq!(proposal.fixing(Size::new(1., 2.)), Size::new(10., 2.));
        assert_eq!(proposal.get(Axis::Vertical), None);
        assert_eq!(
            ProposedSize::new(Some(10.), Some(3.)).inset(EdgeInsets::all(2.)),
            ProposedSize::new(Some(6.), Some(0.))
        );
    }

    #[test]
    fn placement_origin() {
        let placement = Placement::new(
            ProposedSize::UNSPECIFIED,
            UnitPoint::CENTER,
            Point::new(50., 50.),
        );
        assert_eq!(placement.origin(Size::new(20., 10.)), Point::new(40., 45.));
    }

    #[test]
    fn alignment_defaults() {
        let size = Size::new(20., 10.);
        assert_eq!(AlignmentKey::LEADING.default_value(size), 0.);
        assert_eq!(AlignmentKey::HORIZONTAL_CENTER.default_value(size), 10.);
        assert_eq!(AlignmentKey::BOTTOM.default_value(size), 10.);
    }

    #[test]
    fn spacing() {
        let spacing = Spacing::default().inset(EdgeInsets::new(1., 0., 0., 0.));
        assert_eq!(spacing.top, 0.);
        assert_eq!(spacing.leading, DEFAULT_SPACING);
        assert_eq!(Spacing::ZERO.distance_to(&Spacing::all(4.), Axis::Horizontal), 4.);
    }

    #[test]
    fn rect() {
        let rect = Rect::new(Point::new(0., 0.), Size::new(10., 10.)).inset(EdgeInsets::all(2.));
        assert_eq!(rect, Rect::new(Point::new(2., 2.), Size::new(6., 6.)));
        assert_eq!(rect.center(), Point::new(5., 5.));
    }
}
