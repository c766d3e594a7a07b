//! Geometry primitives shared by every monitor-facing type.
//!
//! All coordinates live in the desktop coordinate space: a single plane shared
//! by every monitor, with the origin usually (but not always) at the primary
//! monitor's top-left corner.  X grows to the right and Y grows downwards.

use serde::{Deserialize, Serialize};

/// A point in desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns this point moved by `(dx, dy)`, saturating at the `i32` range.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// Returns this point moved by `(dx, dy)`, or `None` if either coordinate
    /// leaves the `i32` range.
    pub fn checked_offset(self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
        })
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the size with width and height exchanged (a 90° rotation).
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

/// A rectangle given by its edges: `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Builds the rectangle covered by a monitor at `origin` with `size`.
    /// Edges past the `i32` range are clamped; see [`Rect::checked_from_origin_size`].
    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self {
            left: origin.x,
            top: origin.y,
            right: origin.x.saturating_add_unsigned(size.width),
            bottom: origin.y.saturating_add_unsigned(size.height),
        }
    }

    /// As [`Rect::from_origin_size`], but `None` if the far edges do not fit
    /// in `i32`.
    pub fn checked_from_origin_size(origin: Point, size: Size) -> Option<Self> {
        Some(Self {
            left: origin.x,
            top: origin.y,
            right: origin.x.checked_add_unsigned(size.width)?,
            bottom: origin.y.checked_add_unsigned(size.height)?,
        })
    }

    pub fn width(&self) -> u32 {
        if self.right > self.left {
            self.right.abs_diff(self.left)
        } else {
            0
        }
    }

    pub fn height(&self) -> u32 {
        if self.bottom > self.top {
            self.bottom.abs_diff(self.top)
        } else {
            0
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Returns `true` if `point` lies inside the rectangle (half-open on the
    /// right and bottom edges, so two touching monitors never both claim a
    /// boundary pixel).
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }

    /// Returns `true` if the two rectangles share any area.  Touching edges do
    /// not count as an overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.top < other.bottom
            && self.bottom > other.top
    }
}

/// A rectangle given by origin and size, the `(left, top, width, height)` view
/// of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl From<Rect> for Bounds {
    fn from(rect: Rect) -> Self {
        Self {
            left: rect.left,
            top: rect.top,
            width: rect.width(),
            height: rect.height(),
        }
    }
}

impl From<Bounds> for Rect {
    fn from(b: Bounds) -> Self {
        Rect::from_origin_size(Point::new(b.left, b.top), Size::new(b.width, b.height))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
