//! Integer rectangles in virtual-screen coordinates.
//!
//! Desktop bounds reported by DXGI use edge coordinates (left/top/right/bottom)
//! where the right and bottom edges are exclusive. [`Rect`] keeps that
//! convention and layers the small amount of geometry the capture pipeline
//! needs on top: empty-aware union for computing the capture region, and
//! intersection/offset for assembling frames into the destination buffer.

use windows::Win32::Foundation::RECT;

/// An axis-aligned rectangle with exclusive right/bottom edges.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// The empty rectangle at the origin.
    pub const EMPTY: Self = Self { left: 0, top: 0, right: 0, bottom: 0 };

    /// Constructs a rectangle from its position and size.
    #[inline]
    #[must_use]
    pub const fn from_size(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self { left, top, right: left + width, bottom: top + height }
    }

    /// Gets the width of the rectangle, clamped to zero for degenerate rectangles.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> i32 {
        let width = self.right - self.left;
        if width > 0 { width } else { 0 }
    }

    /// Gets the height of the rectangle, clamped to zero for degenerate rectangles.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> i32 {
        let height = self.bottom - self.top;
        if height > 0 { height } else { 0 }
    }

    /// Checks whether the rectangle covers no pixels.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Returns the bounding box of two rectangles.
    ///
    /// An empty rectangle is the identity element: the union of anything with
    /// an empty rectangle is the other operand, and the union of two empty
    /// rectangles is [`Rect::EMPTY`]. This keeps a fold over zero selected
    /// outputs at the empty region instead of stretching to the origin.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            if other.is_empty() {
                return Self::EMPTY;
            }
            return *other;
        }

        if other.is_empty() {
            return *self;
        }

        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Returns the overlap of two rectangles, or [`Rect::EMPTY`] when they are disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let result = Self {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        };

        if result.left >= result.right || result.top >= result.bottom {
            return Self::EMPTY;
        }

        result
    }

    /// Translates the rectangle by the given amounts.
    #[inline]
    #[must_use]
    pub const fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }
}

impl From<RECT> for Rect {
    fn from(rect: RECT) -> Self {
        Self { left: rect.left, top: rect.top, right: rect.right, bottom: rect.bottom }
    }
}

#[cfg(test)]
mod tests {
    use super::Rect;

    #[test]
    fn union_of_empty_rects_is_empty() {
        assert_eq!(Rect::EMPTY.union(&Rect::EMPTY), Rect::EMPTY);
        assert!(Rect::EMPTY.union(&Rect { left: 5, top: 5, right: 5, bottom: 9 }).is_empty());
    }

    #[test]
    fn union_with_empty_is_identity() {
        let rect = Rect::from_size(1920, 0, 1280, 1024);
        assert_eq!(Rect::EMPTY.union(&rect), rect);
        assert_eq!(rect.union(&Rect::EMPTY), rect);
    }

    #[test]
    fn union_is_commutative_and_idempotent() {
        let a = Rect::from_size(0, 0, 1920, 1080);
        let b = Rect::from_size(1920, 0, 1280, 1024);

        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.union(&a.union(&b)), a.union(&b));
    }

    #[test]
    fn union_spans_side_by_side_outputs() {
        let primary = Rect::from_size(0, 0, 1920, 1080);
        let secondary = Rect::from_size(1920, 0, 1280, 1024);

        let desktop = primary.union(&secondary);
        assert_eq!(desktop, Rect { left: 0, top: 0, right: 3200, bottom: 1080 });
        assert_eq!(desktop.width(), 3200);
        assert_eq!(desktop.height(), 1080);
    }

    #[test]
    fn intersect_clips_to_overlap() {
        let clip = Rect::from_size(200, 200, 500, 500);
        let bounds = Rect::from_size(0, 0, 1920, 1080);
        assert_eq!(clip.intersect(&bounds), clip);

        let offscreen = Rect::from_size(4000, 0, 100, 100);
        assert!(clip.intersect(&offscreen).is_empty());
    }

    #[test]
    fn offset_translates_both_corners() {
        let bounds = Rect::from_size(1920, 0, 1280, 1024);
        let relative = bounds.offset(-1920, 0);
        assert_eq!(relative, Rect::from_size(0, 0, 1280, 1024));
    }
}
