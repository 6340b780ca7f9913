//! Geometry types shared by the capture, effect and presentation stages
//!
//! Floating point types (`Point`, `Size`, `Rect`) describe regions in either the
//! full-resolution or the downsampled coordinate space. Integer types
//! (`IntSize`, `IntOffset`) describe pixel dimensions and layout offsets reported
//! by the UI layer.

// ─────────────────────────────────────────────────────────────────────────────
// Floating point geometry
// ─────────────────────────────────────────────────────────────────────────────

/// 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 2D size
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero, negative or NaN
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Scale both dimensions by `factor`
    pub fn scale(&self, factor: f32) -> Size {
        Size::new(self.width * factor, self.height * factor)
    }

    /// Smallest integer size that covers this size (at least 1x1)
    pub fn ceil_int(&self) -> IntSize {
        IntSize::new(
            (self.width.ceil() as u32).max(1),
            (self.height.ceil() as u32).max(1),
        )
    }
}

/// 2D rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        origin: Point::ZERO,
        size: Size::ZERO,
    };

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub fn x(&self) -> f32 {
        self.origin.x
    }

    pub fn y(&self) -> f32 {
        self.origin.y
    }

    pub fn width(&self) -> f32 {
        self.size.width
    }

    pub fn height(&self) -> f32 {
        self.size.height
    }

    pub fn right(&self) -> f32 {
        self.origin.x + self.size.width
    }

    pub fn bottom(&self) -> f32 {
        self.origin.y + self.size.height
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    /// Move the rectangle by (dx, dy)
    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(
            self.origin.x + dx,
            self.origin.y + dy,
            self.size.width,
            self.size.height,
        )
    }

    /// Same rectangle placed at a new origin
    pub fn with_origin(&self, origin: Point) -> Rect {
        Rect::from_origin_size(origin, self.size)
    }

    /// Uniformly scale origin and size
    pub fn scale(&self, factor: f32) -> Rect {
        Rect::new(
            self.origin.x * factor,
            self.origin.y * factor,
            self.size.width * factor,
            self.size.height * factor,
        )
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.x <= self.right()
            && point.y >= self.origin.y
            && point.y <= self.bottom()
    }

    /// Component-wise comparison with an absolute tolerance
    pub fn approx_eq(&self, other: &Rect, epsilon: f32) -> bool {
        (self.origin.x - other.origin.x).abs() <= epsilon
            && (self.origin.y - other.origin.y).abs() <= epsilon
            && (self.size.width - other.size.width).abs() <= epsilon
            && (self.size.height - other.size.height).abs() <= epsilon
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Integer geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Pixel dimensions of a texture, surface or region
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntSize {
    pub width: u32,
    pub height: u32,
}

impl IntSize {
    pub const ZERO: IntSize = IntSize {
        width: 0,
        height: 0,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Divide by an integer factor, rounding to nearest and keeping at least one pixel
    ///
    /// This is the size relation between the full-resolution and the downsampled
    /// capture textures.
    pub fn downsampled(&self, factor: u32) -> IntSize {
        let factor = factor.max(1) as f32;
        IntSize::new(
            ((self.width as f32 / factor).round() as u32).max(1),
            ((self.height as f32 / factor).round() as u32).max(1),
        )
    }

    pub fn to_size(&self) -> Size {
        Size::new(self.width as f32, self.height as f32)
    }
}

/// Integer offset of a region's top-left corner in root coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntOffset {
    pub x: i32,
    pub y: i32,
}

impl IntOffset {
    pub const ZERO: IntOffset = IntOffset { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_point(&self) -> Point {
        Point::new(self.x as f32, self.y as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsampled_rounds_to_nearest() {
        assert_eq!(IntSize::new(100, 50).downsampled(2), IntSize::new(50, 25));
        assert_eq!(IntSize::new(101, 51).downsampled(2), IntSize::new(51, 26));
        assert_eq!(IntSize::new(7, 7).downsampled(4), IntSize::new(2, 2));
        // Never collapses to zero
        assert_eq!(IntSize::new(1, 1).downsampled(8), IntSize::new(1, 1));
    }

    #[test]
    fn test_rect_translate_keeps_size() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0).translate(5.0, -5.0);
        assert_eq!(rect, Rect::new(15.0, 15.0, 30.0, 40.0));
    }

    #[test]
    fn test_empty_sizes() {
        assert!(Size::ZERO.is_empty());
        assert!(Size::new(10.0, 0.0).is_empty());
        assert!(Size::new(f32::NAN, 10.0).is_empty());
        assert!(!Size::new(0.5, 0.5).is_empty());
        assert!(IntSize::new(0, 10).is_empty());
    }

    #[test]
    fn test_ceil_int_covers_fraction() {
        assert_eq!(Size::new(12.5, 3.0).ceil_int(), IntSize::new(13, 3));
        assert_eq!(Size::new(0.2, 0.2).ceil_int(), IntSize::new(1, 1));
    }
}
