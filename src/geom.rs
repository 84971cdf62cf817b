use glam::{vec2, Affine2, Vec2};

/// Device coordinates are clamped to this box before rasterization
/// so edge accumulators never overflow.
pub const HARD_CLIP: f32 = 50000.0;

pub fn hard_clip(p: Vec2) -> Vec2 {
    p.clamp(Vec2::splat(-HARD_CLIP), Vec2::splat(HARD_CLIP))
}

/// Returns the linear part of `m` as `[a, b, c, d]`, where
/// `x' = a*x + c*y` and `y' = b*x + d*y`.
pub fn coefficients(m: &Affine2) -> [f32; 4] {
    [
        m.matrix2.x_axis.x,
        m.matrix2.x_axis.y,
        m.matrix2.y_axis.x,
        m.matrix2.y_axis.y,
    ]
}

pub fn from_coefficients([a, b, c, d]: [f32; 4], translation: Vec2) -> Affine2 {
    Affine2::from_cols(vec2(a, b), vec2(c, d), translation)
}

/// Average length of one user-space unit in device space.
pub fn unit_scale(m: &Affine2) -> f32 {
    m.matrix2.determinant().abs().sqrt()
}

/// A floating-point rectangle stored as its min and max corners.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Smallest integer rectangle containing this one.
    pub fn outer(&self) -> IntRect {
        IntRect::new(
            self.min.x.floor() as i32,
            self.min.y.floor() as i32,
            self.max.x.ceil() as i32,
            self.max.y.ceil() as i32,
        )
    }
}

/// A pixel rectangle, half-open on the right and bottom edges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct IntRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IntRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Intersection of two rectangles. An empty result is normalized
    /// to a zero-sized rectangle so comparisons stay meaningful.
    pub fn intersect(&self, other: &IntRect) -> IntRect {
        let r = IntRect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() {
            IntRect::default()
        } else {
            r
        }
    }

    pub fn union(&self, other: &IntRect) -> IntRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        IntRect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn offset(&self, dx: i32, dy: i32) -> IntRect {
        IntRect::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_intersection_is_normalized() {
        let a = IntRect::new(0, 0, 10, 10);
        let b = IntRect::new(20, 20, 30, 30);
        assert_eq!(a.intersect(&b), IntRect::default());
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn outer_rect_rounds_outwards() {
        let r = Rect::new(vec2(0.5, 1.2), vec2(3.1, 4.0));
        assert_eq!(r.outer(), IntRect::new(0, 1, 4, 4));
    }

    #[test]
    fn hard_clip_clamps_both_axes() {
        let p = hard_clip(vec2(1e9, -1e9));
        assert_eq!(p, vec2(HARD_CLIP, -HARD_CLIP));
    }

    #[test]
    fn coefficients_round_trip() {
        let m = from_coefficients([1.0, 2.0, 3.0, 4.0], vec2(5.0, 6.0));
        assert_eq!(coefficients(&m), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.transform_point2(vec2(1.0, 0.0)), vec2(6.0, 8.0));
    }
}
