use glam::{Affine2, Vec2};
use lyon::geom::{point, CubicBezierSegment, QuadraticBezierSegment};

use crate::geom::{hard_clip, Rect};

/// A vector path composed of line segments and Bezier curves.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    segments: Vec<PathSegment>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PathSegment {
    MoveTo(Vec2),
    LineTo(Vec2),
    QuadTo {
        control: Vec2,
        end: Vec2,
    },
    CubicTo {
        control1: Vec2,
        control2: Vec2,
        end: Vec2,
    },
    Close,
}

/// A flattened subpath.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polyline {
    pub points: Vec<Vec2>,
    pub closed: bool,
}

impl Path {
    pub fn builder() -> PathBuilder {
        PathBuilder::new()
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> impl Iterator<Item = PathSegment> + '_ {
        self.segments.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of points in the path's point-type stream. Quadratic
    /// segments count as two points, cubics as three; `Close` adds none.
    pub fn point_count(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match s {
                PathSegment::MoveTo(_) | PathSegment::LineTo(_) => 1,
                PathSegment::QuadTo { .. } => 2,
                PathSegment::CubicTo { .. } => 3,
                PathSegment::Close => 0,
            })
            .sum()
    }

    pub fn transformed(&self, m: &Affine2) -> Path {
        let t = |p: Vec2| m.transform_point2(p);
        Path {
            segments: self
                .segments
                .iter()
                .map(|s| match *s {
                    PathSegment::MoveTo(p) => PathSegment::MoveTo(t(p)),
                    PathSegment::LineTo(p) => PathSegment::LineTo(t(p)),
                    PathSegment::QuadTo { control, end } => PathSegment::QuadTo {
                        control: t(control),
                        end: t(end),
                    },
                    PathSegment::CubicTo {
                        control1,
                        control2,
                        end,
                    } => PathSegment::CubicTo {
                        control1: t(control1),
                        control2: t(control2),
                        end: t(end),
                    },
                    PathSegment::Close => PathSegment::Close,
                })
                .collect(),
        }
    }

    /// Bounding box of every point, control points included.
    pub fn bounds(&self) -> Option<Rect> {
        let mut points = self.segments.iter().flat_map(|s| match *s {
            PathSegment::MoveTo(p) | PathSegment::LineTo(p) => [Some(p), None, None],
            PathSegment::QuadTo { control, end } => [Some(control), Some(end), None],
            PathSegment::CubicTo {
                control1,
                control2,
                end,
            } => [Some(control1), Some(control2), Some(end)],
            PathSegment::Close => [None, None, None],
        });
        let first = points.find_map(|p| p)?;
        let (min, max) = points
            .flatten()
            .fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Rect::new(min, max))
    }

    /// If this path is an axis-aligned rectangle under `m` (four points,
    /// or five with the last repeating the first), returns it in device space.
    pub fn as_rect(&self, m: &Affine2) -> Option<Rect> {
        let count = self.point_count();
        if count != 4 && count != 5 {
            return None;
        }
        let mut points = Vec::with_capacity(5);
        for (i, segment) in self.segments.iter().enumerate() {
            match *segment {
                PathSegment::MoveTo(p) if i == 0 => points.push(p),
                PathSegment::LineTo(p) if i > 0 => points.push(p),
                PathSegment::Close if i == self.segments.len() - 1 => {}
                _ => return None,
            }
        }
        if points.len() == 5 && points[4] != points[0] {
            return None;
        }
        let p: Vec<Vec2> = points[..4].iter().map(|&p| m.transform_point2(p)).collect();
        let vertical_first = p[0].x == p[1].x && p[1].y == p[2].y && p[2].x == p[3].x && p[3].y == p[0].y;
        let horizontal_first =
            p[0].y == p[1].y && p[1].x == p[2].x && p[2].y == p[3].y && p[3].x == p[0].x;
        if !(vertical_first || horizontal_first) || p[0].x == p[2].x || p[0].y == p[2].y {
            return None;
        }
        Some(Rect::from_points(p[0], p[2]))
    }

    /// Transforms the path by `m` and flattens curves to polylines with
    /// the given tolerance in output units.
    ///
    /// Points are hard-clipped, and a lone move/line pair with identical
    /// coordinates is widened by one unit so it still produces coverage.
    pub fn flatten(&self, m: &Affine2, tolerance: f32) -> Vec<Polyline> {
        let mut out = Vec::new();
        let mut current = Polyline::default();
        let mut start = Vec2::ZERO;
        let mut last = Vec2::ZERO;
        let t = |p: Vec2| m.transform_point2(p);

        for (i, segment) in self.segments.iter().enumerate() {
            match *segment {
                PathSegment::MoveTo(p) => {
                    if current.points.len() > 1 {
                        out.push(std::mem::take(&mut current));
                    }
                    current.points.clear();
                    current.closed = false;
                    current.points.push(hard_clip(t(p)));
                    start = p;
                    last = p;
                }
                PathSegment::LineTo(p) => {
                    let mut q = hard_clip(t(p));
                    let lone = matches!(self.segments.get(i.wrapping_sub(1)), Some(PathSegment::MoveTo(_)))
                        && !matches!(
                            self.segments.get(i + 1),
                            Some(PathSegment::LineTo(_))
                                | Some(PathSegment::QuadTo { .. })
                                | Some(PathSegment::CubicTo { .. })
                        );
                    if lone && p == last {
                        q.x += 1.0;
                    }
                    current.points.push(q);
                    last = p;
                }
                PathSegment::QuadTo { control, end } => {
                    let curve = QuadraticBezierSegment {
                        from: lyon_point(t(last)),
                        ctrl: lyon_point(t(control)),
                        to: lyon_point(t(end)),
                    };
                    current
                        .points
                        .extend(curve.flattened(tolerance).map(|p| hard_clip(Vec2::new(p.x, p.y))));
                    last = end;
                }
                PathSegment::CubicTo {
                    control1,
                    control2,
                    end,
                } => {
                    let curve = CubicBezierSegment {
                        from: lyon_point(t(last)),
                        ctrl1: lyon_point(t(control1)),
                        ctrl2: lyon_point(t(control2)),
                        to: lyon_point(t(end)),
                    };
                    current
                        .points
                        .extend(curve.flattened(tolerance).map(|p| hard_clip(Vec2::new(p.x, p.y))));
                    last = end;
                }
                PathSegment::Close => {
                    current.closed = true;
                    if current.points.len() > 1 {
                        out.push(std::mem::take(&mut current));
                    }
                    current.points.clear();
                    current.points.push(hard_clip(t(start)));
                    last = start;
                }
            }
        }
        if current.points.len() > 1 {
            out.push(current);
        }
        out
    }
}

fn lyon_point(v: Vec2) -> lyon::geom::Point<f32> {
    point(v.x, v.y)
}

/// A builder for a [`Path`].
///
/// Maintains a current "pen position," which is initially
/// set to the origin.
#[derive(Default)]
pub struct PathBuilder {
    path: Path,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the pen position to the given point without
    /// drawing a segment to it.
    pub fn move_to(mut self, point: Vec2) -> Self {
        self.path.segments.push(PathSegment::MoveTo(point));
        self
    }

    pub fn line_to(mut self, point: Vec2) -> Self {
        self.path.segments.push(PathSegment::LineTo(point));
        self
    }

    pub fn quad_to(mut self, control: Vec2, end: Vec2) -> Self {
        self.path.segments.push(PathSegment::QuadTo { control, end });
        self
    }

    pub fn cubic_to(mut self, control1: Vec2, control2: Vec2, end: Vec2) -> Self {
        self.path.segments.push(PathSegment::CubicTo {
            control1,
            control2,
            end,
        });
        self
    }

    /// Appends an axis-aligned rectangle as a closed four-point subpath.
    pub fn rect(self, min: Vec2, max: Vec2) -> Self {
        self.move_to(min)
            .line_to(Vec2::new(max.x, min.y))
            .line_to(max)
            .line_to(Vec2::new(min.x, max.y))
            .close_subpath()
    }

    /// Closes the current subpath without finishing the builder.
    pub fn close_subpath(mut self) -> Self {
        self.path.segments.push(PathSegment::Close);
        self
    }

    /// Closes the path, then builds it.
    pub fn close(self) -> Path {
        self.close_subpath().build()
    }

    pub fn build(self) -> Path {
        self.path
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use super::*;

    #[test]
    fn rectangle_detection() {
        let path = Path::builder().rect(vec2(1.0, 2.0), vec2(5.0, 7.0)).build();
        assert_eq!(path.point_count(), 4);
        let rect = path.as_rect(&Affine2::IDENTITY).unwrap();
        assert_eq!(rect.min, vec2(1.0, 2.0));
        assert_eq!(rect.max, vec2(5.0, 7.0));

        let rotated = Affine2::from_angle(0.3);
        assert!(path.as_rect(&rotated).is_none());
    }

    #[test]
    fn five_point_rectangle_must_close_on_start() {
        let closed = Path::builder()
            .move_to(vec2(0.0, 0.0))
            .line_to(vec2(4.0, 0.0))
            .line_to(vec2(4.0, 4.0))
            .line_to(vec2(0.0, 4.0))
            .line_to(vec2(0.0, 0.0))
            .build();
        assert!(closed.as_rect(&Affine2::IDENTITY).is_some());

        let open = Path::builder()
            .move_to(vec2(0.0, 0.0))
            .line_to(vec2(4.0, 0.0))
            .line_to(vec2(4.0, 4.0))
            .line_to(vec2(0.0, 4.0))
            .line_to(vec2(1.0, 0.0))
            .build();
        assert!(open.as_rect(&Affine2::IDENTITY).is_none());
    }

    #[test]
    fn curves_count_multiple_points() {
        let path = Path::builder()
            .move_to(vec2(0.0, 0.0))
            .quad_to(vec2(1.0, 1.0), vec2(2.0, 0.0))
            .cubic_to(vec2(3.0, 1.0), vec2(4.0, 1.0), vec2(5.0, 0.0))
            .close();
        assert_eq!(path.point_count(), 6);
        assert!(path.as_rect(&Affine2::IDENTITY).is_none());
    }

    #[test]
    fn zero_length_line_is_widened() {
        let path = Path::builder()
            .move_to(vec2(3.0, 3.0))
            .line_to(vec2(3.0, 3.0))
            .build();
        let lines = path.flatten(&Affine2::IDENTITY, 0.25);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].points, vec![vec2(3.0, 3.0), vec2(4.0, 3.0)]);
    }

    #[test]
    fn flattening_ends_curves_on_their_endpoint() {
        let path = Path::builder()
            .move_to(vec2(0.0, 0.0))
            .cubic_to(vec2(0.0, 10.0), vec2(10.0, 10.0), vec2(10.0, 0.0))
            .close();
        let lines = path.flatten(&Affine2::IDENTITY, 0.1);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].closed);
        assert!(lines[0].points.len() > 4);
        let last = *lines[0].points.last().unwrap();
        assert!((last - vec2(10.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn flattening_applies_hard_clip() {
        let path = Path::builder()
            .move_to(vec2(0.0, 0.0))
            .line_to(vec2(1e7, 0.0))
            .line_to(vec2(0.0, 1.0))
            .close();
        let lines = path.flatten(&Affine2::IDENTITY, 0.25);
        assert_eq!(lines[0].points[1].x, crate::geom::HARD_CLIP);
    }
}
