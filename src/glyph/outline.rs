//! Glyph outlines as point lists, for styling before rasterization.
//!
//! Points keep their on-curve / control distinction so synthetic bold can
//! push control points along with the curve they shape.

use glam::Vec2;
use ttf_parser::{GlyphId, OutlineBuilder};

use crate::{
    geom::Rect,
    path::{Path, PathSegment},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PointKind {
    On,
    /// Control point of a quadratic segment.
    Conic,
    /// Control point of a cubic segment. Always comes in pairs.
    Cubic,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OutlinePoint {
    pub pos: Vec2,
    pub kind: PointKind,
}

/// Closed contours. Every contour starts with an on-curve point and
/// implicitly returns to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outline {
    contours: Vec<Vec<OutlinePoint>>,
}

/// Why an outline could not be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutlineError {
    #[error("glyph {0} is out of range")]
    GlyphOutOfRange(u32),
    #[error("glyph {0} has a malformed outline")]
    Malformed(u32),
}

struct Collector {
    units_per_em: f32,
    contours: Vec<Vec<OutlinePoint>>,
    current: Vec<OutlinePoint>,
}

impl Collector {
    fn push(&mut self, x: f32, y: f32, kind: PointKind) {
        self.current.push(OutlinePoint {
            pos: Vec2::new(x, y) / self.units_per_em,
            kind,
        });
    }

    fn finish_contour(&mut self) {
        let mut contour = std::mem::take(&mut self.current);
        if contour.len() > 1 {
            let first = contour[0].pos;
            if let Some(last) = contour.last() {
                if last.kind == PointKind::On && last.pos == first {
                    contour.pop();
                }
            }
        }
        if !contour.is_empty() {
            self.contours.push(contour);
        }
    }
}

impl OutlineBuilder for Collector {
    fn move_to(&mut self, x: f32, y: f32) {
        self.finish_contour();
        self.push(x, y, PointKind::On);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.push(x, y, PointKind::On);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.push(x1, y1, PointKind::Conic);
        self.push(x, y, PointKind::On);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.push(x1, y1, PointKind::Cubic);
        self.push(x2, y2, PointKind::Cubic);
        self.push(x, y, PointKind::On);
    }

    fn close(&mut self) {
        self.finish_contour();
    }
}

impl Outline {
    /// Extracts the outline of `glyph` in em units, y up.
    ///
    /// A glyph without contours, such as a space, gives an empty outline.
    pub fn load(face: &ttf_parser::Face<'_>, glyph: u32) -> Result<Self, OutlineError> {
        if glyph >= face.number_of_glyphs() as u32 {
            return Err(OutlineError::GlyphOutOfRange(glyph));
        }
        let mut collector = Collector {
            units_per_em: face.units_per_em().max(1) as f32,
            contours: Vec::new(),
            current: Vec::new(),
        };
        let bbox = face.outline_glyph(GlyphId(glyph as u16), &mut collector);
        collector.finish_contour();
        if bbox.is_none() && !collector.contours.is_empty() {
            return Err(OutlineError::Malformed(glyph));
        }
        Ok(Self {
            contours: collector.contours,
        })
    }

    pub fn from_contours(contours: Vec<Vec<OutlinePoint>>) -> Self {
        Self { contours }
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }

    pub fn contours(&self) -> &[Vec<OutlinePoint>] {
        &self.contours
    }

    pub fn is_finite(&self) -> bool {
        self.points().all(|p| p.pos.is_finite())
    }

    fn points(&self) -> impl Iterator<Item = &OutlinePoint> {
        self.contours.iter().flatten()
    }

    fn points_mut(&mut self) -> impl Iterator<Item = &mut OutlinePoint> {
        self.contours.iter_mut().flatten()
    }

    /// Applies `x' = a·x + c·y`, `y' = b·x + d·y`.
    pub fn transform(&mut self, [a, b, c, d]: [f32; 4]) {
        for p in self.points_mut() {
            let Vec2 { x, y } = p.pos;
            p.pos = Vec2::new(a * x + c * y, b * x + d * y);
        }
    }

    pub fn scale(&mut self, factor: f32) {
        for p in self.points_mut() {
            p.pos *= factor;
        }
    }

    /// Rounds every point to the nearest multiple of `1 / steps`.
    pub fn round_to_grid(&mut self, steps: f32) {
        for p in self.points_mut() {
            p.pos = (p.pos * steps).round() / steps;
        }
    }

    /// Bounds of every point, control points included.
    pub fn control_box(&self) -> Option<Rect> {
        let mut points = self.points().map(|p| p.pos);
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Rect::new(min, max))
    }

    /// Twice the signed area; positive for counter-clockwise outer
    /// contours in y-up coordinates.
    fn orientation_area(&self) -> f32 {
        let mut area = 0.0;
        for contour in &self.contours {
            let Some(mut prev) = contour.last().map(|p| p.pos) else {
                continue;
            };
            for p in contour {
                area += (p.pos.y - prev.y) * (p.pos.x + prev.x);
                prev = p.pos;
            }
        }
        area
    }

    /// Thickens strokes by `strength` in both directions, moving every
    /// point along the bisector of its adjacent edges. The lower-left of
    /// the glyph stays put; the outline grows up and to the right.
    pub fn embolden(&mut self, strength: f32) {
        if strength == 0.0 {
            return;
        }
        let area = self.orientation_area();
        if area == 0.0 {
            return;
        }
        let clockwise = area < 0.0;
        let half = strength / 2.0;
        for contour in &mut self.contours {
            let points: Vec<Vec2> = contour.iter().map(|p| p.pos).collect();
            let n = points.len();
            if n < 2 {
                continue;
            }
            for (i, point) in contour.iter_mut().enumerate() {
                let cur = points[i];
                let prev = (1..n)
                    .map(|k| points[(i + n - k) % n])
                    .find(|&p| p != cur);
                let next = (1..n).map(|k| points[(i + k) % n]).find(|&p| p != cur);
                let (Some(prev), Some(next)) = (prev, next) else {
                    continue;
                };
                let shift = corner_shift(cur - prev, next - cur, half, clockwise);
                point.pos = cur + Vec2::splat(half) + shift;
            }
        }
    }

    /// Builds a path with quadratic segments intact, mapping each point
    /// through `map`.
    pub fn to_path(&self, map: impl Fn(Vec2) -> Vec2) -> Path {
        let mut segments = Vec::new();
        for contour in &self.contours {
            let start = map(contour[0].pos);
            segments.push(PathSegment::MoveTo(start));
            walk_contour(contour, &map, |segment| segments.push(segment));
            segments.push(PathSegment::Close);
        }
        Path::from_segments(segments)
    }

    /// Builds the move/line/cubic path handed out by the glyph path
    /// cache. Quadratics are raised to cubics, each figure ends on its
    /// start point, and contours that collapse to a point are dropped.
    pub fn to_glyph_path(&self) -> Path {
        let mut segments = Vec::new();
        let mut figure = Vec::new();
        for contour in &self.contours {
            let start = contour[0].pos;
            figure.clear();
            figure.push(PathSegment::MoveTo(start));
            let mut cur = start;
            walk_contour(contour, &|p: Vec2| p, |segment| match segment {
                PathSegment::QuadTo { control, end } => {
                    figure.push(PathSegment::CubicTo {
                        control1: cur + (control - cur) * 2.0 / 3.0,
                        control2: control + (end - control) / 3.0,
                        end,
                    });
                    cur = end;
                }
                PathSegment::LineTo(p) => {
                    figure.push(segment);
                    cur = p;
                }
                PathSegment::CubicTo { end, .. } => {
                    figure.push(segment);
                    cur = end;
                }
                _ => figure.push(segment),
            });
            if is_degenerate(&figure) {
                continue;
            }
            segments.extend_from_slice(&figure);
            segments.push(PathSegment::Close);
        }
        Path::from_segments(segments)
    }
}

/// Offset of one corner beyond the uniform `half` shift, limited so short
/// edges do not fold over.
fn corner_shift(edge_in: Vec2, edge_out: Vec2, half: f32, clockwise: bool) -> Vec2 {
    let l_in = edge_in.length();
    let l_out = edge_out.length();
    let v_in = edge_in / l_in;
    let v_out = edge_out / l_out;
    let mut d = v_in.dot(v_out);
    // nearly reversed edges: a spike, leave it
    if d <= -0.9375 {
        return Vec2::ZERO;
    }
    d += 1.0;
    let mut shift = Vec2::new(v_in.y + v_out.y, v_in.x + v_out.x);
    if clockwise {
        shift.x = -shift.x;
    } else {
        shift.y = -shift.y;
    }
    let mut q = v_out.x * v_in.y - v_out.y * v_in.x;
    if clockwise {
        q = -q;
    }
    let l = l_in.min(l_out);
    let limit = |s: f32| if half * q <= l * d { s * half / d } else { s * l / q };
    Vec2::new(limit(shift.x), limit(shift.y))
}

/// Emits the segments after the opening move of `contour`, ending back on
/// its first point.
fn walk_contour(contour: &[OutlinePoint], map: &impl Fn(Vec2) -> Vec2, mut emit: impl FnMut(PathSegment)) {
    let n = contour.len();
    let at = |i: usize| map(contour[i % n].pos);
    let mut i = 1;
    while i < n {
        match contour[i].kind {
            PointKind::On => {
                emit(PathSegment::LineTo(at(i)));
                i += 1;
            }
            PointKind::Conic => {
                emit(PathSegment::QuadTo {
                    control: at(i),
                    end: at(i + 1),
                });
                i += 2;
            }
            PointKind::Cubic => {
                emit(PathSegment::CubicTo {
                    control1: at(i),
                    control2: at(i + 1),
                    end: at(i + 2),
                });
                i += 3;
            }
        }
    }
    if contour[n - 1].kind == PointKind::On {
        emit(PathSegment::LineTo(at(0)));
    }
}

fn is_degenerate(figure: &[PathSegment]) -> bool {
    match *figure {
        [PathSegment::MoveTo(p), PathSegment::LineTo(q)] => p == q,
        [PathSegment::MoveTo(p), PathSegment::CubicTo {
            control1,
            control2,
            end,
        }] => p == control1 && p == control2 && p == end,
        _ => false,
    }
}
