//! Scanline conversion of flattened paths into 8-bit coverage masks.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    bitmap::Bitmap,
    device::DeviceError,
    geom::{IntRect, Rect},
    path::Polyline,
};

pub mod stroke;

/// Vertical samples per pixel row in anti-aliased mode.
const SUB_SCANLINES: usize = 16;

/// Determines which regions of a self-intersecting path are inside.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

impl FillRule {
    fn is_inside(self, winding: i32) -> bool {
        match self {
            FillRule::NonZero => winding != 0,
            FillRule::EvenOdd => winding % 2 != 0,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Edge {
    top: f32,
    bottom: f32,
    x_at_top: f32,
    slope: f32,
    winding: i32,
}

impl Edge {
    fn new(a: Vec2, b: Vec2) -> Option<Self> {
        if a.y == b.y || !a.is_finite() || !b.is_finite() {
            return None;
        }
        let (top, bottom, winding) = if a.y < b.y { (a, b, 1) } else { (b, a, -1) };
        Some(Self {
            top: top.y,
            bottom: bottom.y,
            x_at_top: top.x,
            slope: (bottom.x - top.x) / (bottom.y - top.y),
            winding,
        })
    }

    fn x_at(&self, y: f32) -> f32 {
        self.x_at_top + (y - self.top) * self.slope
    }
}

/// Builds the edge list of a set of polylines. Every polyline is
/// implicitly closed for filling.
fn edges(polylines: &[Polyline]) -> Vec<Edge> {
    let mut edges = Vec::new();
    for line in polylines {
        let points = &line.points;
        for i in 0..points.len() {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            if let Some(edge) = Edge::new(a, b) {
                edges.push(edge);
            }
        }
    }
    edges.sort_by(|a, b| a.top.total_cmp(&b.top));
    edges
}

/// Tight bounds of all polyline points.
pub fn polyline_bounds(polylines: &[Polyline]) -> Option<Rect> {
    let mut points = polylines.iter().flat_map(|l| l.points.iter().copied());
    let first = points.next()?;
    let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
    Some(Rect::new(min, max))
}

/// Accumulates exact horizontal span coverage for one pixel row.
struct RowAccumulator {
    left: f32,
    partial: Vec<f32>,
    full: Vec<f32>,
}

impl RowAccumulator {
    fn new(left: i32, width: usize) -> Self {
        Self {
            left: left as f32,
            partial: vec![0.0; width + 1],
            full: vec![0.0; width + 1],
        }
    }

    fn reset(&mut self) {
        self.partial.fill(0.0);
        self.full.fill(0.0);
    }

    /// Adds `weight` times the horizontal overlap of `[x0, x1)` with each pixel.
    fn add_span(&mut self, x0: f32, x1: f32, weight: f32) {
        let width = (self.partial.len() - 1) as f32;
        let x0 = (x0 - self.left).clamp(0.0, width);
        let x1 = (x1 - self.left).clamp(0.0, width);
        if x1 <= x0 {
            return;
        }
        let i0 = x0.floor() as usize;
        let i1 = x1.floor() as usize;
        if i0 == i1 {
            self.partial[i0] += (x1 - x0) * weight;
            return;
        }
        self.partial[i0] += (i0 as f32 + 1.0 - x0) * weight;
        self.full[i0 + 1] += weight;
        self.full[i1] -= weight;
        self.partial[i1] += (x1 - i1 as f32) * weight;
    }

    fn write(&self, out: &mut [u8]) {
        let mut run = 0.0;
        for (i, value) in out.iter_mut().enumerate() {
            run += self.full[i];
            let coverage = (run + self.partial[i]).clamp(0.0, 1.0);
            *value = (coverage * 255.0 + 0.5) as u8;
        }
    }
}

/// Computes the winding crossings at height `y` and reports the inside spans.
fn spans_at(
    y: f32,
    active: &mut Vec<Edge>,
    crossings: &mut Vec<(f32, i32)>,
    rule: FillRule,
    mut emit: impl FnMut(f32, f32),
) {
    active.retain(|e| e.bottom > y);
    crossings.clear();
    crossings.extend(
        active
            .iter()
            .filter(|e| e.top <= y)
            .map(|e| (e.x_at(y), e.winding)),
    );
    crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut winding = 0;
    let mut span_start = 0.0;
    for &(x, w) in crossings.iter() {
        let was_inside = rule.is_inside(winding);
        winding += w;
        let inside = rule.is_inside(winding);
        if !was_inside && inside {
            span_start = x;
        } else if was_inside && !inside {
            emit(span_start, x);
        }
    }
}

/// Rasterizes closed polylines into a coverage mask covering `area`.
///
/// With `antialias` off, a pixel is fully covered when its center is inside.
pub fn render_mask(
    polylines: &[Polyline],
    rule: FillRule,
    area: IntRect,
    antialias: bool,
) -> Result<Bitmap, DeviceError> {
    let mut mask = Bitmap::mask(area.width() as u32, area.height() as u32)?;
    if area.is_empty() {
        return Ok(mask);
    }
    let edges = edges(polylines);
    let width = area.width() as usize;
    let mut next_edge = 0;
    let mut active: Vec<Edge> = Vec::new();
    let mut crossings = Vec::new();
    let mut acc = RowAccumulator::new(area.left, width);

    let samples = if antialias { SUB_SCANLINES } else { 1 };
    let weight = 1.0 / samples as f32;

    for row in 0..area.height() {
        let y = (area.top + row) as f32;
        acc.reset();
        let mut touched = false;
        for s in 0..samples {
            let sy = y + (s as f32 + 0.5) * weight;
            while next_edge < edges.len() && edges[next_edge].top <= sy {
                active.push(edges[next_edge]);
                next_edge += 1;
            }
            spans_at(sy, &mut active, &mut crossings, rule, |x0, x1| {
                touched = true;
                if antialias {
                    acc.add_span(x0, x1, weight);
                } else {
                    // pixel centers inside [x0, x1)
                    let start = (x0 - 0.5).ceil();
                    let end = (x1 - 0.5).ceil();
                    acc.add_span(start, end, 1.0);
                }
            });
        }
        if touched {
            acc.write(&mut mask.row_mut(row as u32)[..width]);
        }
        if next_edge >= edges.len() && active.is_empty() {
            break;
        }
    }
    Ok(mask)
}
