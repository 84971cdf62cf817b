//! Expansion of stroked paths into fillable polygons.

use std::f32::consts::TAU;

use glam::{Affine2, Vec2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    geom::{hard_clip, unit_scale},
    path::{Path, Polyline},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Alternating on/off run lengths in user units, plus a starting phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Dash {
    pub array: Vec<f32>,
    pub phase: f32,
}

impl Dash {
    pub fn new(array: Vec<f32>, phase: f32) -> Self {
        Self { array, phase }
    }

    /// Normalized (on, off) pairs. An odd array repeats its last on-run
    /// as the off-run; on-runs shorter than 1e-6 become 0.1 and negative
    /// off-runs become zero, so the period is never zero.
    pub fn pairs(&self) -> SmallVec<[(f32, f32); 4]> {
        let n = self.array.len();
        (0..(n + 1) / 2)
            .map(|i| {
                let mut on = self.array[i * 2];
                if on <= 1e-6 {
                    on = 0.1;
                }
                let off = if i * 2 + 1 == n {
                    on
                } else {
                    self.array[i * 2 + 1].max(0.0)
                };
                (on, off)
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokeSettings {
    /// Line width in user units. Zero selects a one-pixel hairline.
    pub width: f32,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f32,
    pub dash: Option<Dash>,
}

impl Default for StrokeSettings {
    fn default() -> Self {
        Self {
            width: 1.0,
            cap: LineCap::default(),
            join: LineJoin::default(),
            miter_limit: 10.0,
            dash: None,
        }
    }
}

impl StrokeSettings {
    pub fn is_hairline(&self) -> bool {
        self.width <= 0.0
    }
}

/// Splits polylines into dash segments.
pub fn apply_dash(lines: &[Polyline], dash: &Dash) -> Vec<Polyline> {
    let pairs = dash.pairs();
    if pairs.is_empty() {
        return lines.to_vec();
    }
    let runs: SmallVec<[f32; 8]> = pairs.iter().flat_map(|&(on, off)| [on, off]).collect();
    let period: f32 = runs.iter().sum();

    // locate the starting run for the phase
    let mut start_index = 0;
    let mut start_left = runs[0];
    let mut phase = dash.phase.rem_euclid(period);
    while phase > 0.0 {
        if phase < start_left {
            start_left -= phase;
            break;
        }
        phase -= start_left;
        start_index = (start_index + 1) % runs.len();
        start_left = runs[start_index];
    }

    let mut out = Vec::new();
    for line in lines {
        let mut points: Vec<Vec2> = line.points.clone();
        if line.closed && points.len() > 1 && points.first() != points.last() {
            points.push(points[0]);
        }
        let mut index = start_index;
        let mut left = start_left;
        let mut current: Option<Vec<Vec2>> = (index % 2 == 0).then(|| vec![points[0]]);

        for pair in points.windows(2) {
            let (mut a, b) = (pair[0], pair[1]);
            let mut length = a.distance(b);
            while length > 0.0 {
                if left > length {
                    left -= length;
                    if let Some(dash) = &mut current {
                        dash.push(b);
                    }
                    break;
                }
                let split = a + (b - a) * (left / length);
                length -= left;
                a = split;
                match current.take() {
                    Some(mut dash) => {
                        dash.push(split);
                        out.push(Polyline {
                            points: dash,
                            closed: false,
                        });
                    }
                    None => current = Some(vec![split]),
                }
                index = (index + 1) % runs.len();
                left = runs[index];
            }
        }
        if let Some(dash) = current {
            if dash.len() > 1 {
                out.push(Polyline {
                    points: dash,
                    closed: false,
                });
            }
        }
    }
    out
}

/// Expands a path into device-space polygons that, filled with the
/// nonzero rule, cover the stroke.
pub fn stroke_to_polygons(path: &Path, m: &Affine2, settings: &StrokeSettings) -> Vec<Polyline> {
    let scale = unit_scale(m).max(f32::EPSILON);
    let tolerance = 0.25 / scale;
    let mut lines = path.flatten(&Affine2::IDENTITY, tolerance);
    if let Some(dash) = &settings.dash {
        lines = apply_dash(&lines, dash);
    }

    let width = settings.width.max(1.0 / scale);
    let mut stroker = Stroker {
        half_width: width / 2.0,
        settings,
        segments_per_circle: ((width * scale * 2.0).ceil() as usize).clamp(8, 128),
        polygons: Vec::new(),
    };
    for line in &lines {
        stroker.stroke_polyline(line);
    }

    stroker
        .polygons
        .into_iter()
        .map(|points| Polyline {
            points: points
                .into_iter()
                .map(|p| hard_clip(m.transform_point2(p)))
                .collect(),
            closed: true,
        })
        .collect()
}

/// One-device-pixel quads along each segment of the transformed path.
pub fn hairline_polygons(path: &Path, m: &Affine2) -> Vec<Polyline> {
    let mut polygons = Vec::new();
    for line in path.flatten(m, 0.25) {
        let mut points = line.points.clone();
        if line.closed && points.len() > 1 {
            points.push(points[0]);
        }
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let dir = (b - a).normalize_or_zero();
            let (along, normal) = if dir == Vec2::ZERO {
                (Vec2::new(0.5, 0.0), Vec2::new(0.0, 0.5))
            } else {
                (dir * 0.5, dir.perp() * 0.5)
            };
            let mut quad = vec![
                a - along + normal,
                b + along + normal,
                b + along - normal,
                a - along - normal,
            ];
            orient_positive(&mut quad);
            polygons.push(Polyline {
                points: quad,
                closed: true,
            });
        }
    }
    polygons
}

struct Stroker<'a> {
    half_width: f32,
    settings: &'a StrokeSettings,
    segments_per_circle: usize,
    polygons: Vec<Vec<Vec2>>,
}

impl Stroker<'_> {
    fn push(&mut self, mut polygon: Vec<Vec2>) {
        if polygon.len() < 3 {
            return;
        }
        orient_positive(&mut polygon);
        self.polygons.push(polygon);
    }

    fn circle(&mut self, center: Vec2) {
        let n = self.segments_per_circle;
        let polygon = (0..n)
            .map(|i| {
                let angle = i as f32 / n as f32 * TAU;
                center + Vec2::from_angle(angle) * self.half_width
            })
            .collect();
        self.push(polygon);
    }

    fn stroke_polyline(&mut self, line: &Polyline) {
        let mut points: Vec<Vec2> = Vec::with_capacity(line.points.len());
        for &p in &line.points {
            if points.last() != Some(&p) {
                points.push(p);
            }
        }
        let closed = line.closed && points.len() > 2;
        if closed && points.first() == points.last() {
            points.pop();
        }

        if points.len() == 1 || (points.len() == 2 && points[0] == points[1]) {
            self.dot(points[0]);
            return;
        }

        let count = if closed { points.len() } else { points.len() - 1 };
        for i in 0..count {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            let normal = (b - a).normalize_or_zero().perp() * self.half_width;
            self.push(vec![a + normal, b + normal, b - normal, a - normal]);
        }

        let joints = if closed {
            0..points.len()
        } else {
            1..points.len() - 1
        };
        for i in joints {
            let prev = points[(i + points.len() - 1) % points.len()];
            let next = points[(i + 1) % points.len()];
            self.join(prev, points[i], next);
        }

        if !closed {
            let n = points.len();
            self.cap(points[0], points[1]);
            self.cap(points[n - 1], points[n - 2]);
        }
    }

    fn dot(&mut self, p: Vec2) {
        let hw = self.half_width;
        match self.settings.cap {
            LineCap::Butt => {}
            LineCap::Round => self.circle(p),
            LineCap::Square => self.push(vec![
                p + Vec2::new(-hw, -hw),
                p + Vec2::new(hw, -hw),
                p + Vec2::new(hw, hw),
                p + Vec2::new(-hw, hw),
            ]),
        }
    }

    /// Cap at `end`, where `inner` is the adjacent point along the line.
    fn cap(&mut self, end: Vec2, inner: Vec2) {
        let dir = (end - inner).normalize_or_zero();
        let normal = dir.perp() * self.half_width;
        match self.settings.cap {
            LineCap::Butt => {}
            LineCap::Round => self.circle(end),
            LineCap::Square => {
                let out = dir * self.half_width;
                self.push(vec![
                    end + normal,
                    end + normal + out,
                    end - normal + out,
                    end - normal,
                ]);
            }
        }
    }

    fn join(&mut self, prev: Vec2, p: Vec2, next: Vec2) {
        let d0 = (p - prev).normalize_or_zero();
        let d1 = (next - p).normalize_or_zero();
        let cross = d0.perp_dot(d1);
        let dot = d0.dot(d1);
        if cross.abs() < 1e-6 && dot > 0.0 {
            return;
        }
        if self.settings.join == LineJoin::Round {
            self.circle(p);
            return;
        }

        let side = if cross > 0.0 { -1.0 } else { 1.0 };
        let o0 = d0.perp() * self.half_width * side;
        let o1 = d1.perp() * self.half_width * side;

        if self.settings.join == LineJoin::Miter {
            let cos_half = ((1.0 + dot) / 2.0).max(0.0).sqrt();
            if cos_half > 1e-6 && 1.0 / cos_half <= self.settings.miter_limit {
                let bisector = (o0 + o1).normalize_or_zero();
                let tip = p + bisector * (self.half_width / cos_half);
                self.push(vec![p, p + o0, tip, p + o1]);
                return;
            }
        }
        self.push(vec![p, p + o0, p + o1]);
    }
}

fn signed_area(points: &[Vec2]) -> f32 {
    let n = points.len();
    (0..n)
        .map(|i| points[i].perp_dot(points[(i + 1) % n]))
        .sum::<f32>()
        / 2.0
}

fn orient_positive(points: &mut [Vec2]) {
    if signed_area(points) < 0.0 {
        points.reverse();
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use super::*;
    use crate::{
        geom::IntRect,
        raster::{render_mask, FillRule},
    };

    #[test]
    fn zero_on_runs_become_a_tenth() {
        let dash = Dash::new(vec![0.0, 2.0], 0.0);
        assert_eq!(dash.pairs().as_slice(), &[(0.1, 2.0)]);

        let odd = Dash::new(vec![3.0], 0.0);
        assert_eq!(odd.pairs().as_slice(), &[(3.0, 3.0)]);

        let negative = Dash::new(vec![1.0, -4.0, 2.0], 0.0);
        assert_eq!(negative.pairs().as_slice(), &[(1.0, 0.0), (2.0, 2.0)]);
    }

    #[test]
    fn zero_dash_terminates_and_produces_short_runs() {
        let line = vec![Polyline {
            points: vec![vec2(0.0, 0.0), vec2(9.5, 0.0)],
            closed: false,
        }];
        let dashes = apply_dash(&line, &Dash::new(vec![0.0, 0.9], 0.0));
        assert_eq!(dashes.len(), 10);
        for d in &dashes {
            let len = d.points[0].distance(*d.points.last().unwrap());
            assert!((len - 0.1).abs() < 1e-4);
        }
    }

    #[test]
    fn dash_phase_skips_into_pattern() {
        let line = vec![Polyline {
            points: vec![vec2(0.0, 0.0), vec2(10.0, 0.0)],
            closed: false,
        }];
        let dashes = apply_dash(&line, &Dash::new(vec![2.0, 2.0], 1.0));
        assert_eq!(dashes[0].points[0], vec2(0.0, 0.0));
        assert!((dashes[0].points[1].x - 1.0).abs() < 1e-5);
        assert!((dashes[1].points[0].x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn butt_line_covers_its_width() {
        let path = Path::builder()
            .move_to(vec2(2.0, 5.0))
            .line_to(vec2(8.0, 5.0))
            .build();
        let settings = StrokeSettings {
            width: 2.0,
            ..Default::default()
        };
        let polygons = stroke_to_polygons(&path, &Affine2::IDENTITY, &settings);
        let mask = render_mask(&polygons, FillRule::NonZero, IntRect::new(0, 0, 10, 10), true).unwrap();
        assert_eq!(mask.get(4, 4), 255);
        assert_eq!(mask.get(4, 5), 255);
        assert_eq!(mask.get(4, 6), 0);
        assert_eq!(mask.get(1, 5), 0);
    }

    #[test]
    fn square_cap_extends_past_endpoints() {
        let path = Path::builder()
            .move_to(vec2(2.0, 5.0))
            .line_to(vec2(8.0, 5.0))
            .build();
        let settings = StrokeSettings {
            width: 2.0,
            cap: LineCap::Square,
            ..Default::default()
        };
        let polygons = stroke_to_polygons(&path, &Affine2::IDENTITY, &settings);
        let mask = render_mask(&polygons, FillRule::NonZero, IntRect::new(0, 0, 10, 10), true).unwrap();
        assert_eq!(mask.get(1, 4), 255);
        assert_eq!(mask.get(8, 5), 255);
    }

    #[test]
    fn overlapping_pieces_do_not_cancel() {
        let path = Path::builder().rect(vec2(2.0, 2.0), vec2(8.0, 8.0)).build();
        let settings = StrokeSettings {
            width: 2.0,
            join: LineJoin::Miter,
            ..Default::default()
        };
        let polygons = stroke_to_polygons(&path, &Affine2::IDENTITY, &settings);
        let mask = render_mask(&polygons, FillRule::NonZero, IntRect::new(0, 0, 10, 10), true).unwrap();
        // mitered corner
        assert_eq!(mask.get(1, 1), 255);
        assert_eq!(mask.get(5, 1), 255);
        assert_eq!(mask.get(5, 5), 0);
    }

    #[test]
    fn thin_strokes_widen_to_one_device_pixel() {
        let path = Path::builder()
            .move_to(vec2(0.0, 0.5))
            .line_to(vec2(4.0, 0.5))
            .build();
        let settings = StrokeSettings {
            width: 0.01,
            ..Default::default()
        };
        let m = Affine2::from_scale(vec2(2.0, 2.0));
        let polygons = stroke_to_polygons(&path, &m, &settings);
        let mask = render_mask(&polygons, FillRule::NonZero, IntRect::new(0, 0, 8, 2), true).unwrap();
        assert!(mask.get(3, 0) >= 127);
    }

    #[test]
    fn hairline_quads_are_one_pixel_wide() {
        let path = Path::builder()
            .move_to(vec2(1.0, 2.0))
            .line_to(vec2(6.0, 2.0))
            .build();
        let polygons = hairline_polygons(&path, &Affine2::IDENTITY);
        assert_eq!(polygons.len(), 1);
        let bounds = crate::raster::polyline_bounds(&polygons).unwrap();
        assert_eq!(bounds.height(), 1.0);
    }
}
