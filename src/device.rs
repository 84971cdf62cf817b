use glam::{Affine2, Vec2};

use crate::{
    bitmap::{Bitmap, PixelFormat},
    clip::ClipRegion,
    color::FillColor,
    composite::{self, Gamma, LcdRow, Paint},
    geom::{IntRect, Rect},
    path::{Path, Polyline},
    raster::{
        polyline_bounds, render_mask,
        stroke::{hairline_polygons, stroke_to_polygons, StrokeSettings},
        FillRule,
    },
};

/// Flattening tolerance in device pixels.
const TOLERANCE: f32 = 0.25;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("bitmap of {width}x{height} pixels is too large")]
    TooLarge { width: u32, height: u32 },
    #[error("sub-pixel coverage cannot be composited onto a {0:?} target")]
    UnsupportedFormat(PixelFormat),
}

/// Where a device is in its paint cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Idle,
    ClipAccumulating,
    Painting,
}

/// Counters for the rendering routes a device has taken.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct DeviceStats {
    pub rect_fast_path: u32,
    pub scanline_fills: u32,
    pub strokes: u32,
    pub hairlines: u32,
    pub glyph_bitmaps: u32,
    pub glyph_paths: u32,
}

/// A raster destination plus its clip and save stack.
pub struct Device {
    target: Bitmap,
    clip: ClipRegion,
    saved: Vec<ClipRegion>,
    state: DeviceState,
    stats: DeviceStats,
    antialias: bool,
    lcd_gamma: Gamma,
}

impl Device {
    pub fn new(target: Bitmap) -> Self {
        let clip = ClipRegion::rect(target.bounds());
        Self {
            target,
            clip,
            saved: Vec::new(),
            state: DeviceState::Idle,
            stats: DeviceStats::default(),
            antialias: true,
            lcd_gamma: Gamma::default(),
        }
    }

    /// Sets whether path coverage is anti-aliased.
    ///
    /// The default value is `true`.
    pub fn set_antialias(&mut self, antialias: bool) {
        self.antialias = antialias;
    }

    pub fn antialias(&self) -> bool {
        self.antialias
    }

    /// Sets the gamma curve applied around sub-pixel text blending.
    pub fn set_lcd_gamma(&mut self, gamma: Gamma) {
        self.lcd_gamma = gamma;
    }

    pub fn target(&self) -> &Bitmap {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut Bitmap {
        &mut self.target
    }

    pub fn into_target(self) -> Bitmap {
        self.target
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn clip(&self) -> &ClipRegion {
        &self.clip
    }

    pub fn format(&self) -> PixelFormat {
        self.target.format()
    }

    pub fn device_rect(&self) -> IntRect {
        self.target.bounds()
    }

    pub(crate) fn stats_mut(&mut self) -> &mut DeviceStats {
        &mut self.stats
    }

    pub(crate) fn begin_paint(&mut self) {
        self.state = DeviceState::Painting;
    }

    /// Ends the paint cycle.
    pub fn finish(&mut self) {
        self.state = DeviceState::Idle;
    }

    /// Pushes a copy of the current clip.
    pub fn save_state(&mut self) {
        self.saved.push(self.clip.clone());
    }

    /// Restores the most recently saved clip. With `keep_saved` the
    /// snapshot stays on the stack. Restoring with an empty stack resets
    /// the clip to the whole device.
    pub fn restore_state(&mut self, keep_saved: bool) {
        let restored = if keep_saved {
            self.saved.last().cloned()
        } else {
            self.saved.pop()
        };
        self.clip = restored.unwrap_or_else(|| ClipRegion::rect(self.device_rect()));
    }

    pub fn set_clip_rect(&mut self, rect: Rect) -> Result<(), DeviceError> {
        self.state = DeviceState::ClipAccumulating;
        let device = Rect::new(Vec2::ZERO, self.device_rect_f());
        let rect = rect.intersect(&device).outer();
        self.clip = self.clip.intersect_rect(rect)?;
        Ok(())
    }

    pub fn set_clip_path_fill(
        &mut self,
        path: &Path,
        m: &Affine2,
        rule: FillRule,
    ) -> Result<(), DeviceError> {
        if let Some(rect) = path.as_rect(m) {
            return self.set_clip_rect(rect);
        }
        self.state = DeviceState::ClipAccumulating;
        let polylines = path.flatten(m, TOLERANCE);
        self.intersect_clip_with(&polylines, rule)
    }

    pub fn set_clip_path_stroke(
        &mut self,
        path: &Path,
        m: &Affine2,
        stroke: &StrokeSettings,
    ) -> Result<(), DeviceError> {
        self.state = DeviceState::ClipAccumulating;
        let polylines = if stroke.is_hairline() {
            hairline_polygons(path, m)
        } else {
            stroke_to_polygons(path, m, stroke)
        };
        self.intersect_clip_with(&polylines, FillRule::NonZero)
    }

    fn intersect_clip_with(&mut self, polylines: &[Polyline], rule: FillRule) -> Result<(), DeviceError> {
        let area = coverage_area(polylines, self.clip.bounds());
        if area.is_empty() {
            self.clip = ClipRegion::rect(IntRect::default());
            return Ok(());
        }
        let mask = render_mask(polylines, rule, area, self.antialias)?;
        let region = ClipRegion::from_mask(mask, area.left, area.top);
        self.clip = self.clip.intersect(&region)?;
        Ok(())
    }

    /// Fills a path. Axis-aligned rectangles get exact analytic coverage
    /// without scan conversion.
    pub fn fill_path(
        &mut self,
        path: &Path,
        m: &Affine2,
        rule: FillRule,
        color: impl Into<FillColor>,
    ) -> Result<(), DeviceError> {
        self.begin_paint();
        if self.target.is_empty() || self.clip.is_empty() {
            return Ok(());
        }
        let paint = Paint::new(color.into());
        if path.point_count() == 4 || path.point_count() == 5 {
            if let Some(rect) = path.as_rect(m) {
                self.stats.rect_fast_path += 1;
                self.fill_rect_exact(rect, &paint);
                return Ok(());
            }
        }
        self.stats.scanline_fills += 1;
        let polylines = path.flatten(m, TOLERANCE);
        self.fill_polylines(&polylines, rule, &paint)
    }

    pub fn stroke_path(
        &mut self,
        path: &Path,
        m: &Affine2,
        stroke: &StrokeSettings,
        color: impl Into<FillColor>,
    ) -> Result<(), DeviceError> {
        self.begin_paint();
        if self.target.is_empty() || self.clip.is_empty() {
            return Ok(());
        }
        let paint = Paint::new(color.into());
        let polylines = if stroke.is_hairline() {
            self.stats.hairlines += 1;
            hairline_polygons(path, m)
        } else {
            self.stats.strokes += 1;
            stroke_to_polygons(path, m, stroke)
        };
        self.fill_polylines(&polylines, FillRule::NonZero, &paint)
    }

    /// Composites full coverage over a pixel rectangle.
    pub fn fill_rect(&mut self, rect: IntRect, color: impl Into<FillColor>) -> Result<(), DeviceError> {
        self.begin_paint();
        let paint = Paint::new(color.into());
        let area = rect.intersect(&self.clip.bounds());
        if area.is_empty() {
            return Ok(());
        }
        let covers = vec![u8::MAX; area.width() as usize];
        for y in area.top..area.bottom {
            self.composite_row(y, area.left, &covers, &paint);
        }
        Ok(())
    }

    /// Composites an 8-bit (or 1-bit) coverage mask whose top-left pixel
    /// lands on `(left, top)`.
    pub fn composite_mask(
        &mut self,
        mask: &Bitmap,
        left: i32,
        top: i32,
        color: impl Into<FillColor>,
    ) -> Result<(), DeviceError> {
        self.begin_paint();
        let paint = Paint::new(color.into());
        let placed = IntRect::new(
            left,
            top,
            left + mask.width() as i32,
            top + mask.height() as i32,
        );
        let area = placed.intersect(&self.clip.bounds());
        if area.is_empty() {
            return Ok(());
        }
        let mut covers = vec![0u8; area.width() as usize];
        for y in area.top..area.bottom {
            let src_y = (y - top) as u32;
            let first = (area.left - left) as u32;
            for (i, cover) in covers.iter_mut().enumerate() {
                let src_x = first + i as u32;
                *cover = match mask.format() {
                    PixelFormat::Mono => {
                        if mask.get_bit(src_x, src_y) {
                            u8::MAX
                        } else {
                            0
                        }
                    }
                    _ => mask.get(src_x, src_y),
                };
            }
            self.composite_row(y, area.left, &covers, &paint);
        }
        Ok(())
    }

    /// Composites a sub-pixel coverage mask (three lanes per pixel) with
    /// the given lane phase.
    pub fn composite_lcd_mask(
        &mut self,
        mask: &Bitmap,
        left: i32,
        top: i32,
        phase: usize,
        bgr: bool,
        color: impl Into<FillColor>,
    ) -> Result<(), DeviceError> {
        self.begin_paint();
        let format = self.target.format();
        if !matches!(format, PixelFormat::Rgb | PixelFormat::Rgba) {
            return Err(DeviceError::UnsupportedFormat(format));
        }
        let paint = Paint::new(color.into());
        let columns = mask.width() as i32 / 3;
        let placed = IntRect::new(left, top, left + columns, top + mask.height() as i32);
        let area = placed.intersect(&self.clip.bounds());
        if area.is_empty() {
            return Ok(());
        }
        for y in area.top..area.bottom {
            let Some((clip_left, _, clip_row)) = self.clip.row(y) else {
                continue;
            };
            let clip_row = clip_row.map(|r| &r[(area.left - clip_left) as usize..]);
            let glyph = LcdRow {
                lanes: mask.row((y - top) as u32),
                phase,
                bgr,
            };
            composite::composite_lcd_row(
                &mut self.target,
                y as u32,
                area.left,
                (area.left - left) as usize,
                area.width() as usize,
                glyph,
                clip_row,
                &paint,
                &self.lcd_gamma,
            );
        }
        Ok(())
    }

    fn device_rect_f(&self) -> Vec2 {
        Vec2::new(self.target.width() as f32, self.target.height() as f32)
    }

    fn fill_polylines(&mut self, polylines: &[Polyline], rule: FillRule, paint: &Paint) -> Result<(), DeviceError> {
        let area = coverage_area(polylines, self.clip.bounds());
        if area.is_empty() {
            return Ok(());
        }
        let mask = render_mask(polylines, rule, area, self.antialias)?;
        for y in area.top..area.bottom {
            let row = &mask.row((y - area.top) as u32)[..area.width() as usize];
            self.composite_row(y, area.left, row, paint);
        }
        Ok(())
    }

    /// Exact per-pixel area coverage of an axis-aligned rectangle.
    fn fill_rect_exact(&mut self, rect: Rect, paint: &Paint) {
        let area = rect.outer().intersect(&self.clip.bounds());
        if area.is_empty() {
            return;
        }
        let overlap = |lo: f32, hi: f32, i: i32| {
            let a = lo.max(i as f32);
            let b = hi.min(i as f32 + 1.0);
            (b - a).clamp(0.0, 1.0)
        };
        let horizontal: Vec<f32> = (area.left..area.right)
            .map(|x| overlap(rect.min.x, rect.max.x, x))
            .collect();
        let mut covers = vec![0u8; area.width() as usize];
        for y in area.top..area.bottom {
            let v = overlap(rect.min.y, rect.max.y, y);
            if !self.antialias {
                let inside = rect.min.y <= y as f32 + 0.5 && (y as f32 + 0.5) < rect.max.y;
                for (cover, x) in covers.iter_mut().zip(area.left..) {
                    let center = x as f32 + 0.5;
                    *cover = if inside && rect.min.x <= center && center < rect.max.x {
                        u8::MAX
                    } else {
                        0
                    };
                }
            } else {
                for (cover, h) in covers.iter_mut().zip(&horizontal) {
                    *cover = (h * v * 255.0 + 0.5) as u8;
                }
            }
            self.composite_row(y, area.left, &covers, paint);
        }
    }

    /// Composites coverage for device row `y` starting at column `x`,
    /// restricted to the clip.
    fn composite_row(&mut self, y: i32, x: i32, covers: &[u8], paint: &Paint) {
        let Some((clip_left, clip_right, clip_row)) = self.clip.row(y) else {
            return;
        };
        let start = x.max(clip_left);
        let end = (x + covers.len() as i32).min(clip_right);
        if start >= end {
            return;
        }
        let covers = &covers[(start - x) as usize..(end - x) as usize];
        let clip_row = clip_row.map(|r| &r[(start - clip_left) as usize..(end - clip_left) as usize]);
        let span = composite::span_fn(self.target.format());
        span(&mut self.target, y as u32, start, covers, clip_row, paint);
    }
}

/// Pixel area touched by `polylines`, limited to `limit`.
fn coverage_area(polylines: &[Polyline], limit: IntRect) -> IntRect {
    match polyline_bounds(polylines) {
        Some(bounds) => bounds.outer().intersect(&limit),
        None => IntRect::default(),
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use super::*;
    use crate::{
        color::Color,
        raster::stroke::{Dash, LineCap},
    };

    fn rgba_device(width: u32, height: u32) -> Device {
        Device::new(Bitmap::new(width, height, PixelFormat::Rgba).unwrap())
    }

    #[test]
    fn rectangle_fill_takes_fast_path() {
        let mut device = rgba_device(8, 8);
        let path = Path::builder().rect(vec2(1.0, 1.0), vec2(5.0, 5.0)).build();
        device
            .fill_path(&path, &Affine2::IDENTITY, FillRule::NonZero, Color::rgb(255, 0, 0))
            .unwrap();
        assert_eq!(device.stats().rect_fast_path, 1);
        assert_eq!(device.stats().scanline_fills, 0);
        assert_eq!(device.target().pixel(1, 1), [255, 0, 0, 255]);
        assert_eq!(device.target().pixel(5, 5), [0, 0, 0, 0]);
        assert_eq!(device.state(), DeviceState::Painting);
        device.finish();
        assert_eq!(device.state(), DeviceState::Idle);
    }

    #[test]
    fn fast_path_matches_scanline_coverage() {
        let rect = Path::builder().rect(vec2(0.5, 0.25), vec2(3.5, 2.75)).build();
        let mut fast = rgba_device(4, 3);
        fast.fill_path(&rect, &Affine2::IDENTITY, FillRule::NonZero, Color::WHITE)
            .unwrap();

        let triangle_pair = Path::builder()
            .move_to(vec2(0.5, 0.25))
            .line_to(vec2(3.5, 0.25))
            .line_to(vec2(3.5, 2.75))
            .line_to(vec2(2.0, 2.75))
            .line_to(vec2(0.5, 2.75))
            .close();
        let mut slow = rgba_device(4, 3);
        slow.fill_path(&triangle_pair, &Affine2::IDENTITY, FillRule::NonZero, Color::WHITE)
            .unwrap();
        assert_eq!(slow.stats().scanline_fills, 1);

        for y in 0..3 {
            for x in 0..4 {
                let a = fast.target().pixel(x, y)[3] as i32;
                let b = slow.target().pixel(x, y)[3] as i32;
                assert!((a - b).abs() <= 1, "pixel {x},{y}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn clip_state_and_restore() {
        let mut device = rgba_device(10, 10);
        device.save_state();
        device
            .set_clip_rect(Rect::new(vec2(2.0, 2.0), vec2(4.0, 4.0)))
            .unwrap();
        assert_eq!(device.state(), DeviceState::ClipAccumulating);
        assert_eq!(device.clip().bounds(), IntRect::new(2, 2, 4, 4));

        device.fill_rect(IntRect::new(0, 0, 10, 10), Color::WHITE).unwrap();
        assert_eq!(device.target().pixel(2, 2)[3], 255);
        assert_eq!(device.target().pixel(5, 5)[3], 0);

        device.restore_state(true);
        assert_eq!(device.clip().bounds(), IntRect::new(0, 0, 10, 10));
        device
            .set_clip_rect(Rect::new(vec2(0.0, 0.0), vec2(1.0, 1.0)))
            .unwrap();
        device.restore_state(false);
        assert_eq!(device.clip().bounds(), IntRect::new(0, 0, 10, 10));

        device
            .set_clip_rect(Rect::new(vec2(0.0, 0.0), vec2(1.0, 1.0)))
            .unwrap();
        // stack is empty now: the clip resets to the device
        device.restore_state(false);
        assert_eq!(device.clip().bounds(), IntRect::new(0, 0, 10, 10));
    }

    #[test]
    fn clip_only_narrows() {
        let mut device = rgba_device(10, 10);
        device
            .set_clip_rect(Rect::new(vec2(2.0, 2.0), vec2(6.0, 6.0)))
            .unwrap();
        device
            .set_clip_rect(Rect::new(vec2(0.0, 0.0), vec2(10.0, 10.0)))
            .unwrap();
        assert_eq!(device.clip().bounds(), IntRect::new(2, 2, 6, 6));
    }

    #[test]
    fn path_clip_masks_fill() {
        let mut device = rgba_device(10, 10);
        let triangle = Path::builder()
            .move_to(vec2(0.0, 0.0))
            .line_to(vec2(10.0, 0.0))
            .line_to(vec2(0.0, 10.0))
            .close();
        device
            .set_clip_path_fill(&triangle, &Affine2::IDENTITY, FillRule::NonZero)
            .unwrap();
        assert!(device.clip().has_mask());
        device.fill_rect(IntRect::new(0, 0, 10, 10), Color::WHITE).unwrap();
        assert_eq!(device.target().pixel(1, 1)[3], 255);
        assert_eq!(device.target().pixel(8, 8)[3], 0);
    }

    #[test]
    fn rgba_transparent_destination_takes_source() {
        let mut device = rgba_device(2, 1);
        let mut mask = Bitmap::mask(1, 1).unwrap();
        mask.set(0, 0, 255);
        device
            .composite_mask(&mask, 0, 0, Color::rgba(40, 50, 60, 128))
            .unwrap();
        assert_eq!(device.target().pixel(0, 0), [40, 50, 60, 128]);
        assert_eq!(device.target().pixel(1, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn zero_size_device_is_a_no_op() {
        let mut device = rgba_device(0, 0);
        let path = Path::builder()
            .move_to(vec2(0.0, 0.0))
            .line_to(vec2(5.0, 1.0))
            .line_to(vec2(1.0, 5.0))
            .close();
        device
            .fill_path(&path, &Affine2::IDENTITY, FillRule::EvenOdd, Color::WHITE)
            .unwrap();
        device
            .stroke_path(&path, &Affine2::IDENTITY, &StrokeSettings::default(), Color::WHITE)
            .unwrap();
    }

    #[test]
    fn huge_coordinates_are_clipped() {
        let mut device = rgba_device(4, 4);
        let path = Path::builder()
            .move_to(vec2(-1e9, -1e9))
            .line_to(vec2(1e9, -1e9))
            .line_to(vec2(1e9, 1e9))
            .line_to(vec2(-1e9, 1e9))
            .line_to(vec2(0.0, 0.0))
            .line_to(vec2(-1e9, -1e9))
            .build();
        device
            .fill_path(&path, &Affine2::IDENTITY, FillRule::NonZero, Color::WHITE)
            .unwrap();
        assert_eq!(device.target().pixel(3, 0)[3], 255);
    }

    #[test]
    fn zero_dash_stroke_renders() {
        let mut device = rgba_device(20, 4);
        let path = Path::builder()
            .move_to(vec2(1.0, 2.0))
            .line_to(vec2(19.0, 2.0))
            .build();
        let stroke = StrokeSettings {
            width: 2.0,
            cap: LineCap::Round,
            dash: Some(Dash::new(vec![0.0, 4.0], 0.0)),
            ..Default::default()
        };
        device
            .stroke_path(&path, &Affine2::IDENTITY, &stroke, Color::WHITE)
            .unwrap();
        assert_eq!(device.stats().strokes, 1);
        assert!(device.target().pixel(1, 2)[3] > 0);
        assert_eq!(device.target().pixel(3, 2)[3], 0);
    }

    #[test]
    fn hairline_stroke_route() {
        let mut device = rgba_device(8, 8);
        let path = Path::builder()
            .move_to(vec2(1.0, 4.0))
            .line_to(vec2(7.0, 4.0))
            .build();
        let stroke = StrokeSettings {
            width: 0.0,
            ..Default::default()
        };
        device
            .stroke_path(&path, &Affine2::IDENTITY, &stroke, Color::WHITE)
            .unwrap();
        assert_eq!(device.stats().hairlines, 1);
        assert!(device.target().pixel(4, 3)[3] > 0);
    }

    #[test]
    fn lcd_requires_color_target() {
        let mut device = Device::new(Bitmap::mask(4, 4).unwrap());
        let mask = Bitmap::mask(6, 1).unwrap();
        assert!(matches!(
            device.composite_lcd_mask(&mask, 0, 0, 0, false, Color::BLACK),
            Err(DeviceError::UnsupportedFormat(PixelFormat::Gray))
        ));
    }
}
