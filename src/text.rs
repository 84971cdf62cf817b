//! Drawing runs of positioned glyphs onto a [`Device`].

use std::sync::Arc;

use bitflags::bitflags;
use glam::{Affine2, Vec2};
use serde::{Deserialize, Serialize};

use crate::{
    bitmap::PixelFormat,
    color::FillColor,
    device::{Device, DeviceError},
    font::{Font, FontMgr, SubstFlags},
    geom::{coefficients, from_coefficients, IntRect},
    glyph::{GlyphBitmap, GlyphCache, RenderMode},
    raster::FillRule,
};

/// Scale above which glyphs are filled as paths rather than cached as
/// bitmaps, unless configured otherwise.
pub const DEFAULT_GLYPH_PATH_THRESHOLD: f32 = 50.0;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct TextFlags: u32 {
        /// Render without anti-aliasing.
        const NO_SMOOTH = 0x01;
        /// Render with sub-pixel coverage on RGB targets.
        const CLEARTYPE = 0x02;
        /// The panel's sub-pixels are ordered blue, green, red.
        const BGR_STRIPE = 0x04;
    }
}

/// One glyph of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphPosition {
    pub glyph: u32,
    /// Origin in text space.
    pub origin: Vec2,
    /// Advance the document expects, in thousandths of an em.
    pub dest_width: i32,
    pub use_secondary_style: bool,
    /// Extra transform applied to this glyph before the run's.
    pub adjust: Option<[f32; 4]>,
}

impl GlyphPosition {
    pub fn new(glyph: u32, origin: Vec2) -> Self {
        Self {
            glyph,
            origin,
            dest_width: 0,
            use_secondary_style: false,
            adjust: None,
        }
    }
}

/// A run of glyphs sharing a font, size and color.
#[derive(Debug, Clone)]
pub struct TextRun<'a> {
    pub font: &'a Font,
    pub glyphs: &'a [GlyphPosition],
    pub font_size: f32,
    /// Maps text space (y up) to device pixels.
    pub text_to_device: Affine2,
    pub color: FillColor,
    pub flags: TextFlags,
}

/// A glyph bitmap placed on the device grid.
#[derive(Debug, Clone)]
pub struct PlacedGlyph {
    pub bitmap: Option<Arc<GlyphBitmap>>,
    /// Exact device position of the origin.
    pub origin: Vec2,
    /// Origin snapped to whole pixels.
    pub x: i32,
    pub y: i32,
}

/// Smallest rectangle holding every placed bitmap. Sub-pixel bitmaps
/// count one pixel per three columns.
pub fn glyphs_bbox(glyphs: &[PlacedGlyph], lcd: bool) -> IntRect {
    let mut bbox: Option<IntRect> = None;
    for placed in glyphs {
        let Some(glyph) = &placed.bitmap else {
            continue;
        };
        let mut width = glyph.bitmap.width() as i32;
        if lcd {
            width /= 3;
        }
        let left = placed.x + glyph.left;
        let top = placed.y - glyph.top;
        let rect = IntRect::new(left, top, left + width, top + glyph.bitmap.height() as i32);
        bbox = Some(match bbox {
            Some(b) => IntRect::new(
                b.left.min(rect.left),
                b.top.min(rect.top),
                b.right.max(rect.right),
                b.bottom.max(rect.bottom),
            ),
            None => rect,
        });
    }
    bbox.unwrap_or_default()
}

/// Evens out glyph spacing lost to rounding each origin separately.
///
/// Walking back from the last glyph, a gap that rounding shrank or grew
/// by more than half a pixel moves the earlier glyph one pixel. The first
/// glyph never moves. Runs that are neither horizontal nor vertical are
/// left alone.
pub fn adjust_glyph_space(glyphs: &mut [PlacedGlyph]) {
    let n = glyphs.len();
    if n < 2 {
        return;
    }
    let vertical = if glyphs[n - 1].x == glyphs[0].x {
        true
    } else if glyphs[n - 1].y != glyphs[0].y {
        return;
    } else {
        false
    };
    let axis = |g: &PlacedGlyph| {
        if vertical {
            (g.y, g.origin.y)
        } else {
            (g.x, g.origin.x)
        }
    };
    let (mut next, mut next_f) = axis(&glyphs[n - 1]);
    for i in (1..n - 1).rev() {
        let (mut this, this_f) = axis(&glyphs[i]);
        let space = next - this;
        let space_f = next_f - this_f;
        if space_f.abs() - (space as f32).abs() > 0.5 {
            this += if space > 0 { -1 } else { 1 };
            if vertical {
                glyphs[i].y = this;
            } else {
                glyphs[i].x = this;
            }
        }
        next = this;
        next_f = this_f;
    }
}

/// Glyph transform for a run: em units to device pixels, y up.
fn char_to_device(text_to_device: &Affine2, font_size: f32) -> [f32; 4] {
    let [a, b, c, d] = coefficients(text_to_device);
    [a * font_size, -b * font_size, c * font_size, -d * font_size]
}

/// Sub-pixel lane of a device x position, matching the floored column
/// the glyph is placed on.
fn lcd_phase(x: f32) -> usize {
    ((x * 3.0).floor() as i32).rem_euclid(3) as usize
}

fn render_mode(device: &Device, font: &Font, flags: TextFlags) -> RenderMode {
    if flags.contains(TextFlags::NO_SMOOTH) {
        return RenderMode::Mono;
    }
    let cleartype = flags.contains(TextFlags::CLEARTYPE)
        && font
            .subst
            .as_ref()
            .map_or(true, |subst| subst.flags.contains(SubstFlags::CLEARTYPE));
    match device.format() {
        PixelFormat::Rgb | PixelFormat::Rgba if cleartype => RenderMode::Lcd,
        _ => RenderMode::Normal,
    }
}

impl Device {
    /// Draws a glyph run with glyphs from `cache`.
    ///
    /// Glyphs that fail to load are skipped. Runs scaled beyond
    /// `path_threshold` pixels per em, or whose substitute is flagged
    /// [`SubstFlags::GLYPH_PATH`], are filled as outlines.
    pub fn draw_text(
        &mut self,
        mgr: &FontMgr,
        cache: &mut GlyphCache,
        run: &TextRun<'_>,
        path_threshold: f32,
    ) -> Result<(), DeviceError> {
        self.begin_paint();
        let matrix = char_to_device(&run.text_to_device, run.font_size);
        let forced_path = run
            .font
            .subst
            .as_ref()
            .is_some_and(|subst| subst.flags.contains(SubstFlags::GLYPH_PATH));
        if forced_path || matrix[0].abs() + matrix[1].abs() > path_threshold {
            return self.draw_text_path(mgr, cache, run);
        }

        let mode = render_mode(self, run.font, run.flags);
        let device_ctm = from_coefficients(matrix, Vec2::ZERO);
        let mut placed: Vec<PlacedGlyph> = run
            .glyphs
            .iter()
            .map(|pos| {
                let origin = run.text_to_device.transform_point2(pos.origin);
                let x = if mode == RenderMode::Lcd {
                    origin.x.floor() as i32
                } else {
                    origin.x.round() as i32
                };
                let glyph_matrix = match pos.adjust {
                    Some(adjust) => device_ctm * from_coefficients(adjust, Vec2::ZERO),
                    None => device_ctm,
                };
                let bitmap = cache.load_glyph_bitmap(
                    mgr,
                    run.font,
                    pos.glyph,
                    pos.use_secondary_style,
                    &glyph_matrix,
                    pos.dest_width,
                    mode,
                );
                PlacedGlyph {
                    bitmap,
                    origin,
                    x,
                    y: origin.y.round() as i32,
                }
            })
            .collect();
        if mode != RenderMode::Lcd && placed.len() > 1 {
            adjust_glyph_space(&mut placed);
        }

        let bbox = glyphs_bbox(&placed, mode == RenderMode::Lcd);
        if bbox.intersect(&self.clip().bounds()).is_empty() {
            return Ok(());
        }

        let bgr = run.flags.contains(TextFlags::BGR_STRIPE);
        for glyph in &placed {
            let Some(bitmap) = &glyph.bitmap else {
                continue;
            };
            if bitmap.bitmap.is_empty() {
                continue;
            }
            let left = glyph.x + bitmap.left;
            let top = glyph.y - bitmap.top;
            self.stats_mut().glyph_bitmaps += 1;
            if mode == RenderMode::Lcd {
                let phase = lcd_phase(glyph.origin.x);
                self.composite_lcd_mask(&bitmap.bitmap, left, top, phase, bgr, run.color)?;
            } else {
                self.composite_mask(&bitmap.bitmap, left, top, run.color)?;
            }
        }
        Ok(())
    }

    fn draw_text_path(
        &mut self,
        mgr: &FontMgr,
        cache: &mut GlyphCache,
        run: &TextRun<'_>,
    ) -> Result<(), DeviceError> {
        let antialias = self.antialias();
        if run.flags.contains(TextFlags::NO_SMOOTH) {
            self.set_antialias(false);
        }
        let result = run.glyphs.iter().try_for_each(|pos| {
            let Some(path) = cache.load_glyph_path(mgr, run.font, pos.glyph, pos.dest_width) else {
                return Ok(());
            };
            let mut em_to_text = Affine2::from_translation(pos.origin)
                * Affine2::from_scale(Vec2::splat(run.font_size));
            if let Some(adjust) = pos.adjust {
                em_to_text = em_to_text * from_coefficients(adjust, Vec2::ZERO);
            }
            self.stats_mut().glyph_paths += 1;
            self.fill_path(&path, &(run.text_to_device * em_to_text), FillRule::NonZero, run.color)
        });
        self.set_antialias(antialias);
        result
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use super::*;
    use crate::{
        bitmap::Bitmap,
        color::Color,
        context::Settings,
        font::{
            synth::{SynthFont, GLYPH_BLOCK, GLYPH_SPACE},
            SubstFont,
        },
        glyph::NO_GLYPH,
    };

    fn placed(x: i32, y: i32, origin: Vec2) -> PlacedGlyph {
        PlacedGlyph {
            bitmap: None,
            origin,
            x,
            y,
        }
    }

    /// Text space with y up on a `height` pixel tall device.
    fn page(height: f32) -> Affine2 {
        Affine2::from_translation(vec2(0.0, height)) * Affine2::from_scale(vec2(1.0, -1.0))
    }

    fn setup() -> (FontMgr, Font, GlyphCache) {
        let mut mgr = FontMgr::new();
        let face = mgr
            .load_fixed_face(SynthFont::new("Text", "Regular").build(), 0)
            .unwrap();
        (mgr, Font::embedded(face), GlyphCache::new(&Settings::default()))
    }

    fn white(width: u32, height: u32, format: PixelFormat) -> Device {
        let mut target = Bitmap::new(width, height, format).unwrap();
        target.fill(255);
        Device::new(target)
    }

    #[test]
    fn spacing_adjust_moves_inner_glyphs() {
        let mut glyphs = vec![
            placed(0, 5, vec2(0.0, 5.0)),
            placed(12, 5, vec2(10.6, 5.0)),
            placed(22, 5, vec2(21.2, 5.0)),
        ];
        adjust_glyph_space(&mut glyphs);
        let xs: Vec<_> = glyphs.iter().map(|g| g.x).collect();
        assert_eq!(xs, [0, 11, 22]);
    }

    #[test]
    fn spacing_adjust_handles_vertical_and_skips_diagonal() {
        let mut vertical = vec![
            placed(3, 0, vec2(3.0, 0.0)),
            placed(3, 11, vec2(3.0, 10.4)),
            placed(3, 21, vec2(3.0, 21.4)),
        ];
        adjust_glyph_space(&mut vertical);
        assert_eq!(vertical[1].y, 10);

        let mut diagonal = vec![
            placed(0, 0, vec2(0.0, 0.0)),
            placed(12, 12, vec2(10.6, 10.6)),
            placed(22, 22, vec2(21.2, 21.2)),
        ];
        adjust_glyph_space(&mut diagonal);
        assert_eq!(diagonal[1].x, 12);
    }

    #[test]
    fn bbox_spans_all_bitmaps() {
        let glyph = Arc::new(GlyphBitmap {
            bitmap: Bitmap::mask(6, 4).unwrap(),
            left: 1,
            top: 3,
        });
        let glyphs = vec![
            PlacedGlyph {
                bitmap: Some(Arc::clone(&glyph)),
                origin: Vec2::ZERO,
                x: 10,
                y: 10,
            },
            placed(0, 0, Vec2::ZERO),
            PlacedGlyph {
                bitmap: Some(glyph),
                origin: Vec2::ZERO,
                x: 20,
                y: 12,
            },
        ];
        assert_eq!(glyphs_bbox(&glyphs, false), IntRect::new(11, 7, 27, 13));
        assert_eq!(glyphs_bbox(&glyphs, true), IntRect::new(11, 7, 23, 13));
        assert_eq!(glyphs_bbox(&[], false), IntRect::default());
    }

    #[test]
    fn draws_bitmap_glyphs() {
        let (mgr, font, mut cache) = setup();
        let mut device = white(100, 100, PixelFormat::Gray);
        let glyphs = [
            GlyphPosition::new(GLYPH_BLOCK as u32, vec2(10.0, 20.0)),
            GlyphPosition::new(GLYPH_SPACE as u32, vec2(40.0, 20.0)),
            GlyphPosition::new(NO_GLYPH, vec2(60.0, 20.0)),
        ];
        let run = TextRun {
            font: &font,
            glyphs: &glyphs,
            font_size: 40.0,
            text_to_device: page(100.0),
            color: Color::BLACK.into(),
            flags: TextFlags::empty(),
        };
        device
            .draw_text(&mgr, &mut cache, &run, DEFAULT_GLYPH_PATH_THRESHOLD)
            .unwrap();
        // block spans x 14..34, y 52..80
        assert_eq!(device.target().get(20, 60), 0);
        assert_eq!(device.target().get(12, 60), 255);
        assert_eq!(device.target().get(20, 85), 255);
        assert_eq!(device.stats().glyph_bitmaps, 1);
        assert_eq!(device.stats().glyph_paths, 0);
    }

    #[test]
    fn large_text_falls_back_to_paths() {
        let (mgr, font, mut cache) = setup();
        let mut device = white(100, 100, PixelFormat::Gray);
        let glyphs = [GlyphPosition::new(GLYPH_BLOCK as u32, vec2(0.0, 10.0))];
        let run = TextRun {
            font: &font,
            glyphs: &glyphs,
            font_size: 100.0,
            text_to_device: page(100.0),
            color: Color::BLACK.into(),
            flags: TextFlags::NO_SMOOTH,
        };
        device
            .draw_text(&mgr, &mut cache, &run, DEFAULT_GLYPH_PATH_THRESHOLD)
            .unwrap();
        assert_eq!(device.stats().glyph_paths, 1);
        assert_eq!(device.stats().glyph_bitmaps, 0);
        // block spans x 10..60, y 20..90
        assert_eq!(device.target().get(30, 50), 0);
        assert_eq!(device.target().get(70, 50), 255);
        assert!(device.antialias());
    }

    #[test]
    fn lcd_phase_follows_the_floored_column() {
        assert_eq!(lcd_phase(0.0), 0);
        assert_eq!(lcd_phase(10.4), 1);
        assert_eq!(lcd_phase(10.7), 2);
        // column -1, third lane
        assert_eq!(lcd_phase(-0.3), 2);
        assert_eq!(lcd_phase(-0.9), 0);
    }

    #[test]
    fn glyph_path_substitutes_are_filled_as_outlines() {
        let (mgr, mut font, mut cache) = setup();
        font.subst = Some(SubstFont {
            flags: SubstFlags::GLYPH_PATH,
            ..SubstFont::default()
        });
        let mut device = white(100, 100, PixelFormat::Gray);
        let glyphs = [GlyphPosition::new(GLYPH_BLOCK as u32, vec2(10.0, 10.0))];
        let run = TextRun {
            font: &font,
            glyphs: &glyphs,
            font_size: 20.0,
            text_to_device: page(100.0),
            color: Color::BLACK.into(),
            flags: TextFlags::empty(),
        };
        device
            .draw_text(&mgr, &mut cache, &run, DEFAULT_GLYPH_PATH_THRESHOLD)
            .unwrap();
        assert_eq!(device.stats().glyph_paths, 1);
        assert_eq!(device.stats().glyph_bitmaps, 0);
        // block spans x 12..22, y 76..90
        assert_eq!(device.target().get(17, 85), 0);
    }

    #[test]
    fn cleartype_uses_subpixel_coverage_on_rgb() {
        let (mgr, font, mut cache) = setup();
        let glyphs = [GlyphPosition::new(GLYPH_BLOCK as u32, vec2(10.3, 20.0))];
        let run = TextRun {
            font: &font,
            glyphs: &glyphs,
            font_size: 40.0,
            text_to_device: page(100.0),
            color: Color::BLACK.into(),
            flags: TextFlags::CLEARTYPE,
        };
        let mut rgb = white(100, 100, PixelFormat::Rgb);
        rgb.draw_text(&mgr, &mut cache, &run, DEFAULT_GLYPH_PATH_THRESHOLD)
            .unwrap();
        assert_eq!(rgb.target().pixel(24, 60)[..3], [0, 0, 0]);
        assert_eq!(rgb.target().pixel(5, 60)[..3], [255, 255, 255]);
        assert_eq!(render_mode(&rgb, &font, run.flags), RenderMode::Lcd);

        // gray targets have no sub-pixels
        let gray = white(10, 10, PixelFormat::Gray);
        assert_eq!(render_mode(&gray, &font, run.flags), RenderMode::Normal);
        assert_eq!(render_mode(&gray, &font, TextFlags::NO_SMOOTH), RenderMode::Mono);
    }

    #[test]
    fn substitutes_need_cleartype_permission() {
        let (_, font, _) = setup();
        let rgb = white(4, 4, PixelFormat::Rgb);
        let substituted = Font {
            subst: Some(Default::default()),
            ..font.clone()
        };
        assert_eq!(
            render_mode(&rgb, &substituted, TextFlags::CLEARTYPE),
            RenderMode::Normal
        );
    }

    #[test]
    fn runs_outside_the_clip_are_skipped() {
        let (mgr, font, mut cache) = setup();
        let mut device = white(20, 20, PixelFormat::Gray);
        let glyphs = [GlyphPosition::new(GLYPH_BLOCK as u32, vec2(500.0, 20.0))];
        let run = TextRun {
            font: &font,
            glyphs: &glyphs,
            font_size: 12.0,
            text_to_device: page(20.0),
            color: Color::BLACK.into(),
            flags: TextFlags::empty(),
        };
        device
            .draw_text(&mgr, &mut cache, &run, DEFAULT_GLYPH_PATH_THRESHOLD)
            .unwrap();
        assert_eq!(device.stats().glyph_bitmaps, 0);
        assert!(device.target().data().iter().all(|&v| v == 255));
    }
}
