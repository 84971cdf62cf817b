use std::sync::Arc;

use ahash::AHashMap;
use glam::{Affine2, Vec2};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::{
    bitmap::Bitmap,
    context::Settings,
    font::{
        mm::{solve_design_coordinates, DesignCoordinates},
        Charset, FaceKey, Font, FontMgr, LoadedFace,
    },
    geom::{coefficients, IntRect},
    path::Path,
    raster::{render_mask, FillRule},
};

use self::{
    adjust::{
        apply_table, bitmap_embolden_level, contrast_adjust, expand_mono, gamma_table, lcd_filter,
        pack_mono, path_embolden_level, skew_for_angle,
    },
    outline::{Outline, OutlineError},
};

pub mod adjust;
pub mod outline;

/// Glyph index meaning "no glyph". Always fails to load.
pub const NO_GLYPH: u32 = u32::MAX;

/// Flattening tolerance for glyph outlines, in device pixels.
const TOLERANCE: f32 = 0.1;

/// Coverage produced for a glyph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    /// 1 bpp, no anti-aliasing.
    Mono,
    /// 8-bit anti-aliased coverage.
    Normal,
    /// 8-bit coverage at three samples per pixel horizontally.
    Lcd,
}

/// A rendered glyph. `left` and `top` place the bitmap's top-left pixel
/// relative to the glyph origin, `top` counting upwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphBitmap {
    pub bitmap: Bitmap,
    pub left: i32,
    pub top: i32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct StyleKey {
    weight: i32,
    italic_angle: i32,
    vertical: bool,
    secondary: bool,
}

/// Everything besides the glyph index that changes a rendered glyph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct SizeKey {
    face: FaceKey,
    /// Matrix coefficients in 1/10000 units.
    matrix: [i32; 4],
    dest_width: i32,
    mode: RenderMode,
    style: Option<StyleKey>,
}

impl SizeKey {
    fn new(font: &Font, matrix: &Affine2, dest_width: i32, mode: RenderMode, secondary: bool) -> Self {
        Self {
            face: font.face,
            matrix: coefficients(matrix).map(|v| (v * 10000.0) as i32),
            dest_width,
            mode,
            style: font.subst.as_ref().map(|subst| StyleKey {
                weight: subst.weight,
                italic_angle: subst.italic_angle,
                vertical: font.vertical,
                secondary,
            }),
        }
    }
}

/// Key of the path cache: the glyph index with the substitute's style
/// packed into the upper bits.
fn path_key(font: &Font, glyph: u32, dest_width: i32) -> u64 {
    match &font.subst {
        Some(subst) => {
            let packed = glyph as i64
                + (((subst.weight / 16) as i64) << 15)
                + (((subst.italic_angle / 2) as i64) << 21)
                + (((dest_width / 16) as i64) << 25)
                + ((font.vertical as i64) << 31);
            packed as u64
        }
        None => glyph as u64,
    }
}

/// Synthetic styling applied to an outline before it is used.
#[derive(Debug, Clone, Copy)]
struct Styling {
    /// Maps em units to output units, y up.
    matrix: [f32; 4],
    /// In output units.
    embolden: f32,
}

/// Loads the outline of `glyph`, styles it, and on failure retries once
/// without emboldening.
fn styled_outline(
    face: &LoadedFace,
    coords: &[(ttf_parser::Tag, f32)],
    glyph: u32,
    styling: Styling,
) -> Option<Outline> {
    let parsed = face.parse(coords)?;
    let attempt = |embolden: f32| -> Result<Outline, OutlineError> {
        let mut outline = Outline::load(&parsed, glyph)?;
        outline.transform(styling.matrix);
        outline.embolden(embolden);
        if outline.is_finite() {
            Ok(outline)
        } else {
            Err(OutlineError::Malformed(glyph))
        }
    };
    match attempt(styling.embolden) {
        Ok(outline) => Some(outline),
        Err(e @ OutlineError::GlyphOutOfRange(_)) => {
            log::debug!("{}", e);
            None
        }
        Err(e) => {
            log::debug!("{}, retrying without emboldening", e);
            attempt(0.0).ok()
        }
    }
}

/// Memoizes rendered glyph bitmaps and glyph paths.
///
/// Bitmaps are grouped by [`SizeKey`]: one unbounded LRU per face,
/// transform, mode and substitute style. Entries live until
/// [`GlyphCache::clear`] or [`GlyphCache::purge_face`].
pub struct GlyphCache {
    sizes: AHashMap<SizeKey, LruCache<u32, Arc<GlyphBitmap>>>,
    paths: LruCache<(FaceKey, u64), Option<Arc<Path>>>,

    gamma: [u8; 256],
    lcd_filter: bool,
    max_glyph_size: u32,

    renders: u64,
}

impl GlyphCache {
    pub fn new(settings: &Settings) -> Self {
        Self {
            sizes: AHashMap::new(),
            paths: LruCache::unbounded(), // entries are dropped manually

            gamma: gamma_table(settings.text_gamma),
            lcd_filter: settings.lcd_filter,
            max_glyph_size: settings.max_glyph_size,

            renders: 0,
        }
    }

    /// Renders `glyph` of `font` under `matrix`, which maps em units to
    /// device pixels with y pointing up.
    ///
    /// `dest_width` is the advance the document expects, in thousandths of
    /// an em; it only matters for multiple master substitutes.
    /// `use_secondary_style` selects the CJK weight and slant of a CJK
    /// substitute.
    ///
    /// Returns `None` for [`NO_GLYPH`], glyphs beyond the face, glyphs
    /// larger than the configured maximum and outlines that cannot be
    /// extracted.
    #[allow(clippy::too_many_arguments)]
    pub fn load_glyph_bitmap(
        &mut self,
        mgr: &FontMgr,
        font: &Font,
        glyph: u32,
        use_secondary_style: bool,
        matrix: &Affine2,
        dest_width: i32,
        mode: RenderMode,
    ) -> Option<Arc<GlyphBitmap>> {
        if glyph == NO_GLYPH {
            return None;
        }
        let key = SizeKey::new(font, matrix, dest_width, mode, use_secondary_style);
        if let Some(hit) = self.sizes.get_mut(&key).and_then(|glyphs| glyphs.get(&glyph)) {
            return Some(Arc::clone(hit));
        }

        let Some(face) = mgr.face(font.face) else {
            log::debug!("Glyph requested from a released face");
            return None;
        };
        let rendered = Arc::new(self.render_glyph(
            face,
            font,
            glyph,
            use_secondary_style,
            matrix,
            dest_width,
            mode,
        )?);
        self.sizes
            .entry(key)
            .or_insert_with(LruCache::unbounded)
            .put(glyph, Arc::clone(&rendered));
        Some(rendered)
    }

    #[allow(clippy::too_many_arguments)]
    fn render_glyph(
        &mut self,
        face: &LoadedFace,
        font: &Font,
        glyph: u32,
        use_secondary_style: bool,
        matrix: &Affine2,
        dest_width: i32,
        mode: RenderMode,
    ) -> Option<GlyphBitmap> {
        let [a, mut b, mut c, d] = coefficients(matrix);
        let ppem = c.hypot(d).round().clamp(0.0, u16::MAX as f32) as u16;
        let mut coords = DesignCoordinates::new();
        let mut embolden = 0.0;
        if let Some(subst) = &font.subst {
            let (weight, angle) = if subst.subst_of_cjk && use_secondary_style {
                (subst.weight_cjk, if subst.italic_cjk { -15 } else { 0 })
            } else {
                (subst.weight, subst.italic_angle)
            };
            let skew = skew_for_angle(angle) as f32 / 100.0;
            if font.vertical {
                b += d * skew;
            } else {
                c -= a * skew;
            }
            if subst.is_multi_master() {
                coords = solve_design_coordinates(face, glyph as u16, dest_width, subst.weight);
            } else if weight > 400 {
                // |xx| + |xy| of the 16.16 matrix on the 64 pixel grid
                let scale = ((a.abs() + c.abs()) * 1024.0) as i64;
                let level = bitmap_embolden_level(weight, subst.charset == Charset::SHIFT_JIS, scale)?;
                embolden = level as f32 / 64.0;
            }
        }

        let mut outline = styled_outline(
            face,
            &coords,
            glyph,
            Styling {
                matrix: [a, b, c, d],
                embolden,
            },
        )?;
        self.renders += 1;
        // 26.6 device coordinates
        outline.round_to_grid(64.0);

        let Some(cbox) = outline.control_box() else {
            return Some(GlyphBitmap {
                bitmap: Bitmap::mask(0, 0).ok()?,
                left: 0,
                top: 0,
            });
        };
        let mut left = cbox.min.x.floor() as i32;
        let top = cbox.max.y.ceil() as i32;
        let mut width = cbox.max.x.ceil() as i32 - left;
        let height = top - cbox.min.y.floor() as i32;
        if width > self.max_glyph_size as i32 || height > self.max_glyph_size as i32 {
            log::debug!("Glyph {} is too large to cache ({}x{})", glyph, width, height);
            return None;
        }

        let aliased = mode == RenderMode::Mono || face.prefers_mono(ppem);
        let subpixel = mode == RenderMode::Lcd && !aliased;
        let lanes = if subpixel { 3 } else { 1 };
        if subpixel {
            left -= 1;
            width += 2;
        }

        let path = outline.to_path(|p| {
            Vec2::new((p.x - left as f32) * lanes as f32, top as f32 - p.y)
        });
        let polylines = path.flatten(&Affine2::IDENTITY, TOLERANCE);
        let area = IntRect::from_size(width as u32 * lanes, height as u32);
        let mask = match render_mask(&polylines, FillRule::NonZero, area, !aliased) {
            Ok(mask) => mask,
            Err(e) => {
                log::warn!("Failed to rasterize glyph {}: {}", glyph, e);
                return None;
            }
        };

        let bitmap = match mode {
            RenderMode::Mono => pack_mono(&mask).ok()?,
            RenderMode::Lcd if aliased => expand_mono(&mask, 3).ok()?,
            RenderMode::Normal if aliased => expand_mono(&mask, 1).ok()?,
            _ => {
                let mut mask = mask;
                if subpixel && self.lcd_filter {
                    lcd_filter(&mut mask);
                }
                contrast_adjust(&mut mask);
                apply_table(&mut mask, &self.gamma);
                mask
            }
        };
        Some(GlyphBitmap { bitmap, left, top })
    }

    /// The outline of `glyph` in em units, y up, with the substitute's
    /// slant and weight applied. Quadratic segments are raised to cubics.
    ///
    /// Misses are cached too: a glyph without an outline stays `None`.
    pub fn load_glyph_path(
        &mut self,
        mgr: &FontMgr,
        font: &Font,
        glyph: u32,
        dest_width: i32,
    ) -> Option<Arc<Path>> {
        if glyph == NO_GLYPH {
            return None;
        }
        let key = (font.face, path_key(font, glyph, dest_width));
        if let Some(hit) = self.paths.get(&key) {
            return hit.clone();
        }
        let path = mgr
            .face(font.face)
            .and_then(|face| build_glyph_path(face, font, glyph, dest_width))
            .map(Arc::new);
        self.paths.put(key, path.clone());
        path
    }

    /// Drops every cached bitmap and path.
    pub fn clear(&mut self) {
        self.sizes.clear();
        self.paths.clear();
    }

    /// Drops the entries rendered from `face`, typically right before the
    /// face is released.
    pub fn purge_face(&mut self, face: FaceKey) {
        self.sizes.retain(|key, _| key.face != face);
        let stale: Vec<_> = self
            .paths
            .iter()
            .filter(|((f, _), _)| *f == face)
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            self.paths.pop(&key);
        }
    }

    /// Number of cached glyph bitmaps.
    pub fn bitmap_count(&self) -> usize {
        self.sizes.values().map(LruCache::len).sum()
    }

    /// Number of cached path results, misses included.
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Outlines rasterized since the cache was created.
    pub fn render_count(&self) -> u64 {
        self.renders
    }
}

fn build_glyph_path(face: &LoadedFace, font: &Font, glyph: u32, dest_width: i32) -> Option<Path> {
    let mut matrix = [1.0, 0.0, 0.0, 1.0];
    let mut coords = DesignCoordinates::new();
    let mut embolden = 0.0;
    if let Some(subst) = &font.subst {
        let skew = skew_for_angle(subst.italic_angle) as f32 / 100.0;
        if font.vertical {
            matrix[1] += skew;
        } else {
            matrix[2] -= skew;
        }
        if subst.is_multi_master() {
            coords = solve_design_coordinates(face, glyph as u16, dest_width, subst.weight);
        } else {
            let level = path_embolden_level(subst.weight, subst.charset == Charset::SHIFT_JIS);
            // 26.6 units on the 64 pixel grid
            embolden = level as f32 / (64.0 * 64.0);
        }
    }
    let outline = styled_outline(face, &coords, glyph, Styling { matrix, embolden })?;
    if outline.is_empty() {
        return None;
    }
    Some(outline.to_glyph_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        font::{
            synth::{SynthFont, GLYPH_BLOCK, GLYPH_BOWL, GLYPH_SPACE},
            SubstFlags, SubstFont,
        },
        path::PathSegment,
    };

    fn setup(font: SynthFont) -> (FontMgr, Font, GlyphCache) {
        let mut mgr = FontMgr::new();
        let face = mgr.load_fixed_face(font.build(), 0).unwrap();
        (mgr, Font::embedded(face), GlyphCache::new(&Settings::default()))
    }

    fn scale(s: f32) -> Affine2 {
        Affine2::from_scale(Vec2::splat(s))
    }

    fn with_subst(font: &Font, subst: SubstFont) -> Font {
        Font {
            face: font.face,
            subst: Some(subst),
            vertical: false,
        }
    }

    #[test]
    fn places_block_glyph() {
        let (mgr, font, mut cache) = setup(SynthFont::new("Glyphs", "Regular"));
        let glyph = cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BLOCK as u32, false, &scale(100.0), 0, RenderMode::Normal)
            .unwrap();
        assert_eq!((glyph.left, glyph.top), (10, 70));
        assert_eq!((glyph.bitmap.width(), glyph.bitmap.height()), (50, 70));
        assert_eq!(glyph.bitmap.get(25, 35), 255);
        assert_eq!(glyph.bitmap.get(0, 0), 255);
    }

    #[test]
    fn hits_do_not_rerender() {
        let (mgr, font, mut cache) = setup(SynthFont::new("Glyphs", "Regular"));
        let m = scale(24.0);
        let first = cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BOWL as u32, false, &m, 0, RenderMode::Normal)
            .unwrap();
        let second = cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BOWL as u32, false, &m, 0, RenderMode::Normal)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.render_count(), 1);

        // a different quantized matrix is a different entry
        cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BOWL as u32, false, &scale(24.001), 0, RenderMode::Normal)
            .unwrap();
        cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BOWL as u32, false, &m, 0, RenderMode::Mono)
            .unwrap();
        assert_eq!(cache.render_count(), 3);
        assert_eq!(cache.bitmap_count(), 3);

        cache.clear();
        assert_eq!(cache.bitmap_count(), 0);
    }

    #[test]
    fn rejects_missing_and_oversized_glyphs() {
        let (mgr, font, mut cache) = setup(SynthFont::new("Glyphs", "Regular"));
        let m = scale(20.0);
        assert!(cache
            .load_glyph_bitmap(&mgr, &font, NO_GLYPH, false, &m, 0, RenderMode::Normal)
            .is_none());
        assert!(cache
            .load_glyph_bitmap(&mgr, &font, 99, false, &m, 0, RenderMode::Normal)
            .is_none());
        assert!(cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BLOCK as u32, false, &scale(4000.0), 0, RenderMode::Normal)
            .is_none());
        assert_eq!(cache.bitmap_count(), 0);
    }

    #[test]
    fn space_renders_empty() {
        let (mgr, font, mut cache) = setup(SynthFont::new("Glyphs", "Regular"));
        let glyph = cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_SPACE as u32, false, &scale(20.0), 0, RenderMode::Normal)
            .unwrap();
        assert!(glyph.bitmap.is_empty());
    }

    #[test]
    fn mono_and_lcd_layouts() {
        let (mgr, font, mut cache) = setup(SynthFont::new("Glyphs", "Regular"));
        let m = scale(100.0);
        let mono = cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BLOCK as u32, false, &m, 0, RenderMode::Mono)
            .unwrap();
        assert_eq!(mono.bitmap.format(), crate::bitmap::PixelFormat::Mono);
        assert!(mono.bitmap.get_bit(10, 10));

        let lcd = cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BLOCK as u32, false, &m, 0, RenderMode::Lcd)
            .unwrap();
        assert_eq!(lcd.left, 9);
        assert_eq!(lcd.bitmap.width(), 52 * 3);
        assert_eq!(lcd.bitmap.height(), 70);
        // the padding column only sees filter spill
        assert_eq!(lcd.bitmap.get(0, 10), 0);
        assert_eq!(lcd.bitmap.get(78, 10), 255);
    }

    #[test]
    fn gasp_forces_aliased_coverage() {
        let (mgr, font, mut cache) =
            setup(SynthFont::new("Glyphs", "Regular").gasp(&[(0xFFFF, 0x0001)]));
        let glyph = cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BOWL as u32, false, &scale(30.0), 0, RenderMode::Normal)
            .unwrap();
        let data = glyph.bitmap.data();
        assert!(data.iter().all(|&v| v == 0 || v == 255));
        assert!(data.contains(&255));
    }

    #[test]
    fn synthetic_bold_and_italic_widen_glyphs() {
        let (mgr, font, mut cache) = setup(SynthFont::new("Glyphs", "Regular"));
        let m = scale(100.0);
        let regular = cache
            .load_glyph_bitmap(&mgr, &font, GLYPH_BLOCK as u32, false, &m, 0, RenderMode::Normal)
            .unwrap();

        let bold = with_subst(&font, SubstFont {
            weight: 700,
            ..SubstFont::default()
        });
        let bold = cache
            .load_glyph_bitmap(&mgr, &bold, GLYPH_BLOCK as u32, false, &m, 0, RenderMode::Normal)
            .unwrap();
        assert!(bold.bitmap.width() > regular.bitmap.width());
        assert_eq!(bold.left, regular.left);

        let italic = with_subst(&font, SubstFont {
            italic_angle: -12,
            ..SubstFont::default()
        });
        let italic = cache
            .load_glyph_bitmap(&mgr, &italic, GLYPH_BLOCK as u32, false, &m, 0, RenderMode::Normal)
            .unwrap();
        // 0.7 em tall at 0.21 shear
        assert_eq!(italic.bitmap.width(), 50 + 15);

        let too_heavy = with_subst(&font, SubstFont {
            weight: 1500,
            ..SubstFont::default()
        });
        assert!(cache
            .load_glyph_bitmap(&mgr, &too_heavy, GLYPH_BLOCK as u32, false, &m, 0, RenderMode::Normal)
            .is_none());
    }

    #[test]
    fn cjk_secondary_style() {
        let (mgr, font, mut cache) = setup(SynthFont::new("Glyphs", "Regular"));
        let m = scale(100.0);
        let cjk = with_subst(&font, SubstFont {
            italic_angle: -20,
            subst_of_cjk: true,
            weight_cjk: 400,
            italic_cjk: false,
            ..SubstFont::default()
        });
        let primary = cache
            .load_glyph_bitmap(&mgr, &cjk, GLYPH_BLOCK as u32, false, &m, 0, RenderMode::Normal)
            .unwrap();
        let secondary = cache
            .load_glyph_bitmap(&mgr, &cjk, GLYPH_BLOCK as u32, true, &m, 0, RenderMode::Normal)
            .unwrap();
        assert!(primary.bitmap.width() > secondary.bitmap.width());
        assert_eq!(secondary.bitmap.width(), 50);
    }

    #[test]
    fn glyph_paths_are_cached_in_em_units() {
        let (mgr, font, mut cache) = setup(SynthFont::new("Glyphs", "Regular"));
        let path = cache.load_glyph_path(&mgr, &font, GLYPH_BLOCK as u32, 0).unwrap();
        let segments: Vec<_> = path.segments().collect();
        assert_eq!(segments.len(), 6);
        assert_eq!(segments[0], PathSegment::MoveTo(Vec2::new(0.1, 0.0)));
        assert_eq!(segments[4], PathSegment::LineTo(Vec2::new(0.1, 0.0)));
        assert_eq!(segments[5], PathSegment::Close);

        let again = cache.load_glyph_path(&mgr, &font, GLYPH_BLOCK as u32, 0).unwrap();
        assert!(Arc::ptr_eq(&path, &again));

        let bowl = cache.load_glyph_path(&mgr, &font, GLYPH_BOWL as u32, 0).unwrap();
        assert!(bowl
            .segments()
            .any(|s| matches!(s, PathSegment::CubicTo { .. })));
        assert!(!bowl.segments().any(|s| matches!(s, PathSegment::QuadTo { .. })));

        assert!(cache.load_glyph_path(&mgr, &font, GLYPH_SPACE as u32, 0).is_none());
        assert_eq!(cache.path_count(), 3);
        cache.purge_face(font.face);
        assert_eq!(cache.path_count(), 0);
    }

    #[test]
    fn path_keys_pack_style() {
        let (_, font, _) = setup(SynthFont::new("Glyphs", "Regular"));
        assert_eq!(path_key(&font, 7, 500), 7);
        let styled = with_subst(&font, SubstFont {
            weight: 700,
            italic_angle: -12,
            ..SubstFont::default()
        })
        .vertical(true);
        let expected = 7i64 + (43 << 15) + (-6i64 << 21) + (31 << 25) + (1 << 31);
        assert_eq!(path_key(&styled, 7, 500), expected as u64);
    }

    #[test]
    fn multi_master_paths_use_design_coordinates() {
        let (mgr, font, mut cache) = setup(
            SynthFont::new("Glyphs MM", "Regular")
                .axis((*b"wght", 100.0, 400.0, 900.0))
                .axis((*b"wdth", 50.0, 100.0, 200.0)),
        );
        let mm = with_subst(&font, SubstFont {
            weight: 700,
            flags: SubstFlags::MULTI_MASTER,
            ..SubstFont::default()
        });
        let path = cache.load_glyph_path(&mgr, &mm, GLYPH_BLOCK as u32, 650).unwrap();
        // no emboldening for multiple master faces
        assert_eq!(path.bounds().unwrap().max.x, 0.6);
        let glyph = cache
            .load_glyph_bitmap(&mgr, &mm, GLYPH_BLOCK as u32, false, &scale(100.0), 650, RenderMode::Normal)
            .unwrap();
        assert_eq!(glyph.bitmap.width(), 50);
    }

    #[test]
    fn purging_a_face_keeps_others() {
        let (mut mgr, font, mut cache) = setup(SynthFont::new("Glyphs", "Regular"));
        let other = Font::embedded(
            mgr.load_fixed_face(SynthFont::new("Other", "Regular").build(), 0)
                .unwrap(),
        );
        let m = scale(16.0);
        for f in [&font, &other] {
            cache
                .load_glyph_bitmap(&mgr, f, GLYPH_BLOCK as u32, false, &m, 0, RenderMode::Normal)
                .unwrap();
        }
        cache.purge_face(font.face);
        assert_eq!(cache.bitmap_count(), 1);
    }
}
