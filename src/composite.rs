//! Blending coverage spans into destination rows, one routine per pixel
//! format.

use crate::{
    bitmap::{Bitmap, PixelFormat},
    color::{Cmyk, Color, FillColor},
    glyph::adjust::TEXT_GAMMA_ADJUST,
};

/// A fill color prepared for every destination format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Paint {
    pub rgb: Color,
    pub cmyk: Cmyk,
    pub gray: u8,
    pub alpha: u8,
}

impl Paint {
    pub fn new(fill: FillColor) -> Self {
        let rgb = fill.to_rgb();
        Self {
            rgb,
            cmyk: fill.to_cmyk(),
            gray: rgb.gray(),
            alpha: fill.alpha(),
        }
    }
}

/// `alpha * cover / 255`, then `* clip / 255`. Each step truncates.
pub fn effective_alpha(alpha: u8, cover: u8, clip: Option<u8>) -> u8 {
    let a = alpha as u32 * cover as u32 / 255;
    match clip {
        Some(clip) => (a * clip as u32 / 255) as u8,
        None => a as u8,
    }
}

/// `dst + (src - dst) * alpha / 255` with truncating division.
pub fn blend(dst: u8, src: u8, alpha: u8) -> u8 {
    (dst as i32 + (src as i32 - dst as i32) * alpha as i32 / 255) as u8
}

/// Accumulates `src_alpha` into a destination alpha value and returns the
/// ratio to blend color channels with.
fn merge_alpha(dst_alpha: &mut u8, src_alpha: u8) -> u8 {
    let da = *dst_alpha as u32;
    let sa = src_alpha as u32;
    let out = da + sa - da * sa / 255;
    *dst_alpha = out as u8;
    (sa * 255 / out) as u8
}

/// Blends a span of coverage into row `y`, starting at column `x`.
/// `clip` is aligned with `covers` when present.
pub type SpanFn = fn(&mut Bitmap, u32, i32, &[u8], Option<&[u8]>, &Paint);

pub fn span_fn(format: PixelFormat) -> SpanFn {
    match format {
        PixelFormat::Mono => span_mono,
        PixelFormat::Gray => span_gray,
        PixelFormat::Rgb => span_rgb,
        PixelFormat::Rgba => span_rgba,
        PixelFormat::Cmyk => span_cmyk,
    }
}

/// Iterates `(column, effective alpha)` for nonzero alphas.
fn alphas<'a>(
    x: i32,
    covers: &'a [u8],
    clip: Option<&'a [u8]>,
    paint: &'a Paint,
) -> impl Iterator<Item = (usize, u8)> + 'a {
    covers.iter().enumerate().filter_map(move |(i, &cover)| {
        let a = effective_alpha(paint.alpha, cover, clip.map(|c| c[i]));
        (a != 0).then_some(((x + i as i32) as usize, a))
    })
}

fn span_mono(dst: &mut Bitmap, y: u32, x: i32, covers: &[u8], clip: Option<&[u8]>, paint: &Paint) {
    let on = paint.gray == u8::MAX;
    for (col, _) in alphas(x, covers, clip, paint) {
        dst.set_bit(col as u32, y, on);
    }
}

fn span_gray(dst: &mut Bitmap, y: u32, x: i32, covers: &[u8], clip: Option<&[u8]>, paint: &Paint) {
    let (row, mut alpha_row) = dst.rows_mut(y);
    for (col, a) in alphas(x, covers, clip, paint) {
        match &mut alpha_row {
            Some(alpha_row) if a != u8::MAX => {
                let ratio = merge_alpha(&mut alpha_row[col], a);
                row[col] = blend(row[col], paint.gray, ratio);
            }
            Some(alpha_row) => {
                row[col] = paint.gray;
                alpha_row[col] = paint.alpha;
            }
            None if a == u8::MAX => row[col] = paint.gray,
            None => row[col] = blend(row[col], paint.gray, a),
        }
    }
}

fn span_rgb(dst: &mut Bitmap, y: u32, x: i32, covers: &[u8], clip: Option<&[u8]>, paint: &Paint) {
    let (row, mut alpha_row) = dst.rows_mut(y);
    let src = [paint.rgb.red(), paint.rgb.green(), paint.rgb.blue()];
    for (col, a) in alphas(x, covers, clip, paint) {
        let pixel = &mut row[col * 3..col * 3 + 3];
        if a == u8::MAX {
            pixel.copy_from_slice(&src);
            if let Some(alpha_row) = &mut alpha_row {
                alpha_row[col] = paint.alpha;
            }
            continue;
        }
        let ratio = match &mut alpha_row {
            Some(alpha_row) => merge_alpha(&mut alpha_row[col], a),
            None => a,
        };
        for (d, s) in pixel.iter_mut().zip(src) {
            *d = blend(*d, s, ratio);
        }
    }
}

fn span_rgba(dst: &mut Bitmap, y: u32, x: i32, covers: &[u8], clip: Option<&[u8]>, paint: &Paint) {
    let pixels = dst.pixels_row_mut(y);
    let [r, g, b, _] = paint.rgb.to_array();
    for (col, a) in alphas(x, covers, clip, paint) {
        let pixel = &mut pixels[col];
        if a == u8::MAX {
            *pixel = [r, g, b, u8::MAX];
            continue;
        }
        if pixel[3] == 0 {
            *pixel = [r, g, b, a];
            continue;
        }
        let ratio = merge_alpha(&mut pixel[3], a);
        pixel[0] = blend(pixel[0], r, ratio);
        pixel[1] = blend(pixel[1], g, ratio);
        pixel[2] = blend(pixel[2], b, ratio);
    }
}

fn span_cmyk(dst: &mut Bitmap, y: u32, x: i32, covers: &[u8], clip: Option<&[u8]>, paint: &Paint) {
    let src = paint.cmyk.to_array();
    let (row, mut alpha_row) = dst.rows_mut(y);
    let pixels: &mut [[u8; 4]] = bytemuck::cast_slice_mut(row);
    for (col, a) in alphas(x, covers, clip, paint) {
        let pixel = &mut pixels[col];
        if a == u8::MAX {
            *pixel = src;
            if let Some(alpha_row) = &mut alpha_row {
                alpha_row[col] = paint.alpha;
            }
            continue;
        }
        let ratio = match &mut alpha_row {
            Some(alpha_row) => merge_alpha(&mut alpha_row[col], a),
            None => a,
        };
        for (d, s) in pixel.iter_mut().zip(src) {
            *d = blend(*d, s, ratio);
        }
    }
}

/// A gamma curve and its inverse applied around sub-pixel blending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gamma {
    forward: [u8; 256],
    inverse: [u8; 256],
}

impl Default for Gamma {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Gamma {
    pub fn new(exponent: f32) -> Self {
        let exponent = if exponent > 0.0 { exponent } else { 1.0 };
        let table = |e: f32| {
            let mut t = [0u8; 256];
            for (i, v) in t.iter_mut().enumerate() {
                *v = ((i as f32 / 255.0).powf(e) * 255.0 + 0.5) as u8;
            }
            t
        };
        Self {
            forward: table(exponent),
            inverse: table(1.0 / exponent),
        }
    }

    pub fn apply(&self, v: u8) -> u8 {
        self.forward[v as usize]
    }

    pub fn invert(&self, v: u8) -> u8 {
        self.inverse[v as usize]
    }
}

/// Sub-pixel layout of one glyph row.
#[derive(Copy, Clone, Debug)]
pub struct LcdRow<'a> {
    /// Three coverage lanes per destination pixel.
    pub lanes: &'a [u8],
    /// Horizontal phase of the glyph origin in lanes, 0 to 2.
    pub phase: usize,
    pub bgr: bool,
}

impl LcdRow<'_> {
    /// Lane feeding `channel` (0 = red) of glyph column `col`, or zero
    /// outside the glyph.
    fn lane(&self, col: usize, channel: usize) -> u8 {
        let offset = (if self.bgr { 2 - channel } else { channel }) as isize;
        let index = col as isize * 3 + offset - self.phase as isize;
        if index < 0 {
            return 0;
        }
        self.lanes.get(index as usize).copied().unwrap_or(0)
    }
}

/// Blends sub-pixel glyph coverage into an RGB or RGBA row. Glyph column
/// `first_col` lands on device column `x`. The destination alpha becomes
/// opaque.
pub fn composite_lcd_row(
    dst: &mut Bitmap,
    y: u32,
    x: i32,
    first_col: usize,
    len: usize,
    glyph: LcdRow,
    clip: Option<&[u8]>,
    paint: &Paint,
    gamma: &Gamma,
) {
    let bpp = dst.format().bytes_per_pixel();
    let src = [
        gamma.apply(paint.rgb.red()),
        gamma.apply(paint.rgb.green()),
        gamma.apply(paint.rgb.blue()),
    ];
    let row = dst.row_mut(y);
    for i in 0..len {
        let col = (x + i as i32) as usize;
        let pixel = &mut row[col * bpp..col * bpp + bpp];
        for channel in 0..3 {
            let coverage = TEXT_GAMMA_ADJUST[glyph.lane(first_col + i, channel) as usize];
            let a = effective_alpha(paint.alpha, coverage, clip.map(|c| c[i]));
            pixel[channel] = gamma.invert(blend(gamma.apply(pixel[channel]), src[channel], a));
        }
        if bpp == 4 {
            pixel[3] = u8::MAX;
        }
    }
}
