//! Tables and coverage post-processing for synthesized glyph styles.

use crate::{
    bitmap::{Bitmap, PixelFormat},
    device::DeviceError,
};

/// Horizontal shear, in hundredths, for italic angles 0 to 29 degrees.
pub const ANGLE_SKEW: [i32; 30] = [
    0, 2, 3, 5, 7, 9, 11, 12, 14, 16, 18, 19, 21, 23, 25, 27,
    29, 31, 32, 34, 36, 38, 40, 42, 45, 47, 49, 51, 53, 55,
];

/// Path emboldening strength per 10 units of weight above 400.
pub const WEIGHT_POW: [u8; 100] = [
    0, 3, 6, 7, 8, 9, 11, 12, 14, 15, 16, 17, 18, 19, 20, 21,
    22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 35, 36,
    36, 37, 37, 37, 38, 38, 38, 39, 39, 39, 40, 40, 40, 41, 41, 41,
    42, 42, 42, 42, 43, 43, 43, 44, 44, 44, 44, 45, 45, 45, 45, 46,
    46, 46, 46, 47, 47, 47, 47, 48, 48, 48, 48, 48, 49, 49, 49, 49,
    50, 50, 50, 50, 50, 51, 51, 51, 51, 51, 52, 52, 52, 52, 52, 53,
    53, 53, 53, 53,
];

/// Bitmap emboldening strength per 10 units of weight above 400.
pub const WEIGHT_POW_11: [u8; 100] = [
    0, 4, 7, 8, 9, 10, 12, 13, 15, 17, 18, 19, 20, 21, 22, 23,
    24, 25, 26, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 39, 39, 40,
    40, 41, 41, 41, 42, 42, 42, 43, 43, 43, 44, 44, 44, 45, 45, 45,
    46, 46, 46, 46, 43, 47, 47, 48, 48, 48, 48, 45, 50, 50, 50, 46,
    51, 51, 51, 52, 52, 52, 52, 53, 53, 53, 53, 53, 54, 54, 54, 54,
    55, 55, 55, 55, 55, 56, 56, 56, 56, 56, 57, 57, 57, 57, 57, 58,
    58, 58, 58, 58,
];

/// Emboldening strength for Shift-JIS substitutes, bitmaps and paths.
pub const WEIGHT_POW_SHIFTJIS: [u8; 100] = [
    0, 0, 1, 2, 3, 4, 5, 7, 8, 10, 11, 13, 14, 16, 17, 19,
    21, 22, 24, 26, 28, 30, 32, 33, 35, 37, 39, 41, 43, 45, 48, 48,
    48, 48, 49, 49, 49, 50, 50, 50, 50, 51, 51, 51, 51, 52, 52, 52,
    52, 52, 53, 53, 53, 53, 53, 54, 54, 54, 54, 54, 55, 55, 55, 55,
    55, 56, 56, 56, 56, 56, 56, 57, 57, 57, 57, 57, 57, 57, 58, 58,
    58, 58, 58, 58, 58, 59, 59, 59, 59, 59, 59, 59, 60, 60, 60, 60,
    60, 60, 60, 60,
];

/// Coverage curve applied to sub-pixel text lanes when compositing.
pub const TEXT_GAMMA_ADJUST: [u8; 256] = [
    0, 2, 3, 4, 6, 7, 8, 10, 11, 12, 13, 15, 16, 17, 18, 19,
    21, 22, 23, 24, 25, 26, 27, 29, 30, 31, 32, 33, 34, 35, 36, 38,
    39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 51, 52, 53, 54, 55,
    56, 57, 58, 59, 60, 61, 62, 63, 64, 65, 66, 67, 68, 69, 71, 72,
    73, 74, 75, 76, 77, 78, 79, 80, 81, 82, 83, 84, 85, 86, 87, 88,
    89, 90, 91, 92, 93, 94, 95, 96, 97, 98, 99, 100, 101, 102, 103, 104,
    105, 106, 107, 108, 109, 110, 111, 112, 113, 114, 115, 116, 117, 118, 119, 120,
    121, 122, 123, 124, 125, 126, 127, 128, 129, 129, 130, 131, 132, 133, 134, 135,
    136, 137, 138, 139, 140, 141, 142, 143, 144, 145, 146, 147, 148, 149, 150, 151,
    152, 153, 154, 155, 156, 156, 157, 158, 159, 160, 161, 162, 163, 164, 165, 166,
    167, 168, 169, 170, 171, 172, 173, 174, 174, 175, 176, 177, 178, 179, 180, 181,
    182, 183, 184, 185, 186, 187, 188, 189, 190, 190, 191, 192, 193, 194, 195, 196,
    197, 198, 199, 200, 201, 202, 203, 204, 204, 205, 206, 207, 208, 209, 210, 211,
    212, 213, 214, 215, 216, 217, 217, 218, 219, 220, 221, 222, 223, 224, 225, 226,
    227, 228, 228, 229, 230, 231, 232, 233, 234, 235, 236, 237, 238, 239, 239, 240,
    241, 242, 243, 244, 245, 246, 247, 248, 249, 250, 250, 251, 252, 253, 254, 255,
];

/// Shear in hundredths for an italic angle in degrees.
///
/// Negative angles lean right and give a negative shear. Angles beyond
/// 29 degrees either way saturate at 58.
pub fn skew_for_angle(angle: i32) -> i32 {
    if angle == 0 {
        return 0;
    }
    let magnitude = match angle.unsigned_abs() as usize {
        a if a >= ANGLE_SKEW.len() => 58,
        a => ANGLE_SKEW[a],
    };
    if angle < 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Row of the weight tables for `weight`, `None` when not emboldened.
pub fn weight_index(weight: i32) -> Option<usize> {
    (weight > 400).then(|| ((weight - 400) / 10) as usize)
}

/// Bitmap emboldening strength in 26.6 device units.
///
/// `scale` is `|xx| + |xy|` of the 16.16 glyph matrix. `None` when the
/// weight is past the end of the table.
pub fn bitmap_embolden_level(weight: i32, shift_jis: bool, scale: i64) -> Option<i64> {
    let index = weight_index(weight)?;
    if index >= WEIGHT_POW_11.len() {
        return None;
    }
    let level = if shift_jis {
        WEIGHT_POW_SHIFTJIS[index] as i64 * 2 * scale / 36655
    } else {
        WEIGHT_POW_11[index] as i64 * scale / 36655
    };
    Some(level)
}

/// Path emboldening strength in 26.6 units on the 64 pixel grid.
///
/// Weights past the end of the table use the last row.
pub fn path_embolden_level(weight: i32, shift_jis: bool) -> i64 {
    let Some(index) = weight_index(weight) else {
        return 0;
    };
    let index = index.min(WEIGHT_POW.len() - 1);
    if shift_jis {
        WEIGHT_POW_SHIFTJIS[index] as i64 * 2 * 65536 / 36655
    } else {
        WEIGHT_POW[index] as i64 * 2
    }
}

/// Stretches 8-bit coverage so it spans the full 0..=255 range.
///
/// Masks whose range is already 0 or 255 wide are left alone.
pub fn contrast_adjust(mask: &mut Bitmap) {
    let width = mask.width() as usize;
    let mut min = u8::MAX;
    let mut max = 0u8;
    for y in 0..mask.height() {
        for &v in &mask.row(y)[..width] {
            min = min.min(v);
            max = max.max(v);
        }
    }
    let range = max.saturating_sub(min);
    if range == 0 || range == u8::MAX {
        return;
    }
    let rate = 255.0 / range as f32;
    for y in 0..mask.height() {
        for v in &mut mask.row_mut(y)[..width] {
            let stretched = (v.saturating_sub(min) as f32 * rate + 0.5) as i32;
            *v = stretched.clamp(0, 255) as u8;
        }
    }
}

/// Lookup table raising coverage to `text_gamma / 2.2`.
///
/// The default gamma of 2.2 gives the identity.
pub fn gamma_table(text_gamma: f32) -> [u8; 256] {
    let exponent = if text_gamma > 0.0 { text_gamma / 2.2 } else { 1.0 };
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let v = (i as f32 / 255.0).powf(exponent) * 255.0;
        *entry = v.round().clamp(0.0, 255.0) as u8;
    }
    table
}

pub fn apply_table(mask: &mut Bitmap, table: &[u8; 256]) {
    for y in 0..mask.height() {
        for v in mask.row_mut(y) {
            *v = table[*v as usize];
        }
    }
}

/// Widens aliased coverage to full-intensity 8-bit coverage, repeating
/// each pixel across `lanes` bytes.
pub fn expand_mono(mask: &Bitmap, lanes: u32) -> Result<Bitmap, DeviceError> {
    let mut out = Bitmap::mask(mask.width() * lanes, mask.height())?;
    for y in 0..mask.height() {
        let src = mask.row(y);
        let dst = out.row_mut(y);
        for x in 0..mask.width() as usize {
            let v = if src[x] >= 0x80 { u8::MAX } else { 0 };
            for lane in 0..lanes as usize {
                dst[x * lanes as usize + lane] = v;
            }
        }
    }
    Ok(out)
}

/// Packs 8-bit coverage into a 1 bpp mask.
pub fn pack_mono(mask: &Bitmap) -> Result<Bitmap, DeviceError> {
    let mut out = Bitmap::new(mask.width(), mask.height(), PixelFormat::Mono)?;
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            if mask.get(x, y) >= 0x80 {
                out.set_bit(x, y, true);
            }
        }
    }
    Ok(out)
}

const LCD_FIR: [u32; 5] = [8, 77, 86, 77, 8];

/// Spreads sub-pixel coverage over neighboring lanes with a 5-tap low
/// pass filter to tame color fringes.
pub fn lcd_filter(mask: &mut Bitmap) {
    let width = mask.width() as usize;
    let mut src = vec![0u8; width];
    for y in 0..mask.height() {
        src.copy_from_slice(&mask.row(y)[..width]);
        let dst = mask.row_mut(y);
        for (x, out) in dst[..width].iter_mut().enumerate() {
            let mut sum = 0;
            for (tap, weight) in LCD_FIR.iter().enumerate() {
                let sx = x as isize + tap as isize - 2;
                if sx >= 0 && (sx as usize) < width {
                    sum += src[sx as usize] as u32 * weight;
                }
            }
            *out = (sum >> 8).min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&[u8]]) -> Bitmap {
        let mut mask = Bitmap::mask(rows[0].len() as u32, rows.len() as u32).unwrap();
        for (y, row) in rows.iter().enumerate() {
            mask.row_mut(y as u32)[..row.len()].copy_from_slice(row);
        }
        mask
    }

    #[test]
    fn gamma_adjust_table_is_monotonic() {
        assert_eq!(TEXT_GAMMA_ADJUST.len(), 256);
        assert_eq!(TEXT_GAMMA_ADJUST[0], 0);
        assert_eq!(TEXT_GAMMA_ADJUST[255], 255);
        assert!(TEXT_GAMMA_ADJUST.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn skew_saturates_and_mirrors() {
        assert_eq!(skew_for_angle(0), 0);
        assert_eq!(skew_for_angle(-12), -21);
        assert_eq!(skew_for_angle(-29), -55);
        assert_eq!(skew_for_angle(-30), -58);
        assert_eq!(skew_for_angle(-90), -58);
        assert_eq!(skew_for_angle(15), 27);
        assert_eq!(skew_for_angle(45), 58);
    }

    #[test]
    fn embolden_levels() {
        assert_eq!(weight_index(400), None);
        assert_eq!(weight_index(700), Some(30));
        // 12 px em: xx = 12 * 1024 in 16.16 on the 64 px grid
        assert_eq!(bitmap_embolden_level(700, false, 12288), Some(39 * 12288 / 36655));
        assert_eq!(
            bitmap_embolden_level(700, true, 12288),
            Some(48 * 2 * 12288 / 36655)
        );
        assert_eq!(bitmap_embolden_level(1400, false, 12288), None);
        assert_eq!(bitmap_embolden_level(400, false, 12288), None);
        assert_eq!(path_embolden_level(700, false), 70);
        assert_eq!(path_embolden_level(5000, false), 106);
        assert_eq!(path_embolden_level(300, true), 0);
    }

    #[test]
    fn embolden_strength_grows_with_weight() {
        for shift_jis in [false, true] {
            let levels: Vec<i64> = (400..=900)
                .step_by(100)
                .map(|w| bitmap_embolden_level(w, shift_jis, 65536).unwrap_or(0))
                .collect();
            assert!(levels.windows(2).all(|w| w[0] < w[1]), "{levels:?}");
        }
    }

    #[test]
    fn contrast_stretches_partial_ranges() {
        let mut mask = mask_from(&[&[0, 10, 51]]);
        contrast_adjust(&mut mask);
        assert_eq!(&mask.row(0)[..3], &[0, 50, 255]);

        let mut full = mask_from(&[&[0, 60, 255]]);
        contrast_adjust(&mut full);
        assert_eq!(&full.row(0)[..3], &[0, 60, 255]);

        let mut flat = mask_from(&[&[40, 40]]);
        contrast_adjust(&mut flat);
        assert_eq!(&flat.row(0)[..2], &[40, 40]);
    }

    #[test]
    fn default_gamma_is_identity() {
        let table = gamma_table(2.2);
        assert!(table.iter().enumerate().all(|(i, &v)| v as usize == i));
        let darker = gamma_table(4.4);
        assert!(darker[128] < 128);
        assert_eq!(darker[255], 255);
    }

    #[test]
    fn mono_expansion_and_packing() {
        let mask = mask_from(&[&[255, 0], &[0, 255]]);
        let lcd = expand_mono(&mask, 3).unwrap();
        assert_eq!(lcd.width(), 6);
        assert_eq!(&lcd.row(0)[..6], &[255, 255, 255, 0, 0, 0]);
        let packed = pack_mono(&mask).unwrap();
        assert_eq!(packed.format(), PixelFormat::Mono);
        assert!(packed.get_bit(0, 0));
        assert!(!packed.get_bit(1, 0));
        assert!(packed.get_bit(1, 1));
    }

    #[test]
    fn lcd_filter_spreads_energy() {
        let mut mask = mask_from(&[&[0, 0, 255, 0, 0]]);
        lcd_filter(&mut mask);
        let row = &mask.row(0)[..5];
        assert_eq!(row, &[7, 76, 85, 76, 7]);
    }
}
