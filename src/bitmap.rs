use crate::{device::DeviceError, geom::IntRect};

/// Pixel layout of a [`Bitmap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// One bit per pixel, most significant bit first. A set bit is white.
    Mono,
    /// One byte of luminance or coverage per pixel.
    Gray,
    /// Three bytes in R, G, B order.
    Rgb,
    /// Four bytes in R, G, B, A order. Alpha is unpremultiplied.
    Rgba,
    /// Four bytes in C, M, Y, K order.
    Cmyk,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono => 0,
            PixelFormat::Gray => 1,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba | PixelFormat::Cmyk => 4,
        }
    }

    /// Row length in bytes for `width` pixels.
    pub fn stride_for(self, width: u32) -> usize {
        match self {
            PixelFormat::Mono => (width as usize + 7) / 8,
            _ => width as usize * self.bytes_per_pixel(),
        }
    }
}

/// An owned pixel buffer described by width, height, stride and format.
///
/// Gray, Rgb and Cmyk bitmaps may carry a separate alpha plane, one byte
/// per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// Largest accepted dimension. Keeps `width * bytes_per_pixel` within `i32`.
const MAX_DIMENSION: u32 = 1 << 16;

impl Bitmap {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, DeviceError> {
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(DeviceError::TooLarge { width, height });
        }
        let stride = format.stride_for(width);
        Ok(Self {
            width,
            height,
            stride,
            format,
            data: vec![0; stride * height as usize],
            alpha: None,
        })
    }

    /// Creates an 8-bit coverage mask.
    pub fn mask(width: u32, height: u32) -> Result<Self, DeviceError> {
        Self::new(width, height, PixelFormat::Gray)
    }

    /// Adds a zeroed alpha plane. Ignored for formats with inline alpha.
    pub fn with_alpha_plane(mut self) -> Self {
        if matches!(
            self.format,
            PixelFormat::Gray | PixelFormat::Rgb | PixelFormat::Cmyk
        ) {
            self.alpha = Some(vec![0; self.width as usize * self.height as usize]);
        }
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn has_alpha_plane(&self) -> bool {
        self.alpha.is_some()
    }

    pub fn bounds(&self) -> IntRect {
        IntRect::from_size(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    pub fn fill_alpha(&mut self, value: u8) {
        if let Some(alpha) = &mut self.alpha {
            alpha.fill(value);
        }
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.data[start..start + self.stride]
    }

    pub fn alpha_row(&self, y: u32) -> Option<&[u8]> {
        let width = self.width as usize;
        self.alpha
            .as_ref()
            .map(|a| &a[y as usize * width..(y as usize + 1) * width])
    }

    /// Borrows a row together with its alpha plane row.
    pub fn rows_mut(&mut self, y: u32) -> (&mut [u8], Option<&mut [u8]>) {
        let start = y as usize * self.stride;
        let width = self.width as usize;
        let row = &mut self.data[start..start + self.stride];
        let alpha = self
            .alpha
            .as_mut()
            .map(|a| &mut a[y as usize * width..(y as usize + 1) * width]);
        (row, alpha)
    }

    /// Views a row of a four-byte format as pixels.
    pub fn pixels_row(&self, y: u32) -> &[[u8; 4]] {
        let width = self.width as usize;
        debug_assert_eq!(self.format.bytes_per_pixel(), 4);
        bytemuck::cast_slice(&self.row(y)[..width * 4])
    }

    pub fn pixels_row_mut(&mut self, y: u32) -> &mut [[u8; 4]] {
        let width = self.width as usize;
        debug_assert_eq!(self.format.bytes_per_pixel(), 4);
        bytemuck::cast_slice_mut(&mut self.row_mut(y)[..width * 4])
    }

    /// Byte value at `(x, y)` of a Gray bitmap.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.row(y)[x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        self.row_mut(y)[x as usize] = value;
    }

    pub fn get_bit(&self, x: u32, y: u32) -> bool {
        self.row(y)[x as usize / 8] & (0x80 >> (x % 8)) != 0
    }

    pub fn set_bit(&mut self, x: u32, y: u32, on: bool) {
        let byte = &mut self.row_mut(y)[x as usize / 8];
        let bit = 0x80 >> (x % 8);
        if on {
            *byte |= bit;
        } else {
            *byte &= !bit;
        }
    }

    /// Reads one pixel as RGBA regardless of format.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let row = self.row(y);
        let x = x as usize;
        let alpha = self.alpha_row(y).map(|a| a[x]).unwrap_or(u8::MAX);
        match self.format {
            PixelFormat::Mono => {
                let v = if self.get_bit(x as u32, y) { 255 } else { 0 };
                [v, v, v, 255]
            }
            PixelFormat::Gray => [row[x], row[x], row[x], alpha],
            PixelFormat::Rgb => [row[x * 3], row[x * 3 + 1], row[x * 3 + 2], alpha],
            PixelFormat::Rgba => self.pixels_row(y)[x],
            PixelFormat::Cmyk => {
                let [c, m, yy, k] = self.pixels_row(y)[x];
                let rgb = crate::color::Cmyk::new(c, m, yy, k).to_rgb();
                [rgb.red(), rgb.green(), rgb.blue(), alpha]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_rows_are_byte_padded() {
        let mut bitmap = Bitmap::new(10, 2, PixelFormat::Mono).unwrap();
        assert_eq!(bitmap.stride(), 2);
        bitmap.set_bit(9, 1, true);
        assert!(bitmap.get_bit(9, 1));
        assert_eq!(bitmap.row(1), &[0, 0x40]);
        bitmap.set_bit(9, 1, false);
        assert!(!bitmap.get_bit(9, 1));
    }

    #[test]
    fn rgba_pixel_views() {
        let mut bitmap = Bitmap::new(3, 1, PixelFormat::Rgba).unwrap();
        bitmap.pixels_row_mut(0)[1] = [1, 2, 3, 4];
        assert_eq!(&bitmap.row(0)[4..8], &[1, 2, 3, 4]);
        assert_eq!(bitmap.pixel(1, 0), [1, 2, 3, 4]);
    }

    #[test]
    fn alpha_plane_only_for_formats_without_inline_alpha() {
        let rgb = Bitmap::new(2, 2, PixelFormat::Rgb).unwrap().with_alpha_plane();
        assert!(rgb.has_alpha_plane());
        let rgba = Bitmap::new(2, 2, PixelFormat::Rgba).unwrap().with_alpha_plane();
        assert!(!rgba.has_alpha_plane());
    }

    #[test]
    fn oversized_bitmaps_are_rejected() {
        assert!(matches!(
            Bitmap::new(u32::MAX, 1, PixelFormat::Gray),
            Err(DeviceError::TooLarge { .. })
        ));
    }
}
