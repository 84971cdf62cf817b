use std::fmt::Display;

/// An sRGB color with an alpha channel.
///
/// Unpremultiplied by convention.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Color([u8; 4]);

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(u8::MAX, u8::MAX, u8::MAX);

    /// Creates a color from its RGBA components.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Creates a color from RGB components with 100% alpha.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, u8::MAX)
    }

    pub fn red(&self) -> u8 {
        self.0[0]
    }

    pub fn green(&self) -> u8 {
        self.0[1]
    }

    pub fn blue(&self) -> u8 {
        self.0[2]
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    /// Returns the same color with a different alpha.
    pub fn with_alpha(self, alpha: u8) -> Self {
        let [r, g, b, _] = self.0;
        Self([r, g, b, alpha])
    }

    /// Gets the color as an array of values in RGBA order.
    pub fn to_array(&self) -> [u8; 4] {
        self.0
    }

    /// Creates a color from an array of values in RGBA order.
    pub fn from_array(array: [u8; 4]) -> Self {
        Self(array)
    }

    /// Luma with the integer weights used for gray destinations.
    pub fn gray(&self) -> u8 {
        gray(self.red(), self.green(), self.blue())
    }

    /// Naive conversion used when painting an RGB color onto a CMYK target.
    pub fn to_cmyk(&self) -> Cmyk {
        let c = 255 - self.red();
        let m = 255 - self.green();
        let y = 255 - self.blue();
        let k = c.min(m).min(y);
        Cmyk::new(c - k, m - k, y - k, k)
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rgba = self.to_array();
        write!(f, "#{:02x}{:02x}{:02x}", rgba[0], rgba[1], rgba[2])?;
        if rgba[3] != u8::MAX {
            write!(f, "{:02x}", rgba[3])?;
        }
        Ok(())
    }
}

/// A CMYK color. Alpha is carried separately by [`FillColor`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cmyk([u8; 4]);

impl Cmyk {
    pub const fn new(c: u8, m: u8, y: u8, k: u8) -> Self {
        Self([c, m, y, k])
    }

    pub fn to_array(&self) -> [u8; 4] {
        self.0
    }

    pub fn to_rgb(&self) -> Color {
        let [c, m, y, k] = self.0;
        let channel = |v: u8| (255 - v as u32) * (255 - k as u32) / 255;
        Color::rgb(channel(c) as u8, channel(m) as u8, channel(y) as u8)
    }
}

/// The paint handed to fill, stroke and text operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FillColor {
    Rgb(Color),
    Cmyk { color: Cmyk, alpha: u8 },
}

impl FillColor {
    pub fn alpha(&self) -> u8 {
        match self {
            FillColor::Rgb(c) => c.alpha(),
            FillColor::Cmyk { alpha, .. } => *alpha,
        }
    }

    pub fn to_rgb(&self) -> Color {
        match self {
            FillColor::Rgb(c) => *c,
            FillColor::Cmyk { color, alpha } => color.to_rgb().with_alpha(*alpha),
        }
    }

    pub fn to_cmyk(&self) -> Cmyk {
        match self {
            FillColor::Rgb(c) => c.to_cmyk(),
            FillColor::Cmyk { color, .. } => *color,
        }
    }
}

impl From<Color> for FillColor {
    fn from(c: Color) -> Self {
        FillColor::Rgb(c)
    }
}

pub(crate) fn gray(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 30 + g as u32 * 59 + b as u32 * 11) / 100) as u8
}
