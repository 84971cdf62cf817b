use std::sync::Arc;

use smallvec::SmallVec;
use ttf_parser::{GlyphId, Tag};

use super::{sfnt, MalformedFont};
use crate::SmartString;

/// Pixel size of the fixed grid every face is sized to. Outlines are
/// extracted on this grid before being scaled to em units.
pub const CANONICAL_PPEM: u16 = 64;

/// Design axis of a variable or multiple master face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub tag: Tag,
    pub min: f32,
    pub default: f32,
    pub max: f32,
}

/// A parsed face over shared font bytes.
///
/// `ttf_parser::Face` borrows its data, so the face is re-parsed on each
/// use through [`LoadedFace::parse`]. Parsing only reads the table
/// directory and is cheap.
#[derive(Debug, Clone)]
pub struct LoadedFace {
    data: Arc<[u8]>,
    index: u32,
    units_per_em: u16,
    glyph_count: u16,
    bold: bool,
    italic: bool,
    family: SmartString,
    axes: SmallVec<[Axis; 2]>,
}

impl LoadedFace {
    pub fn from_data(data: Arc<[u8]>, index: u32) -> Result<Self, MalformedFont> {
        let face = ttf_parser::Face::parse(&data, index).map_err(|e| {
            log::warn!("Rejected font data (face {}): {}", index, e);
            MalformedFont
        })?;
        let axes = face
            .variation_axes()
            .into_iter()
            .map(|axis| Axis {
                tag: axis.tag,
                min: axis.min_value,
                default: axis.def_value,
                max: axis.max_value,
            })
            .collect();
        let family = sfnt::face_offset(&data, index)
            .and_then(|offset| sfnt::name_string(&data, offset, 1))
            .unwrap_or_default();
        let units_per_em = face.units_per_em();
        let glyph_count = face.number_of_glyphs();
        let bold = face.is_bold();
        let italic = face.is_italic();
        drop(face);

        Ok(Self {
            data,
            index,
            units_per_em,
            glyph_count,
            bold,
            italic,
            family: family.as_str().into(),
            axes,
        })
    }

    /// Parses the face and applies `variations`.
    pub fn parse(&self, variations: &[(Tag, f32)]) -> Option<ttf_parser::Face<'_>> {
        let mut face = ttf_parser::Face::parse(&self.data, self.index).ok()?;
        for &(tag, value) in variations {
            face.set_variation(tag, value);
        }
        Some(face)
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    pub fn glyph_count(&self) -> u16 {
        self.glyph_count
    }

    pub fn is_bold(&self) -> bool {
        self.bold
    }

    pub fn is_italic(&self) -> bool {
        self.italic
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn is_variable(&self) -> bool {
        !self.axes.is_empty()
    }

    /// Whether the `gasp` table asks for bi-level rendering at `ppem`.
    pub fn prefers_mono(&self, ppem: u16) -> bool {
        sfnt::face_offset(&self.data, self.index)
            .and_then(|offset| sfnt::gasp_allows_gray(&self.data, offset, ppem))
            .map_or(false, |gray| !gray)
    }

    /// Advance of `glyph` in thousandths of an em under `variations`.
    pub fn advance_milli_em(&self, glyph: u16, variations: &[(Tag, f32)]) -> Option<i32> {
        let face = self.parse(variations)?;
        let advance = face.glyph_hor_advance(GlyphId(glyph))?;
        Some(advance as i32 * 1000 / self.units_per_em.max(1) as i32)
    }
}
