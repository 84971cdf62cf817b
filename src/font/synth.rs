//! Builds small but well-formed TrueType fonts in memory.
//!
//! Used for the last-resort face when no built-in font data is configured,
//! and as fixtures throughout the test suite.
//!
//! Glyph set, in a 1000-unit em:
//! * 0: a hollow box (`.notdef`)
//! * 1: a solid block from (100, 0) to (600, 700)
//! * 2: a bowl drawn with quadratic curves
//! * 3: an empty glyph

use smallvec::SmallVec;

pub const UNITS_PER_EM: u16 = 1000;
pub const GLYPH_BOX: u16 = 0;
pub const GLYPH_BLOCK: u16 = 1;
pub const GLYPH_BOWL: u16 = 2;
pub const GLYPH_SPACE: u16 = 3;

const ADVANCES: [u16; 4] = [600, 700, 700, 300];

/// A variation axis: tag, min, default, max.
pub type SynthAxis = ([u8; 4], f32, f32, f32);

#[derive(Debug, Clone)]
pub struct SynthFont {
    family: String,
    style: String,
    postscript: Option<String>,
    code_pages: u32,
    weight: u16,
    italic: bool,
    gasp: SmallVec<[(u16, u16); 4]>,
    axes: SmallVec<[SynthAxis; 2]>,
}

impl SynthFont {
    /// A face with the given family and subfamily names. Bold and italic
    /// bits follow the subfamily.
    pub fn new(family: &str, style: &str) -> Self {
        let bold = style.contains("Bold");
        Self {
            family: family.to_owned(),
            style: style.to_owned(),
            postscript: None,
            code_pages: 1,
            weight: if bold { 700 } else { 400 },
            italic: style.contains("Italic") || style.contains("Oblique"),
            gasp: SmallVec::new(),
            axes: SmallVec::new(),
        }
    }

    pub fn postscript_name(mut self, name: &str) -> Self {
        self.postscript = Some(name.to_owned());
        self
    }

    /// `ulCodePageRange1` of the OS/2 table.
    pub fn code_pages(mut self, bits: u32) -> Self {
        self.code_pages = bits;
        self
    }

    pub fn gasp(mut self, ranges: &[(u16, u16)]) -> Self {
        self.gasp = ranges.iter().copied().collect();
        self
    }

    /// Adds an `fvar` axis, making the face variable.
    pub fn axis(mut self, axis: SynthAxis) -> Self {
        self.axes.push(axis);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let (glyf, loca) = glyf_and_loca();
        let mut tables: Vec<([u8; 4], Vec<u8>)> = vec![
            (*b"head", self.head()),
            (*b"hhea", hhea()),
            (*b"maxp", maxp()),
            (*b"hmtx", hmtx()),
            (*b"loca", loca),
            (*b"glyf", glyf),
            (*b"name", self.name()),
            (*b"OS/2", self.os2()),
        ];
        if !self.gasp.is_empty() {
            tables.push((*b"gasp", self.gasp_table()));
        }
        if !self.axes.is_empty() {
            tables.push((*b"fvar", self.fvar()));
        }
        tables.sort_by(|a, b| a.0.cmp(&b.0));
        assemble(&tables)
    }

    fn head(&self) -> Vec<u8> {
        let mut t = Vec::with_capacity(54);
        put32(&mut t, 0x0001_0000);
        put32(&mut t, 0x0001_0000);
        put32(&mut t, 0);
        put32(&mut t, 0x5F0F_3CF5);
        put16(&mut t, 0);
        put16(&mut t, UNITS_PER_EM);
        t.extend_from_slice(&[0; 16]);
        for v in [0i16, -200, 700, 800] {
            put16(&mut t, v as u16);
        }
        let mac_style = u16::from(self.weight >= 700) | (u16::from(self.italic) << 1);
        put16(&mut t, mac_style);
        put16(&mut t, 8);
        put16(&mut t, 2);
        put16(&mut t, 1);
        put16(&mut t, 0);
        t
    }

    fn name(&self) -> Vec<u8> {
        let full = if self.style == "Regular" {
            self.family.clone()
        } else {
            format!("{} {}", self.family, self.style)
        };
        let postscript = self
            .postscript
            .clone()
            .unwrap_or_else(|| full.replace(' ', "-"));
        let names = [
            (1u16, self.family.as_str()),
            (2, self.style.as_str()),
            (4, full.as_str()),
            (6, postscript.as_str()),
        ];

        // (platform, encoding, language, id, bytes)
        let mut records: Vec<(u16, u16, u16, u16, Vec<u8>)> = Vec::new();
        for &(id, text) in &names {
            if text.is_ascii() {
                records.push((1, 0, 0, id, text.as_bytes().to_vec()));
            }
        }
        for &(id, text) in &names {
            let utf16 = text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
            records.push((3, 1, 0x409, id, utf16));
        }

        let mut t = Vec::new();
        put16(&mut t, 0);
        put16(&mut t, records.len() as u16);
        put16(&mut t, (6 + records.len() * 12) as u16);
        let mut storage = Vec::new();
        for (platform, encoding, language, id, bytes) in &records {
            for v in [*platform, *encoding, *language, *id, bytes.len() as u16, storage.len() as u16] {
                put16(&mut t, v);
            }
            storage.extend_from_slice(bytes);
        }
        t.extend_from_slice(&storage);
        t
    }

    fn os2(&self) -> Vec<u8> {
        let mut t = Vec::with_capacity(86);
        put16(&mut t, 1);
        put16(&mut t, 500);
        put16(&mut t, self.weight);
        put16(&mut t, 5);
        put16(&mut t, 0);
        t.extend_from_slice(&[0; 16]);
        put16(&mut t, 50);
        put16(&mut t, 250);
        put16(&mut t, 0);
        t.extend_from_slice(&[0; 10]);
        t.extend_from_slice(&[0; 16]);
        t.extend_from_slice(b"STRK");
        let mut selection = 0u16;
        if self.italic {
            selection |= 1;
        }
        if self.weight >= 700 {
            selection |= 1 << 5;
        }
        if selection == 0 {
            selection = 1 << 6;
        }
        put16(&mut t, selection);
        put16(&mut t, 0x20);
        put16(&mut t, 0x7E);
        put16(&mut t, 800);
        put16(&mut t, (-200i16) as u16);
        put16(&mut t, 0);
        put16(&mut t, 800);
        put16(&mut t, 200);
        put32(&mut t, self.code_pages);
        put32(&mut t, 0);
        debug_assert_eq!(t.len(), 86);
        t
    }

    fn gasp_table(&self) -> Vec<u8> {
        let mut t = Vec::new();
        put16(&mut t, 1);
        put16(&mut t, self.gasp.len() as u16);
        for &(max_ppem, behavior) in &self.gasp {
            put16(&mut t, max_ppem);
            put16(&mut t, behavior);
        }
        t
    }

    fn fvar(&self) -> Vec<u8> {
        let fixed = |v: f32| (v * 65536.0) as i32 as u32;
        let mut t = Vec::new();
        put16(&mut t, 1);
        put16(&mut t, 0);
        put16(&mut t, 16);
        put16(&mut t, 2);
        put16(&mut t, self.axes.len() as u16);
        put16(&mut t, 20);
        put16(&mut t, 0);
        put16(&mut t, (self.axes.len() * 4 + 4) as u16);
        for (i, (tag, min, default, max)) in self.axes.iter().enumerate() {
            t.extend_from_slice(tag);
            put32(&mut t, fixed(*min));
            put32(&mut t, fixed(*default));
            put32(&mut t, fixed(*max));
            put16(&mut t, 0);
            put16(&mut t, 256 + i as u16);
        }
        t
    }
}

fn put16(t: &mut Vec<u8>, v: u16) {
    t.extend_from_slice(&v.to_be_bytes());
}

fn put32(t: &mut Vec<u8>, v: u32) {
    t.extend_from_slice(&v.to_be_bytes());
}

fn pad4(t: &mut Vec<u8>) {
    while t.len() % 4 != 0 {
        t.push(0);
    }
}

fn hhea() -> Vec<u8> {
    let mut t = Vec::with_capacity(36);
    put32(&mut t, 0x0001_0000);
    put16(&mut t, 800);
    put16(&mut t, (-200i16) as u16);
    put16(&mut t, 0);
    put16(&mut t, 700);
    t.extend_from_slice(&[0; 6]);
    put16(&mut t, 1);
    t.extend_from_slice(&[0; 12]);
    put16(&mut t, 0);
    put16(&mut t, ADVANCES.len() as u16);
    debug_assert_eq!(t.len(), 36);
    t
}

fn maxp() -> Vec<u8> {
    let mut t = Vec::with_capacity(32);
    put32(&mut t, 0x0001_0000);
    put16(&mut t, ADVANCES.len() as u16);
    put16(&mut t, 16);
    put16(&mut t, 2);
    t.extend_from_slice(&[0; 22]);
    t
}

fn hmtx() -> Vec<u8> {
    let mut t = Vec::new();
    for advance in ADVANCES {
        put16(&mut t, advance);
        put16(&mut t, 100);
    }
    t
}

/// One contour point: x, y, on-curve.
type Point = (i16, i16, bool);

fn simple_glyph(contours: &[&[Point]]) -> Vec<u8> {
    let points = contours.iter().flat_map(|c| c.iter());
    let (mut x_min, mut y_min, mut x_max, mut y_max) = (i16::MAX, i16::MAX, i16::MIN, i16::MIN);
    for &(x, y, _) in points.clone() {
        x_min = x_min.min(x);
        y_min = y_min.min(y);
        x_max = x_max.max(x);
        y_max = y_max.max(y);
    }

    let mut t = Vec::new();
    put16(&mut t, contours.len() as u16);
    for v in [x_min, y_min, x_max, y_max] {
        put16(&mut t, v as u16);
    }
    let mut end = 0usize;
    for contour in contours {
        end += contour.len();
        put16(&mut t, (end - 1) as u16);
    }
    put16(&mut t, 0);
    for &(_, _, on) in points.clone() {
        t.push(u8::from(on));
    }
    let mut last = 0i16;
    for &(x, _, _) in points.clone() {
        put16(&mut t, (x - last) as u16);
        last = x;
    }
    last = 0;
    for &(_, y, _) in points {
        put16(&mut t, (y - last) as u16);
        last = y;
    }
    if t.len() % 2 != 0 {
        t.push(0);
    }
    t
}

fn glyf_and_loca() -> (Vec<u8>, Vec<u8>) {
    let hollow_outer: [Point; 4] = [(50, 0, true), (50, 700, true), (550, 700, true), (550, 0, true)];
    let hollow_inner: [Point; 4] = [(100, 50, true), (500, 50, true), (500, 650, true), (100, 650, true)];
    let block: [Point; 4] = [(100, 0, true), (100, 700, true), (600, 700, true), (600, 0, true)];
    let bowl: [Point; 5] = [
        (100, 0, true),
        (100, 700, false),
        (350, 700, true),
        (600, 700, false),
        (600, 0, true),
    ];
    let glyphs = [
        simple_glyph(&[&hollow_outer, &hollow_inner]),
        simple_glyph(&[&block]),
        simple_glyph(&[&bowl]),
        Vec::new(),
    ];

    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    for glyph in &glyphs {
        put32(&mut loca, glyf.len() as u32);
        glyf.extend_from_slice(glyph);
    }
    put32(&mut loca, glyf.len() as u32);
    (glyf, loca)
}

fn assemble(tables: &[([u8; 4], Vec<u8>)]) -> Vec<u8> {
    let count = tables.len() as u16;
    let mut power = 1u16;
    let mut selector = 0u16;
    while power * 2 <= count {
        power *= 2;
        selector += 1;
    }
    let mut out = Vec::new();
    put32(&mut out, 0x0001_0000);
    put16(&mut out, count);
    put16(&mut out, power * 16);
    put16(&mut out, selector);
    put16(&mut out, count * 16 - power * 16);

    let mut offset = 12 + tables.len() * 16;
    for (tag, data) in tables {
        out.extend_from_slice(tag);
        put32(&mut out, 0);
        put32(&mut out, offset as u32);
        put32(&mut out, data.len() as u32);
        offset += (data.len() + 3) & !3;
    }
    for (_, data) in tables {
        out.extend_from_slice(data);
        pad4(&mut out);
    }
    out
}

fn read16(data: &[u8], offset: usize) -> usize {
    super::sfnt::be_u16(data, offset).map_or(0, usize::from)
}

fn read32(data: &[u8], offset: usize) -> usize {
    super::sfnt::be_u32(data, offset).map_or(0, |v| v as usize)
}

/// Packs standalone fonts into one TrueType collection.
pub fn build_collection(fonts: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"ttcf");
    put32(&mut out, 0x0001_0000);
    put32(&mut out, fonts.len() as u32);
    let offsets_at = out.len();
    out.resize(offsets_at + fonts.len() * 4, 0);

    for (i, font) in fonts.iter().enumerate() {
        let directory = out.len();
        out[offsets_at + i * 4..offsets_at + i * 4 + 4].copy_from_slice(&(directory as u32).to_be_bytes());
        let count = read16(font, 4);
        let header_len = (12 + count * 16).min(font.len());
        out.extend_from_slice(&font[..header_len]);
        for t in 0..count {
            let record = 12 + t * 16;
            let offset = read32(font, record + 8);
            let length = read32(font, record + 12);
            let Some(table) = font.get(offset..offset + length) else {
                continue;
            };
            pad4(&mut out);
            let relocated = out.len() as u32;
            out[directory + record + 8..directory + record + 12].copy_from_slice(&relocated.to_be_bytes());
            out.extend_from_slice(table);
        }
        pad4(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use ttf_parser::{Face, GlyphId};

    use super::*;

    #[test]
    fn parses_with_ttf_parser() {
        let data = SynthFont::new("Synth Sans", "Bold Italic").build();
        let face = Face::parse(&data, 0).unwrap();
        assert_eq!(face.units_per_em(), UNITS_PER_EM);
        assert_eq!(face.number_of_glyphs(), 4);
        assert!(face.is_bold());
        assert!(face.is_italic());
        assert_eq!(face.glyph_hor_advance(GlyphId(GLYPH_BLOCK)), Some(700));
        let bbox = face.glyph_bounding_box(GlyphId(GLYPH_BLOCK)).unwrap();
        assert_eq!((bbox.x_min, bbox.y_max), (100, 700));
    }

    #[test]
    fn collections_parse_per_member() {
        let ttc = build_collection(&[
            SynthFont::new("One", "Regular").build(),
            SynthFont::new("Two", "Bold").build(),
        ]);
        assert_eq!(ttf_parser::fonts_in_collection(&ttc), Some(2));
        let second = Face::parse(&ttc, 1).unwrap();
        assert!(second.is_bold());
    }

    #[test]
    fn variable_faces_expose_axes() {
        let data = SynthFont::new("Synth MM", "Regular")
            .axis((*b"wght", 100.0, 400.0, 900.0))
            .axis((*b"wdth", 50.0, 100.0, 200.0))
            .build();
        let face = Face::parse(&data, 0).unwrap();
        let axes: Vec<_> = face.variation_axes().into_iter().collect();
        assert_eq!(axes.len(), 2);
        assert_eq!(axes[1].max_value, 200.0);
    }
}
