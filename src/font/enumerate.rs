//! Installed font enumeration.
//!
//! A [`SystemFontInfo`] lists the faces available on the machine and hands
//! out their bytes. The mapper records what it lists in an
//! [`InstalledFonts`] catalog, enumerated once and consulted by
//! normalized name afterwards.

use std::path::Path;

use ahash::AHashMap;
use bitflags::bitflags;

use super::{charset::charsets_from_code_pages, name::normalize_name, sfnt, Charset};
use crate::SmartString;

bitflags! {
    /// Windows pitch-and-family bits used when asking the system for a
    /// replacement face.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PitchFamily: u8 {
        const FIXED_PITCH = 0x01;
        const ROMAN = 0x10;
        const SCRIPT = 0x40;
    }
}

/// Opaque handle to a face known to a [`SystemFontInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontHandle(pub usize);

/// Raw data for a face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontBytes {
    /// A standalone font file.
    Single(Vec<u8>),
    /// A whole collection and the table directory offset of the member.
    Collection { data: Vec<u8>, member_offset: u32 },
}

/// Parameters of a [`SystemFontInfo::map_font`] query.
#[derive(Debug, Clone, Copy)]
pub struct MapRequest<'a> {
    pub weight: i32,
    pub italic: bool,
    pub charset: Charset,
    pub pitch_family: PitchFamily,
    pub family: &'a str,
    /// Whether the catalog already holds an exact match for `family`.
    pub exact: bool,
}

/// Source of installed faces.
pub trait SystemFontInfo {
    /// Registers every available face with `catalog`.
    fn enum_font_list(&mut self, catalog: &mut InstalledFonts);

    /// Best face for a request. The flag reports whether it matched the
    /// family exactly.
    fn map_font(&mut self, request: &MapRequest<'_>) -> Option<(FontHandle, bool)>;

    /// Face registered under exactly `face`.
    fn get_font(&mut self, face: &str) -> Option<FontHandle>;

    fn font_data(&mut self, font: FontHandle) -> Option<FontBytes>;

    fn face_name(&self, font: FontHandle) -> Option<SmartString>;

    fn face_index(&self, font: FontHandle) -> u32;

    fn font_charset(&self, _font: FontHandle) -> Option<Charset> {
        None
    }

    /// Called when the mapper is done with a handle.
    fn release_font(&mut self, _font: FontHandle) {}
}

/// Names of installed faces, in registration order.
#[derive(Debug, Default)]
pub struct InstalledFonts {
    /// Face names. A name starting with a space is the PostScript alias of
    /// the localized name that follows it.
    names: Vec<SmartString>,
    /// First face registered for each charset.
    charset_faces: Vec<(Charset, SmartString)>,
    last_family: Option<SmartString>,
    loaded: bool,
    enumerations: usize,
    queries: usize,
}

impl InstalledFonts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a face name for a charset. `postscript` supplies the
    /// lookup alias for names containing non-ASCII bytes.
    pub fn add_installed_font(&mut self, name: &str, charset: Charset, postscript: Option<&str>) {
        if !self.charset_faces.iter().any(|(c, _)| *c == charset) {
            self.charset_faces.push((charset, name.into()));
        }
        if self.last_family.as_deref() == Some(name) {
            return;
        }
        if !name.is_ascii() {
            if let Some(ps) = postscript.filter(|ps| !ps.is_empty()) {
                self.names.push(format!(" {}", ps).as_str().into());
            }
        }
        self.names.push(name.into());
        self.last_family = Some(name.into());
    }

    /// Runs `info`'s enumeration unless it already ran.
    pub fn ensure_loaded(&mut self, info: &mut dyn SystemFontInfo) {
        if self.loaded {
            return;
        }
        info.enum_font_list(self);
        self.loaded = true;
        self.enumerations += 1;
        log::info!("Enumerated {} installed font names", self.names.len());
    }

    /// Installed name whose normalized form equals `norm_name`. The most
    /// recently registered entry wins; a PostScript alias resolves to its
    /// localized name.
    pub fn match_installed(&mut self, norm_name: &str) -> Option<SmartString> {
        self.queries += 1;
        let i = self
            .names
            .iter()
            .rposition(|name| normalize_name(name) == norm_name)?;
        if self.names[i].starts_with(' ') {
            self.names.get(i + 1).cloned()
        } else {
            Some(self.names[i].clone())
        }
    }

    pub fn face_for_charset(&self, charset: Charset) -> Option<&str> {
        self.charset_faces
            .iter()
            .find(|(c, _)| *c == charset)
            .map(|(_, name)| name.as_str())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Times the catalog was enumerated.
    pub fn enumerations(&self) -> usize {
        self.enumerations
    }

    /// Times the catalog was searched by name.
    pub fn queries(&self) -> usize {
        self.queries
    }
}

/// Registers the face whose table directory starts at `face_offset` under
/// its display name, once for every charset its code page range covers.
pub(crate) fn register_face(
    catalog: &mut InstalledFonts,
    data: &[u8],
    face_offset: usize,
) -> Option<RegisteredFace> {
    let name = face_display_name(data, face_offset)?;
    let style = sfnt::name_string(data, face_offset, 2).unwrap_or_default();
    let postscript = sfnt::name_string(data, face_offset, 6);
    let code_pages = sfnt::os2_code_page_range(data, face_offset).unwrap_or(0);
    let mut charsets = super::CharsetFlags::empty();
    for (charset, flag) in charsets_from_code_pages(code_pages) {
        catalog.add_installed_font(&name, charset, postscript.as_deref());
        charsets |= flag;
    }
    Some(RegisteredFace {
        name: name.as_str().into(),
        bold: style.contains("Bold"),
        italic: style.contains("Italic") || style.contains("Oblique"),
        serif: name.contains("Serif"),
        charsets,
    })
}

/// Family name with the subfamily appended unless it is `Regular`.
pub(crate) fn face_display_name(data: &[u8], face_offset: usize) -> Option<String> {
    let family = sfnt::name_string(data, face_offset, 1)?;
    let style = sfnt::name_string(data, face_offset, 2).unwrap_or_default();
    if style.is_empty() || style == "Regular" {
        Some(family)
    } else {
        Some(format!("{} {}", family, style))
    }
}

/// What [`register_face`] learned about a face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegisteredFace {
    pub name: SmartString,
    pub bold: bool,
    pub italic: bool,
    pub serif: bool,
    pub charsets: super::CharsetFlags,
}

/// [`SystemFontInfo`] backed by a `fontdb` database.
pub struct FontDbInfo {
    db: fontdb::Database,
    faces: Vec<fontdb::ID>,
    by_name: AHashMap<SmartString, FontHandle>,
}

impl FontDbInfo {
    pub fn new() -> Self {
        Self {
            db: fontdb::Database::new(),
            faces: Vec::new(),
            by_name: AHashMap::new(),
        }
    }

    pub fn load_system_fonts(&mut self) {
        self.db.load_system_fonts();
    }

    pub fn load_fonts_dir(&mut self, dir: impl AsRef<Path>) {
        self.db.load_fonts_dir(dir);
    }

    pub fn load_font_data(&mut self, data: Vec<u8>) {
        self.db.load_font_data(data);
    }

    fn id(&self, font: FontHandle) -> Option<fontdb::ID> {
        self.faces.get(font.0).copied()
    }

    fn handle_of(&self, id: fontdb::ID) -> Option<FontHandle> {
        self.faces.iter().position(|&f| f == id).map(FontHandle)
    }
}

impl Default for FontDbInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemFontInfo for FontDbInfo {
    fn enum_font_list(&mut self, catalog: &mut InstalledFonts) {
        self.faces.clear();
        self.by_name.clear();
        let ids: Vec<fontdb::ID> = self.db.faces().map(|face| face.id).collect();
        for id in ids {
            let registered = self.db.with_face_data(id, |data, index| {
                let offset = sfnt::face_offset(data, index)?;
                register_face(catalog, data, offset)
            });
            if let Some(Some(face)) = registered {
                let handle = FontHandle(self.faces.len());
                self.faces.push(id);
                self.by_name.entry(face.name).or_insert(handle);
            }
        }
    }

    fn map_font(&mut self, request: &MapRequest<'_>) -> Option<(FontHandle, bool)> {
        let generic = if request.pitch_family.contains(PitchFamily::FIXED_PITCH) {
            fontdb::Family::Monospace
        } else if request.pitch_family.contains(PitchFamily::ROMAN) {
            fontdb::Family::Serif
        } else {
            fontdb::Family::SansSerif
        };
        let families = [fontdb::Family::Name(request.family), generic];
        let query = fontdb::Query {
            families: &families,
            weight: fontdb::Weight(request.weight.clamp(1, 1000) as u16),
            stretch: fontdb::Stretch::Normal,
            style: if request.italic {
                fontdb::Style::Italic
            } else {
                fontdb::Style::Normal
            },
        };
        let id = self.db.query(&query)?;
        let face = self.db.face(id)?;
        let wanted = normalize_name(request.family);
        let exact = face
            .families
            .iter()
            .any(|(family, _)| normalize_name(family) == wanted);
        self.handle_of(id).map(|handle| (handle, exact))
    }

    fn get_font(&mut self, face: &str) -> Option<FontHandle> {
        self.by_name.get(face).copied()
    }

    fn font_data(&mut self, font: FontHandle) -> Option<FontBytes> {
        let id = self.id(font)?;
        self.db.with_face_data(id, |data, index| {
            if sfnt::is_collection(data) {
                let member_offset = sfnt::face_offset(data, index)? as u32;
                Some(FontBytes::Collection {
                    data: data.to_vec(),
                    member_offset,
                })
            } else {
                Some(FontBytes::Single(data.to_vec()))
            }
        })?
    }

    fn face_name(&self, font: FontHandle) -> Option<SmartString> {
        self.by_name
            .iter()
            .find(|(_, &handle)| handle == font)
            .map(|(name, _)| name.clone())
    }

    fn face_index(&self, font: FontHandle) -> u32 {
        self.id(font)
            .and_then(|id| self.db.face(id))
            .map_or(0, |face| face.index)
    }
}
