//! Font description, resolution and face storage.
//!
//! A [`FontDescriptor`] names the font a document asks for. The
//! [`FontMapper`] turns it into a concrete face held by the [`FontMgr`],
//! substituting installed or built-in faces when the requested one is not
//! available. The metadata of that choice travels with the face as a
//! [`SubstFont`], which later drives synthetic styling in the glyph cache.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::SmartString;

pub mod builtin;
pub mod cache;
pub mod charset;
pub mod enumerate;
pub mod face;
pub mod folder;
pub mod mapper;
pub mod mm;
pub mod name;
pub mod sfnt;
pub mod synth;

pub use builtin::BuiltinFonts;
pub use cache::{FaceKey, FontMgr};
pub use charset::{Charset, CharsetFlags};
pub use enumerate::{
    FontBytes, FontDbInfo, FontHandle, InstalledFonts, MapRequest, PitchFamily, SystemFontInfo,
};
pub use face::{LoadedFace, CANONICAL_PPEM};
pub use folder::FolderFontInfo;
pub use mapper::FontMapper;

pub const FW_NORMAL: i32 = 400;
pub const FW_BOLD: i32 = 700;
pub const FW_EXTRA_BOLD: i32 = 900;

bitflags! {
    /// Descriptor flags, as carried by a PDF font descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FontFlags: u32 {
        const FIXED_PITCH = 0x01;
        const SERIF = 0x02;
        const SYMBOLIC = 0x04;
        const SCRIPT = 0x08;
        const ITALIC = 0x40;
        /// Honor the descriptor's own weight and italic angle. Without it
        /// both are reset to upright regular before resolution.
        const USE_EXTERNAL_ATTRS = 0x4_0000;
    }
}

bitflags! {
    /// How a substitute face was chosen.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SubstFlags: u32 {
        const MULTI_MASTER = 0x01;
        const GLYPH_PATH = 0x04;
        const CLEARTYPE = 0x08;
        const NON_SYMBOL = 0x20;
        const EXACT = 0x40;
        const STANDARD = 0x80;
    }
}

/// A requested font.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontDescriptor {
    pub family: SmartString,
    /// 0 means unspecified.
    pub weight: i32,
    /// Degrees, negative for a right-leaning slant. 0 is upright.
    pub italic_angle: i32,
    pub flags: FontFlags,
    /// Windows code page of the font's encoding, 0 if unknown.
    pub code_page: u16,
    pub truetype: bool,
}

impl FontDescriptor {
    pub fn new(family: &str) -> Self {
        Self {
            family: family.into(),
            weight: 0,
            italic_angle: 0,
            flags: FontFlags::empty(),
            code_page: 0,
            truetype: false,
        }
    }

    pub fn weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn italic_angle(mut self, angle: i32) -> Self {
        self.italic_angle = angle;
        self
    }

    pub fn flags(mut self, flags: FontFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn code_page(mut self, code_page: u16) -> Self {
        self.code_page = code_page;
        self
    }

    pub fn truetype(mut self, truetype: bool) -> Self {
        self.truetype = truetype;
        self
    }

    /// Index into the standard 14 fonts if the family is one of them or a
    /// known alias.
    pub fn standard_index(&self) -> Option<usize> {
        let compact: String = self.family.chars().filter(|&c| c != ' ').collect();
        name::standard_font_index(&compact)
    }
}

/// Metadata describing a substitution. Fixed once the mapper returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstFont {
    pub family: SmartString,
    pub charset: Charset,
    pub flags: SubstFlags,
    pub weight: i32,
    pub italic_angle: i32,
    pub subst_of_cjk: bool,
    pub weight_cjk: i32,
    pub italic_cjk: bool,
}

impl Default for SubstFont {
    fn default() -> Self {
        Self {
            family: SmartString::new(),
            charset: Charset::ANSI,
            flags: SubstFlags::empty(),
            weight: FW_NORMAL,
            italic_angle: 0,
            subst_of_cjk: false,
            weight_cjk: 0,
            italic_cjk: false,
        }
    }
}

impl SubstFont {
    pub fn is_multi_master(&self) -> bool {
        self.flags.contains(SubstFlags::MULTI_MASTER)
    }
}

/// How closely a substitution matches the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    /// An installed face with the requested name.
    Exact,
    /// Built-in data for one of the standard 14 fonts, or for the nearest
    /// variant of its family.
    Standard,
    /// Anything else: a multiple master face or a charset fallback.
    Approximate,
}

impl Quality {
    pub fn from_flags(flags: SubstFlags) -> Self {
        if flags.contains(SubstFlags::MULTI_MASTER) {
            Quality::Approximate
        } else if flags.contains(SubstFlags::STANDARD) {
            Quality::Standard
        } else if flags.contains(SubstFlags::EXACT) {
            Quality::Exact
        } else {
            Quality::Approximate
        }
    }
}

/// Result of [`FontMapper::find_substitute`].
#[derive(Debug, Clone)]
pub struct Substitution {
    pub face: FaceKey,
    pub subst: SubstFont,
    pub quality: Quality,
    /// Built-in slot the face was loaded from, if any.
    pub builtin_slot: Option<usize>,
}

/// A face together with the styling the glyph cache must synthesize.
#[derive(Debug, Clone)]
pub struct Font {
    pub face: FaceKey,
    pub subst: Option<SubstFont>,
    pub vertical: bool,
}

impl Font {
    /// A face used as-is, typically one embedded in the document.
    pub fn embedded(face: FaceKey) -> Self {
        Self {
            face,
            subst: None,
            vertical: false,
        }
    }

    pub fn substituted(substitution: &Substitution) -> Self {
        Self {
            face: substitution.face,
            subst: Some(substitution.subst.clone()),
            vertical: false,
        }
    }

    pub fn vertical(mut self, vertical: bool) -> Self {
        self.vertical = vertical;
        self
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to parse font as TTF/OTF font data")]
pub struct MalformedFont;

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error(transparent)]
    Malformed(#[from] MalformedFont),
    #[error("failed to read font file '{path}'")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("built-in font slot {0} does not exist")]
    InvalidSlot(usize),
}
