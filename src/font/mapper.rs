//! Font substitution.
//!
//! [`FontMapper::find_substitute`] walks an ordered list of rules: standard
//! names, the installed catalog, the system's own suggestion, charset
//! fallbacks and finally the built-in multiple master faces. It never
//! fails; the last step always yields a face.

use std::sync::Arc;

use super::{
    builtin::{BuiltinFonts, SANS_MM_SLOT, SERIF_MM_SLOT, SLOT_COUNT},
    cache::collection_checksum,
    charset::cjk_fallback_families,
    name::{self, NameStyle, DINGBATS_INDEX, STANDARD_FONT_NAMES, STYLED_STANDARD_FONTS, SYMBOL_INDEX},
    Charset, FaceKey, FontBytes, FontDescriptor, FontFlags, FontMgr, InstalledFonts, MalformedFont,
    MapRequest, PitchFamily, Quality, SubstFlags, SubstFont, Substitution, SystemFontInfo, FW_BOLD,
    FW_NORMAL,
};
use crate::SmartString;

/// Italic angle given to upright faces standing in for italic ones.
const SYNTHETIC_ITALIC_ANGLE: i32 = -12;

#[derive(Debug, Clone, Copy)]
struct Request<'a> {
    name: &'a str,
    truetype: bool,
    flags: FontFlags,
    weight: i32,
    italic_angle: i32,
    code_page: u16,
}

#[derive(Debug, Clone, Copy)]
struct Resolved {
    face: FaceKey,
    slot: Option<usize>,
}

/// Built-in faces, loaded into the face cache on first use and kept for
/// the mapper's lifetime.
struct FixedFaces {
    builtin: BuiltinFonts,
    slots: [Option<FaceKey>; SLOT_COUNT],
    last_resort: FaceKey,
    last_resort_mm: FaceKey,
}

impl FixedFaces {
    fn slot_face(&mut self, mgr: &mut FontMgr, slot: usize) -> Option<FaceKey> {
        if let Some(face) = self.slots[slot].filter(|&face| mgr.is_loaded(face)) {
            return Some(face);
        }
        let data = self.builtin.data(slot)?;
        let face = mgr.load_fixed_face(Arc::clone(data), 0).ok()?;
        self.slots[slot] = Some(face);
        Some(face)
    }

    /// Face for a standard font, or the nearest variant of it that has data.
    fn standard(&mut self, mgr: &mut FontMgr, index: usize) -> Option<Resolved> {
        let slot = self.builtin.nearest_variant(index)?;
        let face = self.slot_face(mgr, slot)?;
        Some(Resolved {
            face,
            slot: Some(slot),
        })
    }

    /// Face for a symbolic standard font, falling back to the last resort.
    fn symbolic(&mut self, mgr: &mut FontMgr, slot: usize) -> Resolved {
        match self.slot_face(mgr, slot) {
            Some(face) => Resolved {
                face,
                slot: Some(slot),
            },
            None => Resolved {
                face: self.last_resort,
                slot: None,
            },
        }
    }

    /// Built-in substitution: the standard face when there is one,
    /// otherwise a multiple master face styled through `subst`.
    fn internal_subst(
        &mut self,
        mgr: &mut FontMgr,
        base: Option<usize>,
        italic_angle: i32,
        weight: i32,
        pitch: PitchFamily,
        subst: &mut SubstFont,
    ) -> Resolved {
        if let Some(resolved) = base.and_then(|index| self.standard(mgr, index)) {
            return resolved;
        }
        subst.flags |= SubstFlags::MULTI_MASTER;
        subst.italic_angle = italic_angle;
        if weight != 0 {
            subst.weight = weight;
        }
        let slot = if pitch.contains(PitchFamily::ROMAN) {
            subst.weight = subst.weight * 4 / 5;
            subst.family = "Serif MM".into();
            SERIF_MM_SLOT
        } else {
            subst.family = "Sans MM".into();
            SANS_MM_SLOT
        };
        match self.slot_face(mgr, slot) {
            Some(face) => Resolved {
                face,
                slot: Some(slot),
            },
            None => Resolved {
                face: self.last_resort_mm,
                slot: None,
            },
        }
    }
}

/// Resolves font descriptors to faces.
pub struct FontMapper {
    fixed: FixedFaces,
    info: Option<Box<dyn SystemFontInfo + Send>>,
    installed: InstalledFonts,
}

impl FontMapper {
    /// Creates a mapper without system fonts. The synthesized last-resort
    /// faces are loaded into `mgr` up front.
    pub fn new(mgr: &mut FontMgr, builtin: BuiltinFonts) -> Result<Self, MalformedFont> {
        let last_resort = mgr.load_fixed_face(BuiltinFonts::last_resort(), 0)?;
        let last_resort_mm = mgr.load_fixed_face(BuiltinFonts::last_resort_multi_master(), 0)?;
        Ok(Self {
            fixed: FixedFaces {
                builtin,
                slots: [None; SLOT_COUNT],
                last_resort,
                last_resort_mm,
            },
            info: None,
            installed: InstalledFonts::new(),
        })
    }

    /// Sets the source of installed fonts. The catalog is enumerated again
    /// on the next lookup.
    pub fn set_system_font_info(&mut self, info: Box<dyn SystemFontInfo + Send>) {
        self.info = Some(info);
        self.installed = InstalledFonts::new();
    }

    pub fn has_system_font_info(&self) -> bool {
        self.info.is_some()
    }

    pub fn builtin(&self) -> &BuiltinFonts {
        &self.fixed.builtin
    }

    pub fn installed(&self) -> &InstalledFonts {
        &self.installed
    }

    /// Picks the face to render `desc` with.
    pub fn find_substitute(&mut self, mgr: &mut FontMgr, desc: &FontDescriptor) -> Substitution {
        let mut subst = SubstFont::default();
        let request = Request {
            name: &desc.family,
            truetype: desc.truetype,
            flags: desc.flags,
            weight: desc.weight,
            italic_angle: desc.italic_angle,
            code_page: desc.code_page,
        };
        let resolved = self.find(mgr, request, &mut subst);
        let quality = Quality::from_flags(subst.flags);
        log::debug!(
            "Substituted '{}' with '{}' ({:?}, flags {:?})",
            desc.family,
            subst.family,
            quality,
            subst.flags
        );
        Substitution {
            face: resolved.face,
            subst,
            quality,
            builtin_slot: resolved.slot,
        }
    }

    fn find(&mut self, mgr: &mut FontMgr, req: Request<'_>, subst: &mut SubstFont) -> Resolved {
        let (weight, mut italic_angle) = if req.flags.contains(FontFlags::USE_EXTERNAL_ATTRS) {
            (req.weight, req.italic_angle)
        } else {
            (FW_NORMAL, 0)
        };

        let mut subst_name: String = req.name.chars().filter(|&c| c != ' ').collect();
        if req.truetype {
            if let Some(stripped) = subst_name.strip_prefix('@') {
                subst_name = stripped.to_owned();
            }
        }
        if let Some((_, canonical)) = name::canonical_standard_name(&subst_name) {
            subst_name = canonical.to_owned();
        }
        if subst_name == STANDARD_FONT_NAMES[SYMBOL_INDEX] && !req.truetype {
            return self.symbolic(mgr, SYMBOL_INDEX, "Standard Symbol", subst);
        }
        if subst_name == STANDARD_FONT_NAMES[DINGBATS_INDEX] {
            return self.symbolic(mgr, DINGBATS_INDEX, "Standard Dingbats", subst);
        }

        let parsed = name::parse_font_name(&subst_name);
        let mut family = parsed.family.clone();
        let style = parsed.style;
        let base = parsed.standard;
        let mut pitch = PitchFamily::empty();
        match base {
            Some(index) => {
                if index < 4 {
                    pitch |= PitchFamily::FIXED_PITCH;
                }
                if index >= 8 {
                    pitch |= PitchFamily::ROMAN;
                }
            }
            None => {
                pitch.set(PitchFamily::ROMAN, req.flags.contains(FontFlags::SERIF));
                pitch.set(PitchFamily::SCRIPT, req.flags.contains(FontFlags::SCRIPT));
                pitch.set(PitchFamily::FIXED_PITCH, req.flags.contains(FontFlags::FIXED_PITCH));
            }
        }

        let mut weight = if weight == 0 { FW_NORMAL } else { weight };
        let old_weight = weight;
        if !style.is_empty() {
            weight = style.weight();
        }
        let mut italic = style.contains(NameStyle::ITALIC);

        let charset = if req.code_page != 0 {
            Charset::from_code_page(req.code_page)
        } else if base.is_none() && req.flags.contains(FontFlags::SYMBOLIC) {
            Charset::SYMBOL
        } else {
            Charset::ANSI
        };
        let cjk = charset.is_cjk();

        if let Some(index) = base {
            let index = styled_standard_index(index, style);
            if let Some(resolved) = self.fixed.standard(mgr, index) {
                return standard_face(resolved, style, subst);
            }
            family = STANDARD_FONT_NAMES[index].into();
        }

        let Some(info) = self.info.as_deref_mut() else {
            subst.flags |= SubstFlags::STANDARD;
            return self.fixed.internal_subst(mgr, base, italic_angle, old_weight, pitch, subst);
        };
        self.installed.ensure_loaded(&mut *info);

        family = name::alt_family(&family, style);
        let mut matched = self.installed.match_installed(&name::normalize_name(&family));
        if matched.is_none()
            && family.as_str() != subst_name
            && !parsed.has_comma
            && (!parsed.has_hyphen || !parsed.style_recognized)
        {
            matched = self.installed.match_installed(&name::normalize_name(&subst_name));
        }

        if matched.is_none() && base.is_none() {
            if !cjk {
                let mut serif = pitch.contains(PitchFamily::ROMAN);
                if name::third_party_adjust(&family, &mut serif) {
                    pitch.set(PitchFamily::ROMAN, serif);
                } else {
                    italic = italic_angle != 0;
                    weight = old_weight;
                }
            } else {
                subst.subst_of_cjk = true;
                subst.weight_cjk = if style.is_empty() { FW_NORMAL } else { weight };
                subst.italic_cjk = style.contains(NameStyle::ITALIC);
            }
        } else {
            italic_angle = 0;
            weight = style.weight();
        }

        if matched.is_some() || base.is_some() {
            subst.flags |= SubstFlags::EXACT;
            if let Some(matched) = &matched {
                family = matched.clone();
            }
            if base.is_some() {
                subst.flags |= SubstFlags::STANDARD;
            }
        } else if req.flags.contains(FontFlags::ITALIC) {
            italic = true;
        }

        let mapped = info.map_font(&MapRequest {
            weight,
            italic,
            charset,
            pitch_family: pitch,
            family: &family,
            exact: matched.is_some(),
        });
        if let Some((_, true)) = mapped {
            subst.flags |= SubstFlags::EXACT;
        }

        let handle = match mapped {
            Some((handle, _)) => handle,
            None => {
                if cjk {
                    italic = italic_angle != 0;
                    weight = old_weight;
                }
                let fallback = if let Some(matched) = &matched {
                    info.get_font(matched)
                } else if charset == Charset::SYMBOL {
                    subst.flags |= SubstFlags::NON_SYMBOL;
                    log::debug!("No symbolic face for '{}', retrying as non-symbolic", family);
                    let retry = Request {
                        name: &family,
                        truetype: req.truetype,
                        flags: req.flags - FontFlags::SYMBOLIC,
                        weight,
                        italic_angle,
                        code_page: 0,
                    };
                    return self.find(mgr, retry, subst);
                } else if charset == Charset::ANSI {
                    subst.flags |= SubstFlags::STANDARD;
                    None
                } else {
                    charset_fallback(info, &mut self.installed, charset)
                };
                match fallback {
                    Some(handle) => handle,
                    None => {
                        return self.fixed.internal_subst(
                            mgr,
                            base,
                            italic_angle,
                            old_weight,
                            pitch,
                            subst,
                        )
                    }
                }
            }
        };

        let face_name = info.face_name(handle).unwrap_or_else(|| family.clone());
        let charset = if charset == Charset::DEFAULT {
            info.font_charset(handle).unwrap_or(charset)
        } else {
            charset
        };
        let face = match info.font_data(handle) {
            Some(FontBytes::Single(data)) => {
                let index = info.face_index(handle);
                mgr.get_or_load_single_face(&face_name, weight, italic, data, index)
            }
            Some(FontBytes::Collection {
                data,
                member_offset,
            }) => {
                let checksum = collection_checksum(&data);
                let size = data.len();
                mgr.get_or_load_collection_face(data, checksum, size, member_offset)
            }
            None => None,
        };
        info.release_font(handle);
        let Some(face) = face else {
            log::debug!("Could not load '{}', using a built-in face", face_name);
            return self.fixed.internal_subst(mgr, base, italic_angle, old_weight, pitch, subst);
        };

        subst.family = face_name;
        subst.charset = charset;
        let (face_bold, face_italic) = mgr
            .face(face)
            .map_or((false, false), |face| (face.is_bold(), face.is_italic()));
        let natural_weight = if face_bold { FW_BOLD } else { FW_NORMAL };
        if weight != natural_weight {
            subst.weight = weight;
        }
        if italic && !face_italic {
            subst.italic_angle = synthetic_italic_angle(italic_angle);
        }
        Resolved { face, slot: None }
    }

    fn symbolic(
        &mut self,
        mgr: &mut FontMgr,
        slot: usize,
        family: &str,
        subst: &mut SubstFont,
    ) -> Resolved {
        subst.family = family.into();
        subst.charset = Charset::SYMBOL;
        subst.flags |= SubstFlags::STANDARD;
        self.fixed.symbolic(mgr, slot)
    }
}

/// Moves a regular standard index to the variant `style` asks for.
fn styled_standard_index(index: usize, style: NameStyle) -> usize {
    if index >= STYLED_STANDARD_FONTS || index % 4 != 0 {
        return index;
    }
    match (style.contains(NameStyle::BOLD), style.contains(NameStyle::ITALIC)) {
        (true, false) => index + 1,
        (false, true) => index + 3,
        (true, true) => index + 2,
        (false, false) => index,
    }
}

/// Fills `subst` for a built-in standard face, recording whatever style
/// the chosen variant lacks.
fn standard_face(resolved: Resolved, style: NameStyle, subst: &mut SubstFont) -> Resolved {
    subst.flags |= SubstFlags::EXACT | SubstFlags::STANDARD;
    if let Some(slot) = resolved.slot {
        subst.family = STANDARD_FONT_NAMES[slot].into();
        let available = NameStyle::of_standard(slot);
        if style.contains(NameStyle::BOLD) && !available.contains(NameStyle::BOLD) {
            subst.weight = style.weight();
        }
        if style.contains(NameStyle::ITALIC) && !available.contains(NameStyle::ITALIC) {
            subst.italic_angle = SYNTHETIC_ITALIC_ANGLE;
        }
    }
    resolved
}

/// First installed face for a charset, preferring the well-known CJK
/// families.
fn charset_fallback(
    info: &mut (dyn SystemFontInfo + Send),
    installed: &mut InstalledFonts,
    charset: Charset,
) -> Option<super::FontHandle> {
    let preferred = cjk_fallback_families(charset)
        .iter()
        .find_map(|family| installed.match_installed(&name::normalize_name(family)));
    let face: SmartString = match preferred {
        Some(face) => face,
        None => installed.face_for_charset(charset)?.into(),
    };
    info.get_font(&face)
}

fn synthetic_italic_angle(requested: i32) -> i32 {
    if requested == 0 {
        SYNTHETIC_ITALIC_ANGLE
    } else if requested.abs() < 5 {
        0
    } else {
        requested
    }
}
