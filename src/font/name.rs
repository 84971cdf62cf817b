//! Font name rules: normalization, the standard 14 table and its aliases,
//! and splitting a PDF font name into family and style.
//!
//! Each function here is one step of substitution and is pure.

use std::cmp::Ordering;

use crate::SmartString;

pub const STANDARD_FONT_NAMES: [&str; 14] = [
    "Courier",
    "Courier-Bold",
    "Courier-BoldOblique",
    "Courier-Oblique",
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-BoldOblique",
    "Helvetica-Oblique",
    "Times-Roman",
    "Times-Bold",
    "Times-BoldItalic",
    "Times-Italic",
    "Symbol",
    "ZapfDingbats",
];

/// Number of standard fonts that come in four style variants.
pub const STYLED_STANDARD_FONTS: usize = 12;
pub const SYMBOL_INDEX: usize = 12;
pub const DINGBATS_INDEX: usize = 13;

/// Alias → standard index, sorted case-insensitively.
const ALIASES: [(&str, u8); 90] = [
    ("Arial", 4),
    ("Arial,Bold", 5),
    ("Arial,BoldItalic", 6),
    ("Arial,Italic", 7),
    ("Arial-Bold", 5),
    ("Arial-BoldItalic", 6),
    ("Arial-BoldItalicMT", 6),
    ("Arial-BoldMT", 5),
    ("Arial-Italic", 7),
    ("Arial-ItalicMT", 7),
    ("ArialBold", 5),
    ("ArialBoldItalic", 6),
    ("ArialItalic", 7),
    ("ArialMT", 4),
    ("ArialMT,Bold", 5),
    ("ArialMT,BoldItalic", 6),
    ("ArialMT,Italic", 7),
    ("ArialRoundedMTBold", 5),
    ("Courier", 0),
    ("Courier,Bold", 1),
    ("Courier,BoldItalic", 2),
    ("Courier,Italic", 3),
    ("Courier-Bold", 1),
    ("Courier-BoldOblique", 2),
    ("Courier-Oblique", 3),
    ("CourierBold", 1),
    ("CourierBoldItalic", 2),
    ("CourierItalic", 3),
    ("CourierNew", 0),
    ("CourierNew,Bold", 1),
    ("CourierNew,BoldItalic", 2),
    ("CourierNew,Italic", 3),
    ("CourierNew-Bold", 1),
    ("CourierNew-BoldItalic", 2),
    ("CourierNew-Italic", 3),
    ("CourierNewBold", 1),
    ("CourierNewBoldItalic", 2),
    ("CourierNewItalic", 3),
    ("CourierNewPS-BoldItalicMT", 2),
    ("CourierNewPS-BoldMT", 1),
    ("CourierNewPS-ItalicMT", 3),
    ("CourierNewPSMT", 0),
    ("CourierStd", 0),
    ("CourierStd-Bold", 1),
    ("CourierStd-BoldOblique", 2),
    ("CourierStd-Oblique", 3),
    ("Helvetica", 4),
    ("Helvetica,Bold", 5),
    ("Helvetica,BoldItalic", 6),
    ("Helvetica,Italic", 7),
    ("Helvetica-Bold", 5),
    ("Helvetica-BoldItalic", 6),
    ("Helvetica-BoldOblique", 6),
    ("Helvetica-Italic", 7),
    ("Helvetica-Oblique", 7),
    ("HelveticaBold", 5),
    ("HelveticaBoldItalic", 6),
    ("HelveticaItalic", 7),
    ("Symbol", 12),
    ("SymbolMT", 12),
    ("Times-Bold", 9),
    ("Times-BoldItalic", 10),
    ("Times-Italic", 11),
    ("Times-Roman", 8),
    ("TimesBold", 9),
    ("TimesBoldItalic", 10),
    ("TimesItalic", 11),
    ("TimesNewRoman", 8),
    ("TimesNewRoman,Bold", 9),
    ("TimesNewRoman,BoldItalic", 10),
    ("TimesNewRoman,Italic", 11),
    ("TimesNewRoman-Bold", 9),
    ("TimesNewRoman-BoldItalic", 10),
    ("TimesNewRoman-Italic", 11),
    ("TimesNewRomanBold", 9),
    ("TimesNewRomanBoldItalic", 10),
    ("TimesNewRomanItalic", 11),
    ("TimesNewRomanPS", 8),
    ("TimesNewRomanPS-Bold", 9),
    ("TimesNewRomanPS-BoldItalic", 10),
    ("TimesNewRomanPS-BoldItalicMT", 10),
    ("TimesNewRomanPS-BoldMT", 9),
    ("TimesNewRomanPS-Italic", 11),
    ("TimesNewRomanPS-ItalicMT", 11),
    ("TimesNewRomanPSMT", 8),
    ("TimesNewRomanPSMT,Bold", 9),
    ("TimesNewRomanPSMT,BoldItalic", 10),
    ("TimesNewRomanPSMT,Italic", 11),
    ("ZapfDingbats", 13),
    ("ZapfDingbatsITC", 13),
];

/// Known PostScript names whose installed family name differs.
const ALT_FAMILIES: [(&str, &str); 3] = [
    ("AGaramondPro", "Adobe Garamond Pro"),
    ("BankGothicBT-Medium", "BankGothic Md BT"),
    ("ForteMT", "Forte"),
];

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// Key used to compare family names: spaces, hyphens and commas removed,
/// a subset tag suffix (`+...` past the first byte) cut, lowercased.
pub fn normalize_name(name: &str) -> String {
    let mut norm: String = name.chars().filter(|c| !matches!(c, ' ' | '-' | ',')).collect();
    if let Some(pos) = norm.find('+') {
        if pos > 0 {
            norm.truncate(pos);
        }
    }
    norm.to_lowercase()
}

/// Case-insensitive lookup of a standard font name or alias.
pub fn standard_font_index(name: &str) -> Option<usize> {
    ALIASES
        .binary_search_by(|(alias, _)| cmp_ignore_case(alias, name))
        .ok()
        .map(|i| ALIASES[i].1 as usize)
}

/// Replaces `name` with its canonical standard name when it is one.
pub fn canonical_standard_name(name: &str) -> Option<(usize, &'static str)> {
    standard_font_index(name).map(|i| (i, STANDARD_FONT_NAMES[i]))
}

bitflags::bitflags! {
    /// Style parsed out of a font name.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NameStyle: u8 {
        const BOLD = 0x01;
        const ITALIC = 0x02;
        /// Bold applied twice, e.g. `Bold,Bold`.
        const BOLD_BOLD = 0x04;
    }
}

impl NameStyle {
    /// Style bits implied by a standard font index.
    pub fn of_standard(index: usize) -> NameStyle {
        let mut style = NameStyle::empty();
        if matches!(index % 4, 1 | 2) {
            style |= NameStyle::BOLD;
        }
        if (index % 4) / 2 == 1 {
            style |= NameStyle::ITALIC;
        }
        style
    }

    pub fn weight(self) -> i32 {
        if self.contains(NameStyle::BOLD_BOLD) {
            super::FW_EXTRA_BOLD
        } else if self.contains(NameStyle::BOLD) {
            super::FW_BOLD
        } else {
            super::FW_NORMAL
        }
    }

    fn add_bold(&mut self) {
        if self.contains(NameStyle::BOLD) {
            *self |= NameStyle::BOLD_BOLD;
        } else {
            *self |= NameStyle::BOLD;
        }
    }
}

/// Ordered style vocabulary. Indices are significant.
const STYLE_WORDS: [&str; 5] = ["Bold", "Italic", "BoldItalic", "Reg", "Regular"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleWord {
    Bold,
    Italic,
    BoldItalic,
    Regular,
}

impl StyleWord {
    fn from_index(i: usize) -> StyleWord {
        match i {
            0 => StyleWord::Bold,
            1 => StyleWord::Italic,
            2 => StyleWord::BoldItalic,
            _ => StyleWord::Regular,
        }
    }
}

/// Matches a style word at the start of `text`, or at its end when
/// `from_end` is set. Longer vocabulary indices are tried first. Returns
/// the word and its length.
pub fn style_word(text: &str, from_end: bool) -> Option<(StyleWord, usize)> {
    STYLE_WORDS
        .iter()
        .enumerate()
        .rev()
        .find(|(_, word)| {
            if from_end {
                text.ends_with(*word)
            } else {
                text.starts_with(*word)
            }
        })
        .map(|(i, word)| (StyleWord::from_index(i), word.len()))
}

/// A font name broken into parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub family: SmartString,
    /// Standard index, or `None` for anything else.
    pub standard: Option<usize>,
    pub style: NameStyle,
    pub has_comma: bool,
    pub has_hyphen: bool,
    /// At least one style token was recognized.
    pub style_recognized: bool,
}

/// Splits a space-free, already canonicalized name into family and style.
pub fn parse_font_name(name: &str) -> ParsedName {
    let mut parsed = ParsedName {
        family: name.into(),
        standard: None,
        style: NameStyle::empty(),
        has_comma: false,
        has_hyphen: false,
        style_recognized: false,
    };
    let mut style_text = String::new();
    if let Some(comma) = name.find(',') {
        let family = &name[..comma];
        parsed.family = canonical_standard_name(family)
            .map_or(family, |(_, canonical)| canonical)
            .into();
        style_text = name[comma + 1..].to_owned();
        parsed.has_comma = true;
    }

    parsed.standard = STANDARD_FONT_NAMES[..STYLED_STANDARD_FONTS]
        .iter()
        .position(|&standard| standard == parsed.family.as_str());

    if let Some(index) = parsed.standard {
        parsed.style = NameStyle::of_standard(index);
    } else {
        if !parsed.has_comma {
            if let Some(hyphen) = parsed.family.rfind('-') {
                style_text = parsed.family[hyphen + 1..].to_owned();
                parsed.family = parsed.family[..hyphen].into();
                parsed.has_hyphen = true;
            }
        }
        if !parsed.has_hyphen {
            if let Some((word, len)) = style_word(&parsed.family, true) {
                let keep = parsed.family.len() - len;
                parsed.family = parsed.family[..keep].into();
                match word {
                    StyleWord::Bold => parsed.style |= NameStyle::BOLD,
                    StyleWord::Italic => parsed.style |= NameStyle::ITALIC,
                    StyleWord::BoldItalic => parsed.style |= NameStyle::BOLD | NameStyle::ITALIC,
                    StyleWord::Regular => {}
                }
            }
        }
    }

    if !style_text.is_empty() && !parse_style_tokens(&style_text, &mut parsed) {
        parsed.family = name.into();
        parsed.standard = None;
        parsed.style = NameStyle::empty();
    }
    parsed
}

/// Applies comma separated style tokens. Returns `false` when the tokens
/// cannot be read as a style, in which case the caller discards the split.
fn parse_style_tokens(text: &str, parsed: &mut ParsedName) -> bool {
    let mut first_item = true;
    for (i, token) in text.split(',').enumerate() {
        let word = style_word(token, false).map(|(word, _)| word);
        if (i > 0 && !parsed.style_recognized) || (i == 0 && word.is_none()) {
            return false;
        }
        if word.is_some() {
            parsed.style_recognized = true;
        }
        match word {
            Some(StyleWord::Bold) => {
                parsed.style.add_bold();
                first_item = false;
            }
            Some(StyleWord::Italic) => {
                if !first_item {
                    return false;
                }
                parsed.style |= NameStyle::ITALIC;
                return true;
            }
            Some(StyleWord::BoldItalic) => {
                parsed.style |= NameStyle::ITALIC;
                parsed.style.add_bold();
                first_item = false;
            }
            Some(StyleWord::Regular) | None => {}
        }
    }
    true
}

/// Family name to look up for a parsed family, rewriting script faces and
/// a few PostScript names whose installed family differs.
pub fn alt_family(family: &str, style: NameStyle) -> SmartString {
    if family.contains("Script") {
        let rewritten = if style.contains(NameStyle::BOLD) {
            "ScriptMTBold"
        } else if family.contains("Palace") {
            "PalaceScriptMT"
        } else if family.contains("French") {
            "FrenchScriptMT"
        } else if family.contains("FreeStyle") {
            "FreeStyleScript"
        } else {
            family
        };
        return rewritten.into();
    }
    ALT_FAMILIES
        .iter()
        .find(|(ps, _)| family.contains(ps) || cmp_ignore_case(family, ps) == Ordering::Equal)
        .map_or(family, |(_, installed)| installed)
        .into()
}

/// Families known to be available as sans faces even when the descriptor
/// flags them as serif. Clears the serif bit for them.
pub fn third_party_adjust(family: &str, serif: &mut bool) -> bool {
    if family == "MyriadPro" {
        *serif = false;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_table_is_sorted() {
        for pair in ALIASES.windows(2) {
            assert_eq!(
                cmp_ignore_case(pair[0].0, pair[1].0),
                Ordering::Less,
                "{} should sort before {}",
                pair[0].0,
                pair[1].0
            );
        }
        assert!(ALIASES.iter().all(|(_, index)| (*index as usize) < STANDARD_FONT_NAMES.len()));
    }

    #[test]
    fn every_standard_name_resolves_to_itself() {
        for (i, name) in STANDARD_FONT_NAMES.iter().enumerate() {
            if let Some(index) = standard_font_index(name) {
                assert_eq!(index, i, "{name}");
            }
        }
        assert_eq!(standard_font_index("courier-boldoblique"), Some(2));
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_name("Times New-Roman,Bold"), "timesnewromanbold");
        assert_eq!(normalize_name("Foo+Subset"), "foo");
        assert_eq!(normalize_name("+Foo"), "+foo");
    }

    #[test]
    fn aliases_seed_style() {
        assert_eq!(standard_font_index("Arial,Bold"), Some(5));
        assert_eq!(NameStyle::of_standard(5), NameStyle::BOLD);
        assert_eq!(NameStyle::of_standard(6), NameStyle::BOLD | NameStyle::ITALIC);
        assert_eq!(NameStyle::of_standard(11), NameStyle::ITALIC);
        assert_eq!(NameStyle::of_standard(8), NameStyle::empty());
    }

    #[test]
    fn hyphen_split_with_bold_italic() {
        let parsed = parse_font_name("SomeSerif-BoldItalic");
        assert_eq!(parsed.family.as_str(), "SomeSerif");
        assert!(parsed.has_hyphen);
        assert!(parsed.style_recognized);
        assert_eq!(parsed.style, NameStyle::BOLD | NameStyle::ITALIC);
        assert_eq!(parsed.style.weight(), 700);
    }

    #[test]
    fn trailing_style_word() {
        let parsed = parse_font_name("GaramondBold");
        assert_eq!(parsed.family.as_str(), "Garamond");
        assert_eq!(parsed.style, NameStyle::BOLD);
        let parsed = parse_font_name("GaramondRegular");
        assert_eq!(parsed.family.as_str(), "Garamond");
        assert!(parsed.style.is_empty());
    }

    #[test]
    fn repeated_bold_escalates() {
        let parsed = parse_font_name("Foo,Bold,Bold");
        assert_eq!(parsed.family.as_str(), "Foo");
        assert!(parsed.style.contains(NameStyle::BOLD_BOLD));
        assert_eq!(parsed.style.weight(), 900);
    }

    #[test]
    fn unknown_tokens_keep_whole_name() {
        let parsed = parse_font_name("Foo,Condensed");
        assert_eq!(parsed.family.as_str(), "Foo,Condensed");
        assert!(parsed.style.is_empty());

        let parsed = parse_font_name("Foo-Bar");
        assert_eq!(parsed.family.as_str(), "Foo-Bar");

        // italic after bold is rejected as a whole
        let parsed = parse_font_name("Foo,Bold,Italic");
        assert_eq!(parsed.family.as_str(), "Foo,Bold,Italic");
        assert!(parsed.standard.is_none());
        assert!(parsed.style.is_empty());
    }

    #[test]
    fn comma_style_on_standard_family() {
        let parsed = parse_font_name("Courier,Bold");
        assert_eq!(parsed.standard, Some(0));
        assert_eq!(parsed.style, NameStyle::BOLD);
    }

    #[test]
    fn alternate_families() {
        assert_eq!(alt_family("AGaramondPro", NameStyle::empty()).as_str(), "Adobe Garamond Pro");
        assert_eq!(alt_family("ForteMT", NameStyle::empty()).as_str(), "Forte");
        assert_eq!(alt_family("BrushScript", NameStyle::BOLD).as_str(), "ScriptMTBold");
        assert_eq!(alt_family("FrenchScript", NameStyle::empty()).as_str(), "FrenchScriptMT");
        assert_eq!(alt_family("Garamond", NameStyle::empty()).as_str(), "Garamond");
    }

    #[test]
    fn myriad_clears_serif() {
        let mut serif = true;
        assert!(third_party_adjust("MyriadPro", &mut serif));
        assert!(!serif);
        let mut serif = true;
        assert!(!third_party_adjust("Minion", &mut serif));
        assert!(serif);
    }
}
