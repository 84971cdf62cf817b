//! Windows charsets and the tables relating them to code pages and to the
//! OS/2 code page range bits.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A Windows `LOGFONT` charset identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Charset(pub u8);

impl Charset {
    pub const ANSI: Charset = Charset(0);
    pub const DEFAULT: Charset = Charset(1);
    pub const SYMBOL: Charset = Charset(2);
    pub const MAC: Charset = Charset(77);
    pub const SHIFT_JIS: Charset = Charset(128);
    pub const HANGEUL: Charset = Charset(129);
    pub const JOHAB: Charset = Charset(130);
    pub const GB2312: Charset = Charset(134);
    pub const CHINESE_BIG5: Charset = Charset(136);
    pub const GREEK: Charset = Charset(161);
    pub const TURKISH: Charset = Charset(162);
    pub const VIETNAMESE: Charset = Charset(163);
    pub const HEBREW: Charset = Charset(177);
    pub const ARABIC: Charset = Charset(178);
    pub const BALTIC: Charset = Charset(186);
    pub const RUSSIAN: Charset = Charset(204);
    pub const THAI: Charset = Charset(222);
    pub const EAST_EUROPE: Charset = Charset(238);

    pub fn is_cjk(self) -> bool {
        matches!(
            self,
            Charset::SHIFT_JIS | Charset::GB2312 | Charset::HANGEUL | Charset::CHINESE_BIG5
        )
    }

    /// Charset of a Windows code page. Unknown pages map to
    /// [`Charset::DEFAULT`].
    pub fn from_code_page(code_page: u16) -> Charset {
        CODE_PAGE_CHARSETS
            .binary_search_by_key(&code_page, |&(cp, _)| cp)
            .map_or(Charset::DEFAULT, |i| Charset(CODE_PAGE_CHARSETS[i].1))
    }

    /// The `ulCodePageRange1` bit a face must have to cover this charset.
    pub fn code_page_range_bit(self) -> u32 {
        match self {
            Charset::EAST_EUROPE => 1 << 1,
            Charset::GREEK => 1 << 3,
            Charset::TURKISH => 1 << 4,
            Charset::HEBREW => 1 << 5,
            Charset::ARABIC => 1 << 6,
            Charset::BALTIC => 1 << 7,
            Charset::THAI => 1 << 16,
            Charset::SHIFT_JIS => 1 << 17,
            Charset::GB2312 => 1 << 18,
            Charset::CHINESE_BIG5 => 1 << 20,
            Charset::HANGEUL => 1 << 19,
            Charset::SYMBOL => 1 << 31,
            _ => 1 << 21,
        }
    }
}

/// (code page, charset), sorted by code page.
const CODE_PAGE_CHARSETS: [(u16, u8); 31] = [
    (0, 1),
    (42, 2),
    (437, 254),
    (850, 255),
    (874, 222),
    (932, 128),
    (936, 134),
    (949, 129),
    (950, 136),
    (1250, 238),
    (1251, 204),
    (1252, 0),
    (1253, 161),
    (1254, 162),
    (1255, 177),
    (1256, 178),
    (1257, 186),
    (1258, 163),
    (1361, 130),
    (10000, 77),
    (10001, 78),
    (10002, 81),
    (10003, 79),
    (10004, 84),
    (10005, 83),
    (10006, 85),
    (10007, 89),
    (10008, 80),
    (10021, 87),
    (10029, 88),
    (10081, 86),
];

bitflags! {
    /// Charsets an installed face was found to cover.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CharsetFlags: u32 {
        const ANSI = 1;
        const SYMBOL = 2;
        const SHIFT_JIS = 4;
        const BIG5 = 8;
        const GB = 16;
        const KOREAN = 32;
    }
}

/// Charsets covered according to an OS/2 `ulCodePageRange1`, in the
/// order faces are registered for them. ANSI is always included, last.
pub fn charsets_from_code_pages(code_pages: u32) -> Vec<(Charset, CharsetFlags)> {
    let mut out = Vec::new();
    if code_pages & (1 << 17) != 0 {
        out.push((Charset::SHIFT_JIS, CharsetFlags::SHIFT_JIS));
    }
    if code_pages & (1 << 18) != 0 {
        out.push((Charset::GB2312, CharsetFlags::GB));
    }
    if code_pages & (1 << 20) != 0 {
        out.push((Charset::CHINESE_BIG5, CharsetFlags::BIG5));
    }
    if code_pages & ((1 << 19) | (1 << 21)) != 0 {
        out.push((Charset::HANGEUL, CharsetFlags::KOREAN));
    }
    if code_pages & (1 << 31) != 0 {
        out.push((Charset::SYMBOL, CharsetFlags::SYMBOL));
    }
    out.push((Charset::ANSI, CharsetFlags::ANSI));
    out
}

/// Installed families worth trying, in order, for a CJK charset whose
/// requested family is not installed.
pub fn cjk_fallback_families(charset: Charset) -> &'static [&'static str] {
    match charset {
        Charset::SHIFT_JIS => &[
            "MS Gothic",
            "MS Mincho",
            "MS PGothic",
            "Noto Sans CJK JP",
            "Noto Serif CJK JP",
            "IPAGothic",
            "IPAMincho",
            "Hiragino Kaku Gothic ProN",
        ],
        Charset::GB2312 => &[
            "SimSun",
            "SimHei",
            "Microsoft YaHei",
            "Noto Sans CJK SC",
            "Noto Serif CJK SC",
            "WenQuanYi Zen Hei",
            "STSong",
        ],
        Charset::CHINESE_BIG5 => &[
            "MingLiU",
            "PMingLiU",
            "Microsoft JhengHei",
            "Noto Sans CJK TC",
            "Noto Serif CJK TC",
            "AR PL UMing TW",
        ],
        Charset::HANGEUL => &[
            "Batang",
            "Gulim",
            "Malgun Gothic",
            "Noto Sans CJK KR",
            "Noto Serif CJK KR",
            "UnDotum",
            "AppleGothic",
        ],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_page_table_is_sorted() {
        assert!(CODE_PAGE_CHARSETS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn code_page_lookup() {
        assert_eq!(Charset::from_code_page(932), Charset::SHIFT_JIS);
        assert_eq!(Charset::from_code_page(1252), Charset::ANSI);
        assert_eq!(Charset::from_code_page(42), Charset::SYMBOL);
        assert_eq!(Charset::from_code_page(10081), Charset(86));
        assert_eq!(Charset::from_code_page(1), Charset::DEFAULT);
    }

    #[test]
    fn cjk_predicate() {
        assert!(Charset::from_code_page(936).is_cjk());
        assert!(Charset::HANGEUL.is_cjk());
        assert!(!Charset::JOHAB.is_cjk());
        assert!(!Charset::ANSI.is_cjk());
        assert!(cjk_fallback_families(Charset::ANSI).is_empty());
        assert!(!cjk_fallback_families(Charset::GB2312).is_empty());
    }

    #[test]
    fn code_page_bits_register_ansi_last() {
        let charsets = charsets_from_code_pages((1 << 17) | (1 << 21) | 1);
        let ids: Vec<Charset> = charsets.iter().map(|c| c.0).collect();
        assert_eq!(ids, [Charset::SHIFT_JIS, Charset::HANGEUL, Charset::ANSI]);
        assert_eq!(Charset::SHIFT_JIS.code_page_range_bit(), 1 << 17);
        assert_eq!(Charset::RUSSIAN.code_page_range_bit(), 1 << 21);
    }
}
