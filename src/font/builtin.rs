//! Built-in font data: the standard 14 fonts plus a serif and a sans
//! multiple master face.
//!
//! No font programs ship with the crate. Slots are filled from a
//! directory or from memory; empty slots fall back to the nearest filled
//! variant and finally to a synthesized last-resort face.

use std::{fs, path::Path, sync::Arc};

use once_cell::sync::Lazy;

use super::{
    name::{STANDARD_FONT_NAMES, STYLED_STANDARD_FONTS},
    synth::SynthFont,
    FontError, LoadedFace,
};

pub const SLOT_COUNT: usize = 16;
pub const SERIF_MM_SLOT: usize = 14;
pub const SANS_MM_SLOT: usize = 15;

/// File stem looked up for each slot by [`BuiltinFonts::load_dir`].
pub fn slot_file_stem(slot: usize) -> Option<&'static str> {
    match slot {
        0..=13 => Some(STANDARD_FONT_NAMES[slot]),
        SERIF_MM_SLOT => Some("SerifMM"),
        SANS_MM_SLOT => Some("SansMM"),
        _ => None,
    }
}

static LAST_RESORT: Lazy<Arc<[u8]>> =
    Lazy::new(|| SynthFont::new("Strike Fallback", "Regular").build().into());

static LAST_RESORT_MM: Lazy<Arc<[u8]>> = Lazy::new(|| {
    SynthFont::new("Strike Fallback MM", "Regular")
        .axis((*b"wght", 100.0, 400.0, 900.0))
        .axis((*b"wdth", 50.0, 100.0, 200.0))
        .build()
        .into()
});

#[derive(Debug, Clone, Default)]
pub struct BuiltinFonts {
    slots: [Option<Arc<[u8]>>; SLOT_COUNT],
}

impl BuiltinFonts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills `slot` with font data after checking that it parses.
    pub fn set(&mut self, slot: usize, data: impl Into<Arc<[u8]>>) -> Result<(), FontError> {
        if slot >= SLOT_COUNT {
            return Err(FontError::InvalidSlot(slot));
        }
        let data = data.into();
        LoadedFace::from_data(Arc::clone(&data), 0)?;
        self.slots[slot] = Some(data);
        Ok(())
    }

    /// Loads every slot whose file (`<stem>.ttf` or `<stem>.otf`) exists
    /// in `dir`. Returns the number of slots filled.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, FontError> {
        let dir = dir.as_ref();
        let mut loaded = 0;
        for slot in 0..SLOT_COUNT {
            let Some(stem) = slot_file_stem(slot) else {
                continue;
            };
            for ext in ["ttf", "otf"] {
                let path = dir.join(format!("{}.{}", stem, ext));
                if !path.is_file() {
                    continue;
                }
                let data = fs::read(&path).map_err(|source| FontError::Io {
                    path: path.clone(),
                    source,
                })?;
                self.set(slot, data)?;
                log::info!("Loaded built-in font {} from {}", stem, path.display());
                loaded += 1;
                break;
            }
        }
        Ok(loaded)
    }

    pub fn data(&self, slot: usize) -> Option<&Arc<[u8]>> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn is_filled(&self, slot: usize) -> bool {
        self.data(slot).is_some()
    }

    /// The filled slot closest to standard font `index`: the requested
    /// variant, then without italic, then without bold, then regular.
    pub fn nearest_variant(&self, index: usize) -> Option<usize> {
        if index >= STYLED_STANDARD_FONTS {
            return self.is_filled(index).then_some(index);
        }
        variant_order(index)
            .into_iter()
            .find(|&slot| self.is_filled(slot))
    }

    /// Synthesized face used when no configured data fits.
    pub fn last_resort() -> Arc<[u8]> {
        Arc::clone(&LAST_RESORT)
    }

    /// Synthesized variable face standing in for the multiple master
    /// slots.
    pub fn last_resort_multi_master() -> Arc<[u8]> {
        Arc::clone(&LAST_RESORT_MM)
    }
}

/// Candidate slots for a styled standard index, best first.
fn variant_order(index: usize) -> Vec<usize> {
    let base = index / 4 * 4;
    let (bold, italic) = match index % 4 {
        0 => (false, false),
        1 => (true, false),
        2 => (true, true),
        _ => (false, true),
    };
    let slot = |bold: bool, italic: bool| {
        base + match (bold, italic) {
            (false, false) => 0,
            (true, false) => 1,
            (true, true) => 2,
            (false, true) => 3,
        }
    };
    let mut order = vec![
        slot(bold, italic),
        slot(bold, false),
        slot(false, italic),
        slot(false, false),
    ];
    let mut seen = Vec::with_capacity(order.len());
    order.retain(|s| {
        let fresh = !seen.contains(s);
        seen.push(*s);
        fresh
    });
    order
}
