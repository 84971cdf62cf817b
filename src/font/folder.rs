//! A [`SystemFontInfo`] that scans directories for font files.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ahash::AHashMap;
use anyhow::Context as _;

use super::{
    enumerate::{face_display_name, register_face, RegisteredFace},
    sfnt, FontBytes, FontHandle, InstalledFonts, MapRequest, SystemFontInfo,
};
use crate::SmartString;

#[derive(Debug, Clone)]
struct FolderFace {
    path: PathBuf,
    /// Table directory offset; 0 for standalone files.
    offset: u32,
    index: u32,
    collection: bool,
    info: RegisteredFace,
}

/// Lists `.ttf`, `.otf` and `.ttc` files found under a set of directories,
/// recursively. Each face name is registered once; later files with the
/// same name are ignored.
///
/// Only name lookups are served: [`SystemFontInfo::map_font`] never
/// suggests a face.
#[derive(Debug, Default)]
pub struct FolderFontInfo {
    dirs: Vec<PathBuf>,
    faces: Vec<FolderFace>,
    by_name: AHashMap<SmartString, FontHandle>,
}

impl FolderFontInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_path(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.push(dir.into());
    }

    /// Number of faces found by the last enumeration.
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    fn scan_dir(&mut self, dir: &Path, catalog: &mut InstalledFonts) -> anyhow::Result<()> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to list font directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                if let Err(e) = self.scan_dir(&path, catalog) {
                    log::debug!("{:#}", e);
                }
                continue;
            }
            if !has_font_extension(&path) {
                continue;
            }
            if let Err(e) = self.scan_file(&path, catalog) {
                log::debug!("Skipping font file {}: {:#}", path.display(), e);
            }
        }
        Ok(())
    }

    fn scan_file(&mut self, path: &Path, catalog: &mut InstalledFonts) -> anyhow::Result<()> {
        let data = fs::read(path).context("failed to read file")?;
        if sfnt::is_collection(&data) {
            let offsets = sfnt::collection_offsets(&data).context("truncated collection header")?;
            for (index, offset) in offsets.into_iter().enumerate() {
                self.report_face(path, &data, offset, index as u32, true, catalog);
            }
        } else {
            anyhow::ensure!(data.len() >= 12, "file too short");
            self.report_face(path, &data, 0, 0, false, catalog);
        }
        Ok(())
    }

    fn report_face(
        &mut self,
        path: &Path,
        data: &[u8],
        offset: u32,
        index: u32,
        collection: bool,
        catalog: &mut InstalledFonts,
    ) {
        let Some(name) = face_display_name(data, offset as usize) else {
            return;
        };
        if self.by_name.contains_key(name.as_str()) {
            return;
        }
        let Some(info) = register_face(catalog, data, offset as usize) else {
            return;
        };
        let handle = FontHandle(self.faces.len());
        self.by_name.insert(name.as_str().into(), handle);
        self.faces.push(FolderFace {
            path: path.to_owned(),
            offset,
            index,
            collection,
            info,
        });
    }
}

fn has_font_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            ["ttf", "otf", "ttc"]
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

impl SystemFontInfo for FolderFontInfo {
    fn enum_font_list(&mut self, catalog: &mut InstalledFonts) {
        self.faces.clear();
        self.by_name.clear();
        for dir in self.dirs.clone() {
            if let Err(e) = self.scan_dir(&dir, catalog) {
                log::debug!("{:#}", e);
            }
        }
        log::info!("Found {} faces in font directories", self.faces.len());
    }

    fn map_font(&mut self, _request: &MapRequest<'_>) -> Option<(FontHandle, bool)> {
        None
    }

    fn get_font(&mut self, face: &str) -> Option<FontHandle> {
        self.by_name.get(face).copied()
    }

    fn font_data(&mut self, font: FontHandle) -> Option<FontBytes> {
        let face = self.faces.get(font.0)?;
        let data = match fs::read(&face.path) {
            Ok(data) => data,
            Err(e) => {
                log::debug!("Could not reread {}: {}", face.path.display(), e);
                return None;
            }
        };
        if face.collection || face.offset != 0 {
            Some(FontBytes::Collection {
                data,
                member_offset: face.offset,
            })
        } else {
            Some(FontBytes::Single(data))
        }
    }

    fn face_name(&self, font: FontHandle) -> Option<SmartString> {
        self.faces.get(font.0).map(|face| face.info.name.clone())
    }

    fn face_index(&self, font: FontHandle) -> u32 {
        self.faces.get(font.0).map_or(0, |face| face.index)
    }
}
