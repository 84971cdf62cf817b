//! Reference-counted storage of parsed faces and the bytes behind them.

use std::sync::Arc;

use ahash::AHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use super::{face::LoadedFace, sfnt, MalformedFont};
use crate::SmartString;

new_key_type! {
    /// Handle to a face stored in a [`FontMgr`].
    pub struct FaceKey;

    struct BlobKey;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BlobName {
    Single {
        name: SmartString,
        weight: i32,
        italic: bool,
    },
    Collection {
        size: usize,
        checksum: u32,
    },
}

/// One font file's bytes and the faces parsed from it.
#[derive(Debug)]
struct Blob {
    name: BlobName,
    data: Arc<[u8]>,
    refcount: u32,
    /// (collection index, face)
    faces: SmallVec<[(u32, FaceKey); 1]>,
}

#[derive(Debug)]
struct Entry {
    face: LoadedFace,
    /// `None` for fixed faces, which are never released.
    blob: Option<BlobKey>,
}

/// Owns every loaded face.
///
/// Faces loaded by name and faces loaded from collections live in
/// separate namespaces: the same file reached both ways is stored twice.
#[derive(Debug, Default)]
pub struct FontMgr {
    faces: SlotMap<FaceKey, Entry>,
    blobs: SlotMap<BlobKey, Blob>,
    by_name: AHashMap<BlobName, BlobKey>,
}

impl FontMgr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a single face by (name, weight, italic), loading it from
    /// `data` on a miss. Each successful call takes one reference.
    pub fn get_or_load_single_face(
        &mut self,
        name: &str,
        weight: i32,
        italic: bool,
        data: impl Into<Arc<[u8]>>,
        face_index: u32,
    ) -> Option<FaceKey> {
        let key = BlobName::Single {
            name: name.into(),
            weight,
            italic,
        };
        if let Some(&blob_key) = self.by_name.get(&key) {
            let blob = &mut self.blobs[blob_key];
            blob.refcount += 1;
            return blob.faces.first().map(|&(_, face)| face);
        }

        let data = data.into();
        let face = match LoadedFace::from_data(Arc::clone(&data), face_index) {
            Ok(face) => face,
            Err(MalformedFont) => {
                log::debug!("Could not load face '{}'", name);
                return None;
            }
        };
        log::info!("Loaded face '{}' (weight {}, italic {})", name, weight, italic);
        let blob_key = self.blobs.insert(Blob {
            name: key.clone(),
            data,
            refcount: 1,
            faces: SmallVec::new(),
        });
        let face_key = self.faces.insert(Entry {
            face,
            blob: Some(blob_key),
        });
        self.blobs[blob_key].faces.push((face_index, face_key));
        self.by_name.insert(key, blob_key);
        Some(face_key)
    }

    /// Looks up a collection by (size, checksum) and returns the member
    /// whose table directory starts at `member_offset`, loading the
    /// collection or the member on a miss. Each successful call takes one
    /// reference on the collection.
    pub fn get_or_load_collection_face(
        &mut self,
        bytes: impl Into<Arc<[u8]>>,
        checksum: u32,
        size: usize,
        member_offset: u32,
    ) -> Option<FaceKey> {
        let key = BlobName::Collection { size, checksum };
        let blob_key = match self.by_name.get(&key) {
            Some(&blob_key) => blob_key,
            None => {
                let data = bytes.into();
                log::info!("Loaded font collection ({} bytes)", data.len());
                let blob_key = self.blobs.insert(Blob {
                    name: key.clone(),
                    data,
                    refcount: 0,
                    faces: SmallVec::new(),
                });
                self.by_name.insert(key, blob_key);
                blob_key
            }
        };

        let blob = &mut self.blobs[blob_key];
        blob.refcount += 1;
        let index = sfnt::ttc_index(&blob.data, member_offset);
        if let Some(&(_, face)) = blob.faces.iter().find(|(i, _)| *i == index) {
            return Some(face);
        }
        match LoadedFace::from_data(Arc::clone(&blob.data), index) {
            Ok(face) => {
                let face_key = self.faces.insert(Entry {
                    face,
                    blob: Some(blob_key),
                });
                self.blobs[blob_key].faces.push((index, face_key));
                Some(face_key)
            }
            Err(MalformedFont) => {
                log::debug!("Could not load collection member {}", index);
                self.release_blob(blob_key);
                None
            }
        }
    }

    /// Loads a face that is owned for the manager's whole lifetime, such
    /// as a built-in font. Fixed faces are not shared by name and
    /// [`FontMgr::release`] ignores them.
    pub fn load_fixed_face(
        &mut self,
        data: impl Into<Arc<[u8]>>,
        face_index: u32,
    ) -> Result<FaceKey, MalformedFont> {
        let face = LoadedFace::from_data(data.into(), face_index)?;
        Ok(self.faces.insert(Entry { face, blob: None }))
    }

    /// Drops one reference to the file behind `face`. The bytes and all
    /// faces parsed from them are freed when the count reaches zero.
    ///
    /// Returns `false`, doing nothing, for stale or fixed faces.
    pub fn release(&mut self, face: FaceKey) -> bool {
        match self.faces.get(face).and_then(|entry| entry.blob) {
            Some(blob_key) => {
                self.release_blob(blob_key);
                true
            }
            None => false,
        }
    }

    fn release_blob(&mut self, blob_key: BlobKey) {
        let Some(blob) = self.blobs.get_mut(blob_key) else {
            return;
        };
        blob.refcount = blob.refcount.saturating_sub(1);
        if blob.refcount > 0 {
            return;
        }
        if let Some(blob) = self.blobs.remove(blob_key) {
            for (_, face) in &blob.faces {
                self.faces.remove(*face);
            }
            self.by_name.remove(&blob.name);
            log::debug!("Freed font data ({} bytes)", blob.data.len());
        }
    }

    pub fn face(&self, face: FaceKey) -> Option<&LoadedFace> {
        self.faces.get(face).map(|entry| &entry.face)
    }

    pub fn is_loaded(&self, face: FaceKey) -> bool {
        self.faces.contains_key(face)
    }

    /// Number of cached font files, fixed faces excluded.
    pub fn cache_len(&self) -> usize {
        self.blobs.len()
    }

    /// References held on the file behind `face`.
    pub fn refcount(&self, face: FaceKey) -> Option<u32> {
        let blob = self.faces.get(face)?.blob?;
        self.blobs.get(blob).map(|blob| blob.refcount)
    }
}

/// Checksum identifying a collection: a wrapping sum of its first 256
/// little-endian words.
pub fn collection_checksum(bytes: &[u8]) -> u32 {
    sfnt::collection_checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::synth::{build_collection, SynthFont};

    fn font(family: &str) -> Vec<u8> {
        SynthFont::new(family, "Regular").build()
    }

    #[test]
    fn single_faces_are_shared_by_key() {
        let mut mgr = FontMgr::new();
        let a = mgr.get_or_load_single_face("Synth", 400, false, font("Synth"), 0).unwrap();
        let b = mgr.get_or_load_single_face("Synth", 400, false, font("Synth"), 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(mgr.refcount(a), Some(2));
        assert!(Arc::ptr_eq(mgr.face(a).unwrap().data(), mgr.face(b).unwrap().data()));

        let c = mgr.get_or_load_single_face("Synth", 700, false, font("Synth"), 0).unwrap();
        assert_ne!(a, c);
        assert_eq!(mgr.cache_len(), 2);
    }

    #[test]
    fn release_frees_exactly_once() {
        let mut mgr = FontMgr::new();
        let a = mgr.get_or_load_single_face("Synth", 400, false, font("Synth"), 0).unwrap();
        mgr.get_or_load_single_face("Synth", 400, false, font("Synth"), 0);
        let data = Arc::clone(mgr.face(a).unwrap().data());

        assert!(mgr.release(a));
        assert!(mgr.is_loaded(a));
        assert_eq!(mgr.refcount(a), Some(1));

        assert!(mgr.release(a));
        assert!(!mgr.is_loaded(a));
        assert_eq!(mgr.cache_len(), 0);
        assert_eq!(Arc::strong_count(&data), 1);

        // stale handle
        assert!(!mgr.release(a));
        assert_eq!(Arc::strong_count(&data), 1);
    }

    #[test]
    fn malformed_data_is_not_cached() {
        let mut mgr = FontMgr::new();
        assert!(mgr.get_or_load_single_face("Bad", 400, false, vec![1u8; 40], 0).is_none());
        assert_eq!(mgr.cache_len(), 0);
    }

    #[test]
    fn collection_members_share_bytes() {
        let ttc = build_collection(&[font("First"), font("Second")]);
        let offsets = sfnt::collection_offsets(&ttc).unwrap();
        let checksum = collection_checksum(&ttc);
        let mut mgr = FontMgr::new();

        let first = mgr
            .get_or_load_collection_face(ttc.clone(), checksum, ttc.len(), offsets[0])
            .unwrap();
        let second = mgr
            .get_or_load_collection_face(ttc.clone(), checksum, ttc.len(), offsets[1])
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(mgr.face(second).unwrap().family(), "Second");
        assert!(Arc::ptr_eq(mgr.face(first).unwrap().data(), mgr.face(second).unwrap().data()));
        assert_eq!(mgr.cache_len(), 1);
        assert_eq!(mgr.refcount(first), Some(2));

        // unknown offsets fall back to the first member
        let fallback = mgr
            .get_or_load_collection_face(ttc.clone(), checksum, ttc.len(), 7)
            .unwrap();
        assert_eq!(fallback, first);

        for _ in 0..3 {
            assert!(mgr.release(first));
        }
        assert!(!mgr.is_loaded(first));
        assert!(!mgr.is_loaded(second));
        assert!(!mgr.release(second));
    }

    #[test]
    fn namespaces_do_not_coalesce() {
        let data = font("Synth");
        let ttc = build_collection(&[data.clone()]);
        let offsets = sfnt::collection_offsets(&ttc).unwrap();
        let mut mgr = FontMgr::new();
        let single = mgr.get_or_load_single_face("Synth", 400, false, data, 0).unwrap();
        let member = mgr
            .get_or_load_collection_face(ttc.clone(), collection_checksum(&ttc), ttc.len(), offsets[0])
            .unwrap();
        assert_ne!(single, member);
        assert_eq!(mgr.cache_len(), 2);
    }

    #[test]
    fn fixed_faces_ignore_release() {
        let mut mgr = FontMgr::new();
        let fixed = mgr.load_fixed_face(font("Fixed"), 0).unwrap();
        assert!(!mgr.release(fixed));
        assert!(mgr.is_loaded(fixed));
        assert_eq!(mgr.cache_len(), 0);
    }
}
