use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    device::{Device, DeviceError},
    font::{
        BuiltinFonts, FaceKey, Font, FontDbInfo, FontDescriptor, FontError, FontMapper, FontMgr,
        Substitution, SystemFontInfo,
    },
    glyph::{GlyphBitmap, GlyphCache, RenderMode},
    path::Path,
    text::{TextFlags, TextRun},
};

/// Builder for a [`Context`].
pub struct ContextBuilder {
    settings: Settings,
    builtin_fonts: Vec<(usize, Arc<[u8]>)>,
    system_font_info: Option<Box<dyn SystemFontInfo + Send>>,
}

impl ContextBuilder {
    /// Adds a directory searched for installed fonts.
    ///
    /// The default is no directories.
    pub fn font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.font_dirs.push(dir.into());
        self
    }

    /// Sets whether the platform's installed fonts are enumerated.
    ///
    /// The default value is `false`.
    pub fn load_system_fonts(mut self, load: bool) -> Self {
        self.settings.load_system_fonts = load;
        self
    }

    /// Sets the directory holding the standard 14 fonts and the two
    /// multiple master faces, named after the font (`Helvetica.ttf`,
    /// `SansMM.otf`, ...).
    ///
    /// The default is none: only the synthesized last-resort faces are
    /// available.
    pub fn builtin_font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.builtin_font_dir = Some(dir.into());
        self
    }

    /// Fills one built-in font slot from memory. Validated by
    /// [`ContextBuilder::build`].
    pub fn builtin_font(mut self, slot: usize, data: impl Into<Arc<[u8]>>) -> Self {
        self.builtin_fonts.push((slot, data.into()));
        self
    }

    /// Replaces the installed-font source built from the font directory
    /// settings.
    pub fn system_font_info(mut self, info: Box<dyn SystemFontInfo + Send>) -> Self {
        self.system_font_info = Some(info);
        self
    }

    /// Sets the gamma glyph coverage is corrected for.
    ///
    /// The default value is 2.2, which leaves coverage unchanged.
    pub fn text_gamma(mut self, gamma: f32) -> Self {
        assert!(gamma > 0.0);
        self.settings.text_gamma = gamma;
        self
    }

    /// Sets whether sub-pixel glyphs are low-pass filtered.
    ///
    /// The default value is `true`.
    pub fn lcd_filter(mut self, enabled: bool) -> Self {
        self.settings.lcd_filter = enabled;
        self
    }

    /// Sets whether sub-pixel text assumes a blue-green-red panel.
    ///
    /// The default value is `false`.
    pub fn bgr(mut self, bgr: bool) -> Self {
        self.settings.bgr = bgr;
        self
    }

    /// Sets the scale, in pixels per em, above which text is drawn as
    /// filled outlines instead of cached bitmaps.
    ///
    /// The default value is 50.
    pub fn glyph_path_threshold(mut self, threshold: f32) -> Self {
        self.settings.glyph_path_threshold = threshold;
        self
    }

    /// Sets the largest glyph bitmap, in pixels along either axis.
    ///
    /// The default value is 2048.
    pub fn max_glyph_size(mut self, size: u32) -> Self {
        self.settings.max_glyph_size = size;
        self
    }

    /// Replaces all settings at once, e.g. with ones read from a file.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the context, loading the configured built-in fonts.
    pub fn build(self) -> Result<Context, FontError> {
        let mut builtin = BuiltinFonts::new();
        if let Some(dir) = &self.settings.builtin_font_dir {
            builtin.load_dir(dir)?;
        }
        for (slot, data) in self.builtin_fonts {
            builtin.set(slot, data)?;
        }

        let mut font_mgr = FontMgr::new();
        let mut mapper = FontMapper::new(&mut font_mgr, builtin)?;
        match self.system_font_info {
            Some(info) => mapper.set_system_font_info(info),
            None if self.settings.load_system_fonts || !self.settings.font_dirs.is_empty() => {
                let mut info = FontDbInfo::new();
                if self.settings.load_system_fonts {
                    info.load_system_fonts();
                }
                for dir in &self.settings.font_dirs {
                    info.load_fonts_dir(dir);
                }
                mapper.set_system_font_info(Box::new(info));
            }
            None => {}
        }

        Ok(Context {
            glyph_cache: GlyphCache::new(&self.settings),
            font_mgr,
            mapper,

            settings: self.settings,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub(crate) font_dirs: Vec<PathBuf>,
    pub(crate) load_system_fonts: bool,
    pub(crate) builtin_font_dir: Option<PathBuf>,
    pub(crate) text_gamma: f32,
    pub(crate) lcd_filter: bool,
    pub(crate) bgr: bool,
    pub(crate) glyph_path_threshold: f32,
    pub(crate) max_glyph_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font_dirs: Vec::new(),
            load_system_fonts: false,
            builtin_font_dir: None,
            text_gamma: 2.2,
            lcd_filter: true,
            bgr: false,
            glyph_path_threshold: 50.0,
            max_glyph_size: 2048,
        }
    }
}

/// A font session: resolves fonts, owns their faces and caches glyphs.
///
/// Every operation takes `&mut self`. For one session shared by the
/// whole process, see [`service`].
pub struct Context {
    settings: Settings,

    font_mgr: FontMgr,
    mapper: FontMapper,
    glyph_cache: GlyphCache,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder {
            settings: Settings::default(),
            builtin_fonts: Vec::new(),
            system_font_info: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolves `desc` to a face, substituting when needed.
    pub fn find_substitute(&mut self, desc: &FontDescriptor) -> Substitution {
        self.mapper.find_substitute(&mut self.font_mgr, desc)
    }

    /// Resolves `desc` to a font ready for rendering.
    pub fn load_font(&mut self, desc: &FontDescriptor) -> Font {
        Font::substituted(&self.find_substitute(desc))
    }

    /// Loads a font embedded in a document. Faces loaded twice from the
    /// same `name` share storage.
    pub fn load_embedded_font(
        &mut self,
        name: &str,
        data: impl Into<Arc<[u8]>>,
        face_index: u32,
    ) -> Option<Font> {
        self.font_mgr
            .get_or_load_single_face(name, 0, false, data, face_index)
            .map(Font::embedded)
    }

    /// Gives up one reference to `face`, dropping its cached glyphs once
    /// the face is freed.
    pub fn release_face(&mut self, face: FaceKey) {
        if self.font_mgr.release(face) && !self.font_mgr.is_loaded(face) {
            self.glyph_cache.purge_face(face);
        }
    }

    pub fn font_mgr(&self) -> &FontMgr {
        &self.font_mgr
    }

    pub fn mapper(&self) -> &FontMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut FontMapper {
        &mut self.mapper
    }

    pub fn glyph_cache(&self) -> &GlyphCache {
        &self.glyph_cache
    }

    pub fn glyph_cache_mut(&mut self) -> &mut GlyphCache {
        &mut self.glyph_cache
    }

    /// See [`GlyphCache::load_glyph_bitmap`].
    pub fn load_glyph_bitmap(
        &mut self,
        font: &Font,
        glyph: u32,
        use_secondary_style: bool,
        matrix: &glam::Affine2,
        dest_width: i32,
        mode: RenderMode,
    ) -> Option<Arc<GlyphBitmap>> {
        self.glyph_cache.load_glyph_bitmap(
            &self.font_mgr,
            font,
            glyph,
            use_secondary_style,
            matrix,
            dest_width,
            mode,
        )
    }

    /// See [`GlyphCache::load_glyph_path`].
    pub fn load_glyph_path(&mut self, font: &Font, glyph: u32, dest_width: i32) -> Option<Arc<Path>> {
        self.glyph_cache
            .load_glyph_path(&self.font_mgr, font, glyph, dest_width)
    }

    /// Draws `run` onto `device` with this session's glyph cache and
    /// settings.
    pub fn draw_text(&mut self, device: &mut Device, run: &TextRun<'_>) -> Result<(), DeviceError> {
        let mut run = run.clone();
        if self.settings.bgr {
            run.flags |= TextFlags::BGR_STRIPE;
        }
        device.draw_text(
            &self.font_mgr,
            &mut self.glyph_cache,
            &run,
            self.settings.glyph_path_threshold,
        )
    }
}

/// A process-wide [`Context`] with explicit setup and teardown.
pub mod service {
    use once_cell::sync::Lazy;
    use parking_lot::Mutex;

    use super::{Context, ContextBuilder};
    use crate::font::FontError;

    static SERVICE: Lazy<Mutex<Option<Context>>> = Lazy::new(|| Mutex::new(None));

    #[derive(Debug, thiserror::Error)]
    pub enum ServiceError {
        #[error("the font service is already running")]
        AlreadyRunning,
        #[error("the font service is not running")]
        NotRunning,
        #[error(transparent)]
        Font(#[from] FontError),
    }

    /// Starts the service with a context built from `builder`.
    pub fn init(builder: ContextBuilder) -> Result<(), ServiceError> {
        let mut service = SERVICE.lock();
        if service.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }
        *service = Some(builder.build()?);
        log::info!("Font service started");
        Ok(())
    }

    /// Runs `f` with exclusive access to the service's context.
    pub fn with<R>(f: impl FnOnce(&mut Context) -> R) -> Result<R, ServiceError> {
        let mut service = SERVICE.lock();
        let cx = service.as_mut().ok_or(ServiceError::NotRunning)?;
        Ok(f(cx))
    }

    /// Stops the service, dropping every face and cached glyph. Returns
    /// whether it was running.
    pub fn teardown() -> bool {
        let stopped = SERVICE.lock().take().is_some();
        if stopped {
            log::info!("Font service stopped");
        }
        stopped
    }

    pub fn is_running() -> bool {
        SERVICE.lock().is_some()
    }
}
