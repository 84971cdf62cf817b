//! Font resolution and glyph rendering for a page rasterizer.
//!
//! A [`Context`] resolves font descriptions to faces (substituting installed
//! or built-in fonts), caches rendered glyphs, and draws text runs onto a
//! [`Device`]. The device scan-converts paths into 8-bit coverage and
//! composites them, clipped, onto a [`Bitmap`].

#![allow(clippy::too_many_arguments)]

pub mod bitmap;
pub mod clip;
pub mod color;
pub mod composite;
pub mod context;
pub mod device;
pub mod font;
pub mod geom;
pub mod glyph;
pub mod path;
pub mod raster;
pub mod text;

use smartstring::LazyCompact;

pub type SmartString = smartstring::SmartString<LazyCompact>;

pub use bitmap::{Bitmap, PixelFormat};
pub use clip::ClipRegion;
pub use color::{Cmyk, Color, FillColor};
pub use context::{service, Context, ContextBuilder, Settings};
pub use device::{Device, DeviceError, DeviceStats};
pub use font::{
    FaceKey, Font, FontDescriptor, FontError, FontMapper, FontMgr, SubstFont, Substitution,
};
pub use geom::{IntRect, Rect};
pub use glyph::{GlyphBitmap, GlyphCache, RenderMode};
pub use path::{Path, PathBuilder, PathSegment};
pub use raster::{
    stroke::{Dash, LineCap, LineJoin, StrokeSettings},
    FillRule,
};
pub use text::{GlyphPosition, TextFlags, TextRun};
