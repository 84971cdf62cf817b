//! Design coordinates for multiple master substitutes.
//!
//! A substitute face has a weight axis and a width axis. The weight comes
//! straight from the request; the width is solved per glyph so the
//! glyph's advance matches the width the document expects.

use smallvec::SmallVec;
use ttf_parser::Tag;

use super::LoadedFace;

pub type DesignCoordinates = SmallVec<[(Tag, f32); 2]>;

/// Width axis value whose advance lands on `dest_width`, interpolating
/// linearly between the advances measured at the axis extremes. Integer
/// arithmetic throughout. `None` when both extremes give the same
/// advance.
pub fn interpolate_width(
    min_param: i32,
    max_param: i32,
    min_width: i32,
    max_width: i32,
    dest_width: i32,
) -> Option<i32> {
    if max_width == min_width {
        return None;
    }
    Some(min_param + (max_param - min_param) * (dest_width - min_width) / (max_width - min_width))
}

/// Coordinates to render `glyph` of a multiple master `face` with.
///
/// `weight` 0 selects the weight axis default and `dest_width` 0 (in
/// thousandths of an em) the width axis default.
pub fn solve_design_coordinates(
    face: &LoadedFace,
    glyph: u16,
    dest_width: i32,
    weight: i32,
) -> DesignCoordinates {
    let mut coords = DesignCoordinates::new();
    let axes = face.axes();
    let Some(weight_axis) = axes.first() else {
        return coords;
    };
    let weight = if weight == 0 {
        weight_axis.default
    } else {
        weight as f32
    };
    coords.push((weight_axis.tag, weight));
    let Some(width_axis) = axes.get(1) else {
        return coords;
    };
    if dest_width == 0 {
        coords.push((width_axis.tag, width_axis.default));
        return coords;
    }

    let min_param = width_axis.min as i32;
    let max_param = width_axis.max as i32;
    let advance_at = |param: i32| {
        face.advance_milli_em(glyph, &[(weight_axis.tag, weight), (width_axis.tag, param as f32)])
            .unwrap_or(0)
    };
    let min_width = advance_at(min_param);
    let max_width = advance_at(max_param);
    let width = match interpolate_width(min_param, max_param, min_width, max_width, dest_width) {
        Some(param) => param as f32,
        None => {
            log::debug!("Glyph {} advance does not vary with width", glyph);
            width_axis.default
        }
    };
    coords.push((width_axis.tag, width));
    coords
}
