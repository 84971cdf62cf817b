use crate::{bitmap::Bitmap, device::DeviceError, geom::IntRect};

/// The active clip of a device: a pixel rectangle, optionally refined by
/// an 8-bit coverage mask sized to that rectangle.
///
/// Every operation on a region only ever narrows it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRegion {
    bounds: IntRect,
    mask: Option<Bitmap>,
}

impl ClipRegion {
    pub fn rect(bounds: IntRect) -> Self {
        Self {
            bounds: normalize(bounds),
            mask: None,
        }
    }

    /// A mask-backed region whose top-left mask pixel sits at `(left, top)`.
    pub fn from_mask(mask: Bitmap, left: i32, top: i32) -> Self {
        let bounds = IntRect::new(
            left,
            top,
            left + mask.width() as i32,
            top + mask.height() as i32,
        );
        Self {
            bounds: normalize(bounds),
            mask: Some(mask),
        }
    }

    pub fn bounds(&self) -> IntRect {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    /// Clip coverage of a device pixel.
    pub fn coverage(&self, x: i32, y: i32) -> u8 {
        if !self.bounds.contains(x, y) {
            return 0;
        }
        match &self.mask {
            Some(mask) => mask.get(
                (x - self.bounds.left) as u32,
                (y - self.bounds.top) as u32,
            ),
            None => u8::MAX,
        }
    }

    /// Horizontal extent of row `y` and, when masked, the mask bytes for
    /// that extent.
    pub fn row(&self, y: i32) -> Option<(i32, i32, Option<&[u8]>)> {
        if y < self.bounds.top || y >= self.bounds.bottom || self.is_empty() {
            return None;
        }
        let mask_row = self.mask.as_ref().map(|m| {
            let row = m.row((y - self.bounds.top) as u32);
            &row[..self.bounds.width() as usize]
        });
        Some((self.bounds.left, self.bounds.right, mask_row))
    }

    pub fn intersect_rect(&self, rect: IntRect) -> Result<ClipRegion, DeviceError> {
        self.intersect(&ClipRegion::rect(rect))
    }

    /// Intersection of two regions. Coverage combines by minimum, so the
    /// operation is associative and commutative.
    pub fn intersect(&self, other: &ClipRegion) -> Result<ClipRegion, DeviceError> {
        let bounds = self.bounds.intersect(&other.bounds);
        if bounds.is_empty() {
            return Ok(ClipRegion::rect(IntRect::default()));
        }
        if self.mask.is_none() && other.mask.is_none() {
            return Ok(ClipRegion::rect(bounds));
        }
        let mut mask = Bitmap::mask(bounds.width() as u32, bounds.height() as u32)?;
        for y in bounds.top..bounds.bottom {
            let row = mask.row_mut((y - bounds.top) as u32);
            for x in bounds.left..bounds.right {
                row[(x - bounds.left) as usize] = self.coverage(x, y).min(other.coverage(x, y));
            }
        }
        Ok(ClipRegion {
            bounds,
            mask: Some(mask),
        })
    }

    /// Device pixels with nonzero coverage.
    pub fn included_pixels(&self) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        for y in self.bounds.top..self.bounds.bottom {
            for x in self.bounds.left..self.bounds.right {
                if self.coverage(x, y) > 0 {
                    out.push((x, y));
                }
            }
        }
        out
    }
}

fn normalize(rect: IntRect) -> IntRect {
    if rect.is_empty() {
        IntRect::default()
    } else {
        rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_region(rng: &mut fastrand::Rng) -> ClipRegion {
        let left = rng.i32(0..12);
        let top = rng.i32(0..12);
        let rect = IntRect::new(left, top, left + rng.i32(1..12), top + rng.i32(1..12));
        if rng.bool() {
            return ClipRegion::rect(rect);
        }
        let mut mask = Bitmap::mask(rect.width() as u32, rect.height() as u32).unwrap();
        for y in 0..mask.height() {
            for x in 0..mask.width() {
                let value = if rng.bool() { rng.u8(..) } else { 0 };
                mask.set(x, y, value);
            }
        }
        ClipRegion::from_mask(mask, rect.left, rect.top)
    }

    #[test]
    fn intersection_is_associative() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..200 {
            let a = random_region(&mut rng);
            let b = random_region(&mut rng);
            let c = random_region(&mut rng);
            let left = a.intersect(&b).unwrap().intersect(&c).unwrap();
            let right = a.intersect(&b.intersect(&c).unwrap()).unwrap();
            assert_eq!(left.included_pixels(), right.included_pixels());
            for (x, y) in left.included_pixels() {
                assert_eq!(left.coverage(x, y), right.coverage(x, y));
            }
        }
    }

    #[test]
    fn intersection_never_widens() {
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..200 {
            let a = random_region(&mut rng);
            let b = random_region(&mut rng);
            let both = a.intersect(&b).unwrap();
            for (x, y) in both.included_pixels() {
                assert!(both.coverage(x, y) <= a.coverage(x, y));
                assert!(both.coverage(x, y) <= b.coverage(x, y));
            }
        }
    }

    #[test]
    fn disjoint_rects_give_empty_region() {
        let a = ClipRegion::rect(IntRect::new(0, 0, 4, 4));
        let b = a.intersect_rect(IntRect::new(5, 5, 8, 8)).unwrap();
        assert!(b.is_empty());
        assert!(b.row(0).is_none());
    }

    #[test]
    fn mask_rows_are_cropped_to_bounds() {
        let mut mask = Bitmap::mask(4, 1).unwrap();
        mask.row_mut(0).copy_from_slice(&[10, 20, 30, 40]);
        let region = ClipRegion::from_mask(mask, 2, 0);
        let narrowed = region.intersect_rect(IntRect::new(3, 0, 5, 1)).unwrap();
        let (left, right, row) = narrowed.row(0).unwrap();
        assert_eq!((left, right), (3, 5));
        assert_eq!(row.unwrap(), &[20, 30]);
    }
}
