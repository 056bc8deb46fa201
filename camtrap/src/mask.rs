//! # Motion mask
//!
//! Boolean per-pixel grid marking pixels classified as moving, with the
//! pairwise combination, morphological cleanup and connected-region
//! extraction the detection strategies build on.

use crate::error::{Error, Result};
use crate::frame::Frame;
use std::str::FromStr;

/// Policy for merging two pairwise motion signals.
///
/// `And` requires motion in both adjacent-pair signals and suppresses
/// one-frame noise at the cost of sensitivity; `Or` takes the union and
/// favours recall for brief motion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum CombineMode {
    And,
    Or,
}

impl FromStr for CombineMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(Error::Config(format!("unknown combine mode `{other}`"))),
        }
    }
}

/// Axis-aligned bounding rectangle of a connected moving region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    /// Bounding-box area in pixels.
    pub fn area(&self) -> u32 {
        self.w * self.h
    }
}

/// Boolean motion grid.
///
/// A mask always has the exact shape of the base frame it was derived from;
/// frame normalization happens before mask computation, never after.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MotionMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl MotionMask {
    /// Create an all-false mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get width and height of the mask.
    pub fn dim(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.data[y as usize * self.width as usize + x as usize] = value;
    }

    /// Get the underlying row-major grid.
    pub fn data(&self) -> &[bool] {
        &self.data
    }

    /// Number of pixels marked as moving.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    /// Combine two masks of identical shape.
    pub fn combine(&self, other: &Self, mode: CombineMode) -> Result<Self> {
        if self.dim() != other.dim() {
            return Err(Error::shape(self.dim(), other.dim()));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| match mode {
                CombineMode::And => a && b,
                CombineMode::Or => a || b,
            })
            .collect();
        Ok(Self {
            width: self.width,
            height: self.height,
            data,
        })
    }

    /// Erode with a 3x3 structuring element.
    ///
    /// Neighbours outside the mask count as empty, so regions touching the
    /// border shrink away from it.
    pub fn erode(&self, iterations: usize) -> Self {
        self.morph(iterations, false)
    }

    /// Dilate with a 3x3 structuring element.
    pub fn dilate(&self, iterations: usize) -> Self {
        self.morph(iterations, true)
    }

    fn morph(&self, iterations: usize, grow: bool) -> Self {
        let mut cur = self.clone();

        for _ in 0..iterations {
            let mut next = MotionMask::new(self.width, self.height);

            for y in 0..self.height as isize {
                for x in 0..self.width as isize {
                    let neighbor_offs = (-1..=1).flat_map(|x| (-1..=1).map(move |y| (x, y)));

                    let mut hit = !grow;
                    for (nx, ny) in neighbor_offs.map(|(ox, oy)| (x + ox, y + oy)) {
                        let v = (0..self.width as isize).contains(&nx)
                            && (0..self.height as isize).contains(&ny)
                            && cur.get(nx as u32, ny as u32);
                        hit = if grow { hit || v } else { hit && v };
                    }
                    next.set(x as u32, y as u32, hit);
                }
            }

            cur = next;
        }

        cur
    }

    /// Extract bounding rectangles of 8-connected regions.
    ///
    /// Regions whose bounding-box area is below `min_area` are discarded.
    /// Rectangles are yielded in scan order of their first visited pixel.
    pub fn regions(&self, min_area: u32) -> Vec<Region> {
        let width = self.width as isize;
        let height = self.height as isize;

        // Flood fill on a scratch copy, tracking the bounding box of every
        // connected component.
        let mut map = self.data.clone();
        let mut out = vec![];

        for y in 0..height {
            for x in 0..width {
                if !map[(y * width + x) as usize] {
                    continue;
                }

                map[(y * width + x) as usize] = false;
                let mut to_fill = vec![(x, y); 1];
                let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);

                while let Some((x, y)) = to_fill.pop() {
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);

                    let neighbor_offs = (-1..=1).flat_map(|x| (-1..=1).map(move |y| (x, y)));

                    for (x, y) in neighbor_offs
                        .map(|(ox, oy)| (x + ox, y + oy))
                        .filter(|&(x, y)| (0..width).contains(&x) && (0..height).contains(&y))
                    {
                        if map[(y * width + x) as usize] {
                            map[(y * width + x) as usize] = false;
                            to_fill.push((x, y));
                        }
                    }
                }

                let region = Region {
                    x: min_x as u32,
                    y: min_y as u32,
                    w: (max_x - min_x + 1) as u32,
                    h: (max_y - min_y + 1) as u32,
                };

                if region.area() >= min_area {
                    out.push(region);
                }
            }
        }

        out
    }

    /// Render the mask as a 0/255 grayscale frame (three equal channels).
    pub fn to_frame(&self) -> Frame {
        let mut data = Vec::with_capacity(self.data.len() * Frame::CHANNELS);
        for &m in &self.data {
            let v = if m { 255 } else { 0 };
            data.extend_from_slice(&[v, v, v]);
        }
        Frame::from_raw(self.width, self.height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&[u8]]) -> MotionMask {
        let mut mask = MotionMask::new(rows[0].len() as u32, rows.len() as u32);
        for (y, row) in rows.iter().enumerate() {
            for (x, &v) in row.iter().enumerate() {
                mask.set(x as u32, y as u32, v != 0);
            }
        }
        mask
    }

    #[test]
    fn or_is_superset_of_and() {
        let a = mask_from_rows(&[&[1, 0, 1, 0], &[0, 1, 1, 0], &[1, 1, 0, 0]]);
        let b = mask_from_rows(&[&[0, 0, 1, 1], &[0, 1, 0, 0], &[1, 0, 0, 1]]);

        let anded = a.combine(&b, CombineMode::And).unwrap();
        let ored = a.combine(&b, CombineMode::Or).unwrap();

        for (o, n) in ored.data().iter().zip(anded.data()) {
            assert!(*o || !*n);
        }
        assert!(ored.count() >= anded.count());
    }

    #[test]
    fn combine_rejects_mismatched_shapes() {
        let a = MotionMask::new(4, 4);
        let b = MotionMask::new(4, 5);
        assert!(matches!(
            a.combine(&b, CombineMode::Or),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn erosion_removes_isolated_pixels() {
        let mut mask = MotionMask::new(7, 7);
        mask.set(3, 3, true);

        assert_eq!(mask.erode(1).count(), 0);
    }

    #[test]
    fn erode_then_dilate_keeps_solid_blocks() {
        let mut mask = MotionMask::new(9, 9);
        for y in 1..8 {
            for x in 1..8 {
                mask.set(x, y, true);
            }
        }
        // Lone noise pixel far from the block is not present here; the solid
        // block must survive one round-trip with its interior intact.
        let cleaned = mask.erode(1).dilate(1);
        for y in 2..7 {
            for x in 2..7 {
                assert!(cleaned.get(x, y));
            }
        }
    }

    #[test]
    fn regions_report_bounding_boxes() {
        let mut mask = MotionMask::new(12, 8);
        for y in 2..5 {
            for x in 3..7 {
                mask.set(x, y, true);
            }
        }
        mask.set(10, 7, true);

        let regions = mask.regions(0);
        assert_eq!(regions.len(), 2);
        assert_eq!(
            regions[0],
            Region {
                x: 3,
                y: 2,
                w: 4,
                h: 3,
            }
        );
        assert_eq!(
            regions[1],
            Region {
                x: 10,
                y: 7,
                w: 1,
                h: 1,
            }
        );
    }

    #[test]
    fn small_regions_are_discarded() {
        let mut mask = MotionMask::new(12, 8);
        for y in 2..5 {
            for x in 3..7 {
                mask.set(x, y, true);
            }
        }
        mask.set(10, 7, true);

        let regions = mask.regions(4);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area(), 12);
    }

    #[test]
    fn diagonal_pixels_form_one_region() {
        let mut mask = MotionMask::new(5, 5);
        mask.set(1, 1, true);
        mask.set(2, 2, true);
        mask.set(3, 3, true);

        assert_eq!(mask.regions(0).len(), 1);
    }

    #[test]
    fn mask_frame_is_binary() {
        let mut mask = MotionMask::new(3, 2);
        mask.set(1, 0, true);

        let frame = mask.to_frame();
        assert_eq!(frame.dim(), (3, 2));
        assert_eq!(frame.pixel(1, 0), crate::frame::Rgb::WHITE);
        assert_eq!(frame.pixel(0, 0), crate::frame::Rgb::BLACK);
    }
}
