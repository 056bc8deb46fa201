//! # Dense optical flow field

use crate::mask::MotionMask;
use nalgebra::{Matrix2xX, Vector2};

/// Per-pixel 2D displacement field between two time-adjacent frames.
///
/// Displacements are stored in pixel units. A field is owned by the detect
/// call that produced it and is discarded after mask extraction.
pub struct FlowField {
    vf: Matrix2xX<f32>,
    width: u32,
}

impl FlowField {
    /// Create a new zero flow field.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the field.
    /// * `height` - height of the field.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            vf: Matrix2xX::repeat(width as usize * height as usize, 0f32),
            width,
        }
    }

    /// Get width and height of the flow field.
    pub fn dim(&self) -> (u32, u32) {
        if self.width == 0 {
            (0, 0)
        } else {
            (self.width, (self.vf.ncols() / self.width as usize) as u32)
        }
    }

    /// Get size of the flow field.
    ///
    /// This is the same as `width * height`.
    pub fn size(&self) -> usize {
        self.vf.ncols()
    }

    /// Set displacement at given position.
    ///
    /// # Arguments
    ///
    /// * `x` - horizontal coordinate to set at.
    /// * `y` - vertical coordinate to set at.
    /// * `motion` - displacement to set, in pixels.
    pub fn set_motion(&mut self, x: u32, y: u32, motion: Vector2<f32>) {
        self.vf
            .set_column(self.width as usize * y as usize + x as usize, &motion);
    }

    /// Get displacement at coordinates.
    pub fn get_motion(&self, x: u32, y: u32) -> Vector2<f32> {
        self.vf
            .column(self.width as usize * y as usize + x as usize)
            .into()
    }

    /// Euclidean magnitude of the displacement at coordinates.
    pub fn magnitude(&self, x: u32, y: u32) -> f32 {
        self.get_motion(x, y).magnitude()
    }

    /// Iterate every element of the flow field.
    ///
    /// The resulting iterator yields `(x, y, motion)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, Vector2<f32>)> + '_ {
        let (width, height) = self.dim();
        (0..height).flat_map(move |y| (0..width).map(move |x| (x, y, self.get_motion(x, y))))
    }

    /// Threshold displacement magnitudes into a motion mask.
    ///
    /// A pixel is marked as moving when its magnitude strictly exceeds
    /// `threshold`.
    pub fn to_mask(&self, threshold: f32) -> MotionMask {
        let (width, height) = self.dim();
        let mut mask = MotionMask::new(width, height);

        self.iter()
            .filter(|(_, _, motion)| motion.magnitude() > threshold)
            .for_each(|(x, y, _)| mask.set(x, y, true));

        mask
    }
}
