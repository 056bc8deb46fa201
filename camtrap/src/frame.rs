//! # Frame storage and luminance projection

use crate::error::{Error, Result};
use bytemuck::{Pod, Zeroable};
use image::{imageops, RgbImage};
use std::path::Path;

/// RGB colour structure.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };
    pub const WHITE: Self = Self { r: 255, g: 255, b: 255 };
    pub const RED: Self = Self { r: 255, g: 0, b: 0 };
    pub const GREEN: Self = Self { r: 0, g: 255, b: 0 };
    pub const BLUE: Self = Self { r: 0, g: 0, b: 255 };

    /// Convert from a slice containing `[r, g, b]` elements.
    pub fn from_slice(rgb: &[u8]) -> Self {
        Self {
            r: rgb[0],
            g: rgb[1],
            b: rgb[2],
        }
    }
}

/// A decoded 3-channel 8-bit frame.
///
/// Frames are immutable once loaded; every transforming operation returns a
/// new frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Number of channels in a frame buffer.
    pub const CHANNELS: usize = 3;

    /// Create a frame from a row-major RGB8 buffer.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the frame.
    /// * `height` - height of the frame.
    /// * `data` - row-major buffer of `width * height * 3` bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width as usize * height as usize * Self::CHANNELS,
            "raw buffer does not match frame dimensions"
        );
        Self {
            width,
            height,
            data,
        }
    }

    /// Create a frame filled with a single colour.
    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        let data = std::iter::repeat([color.r, color.g, color.b])
            .take(width as usize * height as usize)
            .flatten()
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Decode a frame from an image file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|source| Error::Decode {
                path: path.into(),
                source,
            })?
            .into_rgb8();
        let (width, height) = img.dimensions();
        Ok(Self {
            width,
            height,
            data: img.into_raw(),
        })
    }

    /// Encode the frame to a file. The format is picked from the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.to_image().save(path).map_err(|source| Error::Write {
            path: path.into(),
            source,
        })
    }

    fn to_image(&self) -> RgbImage {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .expect("frame buffer matches its dimensions")
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get width and height of the frame.
    pub fn dim(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the underlying row-major RGB8 buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the pixel at given coordinates.
    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let idx = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Rgb::from_slice(&self.data[idx..idx + Self::CHANNELS])
    }

    /// Iterate pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Rgb> + '_ {
        bytemuck::cast_slice::<_, Rgb>(&self.data).iter().copied()
    }

    /// Bilinearly resize the frame, returning a new one.
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if (width, height) == self.dim() {
            return self.clone();
        }
        let resized = imageops::resize(
            &self.to_image(),
            width,
            height,
            imageops::FilterType::Triangle,
        );
        Self {
            width,
            height,
            data: resized.into_raw(),
        }
    }

    /// Project the frame to single-channel luminance.
    pub fn to_luminance(&self) -> LuminanceFrame {
        LuminanceFrame::from_frame(self)
    }
}

/// Single-channel intensity projection of a [`Frame`].
///
/// Projection uses BT.601 luma weights and is deterministic: identical
/// frames project to identical luminance. A luminance frame is never mutated
/// after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LuminanceFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl LuminanceFrame {
    /// Project a frame to luminance.
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            data: frame.pixels().map(luma).collect(),
        }
    }

    /// Create a luminance frame from a raw single-channel buffer.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width as usize * height as usize,
            "raw buffer does not match frame dimensions"
        );
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get width and height of the frame.
    pub fn dim(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the underlying row-major buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the intensity at given coordinates.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Per-pixel absolute difference against another luminance frame.
    ///
    /// Fails with [`Error::ShapeMismatch`] when the two frames disagree in
    /// dimensions.
    pub fn abs_diff(&self, other: &Self) -> Result<Self> {
        if self.dim() != other.dim() {
            return Err(Error::shape(self.dim(), other.dim()));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| a.abs_diff(b))
            .collect();
        Ok(Self {
            width: self.width,
            height: self.height,
            data,
        })
    }
}

/// Integer BT.601 luma, rounded.
fn luma(p: Rgb) -> u8 {
    ((p.r as u32 * 299 + p.g as u32 * 587 + p.b as u32 * 114 + 500) / 1000) as u8
}
