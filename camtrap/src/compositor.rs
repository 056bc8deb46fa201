//! # Overlay compositing
//!
//! Renders a detection result onto a base frame. The compositor never
//! mutates the base frame buffer; every style yields a fresh frame of the
//! same dimensions and channel count, suitable for downstream consumers.

use crate::detector::DetectionResult;
use crate::error::{Error, Result};
use crate::frame::{Frame, Rgb};
use crate::mask::{MotionMask, Region};

/// Rendering style for a detection result.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum OverlayStyle {
    /// Overwrite masked pixels with the highlight colour.
    Replace { color: Rgb },
    /// Weighted blend of the base frame with a colour layer that is coloured
    /// only at masked pixels: `out = base * (1 - alpha) + layer * alpha`.
    Blend { color: Rgb, alpha: f32 },
    /// Outline each extracted region on a copy of the base frame.
    Boxes { color: Rgb, thickness: u32 },
}

/// Render a detection result onto a base frame.
///
/// Fails with [`Error::ShapeMismatch`] when the mask does not have the base
/// frame's exact shape.
///
/// # Arguments
///
/// * `base` - frame the overlay is rendered onto; never mutated.
/// * `result` - detection result to render.
/// * `style` - rendering style.
pub fn composite(base: &Frame, result: &DetectionResult, style: &OverlayStyle) -> Result<Frame> {
    if base.dim() != result.mask.dim() {
        return Err(Error::shape(base.dim(), result.mask.dim()));
    }

    Ok(match *style {
        OverlayStyle::Replace { color } => replace(base, &result.mask, color),
        OverlayStyle::Blend { color, alpha } => blend(base, &result.mask, color, alpha),
        OverlayStyle::Boxes { color, thickness } => boxes(
            base,
            result.regions.as_deref().unwrap_or(&[]),
            color,
            thickness,
        ),
    })
}

fn replace(base: &Frame, mask: &MotionMask, color: Rgb) -> Frame {
    let mut data = base.data().to_vec();

    for (i, _) in mask.data().iter().enumerate().filter(|(_, &m)| m) {
        data[i * Frame::CHANNELS..(i + 1) * Frame::CHANNELS]
            .copy_from_slice(&[color.r, color.g, color.b]);
    }

    Frame::from_raw(base.width(), base.height(), data)
}

fn blend(base: &Frame, mask: &MotionMask, color: Rgb, alpha: f32) -> Frame {
    let mut data = Vec::with_capacity(base.data().len());

    for (pixel, &m) in base.pixels().zip(mask.data()) {
        let layer = if m { color } else { Rgb::BLACK };
        data.push(mix(pixel.r, layer.r, alpha));
        data.push(mix(pixel.g, layer.g, alpha));
        data.push(mix(pixel.b, layer.b, alpha));
    }

    Frame::from_raw(base.width(), base.height(), data)
}

fn mix(base: u8, layer: u8, alpha: f32) -> u8 {
    (base as f32 * (1.0 - alpha) + layer as f32 * alpha)
        .round()
        .clamp(0.0, 255.0) as u8
}

fn boxes(base: &Frame, regions: &[Region], color: Rgb, thickness: u32) -> Frame {
    let mut data = base.data().to_vec();
    let (width, height) = base.dim();

    let mut put = |x: u32, y: u32| {
        if x < width && y < height {
            let idx = (y as usize * width as usize + x as usize) * Frame::CHANNELS;
            data[idx..idx + Frame::CHANNELS].copy_from_slice(&[color.r, color.g, color.b]);
        }
    };

    for region in regions {
        // Outlines grow inward so thick strokes never spill past the region.
        for t in 0..thickness {
            if region.w <= t * 2 || region.h <= t * 2 {
                break;
            }
            let (x0, y0) = (region.x + t, region.y + t);
            let (x1, y1) = (region.x + region.w - 1 - t, region.y + region.h - 1 - t);

            for x in x0..=x1 {
                put(x, y0);
                put(x, y1);
            }
            for y in y0..=y1 {
                put(x0, y);
                put(x1, y);
            }
        }
    }

    Frame::from_raw(width, height, data)
}
