//! # Frame triples

use crate::error::{Error, Result};
use crate::frame::Frame;

/// Ordered group of three consecutive frames sharing one group key.
///
/// A triple is valid once all three members decoded successfully and, after
/// [`normalized`](Self::normalized), share identical dimensions. Triples are
/// constructed per batch iteration, consumed by one detection and composite
/// pass, and then dropped.
pub struct FrameTriple {
    key: String,
    frames: [Frame; 3],
}

impl FrameTriple {
    /// Assemble a triple from decoded frames in capture order.
    pub fn new(key: impl Into<String>, earliest: Frame, middle: Frame, latest: Frame) -> Self {
        Self {
            key: key.into(),
            frames: [earliest, middle, latest],
        }
    }

    /// Group key the triple was assembled under.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn earliest(&self) -> &Frame {
        &self.frames[0]
    }

    pub fn middle(&self) -> &Frame {
        &self.frames[1]
    }

    pub fn latest(&self) -> &Frame {
        &self.frames[2]
    }

    /// Dimensions of the reference (earliest) frame.
    pub fn dim(&self) -> (u32, u32) {
        self.frames[0].dim()
    }

    /// Resize the second and third frame to the first frame's dimensions.
    ///
    /// The earliest frame is the authoritative reference size.
    pub fn normalized(self) -> Self {
        let Self { key, frames } = self;
        let [first, second, third] = frames;
        let (width, height) = first.dim();

        let second = second.resize(width, height);
        let third = third.resize(width, height);

        Self {
            key,
            frames: [first, second, third],
        }
    }

    /// Verify all members share identical dimensions.
    pub fn ensure_uniform(&self) -> Result<()> {
        let expected = self.frames[0].dim();

        for frame in &self.frames[1..] {
            if frame.dim() != expected {
                return Err(Error::shape(expected, frame.dim()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rgb;

    #[test]
    fn normalization_resizes_to_first_frame() {
        let triple = FrameTriple::new(
            "t",
            Frame::filled(8, 6, Rgb::BLACK),
            Frame::filled(16, 12, Rgb::WHITE),
            Frame::filled(4, 3, Rgb::RED),
        );

        assert!(triple.ensure_uniform().is_err());

        let triple = triple.normalized();
        assert!(triple.ensure_uniform().is_ok());
        assert_eq!(triple.middle().dim(), (8, 6));
        assert_eq!(triple.latest().dim(), (8, 6));
    }

    #[test]
    fn uniform_triple_passes_checks() {
        let frame = Frame::filled(8, 6, Rgb::BLACK);
        let triple = FrameTriple::new("t", frame.clone(), frame.clone(), frame);
        assert!(triple.ensure_uniform().is_ok());
        assert_eq!(triple.dim(), (8, 6));
    }
}
