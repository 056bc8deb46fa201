//! # Trail-camera motion detection core
//!
//! This library provides the shared types and contracts for detecting motion
//! across ordered triples of consecutive still-camera frames. Detection
//! strategies implement the [`Detector`](detector::Detector) trait and are
//! selected by configuration rather than subclassing.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use camtrap::prelude::v1::*;
//! ```

pub mod compositor;
pub mod detector;
pub mod error;
pub mod flow;
pub mod frame;
pub mod grouper;
pub mod mask;
pub mod triple;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            compositor::{composite, OverlayStyle},
            detector::{DetectionConfig, DetectionResult, Detector, FlowProfile, Strategy},
            error::{Error, Result},
            flow::FlowField,
            frame::{Frame, LuminanceFrame, Rgb},
            grouper::{GroupingMode, SkippedGroup, TripleGroup},
            mask::{CombineMode, MotionMask, Region},
            triple::FrameTriple,
        };
    }
}
