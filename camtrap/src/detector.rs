//! # Motion detection contract

use crate::error::{Error, Result};
use crate::mask::{CombineMode, MotionMask, Region};
use crate::triple::FrameTriple;
use std::str::FromStr;

/// Detection strategy selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum Strategy {
    /// Dense optical-flow magnitude thresholding.
    Flow,
    /// Multi-frame luminance differencing.
    Difference,
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flow" => Ok(Self::Flow),
            "difference" | "diff" => Ok(Self::Difference),
            other => Err(Error::Config(format!("unknown strategy `{other}`"))),
        }
    }
}

/// Tuning profile of the pyramidal flow estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct FlowProfile {
    /// Side length of the local estimation window.
    pub window: u32,
    /// Number of pyramid levels.
    pub levels: u32,
    /// Refinement iterations per level.
    pub iterations: u32,
}

impl Default for FlowProfile {
    fn default() -> Self {
        Self {
            window: 15,
            levels: 3,
            iterations: 35,
        }
    }
}

/// Immutable process-wide detection configuration.
///
/// Set once at startup and shared read-only across workers for the whole
/// run.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct DetectionConfig {
    pub strategy: Strategy,
    /// Combination of the two adjacent-pair motion signals.
    pub combine: CombineMode,
    /// Magnitude threshold in pixels (flow) or intensity threshold in the
    /// 0-255 domain (difference).
    pub threshold: f32,
    /// Erode-then-dilate cleanup of the difference mask.
    pub morphology: bool,
    /// Iterations for each morphological pass.
    pub morph_iterations: u32,
    /// Region extraction gate: connected regions whose bounding-box area is
    /// below this are discarded. `None` disables extraction.
    pub min_region_area: Option<u32>,
    pub flow: FlowProfile,
}

impl DetectionConfig {
    /// Default minimum bounding-box area for region extraction.
    pub const DEFAULT_MIN_REGION_AREA: u32 = 225;

    /// Strategy-appropriate defaults.
    ///
    /// Flow combines the two legs with AND at magnitude threshold 1.0;
    /// difference combines with OR at intensity threshold 25.
    pub fn new(strategy: Strategy) -> Self {
        let (combine, threshold) = match strategy {
            Strategy::Flow => (CombineMode::And, 1.0),
            Strategy::Difference => (CombineMode::Or, 25.0),
        };

        Self {
            strategy,
            combine,
            threshold,
            morphology: false,
            morph_iterations: 2,
            min_region_area: None,
            flow: FlowProfile::default(),
        }
    }

    /// Validate the configuration. Errors here are fatal at startup, before
    /// any batch work begins.
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(Error::Config(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }

        if self.morphology && self.morph_iterations == 0 {
            return Err(Error::Config(
                "morphology enabled with zero iterations".into(),
            ));
        }

        if self.strategy == Strategy::Flow {
            let FlowProfile {
                window,
                levels,
                iterations,
            } = self.flow;
            if window == 0 || levels == 0 || iterations == 0 {
                return Err(Error::Config(format!(
                    "flow profile parameters must be nonzero, got window {window}, \
                     levels {levels}, iterations {iterations}"
                )));
            }
        }

        Ok(())
    }
}

/// Dense mask plus the bounding rectangles of moving regions, when region
/// extraction was enabled.
pub struct DetectionResult {
    pub mask: MotionMask,
    pub regions: Option<Vec<Region>>,
}

/// Generic triple motion detector.
///
/// Implementations are pure functions of their inputs: no hidden state, and
/// byte-identical masks for identical pixel buffers and configuration.
pub trait Detector {
    /// Compute a motion mask for an ordered frame triple.
    ///
    /// Fails with [`Error::ShapeMismatch`] when the triple members disagree
    /// in dimensions; callers are expected to have normalized the triple.
    fn detect(&self, triple: &FrameTriple) -> Result<DetectionResult>;
}
