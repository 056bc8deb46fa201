//! # Error taxonomy
//!
//! Per-group errors (`Decode`, `ShapeMismatch`, `Write`) are contained at the
//! batch boundary and never abort a whole run; only `Config` is fatal, and
//! only before any batch work begins.

use std::path::PathBuf;

/// Result alias over [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

/// All failure modes of the detection pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input file missing or not decodable as an image. The owning group is
    /// skipped.
    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Two inputs of a pairwise computation disagree in dimensions. Fatal to
    /// the group, not retried.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (u32, u32),
        got: (u32, u32),
    },

    /// An output artifact could not be written. The owning group is marked
    /// failed.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Invalid configuration, rejected at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Shape mismatch between an expected and an actual dimension pair.
    pub fn shape(expected: (u32, u32), got: (u32, u32)) -> Self {
        Self::ShapeMismatch { expected, got }
    }
}
