//! Error type shared by every layer operation.

use crate::backend::Backend;
use crate::blob::BlobShape;
use core::fmt;
use thiserror::Error;

/// A blob axis, used to report which dimension disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Batch size `N`.
    Num,
    /// Channels.
    Channels,
    /// Height.
    Height,
    /// Width.
    Width,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Num => "num",
            Self::Channels => "channels",
            Self::Height => "height",
            Self::Width => "width",
        })
    }
}

/// Errors raised while validating or running a layer.
///
/// Every variant is a caller error detected before any numerical work. Numerical
/// singularities in the backward pass are not errors: they surface as
/// non-finite gradients.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayerError {
    #[error("shape mismatch on {axis}: first input has {first}, second input has {second}")]
    ShapeMismatch {
        axis: Axis,
        first: usize,
        second: usize,
    },

    #[error("expected {expected} bottom blobs, found {found}")]
    BottomCount { expected: usize, found: usize },

    #[error("expected {expected} propagate flags, found {found}")]
    PropagateCount { expected: usize, found: usize },

    #[error("batch is empty: at least one example is required")]
    EmptyBatch,

    #[error("invalid blob shape {0}: channels, height and width must be non-zero")]
    InvalidShape(BlobShape),

    #[error("buffer length mismatch: expected {expected} elements, found {found}")]
    BufferLength { expected: usize, found: usize },

    #[error("{op} is not implemented for the {backend} backend in this build")]
    NotImplemented { backend: Backend, op: &'static str },
}
