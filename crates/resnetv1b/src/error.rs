//! # Errors
//!
//! Configuration errors raised while planning or building a model.
//!
//! Shape errors are not represented here; they surface from ``burn``
//! (or, in debug builds, from shape contracts) when a graph is run.

use thiserror::Error;

/// The error type for `ResNetV1b` configuration and construction.
#[derive(Error, Debug)]
pub enum ResNetV1bError {
    /// A stage was asked for a dilation outside of ``{1, 2, 4}``.
    #[error("unknown dilation size {dilation} for stage {stage}; expected one of [1, 2, 4]")]
    UnsupportedDilation {
        /// The 1-based stage index.
        stage: usize,
        /// The requested dilation.
        dilation: usize,
    },

    /// A stage was asked for zero blocks.
    #[error("stage {stage} has no blocks")]
    EmptyStage {
        /// The 1-based stage index.
        stage: usize,
    },

    /// An override key was not recognized.
    #[error("unknown {scope} option: {key:?}")]
    UnknownOption {
        /// Which option set was being parsed.
        scope: &'static str,
        /// The offending key.
        key: String,
    },

    /// Override values were structurally invalid.
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] serde_json::Error),

    /// A variant name did not match any preset.
    #[error("unknown ResNetV1b variant: {0:?}")]
    UnknownVariant(String),
}

/// A specialized `Result` type for `ResNetV1b` operations.
pub type Result<T> = std::result::Result<T, ResNetV1bError>;
