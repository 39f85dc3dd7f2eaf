//! Error type for filesystem collaborators.

use std::path::PathBuf;

use zmontage_pipeline::PipelineError;

/// Errors from reading stacks, writing tiles, and loading config or fonts.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// A user-supplied path does not point where it must.
    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The TIFF decoder rejected the file.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// A PNG could not be encoded or decoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid `MontageConfig` JSON.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A font file could not be parsed.
    #[error("invalid font {}: {reason}", path.display())]
    Font {
        /// Font file path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// The stack's pages cannot be arranged into planes and channels.
    #[error("unsupported stack layout: {0}")]
    UnsupportedLayout(String),
}

impl From<IoError> for PipelineError {
    fn from(error: IoError) -> Self {
        match error {
            IoError::Io(e) => Self::Io(e),
            IoError::Image(e) => Self::ImageDecode(e),
            other => Self::Source(other.to_string()),
        }
    }
}
