//! CLI error taxonomy and exit codes.

use std::path::PathBuf;
use std::process::ExitCode;

use zmontage_io::IoError;
use zmontage_pipeline::PipelineError;

/// Everything that ends a CLI run early.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The user dismissed a prompt.
    #[error("cancelled by user")]
    UserCancelled,

    /// An input file or output directory is missing or of the wrong kind.
    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath {
        /// The offending path (empty when none was given).
        path: PathBuf,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The montage could not be built.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Reading the stack, a font, or the terminal failed.
    #[error(transparent)]
    Io(IoError),

    /// A configuration file or `--config-json` is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The run report could not be written as JSON.
    #[error("could not serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code: 2 for cancellation, 1 for any failure.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::UserCancelled => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}

impl From<IoError> for CliError {
    fn from(error: IoError) -> Self {
        match error {
            IoError::InvalidPath { path, reason } => Self::InvalidPath { path, reason },
            IoError::Config(e) => Self::Config(e.to_string()),
            other => Self::Io(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(IoError::Io(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_path_errors_surface_as_invalid_paths() {
        let error = CliError::from(IoError::InvalidPath {
            path: PathBuf::from("/nope.tif"),
            reason: "not an existing file",
        });
        assert!(matches!(error, CliError::InvalidPath { .. }));
        assert_eq!(
            error.to_string(),
            "invalid path /nope.tif: not an existing file"
        );
    }

    #[test]
    fn only_cancellation_exits_with_two() {
        assert_eq!(CliError::UserCancelled.exit_code(), ExitCode::from(2));
        assert_eq!(
            CliError::Config("bad".to_owned()).exit_code(),
            ExitCode::FAILURE
        );
    }
}
