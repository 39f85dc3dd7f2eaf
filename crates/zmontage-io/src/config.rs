//! Loading [`MontageConfig`] files, fonts, and user-supplied paths.

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::FontArc;
use zmontage_pipeline::MontageConfig;

use crate::error::IoError;

/// Parse a JSON configuration; missing fields take their defaults.
///
/// # Errors
///
/// Returns [`IoError::Config`] if `json` is not a valid configuration.
pub fn parse_config(json: &str) -> Result<MontageConfig, IoError> {
    Ok(serde_json::from_str(json)?)
}

/// Read and parse a JSON configuration file.
///
/// # Errors
///
/// Returns [`IoError::InvalidPath`] if `path` is not a file,
/// [`IoError::Io`] if it cannot be read, and [`IoError::Config`] if its
/// contents are not a valid configuration.
pub fn load_config(path: &Path) -> Result<MontageConfig, IoError> {
    let path = existing_file(path)?;
    let config = parse_config(&fs::read_to_string(path)?)?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Load a TrueType or OpenType font for scale-bar labels.
///
/// # Errors
///
/// Returns [`IoError::InvalidPath`] if `path` is not a file and
/// [`IoError::Font`] if it is not a usable font.
pub fn load_font(path: &Path) -> Result<FontArc, IoError> {
    let bytes = fs::read(existing_file(path)?)?;
    FontArc::try_from_vec(bytes).map_err(|e| IoError::Font {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// Check that `path` names an existing regular file.
///
/// # Errors
///
/// Returns [`IoError::InvalidPath`] otherwise.
pub fn existing_file(path: &Path) -> Result<&Path, IoError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(IoError::InvalidPath {
            path: path.to_owned(),
            reason: "not an existing file",
        })
    }
}

/// Directory for tiles and the montage of `input`: `output_dir` when
/// given, otherwise the directory holding `input`.
#[must_use]
pub fn output_dir_for(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    output_dir.map_or_else(
        || {
            input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_owned)
        },
        Path::to_owned,
    )
}

/// File name of `input` without its extension, for naming the montage.
#[must_use]
pub fn source_stem(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    // `name.ome.tif` keeps its base name.
    stem.strip_suffix(".ome").map_or(stem.clone(), str::to_owned)
}
