//! A directory of PNG files as a [`RasterStore`].
//!
//! Each entry `name` lives at `<dir>/<name>.png`. PNG is lossless, so a
//! tile reads back exactly as it was written.

use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use zmontage_pipeline::{PipelineError, RasterStore, RgbImage};

use crate::error::IoError;

const EXTENSION: &str = "png";

/// PNG files in one directory.
#[derive(Debug, Clone)]
pub struct PngDirectoryStore {
    dir: PathBuf,
}

impl PngDirectoryStore {
    /// Use `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidPath`] if `dir` exists but is not a
    /// directory, or [`IoError::Io`] if it cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, IoError> {
        let dir = dir.into();
        if dir.exists() && !dir.is_dir() {
            return Err(IoError::InvalidPath {
                path: dir,
                reason: "not a directory",
            });
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The backing directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path of the entry `name`.
    #[must_use]
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{EXTENSION}"))
    }

    fn checked_path(&self, name: &str) -> Result<PathBuf, PipelineError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(PipelineError::Source(format!(
                "{name:?} is not a valid raster name"
            )));
        }
        Ok(self.path_of(name))
    }
}

impl RasterStore for PngDirectoryStore {
    fn save(&mut self, name: &str, raster: &RgbImage) -> Result<(), PipelineError> {
        let path = self.checked_path(name)?;
        raster.save_with_format(&path, ImageFormat::Png)?;
        tracing::trace!(path = %path.display(), "wrote PNG");
        Ok(())
    }

    fn load(&mut self, name: &str) -> Result<RgbImage, PipelineError> {
        let path = self.checked_path(name)?;
        let image = image::ImageReader::open(&path)?
            .with_guessed_format()?
            .decode()?;
        Ok(image.into_rgb8())
    }

    fn list(&mut self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && stem.starts_with(prefix)
            {
                names.push(stem.to_owned());
            }
        }
        Ok(names)
    }

    fn remove(&mut self, name: &str) -> Result<(), PipelineError> {
        fs::remove_file(self.checked_path(name)?)?;
        Ok(())
    }
}
