//! ImageJ hyperstack metadata carried in a TIFF `ImageDescription`.
//!
//! ImageJ writes a newline-separated `key=value` list whose first entry is
//! `ImageJ=<version>`:
//!
//! ```text
//! ImageJ=1.54f
//! images=24
//! channels=2
//! slices=4
//! frames=3
//! hyperstack=true
//! unit=micron
//! ```
//!
//! Pages are stored channel fastest, then slice, then frame.

use crate::error::IoError;

/// Hyperstack dimensions and unit from an ImageJ description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJMetadata {
    /// Total page count, if stated.
    pub images: Option<u32>,
    /// Channels per slice.
    pub channels: u32,
    /// Depth planes.
    pub slices: u32,
    /// Time points.
    pub frames: u32,
    /// Spatial unit, if stated.
    pub unit: Option<String>,
}

impl ImageJMetadata {
    /// Parse `description`, or return `None` when it was not written by
    /// ImageJ.
    #[must_use]
    pub fn parse(description: &str) -> Option<Self> {
        let mut lines = description.lines();
        if !lines.next()?.starts_with("ImageJ=") {
            return None;
        }

        let mut meta = Self {
            images: None,
            channels: 1,
            slices: 1,
            frames: 1,
            unit: None,
        };
        let mut slices_stated = false;
        for line in lines {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            let count = || value.parse::<u32>().ok().filter(|&n| n > 0);
            match key.trim() {
                "images" => meta.images = count(),
                "channels" => meta.channels = count().unwrap_or(1),
                "slices" => {
                    meta.slices = count().unwrap_or(1);
                    slices_stated = true;
                }
                "frames" => meta.frames = count().unwrap_or(1),
                "unit" => meta.unit = Some(unescape(value)),
                _ => {}
            }
        }

        // A plain stack states only `images`; every page is a slice.
        if !slices_stated
            && meta.channels == 1
            && meta.frames == 1
            && let Some(images) = meta.images
        {
            meta.slices = images;
        }
        Some(meta)
    }

    /// Pages the stated dimensions account for.
    #[must_use]
    pub const fn page_count(&self) -> u64 {
        self.channels as u64 * self.slices as u64 * self.frames as u64
    }

    /// Check the dimensions against the number of pages in the file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnsupportedLayout`] when the file has fewer
    /// pages than the dimensions require.
    pub fn check_pages(&self, pages: usize) -> Result<(), IoError> {
        if (pages as u64) < self.page_count() {
            return Err(IoError::UnsupportedLayout(format!(
                "{} channels x {} slices x {} frames need {} pages, file has {pages}",
                self.channels,
                self.slices,
                self.frames,
                self.page_count()
            )));
        }
        Ok(())
    }

    /// Page index (0-based) of the 1-based `slice` and `channel` in the
    /// first frame.
    #[must_use]
    pub const fn page_index(&self, slice: u32, channel: u32) -> usize {
        ((slice - 1) * self.channels + (channel - 1)) as usize
    }
}

/// ImageJ escapes `µ` as `\u00B5`.
fn unescape(value: &str) -> String {
    value.replace("\\u00B5", "µ").replace("\\u00b5", "µ")
}
