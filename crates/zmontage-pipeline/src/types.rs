//! Shared types for the zmontage pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::selection::{SelectionError, SelectionKind, SliceSelection};

/// Re-export `GrayImage` so downstream crates can hand single-channel
/// rasters to the pipeline without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage`; every materialized tile and the final montage
/// are RGB rasters.
pub use image::RgbImage;

/// Unit label that marks a stack as spatially uncalibrated.
pub const UNCALIBRATED_UNIT: &str = "pixels";

/// Unit labels that carry no physical size. ImageJ writes `pixel`.
const PIXEL_UNITS: [&str; 2] = ["pixel", UNCALIBRATED_UNIT];

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: image::Pixel, C: std::ops::Deref<Target = [P::Subpixel]>>(
        image: &image::ImageBuffer<P, C>,
    ) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

/// Mapping from pixels to physical distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Physical size of one pixel along x, in `unit`s.
    pub pixel_width: f64,
    /// Physical unit label as stored in the source (`"micron"`, `"nm"`, ...).
    pub unit: String,
}

impl Calibration {
    /// A calibration carrying no physical information.
    #[must_use]
    pub fn uncalibrated() -> Self {
        Self {
            pixel_width: 1.0,
            unit: UNCALIBRATED_UNIT.to_owned(),
        }
    }

    /// Whether a scale bar can be derived from this calibration.
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        !self.unit.is_empty()
            && !PIXEL_UNITS
                .iter()
                .any(|unit| self.unit.eq_ignore_ascii_case(unit))
            && self.pixel_width.is_finite()
            && self.pixel_width > 0.0
    }

    /// Unit label as shown on the scale bar.
    #[must_use]
    pub fn display_unit(&self) -> &str {
        match self.unit.as_str() {
            "micron" | "microns" | "um" => "µm",
            other => other,
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::uncalibrated()
    }
}

/// Color lookup for one channel: a linear ramp from black to `color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLut {
    /// RGB color at full intensity.
    pub color: [u8; 3],
}

impl ChannelLut {
    pub const RED: Self = Self::new([255, 0, 0]);
    pub const GREEN: Self = Self::new([0, 255, 0]);
    pub const BLUE: Self = Self::new([0, 0, 255]);
    pub const GRAY: Self = Self::new([255, 255, 255]);
    pub const CYAN: Self = Self::new([0, 255, 255]);
    pub const MAGENTA: Self = Self::new([255, 0, 255]);
    pub const YELLOW: Self = Self::new([255, 255, 0]);

    /// Composite-mode defaults, cycled by channel index.
    pub const DEFAULTS: [Self; 7] = [
        Self::RED,
        Self::GREEN,
        Self::BLUE,
        Self::GRAY,
        Self::CYAN,
        Self::MAGENTA,
        Self::YELLOW,
    ];

    /// Create a lookup ramping from black to `color`.
    #[must_use]
    pub const fn new(color: [u8; 3]) -> Self {
        Self { color }
    }

    /// Default lookup for the 1-based `channel`.
    #[must_use]
    pub const fn default_for(channel: u32) -> Self {
        Self::DEFAULTS[(channel.saturating_sub(1) as usize) % Self::DEFAULTS.len()]
    }

    /// Map an 8-bit intensity through the ramp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply(self, value: u8) -> [u8; 3] {
        let scale = |c: u8| ((u16::from(c) * u16::from(value) + 127) / 255) as u8;
        [
            scale(self.color[0]),
            scale(self.color[1]),
            scale(self.color[2]),
        ]
    }
}

/// Immutable description of a source stack, read once when it is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDescriptor {
    /// Size of every plane/channel raster.
    pub dimensions: Dimensions,
    /// Number of depth planes.
    pub plane_count: u32,
    /// Number of channels per plane.
    pub channel_count: u32,
    /// Pixel calibration.
    pub calibration: Calibration,
    /// One lookup per channel, in channel order.
    pub channel_luts: Vec<ChannelLut>,
}

impl StackDescriptor {
    /// Lookup for the 1-based `channel`, falling back to the composite
    /// defaults when the source did not provide one.
    #[must_use]
    pub fn lut(&self, channel: u32) -> ChannelLut {
        channel
            .checked_sub(1)
            .and_then(|i| self.channel_luts.get(i as usize))
            .copied()
            .unwrap_or_else(|| ChannelLut::default_for(channel))
    }
}

/// Parameters of the scale-bar length search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleBarConfig {
    /// Target bar length as a fraction of the physical image width.
    pub fraction: f64,
    /// Growth factor applied before rounding to one significant digit.
    pub ratio: f64,
    /// Draw the length label next to the bar (otherwise it is only logged).
    pub show_length: bool,
}

impl ScaleBarConfig {
    /// Default [`fraction`](Self::fraction).
    pub const DEFAULT_FRACTION: f64 = 0.1;
    /// Default [`ratio`](Self::ratio).
    pub const DEFAULT_RATIO: f64 = 2.3;
    /// Smallest ratio for which every rounding step strictly increases
    /// the bar length.
    pub const MIN_RATIO: f64 = 1.5;
}

impl Default for ScaleBarConfig {
    fn default() -> Self {
        Self {
            fraction: Self::DEFAULT_FRACTION,
            ratio: Self::DEFAULT_RATIO,
            show_length: true,
        }
    }
}

/// Configuration for a montage run.
///
/// Passed explicitly to the pipeline; the CLI applies the precedence
/// explicit argument > configuration > interactive prompt before
/// handing it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MontageConfig {
    /// Default input stack path.
    pub input: Option<PathBuf>,
    /// Default directory for temporary tiles and the saved montage.
    pub output_dir: Option<PathBuf>,
    /// Which planes to include.
    pub selection: SelectionKind,
    /// Plane list used when `selection` is [`SelectionKind::Custom`].
    pub custom_planes: String,
    /// Persist the final montage next to the temporary tiles.
    pub save_montage: bool,
    /// Display scale applied to every tile in the montage.
    pub scale: f64,
    /// Scale-bar sizing.
    pub scale_bar: ScaleBarConfig,
    /// TrueType/OpenType font used for the scale-bar label.
    pub font: Option<PathBuf>,
    /// Per-channel colors overriding the source lookups, in channel order.
    pub channel_colors: Vec<[u8; 3]>,
}

impl MontageConfig {
    /// Default [`scale`](Self::scale).
    pub const DEFAULT_SCALE: f64 = 0.85;
    /// Default [`custom_planes`](Self::custom_planes) text.
    pub const DEFAULT_CUSTOM_PLANES: &str = "1,6,7,42";

    /// Check numeric parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        let fraction = self.scale_bar.fraction;
        if !(fraction.is_finite() && fraction > 0.0 && fraction <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "scale_bar.fraction must be in (0, 1], got {fraction}"
            )));
        }
        let ratio = self.scale_bar.ratio;
        if !(ratio.is_finite() && ratio >= ScaleBarConfig::MIN_RATIO) {
            return Err(PipelineError::InvalidConfig(format!(
                "scale_bar.ratio must be at least {}, got {ratio}",
                ScaleBarConfig::MIN_RATIO
            )));
        }
        Ok(())
    }

    /// The plane selection described by [`selection`](Self::selection)
    /// and [`custom_planes`](Self::custom_planes).
    #[must_use]
    pub fn slice_selection(&self) -> SliceSelection {
        self.selection.with_text(&self.custom_planes)
    }

    /// Apply [`channel_colors`](Self::channel_colors) over the source lookups.
    #[must_use]
    pub fn channel_luts(&self, descriptor: &StackDescriptor) -> Vec<ChannelLut> {
        (1..=descriptor.channel_count)
            .map(|c| {
                c.checked_sub(1)
                    .and_then(|i| self.channel_colors.get(i as usize))
                    .map_or_else(|| descriptor.lut(c), |&color| ChannelLut::new(color))
            })
            .collect()
    }
}

impl Default for MontageConfig {
    fn default() -> Self {
        Self {
            input: None,
            output_dir: None,
            selection: SelectionKind::All,
            custom_planes: Self::DEFAULT_CUSTOM_PLANES.to_owned(),
            save_montage: true,
            scale: Self::DEFAULT_SCALE,
            scale_bar: ScaleBarConfig::default(),
            font: None,
            channel_colors: Vec::new(),
        }
    }
}

/// Conditions that do not stop a run but are surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PipelineWarning {
    /// The stack has a single z plane.
    #[error(
        "image only has one z plane; if this is unexpected, check the stack's dimension metadata"
    )]
    SinglePlane,

    /// No physical pixel size is known, so no scale bar was drawn.
    #[error("image is not spatially calibrated; scale bar skipped")]
    Uncalibrated,

    /// The scale bar was drawn without its length label.
    #[error("scale bar label not drawn: {0}")]
    LabelSkipped(String),

    /// The source had more than one time point; only the first is used.
    #[error("source has {0} time points; only the first is used")]
    TimeSeriesTruncated(u32),
}

/// Errors that can occur while building a montage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The plane selection could not be resolved.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// A stored raster could not be encoded or decoded.
    #[error("image codec error: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image source failed to provide a raster.
    #[error("image source error: {0}")]
    Source(String),

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The source stack has no planes or no channels.
    #[error("stack has {planes} planes and {channels} channels; both must be at least 1")]
    EmptyStack {
        /// Plane count reported by the source.
        planes: u32,
        /// Channel count reported by the source.
        channels: u32,
    },

    /// A plane or channel index cannot be encoded in a canonical tile name.
    #[error("{axis} index {value} exceeds the supported maximum of {max}")]
    TileIndexOutOfRange {
        /// `"plane"` or `"channel"`.
        axis: &'static str,
        /// Offending index.
        value: u32,
        /// Largest supported index.
        max: u32,
    },

    /// A stored tile name is not a canonical tile name.
    #[error("unrecognized tile name in intermediate storage: {0}")]
    UnrecognizedTile(String),

    /// Intermediate storage holds a different number of tiles than were written.
    #[error("expected {expected} intermediate tiles, found {found}")]
    TileCountMismatch {
        /// Tiles written during extraction.
        expected: usize,
        /// Tiles found when restacking.
        found: usize,
    },

    /// Intermediate storage already holds tiles before extraction starts.
    #[error(
        "intermediate storage already holds {found} tile(s) from another run; remove them and retry"
    )]
    StaleTiles {
        /// Number of leftover tiles.
        found: usize,
    },

    /// A raster does not match the stack dimensions.
    #[error("raster {name} is {actual:?}, expected {expected:?}")]
    RasterSizeMismatch {
        /// Tile or source raster name.
        name: String,
        /// Stack dimensions.
        expected: Dimensions,
        /// Dimensions found.
        actual: Dimensions,
    },
}
