//! Multi-page TIFF stacks as an [`ImageSource`].
//!
//! ImageJ hyperstack metadata decides how pages map onto planes and
//! channels; a TIFF without it is read as a single-channel z stack.
//! Only the first time point of a time series is loaded.
//!
//! 8-bit pages keep their values. Deeper pages are mapped to 8 bits
//! through one display range per channel, spanning every plane, so planes
//! of a channel stay comparable.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use tiff::ColorType;
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use zmontage_pipeline::{
    Calibration, ChannelLut, Dimensions, GrayImage, ImageSource, PipelineError, PipelineWarning,
    StackDescriptor,
};

use crate::error::IoError;
use crate::imagej::ImageJMetadata;

/// A TIFF stack held in memory as 8-bit rasters.
#[derive(Debug, Clone)]
pub struct TiffStack {
    path: PathBuf,
    descriptor: StackDescriptor,
    layout: ImageJMetadata,
    pages: Vec<GrayImage>,
    warnings: Vec<PipelineWarning>,
}

impl TiffStack {
    /// Read the first time point of the stack at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidPath`] if `path` is not a file,
    /// [`IoError::Tiff`] if it is not a readable TIFF, and
    /// [`IoError::UnsupportedLayout`] if its pages cannot form the stated
    /// hyperstack or differ in size or sample format.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IoError::InvalidPath {
                path: path.to_owned(),
                reason: "not an existing file",
            });
        }
        let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;

        let description = match decoder.find_tag(Tag::ImageDescription)? {
            Some(Value::Ascii(text)) => Some(text),
            _ => None,
        };
        let pixels_per_unit = match decoder.find_tag(Tag::XResolution)? {
            Some(Value::Rational(n, d)) if n > 0 && d > 0 => Some(f64::from(n) / f64::from(d)),
            _ => None,
        };
        let metadata = description.as_deref().and_then(ImageJMetadata::parse);
        let wanted = metadata
            .as_ref()
            .map(|m| m.channels as usize * m.slices as usize);

        let mut pages = Vec::new();
        loop {
            pages.push(read_page(&mut decoder)?);
            if wanted.is_some_and(|n| pages.len() >= n) || !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
        }
        tracing::debug!(path = %path.display(), pages = pages.len(), imagej = metadata.is_some(), "TIFF read");

        let layout = match metadata {
            Some(meta) => {
                let first_frame = ImageJMetadata { frames: 1, ..meta.clone() };
                first_frame.check_pages(pages.len())?;
                meta
            }
            None => ImageJMetadata {
                images: u32::try_from(pages.len()).ok(),
                channels: 1,
                slices: u32::try_from(pages.len()).map_err(|_| {
                    IoError::UnsupportedLayout(format!("{} pages", pages.len()))
                })?,
                frames: 1,
                unit: None,
            },
        };

        let dimensions = pages
            .first()
            .map(Page::dimensions)
            .ok_or_else(|| IoError::UnsupportedLayout("file has no pages".to_owned()))?;
        if let Some(index) = pages.iter().position(|p| p.dimensions() != dimensions) {
            return Err(IoError::UnsupportedLayout(format!(
                "page {} is {:?}, first page is {dimensions:?}",
                index + 1,
                pages[index].dimensions(),
            )));
        }
        let pages = to_display(pages, layout.channels)?;

        let calibration = match (&layout.unit, pixels_per_unit) {
            (Some(unit), Some(ppu)) => Calibration {
                pixel_width: 1.0 / ppu,
                unit: unit.clone(),
            },
            _ => Calibration::uncalibrated(),
        };
        let channel_luts = if layout.channels == 1 {
            vec![ChannelLut::GRAY]
        } else {
            Vec::new()
        };
        let mut warnings = Vec::new();
        if layout.frames > 1 {
            warnings.push(PipelineWarning::TimeSeriesTruncated(layout.frames));
        }

        Ok(Self {
            path: path.to_owned(),
            descriptor: StackDescriptor {
                dimensions,
                plane_count: layout.slices,
                channel_count: layout.channels,
                calibration,
                channel_luts,
            },
            layout,
            pages,
            warnings,
        })
    }

    /// File the stack was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for TiffStack {
    fn descriptor(&self) -> &StackDescriptor {
        &self.descriptor
    }

    fn raster(&mut self, plane: u32, channel: u32) -> Result<GrayImage, PipelineError> {
        if !(1..=self.layout.slices).contains(&plane) || !(1..=self.layout.channels).contains(&channel)
        {
            return Err(PipelineError::Source(format!(
                "{} has no plane {plane} channel {channel}",
                self.path.display()
            )));
        }
        let index = self.layout.page_index(plane, channel);
        self.pages.get(index).cloned().ok_or_else(|| {
            PipelineError::Source(format!("{} is missing page {}", self.path.display(), index + 1))
        })
    }

    fn warnings(&self) -> Vec<PipelineWarning> {
        self.warnings.clone()
    }
}

/// A decoded page before conversion to 8 bits.
enum Page {
    /// 8-bit gray, used as is.
    Gray(GrayImage),
    /// Deeper gray samples, waiting for their channel's display range.
    Deep {
        dimensions: Dimensions,
        samples: Vec<f64>,
    },
}

impl Page {
    fn dimensions(&self) -> Dimensions {
        match self {
            Self::Gray(image) => Dimensions::of(image),
            Self::Deep { dimensions, .. } => *dimensions,
        }
    }
}

/// Decode the current page.
fn read_page<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Page, IoError> {
    let (width, height) = decoder.dimensions()?;
    let color = decoder.colortype()?;
    let samples = match (color, decoder.read_image()?) {
        (ColorType::Gray(8), DecodingResult::U8(data)) => {
            return GrayImage::from_raw(width, height, data)
                .map(Page::Gray)
                .ok_or_else(short_page);
        }
        (ColorType::RGB(8), DecodingResult::U8(data)) => {
            let rgb = image::RgbImage::from_raw(width, height, data).ok_or_else(short_page)?;
            return Ok(Page::Gray(image::imageops::grayscale(&rgb)));
        }
        (ColorType::Gray(_), DecodingResult::U16(data)) => widen(&data),
        (ColorType::Gray(_), DecodingResult::I16(data)) => widen(&data),
        (ColorType::Gray(_), DecodingResult::U32(data)) => widen(&data),
        (ColorType::Gray(_), DecodingResult::F32(data)) => widen(&data),
        (other, _) => {
            return Err(IoError::UnsupportedLayout(format!(
                "{other:?} pages are not supported"
            )));
        }
    };
    if samples.len() < width as usize * height as usize {
        return Err(short_page());
    }
    Ok(Page::Deep {
        dimensions: Dimensions { width, height },
        samples,
    })
}

fn widen<T: Copy + Into<f64>>(data: &[T]) -> Vec<f64> {
    data.iter().map(|&s| Into::<f64>::into(s)).collect()
}

fn short_page() -> IoError {
    IoError::UnsupportedLayout("page holds fewer samples than its dimensions".to_owned())
}

/// Convert `pages` (channel fastest) to 8-bit rasters, mapping every deep
/// page through the display range of its channel.
fn to_display(pages: Vec<Page>, channels: u32) -> Result<Vec<GrayImage>, IoError> {
    let channels = channels.max(1) as usize;
    let mut ranges = vec![DisplayRange::EMPTY; channels];
    for (index, page) in pages.iter().enumerate() {
        if let Page::Deep { samples, .. } = page {
            ranges[index % channels].include(samples);
        }
    }
    pages
        .into_iter()
        .enumerate()
        .map(|(index, page)| match page {
            Page::Gray(image) => Ok(image),
            Page::Deep {
                dimensions,
                samples,
            } => GrayImage::from_raw(
                dimensions.width,
                dimensions.height,
                ranges[index % channels].map(&samples),
            )
            .ok_or_else(short_page),
        })
        .collect()
}

/// Minimum and maximum finite sample of a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DisplayRange {
    min: f64,
    max: f64,
}

impl DisplayRange {
    const EMPTY: Self = Self {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    fn include(&mut self, samples: &[f64]) {
        for &v in samples.iter().filter(|v| v.is_finite()) {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
    }

    /// Map `min..=max` onto `0..=255`. A flat range maps to black.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn map(self, samples: &[f64]) -> Vec<u8> {
        let span = self.max - self.min;
        samples
            .iter()
            .map(|&v| {
                if span > 0.0 && v.is_finite() {
                    ((v - self.min) / span * 255.0).round().clamp(0.0, 255.0) as u8
                } else {
                    0
                }
            })
            .collect()
    }
}
