//! Channel coloring and merging.
//!
//! Each channel raster is mapped through its [`ChannelLut`]; the
//! composite is the per-pixel sum of the colored channels, saturating at
//! 255 (additive "composite" display).

use image::{Rgb, RgbImage};

use crate::types::{ChannelLut, Dimensions, GrayImage, PipelineError};

/// Color a single-channel raster through `lut`.
#[must_use]
pub fn colorize(raster: &GrayImage, lut: ChannelLut) -> RgbImage {
    RgbImage::from_fn(raster.width(), raster.height(), |x, y| {
        Rgb(lut.apply(raster.get_pixel(x, y).0[0]))
    })
}

/// Merge colored channels of one plane into an RGB composite.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyStack`] for an empty channel list and
/// [`PipelineError::RasterSizeMismatch`] if the rasters differ in size.
pub fn merge_channels(channels: &[(&GrayImage, ChannelLut)]) -> Result<RgbImage, PipelineError> {
    let Some((first, _)) = channels.first() else {
        return Err(PipelineError::EmptyStack {
            planes: 1,
            channels: 0,
        });
    };
    let expected = Dimensions::of(*first);
    for (index, (raster, _)) in channels.iter().enumerate() {
        let actual = Dimensions::of(*raster);
        if actual != expected {
            return Err(PipelineError::RasterSizeMismatch {
                name: format!("channel {}", index + 1),
                expected,
                actual,
            });
        }
    }

    let mut merged = RgbImage::new(expected.width, expected.height);
    for (raster, lut) in channels {
        for (out, gray) in merged.pixels_mut().zip(raster.pixels()) {
            let colored = lut.apply(gray.0[0]);
            for (o, c) in out.0.iter_mut().zip(colored) {
                *o = o.saturating_add(c);
            }
        }
    }
    Ok(merged)
}
