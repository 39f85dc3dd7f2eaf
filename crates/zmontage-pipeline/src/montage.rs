//! Montage compositor: scales an ordered frame sequence and lays it out
//! on a grid described by [`MontageGeometry`].

use ab_glyph::FontArc;
use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::layout::MontageGeometry;
use crate::overlay;
use crate::types::{Dimensions, PipelineError};

/// One frame of a reconstructed stack, labelled with the name it was
/// stored under.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Stack slice label.
    pub name: String,
    /// Frame pixels.
    pub raster: RgbImage,
}

/// Assemble `frames` into one grid raster.
///
/// Frames `geometry.first..=geometry.last` (1-based, stepping by
/// `geometry.increment`) are scaled by `geometry.scale` and placed in
/// `geometry.fill` order. Labels are drawn only when `geometry.labels` is
/// set and a font is available.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyStack`] for an empty sequence,
/// [`PipelineError::TileCountMismatch`] if the geometry addresses frames
/// past the end, and [`PipelineError::RasterSizeMismatch`] if frames
/// differ in size.
#[allow(clippy::cast_possible_wrap)]
pub fn assemble(
    frames: &[Frame],
    geometry: &MontageGeometry,
    font: Option<&FontArc>,
) -> Result<RgbImage, PipelineError> {
    let Some(first) = frames.first() else {
        return Err(PipelineError::EmptyStack {
            planes: 0,
            channels: 0,
        });
    };
    if geometry.last as usize > frames.len() || geometry.first == 0 {
        return Err(PipelineError::TileCountMismatch {
            expected: geometry.last as usize,
            found: frames.len(),
        });
    }
    let source = Dimensions::of(&first.raster);
    if let Some(frame) = frames
        .iter()
        .find(|f| Dimensions::of(&f.raster) != source)
    {
        return Err(PipelineError::RasterSizeMismatch {
            name: frame.name.clone(),
            expected: source,
            actual: Dimensions::of(&frame.raster),
        });
    }

    let tile = geometry.tile_size(source);
    let size = geometry.output_size(source);
    let mut canvas = RgbImage::new(size.width, size.height);

    for (slot, number) in (0_u32..).zip(geometry.frames()) {
        let Some((column, row)) = geometry.cell(slot) else {
            break;
        };
        let frame = &frames[number as usize - 1];
        let scaled = if tile == source {
            frame.raster.clone()
        } else {
            imageops::resize(&frame.raster, tile.width, tile.height, FilterType::Triangle)
        };
        let x = column * (tile.width + geometry.border_width);
        let y = row * (tile.height + geometry.border_width);
        imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));

        if geometry.labels
            && let Some(font) = font
        {
            let size = (tile.height / 12).max(8);
            overlay::draw_label(&mut canvas, x as i32 + 2, y as i32 + 2, size, &frame.name, font);
        }
    }
    Ok(canvas)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;

    use image::Rgb;

    use super::*;

    fn frame(name: &str, value: u8) -> Frame {
        Frame {
            name: name.to_owned(),
            raster: RgbImage::from_pixel(10, 10, Rgb([value, value, value])),
        }
    }

    fn geometry(planes: u32, channels: u32, scale: f64) -> MontageGeometry {
        MontageGeometry::with_scale(
            NonZeroU32::new(planes).unwrap(),
            NonZeroU32::new(channels).unwrap(),
            scale,
        )
    }

    #[test]
    fn frames_land_in_column_major_cells() {
        let frames: Vec<Frame> = (1..=6).map(|i| frame(&i.to_string(), i * 10)).collect();
        let montage = assemble(&frames, &geometry(2, 2, 1.0), None).unwrap();
        assert_eq!(montage.dimensions(), (20, 30));
        // Column 0 holds frames 1..=3 top to bottom, column 1 frames 4..=6.
        assert_eq!(montage.get_pixel(5, 5).0[0], 10);
        assert_eq!(montage.get_pixel(5, 15).0[0], 20);
        assert_eq!(montage.get_pixel(5, 25).0[0], 30);
        assert_eq!(montage.get_pixel(15, 5).0[0], 40);
        assert_eq!(montage.get_pixel(15, 25).0[0], 60);
    }

    #[test]
    fn scale_shrinks_every_cell() {
        let frames: Vec<Frame> = (1..=2).map(|i| frame("f", i)).collect();
        let montage = assemble(&frames, &geometry(1, 1, 0.5), None).unwrap();
        assert_eq!(montage.dimensions(), (5, 10));
    }

    #[test]
    fn too_few_frames_is_an_error() {
        let frames = vec![frame("a", 1), frame("b", 2)];
        assert!(matches!(
            assemble(&frames, &geometry(2, 1, 1.0), None),
            Err(PipelineError::TileCountMismatch {
                expected: 4,
                found: 2
            })
        ));
    }

    #[test]
    fn mixed_sizes_are_rejected() {
        let mut frames = vec![frame("a", 1), frame("b", 2)];
        frames[1].raster = RgbImage::new(4, 4);
        assert!(matches!(
            assemble(&frames, &geometry(1, 1, 1.0), None),
            Err(PipelineError::RasterSizeMismatch { ref name, .. }) if name == "b"
        ));
    }

    #[test]
    fn empty_sequence_is_an_error() {
        assert!(matches!(
            assemble(&[], &geometry(1, 1, 1.0), None),
            Err(PipelineError::EmptyStack { .. })
        ));
    }
}
