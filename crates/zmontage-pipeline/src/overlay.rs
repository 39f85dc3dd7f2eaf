//! Overlay rendering: scale bars and text labels burned into RGB rasters.
//!
//! Overlays are kept as data ([`ScaleBarSpec`]) on a tile until the tile
//! is flattened for storage; only then are pixels touched.

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::scale_bar::ScaleBarSpec;
use crate::types::PipelineWarning;

/// Overlay color.
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Draw the bar and, when requested and a font is available, its label.
///
/// Returns a warning when the label was requested but could not be drawn.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn burn_scale_bar(
    image: &mut RgbImage,
    spec: &ScaleBarSpec,
    font: Option<&FontArc>,
) -> Option<PipelineWarning> {
    let length = spec.pixel_length.round().max(1.0) as u32;
    let top = spec.y as i32 - (spec.stroke_width / 2) as i32;
    draw_filled_rect_mut(
        image,
        Rect::at(spec.x as i32, top).of_size(length, spec.stroke_width),
        OVERLAY_COLOR,
    );

    if !spec.show_length {
        tracing::info!(label = %spec.label(), "scale bar length");
        return None;
    }
    let Some(font) = font else {
        tracing::info!(label = %spec.label(), "scale bar length");
        return Some(PipelineWarning::LabelSkipped(format!(
            "no font configured for {:?}",
            spec.label()
        )));
    };
    draw_label(
        image,
        spec.x as i32,
        spec.label_y() as i32,
        spec.font_size,
        &spec.label(),
        font,
    );
    None
}

/// Draw `text` with its top-left corner at `(x, y)`.
#[allow(clippy::cast_precision_loss)]
pub fn draw_label(image: &mut RgbImage, x: i32, y: i32, size: u32, text: &str, font: &FontArc) {
    draw_text_mut(
        image,
        OVERLAY_COLOR,
        x,
        y,
        PxScale::from(size as f32),
        font,
        text,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(show_length: bool) -> ScaleBarSpec {
        ScaleBarSpec {
            length: 10.0,
            unit: "µm".to_owned(),
            pixel_length: 20.0,
            stroke_width: 2,
            font_size: 8,
            x: 4,
            y: 40,
            show_length,
        }
    }

    #[test]
    fn bar_is_burned_at_its_position() {
        let mut image = RgbImage::new(50, 50);
        let warning = burn_scale_bar(&mut image, &spec(false), None);
        assert_eq!(warning, None);

        // Rows 39..41, columns 4..24 are white.
        for y in 39..41 {
            for x in 4..24 {
                assert_eq!(*image.get_pixel(x, y), OVERLAY_COLOR, "({x}, {y})");
            }
        }
        assert_eq!(image.get_pixel(3, 40).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(24, 40).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(10, 41).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(10, 38).0, [0, 0, 0]);
    }

    #[test]
    fn bar_is_clipped_to_the_image() {
        let mut image = RgbImage::new(10, 41);
        burn_scale_bar(&mut image, &spec(false), None);
        assert_eq!(*image.get_pixel(9, 40), OVERLAY_COLOR);
    }

    #[test]
    fn missing_font_skips_label_with_warning() {
        let mut image = RgbImage::new(50, 50);
        let warning = burn_scale_bar(&mut image, &spec(true), None);
        assert!(matches!(warning, Some(PipelineWarning::LabelSkipped(_))));
    }
}
