//! Scale-bar sizing.
//!
//! The bar length is found by a "nice number" search: start at one
//! physical unit and repeatedly grow by a fixed ratio, rounding to one
//! significant digit, until the bar covers the target fraction of the
//! physical image width. With the default ratio of 2.3 the lengths walk
//! the 1-2-5 series (1, 2, 5, 10, 20, 50, ...) without a lookup table.
//!
//! Every step multiplies the length by at least 1.5 before rounding,
//! which always moves the leading digit up, so the sequence is strictly
//! increasing and crosses any finite target.

use serde::{Deserialize, Serialize};

use crate::types::{Calibration, Dimensions, ScaleBarConfig};

/// Bar length for `pixel_width` physical units per pixel across
/// `image_width` pixels, using the default 10% target and 2.3 ratio.
///
/// Returns `None` when no finite, positive target exists.
#[must_use]
pub fn scale_bar_length(pixel_width: f64, image_width: u32) -> Option<f64> {
    nice_length(&ScaleBarConfig::default(), pixel_width, image_width)
}

/// Bar length with explicit search parameters.
///
/// Returns `None` for a non-positive or non-finite pixel width, or a
/// ratio below [`ScaleBarConfig::MIN_RATIO`].
#[must_use]
pub fn nice_length(config: &ScaleBarConfig, pixel_width: f64, image_width: u32) -> Option<f64> {
    let target = config.fraction * pixel_width * f64::from(image_width);
    if !(pixel_width > 0.0 && target.is_finite()) {
        return None;
    }
    if !(config.ratio.is_finite() && config.ratio >= ScaleBarConfig::MIN_RATIO) {
        return None;
    }

    let mut length = 1.0_f64;
    while length < target {
        let candidate = length * config.ratio;
        let magnitude = power_of_ten(candidate);
        let next = (candidate / magnitude).round() * magnitude;
        if next <= length || !next.is_finite() {
            return None;
        }
        length = next;
    }
    Some(length)
}

#[allow(clippy::cast_possible_truncation)]
fn power_of_ten(value: f64) -> f64 {
    10f64.powi(value.abs().log10().floor() as i32)
}

/// Geometry and label of the scale bar drawn on the first composite tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleBarSpec {
    /// Bar length in physical units.
    pub length: f64,
    /// Unit label as displayed.
    pub unit: String,
    /// Bar length in pixels.
    pub pixel_length: f64,
    /// Line thickness in pixels.
    pub stroke_width: u32,
    /// Label height in pixels.
    pub font_size: u32,
    /// Left end of the bar.
    pub x: u32,
    /// Vertical center of the bar.
    pub y: u32,
    /// Whether the label is drawn.
    pub show_length: bool,
}

impl ScaleBarSpec {
    /// Derive the bar for an image of `dimensions` with `calibration`.
    ///
    /// Returns `None` for an uncalibrated image.
    #[must_use]
    pub fn for_image(
        calibration: &Calibration,
        dimensions: Dimensions,
        config: &ScaleBarConfig,
    ) -> Option<Self> {
        if !calibration.is_calibrated() {
            return None;
        }
        let length = nice_length(config, calibration.pixel_width, dimensions.width)?;

        let stroke_width = (dimensions.height / 50).max(1);
        let font_size = stroke_width * 4;
        Some(Self {
            length,
            unit: calibration.display_unit().to_owned(),
            pixel_length: length / calibration.pixel_width,
            stroke_width,
            font_size,
            x: 2 * stroke_width,
            y: dimensions.height.saturating_sub(2 * stroke_width),
            show_length: config.show_length,
        })
    }

    /// Label text, e.g. `"50 µm"`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn label(&self) -> String {
        format!("{} {}", self.length as u64, self.unit)
    }

    /// Top edge of the label.
    #[must_use]
    pub fn label_y(&self) -> i64 {
        i64::from(self.y) - i64::from(self.stroke_width + self.font_size)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn micron(pixel_width: f64) -> Calibration {
        Calibration {
            pixel_width,
            unit: "micron".to_owned(),
        }
    }

    #[test]
    fn half_micron_pixels_thousand_wide() {
        // target 50: 1 -> 2 -> 5 -> 10 -> 20 -> 50
        assert_eq!(scale_bar_length(0.5, 1000), Some(50.0));
    }

    #[test]
    fn known_lengths() {
        assert_eq!(scale_bar_length(0.1, 512), Some(10.0));
        assert_eq!(scale_bar_length(0.065, 2048), Some(20.0));
        assert_eq!(scale_bar_length(1.0, 5), Some(1.0));
        assert_eq!(scale_bar_length(2.0, 2000), Some(500.0));
    }

    #[test]
    fn rejects_invalid_widths() {
        assert_eq!(scale_bar_length(0.0, 100), None);
        assert_eq!(scale_bar_length(-1.0, 100), None);
        assert_eq!(scale_bar_length(f64::NAN, 100), None);
        assert_eq!(scale_bar_length(f64::INFINITY, 100), None);
    }

    #[test]
    fn rejects_small_ratio() {
        let config = ScaleBarConfig {
            ratio: 1.2,
            ..ScaleBarConfig::default()
        };
        assert_eq!(nice_length(&config, 1.0, 1000), None);
    }

    #[test]
    fn spec_geometry_follows_height() {
        let spec = ScaleBarSpec::for_image(
            &micron(0.5),
            Dimensions {
                width: 1000,
                height: 500,
            },
            &ScaleBarConfig::default(),
        )
        .unwrap();
        assert_eq!(spec.length, 50.0);
        assert_eq!(spec.pixel_length, 100.0);
        assert_eq!(spec.stroke_width, 10);
        assert_eq!(spec.font_size, 40);
        assert_eq!((spec.x, spec.y), (20, 480));
        assert_eq!(spec.label_y(), 430);
        assert_eq!(spec.label(), "50 µm");
    }

    #[test]
    fn small_images_get_one_pixel_stroke() {
        let spec = ScaleBarSpec::for_image(
            &micron(1.0),
            Dimensions {
                width: 20,
                height: 20,
            },
            &ScaleBarConfig::default(),
        )
        .unwrap();
        assert_eq!(spec.stroke_width, 1);
        assert_eq!(spec.font_size, 4);
    }

    #[test]
    fn uncalibrated_has_no_bar() {
        let dims = Dimensions {
            width: 100,
            height: 100,
        };
        assert!(
            ScaleBarSpec::for_image(&Calibration::default(), dims, &ScaleBarConfig::default())
                .is_none()
        );
    }

    proptest! {
        #[test]
        fn one_significant_digit_in_one_two_five(w in 0.001f64..50.0, width in 1u32..20_000) {
            let length = scale_bar_length(w, width).unwrap();
            let magnitude = power_of_ten(length);
            let mantissa = length / magnitude;
            prop_assert!(
                [1.0, 2.0, 5.0].iter().any(|m| (mantissa - m).abs() < 1e-9),
                "length {} has mantissa {}", length, mantissa,
            );
            let target = 0.1 * w * f64::from(width);
            prop_assert!(length >= target);
            prop_assert!(length < (2.5 * target).max(1.0) + 1e-9);
        }

        #[test]
        fn monotonic_in_width(w in 0.001f64..50.0, a in 1u32..20_000, b in 1u32..20_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(scale_bar_length(w, lo).unwrap() <= scale_bar_length(w, hi).unwrap());
        }
    }
}
