//! zmontage-pipeline: montage construction for multi-plane, multi-channel
//! stacks (sans-IO).
//!
//! Turns a stack of depth planes x fluorescence channels into one grid
//! image through:
//! plane selection -> tile extraction -> compositing -> restacking ->
//! layout.
//!
//! This crate has **no filesystem dependencies**: rasters come from an
//! [`ImageSource`] and intermediate tiles go to a [`RasterStore`], both
//! traits. `zmontage-io` implements them over TIFF files and PNG
//! directories; [`memory`] implements them in memory.

pub mod diagnostics;
pub mod layout;
pub mod memory;
pub mod merge;
pub mod montage;
pub mod overlay;
pub mod pipeline;
pub mod scale_bar;
pub mod selection;
pub mod source;
pub mod tile;
pub mod types;

pub use diagnostics::{RunReport, StageTiming};
pub use layout::{FillOrder, MontageGeometry};
pub use memory::{MemoryStack, MemoryStore};
pub use pipeline::{MontageResult, Pipeline, PipelineState, build_montage, montage_name};
pub use scale_bar::{ScaleBarSpec, scale_bar_length};
pub use selection::{PlaneSelection, SelectionError, SelectionKind, SliceSelection};
pub use source::{ImageSource, RasterStore};
pub use tile::{TileKey, TileKind, enumerate_tiles};
pub use types::{
    Calibration, ChannelLut, Dimensions, GrayImage, MontageConfig, PipelineError, PipelineWarning,
    RgbImage, ScaleBarConfig, StackDescriptor,
};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use image::Luma;

    use super::*;

    fn two_by_two() -> MemoryStack {
        let descriptor = StackDescriptor {
            dimensions: Dimensions {
                width: 20,
                height: 16,
            },
            plane_count: 2,
            channel_count: 2,
            calibration: Calibration {
                pixel_width: 0.25,
                unit: "micron".to_owned(),
            },
            channel_luts: Vec::new(),
        };
        #[allow(clippy::cast_possible_truncation)]
        MemoryStack::from_fn(descriptor, |plane, channel| {
            GrayImage::from_pixel(20, 16, Luma([(plane * 60 + channel * 20) as u8]))
        })
    }

    #[test]
    fn end_to_end_two_planes_two_channels() {
        let mut source = two_by_two();
        let mut store = MemoryStore::new();
        let result =
            build_montage(&mut source, &mut store, MontageConfig::default(), None, "z").unwrap();

        let report = &result.report;
        assert_eq!(report.tiles_written, 6);
        assert_eq!(report.selected_planes, [1, 2]);
        assert_eq!(report.geometry.columns, 2);
        assert_eq!(report.geometry.rows, 3);
        // 20x16 tiles at 0.85 are 17x13.
        assert_eq!(
            report.montage_size,
            Dimensions {
                width: 34,
                height: 39
            }
        );
        // 0.1 * 0.25 * 20 = 0.5 µm target; the search starts at 1.
        let bar = report.scale_bar.as_ref().unwrap();
        assert_eq!(bar.label(), "1 µm");

        // Every intermediate tile was written once and removed again.
        assert_eq!(store.save_count(), 7);
        let names: Vec<&str> = store.names().collect();
        assert_eq!(names, ["z_Montage"]);
    }

    #[test]
    fn canonical_order_groups_planes_composite_first() {
        let selection =
            PlaneSelection::resolve(&SliceSelection::All, 2).unwrap();
        let names: Vec<String> = enumerate_tiles(&selection, 2)
            .unwrap()
            .into_iter()
            .map(TileKey::canonical_name)
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(
            names,
            [
                "temp_z001_c00_composite",
                "temp_z001_c01",
                "temp_z001_c02",
                "temp_z002_c00_composite",
                "temp_z002_c01",
                "temp_z002_c02",
            ]
        );
    }

    #[test]
    fn worked_scale_bar_value() {
        assert_eq!(scale_bar_length(0.5, 1000), Some(50.0));
    }
}
