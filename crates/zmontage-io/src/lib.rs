//! zmontage-io: filesystem collaborators for the montage pipeline.
//!
//! - [`TiffStack`]: an [`ImageSource`](zmontage_pipeline::ImageSource)
//!   over ImageJ-style multi-page TIFF hyperstacks.
//! - [`PngDirectoryStore`]: a [`RasterStore`](zmontage_pipeline::RasterStore)
//!   keeping intermediate tiles and the montage as PNG files.
//! - [`config`]: JSON configuration, font loading, and path helpers.

pub mod config;
pub mod error;
pub mod imagej;
pub mod png_store;
pub mod tiff_source;

pub use config::{load_config, load_font, output_dir_for, parse_config, source_stem};
pub use error::IoError;
pub use png_store::PngDirectoryStore;
pub use tiff_source::TiffStack;
