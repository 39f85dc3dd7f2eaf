//! Collaborator interfaces: where rasters come from and where tiles go.
//!
//! The pipeline never touches files itself. An [`ImageSource`] supplies
//! the stack; a [`RasterStore`] holds intermediate tiles between
//! extraction and restacking, addressed only by name. `zmontage-io`
//! provides TIFF and PNG-directory implementations; [`crate::memory`]
//! provides in-memory ones.

use crate::types::{GrayImage, PipelineError, PipelineWarning, RgbImage, StackDescriptor};

/// A multi-plane, multi-channel raster stack.
pub trait ImageSource {
    /// Dimensions, counts, calibration, and lookups of the stack.
    fn descriptor(&self) -> &StackDescriptor;

    /// The raster at 1-based `plane` and `channel`.
    ///
    /// # Errors
    ///
    /// Implementations return [`PipelineError::Source`] for indices outside
    /// the stack or unreadable data.
    fn raster(&mut self, plane: u32, channel: u32) -> Result<GrayImage, PipelineError>;

    /// Conditions noticed while opening the source.
    fn warnings(&self) -> Vec<PipelineWarning> {
        Vec::new()
    }
}

/// Named raster storage for intermediate tiles and the final montage.
///
/// Names carry no extension; the store picks its own encoding, which
/// must be lossless.
pub trait RasterStore {
    /// Store `raster` under `name`, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the raster cannot be encoded or written.
    fn save(&mut self, name: &str, raster: &RgbImage) -> Result<(), PipelineError>;

    /// Read back the raster stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if no such entry exists or it cannot be decoded.
    fn load(&mut self, name: &str) -> Result<RgbImage, PipelineError>;

    /// Names of all entries starting with `prefix`, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn list(&mut self, prefix: &str) -> Result<Vec<String>, PipelineError>;

    /// Delete the entry stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be removed.
    fn remove(&mut self, name: &str) -> Result<(), PipelineError>;
}
