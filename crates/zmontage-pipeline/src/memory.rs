//! In-memory [`ImageSource`] and [`RasterStore`] implementations.

use std::collections::BTreeMap;

use crate::source::{ImageSource, RasterStore};
use crate::types::{
    Dimensions, GrayImage, PipelineError, PipelineWarning, RgbImage, StackDescriptor,
};

/// A stack held entirely in memory, plane-major with channels fastest.
#[derive(Debug, Clone)]
pub struct MemoryStack {
    descriptor: StackDescriptor,
    rasters: Vec<GrayImage>,
    warnings: Vec<PipelineWarning>,
}

impl MemoryStack {
    /// Build a stack by calling `f(plane, channel)` for every raster.
    pub fn from_fn(
        descriptor: StackDescriptor,
        mut f: impl FnMut(u32, u32) -> GrayImage,
    ) -> Self {
        let mut rasters = Vec::new();
        for plane in 1..=descriptor.plane_count {
            for channel in 1..=descriptor.channel_count {
                rasters.push(f(plane, channel));
            }
        }
        Self {
            descriptor,
            rasters,
            warnings: Vec::new(),
        }
    }

    /// Build a stack from rasters ordered plane-major, channels fastest.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Source`] if the raster count does not match
    /// the descriptor, or [`PipelineError::RasterSizeMismatch`] if a raster
    /// has the wrong size.
    pub fn new(
        descriptor: StackDescriptor,
        rasters: Vec<GrayImage>,
    ) -> Result<Self, PipelineError> {
        let expected = descriptor.plane_count as usize * descriptor.channel_count as usize;
        if rasters.len() != expected {
            return Err(PipelineError::Source(format!(
                "expected {expected} rasters for {} planes x {} channels, got {}",
                descriptor.plane_count,
                descriptor.channel_count,
                rasters.len()
            )));
        }
        if let Some((index, raster)) = rasters
            .iter()
            .enumerate()
            .find(|(_, r)| Dimensions::of(*r) != descriptor.dimensions)
        {
            return Err(PipelineError::RasterSizeMismatch {
                name: format!("raster {}", index + 1),
                expected: descriptor.dimensions,
                actual: Dimensions::of(raster),
            });
        }
        Ok(Self {
            descriptor,
            rasters,
            warnings: Vec::new(),
        })
    }

    /// Attach warnings reported through [`ImageSource::warnings`].
    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<PipelineWarning>) -> Self {
        self.warnings = warnings;
        self
    }
}

impl ImageSource for MemoryStack {
    fn descriptor(&self) -> &StackDescriptor {
        &self.descriptor
    }

    fn raster(&mut self, plane: u32, channel: u32) -> Result<GrayImage, PipelineError> {
        let d = &self.descriptor;
        if !(1..=d.plane_count).contains(&plane) || !(1..=d.channel_count).contains(&channel) {
            return Err(PipelineError::Source(format!(
                "no raster at plane {plane}, channel {channel}"
            )));
        }
        let index = (plane as usize - 1) * d.channel_count as usize + (channel as usize - 1);
        self.rasters
            .get(index)
            .cloned()
            .ok_or_else(|| PipelineError::Source(format!("raster {index} missing")))
    }

    fn warnings(&self) -> Vec<PipelineWarning> {
        self.warnings.clone()
    }
}

/// A [`RasterStore`] backed by a sorted map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, RgbImage>,
    saves: usize,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of `save` calls so far.
    #[must_use]
    pub const fn save_count(&self) -> usize {
        self.saves
    }

    /// The raster stored under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RgbImage> {
        self.entries.get(name)
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl RasterStore for MemoryStore {
    fn save(&mut self, name: &str, raster: &RgbImage) -> Result<(), PipelineError> {
        self.saves += 1;
        self.entries.insert(name.to_owned(), raster.clone());
        Ok(())
    }

    fn load(&mut self, name: &str) -> Result<RgbImage, PipelineError> {
        self.entries.get(name).cloned().ok_or_else(|| {
            PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no stored raster named {name}"),
            ))
        })
    }

    fn list(&mut self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        Ok(self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn remove(&mut self, name: &str) -> Result<(), PipelineError> {
        self.entries.remove(name).map(|_| ()).ok_or_else(|| {
            PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no stored raster named {name}"),
            ))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Luma, Rgb};

    use super::*;
    use crate::types::Calibration;

    fn descriptor(planes: u32, channels: u32) -> StackDescriptor {
        StackDescriptor {
            dimensions: Dimensions {
                width: 2,
                height: 2,
            },
            plane_count: planes,
            channel_count: channels,
            calibration: Calibration::default(),
            channel_luts: Vec::new(),
        }
    }

    #[test]
    fn stack_indexes_plane_major() {
        #[allow(clippy::cast_possible_truncation)]
        let mut stack = MemoryStack::from_fn(descriptor(3, 2), |p, c| {
            GrayImage::from_pixel(2, 2, Luma([(p * 10 + c) as u8]))
        });
        assert_eq!(stack.raster(2, 1).unwrap().get_pixel(0, 0).0, [21]);
        assert_eq!(stack.raster(3, 2).unwrap().get_pixel(0, 0).0, [32]);
        assert!(matches!(stack.raster(4, 1), Err(PipelineError::Source(_))));
        assert!(matches!(stack.raster(1, 0), Err(PipelineError::Source(_))));
    }

    #[test]
    fn stack_checks_raster_count_and_size() {
        let raster = GrayImage::new(2, 2);
        assert!(matches!(
            MemoryStack::new(descriptor(1, 2), vec![raster.clone()]),
            Err(PipelineError::Source(_))
        ));
        assert!(matches!(
            MemoryStack::new(descriptor(1, 2), vec![raster, GrayImage::new(3, 2)]),
            Err(PipelineError::RasterSizeMismatch { .. })
        ));
    }

    #[test]
    fn store_lists_by_prefix_and_removes() {
        let mut store = MemoryStore::new();
        let px = RgbImage::from_pixel(1, 1, Rgb([1, 2, 3]));
        store.save("temp_a", &px).unwrap();
        store.save("temp_b", &px).unwrap();
        store.save("other", &px).unwrap();

        let mut names = store.list("temp_").unwrap();
        names.sort();
        assert_eq!(names, ["temp_a", "temp_b"]);
        assert_eq!(store.load("temp_a").unwrap(), px);

        store.remove("temp_a").unwrap();
        assert!(store.load("temp_a").is_err());
        assert!(store.remove("temp_a").is_err());
        assert_eq!(store.len(), 2);
        assert_eq!(store.save_count(), 3);
    }
}
