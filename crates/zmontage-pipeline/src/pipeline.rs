//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use zmontage_pipeline::{MemoryStore, MontageConfig, Pipeline, PipelineError, SliceSelection};
//! # use zmontage_pipeline::source::ImageSource;
//! # fn run(stack: &mut impl ImageSource) -> Result<(), PipelineError> {
//! let mut store = MemoryStore::new();
//! let mut laid_out = Pipeline::new(stack, &mut store, MontageConfig::default())
//!     .select_planes(&SliceSelection::Odd)?
//!     .extract_tiles()?
//!     .restack()?
//!     .lay_out()?;
//! laid_out.persist("stack")?;
//! let result = laid_out.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state,
//! carrying the source, the store, and everything computed so far. Stages
//! run strictly in order:
//!
//! ```text
//! SELECTING_PLANES -> EXTRACTING_TILES -> COMPOSITING -> RESTACKING -> LAYING_OUT -> DONE
//! ```
//!
//! Extraction and compositing interleave per plane inside
//! [`PlanesSelected::extract_tiles`]; their durations are reported
//! separately. Any error ends the run; tiles already written stay in the
//! store.

use std::fmt;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use ab_glyph::FontArc;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{RunReport, StageTiming};
use crate::layout::MontageGeometry;
use crate::merge::merge_channels;
use crate::montage::{Frame, assemble};
use crate::scale_bar::ScaleBarSpec;
use crate::selection::{PlaneSelection, SliceSelection};
use crate::source::{ImageSource, RasterStore};
use crate::tile::{TILE_PREFIX, Tile, TileKey, TileRaster, enumerate_tiles};
use crate::types::{
    ChannelLut, Dimensions, GrayImage, MontageConfig, PipelineError, PipelineWarning, RgbImage,
    StackDescriptor,
};

/// Suffix appended to the source stem when the montage is persisted.
pub const MONTAGE_SUFFIX: &str = "_Montage";

/// Storage name of the montage built from a source named `stem`.
#[must_use]
pub fn montage_name(stem: &str) -> String {
    format!("{stem}{MONTAGE_SUFFIX}")
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// Resolving the plane selection.
    SelectingPlanes,
    /// Writing channel tiles.
    ExtractingTiles,
    /// Merging channels and burning the scale bar.
    Compositing,
    /// Reading tiles back in canonical order.
    Restacking,
    /// Assembling the grid.
    LayingOut,
    /// The montage is assembled.
    Done,
    /// A stage returned an error.
    Failed,
}

impl PipelineState {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SelectingPlanes => "SELECTING_PLANES",
            Self::ExtractingTiles => "EXTRACTING_TILES",
            Self::Compositing => "COMPOSITING",
            Self::Restacking => "RESTACKING",
            Self::LayingOut => "LAYING_OUT",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        })
    }
}

fn enter(state: PipelineState) {
    tracing::info!(%state, "entering state");
}

/// Everything a run carries from stage to stage.
struct Run<'a, S: ?Sized, R: ?Sized> {
    source: &'a mut S,
    store: &'a mut R,
    config: MontageConfig,
    font: Option<FontArc>,
    warnings: Vec<PipelineWarning>,
    stages: Vec<StageTiming>,
    started: Instant,
}

impl<S: ?Sized, R: RasterStore + ?Sized> Run<'_, S, R> {
    fn warn(&mut self, warning: PipelineWarning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    fn record(&mut self, state: PipelineState, duration: Duration) {
        tracing::debug!(%state, ms = duration.as_secs_f64() * 1000.0, "stage finished");
        self.stages.push(StageTiming { state, duration });
    }

    /// Flatten `tile` and write it under its canonical name.
    fn save_tile(&mut self, tile: &Tile) -> Result<(), PipelineError> {
        let (flat, warning) = tile.flatten(self.font.as_ref());
        if let Some(warning) = warning {
            self.warn(warning);
        }
        let name = tile.key.canonical_name();
        self.store.save(&name, &flat)?;
        tracing::debug!(%name, "tile saved");
        Ok(())
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`select_planes`](Self::select_planes) to advance.
#[must_use = "pipeline stages are consumed by advancing: call .select_planes() to continue"]
pub struct Pending<'a, S: ?Sized, R: ?Sized> {
    run: Run<'a, S, R>,
}

impl<'a, S: ImageSource + ?Sized, R: RasterStore + ?Sized> Pending<'a, S, R> {
    /// Use `font` for the scale-bar label.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.run.font = Some(font);
        self
    }

    /// The configuration the run will use.
    #[must_use]
    pub const fn config(&self) -> &MontageConfig {
        &self.run.config
    }

    /// Always [`PipelineState::SelectingPlanes`].
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        PipelineState::SelectingPlanes
    }

    /// Validate the configuration and the source, then resolve `selection`
    /// into planes and enumerate every tile of the montage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for bad configuration,
    /// [`PipelineError::EmptyStack`] for a stack without planes or
    /// channels, [`PipelineError::Selection`] when `selection` resolves to
    /// nothing or is malformed, and [`PipelineError::TileIndexOutOfRange`]
    /// when the stack is too large to name its tiles.
    pub fn select_planes(
        mut self,
        selection: &SliceSelection,
    ) -> Result<PlanesSelected<'a, S, R>, PipelineError> {
        enter(PipelineState::SelectingPlanes);
        let started = Instant::now();
        self.run.config.validate()?;

        let descriptor = self.run.source.descriptor().clone();
        if descriptor.plane_count == 0 || descriptor.channel_count == 0 {
            return Err(PipelineError::EmptyStack {
                planes: descriptor.plane_count,
                channels: descriptor.channel_count,
            });
        }
        for warning in self.run.source.warnings() {
            self.run.warn(warning);
        }
        if descriptor.plane_count == 1 {
            self.run.warn(PipelineWarning::SinglePlane);
        }

        let planes = PlaneSelection::resolve(selection, descriptor.plane_count)?;
        let tiles = enumerate_tiles(&planes, descriptor.channel_count)?;
        let luts = self.run.config.channel_luts(&descriptor);
        tracing::info!(
            selection = %selection.kind(),
            planes = planes.len(),
            tiles = tiles.len(),
            "planes selected"
        );

        self.run
            .record(PipelineState::SelectingPlanes, started.elapsed());
        Ok(PlanesSelected {
            run: self.run,
            descriptor,
            planes,
            tiles,
            luts,
        })
    }
}

// ───────────────────────── Stage 1: PlanesSelected ───────────────────

/// Pipeline state after the plane selection was resolved.
///
/// Call [`extract_tiles`](Self::extract_tiles) to advance.
#[must_use = "pipeline stages are consumed by advancing: call .extract_tiles() to continue"]
pub struct PlanesSelected<'a, S: ?Sized, R: ?Sized> {
    run: Run<'a, S, R>,
    descriptor: StackDescriptor,
    planes: PlaneSelection,
    tiles: Vec<TileKey>,
    luts: Vec<ChannelLut>,
}

impl<'a, S: ImageSource + ?Sized, R: RasterStore + ?Sized> PlanesSelected<'a, S, R> {
    /// The source stack's descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &StackDescriptor {
        &self.descriptor
    }

    /// The resolved planes.
    #[must_use]
    pub const fn planes(&self) -> &PlaneSelection {
        &self.planes
    }

    /// Every tile the run will write, in canonical order.
    #[must_use]
    pub fn tiles(&self) -> &[TileKey] {
        &self.tiles
    }

    /// Always [`PipelineState::ExtractingTiles`].
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        PipelineState::ExtractingTiles
    }

    /// Write one tile per selected (plane, channel) and one composite per
    /// selected plane to the store. The first plane's composite carries
    /// the scale bar when the stack is calibrated.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StaleTiles`] if the store already holds
    /// tiles, [`PipelineError::RasterSizeMismatch`] if the source yields a
    /// raster of the wrong size, and any error of the source or store.
    pub fn extract_tiles(mut self) -> Result<TilesExtracted<'a, S, R>, PipelineError> {
        enter(PipelineState::ExtractingTiles);
        let stale = self.run.store.list(TILE_PREFIX)?;
        if !stale.is_empty() {
            return Err(PipelineError::StaleTiles { found: stale.len() });
        }

        let calibration = &self.descriptor.calibration;
        let scale_bar =
            ScaleBarSpec::for_image(calibration, self.descriptor.dimensions, &self.run.config.scale_bar);
        match &scale_bar {
            Some(bar) => tracing::info!(label = %bar.label(), pixels = bar.pixel_length, "scale bar sized"),
            None if !calibration.is_calibrated() => self.run.warn(PipelineWarning::Uncalibrated),
            None => tracing::warn!(
                pixel_width = calibration.pixel_width,
                "no scale bar length fits this image"
            ),
        }

        let first = self.planes.first();
        let mut extracting = Duration::ZERO;
        let mut compositing = Duration::ZERO;
        let mut written = 0;

        for &plane in self.planes.planes() {
            let started = Instant::now();
            let mut channels: Vec<(GrayImage, ChannelLut)> =
                Vec::with_capacity(self.luts.len());
            for channel in 1..=self.descriptor.channel_count {
                let key = TileKey::channel(plane, channel)?;
                let raster = self.run.source.raster(plane, channel)?;
                if Dimensions::of(&raster) != self.descriptor.dimensions {
                    return Err(PipelineError::RasterSizeMismatch {
                        name: key.canonical_name(),
                        expected: self.descriptor.dimensions,
                        actual: Dimensions::of(&raster),
                    });
                }
                let tile = Tile {
                    key,
                    raster: TileRaster::Channel {
                        raster,
                        lut: self.lut(channel),
                    },
                    scale_bar: None,
                };
                self.run.save_tile(&tile)?;
                written += 1;
                if let TileRaster::Channel { raster, lut } = tile.raster {
                    channels.push((raster, lut));
                }
            }
            extracting += started.elapsed();

            let started = Instant::now();
            let inputs: Vec<(&GrayImage, ChannelLut)> =
                channels.iter().map(|(raster, lut)| (raster, *lut)).collect();
            let tile = Tile {
                key: TileKey::composite(plane)?,
                raster: TileRaster::Composite(merge_channels(&inputs)?),
                scale_bar: if plane == first {
                    scale_bar.clone()
                } else {
                    None
                },
            };
            self.run.save_tile(&tile)?;
            written += 1;
            compositing += started.elapsed();
        }

        tracing::info!(tiles = written, "tiles written");
        self.run.record(PipelineState::ExtractingTiles, extracting);
        self.run.record(PipelineState::Compositing, compositing);
        Ok(TilesExtracted {
            run: self.run,
            descriptor: self.descriptor,
            planes: self.planes,
            tiles: self.tiles,
            written,
            scale_bar,
        })
    }

    fn lut(&self, channel: u32) -> ChannelLut {
        channel
            .checked_sub(1)
            .and_then(|i| self.luts.get(i as usize))
            .copied()
            .unwrap_or_else(|| self.descriptor.lut(channel))
    }
}

// ───────────────────────── Stage 2: TilesExtracted ───────────────────

/// Pipeline state after every tile was written to the store.
///
/// Call [`restack`](Self::restack) to advance.
#[must_use = "pipeline stages are consumed by advancing: call .restack() to continue"]
pub struct TilesExtracted<'a, S: ?Sized, R: ?Sized> {
    run: Run<'a, S, R>,
    descriptor: StackDescriptor,
    planes: PlaneSelection,
    tiles: Vec<TileKey>,
    written: usize,
    scale_bar: Option<ScaleBarSpec>,
}

impl<'a, S: ImageSource + ?Sized, R: RasterStore + ?Sized> TilesExtracted<'a, S, R> {
    /// Number of tiles written.
    #[must_use]
    pub const fn tiles_written(&self) -> usize {
        self.written
    }

    /// Scale bar burned into the first composite, if any.
    #[must_use]
    pub const fn scale_bar(&self) -> Option<&ScaleBarSpec> {
        self.scale_bar.as_ref()
    }

    /// Always [`PipelineState::Restacking`].
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        PipelineState::Restacking
    }

    /// Read the stored tiles back in canonical-name order, removing each
    /// from the store.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TileCountMismatch`] when the store holds a
    /// different number of tiles than were written and
    /// [`PipelineError::UnrecognizedTile`] when a stored name is not one
    /// of this run's tiles. Both checks happen before anything is removed.
    pub fn restack(mut self) -> Result<Restacked<'a, S, R>, PipelineError> {
        enter(PipelineState::Restacking);
        let started = Instant::now();

        let mut names = self.run.store.list(TILE_PREFIX)?;
        names.sort();
        if names.len() != self.tiles.len() {
            return Err(PipelineError::TileCountMismatch {
                expected: self.tiles.len(),
                found: names.len(),
            });
        }
        let keys = names
            .iter()
            .map(|name| name.parse::<TileKey>())
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(index) = (0..keys.len()).find(|&i| keys[i] != self.tiles[i]) {
            return Err(PipelineError::UnrecognizedTile(names[index].clone()));
        }

        let mut frames = Vec::with_capacity(names.len());
        for name in names {
            let raster = self.run.store.load(&name)?;
            self.run.store.remove(&name)?;
            tracing::debug!(%name, "tile restacked");
            frames.push(Frame { name, raster });
        }

        self.run.record(PipelineState::Restacking, started.elapsed());
        Ok(Restacked {
            run: self.run,
            descriptor: self.descriptor,
            planes: self.planes,
            written: self.written,
            scale_bar: self.scale_bar,
            frames,
        })
    }
}

// ───────────────────────── Stage 3: Restacked ────────────────────────

/// Pipeline state after the tiles were read back in order.
///
/// Call [`lay_out`](Self::lay_out) to advance.
#[must_use = "pipeline stages are consumed by advancing: call .lay_out() to continue"]
pub struct Restacked<'a, S: ?Sized, R: ?Sized> {
    run: Run<'a, S, R>,
    descriptor: StackDescriptor,
    planes: PlaneSelection,
    written: usize,
    scale_bar: Option<ScaleBarSpec>,
    frames: Vec<Frame>,
}

impl<'a, S: ImageSource + ?Sized, R: RasterStore + ?Sized> Restacked<'a, S, R> {
    /// The reconstructed stack, in canonical order.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Always [`PipelineState::LayingOut`].
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        PipelineState::LayingOut
    }

    /// Assemble the reconstructed stack into the montage grid.
    ///
    /// # Errors
    ///
    /// Returns any error of [`assemble`].
    pub fn lay_out(mut self) -> Result<LaidOut<'a, S, R>, PipelineError> {
        enter(PipelineState::LayingOut);
        let started = Instant::now();

        let empty = || PipelineError::EmptyStack {
            planes: self.descriptor.plane_count,
            channels: self.descriptor.channel_count,
        };
        let columns = u32::try_from(self.planes.len())
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(empty)?;
        let channels = NonZeroU32::new(self.descriptor.channel_count).ok_or_else(empty)?;
        let geometry = MontageGeometry::with_scale(columns, channels, self.run.config.scale);

        let montage = assemble(&self.frames, &geometry, self.run.font.as_ref())?;
        tracing::info!(
            columns = geometry.columns,
            rows = geometry.rows,
            width = montage.width(),
            height = montage.height(),
            "montage assembled"
        );

        self.run.record(PipelineState::LayingOut, started.elapsed());
        Ok(LaidOut {
            run: self.run,
            descriptor: self.descriptor,
            planes: self.planes,
            written: self.written,
            scale_bar: self.scale_bar,
            geometry,
            montage,
            saved_as: None,
        })
    }
}

// ───────────────────────── Stage 4: LaidOut ──────────────────────────

/// Pipeline state after the montage was assembled: the final stage.
///
/// Optionally [`persist`](Self::persist) the montage, then call
/// [`into_result`](Self::into_result).
#[must_use = "call .into_result() to extract the MontageResult"]
pub struct LaidOut<'a, S: ?Sized, R: ?Sized> {
    run: Run<'a, S, R>,
    descriptor: StackDescriptor,
    planes: PlaneSelection,
    written: usize,
    scale_bar: Option<ScaleBarSpec>,
    geometry: MontageGeometry,
    montage: RgbImage,
    saved_as: Option<String>,
}

impl<S: ImageSource + ?Sized, R: RasterStore + ?Sized> LaidOut<'_, S, R> {
    /// The assembled montage.
    #[must_use]
    pub const fn montage(&self) -> &RgbImage {
        &self.montage
    }

    /// The grid the montage was laid out on.
    #[must_use]
    pub const fn geometry(&self) -> &MontageGeometry {
        &self.geometry
    }

    /// Always [`PipelineState::Done`].
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        PipelineState::Done
    }

    /// Save the montage to the store as `"{stem}_Montage"` and return
    /// that name.
    ///
    /// # Errors
    ///
    /// Returns any error of the store.
    pub fn persist(&mut self, stem: &str) -> Result<String, PipelineError> {
        let name = montage_name(stem);
        self.run.store.save(&name, &self.montage)?;
        tracing::info!(%name, "montage saved");
        self.saved_as = Some(name.clone());
        Ok(name)
    }

    /// Consume the pipeline and return the montage with its report.
    pub fn into_result(self) -> MontageResult {
        let report = RunReport {
            descriptor: self.descriptor,
            selected_planes: self.planes.planes().to_vec(),
            tiles_written: self.written,
            scale_bar: self.scale_bar,
            geometry: self.geometry,
            montage_size: Dimensions::of(&self.montage),
            warnings: self.run.warnings,
            stages: self.run.stages,
            total_duration: self.run.started.elapsed(),
        };
        tracing::info!(state = %PipelineState::Done, "montage complete");
        MontageResult {
            montage: self.montage,
            saved_as: self.saved_as,
            report,
        }
    }
}

/// Output of a finished run.
#[derive(Debug, Clone)]
pub struct MontageResult {
    /// The assembled montage.
    pub montage: RgbImage,
    /// Store name the montage was persisted under, if it was.
    pub saved_as: Option<String>,
    /// Diagnostics of the run.
    pub report: RunReport,
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental montage pipeline.
///
/// Created via [`Pipeline::new`], which borrows the source and store and
/// takes the configuration without doing any work. Each stage method
/// consumes the current state and returns the next, making it a
/// compile-time error to skip stages or call them out of order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline reading from `source` and using `store` for
    /// intermediate tiles.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<'a, S: ImageSource + ?Sized, R: RasterStore + ?Sized>(
        source: &'a mut S,
        store: &'a mut R,
        config: MontageConfig,
    ) -> Pending<'a, S, R> {
        Pending {
            run: Run {
                source,
                store,
                config,
                font: None,
                warnings: Vec::new(),
                stages: Vec::new(),
                started: Instant::now(),
            },
        }
    }
}

/// Run the whole pipeline with the selection and save flag of `config`.
///
/// When `config.save_montage` is set the montage is persisted under
/// [`montage_name`]`(stem)`.
///
/// # Errors
///
/// Returns the first error of any stage; the failure is logged as a
/// transition to [`PipelineState::Failed`].
pub fn build_montage<S: ImageSource + ?Sized, R: RasterStore + ?Sized>(
    source: &mut S,
    store: &mut R,
    config: MontageConfig,
    font: Option<FontArc>,
    stem: &str,
) -> Result<MontageResult, PipelineError> {
    let selection = config.slice_selection();
    let save = config.save_montage;
    let run = || -> Result<MontageResult, PipelineError> {
        let mut pending = Pipeline::new(source, store, config);
        if let Some(font) = font {
            pending = pending.with_font(font);
        }
        let mut laid_out = pending
            .select_planes(&selection)?
            .extract_tiles()?
            .restack()?
            .lay_out()?;
        if save {
            laid_out.persist(stem)?;
        }
        Ok(laid_out.into_result())
    };
    run().inspect_err(|error| {
        tracing::error!(state = %PipelineState::Failed, %error, "montage failed");
    })
}
