//! Tile identities and their canonical, sortable names.
//!
//! Every tile of a montage is addressed by a [`TileKey`]: a plane and
//! either a channel or the plane's composite. The key's canonical name is
//! the only link between extraction and reconstruction: tiles are stored
//! under it and read back in its lexicographic order. [`TileKey`]'s `Ord`
//! is derived to agree with that string order, so sorting keys and
//! sorting names are interchangeable.
//!
//! Name layout (`zzz` = 3-digit plane, `cc` = 2-digit channel):
//!
//! ```text
//! temp_z001_c00_composite
//! temp_z001_c01
//! temp_z001_c02
//! temp_z003_c00_composite
//! ...
//! ```
//!
//! Channel number `00` is reserved for the composite, which therefore
//! sorts ahead of its plane's channel tiles and ends up in the top row.

use std::fmt;
use std::str::FromStr;

use ab_glyph::FontArc;
use serde::{Deserialize, Serialize};

use crate::merge::colorize;
use crate::overlay::burn_scale_bar;
use crate::scale_bar::ScaleBarSpec;
use crate::selection::PlaneSelection;
use crate::types::{ChannelLut, GrayImage, PipelineError, PipelineWarning, RgbImage};

/// Prefix shared by every intermediate tile name.
pub const TILE_PREFIX: &str = "temp_";

/// Largest plane index a canonical name can encode.
pub const MAX_PLANE: u32 = 999;

/// Largest channel index a canonical name can encode.
pub const MAX_CHANNEL: u32 = 99;

const COMPOSITE_SUFFIX: &str = "_composite";

/// What a tile shows.
///
/// Variant order matters: `Composite` sorts before any `Channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TileKind {
    /// Merged color image of all channels of a plane.
    Composite,
    /// A single 1-based channel.
    Channel(u8),
}

/// Identity of one montage tile.
///
/// Field order matters: keys sort by plane first, then kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileKey {
    plane: u16,
    kind: TileKind,
}

impl TileKey {
    /// Composite tile of `plane`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TileIndexOutOfRange`] for plane 0 or a
    /// plane above [`MAX_PLANE`].
    pub fn composite(plane: u32) -> Result<Self, PipelineError> {
        Ok(Self {
            plane: checked_plane(plane)?,
            kind: TileKind::Composite,
        })
    }

    /// Channel tile `channel` of `plane`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TileIndexOutOfRange`] when either index is 0
    /// or exceeds [`MAX_PLANE`] / [`MAX_CHANNEL`].
    pub fn channel(plane: u32, channel: u32) -> Result<Self, PipelineError> {
        Ok(Self {
            plane: checked_plane(plane)?,
            kind: TileKind::Channel(checked_channel(channel)?),
        })
    }

    /// 1-based plane index.
    #[must_use]
    pub fn plane(self) -> u32 {
        u32::from(self.plane)
    }

    /// Tile kind.
    #[must_use]
    pub const fn kind(self) -> TileKind {
        self.kind
    }

    /// 1-based channel index, or `None` for the composite.
    #[must_use]
    pub fn channel_index(self) -> Option<u32> {
        match self.kind {
            TileKind::Composite => None,
            TileKind::Channel(c) => Some(u32::from(c)),
        }
    }

    /// The canonical storage name.
    #[must_use]
    pub fn canonical_name(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TileKind::Composite => write!(
                f,
                "{TILE_PREFIX}z{:03}_c00{COMPOSITE_SUFFIX}",
                self.plane
            ),
            TileKind::Channel(c) => write!(f, "{TILE_PREFIX}z{:03}_c{c:02}", self.plane),
        }
    }
}

impl FromStr for TileKey {
    type Err = PipelineError;

    /// Parse a canonical name back into its key. Only the exact canonical
    /// spelling is accepted, so parse and display round-trip.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unrecognized = || PipelineError::UnrecognizedTile(name.to_owned());

        let rest = name.strip_prefix(TILE_PREFIX).ok_or_else(unrecognized)?;
        let rest = rest.strip_prefix('z').ok_or_else(unrecognized)?;
        let (plane, rest) = split_digits(rest, 3).ok_or_else(unrecognized)?;
        let rest = rest.strip_prefix("_c").ok_or_else(unrecognized)?;
        let (channel, rest) = split_digits(rest, 2).ok_or_else(unrecognized)?;

        let key = match (channel, rest) {
            (0, COMPOSITE_SUFFIX) => Self::composite(plane),
            (1.., "") => Self::channel(plane, channel),
            _ => return Err(unrecognized()),
        };
        key.map_err(|_| unrecognized())
    }
}

/// Split exactly `width` leading ASCII digits off `s`.
fn split_digits(s: &str, width: usize) -> Option<(u32, &str)> {
    let digits = s.get(..width)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, &s[width..]))
}

#[allow(clippy::cast_possible_truncation)]
fn checked_plane(plane: u32) -> Result<u16, PipelineError> {
    if (1..=MAX_PLANE).contains(&plane) {
        Ok(plane as u16)
    } else {
        Err(PipelineError::TileIndexOutOfRange {
            axis: "plane",
            value: plane,
            max: MAX_PLANE,
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn checked_channel(channel: u32) -> Result<u8, PipelineError> {
    if (1..=MAX_CHANNEL).contains(&channel) {
        Ok(channel as u8)
    } else {
        Err(PipelineError::TileIndexOutOfRange {
            axis: "channel",
            value: channel,
            max: MAX_CHANNEL,
        })
    }
}

/// Enumerate every tile of a montage in canonical order.
///
/// For each selected plane (increasing): the composite, then channels
/// `1..=channel_count`. The result has `selection.len() * (channel_count + 1)`
/// entries and is already sorted by canonical name.
///
/// # Errors
///
/// Returns [`PipelineError::TileIndexOutOfRange`] if a plane or the channel
/// count cannot be encoded in a canonical name, or if `channel_count` is 0.
pub fn enumerate_tiles(
    selection: &PlaneSelection,
    channel_count: u32,
) -> Result<Vec<TileKey>, PipelineError> {
    checked_channel(channel_count)?;
    let mut tiles = Vec::with_capacity(selection.len() * (channel_count as usize + 1));
    for &plane in selection.planes() {
        tiles.push(TileKey::composite(plane)?);
        for channel in 1..=channel_count {
            tiles.push(TileKey::channel(plane, channel)?);
        }
    }
    Ok(tiles)
}

/// Pixels of a materialized tile.
#[derive(Debug, Clone)]
pub enum TileRaster {
    /// One channel with its lookup.
    Channel {
        /// Raw channel intensities.
        raster: GrayImage,
        /// Lookup copied from the source channel.
        lut: ChannelLut,
    },
    /// Merged color image of a plane.
    Composite(RgbImage),
}

/// A materialized tile: pixels plus overlay layers, not yet flattened.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Identity and storage name.
    pub key: TileKey,
    /// Tile pixels.
    pub raster: TileRaster,
    /// Scale bar overlay, present only on the first composite.
    pub scale_bar: Option<ScaleBarSpec>,
}

impl Tile {
    /// Burn lookups and overlays into an RGB raster for storage.
    #[must_use]
    pub fn flatten(&self, font: Option<&FontArc>) -> (RgbImage, Option<PipelineWarning>) {
        let mut flat = match &self.raster {
            TileRaster::Channel { raster, lut } => colorize(raster, *lut),
            TileRaster::Composite(rgb) => rgb.clone(),
        };
        let warning = self
            .scale_bar
            .as_ref()
            .and_then(|spec| burn_scale_bar(&mut flat, spec, font));
        (flat, warning)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::selection::SliceSelection;

    fn select(text: &str, n: u32) -> PlaneSelection {
        PlaneSelection::resolve(&SliceSelection::Custom(text.to_owned()), n).unwrap()
    }

    #[test]
    fn canonical_names() {
        assert_eq!(
            TileKey::composite(7).unwrap().canonical_name(),
            "temp_z007_c00_composite"
        );
        assert_eq!(
            TileKey::channel(12, 3).unwrap().canonical_name(),
            "temp_z012_c03"
        );
        assert_eq!(
            TileKey::channel(999, 99).unwrap().canonical_name(),
            "temp_z999_c99"
        );
    }

    #[test]
    fn composite_sorts_first_within_plane() {
        let composite = TileKey::composite(2).unwrap();
        let first_channel = TileKey::channel(2, 1).unwrap();
        let previous_plane = TileKey::channel(1, 99).unwrap();
        assert!(previous_plane < composite);
        assert!(composite < first_channel);
        assert!(previous_plane.canonical_name() < composite.canonical_name());
        assert!(composite.canonical_name() < first_channel.canonical_name());
    }

    #[test]
    fn enumeration_order_two_planes_two_channels() {
        let tiles = enumerate_tiles(&select("1,2", 2), 2).unwrap();
        let names: Vec<String> = tiles.iter().map(|t| t.canonical_name()).collect();
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
    fn enumeration_skips_unselected_planes() {
        let tiles = enumerate_tiles(&select("2,5", 6), 1).unwrap();
        let planes: Vec<u32> = tiles.iter().map(|t| t.plane()).collect();
        assert_eq!(planes, [2, 2, 5, 5]);
        assert_eq!(tiles[1].channel_index(), Some(1));
        assert_eq!(tiles[0].channel_index(), None);
    }

    #[test]
    fn enumeration_rejects_unencodable_counts() {
        let sel = select("1", 1);
        assert!(matches!(
            enumerate_tiles(&sel, 0),
            Err(PipelineError::TileIndexOutOfRange { axis: "channel", .. })
        ));
        assert!(matches!(
            enumerate_tiles(&sel, 100),
            Err(PipelineError::TileIndexOutOfRange { axis: "channel", .. })
        ));
        let big = PlaneSelection::resolve(&SliceSelection::All, 1000).unwrap();
        assert!(matches!(
            enumerate_tiles(&big, 1),
            Err(PipelineError::TileIndexOutOfRange { axis: "plane", .. })
        ));
    }

    #[test]
    fn parse_accepts_canonical_names_only() {
        assert_eq!(
            "temp_z004_c00_composite".parse::<TileKey>().unwrap(),
            TileKey::composite(4).unwrap()
        );
        assert_eq!(
            "temp_z010_c02".parse::<TileKey>().unwrap(),
            TileKey::channel(10, 2).unwrap()
        );
        for bad in [
            "temp_z000_c01",
            "temp_z001_c00",
            "temp_z001_c01_composite",
            "temp_z1_c01",
            "temp_z001_c1",
            "temp_z001_c01.png",
            "z001_c01",
            "temp_zabc_c01",
            "temp_z001_c+1",
        ] {
            assert!(
                matches!(bad.parse::<TileKey>(), Err(PipelineError::UnrecognizedTile(_))),
                "{bad} accepted",
            );
        }
    }

    #[test]
    fn channel_tile_flattens_through_its_lut() {
        let tile = Tile {
            key: TileKey::channel(1, 1).unwrap(),
            raster: TileRaster::Channel {
                raster: GrayImage::from_pixel(2, 2, image::Luma([255])),
                lut: ChannelLut::CYAN,
            },
            scale_bar: None,
        };
        let (flat, warning) = tile.flatten(None);
        assert!(warning.is_none());
        assert!(flat.pixels().all(|p| p.0 == [0, 255, 255]));
    }

    #[test]
    fn composite_overlay_is_kept_until_flattened() {
        let spec = ScaleBarSpec {
            length: 1.0,
            unit: "µm".to_owned(),
            pixel_length: 4.0,
            stroke_width: 1,
            font_size: 4,
            x: 2,
            y: 8,
            show_length: false,
        };
        let tile = Tile {
            key: TileKey::composite(1).unwrap(),
            raster: TileRaster::Composite(RgbImage::new(10, 10)),
            scale_bar: Some(spec),
        };
        let (flat, _) = tile.flatten(None);
        assert_eq!(flat.get_pixel(3, 8).0, [255, 255, 255]);
        let TileRaster::Composite(original) = &tile.raster else {
            unreachable!("constructed as composite");
        };
        assert_eq!(original.get_pixel(3, 8).0, [0, 0, 0]);
    }

    proptest! {
        #[test]
        fn sorted_names_reproduce_emission_order(
            planes in proptest::collection::btree_set(1u32..=999, 1..40),
            channels in 1u32..=99,
        ) {
            let text = planes.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
            let sel = select(&text, 999);
            let tiles = enumerate_tiles(&sel, channels).unwrap();
            prop_assert_eq!(tiles.len(), planes.len() * (channels as usize + 1));

            let emitted: Vec<String> = tiles.iter().map(|t| t.canonical_name()).collect();
            let mut sorted = emitted.clone();
            sorted.sort();
            prop_assert_eq!(&sorted, &emitted);

            let mut keys = tiles.clone();
            keys.sort();
            prop_assert_eq!(&keys, &tiles);

            for (name, key) in emitted.iter().zip(&tiles) {
                prop_assert_eq!(name.parse::<TileKey>().unwrap(), *key);
            }
        }
    }
}
