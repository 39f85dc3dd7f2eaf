//! Montage grid geometry.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, MontageConfig};

/// How consecutive frames fill the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillOrder {
    /// Down each column, then to the next column.
    ///
    /// Restacked tiles are grouped per plane, so each plane occupies one
    /// column with its composite on top.
    ColumnMajor,
    /// Along each row, then to the next row.
    RowMajor,
}

/// Grid parameters handed to the montage compositor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MontageGeometry {
    /// One column per selected plane.
    pub columns: u32,
    /// One row per channel plus the composite row.
    pub rows: u32,
    /// Display scale applied to each tile.
    pub scale: f64,
    /// First frame placed (1-based, inclusive).
    pub first: u32,
    /// Last frame placed (1-based, inclusive).
    pub last: u32,
    /// Frame step.
    pub increment: u32,
    /// Gap between cells in pixels.
    pub border_width: u32,
    /// Draw each frame's name in its cell.
    pub labels: bool,
    /// Grid fill order.
    pub fill: FillOrder,
}

impl MontageGeometry {
    /// Geometry for `planes` selected planes of a stack with `channels`
    /// channels, at the default display scale.
    #[must_use]
    pub fn new(planes: NonZeroU32, channels: NonZeroU32) -> Self {
        Self::with_scale(planes, channels, MontageConfig::DEFAULT_SCALE)
    }

    /// Geometry at an explicit display scale.
    #[must_use]
    pub fn with_scale(planes: NonZeroU32, channels: NonZeroU32, scale: f64) -> Self {
        let columns = planes.get();
        let rows = channels.get().saturating_add(1);
        Self {
            columns,
            rows,
            scale,
            first: 1,
            last: columns.saturating_mul(rows),
            increment: 1,
            border_width: 0,
            labels: false,
            fill: FillOrder::ColumnMajor,
        }
    }

    /// Number of cells in the grid.
    #[must_use]
    pub const fn cell_count(&self) -> u32 {
        self.columns.saturating_mul(self.rows)
    }

    /// Size of one scaled tile (truncated, at least one pixel).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn tile_size(&self, source: Dimensions) -> Dimensions {
        let scale = |v: u32| ((f64::from(v) * self.scale) as u32).max(1);
        Dimensions {
            width: scale(source.width),
            height: scale(source.height),
        }
    }

    /// Size of the assembled montage.
    #[must_use]
    pub fn output_size(&self, source: Dimensions) -> Dimensions {
        let tile = self.tile_size(source);
        let span = |cells: u32, cell: u32| {
            cells.saturating_mul(cell)
                + cells.saturating_sub(1).saturating_mul(self.border_width)
        };
        Dimensions {
            width: span(self.columns, tile.width),
            height: span(self.rows, tile.height),
        }
    }

    /// Grid cell `(column, row)` of the `slot`-th placed frame (0-based),
    /// or `None` past the end of the grid.
    #[must_use]
    pub const fn cell(&self, slot: u32) -> Option<(u32, u32)> {
        if slot >= self.cell_count() {
            return None;
        }
        Some(match self.fill {
            FillOrder::ColumnMajor => (slot / self.rows, slot % self.rows),
            FillOrder::RowMajor => (slot % self.columns, slot / self.columns),
        })
    }

    /// 1-based frame numbers placed, in slot order.
    pub fn frames(&self) -> impl Iterator<Item = u32> + use<> {
        (self.first..=self.last).step_by(self.increment.max(1) as usize)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn nz(v: u32) -> NonZeroU32 {
        NonZeroU32::new(v).unwrap()
    }

    #[test]
    fn three_planes_two_channels() {
        let g = MontageGeometry::new(nz(3), nz(2));
        assert_eq!(g.columns, 3);
        assert_eq!(g.rows, 3);
        assert_eq!(g.first, 1);
        assert_eq!(g.last, 9);
        assert_eq!(g.increment, 1);
        assert_eq!(g.border_width, 0);
        assert!(!g.labels);
        assert_eq!(g.scale, 0.85);
    }

    #[test]
    fn column_major_puts_plane_groups_in_columns() {
        let g = MontageGeometry::new(nz(2), nz(2));
        let cells: Vec<_> = (0..6).map(|s| g.cell(s).unwrap()).collect();
        assert_eq!(cells, [(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
        assert_eq!(g.cell(6), None);
    }

    #[test]
    fn row_major_fill() {
        let g = MontageGeometry {
            fill: FillOrder::RowMajor,
            ..MontageGeometry::new(nz(2), nz(2))
        };
        assert_eq!(g.cell(1), Some((1, 0)));
        assert_eq!(g.cell(2), Some((0, 1)));
    }

    #[test]
    fn scaled_sizes() {
        let g = MontageGeometry::new(nz(2), nz(2));
        let source = Dimensions {
            width: 100,
            height: 40,
        };
        assert_eq!(
            g.tile_size(source),
            Dimensions {
                width: 85,
                height: 34
            }
        );
        assert_eq!(
            g.output_size(source),
            Dimensions {
                width: 170,
                height: 102
            }
        );
    }

    #[test]
    fn border_adds_gaps() {
        let g = MontageGeometry {
            border_width: 3,
            ..MontageGeometry::with_scale(nz(3), nz(1), 1.0)
        };
        let size = g.output_size(Dimensions {
            width: 10,
            height: 10,
        });
        assert_eq!(
            size,
            Dimensions {
                width: 36,
                height: 23
            }
        );
    }

    #[test]
    fn tiny_scale_keeps_one_pixel() {
        let g = MontageGeometry::with_scale(nz(1), nz(1), 0.01);
        assert_eq!(
            g.tile_size(Dimensions {
                width: 10,
                height: 10
            }),
            Dimensions {
                width: 1,
                height: 1
            }
        );
    }

    #[test]
    fn frames_follow_range_and_increment() {
        let g = MontageGeometry::new(nz(2), nz(1));
        assert_eq!(g.frames().collect::<Vec<_>>(), [1, 2, 3, 4]);
        let g = MontageGeometry {
            first: 2,
            increment: 2,
            ..g
        };
        assert_eq!(g.frames().collect::<Vec<_>>(), [2, 4]);
    }
}
