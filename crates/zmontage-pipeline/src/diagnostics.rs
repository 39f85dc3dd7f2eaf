//! Run diagnostics: what was selected, what was written, and how long
//! each stage took.
//!
//! Every run of the [`Pipeline`](crate::Pipeline) collects a [`RunReport`]
//! alongside the montage. The report is serializable so the CLI can emit
//! it as JSON; [`RunReport::report`] renders it for humans.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::layout::MontageGeometry;
use crate::pipeline::PipelineState;
use crate::scale_bar::ScaleBarSpec;
use crate::types::{Dimensions, PipelineWarning, StackDescriptor};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Wall-clock time spent in one pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    /// The state the pipeline was in.
    pub state: PipelineState,
    /// Time spent in it (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Diagnostics collected from a single montage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Source stack as opened.
    pub descriptor: StackDescriptor,
    /// Planes included in the montage, increasing.
    pub selected_planes: Vec<u32>,
    /// Intermediate tiles written (composites included).
    pub tiles_written: usize,
    /// Scale bar burned into the first composite, if the stack is calibrated.
    pub scale_bar: Option<ScaleBarSpec>,
    /// Grid handed to the compositor.
    pub geometry: MontageGeometry,
    /// Size of the assembled montage.
    pub montage_size: Dimensions,
    /// Non-fatal conditions, in the order they were noticed.
    pub warnings: Vec<PipelineWarning>,
    /// Per-state durations, in execution order.
    pub stages: Vec<StageTiming>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl RunReport {
    /// Format the report for a terminal.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Montage Report\n{}", "=".repeat(60)));
        let d = &self.descriptor;
        lines.push(format!(
            "Stack: {}x{}, {} planes x {} channels",
            d.dimensions.width, d.dimensions.height, d.plane_count, d.channel_count,
        ));
        lines.push(format!("Planes: {}", format_planes(&self.selected_planes)));
        lines.push(format!(
            "Montage: {}x{} ({} columns x {} rows, scale {:.2})",
            self.montage_size.width,
            self.montage_size.height,
            self.geometry.columns,
            self.geometry.rows,
            self.geometry.scale,
        ));
        lines.push(format!("Tiles written: {}", self.tiles_written));
        lines.push(match &self.scale_bar {
            Some(bar) => format!("Scale bar: {} ({:.1}px)", bar.label(), bar.pixel_length),
            None => "Scale bar: none".to_owned(),
        });
        lines.push(String::new());

        lines.push(format!("{:<24} {:>10} {:>10}", "Stage", "Duration", "% Total"));
        lines.push("-".repeat(46));
        let total_ms = duration_ms(self.total_duration);
        for timing in &self.stages {
            let ms = duration_ms(timing.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "{:<24} {ms:>8.3}ms {pct:>9.1}%",
                timing.state.to_string()
            ));
        }
        lines.push(format!("{:<24} {total_ms:>8.3}ms", "Total"));

        if !self.warnings.is_empty() {
            lines.push(String::new());
            for warning in &self.warnings {
                lines.push(format!("warning: {warning}"));
            }
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Compact plane list: runs of consecutive planes collapse to `a-b`.
fn format_planes(planes: &[u32]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = planes.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        parts.push(if start == end {
            start.to_string()
        } else {
            format!("{start}-{end}")
        });
    }
    parts.join(",")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;
    use crate::types::Calibration;

    fn sample() -> RunReport {
        RunReport {
            descriptor: StackDescriptor {
                dimensions: Dimensions {
                    width: 100,
                    height: 80,
                },
                plane_count: 5,
                channel_count: 2,
                calibration: Calibration::uncalibrated(),
                channel_luts: Vec::new(),
            },
            selected_planes: vec![1, 3, 5],
            tiles_written: 9,
            scale_bar: None,
            geometry: MontageGeometry::new(NonZeroU32::new(3).unwrap(), NonZeroU32::new(2).unwrap()),
            montage_size: Dimensions {
                width: 255,
                height: 204,
            },
            warnings: vec![PipelineWarning::Uncalibrated],
            stages: vec![
                StageTiming {
                    state: PipelineState::ExtractingTiles,
                    duration: Duration::from_millis(30),
                },
                StageTiming {
                    state: PipelineState::LayingOut,
                    duration: Duration::from_millis(10),
                },
            ],
            total_duration: Duration::from_millis(40),
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn plane_runs_collapse() {
        assert_eq!(format_planes(&[1, 2, 3, 6, 7, 42]), "1-3,6-7,42");
        assert_eq!(format_planes(&[1, 3, 5]), "1,3,5");
        assert_eq!(format_planes(&[]), "");
    }

    #[test]
    fn report_lists_stages_and_warnings() {
        let report = sample().report();
        assert!(report.contains("Montage Report"));
        assert!(report.contains("3 columns x 3 rows"));
        assert!(report.contains("EXTRACTING_TILES"));
        assert!(report.contains("Scale bar: none"));
        assert!(report.contains("warning: image is not spatially calibrated"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["total_duration"], serde_json::json!(0.04));
        assert_eq!(json["stages"][0]["state"], "ExtractingTiles");

        let back: RunReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.selected_planes, [1, 3, 5]);
        assert_eq!(back.stages[1].state, PipelineState::LayingOut);
        assert!((back.total_duration.as_secs_f64() - 0.04).abs() < 1e-9);
    }
}
