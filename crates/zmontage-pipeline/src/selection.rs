//! Plane selection: which z planes of the stack end up in the montage.
//!
//! A [`SliceSelection`] is the user-facing request ("all", "odd", or an
//! explicit comma-separated list); [`PlaneSelection::resolve`] turns it
//! into a validated, strictly increasing list of 1-based plane indices.
//! Invalid input fails as a whole; a partially built selection is never
//! returned.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors from resolving a custom plane list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// The text contains something other than digits, spaces, and commas,
    /// or a token is not a positive integer.
    #[error(
        "invalid plane list {0:?}: only positive numbers separated by commas (and spaces) are allowed"
    )]
    InvalidSyntax(String),

    /// No listed plane exists in the stack.
    #[error("plane list must contain at least one plane number no larger than the plane count")]
    Empty,
}

/// Kind of selection, without the custom text.
///
/// This is what the configuration file and the CLI's `--slices` flag carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionKind {
    /// Every plane.
    #[default]
    All,
    /// Planes 1, 3, 5, ...
    Odd,
    /// An explicit comma-separated list.
    Custom,
}

impl SelectionKind {
    /// Attach the custom text (ignored unless `self` is [`Custom`](Self::Custom)).
    #[must_use]
    pub fn with_text(self, custom: &str) -> SliceSelection {
        match self {
            Self::All => SliceSelection::All,
            Self::Odd => SliceSelection::Odd,
            Self::Custom => SliceSelection::Custom(custom.to_owned()),
        }
    }
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Odd => "odd",
            Self::Custom => "custom",
        })
    }
}

impl FromStr for SelectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "odd" => Ok(Self::Odd),
            "custom" => Ok(Self::Custom),
            other => Err(format!(
                "unknown selection {other:?}, expected all, odd, or custom"
            )),
        }
    }
}

/// A user request for which planes to include.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceSelection {
    /// Every plane.
    All,
    /// Odd planes only.
    Odd,
    /// Comma-separated plane numbers, e.g. `"1, 6, 7"`.
    Custom(String),
}

impl SliceSelection {
    /// The kind of this selection.
    #[must_use]
    pub const fn kind(&self) -> SelectionKind {
        match self {
            Self::All => SelectionKind::All,
            Self::Odd => SelectionKind::Odd,
            Self::Custom(_) => SelectionKind::Custom,
        }
    }
}

/// Validated plane indices: 1-based, strictly increasing, non-empty,
/// each no larger than the stack's plane count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaneSelection(Vec<u32>);

impl PlaneSelection {
    /// Resolve `selection` against a stack with `plane_count` planes.
    ///
    /// Custom plane numbers larger than `plane_count` are dropped without
    /// error; duplicates and ordering in the input are normalized away.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::InvalidSyntax`] when custom text contains
    /// characters other than digits, spaces, and commas, or a token that is
    /// empty, zero, or has inner spaces. Returns [`SelectionError::Empty`]
    /// when nothing remains.
    pub fn resolve(selection: &SliceSelection, plane_count: u32) -> Result<Self, SelectionError> {
        let planes: Vec<u32> = match selection {
            SliceSelection::All => (1..=plane_count).collect(),
            SliceSelection::Odd => (1..=plane_count).step_by(2).collect(),
            SliceSelection::Custom(text) => parse_custom(text, plane_count)?,
        };
        if planes.is_empty() {
            return Err(SelectionError::Empty);
        }
        Ok(Self(planes))
    }

    /// The selected planes in increasing order.
    #[must_use]
    pub fn planes(&self) -> &[u32] {
        &self.0
    }

    /// Number of selected planes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a resolved selection.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The lowest selected plane.
    #[must_use]
    pub fn first(&self) -> u32 {
        self.0.first().copied().unwrap_or_default()
    }

    /// Whether `plane` is selected.
    #[must_use]
    pub fn contains(&self, plane: u32) -> bool {
        self.0.binary_search(&plane).is_ok()
    }
}

fn parse_custom(text: &str, plane_count: u32) -> Result<Vec<u32>, SelectionError> {
    let syntax_error = || SelectionError::InvalidSyntax(text.to_owned());

    if text.is_empty()
        || !text
            .chars()
            .all(|c| c.is_ascii_digit() || c == ',' || c == ' ')
    {
        return Err(syntax_error());
    }

    let mut planes = Vec::new();
    for token in text.split(',').map(|t| t.trim_matches(' ')) {
        if token.is_empty() || token.contains(' ') {
            return Err(syntax_error());
        }
        // All-digit tokens only fail to parse on overflow, which is
        // necessarily beyond the plane count.
        let Ok(plane) = token.parse::<u32>() else {
            continue;
        };
        if plane == 0 {
            return Err(syntax_error());
        }
        if plane <= plane_count {
            planes.push(plane);
        }
    }
    planes.sort_unstable();
    planes.dedup();
    Ok(planes)
}
