//! Flow-direction neighbor templates (D8 and D16)
//!
//! A rule is a square matrix of direction codes centred on the cell. The
//! matrix index of an entry, offset by the rule radius, is the `(dx, dy)`
//! step that the code encodes:
//!
//! ```text
//! D8                 D16
//!   32  64 128         -  16   -   9   -
//!   16   0   1        15   8   1   2  10
//!    8   4   2         -   7   0   3   -
//!                     14   6   5   4  11
//!                      -  13   -  12   -
//! ```
//!
//! `0` at the center means "no outflow". `-` entries in D16 are absent:
//! they are not neighbors at all and are stored as `None`, never as `0`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Code meaning "no outflow" (flat, pit, or unresolved cell)
pub const NO_FLOW: u8 = 0;

/// The four non-diagonal offsets as (dx, dy)
pub const ORTHOGONAL_OFFSETS: [(isize, isize); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

static D8_MATRIX: [[Option<u8>; 3]; 3] = [
    [Some(32), Some(64), Some(128)],
    [Some(16), Some(0), Some(1)],
    [Some(8), Some(4), Some(2)],
];

static D16_MATRIX: [[Option<u8>; 5]; 5] = [
    [None, Some(16), None, Some(9), None],
    [Some(15), Some(8), Some(1), Some(2), Some(10)],
    [None, Some(7), Some(0), Some(3), None],
    [Some(14), Some(6), Some(5), Some(4), Some(11)],
    [None, Some(13), None, Some(12), None],
];

/// Neighbor template used for flow routing and catchment tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NeighborRule {
    /// 3x3 template, 8 neighbors
    #[default]
    D8,
    /// 5x5 template, 16 neighbors (8 adjacent + 8 knight moves)
    D16,
}

impl NeighborRule {
    /// Name as accepted by [`FromStr`]
    pub fn name(&self) -> &'static str {
        match self {
            NeighborRule::D8 => "D8",
            NeighborRule::D16 => "D16",
        }
    }

    /// Half-width of the template
    pub fn radius(&self) -> isize {
        match self {
            NeighborRule::D8 => 1,
            NeighborRule::D16 => 2,
        }
    }

    /// Matrix entry at `(dx, dy)`, `None` outside the template or for absent entries
    fn entry(&self, dx: isize, dy: isize) -> Option<u8> {
        let r = self.radius();
        if dx.abs() > r || dy.abs() > r {
            return None;
        }
        let (iy, ix) = ((dy + r) as usize, (dx + r) as usize);
        match self {
            NeighborRule::D8 => D8_MATRIX[iy][ix],
            NeighborRule::D16 => D16_MATRIX[iy][ix],
        }
    }

    /// Step `(dx, dy)` that a direction code points to.
    ///
    /// `0` maps to `(0, 0)`. A code with no entry in the matrix is a
    /// configuration error.
    pub fn downstream_delta(&self, code: u8) -> Result<(isize, isize)> {
        let r = self.radius();
        for dy in -r..=r {
            for dx in -r..=r {
                if self.entry(dx, dy) == Some(code) {
                    return Ok((dx, dy));
                }
            }
        }
        Err(Error::InvalidDirectionCode { code, rule: self.name() })
    }

    /// Direction code for a step, `None` if the step is not in the template
    pub fn code_from_delta(&self, dx: isize, dy: isize) -> Option<u8> {
        self.entry(dx, dy)
    }

    /// Whether a neighbor at `(dx, dy)` from the current cell, carrying
    /// `neighbor_code`, drains into the current cell.
    pub fn is_upstream(&self, neighbor_code: u8, dx: isize, dy: isize) -> bool {
        if dx == 0 && dy == 0 {
            return false;
        }
        matches!(self.downstream_delta(neighbor_code), Ok(d) if d == (-dx, -dy))
    }

    /// Template offsets in matrix row-major order (dy outer, dx inner).
    ///
    /// Absent entries are never yielded; the center only when asked for.
    pub fn neighbor_offsets(&self, include_center: bool) -> Vec<(isize, isize)> {
        let r = self.radius();
        let mut offsets = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx == 0 && dy == 0 && !include_center {
                    continue;
                }
                if self.entry(dx, dy).is_some() {
                    offsets.push((dx, dy));
                }
            }
        }
        offsets
    }

    /// All outflow codes of the rule (excluding [`NO_FLOW`])
    pub fn codes(&self) -> Vec<u8> {
        self.neighbor_offsets(false)
            .into_iter()
            .filter_map(|(dx, dy)| self.entry(dx, dy))
            .collect()
    }

    /// Accept `0` or any outflow code of this rule
    pub fn validate_code(&self, code: u8) -> Result<()> {
        self.downstream_delta(code).map(|_| ())
    }
}

impl FromStr for NeighborRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "D8" => Ok(NeighborRule::D8),
            "D16" => Ok(NeighborRule::D16),
            other => Err(Error::UnknownNeighborRule(other.to_string())),
        }
    }
}

impl fmt::Display for NeighborRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
