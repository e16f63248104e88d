//! Planchon-Darboux (2001) depression filling
//!
//! The surface `W` starts at the DEM on the border and beside no-data cells
//! and at +inf elsewhere, then is lowered until it is stable. For a cell `c` and neighbor `n`:
//!
//! - if `Z(c) >= W(n) + eta`, the cell drains: `W(c) = Z(c)`
//! - else if `W(n) + eta < W(c)`, lower it: `W(c) = W(n) + eta`
//!
//! When a cell drains, "drying" walks upstream from it and drains every
//! still-unassigned neighbor that sits at least `eta` above it, so whole
//! hillslopes settle without waiting for the scans to reach them. Scans
//! cycle through eight directions and stop after one that changes nothing.
//!
//! Reference:
//! Planchon, O., Darboux, F. (2001). A fast, simple and versatile algorithm
//! to fill the depressions of digital elevation models.
//! Catena, 46(2-3), 159-176.

use ndarray::{Array2, ArrayView2};

/// D8 neighbor offsets: (row_offset, col_offset)
const D8_OFFSETS: [(isize, isize); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1),           (0, 1),
    (1, -1),  (1, 0),  (1, 1),
];

/// Scan direction: starting corner plus axis order
#[derive(Debug, Clone, Copy)]
struct Scan {
    from_bottom: bool,
    from_right: bool,
    column_major: bool,
}

impl Scan {
    const fn new(from_bottom: bool, from_right: bool, column_major: bool) -> Self {
        Self { from_bottom, from_right, column_major }
    }

    fn cells(self, rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> {
        let (outer, inner) = if self.column_major { (cols, rows) } else { (rows, cols) };
        (0..outer)
            .flat_map(move |o| (0..inner).map(move |i| (o, i)))
            .map(move |(o, i)| {
                let (mut row, mut col) = if self.column_major { (i, o) } else { (o, i) };
                if self.from_bottom {
                    row = rows - 1 - row;
                }
                if self.from_right {
                    col = cols - 1 - col;
                }
                (row, col)
            })
    }
}

/// Scan cycle, alternating opposite corners
const SCANS: [Scan; 8] = [
    Scan::new(false, false, false),
    Scan::new(true, true, false),
    Scan::new(false, true, true),
    Scan::new(true, false, true),
    Scan::new(false, true, false),
    Scan::new(true, false, false),
    Scan::new(false, false, true),
    Scan::new(true, true, true),
];

pub(crate) struct PlanchonOutcome {
    pub surface: Array2<f64>,
    pub scans: usize,
    pub truncated: usize,
}

struct Flood<'a> {
    dem: ArrayView2<'a, f64>,
    surface: Array2<f64>,
    eta: f64,
    max_depth: usize,
    rows: usize,
    cols: usize,
    truncated: usize,
    stack: Vec<(usize, usize, usize)>,
}

/// Cells that drain off the grid: the border ring, plus valid cells next to
/// a NaN (no-data) cell
fn is_outlet(dem: &Array2<f64>, row: usize, col: usize) -> bool {
    let (rows, cols) = dem.dim();
    if row == 0 || col == 0 || row + 1 == rows || col + 1 == cols {
        return true;
    }
    D8_OFFSETS
        .iter()
        .any(|&(dr, dc)| dem[((row as isize + dr) as usize, (col as isize + dc) as usize)].is_nan())
}

/// Initial surface: DEM on outlets and on NaN cells, +inf elsewhere
fn initial_surface(dem: &Array2<f64>) -> Array2<f64> {
    Array2::from_shape_fn(dem.dim(), |(row, col)| {
        let z = dem[(row, col)];
        if z.is_nan() || is_outlet(dem, row, col) {
            z
        } else {
            f64::INFINITY
        }
    })
}

impl<'a> Flood<'a> {
    fn new(dem: &'a Array2<f64>, eta: f64, max_depth: usize) -> Self {
        let (rows, cols) = dem.dim();
        Self {
            dem: dem.view(),
            surface: initial_surface(dem),
            eta,
            max_depth,
            rows,
            cols,
            truncated: 0,
            stack: Vec::new(),
        }
    }

    #[inline]
    fn neighbor(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<(usize, usize)> {
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr as usize >= self.rows || nc as usize >= self.cols {
            return None;
        }
        Some((nr as usize, nc as usize))
    }

    /// Drain every unassigned cell reachable uphill from (row, col).
    /// Branches deeper than `max_depth` are left to the scans.
    fn dry_upward(&mut self, row: usize, col: usize) {
        self.stack.push((row, col, 1));
        while let Some((r, c, depth)) = self.stack.pop() {
            if depth > self.max_depth {
                self.truncated += 1;
                continue;
            }
            let threshold = self.surface[(r, c)] + self.eta;
            for &(dr, dc) in &D8_OFFSETS {
                let Some((nr, nc)) = self.neighbor(r, c, dr, dc) else {
                    continue;
                };
                if self.surface[(nr, nc)] == f64::INFINITY && self.dem[(nr, nc)] >= threshold {
                    self.surface[(nr, nc)] = self.dem[(nr, nc)];
                    self.stack.push((nr, nc, depth + 1));
                }
            }
        }
    }

    /// One directional scan, true if any cell changed
    fn scan(&mut self, scan: Scan) -> bool {
        let mut modified = false;
        for (row, col) in scan.cells(self.rows, self.cols) {
            let z = self.dem[(row, col)];
            // Already drained, an outlet, or NaN
            if z.is_nan() || self.surface[(row, col)] <= z {
                continue;
            }
            for &(dr, dc) in &D8_OFFSETS {
                let Some((nr, nc)) = self.neighbor(row, col, dr, dc) else {
                    continue;
                };
                let lowered = self.surface[(nr, nc)] + self.eta;
                if z >= lowered {
                    self.surface[(row, col)] = z;
                    modified = true;
                    self.dry_upward(row, col);
                    break;
                }
                if lowered < self.surface[(row, col)] {
                    self.surface[(row, col)] = lowered;
                    modified = true;
                }
            }
        }
        modified
    }
}

/// Fill depressions, returning the surface plus scan and truncation counts
pub(crate) fn planchon_fill(dem: &Array2<f64>, eta: f64, max_depth: usize) -> PlanchonOutcome {
    let mut flood = Flood::new(dem, eta, max_depth);

    // Drain the hillslopes that rise straight off the outlets
    for row in 0..flood.rows {
        for col in 0..flood.cols {
            if !dem[(row, col)].is_nan() && is_outlet(dem, row, col) {
                flood.dry_upward(row, col);
            }
        }
    }

    let mut scans = 0;
    for &scan in SCANS.iter().cycle() {
        scans += 1;
        if !flood.scan(scan) {
            break;
        }
    }

    PlanchonOutcome {
        surface: flood.surface,
        scans,
        truncated: flood.truncated,
    }
}

/// Direct variant without drying: plain row-major sweeps until stable.
/// Slow but obviously correct, used to cross-check [`planchon_fill`].
#[cfg(test)]
pub(crate) fn planchon_direct(dem: &Array2<f64>, eta: f64) -> Array2<f64> {
    let (rows, cols) = dem.dim();
    let mut w = initial_surface(dem);
    let mut modified = true;
    while modified {
        modified = false;
        for row in 0..rows {
            for col in 0..cols {
                let z = dem[(row, col)];
                if z.is_nan() || w[(row, col)] <= z {
                    continue;
                }
                for &(dr, dc) in &D8_OFFSETS {
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;
                    if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                        continue;
                    }
                    let lowered = w[(nr as usize, nc as usize)] + eta;
                    if z >= lowered {
                        w[(row, col)] = z;
                        modified = true;
                        break;
                    }
                    if lowered < w[(row, col)] {
                        w[(row, col)] = lowered;
                        modified = true;
                    }
                }
            }
        }
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic rough terrain with plenty of closed pits
    fn rough_dem(rows: usize, cols: usize) -> Array2<f64> {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        Array2::from_shape_fn((rows, cols), |(row, col)| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let noise = (state % 1000) as f64 / 100.0;
            let trend = (row as f64 - rows as f64 / 2.0).abs() + (col as f64 * 0.3);
            100.0 + trend + noise
        })
    }

    fn has_downhill_neighbor(w: &Array2<f64>, row: usize, col: usize, eta: f64) -> bool {
        let (rows, cols) = w.dim();
        D8_OFFSETS.iter().any(|&(dr, dc)| {
            let nr = row as isize + dr;
            let nc = col as isize + dc;
            nr >= 0
                && nc >= 0
                && (nr as usize) < rows
                && (nc as usize) < cols
                && w[(nr as usize, nc as usize)] + eta <= w[(row, col)]
        })
    }

    #[test]
    fn test_scans_cover_every_cell_once() {
        for scan in SCANS {
            let mut seen = Array2::<u8>::zeros((4, 6));
            for (row, col) in scan.cells(4, 6) {
                seen[(row, col)] += 1;
            }
            assert!(seen.iter().all(|&n| n == 1), "{:?}", scan);
        }
    }

    #[test]
    fn test_single_pit_raised_to_rim() {
        let mut dem = Array2::from_elem((5, 5), 10.0);
        dem[(2, 2)] = 2.0;

        let out = planchon_fill(&dem, 0.0, 2000);

        assert_eq!(out.surface[(2, 2)], 10.0);
        assert_eq!(out.truncated, 0);
    }

    #[test]
    fn test_matches_direct_variant() {
        for eta in [0.0, 0.01, 0.5] {
            let dem = rough_dem(24, 31);
            let fast = planchon_fill(&dem, eta, 2000).surface;
            let direct = planchon_direct(&dem, eta);
            assert_eq!(fast, direct, "eta = {}", eta);
        }
    }

    #[test]
    fn test_filled_never_below_dem_and_idempotent() {
        let dem = rough_dem(20, 20);
        let once = planchon_fill(&dem, 0.01, 2000).surface;
        for (w, z) in once.iter().zip(dem.iter()) {
            assert!(w >= z);
        }
        let twice = planchon_fill(&once, 0.01, 2000).surface;
        assert_eq!(once, twice);
    }

    #[test]
    fn test_no_residual_flats_with_positive_eta() {
        let eta = 0.01;
        let dem = rough_dem(18, 22);
        let w = planchon_fill(&dem, eta, 2000).surface;
        let (rows, cols) = w.dim();
        for row in 1..rows - 1 {
            for col in 1..cols - 1 {
                assert!(has_downhill_neighbor(&w, row, col, eta), "flat at ({}, {})", row, col);
            }
        }
    }

    #[test]
    fn test_truncated_drying_still_converges() {
        // A long ramp rising away from the left edge dries in one deep branch
        let dem = Array2::from_shape_fn((5, 200), |(_, col)| col as f64);
        let full = planchon_fill(&dem, 0.01, 2000);
        let capped = planchon_fill(&dem, 0.01, 3);

        assert_eq!(full.truncated, 0);
        assert!(capped.truncated > 0);
        assert_eq!(full.surface, capped.surface);
        assert_eq!(full.surface, dem);
    }

    #[test]
    fn test_small_grid_is_all_border() {
        let dem = Array2::from_shape_vec((2, 3), vec![5.0, 1.0, 5.0, 5.0, 0.5, 5.0]).unwrap();
        let out = planchon_fill(&dem, 0.01, 2000);
        assert_eq!(out.surface, dem);
        assert_eq!(out.scans, 1);
    }

    #[test]
    fn test_nan_cells_kept_and_drain_neighbors() {
        let mut dem = Array2::from_elem((5, 5), 10.0);
        dem[(2, 2)] = f64::NAN;
        dem[(1, 1)] = 3.0;
        let w = planchon_fill(&dem, 0.0, 2000).surface;
        assert!(w[(2, 2)].is_nan());
        // Next to the hole, so it is an outlet and keeps its elevation
        assert_eq!(w[(1, 1)], 3.0);
    }

    #[test]
    fn test_island_inside_nan_collar() {
        // Valid 3x3 island with a pit at its center, no valid cell on the border
        let mut dem = Array2::from_elem((7, 7), f64::NAN);
        for row in 2..5 {
            for col in 2..5 {
                dem[(row, col)] = 20.0;
            }
        }
        dem[(3, 3)] = 16.0;

        let out = planchon_fill(&dem, 0.01, 2000);

        for row in 2..5 {
            for col in 2..5 {
                assert!(out.surface[(row, col)].is_finite(), "({}, {})", row, col);
            }
        }
        assert_eq!(out.surface[(2, 2)], 20.0);
        assert!((out.surface[(3, 3)] - 20.01).abs() < 1e-9);
    }
}
