//! Depression (pit) filling
//!
//! Raises cells that have no downhill path so that every cell drains to the
//! edge of the grid. Three algorithms are selectable by name:
//!
//! - `normal`: legacy 3x3 raise-to-lowest-neighbor loop, capped at
//!   [`NORMAL_MAX_PASSES`] passes. Best effort; the cap result is accepted.
//! - `planchon_2001`: Planchon & Darboux flood-and-drain (see [`super::planchon`]).
//! - `yamazaki_2012`: reserved name, not implemented.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use catchflow_core::raster::Raster;
use catchflow_core::{Algorithm, Error, Result};

use super::planchon::planchon_fill;

/// Height added above the lowest neighbor by the normal algorithm
pub const NORMAL_CORRECTION: f64 = 0.01;

/// Pass cap for the normal algorithm
pub const NORMAL_MAX_PASSES: usize = 100;

/// Pit filling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PitFillMethod {
    #[serde(rename = "normal")]
    Normal,
    #[default]
    #[serde(rename = "planchon_2001")]
    Planchon2001,
    #[serde(rename = "yamazaki_2012")]
    Yamazaki2012,
}

impl PitFillMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PitFillMethod::Normal => "normal",
            PitFillMethod::Planchon2001 => "planchon_2001",
            PitFillMethod::Yamazaki2012 => "yamazaki_2012",
        }
    }
}

impl FromStr for PitFillMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(PitFillMethod::Normal),
            "planchon_2001" => Ok(PitFillMethod::Planchon2001),
            "yamazaki_2012" => Ok(PitFillMethod::Yamazaki2012),
            other => Err(Error::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for PitFillMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters for pit filling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitFillParams {
    pub method: PitFillMethod,
    /// Planchon slope increment. 0.0 leaves filled depressions flat,
    /// a positive value drains them with a gentle gradient.
    pub eta: f64,
    /// Planchon drying depth cap. Branches beyond it are abandoned and left
    /// to the scanning phase.
    pub max_depth: usize,
}

impl Default for PitFillParams {
    fn default() -> Self {
        Self {
            method: PitFillMethod::Planchon2001,
            eta: 0.01,
            max_depth: 2000,
        }
    }
}

impl PitFillParams {
    /// Reject configurations that cannot run, before touching any grid
    pub fn validate(&self) -> Result<()> {
        if self.method == PitFillMethod::Yamazaki2012 {
            return Err(Error::NotImplemented("yamazaki_2012"));
        }
        if self.eta.is_nan() || self.eta.is_infinite() || self.eta < 0.0 {
            return Err(Error::InvalidParameter {
                name: "eta",
                value: self.eta.to_string(),
                reason: "must be a finite value >= 0".into(),
            });
        }
        Ok(())
    }
}

/// What the fill did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Normal passes or Planchon scans performed
    pub passes: usize,
    /// Cells raised by the normal algorithm
    pub cells_raised: usize,
    /// Planchon drying branches abandoned at the depth cap
    pub drying_truncations: usize,
    /// Normal algorithm stopped at [`NORMAL_MAX_PASSES`] with pits left
    pub cap_reached: bool,
}

/// Filled surface plus the correction applied to each cell
#[derive(Debug, Clone)]
pub struct PitFillResult {
    pub filled: Raster<f64>,
    /// `filled - original`, zero on no-data cells
    pub correction: Raster<f64>,
    pub report: FillReport,
}

/// Pit fill stage
#[derive(Debug, Clone, Default)]
pub struct PitFill;

impl Algorithm for PitFill {
    type Input = Raster<f64>;
    type Output = PitFillResult;
    type Params = PitFillParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Pit Fill"
    }

    fn description(&self) -> &'static str {
        "Remove depressions from a DEM (normal or Planchon-Darboux 2001)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fill_pits(&input, &params)
    }
}

/// Fill the depressions of a DEM.
///
/// No-data cells (NaN or the raster's no-data value) are never modified.
/// Valid cells next to them drain off the data like the grid border does.
///
/// # Errors
/// Negative eta, or the `yamazaki_2012` method, fail before any work is done.
pub fn fill_pits(dem: &Raster<f64>, params: &PitFillParams) -> Result<PitFillResult> {
    params.validate()?;

    let nodata = dem.nodata();
    let working = dem.data().mapv(|v| if v.is_nan() || dem.is_nodata(v) { f64::NAN } else { v });

    let (mut surface, report) = match params.method {
        PitFillMethod::Normal => normal_fill(working),
        PitFillMethod::Planchon2001 => {
            let outcome = planchon_fill(&working, params.eta, params.max_depth);
            let report = FillReport {
                passes: outcome.scans,
                drying_truncations: outcome.truncated,
                ..FillReport::default()
            };
            (outcome.surface, report)
        }
        PitFillMethod::Yamazaki2012 => return Err(Error::NotImplemented("yamazaki_2012")),
    };

    if report.cap_reached {
        warn!("normal pit fill stopped at the {} pass cap", NORMAL_MAX_PASSES);
    }
    if report.drying_truncations > 0 {
        debug!("planchon drying abandoned {} branches at depth {}", report.drying_truncations, params.max_depth);
    }

    // Put no-data cells back exactly as they came in
    let mut correction = Array2::<f64>::zeros(surface.dim());
    ndarray::Zip::from(&mut surface)
        .and(&mut correction)
        .and(dem.data())
        .for_each(|s, c, &orig| {
            if s.is_nan() {
                *s = if nodata.is_some() { orig } else { f64::NAN };
            } else {
                *c = *s - orig;
            }
        });

    let mut filled = dem.like(0.0);
    filled.replace_data(surface)?;
    let mut correction_raster = dem.with_same_meta::<f64>();
    correction_raster.replace_data(correction)?;

    Ok(PitFillResult {
        filled,
        correction: correction_raster,
        report,
    })
}

/// Lowest of the 8 neighbors of an interior cell. A NaN neighbor is an
/// outlet, so it counts as -inf and the cell is never raised.
fn lowest_neighbor(z: &Array2<f64>, row: usize, col: usize) -> f64 {
    let mut lowest = f64::INFINITY;
    for r in row - 1..=row + 1 {
        for c in col - 1..=col + 1 {
            if (r, c) == (row, col) {
                continue;
            }
            let v = z[(r, c)];
            if v.is_nan() {
                return f64::NEG_INFINITY;
            }
            if v < lowest {
                lowest = v;
            }
        }
    }
    lowest
}

/// One raster-order pass of the normal algorithm. Returns the number of
/// raised cells. Raised values are visible to later cells of the same pass.
pub(crate) fn normal_pass(z: &mut Array2<f64>) -> usize {
    let (rows, cols) = z.dim();
    if rows < 3 || cols < 3 {
        return 0;
    }

    let mut raised = 0;
    for row in 1..rows - 1 {
        for col in 1..cols - 1 {
            let lowest = lowest_neighbor(z, row, col);
            if z[(row, col)] < lowest {
                z[(row, col)] = lowest + NORMAL_CORRECTION;
                raised += 1;
            }
        }
    }
    raised
}

fn normal_fill(mut z: Array2<f64>) -> (Array2<f64>, FillReport) {
    let mut report = FillReport::default();
    loop {
        if report.passes == NORMAL_MAX_PASSES {
            report.cap_reached = true;
            break;
        }
        report.passes += 1;
        let raised = normal_pass(&mut z);
        report.cells_raised += raised;
        if raised == 0 {
            break;
        }
    }
    (z, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bowl_5x5(center: f64) -> Raster<f64> {
        let mut dem = Raster::filled(5, 5, 10.0);
        dem.set(2, 2, center).unwrap();
        dem
    }

    fn create_dem_with_sink() -> Raster<f64> {
        // 9 9 9 9 9 9 9
        // 9 8 8 8 8 8 9
        // 9 8 7 7 7 8 9
        // 9 8 7 3 7 8 9   <- center cell is a sink
        // 9 8 7 7 7 8 9
        // 9 8 8 8 8 8 9
        // 9 9 9 9 9 9 9
        let mut dem = Raster::new(7, 7);
        for row in 0..7usize {
            for col in 0..7usize {
                let ring = row.min(col).min(6 - row).min(6 - col);
                let value = match ring {
                    0 => 9.0,
                    1 => 8.0,
                    2 => 7.0,
                    _ => 3.0,
                };
                dem.set(row, col, value).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_method_names() {
        assert_eq!("normal".parse::<PitFillMethod>().unwrap(), PitFillMethod::Normal);
        assert_eq!("planchon_2001".parse::<PitFillMethod>().unwrap(), PitFillMethod::Planchon2001);
        assert_eq!("yamazaki_2012".parse::<PitFillMethod>().unwrap(), PitFillMethod::Yamazaki2012);
        assert_eq!(
            "priority_flood".parse::<PitFillMethod>().unwrap_err(),
            Error::UnknownAlgorithm("priority_flood".into())
        );
    }

    #[test]
    fn test_normal_single_pass_raises_center() {
        let dem = bowl_5x5(2.0);
        let mut z = dem.data().clone();

        let raised = normal_pass(&mut z);

        assert_eq!(raised, 1);
        assert!((z[(2, 2)] - 10.01).abs() < 1e-9, "center = {}", z[(2, 2)]);
        assert_eq!(z[(1, 1)], 10.0);
    }

    #[test]
    fn test_normal_fill_converges_on_single_pit() {
        let dem = bowl_5x5(2.0);
        let result = fill_pits(
            &dem,
            &PitFillParams {
                method: PitFillMethod::Normal,
                ..Default::default()
            },
        )
        .unwrap();

        assert!((result.filled.get(2, 2).unwrap() - 10.01).abs() < 1e-9);
        assert_eq!(result.report.passes, 2);
        assert_eq!(result.report.cells_raised, 1);
        assert!(!result.report.cap_reached);
        assert!((result.correction.get(2, 2).unwrap() - 8.01).abs() < 1e-9);
        assert_eq!(result.correction.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_normal_fill_is_local() {
        let dem = create_dem_with_sink();
        let result = fill_pits(
            &dem,
            &PitFillParams {
                method: PitFillMethod::Normal,
                ..Default::default()
            },
        )
        .unwrap();

        // Center only rises to just above its lowest neighbor, which is 7
        assert!((result.filled.get(3, 3).unwrap() - 7.01).abs() < 1e-9);
        for v in result.correction.data().iter() {
            assert!(*v >= 0.0);
        }
    }

    #[test]
    fn test_planchon_fills_closed_basin_to_rim() {
        // The whole interior is enclosed by the 9 rim, so it floods flat at 9
        let dem = create_dem_with_sink();
        let result = fill_pits(
            &dem,
            &PitFillParams {
                eta: 0.0,
                ..Default::default()
            },
        )
        .unwrap();

        for row in 1..6 {
            for col in 1..6 {
                assert_eq!(result.filled.get(row, col).unwrap(), 9.0, "({}, {})", row, col);
            }
        }
        assert_eq!(result.correction.get(3, 3).unwrap(), 6.0);
        assert_eq!(result.correction.get(0, 3).unwrap(), 0.0);
    }

    #[test]
    fn test_planchon_breach_drains_basin() {
        // Same basin with a notch cut to 2.0 at the top edge
        let mut dem = create_dem_with_sink();
        dem.set(0, 3, 2.0).unwrap();
        dem.set(1, 3, 2.5).unwrap();
        dem.set(2, 3, 2.8).unwrap();

        let result = fill_pits(
            &dem,
            &PitFillParams {
                eta: 0.0,
                ..Default::default()
            },
        )
        .unwrap();

        // Channel cells are already downhill toward the notch
        assert_eq!(result.filled.get(1, 3).unwrap(), 2.5);
        assert_eq!(result.filled.get(2, 3).unwrap(), 2.8);
        assert_eq!(result.filled.get(3, 3).unwrap(), 3.0);
        assert_eq!(result.correction.get(3, 3).unwrap(), 0.0);
    }

    #[test]
    fn test_negative_eta_rejected() {
        let dem = bowl_5x5(2.0);
        let err = fill_pits(
            &dem,
            &PitFillParams {
                eta: -0.1,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "eta", .. }));
    }

    #[test]
    fn test_yamazaki_not_implemented() {
        let dem = bowl_5x5(2.0);
        let params = PitFillParams {
            method: PitFillMethod::Yamazaki2012,
            ..Default::default()
        };
        assert_eq!(fill_pits(&dem, &params).unwrap_err(), Error::NotImplemented("yamazaki_2012"));
    }

    #[test]
    fn test_nodata_cells_untouched() {
        let mut dem = bowl_5x5(2.0);
        dem.set_nodata(Some(-9999.0));
        dem.set(1, 1, -9999.0).unwrap();

        let result = fill_pits(&dem, &PitFillParams::default()).unwrap();

        assert_eq!(result.filled.get(1, 1).unwrap(), -9999.0);
        assert_eq!(result.correction.get(1, 1).unwrap(), 0.0);
        // The pit touches the hole and drains into it
        assert_eq!(result.filled.get(2, 2).unwrap(), 2.0);
    }

    #[test]
    fn test_island_inside_nodata_collar() {
        // Valid 3x3 island in a no-data frame, pit at its center
        let mut dem = Raster::filled(7, 7, -9999.0);
        dem.set_nodata(Some(-9999.0));
        for row in 2..5 {
            for col in 2..5 {
                dem.set(row, col, 20.0).unwrap();
            }
        }
        dem.set(3, 3, 16.0).unwrap();

        for method in [PitFillMethod::Planchon2001, PitFillMethod::Normal] {
            let params = PitFillParams {
                method,
                ..Default::default()
            };
            let result = fill_pits(&dem, &params).unwrap();

            for row in 2..5 {
                for col in 2..5 {
                    let w = result.filled.get(row, col).unwrap();
                    assert!(w.is_finite(), "{}: ({}, {}) = {}", method, row, col, w);
                }
            }
            assert_eq!(result.filled.get(2, 2).unwrap(), 20.0, "{}", method);
            assert!((result.filled.get(3, 3).unwrap() - 20.01).abs() < 1e-9, "{}", method);
            assert!((result.correction.get(3, 3).unwrap() - 4.01).abs() < 1e-9, "{}", method);
            assert_eq!(result.filled.get(0, 0).unwrap(), -9999.0);
        }
    }

    #[test]
    fn test_normal_fill_stops_at_pass_cap() {
        // Two-cell pit: each pass lifts both cells by 0.02, far short of the rim
        let mut dem = Raster::filled(5, 6, 10.0);
        dem.set(2, 2, 0.0).unwrap();
        dem.set(2, 3, 0.001).unwrap();
        let params = PitFillParams {
            method: PitFillMethod::Normal,
            ..Default::default()
        };

        let result = fill_pits(&dem, &params).unwrap();

        assert!(result.report.cap_reached);
        assert_eq!(result.report.passes, NORMAL_MAX_PASSES);
        assert_eq!(result.report.cells_raised, 2 * NORMAL_MAX_PASSES);
        assert!(result.filled.get(2, 3).unwrap() < 10.0);
    }

    #[test]
    fn test_algorithm_trait() {
        let algo = PitFill;
        assert_eq!(algo.name(), "Pit Fill");
        let result = algo.execute_default(bowl_5x5(2.0)).unwrap();
        assert!(result.filled.get(2, 2).unwrap() > 10.0);
    }
}
