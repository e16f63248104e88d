//! catchflow CLI - DEM hydrology from the command line
//!
//! Grids are exchanged as JSON documents:
//!
//! ```json
//! { "rows": 2, "cols": 3, "data": [1.0, 2.0, 3.0, 4.0, null, 6.0],
//!   "nodata": -9999.0, "transform": { "origin_x": 0.0, "origin_y": 60.0,
//!   "pixel_width": 30.0, "pixel_height": -30.0 } }
//! ```
//!
//! `data` is row-major; `null` marks a missing elevation (read as NaN).

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use catchflow_algorithms::hydrology::{PitFillMethod, PourPoint, PourPointStrategy};
use catchflow_algorithms::pipeline::{Pipeline, PipelineConfig, PipelineSummary};
use catchflow_core::{GeoTransform, NeighborRule, Raster, RasterElement};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "catchflow")]
#[command(author, version, about = "Pit filling, flow routing and catchment delineation", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a grid file
    Info {
        /// Input grid (JSON)
        input: PathBuf,
    },
    /// Full pipeline from a DEM: fill, route, accumulate, delineate
    Run {
        /// Input DEM (JSON grid)
        #[arg(long)]
        dem: PathBuf,

        /// Pit filling algorithm: normal, planchon_2001, yamazaki_2012
        #[arg(long)]
        algorithm: Option<String>,

        /// Planchon slope increment
        #[arg(long)]
        eta: Option<f64>,

        /// Planchon drying depth cap
        #[arg(long)]
        fill_depth: Option<usize>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Catchment from a precomputed flow direction grid
    Trace {
        /// Input flow directions (JSON grid of codes)
        #[arg(long)]
        directions: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Pipeline configuration file (JSON); flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Neighbor rule: D8 or D16
    #[arg(long)]
    rule: Option<String>,

    /// Pour point as grid indices "x,y"
    #[arg(long, conflicts_with_all = ["pour_coord", "threshold"])]
    pour_point: Option<String>,

    /// Pour point as map coordinates "X,Y", using the grid's transform
    #[arg(long, conflicts_with = "threshold")]
    pour_coord: Option<String>,

    /// Search the nearest cell with at least this accumulation
    #[arg(long)]
    threshold: Option<u32>,

    /// Threshold search start "x,y" (default: grid center)
    #[arg(long, requires = "threshold")]
    start: Option<String>,

    /// Threshold search radius cap in cells
    #[arg(long, requires = "threshold")]
    max_radius: Option<usize>,

    /// Catchment confluence depth cap
    #[arg(long)]
    catchment_depth: Option<usize>,

    /// Directory for the output grids
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

// ─── Grid documents ─────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct GridDocument<T> {
    rows: usize,
    cols: usize,
    data: Vec<Option<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nodata: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transform: Option<GeoTransform>,
}

impl<T: RasterElement> GridDocument<T> {
    fn into_raster(self, missing: impl Fn() -> Option<T>) -> Result<Raster<T>> {
        let data = self
            .data
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.or_else(&missing)
                    .with_context(|| format!("cell {} is null and this grid type has no missing value", i))
            })
            .collect::<Result<Vec<T>>>()?;
        let mut raster = Raster::from_vec(data, self.rows, self.cols)
            .with_context(|| format!("data does not fit {} x {}", self.rows, self.cols))?;
        raster.set_nodata(self.nodata);
        if let Some(transform) = self.transform {
            raster.set_transform(transform);
        }
        Ok(raster)
    }

    fn from_raster(raster: &Raster<T>) -> Self {
        Self {
            rows: raster.rows(),
            cols: raster.cols(),
            data: raster
                .data()
                .iter()
                .map(|&v| if v.to_f64().is_some_and(f64::is_nan) { None } else { Some(v) })
                .collect(),
            nodata: raster.nodata(),
            transform: Some(*raster.transform()),
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn read_grid<T>(path: &Path, missing: impl Fn() -> Option<T>) -> Result<Raster<T>>
where
    T: RasterElement + for<'de> Deserialize<'de> + Default,
{
    let pb = spinner("Reading grid...")?;
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let doc: GridDocument<T> =
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
    let raster = doc.into_raster(missing)?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_dem(path: &Path) -> Result<Raster<f64>> {
    read_grid(path, || Some(f64::NAN))
}

fn read_directions(path: &Path) -> Result<Raster<u8>> {
    read_grid(path, || None)
}

fn write_grid<T>(raster: &Raster<T>, dir: &Path, name: &str) -> Result<PathBuf>
where
    T: RasterElement + Serialize,
{
    let path = dir.join(format!("{}.json", name));
    let text = serde_json::to_string(&GridDocument::from_raster(raster))?;
    fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn parse_pair<T>(s: &str, what: &str) -> Result<(T, T)>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        bail!("{} must be 'a,b', got: {}", what, s);
    }
    let a = parts[0].parse().with_context(|| format!("Invalid {}", what))?;
    let b = parts[1].parse().with_context(|| format!("Invalid {}", what))?;
    Ok((a, b))
}

/// Config file (or defaults) with command-line overrides applied
fn build_config(common: &CommonArgs) -> Result<PipelineConfig> {
    let mut config = match &common.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(rule) = &common.rule {
        config.rule = rule.parse::<NeighborRule>()?;
    }
    if let Some(depth) = common.catchment_depth {
        config.catchment.max_depth = depth;
    }
    if let Some(s) = &common.pour_point {
        let (x, y) = parse_pair(s, "pour point")?;
        config.pour_point = PourPointStrategy::Explicit { x, y };
    }
    if let Some(threshold) = common.threshold {
        let start = match &common.start {
            Some(s) => {
                let (x, y) = parse_pair(s, "start")?;
                Some(PourPoint::new(x, y))
            }
            None => None,
        };
        config.pour_point = PourPointStrategy::Threshold {
            threshold,
            start,
            max_radius: common.max_radius,
        };
    }
    Ok(config)
}

fn execute(mut pipeline: Pipeline, common: &CommonArgs, transform: GeoTransform) -> Result<()> {
    if let Some(s) = &common.pour_coord {
        let (x, y): (f64, f64) = parse_pair(s, "pour coordinate")?;
        let point = pipeline.set_pour_point_coordinate(x, y, &transform)?;
        info!("Map coordinate ({}, {}) is cell {}", x, y, point);
    }

    let start = Instant::now();
    let pb = spinner("Delineating catchment...")?;
    let summary = pipeline.run().context("Pipeline failed")?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    let dir = &common.output_dir;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let pb = spinner("Writing outputs...")?;
    let mut written = Vec::new();
    if pipeline.elevation().is_some() {
        written.push(write_grid(pipeline.filled()?, dir, "filled")?);
        written.push(write_grid(pipeline.correction()?, dir, "correction")?);
    }
    written.push(write_grid(pipeline.directions()?, dir, "directions")?);
    written.push(write_grid(pipeline.flow_accumulation()?, dir, "accumulation")?);
    written.push(write_grid(pipeline.catchment()?, dir, "catchment")?);
    written.push(write_grid(pipeline.watershed_boundary()?, dir, "boundary")?);
    let summary_path = dir.join("summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary_json(&summary, pipeline.config()))?)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    written.push(summary_path);
    pb.finish_and_clear();

    println!("Pour point: {}", summary.pour_point);
    println!("  Catchment cells: {}", summary.catchment_cells);
    println!("  Boundary cells: {}", summary.boundary_cells);
    if summary.unresolved_cells > 0 {
        println!("  Cells without outflow: {}", summary.unresolved_cells);
    }
    for path in &written {
        println!("Saved: {}", path.display());
    }
    println!("  Processing time: {:.2?}", elapsed);
    Ok(())
}

fn summary_json(summary: &PipelineSummary, config: &PipelineConfig) -> serde_json::Value {
    let fill = summary.fill_report.map(|r| {
        json!({
            "algorithm": config.pit_fill.method.name(),
            "passes": r.passes,
            "cells_raised": r.cells_raised,
            "drying_truncations": r.drying_truncations,
            "cap_reached": r.cap_reached,
        })
    });
    json!({
        "rule": config.rule.name(),
        "pour_point": summary.pour_point,
        "catchment_cells": summary.catchment_cells,
        "boundary_cells": summary.boundary_cells,
        "unresolved_cells": summary.unresolved_cells,
        "pit_fill": fill,
    })
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let raster = read_dem(&input)?;
            let (rows, cols) = raster.shape();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.transform().cell_size());
            if let (Some(min), Some(max)) = (stats.min, stats.max) {
                println!("Range: {:.3} .. {:.3}", min, max);
            }
            if let Some(mean) = stats.mean {
                println!("Mean: {:.3}", mean);
            }
            println!("Valid cells: {} (no-data: {})", stats.valid_count, stats.nodata_count);
        }

        Commands::Run {
            dem,
            algorithm,
            eta,
            fill_depth,
            common,
        } => {
            let mut config = build_config(&common)?;
            if let Some(name) = &algorithm {
                config.pit_fill.method = name.parse::<PitFillMethod>()?;
            }
            if let Some(eta) = eta {
                config.pit_fill.eta = eta;
            }
            if let Some(depth) = fill_depth {
                config.pit_fill.max_depth = depth;
            }
            // Fail on bad configuration before reading any data
            config.validate().context("Invalid configuration")?;

            let dem = read_dem(&dem)?;
            let transform = *dem.transform();
            let pipeline = Pipeline::from_elevation(dem, config)?;
            execute(pipeline, &common, transform)?;
        }

        Commands::Trace { directions, common } => {
            let config = build_config(&common)?;
            config.validate().context("Invalid configuration")?;

            let directions = read_directions(&directions)?;
            let transform = *directions.transform();
            let mut pipeline = Pipeline::new(config)?;
            pipeline
                .set_flow_direction(directions)
                .context("Flow direction grid does not match the neighbor rule")?;
            execute(pipeline, &common, transform)?;
        }
    }

    Ok(())
}
