//! Raster data structures and neighbor templates

mod element;
mod geotransform;
mod grid;
mod neighborhood;

pub use element::RasterElement;
pub use geotransform::{CoordinateToIndex, GeoTransform};
pub use grid::{Raster, RasterStatistics};
pub use neighborhood::{NeighborRule, NO_FLOW, ORTHOGONAL_OFFSETS};
