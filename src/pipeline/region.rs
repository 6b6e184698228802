//! Spatial binning of coordinates into fixed-size grid cells.

use crate::pipeline::types::RegionId;

/// Maps a coordinate to the grid cell containing it.
///
/// Cells are `floor(coordinate / region_size)` on each axis, so two points share
/// a [`RegionId`] exactly when they fall in the same cell. Non-finite inputs do
/// not panic; they produce a saturated key and are filtered out upstream.
pub fn bin(longitude: f64, latitude: f64, region_size: f64) -> RegionId {
    RegionId::from_cells(cell(longitude, region_size), cell(latitude, region_size))
}

fn cell(coordinate: f64, region_size: f64) -> i64 {
    (coordinate / region_size).floor() as i64
}
