//! Template regions
//!
//! A region is a named rectangle on the template image. Region lists are
//! treated as values: every operation here returns a fresh, renumbered list
//! so `order` always reads 1..N in list order.

pub mod coords;

pub use coords::{fit_to_viewport, CoordinateMapper, PixelRect, Point, RegionCoordinates};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named OCR extraction area on a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Region identifier, immutable once created
    pub id: String,
    /// Display name
    pub name: String,
    /// Bounds relative to the base image
    pub coordinates: RegionCoordinates,
    /// 1-based position in the region list
    pub order: usize,
}

impl Region {
    /// Create a region with a fresh id
    pub fn new(name: impl Into<String>, coordinates: RegionCoordinates, order: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            coordinates,
            order,
        }
    }
}

/// Default label for the n-th region
pub fn default_region_name(order: usize) -> String {
    format!("Region {}", order)
}

/// Rewrite `order` to match list position
pub fn renumber(regions: &mut [Region]) {
    for (idx, region) in regions.iter_mut().enumerate() {
        region.order = idx + 1;
    }
}

/// Append a region at the end of the list
pub fn append(regions: &[Region], coordinates: RegionCoordinates) -> (Vec<Region>, String) {
    let order = regions.len() + 1;
    let region = Region::new(default_region_name(order), coordinates, order);
    let id = region.id.clone();

    let mut updated = regions.to_vec();
    updated.push(region);
    renumber(&mut updated);
    (updated, id)
}

/// Rename a region. Blank names keep the previous name.
pub fn rename(regions: &[Region], id: &str, name: &str) -> Vec<Region> {
    let trimmed = name.trim();
    regions
        .iter()
        .map(|r| {
            if r.id == id && !trimmed.is_empty() {
                Region {
                    name: trimmed.to_string(),
                    ..r.clone()
                }
            } else {
                r.clone()
            }
        })
        .collect()
}

/// Remove a region and close the gap in `order`
pub fn remove(regions: &[Region], id: &str) -> Vec<Region> {
    let mut updated: Vec<Region> = regions.iter().filter(|r| r.id != id).cloned().collect();
    renumber(&mut updated);
    updated
}

/// Swap a region with its predecessor. `None` when it is already first or unknown.
pub fn move_up(regions: &[Region], id: &str) -> Option<Vec<Region>> {
    let idx = regions.iter().position(|r| r.id == id)?;
    if idx == 0 {
        return None;
    }

    let mut updated = regions.to_vec();
    updated.swap(idx - 1, idx);
    renumber(&mut updated);
    Some(updated)
}

/// Swap a region with its successor. `None` when it is already last or unknown.
pub fn move_down(regions: &[Region], id: &str) -> Option<Vec<Region>> {
    let idx = regions.iter().position(|r| r.id == id)?;
    if idx + 1 >= regions.len() {
        return None;
    }

    let mut updated = regions.to_vec();
    updated.swap(idx, idx + 1);
    renumber(&mut updated);
    Some(updated)
}

/// Replace the coordinates of one region
pub fn with_coordinates(regions: &[Region], id: &str, coordinates: RegionCoordinates) -> Vec<Region> {
    regions
        .iter()
        .map(|r| {
            if r.id == id {
                Region {
                    coordinates,
                    ..r.clone()
                }
            } else {
                r.clone()
            }
        })
        .collect()
}

/// Topmost region under a canvas point. Later regions are drawn on top, so
/// the list is searched back to front.
pub fn find_at<'a>(regions: &'a [Region], mapper: &CoordinateMapper, point: Point) -> Option<&'a Region> {
    regions
        .iter()
        .rev()
        .find(|r| mapper.coords_to_absolute(&r.coordinates).contains(point))
}

/// True when `order` values are exactly 1..N in list order
pub fn is_dense_order(regions: &[Region]) -> bool {
    regions.iter().enumerate().all(|(idx, r)| r.order == idx + 1)
}
