//! Sampling lattice generation.
//!
//! A grid is a `grid_size × grid_size` square of points centred on the business
//! location, spanning `2 × radius_miles` on both axes. Cells are emitted row-major,
//! north to south and west to east, with ids starting at 1, so two grids built from
//! the same [`GridSpec`] are comparable cell for cell.

use chrono::{DateTime, Utc};
use log::debug;
use rstar::{primitives::GeomWithData, RTree};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{self, longitude_delta, MILES_PER_DEGREE_LATITUDE};
use crate::{GeoPoint, GridCell, GridRankError, Result, RunKey};

/// Parameters of one sampling lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Business location at the centre of the grid
    pub center: GeoPoint,
    /// Points per side (>= 2)
    pub grid_size: u32,
    /// Distance from the centre to each edge, in miles
    pub radius_miles: f64,
}

impl GridSpec {
    pub fn new(center: GeoPoint, grid_size: u32, radius_miles: f64) -> Self {
        Self { center, grid_size, radius_miles }
    }

    /// Reject degenerate parameters. Nothing is coerced.
    pub fn validate(&self) -> Result<()> {
        if self.grid_size < 2 {
            return Err(GridRankError::InvalidGridSize { grid_size: self.grid_size });
        }
        if !self.radius_miles.is_finite() || self.radius_miles <= 0.0 {
            return Err(GridRankError::InvalidRadius { radius_miles: self.radius_miles });
        }
        if !self.center.is_valid() {
            return Err(GridRankError::InvalidCenter {
                latitude: self.center.latitude,
                longitude: self.center.longitude,
            });
        }

        // Both the north and the south edge must stay clear of the poles
        geo_utils::offset_point(&self.center, self.radius_miles, 0.0)?;
        geo_utils::offset_point(&self.center, -self.radius_miles, 0.0)?;
        Ok(())
    }

    /// Number of cells the grid will contain.
    pub fn cell_count(&self) -> usize {
        (self.grid_size as usize) * (self.grid_size as usize)
    }

    /// Spacing between adjacent rows/columns, in miles.
    pub fn step_miles(&self) -> f64 {
        (2.0 * self.radius_miles) / (self.grid_size as f64 - 1.0)
    }

    /// Generate the lattice with the default square layout.
    pub fn generate(&self) -> Result<Vec<GridCell>> {
        SquareGrid.layout(self)
    }

    /// Key identifying a run over this grid started at `started_at`.
    pub fn run_key(&self, started_at: DateTime<Utc>) -> RunKey {
        RunKey {
            center: self.center,
            grid_size: self.grid_size,
            radius_miles: self.radius_miles,
            started_at,
        }
    }
}

/// Strategy for laying out sample points around a centre.
pub trait GridLayout {
    fn layout(&self, spec: &GridSpec) -> Result<Vec<GridCell>>;
}

/// Evenly spaced square lattice.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquareGrid;

impl GridLayout for SquareGrid {
    fn layout(&self, spec: &GridSpec) -> Result<Vec<GridCell>> {
        spec.validate()?;

        let step = spec.step_miles();
        let mut cells = Vec::with_capacity(spec.cell_count());
        let mut next_id = 1;

        for row in 0..spec.grid_size {
            let north = spec.radius_miles - row as f64 * step;
            for col in 0..spec.grid_size {
                let east = -spec.radius_miles + col as f64 * step;
                let point = geo_utils::offset_point(&spec.center, north, east)?;
                cells.push(GridCell { id: next_id, row, col, point });
                next_id += 1;
            }
        }

        debug!(
            "[Grid] {}x{} cells around ({:.5}, {:.5}), radius {:.2}mi, step {:.3}mi",
            spec.grid_size,
            spec.grid_size,
            spec.center.latitude,
            spec.center.longitude,
            spec.radius_miles,
            step
        );

        Ok(cells)
    }
}

/// Generate a `grid_size × grid_size` lattice around `center`.
///
/// # Errors
///
/// - [`GridRankError::InvalidGridSize`] when `grid_size < 2`
/// - [`GridRankError::InvalidRadius`] when `radius_miles <= 0` or not finite
/// - [`GridRankError::InvalidCenter`] for out-of-range coordinates
/// - [`GridRankError::PolarLatitude`] when the grid would reach past the polar limit
///
/// # Example
///
/// ```rust
/// use geogrid_rank::{GeoPoint, generate_grid};
///
/// let cells = generate_grid(GeoPoint::new(51.5074, -0.1278), 3, 1.0).unwrap();
/// assert_eq!(cells.len(), 9);
/// assert_eq!(cells[4].point, GeoPoint::new(51.5074, -0.1278)); // centre cell
/// assert!(generate_grid(GeoPoint::new(51.5074, -0.1278), 1, 1.0).is_err());
/// ```
pub fn generate_grid(center: GeoPoint, grid_size: u32, radius_miles: f64) -> Result<Vec<GridCell>> {
    GridSpec::new(center, grid_size, radius_miles).generate()
}

// ============================================================================
// Spatial lookup
// ============================================================================

type IndexedCell = GeomWithData<[f64; 2], u32>;

/// R-tree over cell positions, for resolving a map location to a grid cell.
///
/// Longitudes are taken relative to the first cell, wrapped across the
/// antimeridian, and scaled by `cos(latitude)` of the grid so that the index works
/// in roughly isotropic units (degrees of latitude).
pub struct CellIndex {
    tree: RTree<IndexedCell>,
    ref_lng: f64,
    lng_scale: f64,
}

impl CellIndex {
    pub fn new(cells: &[GridCell]) -> Self {
        let ref_lat = if cells.is_empty() {
            0.0
        } else {
            cells.iter().map(|c| c.point.latitude).sum::<f64>() / cells.len() as f64
        };
        let ref_lng = cells.first().map_or(0.0, |c| c.point.longitude);
        let lng_scale = ref_lat.to_radians().cos().max(1e-6);

        let mut index = Self { tree: RTree::new(), ref_lng, lng_scale };
        let entries: Vec<IndexedCell> = cells
            .iter()
            .map(|c| GeomWithData::new(index.project(&c.point), c.id))
            .collect();
        index.tree = RTree::bulk_load(entries);
        index
    }

    /// Id of the cell nearest to `point`, or `None` for an empty index.
    pub fn nearest(&self, point: &GeoPoint) -> Option<u32> {
        self.tree
            .nearest_neighbor(&self.project(point))
            .map(|entry| entry.data)
    }

    /// Ids of all cells within roughly `miles` of `point`, in ascending id order.
    pub fn within_miles(&self, point: &GeoPoint, miles: f64) -> Vec<u32> {
        let radius_deg = miles / MILES_PER_DEGREE_LATITUDE;
        let mut ids: Vec<u32> = self
            .tree
            .locate_within_distance(self.project(point), radius_deg * radius_deg)
            .map(|entry| entry.data)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    #[inline]
    fn project(&self, p: &GeoPoint) -> [f64; 2] {
        [longitude_delta(self.ref_lng, p.longitude) * self.lng_scale, p.latitude]
    }
}
