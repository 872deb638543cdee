//! Trend connectors for map overlays.
//!
//! A connector is a short directional glyph describing how a rank moved between two
//! time-ordered snapshots. Classification follows the aggregation sign convention:
//! a positive change (`previous - current`) is an improvement.

use serde::{Deserialize, Serialize};

use crate::geo_utils;
use crate::tracker::GridSnapshot;
use crate::{GeoPoint, GridRankError, Result};

// Changes of this many positions or more draw a full-length glyph
const FULL_GLYPH_CHANGE: i32 = 10;

/// Direction of a rank movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improved,
    Declined,
    Flat,
}

impl Trend {
    pub fn from_change(rank_change: i32) -> Self {
        match rank_change {
            c if c > 0 => Trend::Improved,
            c if c < 0 => Trend::Declined,
            _ => Trend::Flat,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improved => "improved",
            Trend::Declined => "declined",
            Trend::Flat => "flat",
        }
    }
}

/// Directional indicator between two points for one rank movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConnector {
    /// Grid cell the connector belongs to, if any
    pub cell_id: Option<u32>,
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub midpoint: GeoPoint,
    pub rank_change: i32,
    /// `atan2(Δlat, Δlng)` in degrees, for rotating the glyph
    pub bearing_degrees: f64,
    pub trend: Trend,
}

impl TrendConnector {
    pub fn between(start: GeoPoint, end: GeoPoint, rank_change: i32) -> Self {
        Self {
            cell_id: None,
            start,
            end,
            midpoint: geo_utils::midpoint(&start, &end),
            rank_change,
            bearing_degrees: geo_utils::bearing_degrees(&start, &end),
            trend: Trend::from_change(rank_change),
        }
    }

    fn for_cell(mut self, cell_id: u32) -> Self {
        self.cell_id = Some(cell_id);
        self
    }
}

fn check_time_order(previous: &GridSnapshot, current: &GridSnapshot) -> Result<()> {
    if previous.key.started_at >= current.key.started_at {
        return Err(GridRankError::SnapshotMismatch {
            reason: format!(
                "previous run {} is not older than current run {}",
                previous.key.started_at.to_rfc3339(),
                current.key.started_at.to_rfc3339()
            ),
        });
    }
    Ok(())
}

/// One connector per cell of `keyword` between two snapshots of the same grid.
///
/// Each connector starts at its cell and points north for an improvement and
/// south for a decline. Its length is `glyph_miles` scaled by the size of the
/// change, full length from a 10 position move; flat cells get a zero-length
/// connector. A keyword missing from `previous` is treated as unchanged, one
/// missing from `current` yields no connectors.
///
/// # Errors
///
/// [`GridRankError::SnapshotMismatch`] when the snapshots are not time-ordered
/// or do not cover the same lattice.
pub fn cell_connectors(
    previous: &GridSnapshot,
    current: &GridSnapshot,
    keyword: &str,
    glyph_miles: f64,
) -> Result<Vec<TrendConnector>> {
    check_time_order(previous, current)?;
    current.check_comparable(previous)?;

    let Some(current_ranks) = current.keyword(keyword) else {
        return Ok(Vec::new());
    };
    let previous_ranks = previous.keyword(keyword).unwrap_or(&[]);

    let mut connectors = Vec::with_capacity(current_ranks.len());
    for cell_rank in current_ranks {
        let change = previous_ranks
            .iter()
            .find(|p| p.cell.id == cell_rank.cell.id)
            .map_or(0, |p| cell_rank.rank.change_from(p.rank));

        let scale = change.abs().min(FULL_GLYPH_CHANGE) as f64 / FULL_GLYPH_CHANGE as f64;
        let north_miles = change.signum() as f64 * scale * glyph_miles;
        let start = cell_rank.cell.point;
        let end = geo_utils::offset_point(&start, north_miles, 0.0)?;

        connectors.push(TrendConnector::between(start, end, change).for_cell(cell_rank.cell.id));
    }

    Ok(connectors)
}

/// Connector from the best-ranked cell of `previous` to the best-ranked cell of
/// `current` for `keyword`, showing where the strongest position moved.
///
/// `None` when either snapshot lacks the keyword.
pub fn best_cell_connector(
    previous: &GridSnapshot,
    current: &GridSnapshot,
    keyword: &str,
) -> Result<Option<TrendConnector>> {
    check_time_order(previous, current)?;

    let (Some(from), Some(to)) = (previous.best_cell(keyword), current.best_cell(keyword)) else {
        return Ok(None);
    };
    let change = to.rank.change_from(from.rank);
    Ok(Some(TrendConnector::between(from.cell.point, to.cell.point, change).for_cell(to.cell.id)))
}
