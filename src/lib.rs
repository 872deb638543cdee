//! # Geo-Grid Rank
//!
//! Local search rank tracking on a geographic sampling grid.
//!
//! This library provides:
//! - An N×N sampling lattice around a business location
//! - Concurrent rank sampling per (grid cell, keyword) through a pluggable provider
//! - Aggregation into summary metrics and append-only keyword history
//! - Trend connectors for rendering rank movement between runs on a map
//! - Dashboard-ready view shapes
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel aggregation with rayon
//! - **`http`** - Enable the generic JSON/HTTP ranking provider
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use geogrid_rank::{GeoPoint, generate_grid, geo_utils};
//!
//! let center = GeoPoint::new(30.2672, -97.7431); // Austin
//! let cells = generate_grid(center, 5, 3.0).unwrap();
//! assert_eq!(cells.len(), 25);
//!
//! // Corner cells sit roughly sqrt(2) * radius from the center
//! let corner = geo_utils::distance_miles(&center, &cells[0].point);
//! assert!((corner - 3.0 * std::f64::consts::SQRT_2).abs() < 0.05);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub use error::{GridRankError, Result};

pub mod geo_utils;

pub mod grid;
pub use grid::{generate_grid, CellIndex, GridLayout, GridSpec, SquareGrid};

pub mod provider;
pub use provider::{ProviderError, ProviderRank, RankProvider};

// HTTP module for remote rank lookups
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpProviderConfig, HttpRankProvider};

pub mod sampler;
pub use sampler::{
    CancelToken, ProgressCallback, RankObservation, RankSampler, SampleOutcome, SampledRun,
    SamplerConfig,
};

pub mod aggregate;
pub use aggregate::{aggregate_run, KeywordRank, RunAggregate, SummaryMetrics};

#[cfg(feature = "parallel")]
pub use aggregate::aggregate_run_parallel;

pub mod history;
pub use history::{RankHistory, RankHistoryPoint};

pub mod tracker;
pub use tracker::{CellRank, CommitReport, GridSnapshot, RankTracker};

pub mod trend;
pub use trend::{best_cell_connector, cell_connectors, Trend, TrendConnector};

pub mod presentation;
pub use presentation::{
    build_dashboard, ConnectorOverlay, DashboardView, GridMarker, HistoryPointView, KeywordRow,
    SummaryTile,
};

#[cfg(test)]
mod test_support;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use geogrid_rank::GeoPoint;
/// let point = GeoPoint::new(30.2672, -97.7431); // Austin
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A 1-based search position.
///
/// Positions beyond [`Rank::MAX_TRACKED`] (and position `0`, which providers use
/// for "not found") collapse into the [`Rank::UNRANKED`] sentinel, rendered as `100+`.
/// Because the sentinel is numerically larger than every tracked position,
/// `min()` over ranks always yields the best one.
///
/// ```
/// use geogrid_rank::Rank;
/// assert_eq!(Rank::new(150), Rank::UNRANKED);
/// assert_eq!(Rank::new(150).to_string(), "100+");
/// assert_eq!(Rank::new(7).to_string(), "7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Rank(u32);

impl Rank {
    /// Deepest position still considered ranked.
    pub const MAX_TRACKED: u32 = 100;

    /// Sentinel for "no meaningful rank".
    pub const UNRANKED: Rank = Rank(Self::MAX_TRACKED + 1);

    pub fn new(position: u32) -> Self {
        if position == 0 || position > Self::MAX_TRACKED {
            Self::UNRANKED
        } else {
            Self(position)
        }
    }

    /// Numeric position (101 for the sentinel).
    pub fn position(self) -> u32 {
        self.0
    }

    pub fn is_ranked(self) -> bool {
        self.0 <= Self::MAX_TRACKED
    }

    /// True when ranked at or above `depth` (e.g. top 3).
    pub fn is_within(self, depth: u32) -> bool {
        self.is_ranked() && self.0 <= depth
    }

    /// `previous - self`, positive when the position improved.
    pub fn change_from(self, previous: Rank) -> i32 {
        previous.0 as i32 - self.0 as i32
    }
}

impl From<u32> for Rank {
    fn from(position: u32) -> Self {
        Rank::new(position)
    }
}

impl From<Rank> for u32 {
    fn from(rank: Rank) -> Self {
        rank.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ranked() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{}+", Self::MAX_TRACKED)
        }
    }
}

/// A tracked search keyword. Owned by campaign configuration, read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_primary: bool,
    /// Monthly search volume from campaign data
    #[serde(default)]
    pub volume: u32,
    /// Keyword difficulty (0-100)
    #[serde(default)]
    pub difficulty: u32,
}

impl Keyword {
    /// Create a non-primary keyword with no tags or volume data.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: Vec::new(),
            is_primary: false,
            volume: 0,
            difficulty: 0,
        }
    }
}

/// One point of the sampling lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Sequential id, starting at 1 in generation order
    pub id: u32,
    /// Row index, 0 is the northernmost row
    pub row: u32,
    /// Column index, 0 is the westernmost column
    pub col: u32,
    pub point: GeoPoint,
}

/// Identity of one sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunKey {
    pub center: GeoPoint,
    pub grid_size: u32,
    pub radius_miles: f64,
    pub started_at: DateTime<Utc>,
}

impl RunKey {
    /// True when both runs sampled the same lattice (timestamps may differ).
    pub fn same_grid(&self, other: &RunKey) -> bool {
        self.center == other.center
            && self.grid_size == other.grid_size
            && self.radius_miles == other.radius_miles
    }
}

// ============================================================================
// Tests
// ============================================================================
