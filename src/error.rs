use thiserror::Error;

/// Errors surfaced by grid generation, sampling runs and run commits.
#[derive(Debug, Error)]
pub enum GridRankError {
    #[error("grid size must be at least 2, got {grid_size}")]
    InvalidGridSize { grid_size: u32 },

    #[error("grid radius must be a positive number of miles, got {radius_miles}")]
    InvalidRadius { radius_miles: f64 },

    #[error("invalid center coordinate ({latitude}, {longitude})")]
    InvalidCenter { latitude: f64, longitude: f64 },

    #[error("latitude {latitude} is too close to a pole for grid spacing")]
    PolarLatitude { latitude: f64 },

    #[error("ranking provider is not configured: {0}")]
    ProviderConfig(String),

    #[error("sampling run has no keywords")]
    NoKeywords,

    #[error("sampling run cancelled after {completed}/{total} lookups")]
    Cancelled { completed: u32, total: u32 },

    #[error("snapshots are not comparable: {reason}")]
    SnapshotMismatch { reason: String },

    #[error("run dated {run_date} is not newer than the latest committed run {latest}")]
    StaleRun { run_date: String, latest: String },
}

pub type Result<T> = std::result::Result<T, GridRankError>;
