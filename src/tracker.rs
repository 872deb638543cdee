//! Run commits and tracker state.
//!
//! [`RankTracker`] is the write side of a campaign: it receives completed
//! [`SampledRun`]s and updates previous ranks, keyword history, the latest grid
//! snapshot and the summary together. A commit either applies fully or leaves the
//! tracker untouched; a cancelled run never produces a `SampledRun` and so never
//! reaches it.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::aggregate::{RunAggregate, SummaryMetrics};
use crate::grid::CellIndex;
use crate::history::RankHistory;
use crate::sampler::SampledRun;
use crate::{GeoPoint, GridCell, GridRankError, Rank, Result, RunKey};

// Positional tolerance when matching cells of two snapshots (degrees)
const POSITION_TOLERANCE_DEG: f64 = 1e-9;

/// Sampled rank of one keyword at one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRank {
    pub cell: GridCell,
    pub rank: Rank,
    pub search_volume: u32,
    /// Change against the same cell of the previous snapshot, 0 without one
    pub rank_change: i32,
    pub competitors: Vec<String>,
}

/// Per-keyword, per-cell ranks of one committed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub key: RunKey,
    pub cells: Vec<GridCell>,
    keywords: BTreeMap<String, Vec<CellRank>>,
}

impl GridSnapshot {
    /// Build the snapshot of `run`, diffing cell ranks against `previous` when the
    /// two grids are comparable.
    pub fn from_run(run: &SampledRun, previous: Option<&GridSnapshot>) -> Self {
        let mut cells = run.cells.clone();
        cells.sort_by_key(|c| c.id);

        let mut snapshot = GridSnapshot {
            key: run.key.clone(),
            cells,
            keywords: BTreeMap::new(),
        };

        for observation in &run.observations {
            snapshot
                .keywords
                .entry(observation.keyword.clone())
                .or_default()
                .push(CellRank {
                    cell: observation.cell,
                    rank: observation.rank,
                    search_volume: observation.search_volume,
                    rank_change: 0,
                    competitors: observation.competitors.clone(),
                });
        }

        let baseline = previous.filter(|prev| snapshot.check_comparable(prev).is_ok());
        for (keyword, ranks) in snapshot.keywords.iter_mut() {
            ranks.sort_by_key(|r| r.cell.id);
            let Some(prev_ranks) = baseline.and_then(|prev| prev.keyword(keyword)) else {
                continue;
            };
            for cell_rank in ranks.iter_mut() {
                if let Some(prev) = prev_ranks.iter().find(|p| p.cell.id == cell_rank.cell.id) {
                    cell_rank.rank_change = cell_rank.rank.change_from(prev.rank);
                }
            }
        }

        snapshot
    }

    /// Cell ranks of `keyword`, in cell id order.
    pub fn keyword(&self, keyword: &str) -> Option<&[CellRank]> {
        self.keywords.get(keyword).map(Vec::as_slice)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.keys().map(String::as_str)
    }

    /// Best-ranked cell for `keyword` (lowest id on ties).
    pub fn best_cell(&self, keyword: &str) -> Option<&CellRank> {
        self.keyword(keyword)?
            .iter()
            .min_by_key(|r| (r.rank, r.cell.id))
    }

    /// Cell rank of `keyword` nearest to a map location.
    pub fn cell_at(&self, keyword: &str, point: &GeoPoint) -> Option<&CellRank> {
        let id = CellIndex::new(&self.cells).nearest(point)?;
        self.keyword(keyword)?.iter().find(|r| r.cell.id == id)
    }

    /// Ok when `other` covers the same lattice, cell for cell.
    ///
    /// Runs keyed on the same grid parameters are comparable outright; otherwise
    /// every cell must sit at the same position within a small tolerance.
    pub fn check_comparable(&self, other: &GridSnapshot) -> Result<()> {
        if self.key.same_grid(&other.key) {
            return Ok(());
        }
        if self.key.grid_size != other.key.grid_size || self.cells.len() != other.cells.len() {
            return Err(GridRankError::SnapshotMismatch {
                reason: format!(
                    "grid {}x{} vs {}x{}",
                    self.key.grid_size, self.key.grid_size, other.key.grid_size, other.key.grid_size
                ),
            });
        }

        for (a, b) in self.cells.iter().zip(&other.cells) {
            let same_position = (a.point.latitude - b.point.latitude).abs() <= POSITION_TOLERANCE_DEG
                && (a.point.longitude - b.point.longitude).abs() <= POSITION_TOLERANCE_DEG;
            if a.id != b.id || !same_position {
                return Err(GridRankError::SnapshotMismatch {
                    reason: format!("cell {} is not at the same position in both runs", a.id),
                });
            }
        }
        Ok(())
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub key: RunKey,
    pub aggregate: RunAggregate,
    /// Lookups recorded as unranked because of provider errors or timeouts
    pub failed_lookups: usize,
}

/// Committed state of one tracked business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankTracker {
    history: RankHistory,
    previous_ranks: HashMap<String, Rank>,
    latest: Option<GridSnapshot>,
    previous: Option<GridSnapshot>,
    summary: Option<SummaryMetrics>,
}

impl RankTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate `run` and fold it into the tracker.
    ///
    /// # Errors
    ///
    /// [`GridRankError::StaleRun`] when `run` is not newer than the latest committed
    /// run. The tracker is unchanged on error.
    pub fn commit(&mut self, run: SampledRun) -> Result<CommitReport> {
        let run_date = run.key.started_at;
        if let Some(latest) = self.last_run_at() {
            if run_date <= latest {
                return Err(GridRankError::StaleRun {
                    run_date: run_date.to_rfc3339(),
                    latest: latest.to_rfc3339(),
                });
            }
        }

        let aggregate = aggregate_observations(&run, &self.previous_ranks);
        self.history.check_append(run_date, &aggregate)?;
        let snapshot = GridSnapshot::from_run(&run, self.latest.as_ref());
        let failed_lookups = run.failed_count();

        // Nothing below can fail
        self.history.append_run(run_date, &aggregate)?;
        self.previous_ranks = aggregate.current_ranks();
        self.summary = Some(aggregate.summary);
        self.previous = self.latest.replace(snapshot);

        info!(
            "[RankTracker] Committed run {}: {} keywords, {} up / {} down, {} failed lookups",
            run_date.to_rfc3339(),
            aggregate.summary.total_keywords,
            aggregate.summary.keywords_up,
            aggregate.summary.keywords_down,
            failed_lookups
        );

        Ok(CommitReport { key: run.key, aggregate, failed_lookups })
    }

    pub fn history(&self) -> &RankHistory {
        &self.history
    }

    pub fn summary(&self) -> Option<&SummaryMetrics> {
        self.summary.as_ref()
    }

    pub fn latest_snapshot(&self) -> Option<&GridSnapshot> {
        self.latest.as_ref()
    }

    /// Snapshot committed just before the latest one.
    pub fn previous_snapshot(&self) -> Option<&GridSnapshot> {
        self.previous.as_ref()
    }

    /// Current rank of every keyword in the latest committed run.
    pub fn previous_ranks(&self) -> &HashMap<String, Rank> {
        &self.previous_ranks
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.latest.as_ref().map(|s| s.key.started_at)
    }
}

#[cfg(feature = "parallel")]
fn aggregate_observations(run: &SampledRun, previous: &HashMap<String, Rank>) -> RunAggregate {
    crate::aggregate::aggregate_run_parallel(&run.observations, previous)
}

#[cfg(not(feature = "parallel"))]
fn aggregate_observations(run: &SampledRun, previous: &HashMap<String, Rank>) -> RunAggregate {
    crate::aggregate::aggregate_run(&run.observations, previous)
}
