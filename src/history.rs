//! Append-only keyword rank history.
//!
//! Each committed run contributes exactly one point per keyword. Series are ordered
//! by run date; a point is never rewritten, so trend charts can be restarted from
//! any prefix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregate::RunAggregate;
use crate::{GridRankError, Rank, Result};

/// One point of a keyword's trend chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankHistoryPoint {
    pub date: DateTime<Utc>,
    pub rank: Rank,
}

/// Rank series per keyword.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankHistory {
    series: BTreeMap<String, Vec<RankHistoryPoint>>,
}

impl RankHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that a run dated `date` may be appended for every keyword of `aggregate`.
    pub fn check_append(&self, date: DateTime<Utc>, aggregate: &RunAggregate) -> Result<()> {
        for row in &aggregate.keywords {
            if let Some(last) = self.latest(&row.keyword) {
                if date <= last.date {
                    return Err(GridRankError::StaleRun {
                        run_date: date.to_rfc3339(),
                        latest: last.date.to_rfc3339(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Append one point per keyword of `aggregate`, dated `date`.
    ///
    /// All-or-nothing: if any keyword already has a point at or after `date`,
    /// nothing is appended.
    pub fn append_run(&mut self, date: DateTime<Utc>, aggregate: &RunAggregate) -> Result<()> {
        self.check_append(date, aggregate)?;
        for row in &aggregate.keywords {
            self.series
                .entry(row.keyword.clone())
                .or_default()
                .push(RankHistoryPoint { date, rank: row.current_rank });
        }
        Ok(())
    }

    /// Full series for `keyword`, oldest first. Empty for an unknown keyword.
    pub fn series(&self, keyword: &str) -> &[RankHistoryPoint] {
        self.series.get(keyword).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest(&self, keyword: &str) -> Option<&RankHistoryPoint> {
        self.series(keyword).last()
    }

    /// Best rank ever recorded for `keyword`.
    pub fn best_rank(&self, keyword: &str) -> Option<Rank> {
        self.series(keyword).iter().map(|p| p.rank).min()
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
