//! Rank aggregation.
//!
//! Rolls the per-cell observations of one run into a row per keyword and the
//! portfolio [`SummaryMetrics`]. A keyword's current rank is its best (minimum)
//! rank over all cells: a customer searching anywhere nearby finding the business
//! is what counts. Every reduction here is commutative, so the result does not
//! depend on the order observations arrived in.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::sampler::RankObservation;
use crate::Rank;

/// Aggregated result of one keyword in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRank {
    pub keyword: String,
    /// Best rank over all cells
    pub current_rank: Rank,
    /// Current rank of the previous run, `None` for a new keyword
    pub previous_rank: Option<Rank>,
    /// `previous - current`; positive is an improvement, 0 for a new keyword
    pub change: i32,
    /// Mean position over all cells, unranked cells counted as 101
    pub average_rank: f64,
    /// Lowest-id cell holding the best rank
    pub best_cell_id: Option<u32>,
    /// Cells where the business ranks in the top 3
    pub top3_cells: u32,
    pub cell_count: u32,
    /// Largest search volume reported by the provider
    pub search_volume: u32,
}

impl KeywordRank {
    /// Share of cells ranking in the top 3 (0.0-1.0).
    pub fn top3_share(&self) -> f64 {
        if self.cell_count == 0 {
            0.0
        } else {
            self.top3_cells as f64 / self.cell_count as f64
        }
    }
}

/// Portfolio summary of one run.
///
/// Invariant: `keywords_up + keywords_down + keywords_no_change == total_keywords`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_keywords: u32,
    pub keywords_up: u32,
    pub keywords_no_change: u32,
    pub keywords_down: u32,
    pub keywords_top3: u32,
    pub keywords_top10: u32,
    pub keywords_top100: u32,
}

impl SummaryMetrics {
    pub fn from_keywords(rows: &[KeywordRank]) -> Self {
        let mut metrics = SummaryMetrics::default();
        for row in rows {
            metrics.total_keywords += 1;
            match row.change {
                c if c > 0 => metrics.keywords_up += 1,
                c if c < 0 => metrics.keywords_down += 1,
                _ => metrics.keywords_no_change += 1,
            }
            if row.current_rank.is_within(3) {
                metrics.keywords_top3 += 1;
            }
            if row.current_rank.is_within(10) {
                metrics.keywords_top10 += 1;
            }
            if row.current_rank.is_within(Rank::MAX_TRACKED) {
                metrics.keywords_top100 += 1;
            }
        }
        metrics
    }

    pub fn is_consistent(&self) -> bool {
        self.keywords_up + self.keywords_down + self.keywords_no_change == self.total_keywords
    }
}

/// Aggregated output of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAggregate {
    /// One row per keyword, sorted by keyword text
    pub keywords: Vec<KeywordRank>,
    pub summary: SummaryMetrics,
}

impl RunAggregate {
    pub fn get(&self, keyword: &str) -> Option<&KeywordRank> {
        self.keywords
            .binary_search_by(|row| row.keyword.as_str().cmp(keyword))
            .ok()
            .map(|i| &self.keywords[i])
    }

    /// Current rank per keyword, the `previous` input of the next run.
    pub fn current_ranks(&self) -> HashMap<String, Rank> {
        self.keywords
            .iter()
            .map(|row| (row.keyword.clone(), row.current_rank))
            .collect()
    }
}

// Running totals for one keyword
#[derive(Debug, Default, Clone)]
struct KeywordAccumulator {
    best: Option<(Rank, u32)>,
    position_sum: u64,
    cells: u32,
    top3: u32,
    volume: u32,
}

impl KeywordAccumulator {
    fn add(&mut self, observation: &RankObservation) {
        let candidate = (observation.rank, observation.cell.id);
        self.best = Some(match self.best {
            Some(best) => best.min(candidate),
            None => candidate,
        });
        self.position_sum += observation.rank.position() as u64;
        self.cells += 1;
        if observation.rank.is_within(3) {
            self.top3 += 1;
        }
        self.volume = self.volume.max(observation.search_volume);
    }

    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    fn merge(mut self, other: KeywordAccumulator) -> Self {
        self.best = match (self.best, other.best) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.position_sum += other.position_sum;
        self.cells += other.cells;
        self.top3 += other.top3;
        self.volume = self.volume.max(other.volume);
        self
    }

    fn finish(self, keyword: String, previous: Option<Rank>) -> KeywordRank {
        let current_rank = self.best.map_or(Rank::UNRANKED, |(rank, _)| rank);
        let change = previous.map_or(0, |prev| current_rank.change_from(prev));
        let average_rank = if self.cells == 0 {
            Rank::UNRANKED.position() as f64
        } else {
            self.position_sum as f64 / self.cells as f64
        };

        KeywordRank {
            keyword,
            current_rank,
            previous_rank: previous,
            change,
            average_rank,
            best_cell_id: self.best.map(|(_, id)| id),
            top3_cells: self.top3,
            cell_count: self.cells,
            search_volume: self.volume,
        }
    }
}

fn finish_groups(
    groups: BTreeMap<String, KeywordAccumulator>,
    previous: &HashMap<String, Rank>,
) -> RunAggregate {
    let keywords: Vec<KeywordRank> = groups
        .into_iter()
        .map(|(keyword, acc)| {
            let prev = previous.get(&keyword).copied();
            acc.finish(keyword, prev)
        })
        .collect();
    let summary = SummaryMetrics::from_keywords(&keywords);

    debug!(
        "[Aggregate] {} keywords: {} up, {} down, {} unchanged, {} in top 3",
        summary.total_keywords,
        summary.keywords_up,
        summary.keywords_down,
        summary.keywords_no_change,
        summary.keywords_top3
    );

    RunAggregate { keywords, summary }
}

/// Aggregate one run's observations against the previous run's current ranks.
///
/// Keywords missing from `previous` are new: change 0, counted as unchanged.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use geogrid_rank::aggregate_run;
///
/// let aggregate = aggregate_run(&[], &HashMap::new());
/// assert!(aggregate.keywords.is_empty());
/// assert_eq!(aggregate.summary.total_keywords, 0);
/// ```
pub fn aggregate_run(
    observations: &[RankObservation],
    previous: &HashMap<String, Rank>,
) -> RunAggregate {
    let mut groups: BTreeMap<String, KeywordAccumulator> = BTreeMap::new();
    for observation in observations {
        match groups.get_mut(observation.keyword.as_str()) {
            Some(acc) => acc.add(observation),
            None => {
                let mut acc = KeywordAccumulator::default();
                acc.add(observation);
                groups.insert(observation.keyword.clone(), acc);
            }
        }
    }
    finish_groups(groups, previous)
}

/// Same as [`aggregate_run`], folding observations on the rayon pool.
///
/// Recommended for large keyword sets; output is identical to the sequential version.
#[cfg(feature = "parallel")]
pub fn aggregate_run_parallel(
    observations: &[RankObservation],
    previous: &HashMap<String, Rank>,
) -> RunAggregate {
    use rayon::prelude::*;

    let groups = observations
        .par_iter()
        .fold(BTreeMap::new, |mut groups: BTreeMap<String, KeywordAccumulator>, observation| {
            groups
                .entry(observation.keyword.clone())
                .or_default()
                .add(observation);
            groups
        })
        .reduce(BTreeMap::new, |mut left, right| {
            for (keyword, acc) in right {
                let merged = match left.remove(&keyword) {
                    Some(existing) => existing.merge(acc),
                    None => acc,
                };
                left.insert(keyword, merged);
            }
            left
        });

    finish_groups(groups, previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::observation;

    fn previous(entries: &[(&str, u32)]) -> HashMap<String, Rank> {
        entries.iter().map(|(k, r)| (k.to_string(), Rank::new(*r))).collect()
    }

    fn sample_observations() -> Vec<RankObservation> {
        vec![
            observation("plumber", 1, 3),
            observation("plumber", 2, 7),
            observation("plumber", 3, 12),
            observation("drain cleaning", 1, 4),
            observation("drain cleaning", 2, 150),
            observation("drain cleaning", 3, 9),
            observation("water heater", 1, 150),
            observation("water heater", 2, 0),
            observation("water heater", 3, 101),
            observation("emergency plumber", 1, 10),
            observation("emergency plumber", 2, 2),
            observation("emergency plumber", 3, 2),
        ]
    }

    #[test]
    fn test_current_rank_is_minimum() {
        let obs = vec![
            observation("plumber", 1, 3),
            observation("plumber", 2, 7),
            observation("plumber", 3, 12),
        ];
        let aggregate = aggregate_run(&obs, &HashMap::new());
        let row = aggregate.get("plumber").unwrap();
        assert_eq!(row.current_rank, Rank::new(3));
        assert_eq!(row.best_cell_id, Some(1));
        assert_eq!(row.cell_count, 3);
        assert!((row.average_rank - 22.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_change_sign_convention() {
        let obs = vec![observation("a", 1, 4), observation("b", 1, 10)];
        let aggregate = aggregate_run(&obs, &previous(&[("a", 10), ("b", 4)]));

        assert_eq!(aggregate.get("a").unwrap().change, 6);
        assert_eq!(aggregate.get("b").unwrap().change, -6);
        assert_eq!(aggregate.summary.keywords_up, 1);
        assert_eq!(aggregate.summary.keywords_down, 1);
    }

    #[test]
    fn test_new_keyword_counts_as_unchanged() {
        let obs = vec![observation("new", 1, 5), observation("old", 1, 5)];
        let aggregate = aggregate_run(&obs, &previous(&[("old", 8)]));

        let new = aggregate.get("new").unwrap();
        assert_eq!(new.previous_rank, None);
        assert_eq!(new.change, 0);
        assert_eq!(aggregate.summary.total_keywords, 2);
        assert_eq!(aggregate.summary.keywords_no_change, 1);
        assert_eq!(aggregate.summary.keywords_up, 1);
    }

    #[test]
    fn test_unranked_excluded_from_top_buckets() {
        let obs = vec![observation("ghost", 1, 150), observation("ghost", 2, 150)];
        let aggregate = aggregate_run(&obs, &HashMap::new());

        let row = aggregate.get("ghost").unwrap();
        assert_eq!(row.current_rank, Rank::UNRANKED);
        assert_eq!(row.current_rank.to_string(), "100+");
        assert_eq!(aggregate.summary.keywords_top100, 0);
        assert_eq!(aggregate.summary.keywords_top10, 0);
        assert_eq!(aggregate.summary.keywords_top3, 0);
    }

    #[test]
    fn test_summary_buckets() {
        let aggregate = aggregate_run(&sample_observations(), &HashMap::new());
        let s = aggregate.summary;
        assert_eq!(s.total_keywords, 4);
        // plumber 3, drain cleaning 4, emergency plumber 2, water heater 100+
        assert_eq!(s.keywords_top3, 2);
        assert_eq!(s.keywords_top10, 3);
        assert_eq!(s.keywords_top100, 3);
        assert!(s.is_consistent());
    }

    #[test]
    fn test_invariant_holds_with_mixed_history() {
        let prev = previous(&[("plumber", 5), ("drain cleaning", 4), ("water heater", 80)]);
        let aggregate = aggregate_run(&sample_observations(), &prev);
        let s = aggregate.summary;
        assert_eq!(s.keywords_up, 1); // plumber 5 -> 3
        assert_eq!(s.keywords_down, 1); // water heater 80 -> 100+
        assert_eq!(s.keywords_no_change, 2); // drain cleaning, new emergency plumber
        assert!(s.is_consistent());
    }

    #[test]
    fn test_order_independent() {
        let prev = previous(&[("plumber", 5), ("water heater", 80)]);
        let baseline = aggregate_run(&sample_observations(), &prev);

        let mut reversed = sample_observations();
        reversed.reverse();
        assert_eq!(aggregate_run(&reversed, &prev), baseline);

        let mut scrambled = sample_observations();
        scrambled.sort_by_key(|o| (o.cell.id * 7 + o.keyword.len() as u32 * 13) % 5);
        assert_eq!(aggregate_run(&scrambled, &prev), baseline);

        let mut rotated = sample_observations();
        rotated.rotate_left(5);
        assert_eq!(aggregate_run(&rotated, &prev), baseline);
    }

    #[test]
    fn test_tied_best_rank_picks_lowest_cell() {
        let obs = vec![observation("k", 9, 2), observation("k", 4, 2), observation("k", 6, 5)];
        let aggregate = aggregate_run(&obs, &HashMap::new());
        let row = aggregate.get("k").unwrap();
        assert_eq!(row.best_cell_id, Some(4));
        assert_eq!(row.top3_cells, 2);
        assert!((row.top3_share() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rows_sorted_and_ranks_exported() {
        let aggregate = aggregate_run(&sample_observations(), &HashMap::new());
        let names: Vec<&str> = aggregate.keywords.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(names, vec!["drain cleaning", "emergency plumber", "plumber", "water heater"]);

        let ranks = aggregate.current_ranks();
        assert_eq!(ranks["plumber"], Rank::new(3));
        assert_eq!(ranks["water heater"], Rank::UNRANKED);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let prev = previous(&[("plumber", 5), ("drain cleaning", 1)]);
        let mut many = Vec::new();
        for round in 0..50u32 {
            for (i, mut o) in sample_observations().into_iter().enumerate() {
                o.cell.id = round * 12 + i as u32 + 1;
                many.push(o);
            }
        }
        assert_eq!(aggregate_run_parallel(&many, &prev), aggregate_run(&many, &prev));
    }
}
