//! Fixtures shared by the unit tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::sampler::{RankObservation, SampleOutcome};
use crate::{GeoPoint, GridCell, Rank};

pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub(crate) fn observation(keyword: &str, cell_id: u32, rank: u32) -> RankObservation {
    let rank = Rank::new(rank);
    RankObservation {
        keyword: keyword.to_string(),
        cell: GridCell {
            id: cell_id,
            row: 0,
            col: cell_id.saturating_sub(1),
            point: GeoPoint::new(30.0, -97.0 + cell_id as f64 * 0.01),
        },
        rank,
        search_volume: 100,
        competitors: Vec::new(),
        captured_at: at(0),
        latency_ms: 5,
        outcome: if rank.is_ranked() { SampleOutcome::Ranked } else { SampleOutcome::NotFound },
    }
}

/// Run over `spec` where `keyword` ranks `ranks[cell_id - 1]` at each cell.
pub(crate) fn sampled_run(
    spec: &crate::GridSpec,
    secs: i64,
    keywords: &[(&str, &[u32])],
) -> crate::SampledRun {
    let cells = spec.generate().unwrap();
    let mut observations = Vec::new();
    for (keyword, ranks) in keywords {
        for cell in &cells {
            let mut o = observation(keyword, cell.id, ranks[cell.id as usize - 1]);
            o.cell = *cell;
            observations.push(o);
        }
    }
    crate::SampledRun { key: spec.run_key(at(secs)), cells, observations }
}
