//! Commit two runs a week apart and emit the dashboard JSON with trend connectors.
//!
//! Run with: cargo run --example trend_overlay

use std::sync::Arc;

use chrono::{Duration, Utc};
use geogrid_rank::{
    best_cell_connector, build_dashboard, cell_connectors, geo_utils, CancelToken, GeoPoint,
    GridSpec, Keyword, ProviderError, ProviderRank, RankProvider, RankSampler, RankTracker,
    SamplerConfig,
};

/// Rank grows with distance from a "sweet spot" that can be moved between runs.
struct SweetSpotProvider {
    spot: GeoPoint,
}

impl RankProvider for SweetSpotProvider {
    async fn lookup_rank(
        &self,
        point: GeoPoint,
        keyword: &str,
        _business_identity: &str,
    ) -> Result<ProviderRank, ProviderError> {
        let miles = geo_utils::distance_miles(&self.spot, &point);
        let rank = 1 + (miles * 6.0) as u32 + keyword.len() as u32 / 6;
        Ok(ProviderRank {
            rank: (rank <= 100).then_some(rank),
            search_volume: 2400,
            competitors: Vec::new(),
        })
    }
}

async fn sample(
    spec: &GridSpec,
    keywords: &[Keyword],
    spot: GeoPoint,
    started_at: chrono::DateTime<Utc>,
) -> geogrid_rank::Result<geogrid_rank::SampledRun> {
    let sampler = RankSampler::new(SweetSpotProvider { spot }, SamplerConfig::default())
        .with_progress(Arc::new(|done: u32, total: u32| {
            if done == total {
                eprintln!("  sampled {}/{} lookups", done, total);
            }
        }));
    sampler.run_at(spec, keywords, &CancelToken::new(), started_at).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let business = GeoPoint::new(41.8781, -87.6298); // Chicago
    let spec = GridSpec::new(business, 3, 2.0);
    let keywords = vec![
        Keyword { is_primary: true, tags: vec!["core".to_string()], ..Keyword::new("dentist") },
        Keyword::new("emergency dentist"),
    ];

    let last_week = Utc::now() - Duration::days(7);
    let now = Utc::now();

    // The strongest area drifts two miles east between the runs
    let before = geo_utils::offset_point(&business, 0.0, -2.0)?;
    let after = geo_utils::offset_point(&business, 0.0, 2.0)?;

    let mut tracker = RankTracker::new();
    tracker.commit(sample(&spec, &keywords, before, last_week).await?)?;
    let report = tracker.commit(sample(&spec, &keywords, after, now).await?)?;

    let previous = tracker.previous_snapshot().ok_or("missing previous snapshot")?;
    let latest = tracker.latest_snapshot().ok_or("missing latest snapshot")?;

    let connectors = cell_connectors(previous, latest, "dentist", 0.4)?;
    if let Some(migration) = best_cell_connector(previous, latest, "dentist")? {
        eprintln!(
            "Best cell moved to #{} (bearing {:.0} deg, {} {})",
            migration.cell_id.unwrap_or_default(),
            migration.bearing_degrees,
            migration.trend.as_str(),
            migration.rank_change.abs()
        );
    }

    let view = build_dashboard(&keywords, &report.aggregate, tracker.history(), Some(latest), &connectors);
    println!("{}", view.to_json()?);

    Ok(())
}
