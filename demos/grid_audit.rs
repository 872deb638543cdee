//! Sample a 5x5 grid around a business and print the rank map for each keyword.
//!
//! Run with: cargo run --example grid_audit

use geogrid_rank::{
    geo_utils, CancelToken, GeoPoint, GridSpec, Keyword, ProviderError, ProviderRank, Rank,
    RankProvider, RankSampler, RankTracker, SamplerConfig,
};

/// Ranks worsen with distance from the business; longer keywords are more competitive.
struct DistanceDecayProvider {
    business: GeoPoint,
}

impl RankProvider for DistanceDecayProvider {
    async fn lookup_rank(
        &self,
        point: GeoPoint,
        keyword: &str,
        _business_identity: &str,
    ) -> Result<ProviderRank, ProviderError> {
        let miles = geo_utils::distance_miles(&self.business, &point);
        let rank = 1 + (miles * 4.0) as u32 + keyword.len() as u32 / 4;
        Ok(ProviderRank {
            rank: (rank <= 100).then_some(rank),
            search_volume: 1000 / keyword.len() as u32,
            competitors: vec!["Corner Slice".to_string()],
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let business = GeoPoint::new(30.2672, -97.7431); // Austin
    let spec = GridSpec::new(business, 5, 3.0);
    let keywords = vec![
        Keyword { is_primary: true, ..Keyword::new("pizza") },
        Keyword::new("pizza delivery near me"),
    ];

    let config = SamplerConfig {
        business_identity: "Slice Republic".to_string(),
        max_concurrency: 4,
        ..SamplerConfig::default()
    };
    let sampler = RankSampler::new(DistanceDecayProvider { business }, config);

    println!("Grid Audit");
    println!("==========");
    println!(
        "Center: ({:.4}, {:.4}), {}x{} cells, radius {} mi, step {:.2} mi\n",
        spec.center.latitude,
        spec.center.longitude,
        spec.grid_size,
        spec.grid_size,
        spec.radius_miles,
        spec.step_miles()
    );

    let run = sampler.run(&spec, &keywords, &CancelToken::new()).await?;
    let mut tracker = RankTracker::new();
    let report = tracker.commit(run)?;

    let snapshot = tracker.latest_snapshot().ok_or("no snapshot after commit")?;
    for keyword in &keywords {
        println!("\"{}\"", keyword.text);
        let Some(cells) = snapshot.keyword(&keyword.text) else {
            continue;
        };
        for row in cells.chunks(spec.grid_size as usize) {
            let line: Vec<String> = row.iter().map(|c| format!("{:>5}", c.rank.to_string())).collect();
            println!("  {}", line.join(""));
        }
        if let Some(summary) = report.aggregate.get(&keyword.text) {
            println!(
                "  current {}  average {:.1}  top-3 share {:.0}%\n",
                summary.current_rank,
                summary.average_rank,
                summary.top3_share() * 100.0
            );
        }
    }

    let s = &report.aggregate.summary;
    println!(
        "Keywords: {} total, {} in top 3, {} in top 10, {} ranked",
        s.total_keywords, s.keywords_top3, s.keywords_top10, s.keywords_top100
    );
    println!("Failed lookups: {}", report.failed_lookups);
    println!("Unranked sentinel renders as {}", Rank::UNRANKED);

    Ok(())
}
