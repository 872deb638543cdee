//! Sample a grid against a live JSON rank service.
//!
//! Run with:
//!   RANK_API_URL=https://ranks.example.com/v1 RANK_API_LOGIN=... RANK_API_PASSWORD=... \
//!   cargo run --example http_sampling --features http

use std::sync::Arc;
use std::time::Instant;

use geogrid_rank::{
    CancelToken, GeoPoint, GridSpec, HttpProviderConfig, HttpRankProvider, Keyword, RankSampler,
    RankTracker, SamplerConfig,
};

const DISPATCH_INTERVAL_MS: u64 = 80;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = HttpProviderConfig {
        base_url: std::env::var("RANK_API_URL")?,
        login: std::env::var("RANK_API_LOGIN").unwrap_or_default(),
        password: std::env::var("RANK_API_PASSWORD").unwrap_or_default(),
        ..HttpProviderConfig::default()
    };
    let provider = HttpRankProvider::new(config)?;

    let spec = GridSpec::new(GeoPoint::new(47.6062, -122.3321), 7, 5.0); // Seattle
    let keywords = vec![
        Keyword { is_primary: true, ..Keyword::new("coffee shop") },
        Keyword::new("espresso bar"),
    ];
    let sampler_config = SamplerConfig {
        business_identity: "Pike Street Roasters".to_string(),
        max_concurrency: 6,
        dispatch_interval_ms: DISPATCH_INTERVAL_MS,
        ..SamplerConfig::default()
    };

    println!("HTTP Sampling");
    println!("=============");
    println!(
        "Lookups: {} ({:.1} req/s max)",
        spec.cell_count() * keywords.len(),
        1000.0 / DISPATCH_INTERVAL_MS as f64
    );

    // Ctrl-C aborts the run; nothing is committed
    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let sampler = RankSampler::new(provider, sampler_config).with_progress(Arc::new(
        |done: u32, total: u32| {
            if done % 10 == 0 || done == total {
                println!("  {}/{}", done, total);
            }
        },
    ));

    let start = Instant::now();
    let run = sampler.run(&spec, &keywords, &cancel).await?;
    let elapsed = start.elapsed();

    let mut tracker = RankTracker::new();
    let report = tracker.commit(run)?;

    println!("\nDone in {:.2}s, {} failed lookups", elapsed.as_secs_f64(), report.failed_lookups);
    for row in &report.aggregate.keywords {
        println!(
            "  {:<16} current {:>4}  average {:>5.1}  best cell {:?}",
            row.keyword, row.current_rank.to_string(), row.average_rank, row.best_cell_id
        );
    }

    Ok(())
}
