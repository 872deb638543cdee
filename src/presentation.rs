//! Dashboard view shapes.
//!
//! Pure mapping from aggregated run data to the plain structures the dashboard
//! renders: summary tiles, keyword rows with trend arrays, map markers and
//! connector overlays. Ranks beyond 100 are always rendered as `100+`; numeric
//! rank fields are `null` for them, never the raw sentinel.

use serde::Serialize;
use std::collections::HashMap;

use crate::aggregate::RunAggregate;
use crate::history::RankHistory;
use crate::tracker::GridSnapshot;
use crate::trend::{Trend, TrendConnector};
use crate::{Keyword, Rank};

/// One point of a keyword trend chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPointView {
    /// `YYYY-MM-DD`
    pub date: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    /// `None` when unranked
    pub rank: Option<u32>,
    pub label: String,
}

/// One row of the keyword table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordRow {
    pub keyword: String,
    pub tags: Vec<String>,
    pub is_primary: bool,
    /// `None` when unranked
    pub current_rank: Option<u32>,
    pub current_label: String,
    /// `None` for a new keyword or an unranked previous run; see `previous_label`
    pub previous_rank: Option<u32>,
    /// `-` for a keyword without a previous run
    pub previous_label: String,
    pub best_rank: Option<u32>,
    pub best_label: String,
    pub change: i32,
    pub trend: Trend,
    pub average_rank: f64,
    pub search_volume: u32,
    pub difficulty: u32,
    pub history: Vec<HistoryPointView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryTile {
    pub key: &'static str,
    pub label: &'static str,
    pub value: u32,
}

/// Rank pin for one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridMarker {
    pub cell_id: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub rank: Option<u32>,
    pub rank_label: String,
    /// Colour bucket: `top3`, `top10`, `top20`, `ranked` or `unranked`
    pub tone: &'static str,
    pub rank_change: i32,
}

/// Trend glyph ready for the map layer. Coordinates are `[lat, lng]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorOverlay {
    pub cell_id: Option<u32>,
    pub start: [f64; 2],
    pub end: [f64; 2],
    pub midpoint: [f64; 2],
    pub bearing_degrees: f64,
    pub rank_change: i32,
    pub trend: Trend,
    pub color: &'static str,
}

/// Everything one dashboard screen shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub summary: Vec<SummaryTile>,
    pub keywords: Vec<KeywordRow>,
    /// Keyword the map markers belong to
    pub marker_keyword: Option<String>,
    pub markers: Vec<GridMarker>,
    pub connectors: Vec<ConnectorOverlay>,
}

impl DashboardView {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// Position for numeric view fields; the sentinel only ever shows as its label
fn shown_rank(rank: Rank) -> Option<u32> {
    rank.is_ranked().then(|| rank.position())
}

fn rank_tone(rank: Rank) -> &'static str {
    match rank.position() {
        1..=3 => "top3",
        4..=10 => "top10",
        11..=20 => "top20",
        _ if rank.is_ranked() => "ranked",
        _ => "unranked",
    }
}

fn trend_color(trend: Trend) -> &'static str {
    match trend {
        Trend::Improved => "#16a34a",
        Trend::Declined => "#dc2626",
        Trend::Flat => "#9ca3af",
    }
}

/// Summary tiles in display order.
pub fn summary_tiles(aggregate: &RunAggregate) -> Vec<SummaryTile> {
    let s = &aggregate.summary;
    vec![
        SummaryTile { key: "total", label: "Total Keywords", value: s.total_keywords },
        SummaryTile { key: "up", label: "Improved", value: s.keywords_up },
        SummaryTile { key: "no_change", label: "No Change", value: s.keywords_no_change },
        SummaryTile { key: "down", label: "Declined", value: s.keywords_down },
        SummaryTile { key: "top3", label: "Top 3", value: s.keywords_top3 },
        SummaryTile { key: "top10", label: "Top 10", value: s.keywords_top10 },
        SummaryTile { key: "top100", label: "Top 100", value: s.keywords_top100 },
    ]
}

/// Keyword rows, primary keywords first, then alphabetical.
pub fn keyword_rows(
    keywords: &[Keyword],
    aggregate: &RunAggregate,
    history: &RankHistory,
) -> Vec<KeywordRow> {
    let campaign: HashMap<&str, &Keyword> = keywords.iter().map(|k| (k.text.as_str(), k)).collect();

    let mut rows: Vec<KeywordRow> = aggregate
        .keywords
        .iter()
        .map(|row| {
            let meta = campaign.get(row.keyword.as_str());
            let best = history
                .best_rank(&row.keyword)
                .map_or(row.current_rank, |best| best.min(row.current_rank));
            let series = history
                .series(&row.keyword)
                .iter()
                .map(|p| HistoryPointView {
                    date: p.date.format("%Y-%m-%d").to_string(),
                    timestamp: p.date.timestamp(),
                    rank: shown_rank(p.rank),
                    label: p.rank.to_string(),
                })
                .collect();
            let campaign_volume = meta.map_or(0, |k| k.volume);

            KeywordRow {
                keyword: row.keyword.clone(),
                tags: meta.map(|k| k.tags.clone()).unwrap_or_default(),
                is_primary: meta.is_some_and(|k| k.is_primary),
                current_rank: shown_rank(row.current_rank),
                current_label: row.current_rank.to_string(),
                previous_rank: row.previous_rank.and_then(shown_rank),
                previous_label: row.previous_rank.map_or_else(|| "-".to_string(), |r| r.to_string()),
                best_rank: shown_rank(best),
                best_label: best.to_string(),
                change: row.change,
                trend: Trend::from_change(row.change),
                average_rank: row.average_rank,
                search_volume: if campaign_volume > 0 { campaign_volume } else { row.search_volume },
                difficulty: meta.map_or(0, |k| k.difficulty),
                history: series,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.is_primary.cmp(&a.is_primary).then_with(|| a.keyword.cmp(&b.keyword)));
    rows
}

/// Map markers for `keyword` in `snapshot`, in cell id order.
pub fn grid_markers(snapshot: &GridSnapshot, keyword: &str) -> Vec<GridMarker> {
    snapshot
        .keyword(keyword)
        .unwrap_or(&[])
        .iter()
        .map(|c| GridMarker {
            cell_id: c.cell.id,
            latitude: c.cell.point.latitude,
            longitude: c.cell.point.longitude,
            rank: shown_rank(c.rank),
            rank_label: c.rank.to_string(),
            tone: rank_tone(c.rank),
            rank_change: c.rank_change,
        })
        .collect()
}

pub fn connector_overlays(connectors: &[TrendConnector]) -> Vec<ConnectorOverlay> {
    connectors
        .iter()
        .map(|c| ConnectorOverlay {
            cell_id: c.cell_id,
            start: [c.start.latitude, c.start.longitude],
            end: [c.end.latitude, c.end.longitude],
            midpoint: [c.midpoint.latitude, c.midpoint.longitude],
            bearing_degrees: c.bearing_degrees,
            rank_change: c.rank_change,
            trend: c.trend,
            color: trend_color(c.trend),
        })
        .collect()
}

/// Assemble the full dashboard view.
///
/// Map markers show the primary keyword when it is in `snapshot`, otherwise the
/// snapshot's first keyword.
pub fn build_dashboard(
    keywords: &[Keyword],
    aggregate: &RunAggregate,
    history: &RankHistory,
    snapshot: Option<&GridSnapshot>,
    connectors: &[TrendConnector],
) -> DashboardView {
    let marker_keyword = snapshot.and_then(|snap| {
        keywords
            .iter()
            .filter(|k| k.is_primary)
            .map(|k| k.text.as_str())
            .find(|text| snap.keyword(text).is_some())
            .or_else(|| snap.keywords().next())
            .map(str::to_string)
    });

    let markers = match (snapshot, marker_keyword.as_deref()) {
        (Some(snap), Some(keyword)) => grid_markers(snap, keyword),
        _ => Vec::new(),
    };

    DashboardView {
        summary: summary_tiles(aggregate),
        keywords: keyword_rows(keywords, aggregate, history),
        marker_keyword,
        markers,
        connectors: connector_overlays(connectors),
    }
}
