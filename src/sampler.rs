//! Rank sampling runs.
//!
//! A run fans out one provider lookup per (grid cell, keyword) pair:
//! - Fail-fast readiness check before any lookup is dispatched
//! - Bounded concurrency with optional dispatch pacing (spaces out request starts)
//! - Independent timeout per lookup
//! - Soft failures degrade to the unranked sentinel instead of failing the run
//! - Cancellation drops every partial result

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::provider::{ProviderError, RankProvider};
use crate::{GridCell, GridRankError, GridSpec, Keyword, Rank, Result, RunKey};

/// Progress callback type, called with `(completed, total)` lookups
pub type ProgressCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// Configuration for sampling runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Identity of the tracked business as understood by the provider
    /// (listing name, place id, domain...).
    pub business_identity: String,

    /// Maximum lookups in flight at once. Should follow the provider's
    /// concurrency limit rather than CPU count.
    /// Default: 8
    pub max_concurrency: usize,

    /// Timeout for a single lookup. A timed-out lookup is recorded as unranked.
    /// Default: 15000 ms
    pub call_timeout_ms: u64,

    /// Minimum spacing between lookup dispatches; 0 disables pacing.
    /// Default: 0 ms
    pub dispatch_interval_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            business_identity: String::new(),
            max_concurrency: 8,
            call_timeout_ms: 15_000,
            dispatch_interval_ms: 0,
        }
    }
}

/// How a single lookup ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SampleOutcome {
    /// Provider returned a position
    Ranked,
    /// Provider answered but the business was not listed
    NotFound,
    /// Provider call failed; rank recorded as unranked
    ProviderFailed(String),
    /// Provider call exceeded the per-call timeout; rank recorded as unranked
    TimedOut,
}

impl SampleOutcome {
    /// True for soft failures (provider error or timeout).
    pub fn is_failure(&self) -> bool {
        matches!(self, SampleOutcome::ProviderFailed(_) | SampleOutcome::TimedOut)
    }
}

/// Rank of one keyword at one grid cell, captured during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankObservation {
    /// Keyword text
    pub keyword: String,
    pub cell: GridCell,
    pub rank: Rank,
    pub search_volume: u32,
    pub competitors: Vec<String>,
    pub captured_at: DateTime<Utc>,
    /// Wall time spent on the provider call
    pub latency_ms: u64,
    pub outcome: SampleOutcome,
}

/// Every observation of one completed run. Owned by the run until committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledRun {
    pub key: RunKey,
    pub cells: Vec<GridCell>,
    pub observations: Vec<RankObservation>,
}

impl SampledRun {
    /// Number of lookups that degraded to unranked because of a provider error or timeout.
    pub fn failed_count(&self) -> usize {
        self.observations.iter().filter(|o| o.outcome.is_failure()).count()
    }

    /// Observations of one keyword, in cell id order.
    pub fn observations_for(&self, keyword: &str) -> Vec<&RankObservation> {
        let mut found: Vec<&RankObservation> =
            self.observations.iter().filter(|o| o.keyword == keyword).collect();
        found.sort_by_key(|o| o.cell.id);
        found
    }
}

// ============================================================================
// Cancellation
// ============================================================================

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable handle used to abort a run in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel is not missed
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// Dispatch pacing
// ============================================================================

/// Dispatch pacer - spaces out when lookups START.
/// Each caller reserves the next slot, `interval` after the previous one.
struct DispatchPacer {
    next_dispatch: Mutex<Instant>,
    interval: Duration,
    dispatched_count: AtomicU32,
}

impl DispatchPacer {
    fn new(interval: Duration) -> Self {
        Self {
            next_dispatch: Mutex::new(Instant::now()),
            interval,
            dispatched_count: AtomicU32::new(0),
        }
    }

    async fn wait_for_dispatch_slot(&self) -> u32 {
        let (wait_duration, dispatch_num) = {
            let mut next = self.next_dispatch.lock().await;
            let now = Instant::now();

            let dispatch_at = if *next > now { *next } else { now };
            *next = dispatch_at + self.interval;

            let num = self.dispatched_count.fetch_add(1, Ordering::Relaxed) + 1;
            (dispatch_at.saturating_duration_since(now), num)
        };

        // Wait outside the lock
        if !wait_duration.is_zero() {
            debug!("[Dispatch #{}] Waiting {:?} for slot", dispatch_num, wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        dispatch_num
    }
}

// ============================================================================
// Sampler
// ============================================================================

/// Runs rank lookups for a grid against a provider.
pub struct RankSampler<P> {
    provider: P,
    config: SamplerConfig,
    pacer: DispatchPacer,
    on_progress: Option<ProgressCallback>,
}

impl<P: RankProvider> RankSampler<P> {
    pub fn new(provider: P, config: SamplerConfig) -> Self {
        let pacer = DispatchPacer::new(Duration::from_millis(config.dispatch_interval_ms));
        Self { provider, config, pacer, on_progress: None }
    }

    /// Report `(completed, total)` after every finished lookup.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Look up one (cell, keyword) pair.
    ///
    /// Never fails: provider errors and timeouts are recorded as an unranked
    /// observation with the matching [`SampleOutcome`].
    pub async fn sample_rank(&self, cell: &GridCell, keyword: &Keyword) -> RankObservation {
        let started = Instant::now();
        let captured_at = Utc::now();
        let timeout = Duration::from_millis(self.config.call_timeout_ms);

        let lookup = self
            .provider
            .lookup_rank(cell.point, &keyword.text, &self.config.business_identity);
        let result = match tokio::time::timeout(timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout { after_ms: self.config.call_timeout_ms }),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut observation = RankObservation {
            keyword: keyword.text.clone(),
            cell: *cell,
            rank: Rank::UNRANKED,
            search_volume: 0,
            competitors: Vec::new(),
            captured_at,
            latency_ms,
            outcome: SampleOutcome::NotFound,
        };

        match result {
            Ok(answer) => {
                // 0 and positions past the tracked depth stay NotFound
                observation.rank = answer.rank.map_or(Rank::UNRANKED, Rank::new);
                if observation.rank.is_ranked() {
                    observation.outcome = SampleOutcome::Ranked;
                }
                observation.search_volume = answer.search_volume;
                observation.competitors = answer.competitors;
            }
            Err(ProviderError::Timeout { after_ms }) => {
                warn!(
                    "[RankSampler] cell {} \"{}\" timed out after {}ms, recording 100+",
                    cell.id, keyword.text, after_ms
                );
                observation.outcome = SampleOutcome::TimedOut;
            }
            Err(e) => {
                warn!(
                    "[RankSampler] cell {} \"{}\" failed: {}, recording 100+",
                    cell.id, keyword.text, e
                );
                observation.outcome = SampleOutcome::ProviderFailed(e.to_string());
            }
        }

        observation
    }

    /// Sample every keyword at every cell of `spec`, timestamped now.
    pub async fn run(
        &self,
        spec: &GridSpec,
        keywords: &[Keyword],
        cancel: &CancelToken,
    ) -> Result<SampledRun> {
        self.run_at(spec, keywords, cancel, Utc::now()).await
    }

    /// Sample every keyword at every cell of `spec`, keyed by `started_at`.
    ///
    /// # Errors
    ///
    /// - Grid validation errors, before anything else
    /// - [`GridRankError::NoKeywords`] for an empty keyword list
    /// - [`GridRankError::ProviderConfig`] when the provider is not ready; no
    ///   lookup is dispatched
    /// - [`GridRankError::Cancelled`] when `cancel` fires; partial results are dropped
    pub async fn run_at(
        &self,
        spec: &GridSpec,
        keywords: &[Keyword],
        cancel: &CancelToken,
        started_at: DateTime<Utc>,
    ) -> Result<SampledRun> {
        let cells = spec.generate()?;
        if keywords.is_empty() {
            return Err(GridRankError::NoKeywords);
        }
        self.provider.check_ready().map_err(|e| match e {
            ProviderError::Config(msg) => GridRankError::ProviderConfig(msg),
            other => GridRankError::ProviderConfig(other.to_string()),
        })?;

        let total = (cells.len() * keywords.len()) as u32;
        let completed = AtomicU32::new(0);
        let start = Instant::now();

        info!(
            "[RankSampler] Starting run: {} cells x {} keywords = {} lookups (max concurrent: {}, dispatch interval: {}ms)",
            cells.len(),
            keywords.len(),
            total,
            self.config.max_concurrency,
            self.config.dispatch_interval_ms
        );

        let pairs = cells
            .iter()
            .flat_map(|cell| keywords.iter().map(move |keyword| (cell, keyword)));

        let sampling = stream::iter(pairs)
            .map(|(cell, keyword)| {
                let completed = &completed;
                async move {
                    if self.config.dispatch_interval_ms > 0 {
                        self.pacer.wait_for_dispatch_slot().await;
                    }

                    let observation = self.sample_rank(cell, keyword).await;

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(ref cb) = self.on_progress {
                        cb(done, total);
                    }

                    observation
                }
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect::<Vec<RankObservation>>();

        let observations = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let done = completed.load(Ordering::Relaxed);
                warn!("[RankSampler] Run cancelled after {}/{} lookups, discarding results", done, total);
                return Err(GridRankError::Cancelled { completed: done, total });
            }
            observations = sampling => observations,
        };

        let run = SampledRun {
            key: spec.run_key(started_at),
            cells,
            observations,
        };

        info!(
            "[RankSampler] DONE: {} lookups ({} unranked by failure) in {:.2}s",
            total,
            run.failed_count(),
            start.elapsed().as_secs_f64()
        );

        Ok(run)
    }
}
