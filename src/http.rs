//! Generic JSON/HTTP ranking provider.
//!
//! Speaks the single rank lookup contract over HTTP:
//! - `POST {base_url}/rank` with `{latitude, longitude, keyword, business}`
//! - HTTP Basic credentials carried by the provider value (no ambient lookup)
//! - Connection pooling shared by every lookup of a run
//! - Automatic retry with exponential backoff on 429 and transport errors
//!
//! 401/403 answers are reported as configuration errors; everything else that goes
//! wrong is a soft per-lookup failure.

use base64::Engine;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::provider::{ProviderError, ProviderRank, RankProvider};
use crate::GeoPoint;

/// Connection settings for [`HttpRankProvider`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProviderConfig {
    /// Service root, e.g. `https://ranks.example.com/v1`
    pub base_url: String,
    pub login: String,
    pub password: String,
    /// Per-request timeout at the HTTP layer.
    /// Default: 30 s
    pub request_timeout_secs: u64,
    /// Retries after a 429 or transport error.
    /// Default: 3
    pub max_retries: u32,
    /// Base delay of the exponential 429 backoff.
    /// Default: 500 ms
    pub retry_backoff_ms: u64,
    /// Idle connections kept per host.
    /// Default: 16
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            login: String::new(),
            password: String::new(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
            pool_max_idle_per_host: 16,
        }
    }
}

/// Request body for the rank endpoint
#[derive(Debug, Serialize)]
struct RankRequest<'a> {
    latitude: f64,
    longitude: f64,
    keyword: &'a str,
    business: &'a str,
}

/// API response for the rank endpoint
#[derive(Debug, Deserialize)]
struct RankApiResponse {
    rank: Option<u32>,
    search_volume: Option<u32>,
    competitors: Option<Vec<String>>,
}

/// Tracks consecutive 429s across all in-flight lookups so that backoff grows
/// when the service keeps pushing back.
struct BackoffTracker {
    base: Duration,
    consecutive_429s: AtomicU32,
}

impl BackoffTracker {
    fn new(base: Duration) -> Self {
        Self { base, consecutive_429s: AtomicU32::new(0) }
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // Exponential backoff: base, 2x, 4x max
        let backoff = self.base * (1 << count.min(3)) / 2;
        warn!("[HttpRankProvider] Got 429! Consecutive: {}, backing off {:?}", count, backoff);
        backoff
    }
}

// Wait before retrying a transport error: 400ms, 800ms, ... capped at 6.4s
fn transport_backoff(retries: u32) -> Duration {
    Duration::from_millis(200 * (1u64 << retries.min(5)))
}

/// Rank provider backed by a JSON HTTP service.
pub struct HttpRankProvider {
    client: Client,
    rank_url: String,
    auth_header: Option<String>,
    max_retries: u32,
    backoff: BackoffTracker,
}

impl HttpRankProvider {
    /// Build the provider and its pooled client.
    ///
    /// Missing credentials are not an error here; [`RankProvider::check_ready`]
    /// reports them before a run starts.
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let auth_header = if config.login.is_empty() || config.password.is_empty() {
            None
        } else {
            let token = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", config.login, config.password));
            Some(format!("Basic {}", token))
        };

        Ok(Self {
            client,
            rank_url: format!("{}/rank", config.base_url.trim_end_matches('/')),
            auth_header,
            max_retries: config.max_retries,
            backoff: BackoffTracker::new(Duration::from_millis(config.retry_backoff_ms)),
        })
    }
}

impl RankProvider for HttpRankProvider {
    fn check_ready(&self) -> Result<(), ProviderError> {
        if self.rank_url == "/rank" {
            return Err(ProviderError::Config("base_url is not set".to_string()));
        }
        if self.auth_header.is_none() {
            return Err(ProviderError::Config("missing login or password".to_string()));
        }
        Ok(())
    }

    async fn lookup_rank(
        &self,
        point: GeoPoint,
        keyword: &str,
        business_identity: &str,
    ) -> Result<ProviderRank, ProviderError> {
        let Some(auth) = self.auth_header.as_deref() else {
            return Err(ProviderError::Config("missing login or password".to_string()));
        };
        let body = RankRequest {
            latitude: point.latitude,
            longitude: point.longitude,
            keyword,
            business: business_identity,
        };

        let mut retries = 0;
        let req_start = Instant::now();

        loop {
            let response = self
                .client
                .post(&self.rank_url)
                .header("Authorization", auth)
                .json(&body)
                .send()
                .await;

            let resp = match response {
                Ok(resp) => resp,
                Err(e) => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Err(ProviderError::Request(format!("Request error: {}", e)));
                    }
                    let wait = transport_backoff(retries);
                    warn!("[Lookup \"{}\"] Error: {}, retry {} after {:?}", keyword, e, retries, wait);
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > self.max_retries {
                    return Err(ProviderError::RateLimited { retries: self.max_retries });
                }
                let wait = self.backoff.record_429();
                tokio::time::sleep(wait).await;
                continue;
            }

            self.backoff.record_success();

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ProviderError::Config(format!("credentials rejected (HTTP {})", status)));
            }
            if !status.is_success() {
                return Err(ProviderError::Request(format!("HTTP {}", status)));
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| ProviderError::Request(format!("Body download error: {}", e)))?;
            let data: RankApiResponse = serde_json::from_slice(&bytes)
                .map_err(|e| ProviderError::InvalidResponse(format!("JSON parse error: {}", e)))?;

            debug!(
                "[Lookup \"{}\"] ({:.5}, {:.5}) rank={:?} in {:?} ({} bytes)",
                keyword,
                point.latitude,
                point.longitude,
                data.rank,
                req_start.elapsed(),
                bytes.len()
            );

            return Ok(ProviderRank {
                rank: data.rank,
                search_volume: data.search_volume.unwrap_or(0),
                competitors: data.competitors.unwrap_or_default(),
            });
        }
    }
}
