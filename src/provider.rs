//! Ranking provider contract.
//!
//! Any data source that can answer "where does this business rank for this keyword
//! when searched from this point" plugs in behind [`RankProvider`]. Providers are
//! interchangeable; credentials live on the provider value the caller constructs.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::GeoPoint;

/// Provider answer for one (point, keyword) lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderRank {
    /// 1-based position, `None` when the business was not found
    pub rank: Option<u32>,
    #[serde(default)]
    pub search_volume: u32,
    /// Businesses ranking above/around the tracked one
    #[serde(default)]
    pub competitors: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Missing or rejected credentials. Fatal for a whole run.
    #[error("provider configuration error: {0}")]
    Config(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider rate limit exceeded after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

impl ProviderError {
    pub fn is_config(&self) -> bool {
        matches!(self, ProviderError::Config(_))
    }
}

/// Source of per-point rank data.
pub trait RankProvider: Send + Sync {
    /// Look up the rank of `business_identity` for `keyword` searched from `point`.
    fn lookup_rank(
        &self,
        point: GeoPoint,
        keyword: &str,
        business_identity: &str,
    ) -> impl Future<Output = Result<ProviderRank, ProviderError>> + Send;

    /// Verify the provider can serve requests at all (credentials present, etc.).
    ///
    /// Called once before a run dispatches any lookup.
    fn check_ready(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

impl<P: RankProvider> RankProvider for Arc<P> {
    fn lookup_rank(
        &self,
        point: GeoPoint,
        keyword: &str,
        business_identity: &str,
    ) -> impl Future<Output = Result<ProviderRank, ProviderError>> + Send {
        (**self).lookup_rank(point, keyword, business_identity)
    }

    fn check_ready(&self) -> Result<(), ProviderError> {
        (**self).check_ready()
    }
}
