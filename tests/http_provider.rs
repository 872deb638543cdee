//! Integration tests for `HttpRankProvider`.
//!
//! Uses `wiremock` to stand up a local rank service for each test so no real
//! network traffic is made. Covers the happy path, the soft failure statuses,
//! credential rejection, 429 retries, and a full sampling run over HTTP.

#![cfg(feature = "http")]

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use geogrid_rank::{
    CancelToken, GeoPoint, GridRankError, GridSpec, HttpProviderConfig, HttpRankProvider, Keyword,
    ProviderError, Rank, RankProvider, RankSampler, SampleOutcome, SamplerConfig,
};

/// Base64 of `user:secret`
const AUTH: &str = "Basic dXNlcjpzZWNyZXQ=";

fn test_provider(server: &MockServer, max_retries: u32) -> HttpRankProvider {
    HttpRankProvider::new(HttpProviderConfig {
        base_url: server.uri(),
        login: "user".to_string(),
        password: "secret".to_string(),
        request_timeout_secs: 5,
        max_retries,
        retry_backoff_ms: 10,
        ..HttpProviderConfig::default()
    })
    .expect("failed to build test HttpRankProvider")
}

fn austin() -> GeoPoint {
    GeoPoint::new(30.2672, -97.7431)
}

#[tokio::test]
async fn lookup_returns_rank_volume_and_competitors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rank"))
        .and(header("Authorization", AUTH))
        .and(body_partial_json(json!({"keyword": "plumber", "business": "Acme Plumbing"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rank": 4,
            "search_volume": 1900,
            "competitors": ["Joe's Pipes", "Drain Kings"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = test_provider(&server, 0);
    let answer = provider.lookup_rank(austin(), "plumber", "Acme Plumbing").await.unwrap();

    assert_eq!(answer.rank, Some(4));
    assert_eq!(answer.search_volume, 1900);
    assert_eq!(answer.competitors, vec!["Joe's Pipes", "Drain Kings"]);
}

#[tokio::test]
async fn lookup_treats_missing_fields_as_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rank": null})))
        .mount(&server)
        .await;

    let answer = test_provider(&server, 0)
        .lookup_rank(austin(), "plumber", "Acme Plumbing")
        .await
        .unwrap();

    assert_eq!(answer.rank, None);
    assert_eq!(answer.search_volume, 0);
    assert!(answer.competitors.is_empty());
}

#[tokio::test]
async fn lookup_maps_rejected_credentials_to_config_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rank"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = test_provider(&server, 3)
        .lookup_rank(austin(), "plumber", "Acme Plumbing")
        .await
        .unwrap_err();

    assert!(err.is_config(), "expected config error, got {err:?}");
}

#[tokio::test]
async fn lookup_reports_server_error_as_request_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rank"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_provider(&server, 3)
        .lookup_rank(austin(), "plumber", "Acme Plumbing")
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Request(ref msg) if msg.contains("500")));
}

#[tokio::test]
async fn lookup_reports_malformed_body_as_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rank"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = test_provider(&server, 0)
        .lookup_rank(austin(), "plumber", "Acme Plumbing")
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn lookup_retries_after_429_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rank"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rank": 7})))
        .mount(&server)
        .await;

    let answer = test_provider(&server, 2)
        .lookup_rank(austin(), "plumber", "Acme Plumbing")
        .await
        .unwrap();

    assert_eq!(answer.rank, Some(7));
}

#[tokio::test]
async fn lookup_gives_up_after_max_429_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rank"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let err = test_provider(&server, 2)
        .lookup_rank(austin(), "plumber", "Acme Plumbing")
        .await
        .unwrap_err();

    assert_eq!(err, ProviderError::RateLimited { retries: 2 });
}

#[tokio::test]
async fn sampling_run_without_credentials_dispatches_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rank": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let provider = HttpRankProvider::new(HttpProviderConfig {
        base_url: server.uri(),
        ..HttpProviderConfig::default()
    })
    .unwrap();
    let sampler = RankSampler::new(provider, SamplerConfig::default());
    let spec = GridSpec::new(austin(), 3, 2.0);

    let err = sampler
        .run(&spec, &[Keyword::new("plumber")], &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, GridRankError::ProviderConfig(_)));
}

#[tokio::test]
async fn sampling_run_over_http_degrades_failures_to_unranked() {
    let server = MockServer::start().await;

    // Every lookup for "plumber" ranks 3; "drain cleaning" always errors
    Mock::given(method("POST"))
        .and(path("/rank"))
        .and(body_partial_json(json!({"keyword": "plumber"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rank": 3, "search_volume": 500})))
        .expect(9)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rank"))
        .and(body_partial_json(json!({"keyword": "drain cleaning"})))
        .respond_with(ResponseTemplate::new(503))
        .expect(9)
        .mount(&server)
        .await;

    let config = SamplerConfig {
        business_identity: "Acme Plumbing".to_string(),
        max_concurrency: 4,
        ..SamplerConfig::default()
    };
    let sampler = RankSampler::new(test_provider(&server, 0), config);
    let spec = GridSpec::new(austin(), 3, 2.0);
    let keywords = [Keyword::new("plumber"), Keyword::new("drain cleaning")];

    let run = sampler.run(&spec, &keywords, &CancelToken::new()).await.unwrap();

    assert_eq!(run.observations.len(), 18);
    assert_eq!(run.failed_count(), 9);
    for o in run.observations_for("plumber") {
        assert_eq!(o.rank, Rank::new(3));
        assert_eq!(o.outcome, SampleOutcome::Ranked);
    }
    for o in run.observations_for("drain cleaning") {
        assert_eq!(o.rank, Rank::UNRANKED);
        assert!(matches!(o.outcome, SampleOutcome::ProviderFailed(_)));
    }
}
