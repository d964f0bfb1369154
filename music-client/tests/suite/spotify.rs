use std::time::{Duration, Instant};

use echona_music_client::spotify::{HealthStatus, TimeRange};
use echona_music_client::{ErrorKind, SearchRequest, SpotifyClient};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{
    basic_auth, bearer_token, body_json, body_string_contains, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::{
    CLIENT_ID, CLIENT_SECRET, config_for, init_logging, search_body, token_body,
};

async fn mount_client_credentials(server: &MockServer, access_token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(basic_auth(CLIENT_ID, CLIENT_SECRET))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token, 3600)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn client_for(server: &MockServer) -> SpotifyClient {
    SpotifyClient::new(&config_for(server)).expect("client builds")
}

#[tokio::test]
async fn client_credentials_lease_is_fetched_once() {
    init_logging();
    let server = MockServer::start().await;
    mount_client_credentials(&server, "app-1", 1).await;
    let client = client_for(&server);

    let first = client.ensure_lease().await.unwrap();
    let second = client.ensure_lease().await.unwrap();

    assert_eq!(first.access_token(), "app-1");
    assert_eq!(second.access_token(), "app-1");
}

#[tokio::test]
async fn anonymous_search_reuses_the_warm_lease() {
    init_logging();
    let server = MockServer::start().await;
    mount_client_credentials(&server, "app-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(bearer_token("app-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body("t-app")))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);
    client.ensure_lease().await.unwrap();

    let results = client.search(&SearchRequest::anonymous("calm")).await.unwrap();

    assert_eq!(results.tracks.items[0].id, "t-app");
}

#[tokio::test]
async fn search_falls_back_when_user_token_is_rejected() {
    init_logging();
    let server = MockServer::start().await;
    mount_client_credentials(&server, "app-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(bearer_token("user-token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(bearer_token("app-1"))
        .and(query_param("q", "calm piano"))
        .and(query_param("type", "track"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body("t-app")))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let results = client
        .search(&SearchRequest::as_user("calm piano", "user-token"))
        .await
        .unwrap();

    assert_eq!(results.tracks.items[0].id, "t-app");
}

#[tokio::test]
async fn valid_user_token_skips_the_grant() {
    init_logging();
    let server = MockServer::start().await;
    mount_client_credentials(&server, "app-1", 0).await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(bearer_token("user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body("t-user")))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let results = client
        .search(&SearchRequest::as_user("calm", "user-token"))
        .await
        .unwrap();

    assert_eq!(results.tracks.items[0].id, "t-user");
}

#[tokio::test]
async fn rate_limited_search_waits_for_retry_after() {
    init_logging();
    let server = MockServer::start().await;
    mount_client_credentials(&server, "app-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body("t-app")))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let started = Instant::now();
    let results = client.search(&SearchRequest::anonymous("calm")).await.unwrap();

    assert_eq!(results.tracks.items[0].id, "t-app");
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn server_errors_exhaust_the_app_search_budget() {
    init_logging();
    let server = MockServer::start().await;
    mount_client_credentials(&server, "app-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(503).set_body_string("internal upstream detail"))
        .expect(3)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client
        .search(&SearchRequest::anonymous("calm"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamServerError);
    assert_eq!(err.http_status(), Some(503));
    assert!(!err.to_string().contains("internal upstream detail"));
}

#[tokio::test]
async fn slow_upstream_is_cut_off_by_the_attempt_deadline() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "u1"}))
                .set_delay(Duration::from_secs(5)),
        )
        .expect(2)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let started = Instant::now();
    let err = client.current_user("user-token").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.http_status(), None);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn malformed_success_body_is_retried_as_server_error() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(2)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client.current_user("user-token").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamServerError);
    assert_eq!(err.http_status(), None);
}

#[tokio::test]
async fn top_tracks_forwards_the_time_range() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me/top/tracks"))
        .and(bearer_token("user-token"))
        .and(query_param("time_range", "short_term"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(search_body("t-top")["tracks"].clone()),
        )
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let top = client
        .top_tracks("user-token", TimeRange::ShortTerm)
        .await
        .unwrap();

    assert_eq!(top.items[0].id, "t-top");
}

#[tokio::test]
async fn playback_accepts_no_content() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/me/player/play"))
        .and(query_param("device_id", "speaker-1"))
        .and(body_json(json!({"uris": ["spotify:track:t1"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    client
        .start_playback(
            "user-token",
            &["spotify:track:t1".to_string()],
            Some("speaker-1"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn playback_without_active_device_is_not_found() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/me/player/play"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client
        .start_playback("user-token", &[], None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.kind().response_status(), 404);
}

#[tokio::test]
async fn authorization_code_is_exchanged_for_user_tokens() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(basic_auth(CLIENT_ID, CLIENT_SECRET))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-access",
            "refresh_token": "user-refresh",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let tokens = client.exchange_code("abc123").await.unwrap();

    assert_eq!(tokens.access_token, "user-access");
    assert_eq!(tokens.refresh_token.as_deref(), Some("user-refresh"));
}

#[tokio::test]
async fn revoked_refresh_token_is_not_retried() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client.refresh_access_token("revoked").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamClientError);
}

#[tokio::test]
async fn health_reports_ready_after_acquiring_a_lease() {
    init_logging();
    let server = MockServer::start().await;
    mount_client_credentials(&server, "app-1", 1).await;
    let client = client_for(&server);

    let health = client.service_health().await;

    assert_eq!(health.status, HealthStatus::Ok);
    assert!(health.configured);
    assert_eq!(health.timeout_ms, Some(500));
}

#[tokio::test]
async fn health_is_degraded_when_credentials_are_rejected() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let health = client.service_health().await;

    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(health.configured);
    assert_eq!(health.error, Some(ErrorKind::Unauthorized));
    assert_eq!(health.message, ErrorKind::Unauthorized.caller_message());
}
