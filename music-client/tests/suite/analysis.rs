use std::time::Duration;

use echona_music_client::{AnalysisClient, AnalysisError, AnalysisRequest, ErrorKind};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::{config_for, init_logging};

fn client_for(server: &MockServer) -> AnalysisClient {
    AnalysisClient::new(&config_for(server)).expect("client builds")
}

#[tokio::test]
async fn text_analysis_returns_the_verdict() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_json(json!({"type": "text", "text": "what a lovely day"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"emotion": "happy", "confidence": 0.92})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let verdict = client_for(&server)
        .analyze(&AnalysisRequest::text("what a lovely day"))
        .await
        .unwrap();

    assert_eq!(verdict["emotion"], "happy");
}

#[tokio::test]
async fn transient_failure_is_retried() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"emotion": "calm"})))
        .expect(1)
        .mount(&server)
        .await;

    let verdict = client_for(&server)
        .analyze(&AnalysisRequest::face("data:image/png;base64,AAAA"))
        .await
        .unwrap();

    assert_eq!(verdict["emotion"], "calm");
}

#[tokio::test]
async fn invalid_request_never_reaches_the_service() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .analyze(&AnalysisRequest::text(""))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AnalysisError::InvalidRequest("Text payload is required for text analysis")
    );
}

#[tokio::test]
async fn rejected_payload_is_not_retried() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"error": "no face"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .analyze(&AnalysisRequest::face("data:image/png;base64,AAAA"))
        .await
        .unwrap_err();

    match &err {
        AnalysisError::Upstream(upstream) => {
            assert_eq!(upstream.kind(), ErrorKind::UpstreamClientError);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.response_status(), 502);
}

#[tokio::test]
async fn health_probe_passes_through_upstream_json() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let health = client_for(&server).health().await.unwrap();

    assert_eq!(health, json!({"status": "ok"}));
}

#[tokio::test]
async fn slow_health_probe_times_out_without_retry() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "ok"}))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).health().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    init_logging();
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    let closed_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    config.analysis.service_url = format!("http://127.0.0.1:{closed_port}");

    let client = AnalysisClient::new(&config).expect("client builds");
    let err = client.health().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkError);
}
