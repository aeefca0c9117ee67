//! HTTP-level tests for the API client against a mock backend.

use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use visiontags::{
    AbortController, AnalyzeOptions, ApiClient, ApiResolver, Error, HealthOptions, Operation,
    ResolveOptions,
};
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(candidates: Vec<String>, skip_health_probe: bool) -> ApiClient {
    let resolver = Arc::new(ApiResolver::new(candidates, skip_health_probe));
    ApiClient::new(resolver).unwrap()
}

fn client_at(server: &MockServer) -> ApiClient {
    let client = client_for(vec![server.uri()], false);
    client.resolver().set_api_url(server.uri());
    client
}

async fn health_server(status: u16, expected_calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({"ok": true})))
        .expect(expected_calls)
        .mount(&server)
        .await;
    server
}

fn image_fixture() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    file.write_all(b"fake-jpeg-bytes").unwrap();
    file
}

fn analysis_json() -> serde_json::Value {
    serde_json::json!({
        "topk": [{"label": "tabby", "p": 0.72}, {"label": "tiger cat", "p": 0.2}],
        "heatmap_png_b64": "data:image/png;base64,aGk=",
        "embedding": {"x": 0.1, "y": 0.2},
        "neighbors": [{"x": 0.11, "y": 0.19, "label": "tabby", "thumb": "data:image/jpeg;base64,AA=="}],
        "id": "pred-42",
        "model": "resnet18@torchvision"
    })
}

#[tokio::test]
async fn test_resolve_picks_first_healthy_and_memoizes() {
    let a = health_server(500, 1).await;
    let b = health_server(503, 1).await;
    let c = health_server(200, 1).await;

    let client = client_for(vec![a.uri(), b.uri(), c.uri()], false);

    let first = client.resolve_api_base(ResolveOptions::default()).await.unwrap();
    assert_eq!(first, c.uri());

    let second = client.resolve_api_base(ResolveOptions::default()).await.unwrap();
    assert_eq!(second, c.uri());
    assert_eq!(client.api_url(), c.uri());
}

#[tokio::test]
async fn test_resolve_does_not_probe_past_first_success() {
    let a = health_server(200, 1).await;
    let b = health_server(200, 0).await;

    let client = client_for(vec![a.uri(), b.uri()], false);
    assert_eq!(
        client.resolve_api_base(ResolveOptions::default()).await.unwrap(),
        a.uri()
    );
}

#[tokio::test]
async fn test_resolve_skip_probe_makes_no_requests() {
    let a = health_server(200, 0).await;
    let b = health_server(200, 0).await;

    let client = client_for(vec![a.uri(), b.uri()], true);
    assert_eq!(
        client.resolve_api_base(ResolveOptions::default()).await.unwrap(),
        a.uri()
    );

    client.ping_health(HealthOptions::default()).await.unwrap();
}

#[tokio::test]
async fn test_resolve_all_failing_installs_first() {
    let a = health_server(500, 1).await;
    let b = health_server(500, 1).await;

    let client = client_for(vec![a.uri(), b.uri()], false);
    let err = client
        .resolve_api_base(ResolveOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoReachableBase { .. }));
    assert_eq!(client.resolver().selected(), Some(a.uri()));
}

#[tokio::test]
async fn test_resolve_probe_timeout_moves_to_next_candidate() {
    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&slow)
        .await;
    let fast = health_server(200, 1).await;

    let client = client_for(vec![slow.uri(), fast.uri()], false);
    let base = client
        .resolve_api_base(ResolveOptions {
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(base, fast.uri());
    assert_eq!(client.pending_timers(), 0);
}

#[tokio::test]
async fn test_health_reports_http_failure() {
    let server = health_server(503, 1).await;
    let client = client_at(&server);

    let err = client.ping_health(HealthOptions::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));
}

#[tokio::test]
async fn test_analyze_uploads_multipart_with_model_and_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(header("X-User", "alice"))
        .and(header("Accept", "application/json"))
        .and(body_string_contains("name=\"image\"; filename="))
        .and(body_string_contains("fake-jpeg-bytes"))
        .and(body_string_contains("name=\"model\""))
        .and(body_string_contains("resnet18"))
        .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json()))
        .expect(1)
        .mount(&server)
        .await;

    let image = image_fixture();
    let client = client_at(&server).with_user("alice");

    let result = client
        .analyze_image(
            &image.path().to_string_lossy(),
            AnalyzeOptions {
                model: Some("resnet18".to_string()),
                timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.id, "pred-42");
    assert_eq!(result.top().unwrap().label, "tabby");
    assert_eq!(result.heatmap_png().unwrap(), b"hi".to_vec());
    assert_eq!(client.pending_timers(), 0);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("x-model").is_none());
}

#[tokio::test]
async fn test_analyze_with_fetched_images_sends_model_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(header("X-Model", "vit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json()))
        .expect(1)
        .mount(&server)
        .await;

    let image = image_fixture();
    let client = client_at(&server).with_fetched_images();

    client
        .analyze_image(
            &format!("file://{}", image.path().display()),
            AnalyzeOptions {
                model: Some("vit".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_analyze_surfaces_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(400).set_body_string("image file missing"))
        .mount(&server)
        .await;

    let image = image_fixture();
    let client = client_at(&server);

    let err = client
        .analyze_image(&image.path().to_string_lossy(), AnalyzeOptions::default())
        .await
        .unwrap_err();

    match err {
        Error::Http {
            operation,
            status,
            body,
        } => {
            assert_eq!(operation, Operation::Analyze);
            assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
            assert_eq!(body, "image file missing");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_analyze_times_out_quickly_and_clears_timer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(analysis_json())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let image = image_fixture();
    let client = client_at(&server);

    let started = Instant::now();
    let err = client
        .analyze_image(
            &image.path().to_string_lossy(),
            AnalyzeOptions {
                timeout: Some(Duration::from_millis(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(client.pending_timers(), 0);
}

#[tokio::test]
async fn test_analyze_with_aborted_signal_fails_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json()))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_at(&server);
    let ctrl = AbortController::new();
    ctrl.abort();

    let err = client
        .analyze_image(
            "/not/even/read.jpg",
            AnalyzeOptions {
                signal: Some(ctrl.signal()),
                timeout: Some(Duration::from_secs(60)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_canceled());
    assert_eq!(err.to_string(), "Analyze request was canceled");
    assert_eq!(client.pending_timers(), 0);
}

#[tokio::test]
async fn test_analyze_caller_abort_is_reported_as_canceled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(analysis_json())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let image = image_fixture();
    let client = client_at(&server);
    let ctrl = AbortController::new();

    let trigger = ctrl.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.abort();
    });

    let err = client
        .analyze_image(
            &image.path().to_string_lossy(),
            AnalyzeOptions {
                signal: Some(ctrl.signal()),
                timeout: Some(Duration::from_secs(60)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_canceled(), "unexpected error: {err}");
    assert_eq!(client.pending_timers(), 0);
}

#[tokio::test]
async fn test_feedback_posts_camel_case_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/feedback"))
        .and(body_json(serde_json::json!({
            "predictionId": "pred-42",
            "trueLabel": "tabby"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_at(&server);
    let ack = client.send_feedback("pred-42", "tabby", None).await.unwrap();
    assert!(ack.ok);
}

#[tokio::test]
async fn test_feedback_timeout_is_distinct_from_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/feedback"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let client = client_at(&server).with_feedback_timeout(Duration::from_millis(20));
    let err = client.send_feedback("pred-42", "tabby", None).await.unwrap_err();

    assert!(matches!(
        err,
        Error::TimedOut {
            operation: Operation::Feedback,
            ..
        }
    ));
    assert!(err.status().is_none());
}

#[tokio::test]
async fn test_metrics_summary_returned_unchanged() {
    let body = serde_json::json!({
        "counts": {"cat": 3, "dog": 1},
        "classes": ["cat", "dog"],
        "confusion": [[3, 0], [1, 0]]
    });

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;

    let client = client_at(&server);
    let summary = client.metrics_summary().await.unwrap();

    assert_eq!(serde_json::to_value(&summary).unwrap(), body);
    assert_eq!(summary.confusion.len(), summary.classes.len());
    assert!(summary
        .confusion
        .iter()
        .all(|row| row.len() == summary.classes.len()));
}

#[tokio::test]
async fn test_embedding_points_limit_and_missing_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/embeddings/points"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_at(&server);
    let points = client.embedding_points(Some(5)).await.unwrap();
    assert!(points.is_empty());
}

#[tokio::test]
async fn test_embedding_points_without_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/embeddings/points"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "points": [
                {"id": "p1", "x": 0.5, "y": 1.5, "label": "cat"},
                {"id": "p2", "x": -0.5, "y": 0.0, "label": "dog", "thumb": "data:image/jpeg;base64,AA=="}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_at(&server);
    let points = client.embedding_points(None).await.unwrap();

    assert_eq!(points.len(), 2);
    assert_eq!(points[0].thumb, None);
    assert!(points[1].thumb.is_some());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), None);
}

#[tokio::test]
async fn test_metrics_summary_returns_once_signal_fires() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics/summary"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let client = client_at(&server);
    let ctrl = AbortController::new();

    let trigger = ctrl.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.abort();
    });

    let started = Instant::now();
    let err = client
        .metrics_summary_with(Some(ctrl.signal()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Canceled {
            operation: Operation::Metrics
        }
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_embedding_points_returns_once_signal_fires() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/embeddings/points"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let client = client_at(&server);
    let ctrl = AbortController::new();

    let trigger = ctrl.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.abort();
    });

    let started = Instant::now();
    let err = client
        .embedding_points_with(Some(3), Some(ctrl.signal()))
        .await
        .unwrap_err();

    assert!(err.is_canceled(), "unexpected error: {err}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_analyze_timeout_covers_slow_image_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images/cat.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"fake-jpeg-bytes".to_vec())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json()))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_at(&server).with_fetched_images();

    let started = Instant::now();
    let err = client
        .analyze_image(
            &format!("{}/images/cat.jpg", server.uri()),
            AnalyzeOptions {
                timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(client.pending_timers(), 0);
}

#[tokio::test]
async fn test_feedback_zero_timeout_aborts_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/feedback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_at(&server);
    let err = client
        .send_feedback("pred-42", "tabby", Some(Duration::ZERO))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::TimedOut {
            operation: Operation::Feedback,
            ..
        }
    ));
    assert_eq!(client.pending_timers(), 0);
}

#[tokio::test]
async fn test_health_truncated_error_body_is_network_failure() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 100\r\n\r\npartial")
            .await
            .unwrap();
    });

    let client = client_for(vec![base.clone()], false);
    client.resolver().set_api_url(base);

    let err = client
        .ping_health(HealthOptions {
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            Error::Network {
                operation: Operation::Health,
                ..
            }
        ),
        "unexpected error: {err}"
    );
}
