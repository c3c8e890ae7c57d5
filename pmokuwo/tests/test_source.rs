mod common;

use common::FakeTransport;
use pmokuwo::{ContentSource, HttpTransport, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const URL: &str = "http://search.kuwo.cn/r.s?all=x";

#[tokio::test]
async fn test_fetch_succeeds_on_third_attempt() {
    let transport = Arc::new(FakeTransport::new().with_body(URL, "ok").failing_first(2));
    let source = ContentSource::new(transport.clone(), RetryPolicy::default());

    let body = source.fetch(URL).await;
    assert_eq!(body.as_deref(), Some(&b"ok"[..]));
    assert_eq!(transport.gets(), 3);
}

#[tokio::test]
async fn test_fetch_gives_up_after_three_failures() {
    let transport = Arc::new(FakeTransport::new().with_body(URL, "ok").failing_first(3));
    let source = ContentSource::new(transport.clone(), RetryPolicy::default());

    assert!(source.fetch(URL).await.is_none());
    assert_eq!(transport.gets(), 3);
}

#[tokio::test]
async fn test_http_status_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r.s"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let source = ContentSource::http().unwrap();
    assert!(source.fetch(&format!("{}/r.s?all=x", server.uri())).await.is_none());
}

#[tokio::test]
async fn test_http_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/a.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_attempts: 3,
        timeout: Duration::from_secs(5),
    };
    let source = ContentSource::new(Arc::new(HttpTransport::new().unwrap()), policy);
    let body = source.fetch(&format!("{}/img/a.jpg", server.uri())).await;
    assert_eq!(body.as_deref(), Some(&b"jpeg"[..]));
}

#[tokio::test]
async fn test_http_stream_reports_length() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/song.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(&server)
        .await;

    let source = ContentSource::http().unwrap();
    let stream = source
        .open_stream(&format!("{}/song.mp3", server.uri()))
        .await
        .unwrap();
    assert_eq!(stream.content_length, Some(4096));
}

#[tokio::test]
async fn test_http_stream_status_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = ContentSource::http().unwrap();
    let err = source
        .open_stream(&format!("{}/missing.mp3", server.uri()))
        .await
        .unwrap_err();
    assert!(err.is_network());
}
