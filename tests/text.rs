//! Streaming text generation against a mock Perchance server.

use futures::StreamExt;
use perchance::{ErrorKind, TextGenerator, TextProvider, TextRequest};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

fn generator(server: &MockServer) -> TextGenerator {
    TextGenerator::builder()
        .base_url(format!("{}/api", server.uri()))
        .user_key(KEY)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_streams_fragments_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(query_param("userKey", KEY))
        .and(body_partial_json(json!({
            "generatorName": "ai-text-generator",
            "instruction": "Tell a story",
            "startWith": "Once",
            "stopSequences": []
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("data:{\"text\":\"Hello\"}\n\ndata:{\"text\":\" world\"}\n\n"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = TextRequest::new("Tell a story").with_start("Once");
    let mut stream = generator(&server).generate(&request).await.unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), "Hello");
    assert_eq!(stream.next().await.unwrap().unwrap(), " world");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_collect_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "data:{\"text\":\"a\"}\n\ndata:{\"text\":\"b\"}\n\ndata:{\"text\":\"c\"}",
        ))
        .mount(&server)
        .await;

    let text = generator(&server)
        .generate(&TextRequest::new("x"))
        .await
        .unwrap()
        .collect_text()
        .await
        .unwrap();
    assert_eq!(text, "abc");
}

#[tokio::test]
async fn test_invalid_key_fails_before_streaming() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "status": "invalid_key" })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = generator(&server);
    let err = generator
        .generate(&TextRequest::new("x"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(generator.credentials().current().await.is_none());
}

#[tokio::test]
async fn test_invalid_data_is_bad_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "status": "invalid_data" })))
        .mount(&server)
        .await;

    let err = generator(&server)
        .generate(&TextRequest::new("x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_unknown_failure_is_connection_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = generator(&server)
        .generate(&TextRequest::new("x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}
