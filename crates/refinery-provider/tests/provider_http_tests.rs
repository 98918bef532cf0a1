use refinery_provider::{create_provider, ProviderConfig, ProviderError, ProviderKind};
use serde::Deserialize;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gemini_config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(ProviderKind::Gemini)
        .with_api_key("test-gemini-key")
        .with_base_url(server.uri())
}

fn openai_config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(ProviderKind::OpenAi)
        .with_api_key("test-openai-key")
        .with_base_url(server.uri())
}

fn gemini_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [
            {"content": {"parts": [{"text": text}], "role": "model"}}
        ]
    })
}

fn openai_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": text}}
        ]
    })
}

#[derive(Debug, Deserialize)]
struct Goals {
    goals: Vec<String>,
}

#[tokio::test]
async fn test_gemini_generate_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-gemini-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("  hello  ")))
        .mount(&server)
        .await;

    let provider = create_provider(gemini_config(&server)).unwrap();
    let text = provider.generate_response("Say hello").await.unwrap();

    assert_eq!(text, "hello");
    assert_eq!(provider.kind(), ProviderKind::Gemini);
}

#[tokio::test]
async fn test_openai_structured_response_with_surrounding_prose() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-openai-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply(
            "Sure! {\"goals\": [\"Ship login\", \"Add tests\"]} Let me know.",
        )))
        .mount(&server)
        .await;

    let provider = create_provider(openai_config(&server)).unwrap();
    let value = provider
        .generate_structured_response("Analyze", None)
        .await
        .unwrap();
    let parsed: Goals = serde_json::from_value(value).unwrap();

    assert_eq!(parsed.goals, vec!["Ship login", "Add tests"]);
}

#[tokio::test]
async fn test_rate_limit_maps_to_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota per minute"))
        .mount(&server)
        .await;

    let provider = create_provider(gemini_config(&server)).unwrap();
    let err = provider.generate_response("hi").await.unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited));
    assert_eq!(err.code(), "RATE_LIMIT");
}

#[tokio::test]
async fn test_openai_insufficient_quota() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"code": "insufficient_quota", "message": "You exceeded your current quota"}
        })))
        .mount(&server)
        .await;

    let provider = create_provider(openai_config(&server)).unwrap();
    let err = provider.generate_response("hi").await.unwrap_err();

    assert!(matches!(err, ProviderError::QuotaExceeded(_)));
}

#[tokio::test]
async fn test_unauthorized_and_forbidden() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = create_provider(openai_config(&server)).unwrap();
    let err = provider.generate_response("hi").await.unwrap_err();
    assert!(matches!(err, ProviderError::Unauthorized));

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let provider = create_provider(gemini_config(&server)).unwrap();
    let err = provider.generate_response("hi").await.unwrap_err();
    assert!(matches!(err, ProviderError::Forbidden));
}

#[tokio::test]
async fn test_empty_completion_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply("   ")))
        .mount(&server)
        .await;

    let provider = create_provider(openai_config(&server)).unwrap();
    let err = provider.generate_response("hi").await.unwrap_err();

    assert!(matches!(err, ProviderError::EmptyResponse(ProviderKind::OpenAi)));
}

#[tokio::test]
async fn test_structured_response_rejects_non_json() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("no json here")))
        .mount(&server)
        .await;

    let provider = create_provider(gemini_config(&server)).unwrap();
    let err = provider
        .generate_structured_response("Analyze", Some("{}"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Parse(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let config = ProviderConfig::new(ProviderKind::OpenAi)
        .with_api_key("k")
        .with_base_url("http://127.0.0.1:1");

    let provider = create_provider(config).unwrap();
    let err = provider.generate_response("hi").await.unwrap_err();

    assert!(matches!(err, ProviderError::Network(_)));
}
