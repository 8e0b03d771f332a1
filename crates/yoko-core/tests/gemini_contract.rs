use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yoko_core::{
    ConversationHistory, GeminiGenerator, GenerationError, GeneratorSettings, ResponseGenerator,
};

fn settings_for(server: &MockServer) -> GeneratorSettings {
    GeneratorSettings {
        base_url: server.uri(),
        ..GeneratorSettings::default()
    }
}

#[tokio::test]
async fn reply_text_is_joined_from_first_candidate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "元気だよ、"}, {"text": "おかあちゃん。"}]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = GeminiGenerator::new("test-key", settings_for(&server)).unwrap();
    let history = ConversationHistory::bootstrap();
    let reply = generator
        .generate(history.turns(), "元気？")
        .await
        .unwrap();
    assert_eq!(reply, "元気だよ、おかあちゃん。");
}

#[tokio::test]
async fn request_sends_history_then_new_user_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "うん"}]}}]
        })))
        .mount(&server)
        .await;

    let generator = GeminiGenerator::new("k", settings_for(&server)).unwrap();
    let history = ConversationHistory::bootstrap();
    generator.generate(history.turns(), "散歩しよう").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["parts"][0]["text"], "おはよう");
    assert_eq!(contents[2]["role"], "user");
    assert_eq!(contents[2]["parts"][0]["text"], "散歩しよう");
    assert_eq!(body["generationConfig"]["temperature"], 1.0);
}

#[tokio::test]
async fn non_success_status_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
        .mount(&server)
        .await;

    let generator = GeminiGenerator::new("k", settings_for(&server)).unwrap();
    let err = generator
        .generate(ConversationHistory::bootstrap().turns(), "こんにちは")
        .await
        .unwrap_err();
    match err {
        GenerationError::Api { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "quota");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn blank_reply_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "  \n"}]}}]
        })))
        .mount(&server)
        .await;

    let generator = GeminiGenerator::new("k", settings_for(&server)).unwrap();
    let err = generator
        .generate(ConversationHistory::bootstrap().turns(), "こんにちは")
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::EmptyReply));
}

#[tokio::test]
async fn missing_candidates_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let generator = GeminiGenerator::new("k", settings_for(&server)).unwrap();
    let err = generator
        .generate(ConversationHistory::bootstrap().turns(), "こんにちは")
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Malformed(_)));
}
