//! HTTP contracts of the synthesis and speech-to-text backends.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yoko_voice::{
    encode_wav, HttpStt, SpeechSynthesizer, SttBackend, Utterance, VoiceError, VoicevoxClient,
};

fn voicevox(server: &MockServer) -> VoicevoxClient {
    VoicevoxClient::new(server.uri(), 2, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn voicevox_two_phase_synthesis() {
    let server = MockServer::start().await;
    let query = json!({"accent_phrases": [], "speedScale": 1.0, "outputSamplingRate": 24000});
    let wav = encode_wav(&[0.0; 240], 24000).unwrap();

    Mock::given(method("POST"))
        .and(path("/audio_query"))
        .and(query_param("text", "おはよう"))
        .and(query_param("speaker", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .and(query_param("speaker", "2"))
        .and(body_json(query))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let audio = voicevox(&server).synthesize("おはよう").await.unwrap();
    assert_eq!(audio.bytes(), wav.as_slice());
}

#[tokio::test]
async fn voicevox_query_failure_is_a_synthesis_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio_query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("engine down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = voicevox(&server).synthesize("おはよう").await.unwrap_err();
    match err {
        VoiceError::Synthesis(msg) => assert!(msg.contains("engine down")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn voicevox_empty_waveform_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio_query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = voicevox(&server).synthesize("おはよう").await.unwrap_err();
    assert!(matches!(err, VoiceError::Synthesis(_)));
}

#[tokio::test]
async fn voicevox_invalid_query_json_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio_query"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = voicevox(&server).build_query("おはよう", 2).await.unwrap_err();
    assert!(matches!(err, VoiceError::Synthesis(_)));
}

fn utterance() -> Utterance {
    Utterance {
        samples: vec![0.1; 3200],
        sample_rate: 16000,
        speech_duration: Duration::from_millis(200),
    }
}

#[tokio::test]
async fn stt_posts_wav_and_trims_transcript() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header("authorization", "Bearer stt-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "  こんにちは \n"})))
        .expect(1)
        .mount(&server)
        .await;

    let stt = HttpStt::new(server.uri(), "stt-key", "whisper-1", "ja-JP").unwrap();
    let text = stt.transcribe(&utterance()).await.unwrap();
    assert_eq!(text, "こんにちは");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"model\""));
    assert!(body.contains("whisper-1"));
    assert!(body.contains("name=\"language\""));
    assert!(body.contains("RIFF"));
}

#[tokio::test]
async fn stt_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let stt = HttpStt::new(server.uri(), "wrong", "whisper-1", "ja-JP").unwrap();
    let err = stt.transcribe(&utterance()).await.unwrap_err();
    assert!(matches!(err, VoiceError::Stt(_)));
}

#[tokio::test]
async fn stt_skips_empty_audio() {
    let stt = HttpStt::new("http://127.0.0.1:9", "k", "whisper-1", "ja-JP").unwrap();
    let empty = Utterance {
        samples: Vec::new(),
        sample_rate: 16000,
        speech_duration: Duration::ZERO,
    };
    assert_eq!(stt.transcribe(&empty).await.unwrap(), "");
}
