//! Text → speech through a VOICEVOX-compatible engine.
//!
//! Synthesis is two remote calls: `POST /audio_query` turns text into an opaque
//! query document, then `POST /synthesis` turns that document into WAV bytes.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use yoko_core::SynthesisSettings;

/// Playable audio produced by synthesis (WAV bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    wav: Vec<u8>,
}

impl SynthesizedAudio {
    pub fn new(wav: Vec<u8>) -> Self {
        Self { wav }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.wav
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.wav
    }

    pub fn len(&self) -> usize {
        self.wav.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wav.is_empty()
    }
}

/// Backend that turns reply text into playable audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> VoiceResult<SynthesizedAudio>;
}

/// VOICEVOX engine client.
#[derive(Debug, Clone)]
pub struct VoicevoxClient {
    base_url: String,
    speaker_id: u32,
    client: reqwest::Client,
}

impl VoicevoxClient {
    pub fn from_settings(settings: &SynthesisSettings) -> VoiceResult<Self> {
        Self::new(
            &settings.base_url,
            settings.speaker_id,
            Duration::from_secs(settings.request_timeout_secs.max(1)),
        )
    }

    pub fn new(
        base_url: impl Into<String>,
        speaker_id: u32,
        request_timeout: Duration,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            speaker_id,
            client,
        })
    }

    pub fn speaker_id(&self) -> u32 {
        self.speaker_id
    }

    /// Phase 1: text → query document.
    pub async fn build_query(&self, text: &str, speaker_id: u32) -> VoiceResult<serde_json::Value> {
        let url = format!("{}/audio_query", self.base_url);
        let res = self
            .client
            .post(&url)
            .query(&[("text", text.to_string()), ("speaker", speaker_id.to_string())])
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("audio_query request failed: {}", e)))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "audio_query error {}: {}",
                status, body
            )));
        }
        res.json()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("audio_query returned invalid JSON: {}", e)))
    }

    /// Phase 2: query document → WAV bytes.
    pub async fn synthesize_waveform(
        &self,
        query: &serde_json::Value,
        speaker_id: u32,
    ) -> VoiceResult<Vec<u8>> {
        let url = format!("{}/synthesis", self.base_url);
        let res = self
            .client
            .post(&url)
            .query(&[("speaker", speaker_id.to_string())])
            .json(query)
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("synthesis request failed: {}", e)))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "synthesis error {}: {}",
                status, body
            )));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        if bytes.is_empty() {
            return Err(VoiceError::Synthesis(
                "synthesis returned an empty waveform".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for VoicevoxClient {
    async fn synthesize(&self, text: &str) -> VoiceResult<SynthesizedAudio> {
        let query = self.build_query(text, self.speaker_id).await?;
        let wav = self.synthesize_waveform(&query, self.speaker_id).await?;
        debug!(bytes = wav.len(), speaker = self.speaker_id, "Speech synthesized");
        Ok(SynthesizedAudio::new(wav))
    }
}
