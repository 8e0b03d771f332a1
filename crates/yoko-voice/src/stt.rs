//! **Speech-to-Text (STT)**: converts a committed [`Utterance`] into a transcript.
//!
//! [`HttpStt`] targets any OpenAI-compatible `/audio/transcriptions` endpoint with a
//! fixed recognition language taken from the configured locale.

use crate::error::{VoiceError, VoiceResult};
use crate::utterance::Utterance;
use async_trait::async_trait;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;
use yoko_core::RecognizerSettings;

/// Backend for converting an utterance to text. Returns an empty string when nothing was understood.
#[async_trait]
pub trait SttBackend: Send + Sync {
    async fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String>;
}

/// Encode f32 PCM (mono) to 16-bit WAV bytes for upload.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> VoiceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceError::Stt(format!("WAV encode failed: {}", e)))?;
        for &s in samples {
            let sample = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
            writer
                .write_sample(sample)
                .map_err(|e| VoiceError::Stt(format!("WAV encode failed: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| VoiceError::Stt(format!("WAV encode failed: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

/// OpenAI-compatible transcription client (Whisper and friends).
#[derive(Debug, Clone)]
pub struct HttpStt {
    base_url: String,
    api_key: String,
    model: String,
    /// ISO-639-1 language sent with every request, e.g. `ja`.
    language: String,
    client: reqwest::Client,
}

impl HttpStt {
    /// Build from settings; the key comes from `STT_API_KEY`.
    pub fn from_settings(settings: &RecognizerSettings, locale: &str) -> VoiceResult<Self> {
        let api_key = RecognizerSettings::stt_api_key_from_env()
            .ok_or_else(|| VoiceError::Config("STT requires STT_API_KEY".to_string()))?;
        Self::new(&settings.stt_base_url, api_key, &settings.stt_model, locale)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        locale: &str,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            language: language_of(locale),
            client,
        })
    }
}

/// `ja-JP` → `ja`
fn language_of(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or(locale)
        .to_ascii_lowercase()
}

#[async_trait]
impl SttBackend for HttpStt {
    async fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String> {
        if utterance.samples.is_empty() {
            return Ok(String::new());
        }
        let wav = encode_wav(&utterance.samples, utterance.sample_rate)?;
        let url = format!("{}/audio/transcriptions", self.base_url);
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res
            .json()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        debug!(chars = text.chars().count(), "Utterance transcribed");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_maps_to_language() {
        assert_eq!(language_of("ja-JP"), "ja");
        assert_eq!(language_of("en_US"), "en");
        assert_eq!(language_of("ja"), "ja");
    }

    #[test]
    fn wav_round_trips_through_hound() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.5];
        let wav = encode_wav(&samples, 16000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![0, 16384, -16384, 32767]);
    }
}
