//! AI reply generation: history + new user text in, reply text out.
//!
//! [`GeminiGenerator`] talks to the Gemini `generateContent` REST endpoint. The
//! persona goes in `systemInstruction`; history and the new user turn go in
//! `contents`. Sampling values default to the ones the companion was tuned with.

use crate::config::GeneratorSettings;
use crate::error::GenerationError;
use crate::history::{HistoryTurn, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Black-box reply function used by the turn controller.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        history: &[HistoryTurn],
        new_user_text: &str,
    ) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

/// Gemini REST client.
pub struct GeminiGenerator {
    base_url: String,
    api_key: String,
    settings: GeneratorSettings,
    client: reqwest::Client,
}

impl GeminiGenerator {
    /// Build from settings, taking the API key from `GEMINI_API_KEY` / `GOOGLE_API_KEY`.
    pub fn from_settings(settings: &GeneratorSettings) -> Result<Self, GenerationError> {
        let api_key = GeneratorSettings::api_key_from_env().ok_or_else(|| {
            GenerationError::Config(
                "reply generation requires GEMINI_API_KEY or GOOGLE_API_KEY".to_string(),
            )
        })?;
        Self::new(api_key, settings.clone())
    }

    /// Create with an explicit key (tests, non-env wiring).
    pub fn new(
        api_key: impl Into<String>,
        settings: GeneratorSettings,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
            settings,
            client,
        })
    }

    fn request_body(&self, history: &[HistoryTurn], new_user_text: &str) -> GenerateRequest {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content::text(Some(turn.role.as_str()), &turn.text))
            .collect();
        contents.push(Content::text(Some(Role::User.as_str()), new_user_text));

        GenerateRequest {
            system_instruction: Content::text(None, &self.settings.persona),
            contents,
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
                top_p: self.settings.top_p,
                top_k: self.settings.top_k,
                max_output_tokens: self.settings.max_output_tokens,
                response_mime_type: "text/plain",
            },
        }
    }
}

#[async_trait]
impl ResponseGenerator for GeminiGenerator {
    async fn generate(
        &self,
        history: &[HistoryTurn],
        new_user_text: &str,
    ) -> Result<String, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.settings.model
        );
        let body = self.request_body(history, new_user_text);

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, body });
        }

        let parsed: GenerateResponse = res
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| GenerationError::Malformed("no candidates in response".to_string()))?;

        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        debug!(chars = text.chars().count(), "Reply generated");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ConversationHistory;

    #[test]
    fn request_body_carries_persona_history_and_sampling() {
        let generator = GeminiGenerator::new("k", GeneratorSettings::default()).unwrap();
        let history = ConversationHistory::bootstrap();
        let body = serde_json::to_value(generator.request_body(history.turns(), "こんにちは")).unwrap();

        assert!(body["systemInstruction"]["role"].is_null());
        assert!(body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("ようこ"));
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "こんにちは");
        assert_eq!(body["generationConfig"]["topK"], 64);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 300);
        assert_eq!(body["generationConfig"]["responseMimeType"], "text/plain");
    }
}
