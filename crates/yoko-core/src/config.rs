//! Runtime configuration loaded from an optional TOML file and `YOKO_*` environment variables.
//!
//! Precedence: built-in defaults < file at `YOKO_CONFIG` (default `config/yoko.toml`)
//! < environment. Nested keys use a double underscore, e.g.
//! `YOKO_TURN__AI_TIMEOUT_SECS=20` or `YOKO_SYNTHESIS__SPEAKER_ID=3`.
//!
//! Secrets are never read from the file: `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) and
//! `STT_API_KEY` come from the environment only.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/yoko.toml";
const DEFAULT_STORAGE_PATH: &str = "./data/yoko_log";
const DEFAULT_LOCALE: &str = "ja-JP";

const DEFAULT_PERSONA: &str = "あなたはようこです。一人称は「私」、二人称は「おかあちゃん」です。\
おかあちゃんは認知症なので、認知症患者に適した振る舞いをしてください。優しくフランクに話してください。\
孫の名前ははるちゃんとけいちゃんです。週に1回体操に行っています。";

/// Top-level configuration shared by the daemon and the voice crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory of the sled database holding the message log.
    pub storage_path: String,
    /// Spoken language for recognition (BCP-47).
    pub locale: String,
    pub recognizer: RecognizerSettings,
    pub synthesis: SynthesisSettings,
    pub generator: GeneratorSettings,
    pub turn: TurnSettings,
    pub viewer: ViewerSettings,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage_path: DEFAULT_STORAGE_PATH.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            recognizer: RecognizerSettings::default(),
            synthesis: SynthesisSettings::default(),
            generator: GeneratorSettings::default(),
            turn: TurnSettings::default(),
            viewer: ViewerSettings::default(),
        }
    }
}

impl CoreConfig {
    /// Load from `YOKO_CONFIG` (or `config/yoko.toml`) plus environment.
    pub fn load() -> CoreResult<Self> {
        let config_path =
            std::env::var("YOKO_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load from an explicit file (skipped when missing) plus environment.
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .set_default("storage_path", DEFAULT_STORAGE_PATH)?
            .set_default("locale", DEFAULT_LOCALE)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("YOKO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }
}

/// Which recognition engine the daemon drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// One line of text per utterance from stdin (headless sessions).
    Line,
    /// Microphone + VAD + speech-to-text (requires the `native-audio` build).
    Mic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerSettings {
    pub engine: EngineKind,
    /// OpenAI-compatible transcription endpoint base (used by the mic engine).
    pub stt_base_url: String,
    pub stt_model: String,
    /// Silence after speech that ends an utterance.
    pub gap_ms: u64,
    /// Listening window with no speech before the engine reports `no-speech`.
    pub no_speech_timeout_secs: u64,
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::Line,
            stt_base_url: "https://api.openai.com/v1".to_string(),
            stt_model: "whisper-1".to_string(),
            gap_ms: 800,
            no_speech_timeout_secs: 8,
        }
    }
}

impl RecognizerSettings {
    pub fn stt_api_key_from_env() -> Option<String> {
        env_opt_string("STT_API_KEY")
    }
}

/// VOICEVOX-compatible synthesis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub base_url: String,
    pub speaker_id: u32,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:50021".to_string(),
            speaker_id: 2,
            request_timeout_secs: 60,
        }
    }
}

/// Generative-language backend (Gemini `generateContent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub base_url: String,
    pub model: String,
    /// System instruction sent with every request.
    pub persona: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash".to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            temperature: 1.0,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 300,
        }
    }
}

impl GeneratorSettings {
    /// API key from `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`.
    pub fn api_key_from_env() -> Option<String> {
        env_opt_string("GEMINI_API_KEY").or_else(|| env_opt_string("GOOGLE_API_KEY"))
    }
}

/// When the AI reply is written to the log relative to speech synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPublish {
    /// Publish as soon as the reply arrives; it stays visible even if synthesis fails.
    #[default]
    BeforeSynthesis,
    /// Publish only once audio is ready, so unspoken replies never appear.
    AfterSynthesis,
}

/// Bounds on each suspension point of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnSettings {
    pub ai_timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
    pub playback_timeout_secs: u64,
    pub reply_publish: ReplyPublish,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            ai_timeout_secs: 30,
            synthesis_timeout_secs: 30,
            playback_timeout_secs: 120,
            reply_publish: ReplyPublish::default(),
        }
    }
}

impl TurnSettings {
    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs.max(1))
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs.max(1))
    }

    pub fn playback_timeout(&self) -> Duration {
        Duration::from_secs(self.playback_timeout_secs.max(1))
    }
}

/// HTTP feed for remote viewers of the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8070,
        }
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
