//! # Yoko Voice - turn-taking for a spoken companion
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Turn Controller                           │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │  Recognizer  │ → │ Turn Machine │ → │ Message Log / AI     │  │
//! │  │ (line / mic) │   │ + suppression│   │ (yoko-core)          │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────────┘  │
//! │         ↑                  ↓                                     │
//! │         │ re-arm    ┌──────────────┐   ┌──────────────┐          │
//! │         └───────────│   Playback   │ ← │  VOICEVOX    │          │
//! │                     │ (silent/rodio)│  │  synthesis   │          │
//! │                     └──────────────┘   └──────────────┘          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The microphone engine and speaker sink need the `native-audio` feature.

pub mod controller;
pub mod error;
pub mod playback;
pub mod recognizer;
pub mod stt;
pub mod synthesizer;
pub mod turn;
pub mod utterance;

#[cfg(feature = "native-audio")]
pub mod mic;
#[cfg(feature = "native-audio")]
pub mod vad;

pub use controller::{ControllerEvent, ControllerHandle, TurnController};
pub use error::{VoiceError, VoiceResult};
#[cfg(feature = "native-audio")]
pub use mic::{MicEngine, MicSettings};
#[cfg(feature = "native-audio")]
pub use playback::RodioSink;
pub use playback::{wav_duration, AudioSink, PlaybackDone, Player, SilentSink};
pub use recognizer::{
    LineEngine, RecognizerAdapter, RecognizerEvent, RecognizerNotice, RecognizerSink,
    SpeechEngine, WindowId,
};
pub use stt::{encode_wav, HttpStt, SttBackend};
pub use synthesizer::{SpeechSynthesizer, SynthesizedAudio, VoicevoxClient};
pub use turn::{TurnId, TurnMachine, TurnSnapshot, TurnState};
pub use utterance::{DetectorPhase, Utterance, UtteranceConfig, UtteranceDetector};
#[cfg(feature = "native-audio")]
pub use vad::{VadConfig, VadDetector};
