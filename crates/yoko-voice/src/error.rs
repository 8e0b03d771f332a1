//! Error types for the Yoko voice system

use crate::turn::TurnState;
use std::time::Duration;
use thiserror::Error;
use yoko_core::{CoreError, GenerationError};

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur in the voice turn-taking system
#[derive(Error, Debug)]
pub enum VoiceError {
    /// The only error that ends a session.
    #[error("Speech recognizer unavailable: {0}")]
    RecognizerUnavailable(String),

    #[error("AI reply failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Publish error: {0}")]
    Publish(#[from] CoreError),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("Invalid turn transition: {event} while {from}")]
    InvalidTransition { from: TurnState, event: &'static str },

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("VAD error: {0}")]
    Vad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        VoiceError::Playback(format!("WAV decode failed: {}", err))
    }
}

#[cfg(feature = "native-audio")]
impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(feature = "native-audio")]
impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(feature = "native-audio")]
impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}
