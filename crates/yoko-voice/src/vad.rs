//! Voice Activity Detection using WebRTC VAD

use crate::error::{VoiceError, VoiceResult};
use tracing::info;
use webrtc_vad::{SampleRate, Vad, VadMode};

#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Sample rate (8000, 16000, 32000 or 48000 Hz)
    pub sample_rate: u32,

    /// Detection mode (0-3, where 3 is most aggressive)
    pub mode: u8,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            mode: 2,
        }
    }
}

/// Speech/silence decision per 30ms frame.
pub struct VadDetector {
    vad: Vad,
    chunk_size: usize,
}

impl VadDetector {
    pub fn new(config: VadConfig) -> VoiceResult<Self> {
        let sample_rate = match config.sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => {
                return Err(VoiceError::Config(format!(
                    "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
                    other
                )))
            }
        };
        let mode = match config.mode {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            3 => VadMode::VeryAggressive,
            other => {
                return Err(VoiceError::Config(format!(
                    "VAD mode must be 0-3, got {}",
                    other
                )))
            }
        };

        let mut vad = Vad::new();
        vad.set_mode(mode);
        vad.set_sample_rate(sample_rate);

        // 30ms frames
        let chunk_size = (config.sample_rate as usize * 30) / 1000;
        info!(
            "🎙️ VAD ready ({}Hz, mode {}, {} samples per frame)",
            config.sample_rate, config.mode, chunk_size
        );
        Ok(Self { vad, chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_speech(&mut self, frame: &[f32]) -> VoiceResult<bool> {
        if frame.len() != self.chunk_size {
            return Err(VoiceError::Vad(format!(
                "Expected {} samples, got {}",
                self.chunk_size,
                frame.len()
            )));
        }
        let pcm: Vec<i16> = frame
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();
        self.vad
            .is_voice_segment(&pcm)
            .map_err(|e| VoiceError::Vad(format!("VAD processing failed: {:?}", e)))
    }
}
