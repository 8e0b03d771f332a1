//! Gap logic: turns a stream of VAD decisions into whole utterances.
//!
//! Time is measured from the audio itself (chunk length / sample rate), so the
//! detector is deterministic and independent of wall-clock scheduling.

use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct UtteranceConfig {
    /// Silence after speech that commits the utterance (default: 800ms)
    pub gap: Duration,

    /// Shorter speech is dropped as noise (default: 200ms)
    pub min_speech: Duration,

    /// Speech longer than this is committed without waiting for a gap (default: 30s)
    pub max_utterance: Duration,

    /// Sample rate of incoming chunks (default: 16000 Hz)
    pub sample_rate: u32,
}

impl Default for UtteranceConfig {
    fn default() -> Self {
        Self {
            gap: Duration::from_millis(800),
            min_speech: Duration::from_millis(200),
            max_utterance: Duration::from_secs(30),
            sample_rate: 16000,
        }
    }
}

/// One committed utterance, ready for speech-to-text.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// PCM samples (f32, -1.0..1.0), mono.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Speech time, excluding the trailing gap.
    pub speech_duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    Silence,
    Speech,
    TrailingSilence,
}

pub struct UtteranceDetector {
    config: UtteranceConfig,
    phase: DetectorPhase,
    buffer: Vec<f32>,
    /// Time since speech started, including pauses.
    span: Duration,
    /// Current run of silence after speech.
    silence: Duration,
}

impl UtteranceDetector {
    pub fn new(config: UtteranceConfig) -> Self {
        Self {
            config,
            phase: DetectorPhase::Silence,
            buffer: Vec::new(),
            span: Duration::ZERO,
            silence: Duration::ZERO,
        }
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    /// True once any speech has been heard since the last commit or reset.
    pub fn heard_speech(&self) -> bool {
        self.phase != DetectorPhase::Silence
    }

    /// Feeds one VAD decision with the chunk it was made on.
    pub fn push(&mut self, is_speech: bool, chunk: &[f32]) -> Option<Utterance> {
        let step = self.chunk_duration(chunk);

        match (self.phase, is_speech) {
            (DetectorPhase::Silence, true) => {
                debug!("Speech started");
                self.phase = DetectorPhase::Speech;
                self.buffer.clear();
                self.buffer.extend_from_slice(chunk);
                self.span = step;
                self.silence = Duration::ZERO;
            }
            (DetectorPhase::Silence, false) => {}
            (DetectorPhase::Speech, true) => {
                self.buffer.extend_from_slice(chunk);
                self.span += step;
                if self.span >= self.config.max_utterance {
                    warn!("Max utterance length reached, committing");
                    return self.commit();
                }
            }
            (DetectorPhase::Speech, false) => {
                self.phase = DetectorPhase::TrailingSilence;
                self.span += step;
                self.silence = step;
                if self.silence >= self.config.gap {
                    return self.commit();
                }
            }
            (DetectorPhase::TrailingSilence, true) => {
                debug!("Speech resumed");
                self.phase = DetectorPhase::Speech;
                self.buffer.extend_from_slice(chunk);
                self.span += step;
                self.silence = Duration::ZERO;
            }
            (DetectorPhase::TrailingSilence, false) => {
                self.span += step;
                self.silence += step;
                if self.silence >= self.config.gap {
                    return self.commit();
                }
            }
        }
        None
    }

    pub fn reset(&mut self) {
        self.phase = DetectorPhase::Silence;
        self.buffer.clear();
        self.span = Duration::ZERO;
        self.silence = Duration::ZERO;
    }

    fn commit(&mut self) -> Option<Utterance> {
        let speech_duration = self.span.saturating_sub(self.silence);
        if speech_duration < self.config.min_speech {
            debug!("Speech too short ({:?}), ignoring", speech_duration);
            self.reset();
            return None;
        }

        info!(
            "Utterance committed: {:?} speech, {} samples",
            speech_duration,
            self.buffer.len()
        );
        let utterance = Utterance {
            samples: std::mem::take(&mut self.buffer),
            sample_rate: self.config.sample_rate,
            speech_duration,
        };
        self.reset();
        Some(utterance)
    }

    fn chunk_duration(&self, chunk: &[f32]) -> Duration {
        let rate = u64::from(self.config.sample_rate.max(1));
        Duration::from_nanos(chunk.len() as u64 * 1_000_000_000 / rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 30ms at 16kHz
    const CHUNK: usize = 480;

    fn feed(detector: &mut UtteranceDetector, is_speech: bool, chunks: usize) -> Option<Utterance> {
        let chunk = vec![if is_speech { 0.4 } else { 0.0 }; CHUNK];
        let mut out = None;
        for _ in 0..chunks {
            if let Some(u) = detector.push(is_speech, &chunk) {
                out = Some(u);
            }
        }
        out
    }

    #[test]
    fn gap_commits_speech() {
        let mut detector = UtteranceDetector::new(UtteranceConfig::default());
        assert!(feed(&mut detector, true, 20).is_none());
        assert_eq!(detector.phase(), DetectorPhase::Speech);

        // 26 * 30ms = 780ms, not yet a gap
        assert!(feed(&mut detector, false, 26).is_none());
        assert_eq!(detector.phase(), DetectorPhase::TrailingSilence);

        let utterance = feed(&mut detector, false, 1).expect("gap reached");
        assert_eq!(utterance.samples.len(), 20 * CHUNK);
        assert_eq!(utterance.sample_rate, 16000);
        assert!(utterance.speech_duration >= Duration::from_millis(590));
        assert!(utterance.speech_duration <= Duration::from_millis(610));
        assert_eq!(detector.phase(), DetectorPhase::Silence);
    }

    #[test]
    fn pause_shorter_than_gap_keeps_one_utterance() {
        let mut detector = UtteranceDetector::new(UtteranceConfig::default());
        feed(&mut detector, true, 10);
        feed(&mut detector, false, 10);
        feed(&mut detector, true, 10);
        let utterance = feed(&mut detector, false, 27).expect("committed");
        assert_eq!(utterance.samples.len(), 20 * CHUNK);
    }

    #[test]
    fn blip_is_dropped() {
        let mut detector = UtteranceDetector::new(UtteranceConfig::default());
        feed(&mut detector, true, 2);
        assert!(feed(&mut detector, false, 30).is_none());
        assert!(!detector.heard_speech());
    }

    #[test]
    fn long_speech_is_capped() {
        let config = UtteranceConfig {
            max_utterance: Duration::from_millis(300),
            ..Default::default()
        };
        let mut detector = UtteranceDetector::new(config);
        let utterance = feed(&mut detector, true, 10).expect("capped");
        assert_eq!(utterance.samples.len(), 10 * CHUNK);
    }
}
