//! Microphone speech engine: cpal capture → WebRTC VAD → gap detection → STT.
//!
//! Each listening window runs on its own thread (the cpal stream is not `Send`)
//! and ends in one of three ways: an utterance is transcribed (`Result`/`NoMatch`
//! then `End`), nothing is said before the no-speech timeout (`Error("no-speech")`
//! then `End`), or the window is aborted (no further reports).

use crate::error::{VoiceError, VoiceResult};
use crate::recognizer::{RecognizerEvent, RecognizerSink, SpeechEngine};
use crate::stt::SttBackend;
use crate::utterance::{Utterance, UtteranceConfig, UtteranceDetector};
use crate::vad::{VadConfig, VadDetector};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use yoko_core::RecognizerSettings;

#[derive(Debug, Clone)]
pub struct MicSettings {
    pub sample_rate: u32,
    pub vad_mode: u8,
    pub gap: Duration,
    pub no_speech_timeout: Duration,
}

impl MicSettings {
    pub fn from_settings(settings: &RecognizerSettings) -> Self {
        Self {
            sample_rate: 16000,
            vad_mode: 2,
            gap: Duration::from_millis(settings.gap_ms),
            no_speech_timeout: Duration::from_secs(settings.no_speech_timeout_secs.max(1)),
        }
    }
}

pub struct MicEngine {
    settings: MicSettings,
    stt: Arc<dyn SttBackend>,
    runtime: tokio::runtime::Handle,
    stop: Option<Arc<AtomicBool>>,
}

impl MicEngine {
    /// Must be called from within a tokio runtime; transcription runs on it.
    pub fn new(settings: MicSettings, stt: Arc<dyn SttBackend>) -> Self {
        Self {
            settings,
            stt,
            runtime: tokio::runtime::Handle::current(),
            stop: None,
        }
    }
}

impl SpeechEngine for MicEngine {
    fn begin(&mut self, sink: RecognizerSink) -> VoiceResult<()> {
        self.abort();
        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Some(Arc::clone(&stop));

        let window = Window {
            settings: self.settings.clone(),
            stt: Arc::clone(&self.stt),
            runtime: self.runtime.clone(),
            sink,
            stop,
        };
        thread::Builder::new()
            .name("yoko-mic".to_string())
            .spawn(move || window.run())?;
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

struct Window {
    settings: MicSettings,
    stt: Arc<dyn SttBackend>,
    runtime: tokio::runtime::Handle,
    sink: RecognizerSink,
    stop: Arc<AtomicBool>,
}

impl Window {
    fn run(self) {
        let mut vad = match VadDetector::new(VadConfig {
            sample_rate: self.settings.sample_rate,
            mode: self.settings.vad_mode,
        }) {
            Ok(vad) => vad,
            Err(e) => {
                self.sink.emit(RecognizerEvent::Unavailable(e.to_string()));
                return;
            }
        };

        let (chunk_tx, chunk_rx) = std_mpsc::channel();
        let stream = match open_input(self.settings.sample_rate, vad.chunk_size(), chunk_tx) {
            Ok(stream) => stream,
            Err(e) => {
                self.sink.emit(RecognizerEvent::Unavailable(e.to_string()));
                return;
            }
        };
        self.sink.emit(RecognizerEvent::Started);

        let mut detector = UtteranceDetector::new(UtteranceConfig {
            gap: self.settings.gap,
            sample_rate: self.settings.sample_rate,
            ..Default::default()
        });
        let deadline = Instant::now() + self.settings.no_speech_timeout;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                debug!("Mic window aborted");
                return;
            }
            match chunk_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(chunk) => {
                    let is_speech = match vad.is_speech(&chunk) {
                        Ok(is_speech) => is_speech,
                        Err(e) => {
                            debug!("Skipping frame: {}", e);
                            continue;
                        }
                    };
                    if let Some(utterance) = detector.push(is_speech, &chunk) {
                        drop(stream);
                        self.transcribe(utterance);
                        return;
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    self.sink
                        .emit(RecognizerEvent::Error("audio-capture".to_string()));
                    self.sink.emit(RecognizerEvent::End);
                    return;
                }
            }
            if !detector.heard_speech() && Instant::now() >= deadline {
                self.sink.emit(RecognizerEvent::Error("no-speech".to_string()));
                self.sink.emit(RecognizerEvent::End);
                return;
            }
        }
    }

    fn transcribe(self, utterance: Utterance) {
        let Window {
            stt,
            runtime,
            sink,
            stop,
            ..
        } = self;
        runtime.spawn(async move {
            let outcome = stt.transcribe(&utterance).await;
            if stop.load(Ordering::SeqCst) {
                return;
            }
            match outcome {
                Ok(text) if text.trim().is_empty() => {
                    sink.emit(RecognizerEvent::NoMatch);
                }
                Ok(text) => {
                    sink.emit(RecognizerEvent::Result(text));
                }
                Err(e) => {
                    warn!("Transcription failed: {}", e);
                    sink.emit(RecognizerEvent::Error(format!("network: {}", e)));
                }
            }
            sink.emit(RecognizerEvent::End);
        });
    }
}

/// Opens the default input device and streams fixed-size mono chunks.
fn open_input(
    sample_rate: u32,
    chunk_size: usize,
    chunk_tx: std_mpsc::Sender<Vec<f32>>,
) -> VoiceResult<Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;
    info!(
        "🎤 Using input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    debug!("Default input config: {:?}", device.default_input_config()?);

    let config = StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut buffer = Vec::with_capacity(chunk_size);
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                buffer.push(sample);
                if buffer.len() >= chunk_size {
                    let chunk = std::mem::replace(&mut buffer, Vec::with_capacity(chunk_size));
                    if chunk_tx.send(chunk).is_err() {
                        return;
                    }
                }
            }
        },
        move |err| {
            warn!("Audio stream error: {}", err);
        },
        None,
    )?;
    stream.play()?;
    Ok(stream)
}
