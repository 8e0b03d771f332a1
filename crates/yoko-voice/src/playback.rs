//! Playback of synthesized speech.
//!
//! An [`AudioSink`] plays one clip and hands back a receiver that fires exactly once
//! when the clip ends. [`Player`] sits on top and refuses to start a second clip
//! while one is live.

use crate::error::{VoiceError, VoiceResult};
use crate::synthesizer::SynthesizedAudio;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Completion signal of one playback.
pub type PlaybackDone = oneshot::Receiver<VoiceResult<()>>;

pub trait AudioSink: Send + Sync {
    /// Begin playing `audio`. The returned receiver resolves when playback ends.
    fn start(&self, audio: SynthesizedAudio) -> VoiceResult<PlaybackDone>;

    /// Cut the current clip short. No-op when idle.
    fn stop(&self);
}

/// Length of a WAV clip, from its header.
pub fn wav_duration(bytes: &[u8]) -> VoiceResult<Duration> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return Err(VoiceError::Playback("WAV header has a zero sample rate".to_string()));
    }
    let frames = u64::from(reader.duration());
    Ok(Duration::from_nanos(frames * 1_000_000_000 / u64::from(rate)))
}

/// Sink without an output device: validates the WAV and waits out its duration.
#[derive(Default)]
pub struct SilentSink {
    current: Mutex<Option<JoinHandle<()>>>,
}

impl SilentSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for SilentSink {
    fn start(&self, audio: SynthesizedAudio) -> VoiceResult<PlaybackDone> {
        let duration = wav_duration(audio.bytes())?;
        let (done_tx, done_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = done_tx.send(Ok(()));
        });
        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(handle) {
                previous.abort();
            }
        }
        debug!("Silent playback of {:?}", duration);
        Ok(done_rx)
    }

    fn stop(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(handle) = current.take() {
                handle.abort();
            }
        }
    }
}

/// Enforces a single live playback over any sink.
#[derive(Clone)]
pub struct Player {
    sink: Arc<dyn AudioSink>,
    active: Arc<AtomicBool>,
}

impl Player {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Plays `audio` to completion. Dropping the future stops the sink.
    pub async fn play(&self, audio: SynthesizedAudio) -> VoiceResult<()> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoiceError::Playback(
                "another playback is already active".to_string(),
            ));
        }
        let mut guard = PlaybackGuard {
            player: self,
            finished: false,
        };

        info!("🔊 Playing reply ({} bytes)", audio.len());
        let done = self.sink.start(audio)?;
        let result = done.await.unwrap_or_else(|_| {
            Err(VoiceError::Playback(
                "playback ended without signalling completion".to_string(),
            ))
        });
        guard.finished = true;
        result
    }

    pub fn stop(&self) {
        if self.is_playing() {
            self.sink.stop();
        }
    }
}

struct PlaybackGuard<'a> {
    player: &'a Player,
    finished: bool,
}

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.player.sink.stop();
        }
        self.player.active.store(false, Ordering::SeqCst);
    }
}

#[cfg(feature = "native-audio")]
pub use native::RodioSink;

#[cfg(feature = "native-audio")]
mod native {
    use super::*;
    use rodio::{OutputStream, Sink, Source};

    /// Speaker output through rodio. Each clip plays on its own thread because the
    /// output stream handle cannot cross threads.
    #[derive(Default)]
    pub struct RodioSink {
        current: Arc<Mutex<Option<Arc<Sink>>>>,
    }

    impl RodioSink {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl AudioSink for RodioSink {
        fn start(&self, audio: SynthesizedAudio) -> VoiceResult<PlaybackDone> {
            let (done_tx, done_rx) = oneshot::channel();
            let current = Arc::clone(&self.current);

            std::thread::spawn(move || {
                let outcome = (|| -> VoiceResult<()> {
                    let (_stream, handle) = OutputStream::try_default()
                        .map_err(|e| VoiceError::Playback(e.to_string()))?;
                    let sink = Arc::new(
                        Sink::try_new(&handle).map_err(|e| VoiceError::Playback(e.to_string()))?,
                    );
                    let source = rodio::Decoder::new(Cursor::new(audio.into_bytes()))
                        .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
                    sink.append(source.convert_samples::<f32>());
                    if let Ok(mut slot) = current.lock() {
                        *slot = Some(Arc::clone(&sink));
                    }
                    sink.sleep_until_end();
                    if let Ok(mut slot) = current.lock() {
                        slot.take();
                    }
                    Ok(())
                })();
                let _ = done_tx.send(outcome);
            });

            Ok(done_rx)
        }

        fn stop(&self) {
            if let Ok(mut slot) = self.current.lock() {
                if let Some(sink) = slot.take() {
                    sink.stop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::encode_wav;

    fn clip(ms: u32) -> SynthesizedAudio {
        let samples = vec![0.0f32; (16 * ms) as usize];
        SynthesizedAudio::new(encode_wav(&samples, 16000).unwrap())
    }

    #[test]
    fn duration_comes_from_header() {
        let d = wav_duration(clip(250).bytes()).unwrap();
        assert_eq!(d, Duration::from_millis(250));
    }

    #[test]
    fn garbage_is_not_playable() {
        assert!(matches!(
            wav_duration(b"not a wav"),
            Err(VoiceError::Playback(_))
        ));
    }

    #[tokio::test]
    async fn silent_playback_completes_once() {
        let player = Player::new(Arc::new(SilentSink::new()));
        player.play(clip(20)).await.unwrap();
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn second_playback_is_refused_while_first_is_live() {
        let player = Player::new(Arc::new(SilentSink::new()));
        let first = {
            let player = player.clone();
            tokio::spawn(async move { player.play(clip(300)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(player.is_playing());

        let second = player.play(clip(20)).await;
        assert!(matches!(second, Err(VoiceError::Playback(_))));

        first.await.unwrap().unwrap();
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn dropped_playback_releases_the_player() {
        let player = Player::new(Arc::new(SilentSink::new()));
        let outcome = tokio::time::timeout(Duration::from_millis(30), player.play(clip(500))).await;
        assert!(outcome.is_err());
        assert!(!player.is_playing());
        player.play(clip(10)).await.unwrap();
    }
}
