//! Yoko companion daemon.
//!
//! Wires the voice session together: speech in (stdin lines, or the microphone in a
//! `native-audio` build), Gemini replies, VOICEVOX speech out, the shared message
//! log, a console transcript and an optional HTTP viewer feed.

mod console;
mod viewer;

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yoko_core::{CoreConfig, EngineKind, GeminiGenerator, MessageLog, ResponseGenerator};
use yoko_voice::{
    AudioSink, LineEngine, SpeechEngine, SpeechSynthesizer, TurnController, VoiceError,
    VoicevoxClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[yoko] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CoreConfig::load().context("load configuration")?;
    let log = MessageLog::open_path(&config.storage_path).context("open message log")?;

    let generator: Arc<dyn ResponseGenerator> =
        Arc::new(GeminiGenerator::from_settings(&config.generator)?);
    let synthesizer: Arc<dyn SpeechSynthesizer> =
        Arc::new(VoicevoxClient::from_settings(&config.synthesis)?);
    let (engine, sink) = audio_io(&config)?;

    let _console = console::spawn(&log);

    let controller = TurnController::new(
        engine,
        log.clone(),
        generator,
        synthesizer,
        sink,
        config.turn.clone(),
    );
    let handle = controller.handle();

    if config.viewer.enabled {
        let app = viewer::router(log.clone(), controller.state_watch());
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.viewer.port))
            .await
            .with_context(|| format!("bind viewer port {}", config.viewer.port))?;
        tracing::info!(port = config.viewer.port, "Viewer feed at /api/messages");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "viewer server stopped");
            }
        });
    }

    tracing::info!(
        storage_path = %config.storage_path,
        engine = ?config.recognizer.engine,
        speaker = config.synthesis.speaker_id,
        "Yoko started"
    );

    let mut session = tokio::spawn(controller.run());
    let outcome = tokio::select! {
        joined = &mut session => joined,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; shutting down");
            handle.shutdown();
            session.await
        }
    };

    match outcome.context("voice session panicked")? {
        Ok(()) => Ok(()),
        Err(VoiceError::RecognizerUnavailable(reason)) => {
            tracing::info!(%reason, "Speech input gone; exiting");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn audio_io(config: &CoreConfig) -> anyhow::Result<(Box<dyn SpeechEngine>, Arc<dyn AudioSink>)> {
    match config.recognizer.engine {
        EngineKind::Line => {
            tracing::info!("Reading utterances from stdin, one per line");
            Ok((Box::new(LineEngine::stdin()), speaker()))
        }
        EngineKind::Mic => mic_io(config),
    }
}

#[cfg(feature = "native-audio")]
fn speaker() -> Arc<dyn AudioSink> {
    Arc::new(yoko_voice::RodioSink::new())
}

#[cfg(not(feature = "native-audio"))]
fn speaker() -> Arc<dyn AudioSink> {
    Arc::new(yoko_voice::SilentSink::new())
}

#[cfg(feature = "native-audio")]
fn mic_io(config: &CoreConfig) -> anyhow::Result<(Box<dyn SpeechEngine>, Arc<dyn AudioSink>)> {
    use yoko_voice::{HttpStt, MicEngine, MicSettings};

    let stt = Arc::new(HttpStt::from_settings(&config.recognizer, &config.locale)?);
    let engine = MicEngine::new(MicSettings::from_settings(&config.recognizer), stt);
    Ok((Box::new(engine), speaker()))
}

#[cfg(not(feature = "native-audio"))]
fn mic_io(_config: &CoreConfig) -> anyhow::Result<(Box<dyn SpeechEngine>, Arc<dyn AudioSink>)> {
    anyhow::bail!("recognizer engine \"mic\" needs a build with --features native-audio")
}
