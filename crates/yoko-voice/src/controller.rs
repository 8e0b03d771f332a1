//! Conversational turn controller.
//!
//! One task owns the [`TurnMachine`] and handles one [`ControllerEvent`] at a time.
//! Everything that waits (publishing, the AI call, synthesis, playback) runs in a
//! spawned stage task that posts its typed outcome back, tagged with the
//! [`TurnId`] it belongs to. Outcomes for a turn that is no longer current are
//! dropped, so an abandoned turn can never resurface.
//!
//! Each stage is bounded by a timeout from [`TurnSettings`]; expiry is handled like
//! any other failure: log, abandon the turn, listen again.

use crate::error::{VoiceError, VoiceResult};
use crate::playback::{AudioSink, Player};
use crate::recognizer::{RecognizerAdapter, RecognizerEvent, RecognizerNotice, SpeechEngine};
use crate::synthesizer::{SpeechSynthesizer, SynthesizedAudio};
use crate::turn::{TurnId, TurnMachine, TurnSnapshot, TurnState};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use yoko_core::{
    ConversationHistory, Message, MessageLog, ReplyPublish, ResponseGenerator, TurnSettings,
};

const TARGET: &str = "yoko::voice";

/// Every input the controller reacts to.
#[derive(Debug)]
pub enum ControllerEvent {
    Recognizer(RecognizerNotice),
    Reply {
        turn: TurnId,
        outcome: VoiceResult<String>,
    },
    Synthesized {
        turn: TurnId,
        outcome: VoiceResult<SynthesizedAudio>,
    },
    PlaybackFinished {
        turn: TurnId,
        outcome: VoiceResult<()>,
    },
    Shutdown,
}

enum Flow {
    Continue,
    Stop,
}

/// Cloneable handle for stopping a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl ControllerHandle {
    /// Asks the controller to stop. Returns `false` if it already has.
    pub fn shutdown(&self) -> bool {
        self.tx.send(ControllerEvent::Shutdown).is_ok()
    }
}

pub struct TurnController {
    machine: TurnMachine,
    recognizer: RecognizerAdapter,
    log: MessageLog,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Player,
    history: Arc<ConversationHistory>,
    settings: TurnSettings,
    /// AI message held back until audio is ready (`ReplyPublish::AfterSynthesis`).
    pending_reply: Option<(TurnId, Message)>,
    stage: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    state_tx: watch::Sender<TurnSnapshot>,
}

impl TurnController {
    pub fn new(
        engine: Box<dyn SpeechEngine>,
        log: MessageLog,
        generator: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        settings: TurnSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new();
        let (state_tx, _) = watch::channel(machine.snapshot());
        Self {
            recognizer: RecognizerAdapter::new(engine, events_tx.clone()),
            machine,
            log,
            generator,
            synthesizer,
            player: Player::new(sink),
            history: Arc::new(ConversationHistory::bootstrap()),
            settings,
            pending_reply: None,
            stage: None,
            events_tx,
            events_rx,
            state_tx,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Live view of the turn state.
    pub fn state_watch(&self) -> watch::Receiver<TurnSnapshot> {
        self.state_tx.subscribe()
    }

    /// Runs until shutdown. Only a lost recognizer ends the loop with an error.
    pub async fn run(mut self) -> VoiceResult<()> {
        info!(target: TARGET, "🎙️ Turn controller starting");
        if let Err(e) = self.rearm() {
            self.shut_down();
            return Err(e);
        }
        self.report_state();

        while let Some(event) = self.events_rx.recv().await {
            let flow = self.dispatch(event);
            self.report_state();
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    error!(target: TARGET, error = %e, "Turn controller stopping");
                    self.shut_down();
                    self.report_state();
                    return Err(e);
                }
            }
        }

        info!(target: TARGET, "Turn controller stopped");
        Ok(())
    }

    fn dispatch(&mut self, event: ControllerEvent) -> VoiceResult<Flow> {
        match event {
            ControllerEvent::Recognizer(notice) => match self.recognizer.accept(notice) {
                Some(event) => self.on_recognizer(event),
                None => Ok(Flow::Continue),
            },
            ControllerEvent::Reply { turn, outcome } => self.on_reply(turn, outcome),
            ControllerEvent::Synthesized { turn, outcome } => self.on_synthesized(turn, outcome),
            ControllerEvent::PlaybackFinished { turn, outcome } => {
                self.on_playback_finished(turn, outcome)
            }
            ControllerEvent::Shutdown => {
                info!(target: TARGET, "Shutdown requested");
                self.shut_down();
                Ok(Flow::Stop)
            }
        }
    }

    fn on_recognizer(&mut self, event: RecognizerEvent) -> VoiceResult<Flow> {
        match event {
            RecognizerEvent::Started => {
                debug!(target: TARGET, "Recognition started");
                Ok(Flow::Continue)
            }
            RecognizerEvent::NoMatch => {
                debug!(target: TARGET, "Speech not recognized");
                Ok(Flow::Continue)
            }
            RecognizerEvent::Result(text) => self.on_transcript(text),
            RecognizerEvent::End => {
                if self.turn_in_flight() {
                    debug!(target: TARGET, "Recognition ended mid-turn; re-arming after the turn");
                    return Ok(Flow::Continue);
                }
                self.rearm()
            }
            RecognizerEvent::Error(code) => {
                warn!(target: TARGET, error = %code, "Recognition error");
                if self.turn_in_flight() {
                    return Ok(Flow::Continue);
                }
                self.recognizer.stop();
                self.rearm()
            }
            RecognizerEvent::Unavailable(reason) => {
                error!(target: TARGET, %reason, "Speech recognizer unavailable");
                Err(VoiceError::RecognizerUnavailable(reason))
            }
        }
    }

    /// `Listening → AwaitingAIResponse`: stop listening, publish the user message,
    /// then ask for a reply.
    fn on_transcript(&mut self, text: String) -> VoiceResult<Flow> {
        let state = self.machine.state();
        if self.machine.is_suppressed() || state != TurnState::Listening {
            info!(
                target: TARGET,
                %state,
                suppressed = self.machine.is_suppressed(),
                "Transcript discarded"
            );
            return Ok(Flow::Continue);
        }
        let Ok(message) = Message::user(text.trim()) else {
            debug!(target: TARGET, "Blank transcript ignored");
            return Ok(Flow::Continue);
        };

        let turn = self.machine.begin_turn()?;
        self.recognizer.stop();
        info!(target: TARGET, turn_id = %turn, "🗣️ Heard: {}", message.text());

        let text = message.text().to_string();
        let log = self.log.clone();
        let generator = Arc::clone(&self.generator);
        let history = Arc::clone(&self.history);
        let limit = self.settings.ai_timeout();

        self.spawn_stage(async move {
            publish_logged(&log, message, turn).await;
            let outcome = bounded("AI reply", limit, async {
                generator
                    .generate(history.turns(), &text)
                    .await
                    .map_err(VoiceError::from)
            })
            .await;
            ControllerEvent::Reply { turn, outcome }
        });
        Ok(Flow::Continue)
    }

    /// `AwaitingAIResponse → Synthesizing`.
    fn on_reply(&mut self, turn: TurnId, outcome: VoiceResult<String>) -> VoiceResult<Flow> {
        if !self.machine.is_current(turn) {
            debug!(target: TARGET, turn_id = %turn, "Dropping reply for an abandoned turn");
            return Ok(Flow::Continue);
        }
        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                warn!(target: TARGET, turn_id = %turn, error = %e, "AI reply failed; turn abandoned");
                return self.abandon(turn);
            }
        };
        let Ok(message) = Message::ai(reply.trim()) else {
            warn!(target: TARGET, turn_id = %turn, "AI reply was blank; turn abandoned");
            return self.abandon(turn);
        };

        self.machine.reply_ready(turn)?;
        info!(target: TARGET, turn_id = %turn, "💬 Reply: {}", message.text());

        let text = message.text().to_string();
        let publish_now = match self.settings.reply_publish {
            ReplyPublish::BeforeSynthesis => Some(message),
            ReplyPublish::AfterSynthesis => {
                self.pending_reply = Some((turn, message));
                None
            }
        };
        let log = self.log.clone();
        let synthesizer = Arc::clone(&self.synthesizer);
        let limit = self.settings.synthesis_timeout();

        self.spawn_stage(async move {
            if let Some(message) = publish_now {
                publish_logged(&log, message, turn).await;
            }
            let outcome = bounded("synthesis", limit, synthesizer.synthesize(&text)).await;
            ControllerEvent::Synthesized { turn, outcome }
        });
        Ok(Flow::Continue)
    }

    /// `Synthesizing → Playing`. Recognition is stopped before any audio plays.
    fn on_synthesized(
        &mut self,
        turn: TurnId,
        outcome: VoiceResult<SynthesizedAudio>,
    ) -> VoiceResult<Flow> {
        if !self.machine.is_current(turn) {
            debug!(target: TARGET, turn_id = %turn, "Dropping audio for an abandoned turn");
            return Ok(Flow::Continue);
        }
        let audio = match outcome {
            Ok(audio) => audio,
            Err(e) => {
                warn!(target: TARGET, turn_id = %turn, error = %e, "Synthesis failed; turn abandoned");
                return self.abandon(turn);
            }
        };

        self.recognizer.stop();
        self.machine.audio_ready(turn)?;

        let pending = self
            .pending_reply
            .take()
            .and_then(|(owner, message)| (owner == turn).then_some(message));
        let log = self.log.clone();
        let player = self.player.clone();
        let limit = self.settings.playback_timeout();

        self.spawn_stage(async move {
            if let Some(message) = pending {
                publish_logged(&log, message, turn).await;
            }
            let outcome = bounded("playback", limit, player.play(audio)).await;
            ControllerEvent::PlaybackFinished { turn, outcome }
        });
        Ok(Flow::Continue)
    }

    /// `Playing → Idle → Listening`.
    fn on_playback_finished(&mut self, turn: TurnId, outcome: VoiceResult<()>) -> VoiceResult<Flow> {
        if !self.machine.is_current(turn) {
            debug!(target: TARGET, turn_id = %turn, "Dropping playback result for an abandoned turn");
            return Ok(Flow::Continue);
        }
        match outcome {
            Ok(()) => {
                self.machine.playback_done(turn)?;
                info!(target: TARGET, turn_id = %turn, "✅ Turn complete");
                self.rearm()
            }
            Err(e) => {
                warn!(target: TARGET, turn_id = %turn, error = %e, "Playback failed; turn abandoned");
                self.abandon(turn)
            }
        }
    }

    fn abandon(&mut self, turn: TurnId) -> VoiceResult<Flow> {
        self.machine.abandon(turn)?;
        self.pending_reply = None;
        self.player.stop();
        self.rearm()
    }

    /// `Idle → Listening` and open a recognition window.
    fn rearm(&mut self) -> VoiceResult<Flow> {
        self.machine.arm()?;
        self.recognizer
            .start()
            .map_err(|e| VoiceError::RecognizerUnavailable(e.to_string()))?;
        Ok(Flow::Continue)
    }

    fn turn_in_flight(&self) -> bool {
        self.machine.is_suppressed() || self.machine.current_turn().is_some()
    }

    fn shut_down(&mut self) {
        if let Some(stage) = self.stage.take() {
            stage.abort();
        }
        self.recognizer.stop();
        self.player.stop();
        self.pending_reply = None;
        self.machine.reset();
    }

    fn spawn_stage<F>(&mut self, stage: F)
    where
        F: Future<Output = ControllerEvent> + Send + 'static,
    {
        let tx = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            let event = stage.await;
            let _ = tx.send(event);
        });
        if let Some(previous) = self.stage.replace(handle) {
            previous.abort();
        }
    }

    fn report_state(&self) {
        let snapshot = self.machine.snapshot();
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        if changed {
            info!(
                target: TARGET,
                state = %snapshot.state,
                suppressed = snapshot.suppressed,
                turn_id = ?snapshot.turn.map(TurnId::get),
                "Turn state changed"
            );
        }
    }
}

/// Publishes, logging instead of failing the turn.
async fn publish_logged(log: &MessageLog, message: Message, turn: TurnId) {
    if let Err(e) = log.publish(message).await {
        let err = VoiceError::Publish(e);
        warn!(target: TARGET, turn_id = %turn, error = %err, "Message not published");
    }
}

async fn bounded<T, F>(stage: &'static str, limit: Duration, work: F) -> VoiceResult<T>
where
    F: Future<Output = VoiceResult<T>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(outcome) => outcome,
        Err(_) => Err(VoiceError::Timeout {
            stage,
            after: limit,
        }),
    }
}
