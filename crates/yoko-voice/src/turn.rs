//! Conversational turn state.
//!
//! [`TurnMachine`] owns the current [`TurnState`] and the audio suppression flag.
//! The flag is never set directly: every transition method writes it together with
//! the state, so after any transition `suppressed == state.suppresses_recognition()`.
//!
//! ```text
//! Idle ─arm─▶ Listening ─begin_turn─▶ AwaitingAIResponse ─reply_ready─▶ Synthesizing
//!  ▲                                         │                              │
//!  │                                      abandon                      audio_ready
//!  │                                         ▼                              ▼
//!  └────────────── playback_done / abandon ◀─────────────────────────── Playing
//! ```

use crate::error::{VoiceError, VoiceResult};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Where the companion is in the current conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Listening,
    AwaitingAIResponse,
    Synthesizing,
    Playing,
}

impl TurnState {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::AwaitingAIResponse => "awaiting_ai_response",
            TurnState::Synthesizing => "synthesizing",
            TurnState::Playing => "playing",
        }
    }

    /// States during which the microphone must not be transcribed.
    pub fn suppresses_recognition(self) -> bool {
        matches!(self, TurnState::Synthesizing | TurnState::Playing)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one conversational turn. Outcomes of async work carry it so that
/// results for an abandoned turn can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TurnId(u64);

impl TurnId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Point-in-time view of the machine, published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TurnSnapshot {
    pub state: TurnState,
    pub suppressed: bool,
    pub turn: Option<TurnId>,
}

#[derive(Debug)]
pub struct TurnMachine {
    state: TurnState,
    suppressed: bool,
    current: Option<TurnId>,
    next_id: u64,
}

impl Default for TurnMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnMachine {
    pub fn new() -> Self {
        Self {
            state: TurnState::Idle,
            suppressed: false,
            current: None,
            next_id: 1,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn current_turn(&self) -> Option<TurnId> {
        self.current
    }

    /// True while `turn` is the turn in flight.
    pub fn is_current(&self, turn: TurnId) -> bool {
        self.current == Some(turn)
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            state: self.state,
            suppressed: self.suppressed,
            turn: self.current,
        }
    }

    /// `Idle → Listening`. Already listening is a no-op.
    pub fn arm(&mut self) -> VoiceResult<()> {
        match self.state {
            TurnState::Listening => Ok(()),
            TurnState::Idle => {
                self.set(TurnState::Listening);
                Ok(())
            }
            from => Err(VoiceError::InvalidTransition { from, event: "arm" }),
        }
    }

    /// `Listening → AwaitingAIResponse`, allocating the new turn's id.
    pub fn begin_turn(&mut self) -> VoiceResult<TurnId> {
        self.expect(TurnState::Listening, "begin_turn")?;
        let id = TurnId(self.next_id);
        self.next_id += 1;
        self.current = Some(id);
        self.set(TurnState::AwaitingAIResponse);
        Ok(id)
    }

    /// `AwaitingAIResponse → Synthesizing`; raises suppression.
    pub fn reply_ready(&mut self, turn: TurnId) -> VoiceResult<()> {
        self.expect_turn(turn, TurnState::AwaitingAIResponse, "reply_ready")?;
        self.set(TurnState::Synthesizing);
        Ok(())
    }

    /// `Synthesizing → Playing`.
    pub fn audio_ready(&mut self, turn: TurnId) -> VoiceResult<()> {
        self.expect_turn(turn, TurnState::Synthesizing, "audio_ready")?;
        self.set(TurnState::Playing);
        Ok(())
    }

    /// `Playing → Idle`; lowers suppression and closes the turn.
    pub fn playback_done(&mut self, turn: TurnId) -> VoiceResult<()> {
        self.expect_turn(turn, TurnState::Playing, "playback_done")?;
        self.current = None;
        self.set(TurnState::Idle);
        Ok(())
    }

    /// Drops the turn in flight from any of its stages and returns to `Idle`.
    pub fn abandon(&mut self, turn: TurnId) -> VoiceResult<()> {
        if !self.is_current(turn) {
            return Err(VoiceError::InvalidTransition {
                from: self.state,
                event: "abandon",
            });
        }
        self.current = None;
        self.set(TurnState::Idle);
        Ok(())
    }

    /// Back to `Idle` from anywhere (shutdown).
    pub fn reset(&mut self) {
        self.current = None;
        self.set(TurnState::Idle);
    }

    fn expect(&self, state: TurnState, event: &'static str) -> VoiceResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(VoiceError::InvalidTransition {
                from: self.state,
                event,
            })
        }
    }

    fn expect_turn(&self, turn: TurnId, state: TurnState, event: &'static str) -> VoiceResult<()> {
        if !self.is_current(turn) {
            return Err(VoiceError::InvalidTransition {
                from: self.state,
                event,
            });
        }
        self.expect(state, event)
    }

    fn set(&mut self, next: TurnState) {
        if self.state != next {
            debug!(target: "yoko::voice", from = %self.state, to = %next, "Turn transition");
        }
        self.state = next;
        self.suppressed = next.suppresses_recognition();
    }
}
