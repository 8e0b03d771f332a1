//! yoko-core: shared pieces of the Yoko voice companion.
//!
//! - [`Message`] / [`LogEntry`]: the only record of a conversation.
//! - [`MessageLog`]: append-only, order-preserving publish/subscribe log (sled).
//! - [`ConversationHistory`] and [`ResponseGenerator`]: context and AI replies.
//! - [`CoreConfig`]: configuration from file + environment.

mod config;
mod error;
mod generator;
mod history;
mod message;
mod message_log;

pub use config::{
    CoreConfig, EngineKind, GeneratorSettings, RecognizerSettings, ReplyPublish,
    SynthesisSettings, TurnSettings, ViewerSettings,
};
pub use error::{CoreError, CoreResult, GenerationError};
pub use generator::{GeminiGenerator, ResponseGenerator};
pub use history::{ConversationHistory, HistoryTurn, Role};
pub use message::{LogEntry, Message, Sender};
pub use message_log::{MessageLog, Subscription, MESSAGES_TREE};
