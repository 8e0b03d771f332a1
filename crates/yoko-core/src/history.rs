//! Conversation context handed to the reply generator.

use serde::{Deserialize, Serialize};

/// Speaker of a history turn, in the generator's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl HistoryTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Ordered prior turns. Every session starts from the same greeting exchange, and
/// each conversational turn is sent with exactly this seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<HistoryTurn>,
}

impl ConversationHistory {
    pub fn bootstrap() -> Self {
        Self {
            turns: vec![
                HistoryTurn::new(Role::User, "おはよう"),
                HistoryTurn::new(Role::Model, "おはよう、おかあちゃん。今日もよく晴れてるね。"),
            ],
        }
    }

    pub fn turns(&self) -> &[HistoryTurn] {
        &self.turns
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::bootstrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_is_one_user_model_exchange() {
        let history = ConversationHistory::bootstrap();
        let roles: Vec<_> = history.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model]);
        assert_eq!(history.turns()[0].text, "おはよう");
    }
}
