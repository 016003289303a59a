use serde::{Deserialize, Serialize};

/// Scheduled job id (UUID string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Messaging session id (operator-chosen name).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Message destination: a numeric chat id or an `@handle`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target(pub String);

impl Target {
    /// Numeric chat id, if the target is one.
    pub fn chat_id(&self) -> Option<i64> {
        self.0.parse::<i64>().ok()
    }
}

/// What kind of Telegram connection a session represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    /// Bot API connection (token-based).
    Bot,
    /// MTProto user session. No adapter ships yet; the kind exists so
    /// registries can report it.
    User,
}
