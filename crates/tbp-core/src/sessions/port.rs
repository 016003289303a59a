use async_trait::async_trait;

use crate::{
    domain::{SessionId, Target},
    sessions::types::{SendOutcome, SessionInfo, SessionStatus},
    Result,
};

/// Port over a pool of Telegram connections.
///
/// Bots are the first implementation; MTProto user sessions can fit behind
/// the same interface once an adapter exists.
///
/// `send` distinguishes two failure shapes: `Ok(SendOutcome::Rejected)` is
/// a per-target delivery failure (bad chat id, kicked from chat), while
/// `Err(_)` is a transport fault (unknown or disconnected session, broken
/// client) that callers treat as fatal to the current sweep.
#[async_trait]
pub trait SessionPort: Send + Sync {
    async fn send(
        &self,
        session: &SessionId,
        target: &Target,
        message: &str,
    ) -> Result<SendOutcome>;

    async fn session_status(&self, session: &SessionId) -> Result<SessionStatus>;

    async fn is_connected(&self, session: &SessionId) -> bool;

    async fn list_sessions(&self) -> Vec<SessionInfo>;
}
