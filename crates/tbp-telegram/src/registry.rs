use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::{prelude::*, types::Recipient};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use tbp_core::{
    domain::{SessionId, SessionKind, Target},
    errors::Error,
    sessions::{
        port::SessionPort,
        types::{SendOutcome, SessionInfo, SessionStatus},
    },
    Result,
};

struct BotEntry {
    bot: Bot,
    username: String,
    connected_at: DateTime<Utc>,
    messages_sent: u64,
}

/// Registry of connected bot sessions keyed by operator-chosen id.
#[derive(Default)]
pub struct BotRegistry {
    bots: Mutex<HashMap<SessionId, BotEntry>>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the token against `getMe` and register the session.
    pub async fn add_bot(&self, id: SessionId, token: &str) -> Result<SessionInfo> {
        let bot = Bot::new(token.to_string());
        let me = bot
            .get_me()
            .await
            .map_err(|e| Error::Session(format!("getMe failed: {e}")))?;
        let username = me.username().to_string();

        let mut bots = self.bots.lock().await;
        if bots.contains_key(&id) {
            return Err(Error::Validation(format!(
                "session already exists: {}",
                id.0
            )));
        }

        info!(session = %id.0, bot = %username, "bot session connected");
        let entry = BotEntry {
            bot,
            username: username.clone(),
            connected_at: Utc::now(),
            messages_sent: 0,
        };
        let info = describe(&id, &entry);
        bots.insert(id, entry);
        Ok(info)
    }

    /// Drop a session. The token is forgotten; Telegram-side state is
    /// untouched.
    pub async fn remove(&self, id: &SessionId) -> Result<()> {
        let mut bots = self.bots.lock().await;
        let entry = bots
            .remove(id)
            .ok_or_else(|| Error::Session(format!("unknown session: {}", id.0)))?;
        info!(session = %id.0, bot = %entry.username, "bot session removed");
        Ok(())
    }

    fn recipient(target: &Target) -> Recipient {
        match target.chat_id() {
            Some(n) => Recipient::Id(teloxide::types::ChatId(n)),
            None => {
                let handle = target.0.trim();
                let handle = if handle.starts_with('@') {
                    handle.to_string()
                } else {
                    format!("@{handle}")
                };
                Recipient::ChannelUsername(handle)
            }
        }
    }
}

#[async_trait]
impl SessionPort for BotRegistry {
    async fn send(
        &self,
        session: &SessionId,
        target: &Target,
        message: &str,
    ) -> Result<SendOutcome> {
        // Clone the Bot out so the registry lock is not held across the
        // network call.
        let bot = {
            let bots = self.bots.lock().await;
            let entry = bots
                .get(session)
                .ok_or_else(|| Error::Session(format!("unknown session: {}", session.0)))?;
            entry.bot.clone()
        };

        match send_with_retry(&bot, Self::recipient(target), message).await {
            Ok(()) => {
                let mut bots = self.bots.lock().await;
                if let Some(entry) = bots.get_mut(session) {
                    entry.messages_sent += 1;
                }
                Ok(SendOutcome::Delivered)
            }
            // The API rejected this particular delivery (bad chat id,
            // kicked, blocked) -- a per-target failure, not a session
            // fault.
            Err(teloxide::RequestError::Api(e)) => {
                warn!(session = %session.0, target = %target.0, error = %e, "delivery rejected");
                Ok(SendOutcome::Rejected {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(Error::Session(format!("telegram transport error: {e}"))),
        }
    }

    async fn session_status(&self, session: &SessionId) -> Result<SessionStatus> {
        let bots = self.bots.lock().await;
        if bots.contains_key(session) {
            Ok(SessionStatus::Connected)
        } else {
            Err(Error::Session(format!("unknown session: {}", session.0)))
        }
    }

    async fn is_connected(&self, session: &SessionId) -> bool {
        self.bots.lock().await.contains_key(session)
    }

    async fn list_sessions(&self) -> Vec<SessionInfo> {
        let bots = self.bots.lock().await;
        let mut sessions: Vec<SessionInfo> =
            bots.iter().map(|(id, entry)| describe(id, entry)).collect();
        sessions.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        sessions
    }
}

fn describe(id: &SessionId, entry: &BotEntry) -> SessionInfo {
    SessionInfo {
        id: id.clone(),
        kind: SessionKind::Bot,
        label: format!("@{}", entry.username),
        status: SessionStatus::Connected,
        connected_at: Some(entry.connected_at),
        messages_sent: entry.messages_sent,
    }
}

async fn send_with_retry(
    bot: &Bot,
    to: Recipient,
    text: &str,
) -> std::result::Result<(), teloxide::RequestError> {
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match bot.send_message(to.clone(), text.to_string()).await {
            Ok(_) => return Ok(()),
            Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                sleep(d).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_targets_become_chat_ids() {
        let r = BotRegistry::recipient(&Target("-1001234567890".to_string()));
        assert!(matches!(r, Recipient::Id(teloxide::types::ChatId(-1001234567890))));
    }

    #[test]
    fn handles_gain_an_at_prefix() {
        let Recipient::ChannelUsername(h) = BotRegistry::recipient(&Target("mychannel".to_string()))
        else {
            panic!("expected a username recipient");
        };
        assert_eq!(h, "@mychannel");

        let Recipient::ChannelUsername(h) = BotRegistry::recipient(&Target("@already".to_string()))
        else {
            panic!("expected a username recipient");
        };
        assert_eq!(h, "@already");
    }

    #[tokio::test]
    async fn unknown_sessions_are_a_transport_fault() {
        let registry = BotRegistry::new();
        let err = registry
            .send(
                &SessionId("ghost".to_string()),
                &Target("1".to_string()),
                "hi",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Session(_)));
        assert!(!registry.is_connected(&SessionId("ghost".to_string())).await);
    }
}
