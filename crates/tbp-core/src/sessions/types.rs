use chrono::{DateTime, Utc};

use crate::domain::{SessionId, SessionKind};

/// Connection state of a messaging session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Connected,
    Disconnected,
}

/// Summary of a registered session, as shown to the operator.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub id: SessionId,
    pub kind: SessionKind,
    /// Bot username (or phone number for a user session).
    pub label: String,
    pub status: SessionStatus,
    pub connected_at: Option<DateTime<Utc>>,
    pub messages_sent: u64,
}

/// Result of a single delivery attempt.
///
/// `Rejected` is an ordinary per-target failure and is recorded in job
/// statistics. Transport-level faults are returned as `Err` by the port
/// and are fatal to the sweep that observed them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Rejected { reason: String },
}
