//! Telegram adapter (teloxide).
//!
//! Implements the `tbp-core` sessions port over the Telegram Bot API.
//! MTProto user sessions are out of scope here; the registry only ever
//! reports bot sessions.

pub mod registry;

pub use registry::BotRegistry;
