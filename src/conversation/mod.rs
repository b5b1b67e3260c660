//! Conversation system — the per-user onboarding flow.
//!
//! A new contact is greeted and asked for a brand name, then a business
//! category. Once both are collected the conversation is `completed` and
//! further messages are treated as commands.

pub mod commands;
pub mod engine;
pub mod profile;
pub mod prompts;
pub mod state;

pub use commands::Command;
pub use engine::{InputClass, Transition, transition};
pub use profile::{Profile, profile_keys};
pub use state::ConversationState;
