//! Receipt Bot — WhatsApp onboarding bot core.

pub mod bot;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod store;
