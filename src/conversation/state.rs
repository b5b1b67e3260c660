//! Conversation state — tracks where a user is in the onboarding flow.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The states of a user's conversation with the bot.
///
/// Progresses linearly: New → AwaitingBrandName → AwaitingCategory →
/// Completed. Users are created directly in `AwaitingBrandName`; `New` only
/// exists for records that have not been greeted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    New,
    #[default]
    AwaitingBrandName,
    AwaitingCategory,
    Completed,
}

impl ConversationState {
    /// Every state, in flow order.
    pub const ALL: [ConversationState; 4] = [
        Self::New,
        Self::AwaitingBrandName,
        Self::AwaitingCategory,
        Self::Completed,
    ];

    /// Whether onboarding is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Wire/storage name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::AwaitingBrandName => "awaiting_brand_name",
            Self::AwaitingCategory => "awaiting_category",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown conversation state: {s:?}"))
    }
}
