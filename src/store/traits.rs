//! `UserStore` trait — the persistence interface the router depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::conversation::{ConversationState, Profile};
use crate::error::DatabaseError;

/// A messaging contact and their conversation progress.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Stable opaque contact address, e.g. `15551234567@c.us`.
    pub identity: String,
    pub is_paid: bool,
    pub conversation_state: ConversationState,
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A freshly onboarded-to-be user with default fields.
    pub fn new_default(identity: &str) -> Self {
        let now = Utc::now();
        Self {
            identity: identity.to_string(),
            is_paid: false,
            conversation_state: ConversationState::default(),
            profile: Profile::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of [`UserStore::create_default`].
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// This call inserted the record.
    Created(User),
    /// A record for the identity already existed; it is returned unchanged.
    Existing(User),
}

impl CreateOutcome {
    pub fn user(&self) -> &User {
        match self {
            Self::Created(user) | Self::Existing(user) => user,
        }
    }

    pub fn into_user(self) -> User {
        match self {
            Self::Created(user) | Self::Existing(user) => user,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Backend-agnostic user persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by identity.
    async fn find_by_identity(&self, identity: &str) -> Result<Option<User>, DatabaseError>;

    /// Create a user with default fields.
    ///
    /// Safe under concurrent calls for the same identity: exactly one caller
    /// gets `Created`, every other caller gets `Existing`.
    async fn create_default(&self, identity: &str) -> Result<CreateOutcome, DatabaseError>;

    /// Replace the mutable fields (`is_paid`, `conversation_state`,
    /// `profile`) of a user. `identity` and `created_at` never change.
    /// Saving the same content twice is a no-op.
    async fn save(&self, user: &User) -> Result<(), DatabaseError>;

    /// Number of stored users.
    async fn count_users(&self) -> Result<u64, DatabaseError>;

    /// Release the store at shutdown.
    async fn close(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
