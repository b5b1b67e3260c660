//! Message router — load or create the user, run one transition, persist.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::bot::keyed_lock::KeyedLock;
use crate::conversation::{self, ConversationState, prompts};
use crate::error::DatabaseError;
use crate::store::{CreateOutcome, User, UserStore};

/// How long after a user record is created further messages still count as
/// part of the first contact.
pub const DEFAULT_FIRST_CONTACT_WINDOW: Duration = Duration::from_secs(2);

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// First contact: the user was greeted and the message not consumed.
    Welcomed,
    /// The engine ran and the result was persisted.
    Transitioned {
        from: ConversationState,
        to: ConversationState,
    },
    /// The store failed; the user got the generic apology.
    Failed,
}

/// Reply text plus how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedReply {
    pub text: String,
    pub outcome: RouteOutcome,
}

impl RoutedReply {
    fn welcomed() -> Self {
        Self {
            text: prompts::WELCOME.to_string(),
            outcome: RouteOutcome::Welcomed,
        }
    }

    fn failed() -> Self {
        Self {
            text: prompts::GENERIC_FAILURE.to_string(),
            outcome: RouteOutcome::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome != RouteOutcome::Failed
    }
}

/// Routes inbound messages through the conversation engine.
///
/// Messages for the same identity are handled one at a time, in the order
/// they reach [`MessageRouter::handle_inbound`].
///
/// A message that arrived before its sender's record existed, or within the
/// first-contact window after it was created, is answered with the welcome
/// like the message that created the record. A burst of greetings therefore
/// never lands in the profile as a brand name.
pub struct MessageRouter {
    store: Arc<dyn UserStore>,
    locks: KeyedLock,
    store_timeout: Duration,
    first_contact_window: Duration,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn UserStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            locks: KeyedLock::new(),
            store_timeout,
            first_contact_window: DEFAULT_FIRST_CONTACT_WINDOW,
        }
    }

    /// Set the first-contact window. `Duration::ZERO` keeps only messages
    /// that arrived while the record was being created.
    pub fn with_first_contact_window(mut self, window: Duration) -> Self {
        self.first_contact_window = window;
        self
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Handle one inbound message that arrived now.
    pub async fn handle_inbound(&self, identity: &str, raw_text: &str) -> RoutedReply {
        self.handle_inbound_at(identity, raw_text, Utc::now()).await
    }

    /// Handle one inbound message and return the reply to deliver.
    ///
    /// `received_at` is when the transport delivered the message, which may
    /// be earlier than now if it waited in a queue.
    ///
    /// Never fails: store errors are logged and turned into the generic
    /// apology, with nothing persisted for this message.
    pub async fn handle_inbound_at(
        &self,
        identity: &str,
        raw_text: &str,
        received_at: DateTime<Utc>,
    ) -> RoutedReply {
        match self.route(identity, raw_text, received_at).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(identity, error = %e, "Failed to process message");
                RoutedReply::failed()
            }
        }
    }

    async fn route(
        &self,
        identity: &str,
        raw_text: &str,
        received_at: DateTime<Utc>,
    ) -> Result<RoutedReply, DatabaseError> {
        let _guard = self.locks.lock(identity).await;

        let existing = self
            .timed("find_by_identity", self.store.find_by_identity(identity))
            .await?;

        let Some(mut user) = existing else {
            // The first message is the greeting trigger, not onboarding input.
            match self
                .timed("create_default", self.store.create_default(identity))
                .await?
            {
                CreateOutcome::Created(_) => {
                    info!(identity, "New user detected, starting onboarding");
                }
                CreateOutcome::Existing(_) => {
                    info!(identity, "User was created concurrently, greeting without transition");
                }
            }
            return Ok(RoutedReply::welcomed());
        };

        if self.is_first_contact(&user, received_at) {
            info!(identity, "Message is part of the first contact, greeting without transition");
            return Ok(RoutedReply::welcomed());
        }

        let from = user.conversation_state;
        let step = conversation::transition(from, &user.profile, raw_text);

        user.conversation_state = step.next_state;
        user.profile = step.profile;
        user.updated_at = Utc::now();
        self.timed("save", self.store.save(&user)).await?;

        if from != step.next_state {
            info!(identity, from = %from, to = %step.next_state, "Conversation advanced");
        } else {
            debug!(identity, state = %from, "Conversation state unchanged");
        }

        Ok(RoutedReply {
            text: step.reply,
            outcome: RouteOutcome::Transitioned {
                from,
                to: step.next_state,
            },
        })
    }

    /// Whether a message for an existing, untouched user still belongs to
    /// the greeting that created it.
    fn is_first_contact(&self, user: &User, received_at: DateTime<Utc>) -> bool {
        if user.conversation_state != ConversationState::AwaitingBrandName
            || !user.profile.is_empty()
        {
            return false;
        }
        match received_at.signed_duration_since(user.created_at).to_std() {
            Ok(elapsed) => elapsed < self.first_contact_window,
            // Negative: the message arrived before the record existed.
            Err(_) => true,
        }
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| DatabaseError::Timeout {
                operation,
                timeout: self.store_timeout,
            })?
    }
}
