//! Per-user conversation state for multi-step flows.
//!
//! A slash command starts a flow and stores what it needs here; the next plain message or
//! upload from the same user continues it. State holds stable identifiers only (category id,
//! amount), never positions in a list that may have changed since it was shown.

use crate::{core::broadcast::Audience, gateway::MessageRef};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// The step a user is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversation {
    /// Picked a category, quantity comes next
    Browsing {
        /// Category being bought from
        category_id: i64,
    },
    /// Picked a manual method and amount, payment screenshot comes next
    AwaitingProof {
        /// Payment method display name
        method: String,
        /// Claimed amount
        amount: Decimal,
    },
    /// Entered an amount, destination address comes next
    AwaitingAddress {
        /// Requested amount
        amount: Decimal,
    },
    /// Admin picked an audience, the message to broadcast comes next
    ComposingBroadcast {
        /// Who receives it
        audience: Audience,
    },
    /// Admin sees the preview and must confirm or cancel
    ConfirmingBroadcast {
        /// Message to copy
        source: MessageRef,
        /// Recipient snapshot taken when the preview was shown
        recipients: Vec<i64>,
    },
}

impl Conversation {
    /// Short label for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Browsing { .. } => "browsing",
            Self::AwaitingProof { .. } => "deposit",
            Self::AwaitingAddress { .. } => "withdrawal",
            Self::ComposingBroadcast { .. } | Self::ConfirmingBroadcast { .. } => "broadcast",
        }
    }
}

/// Conversation state of every user, keyed by user id.
#[derive(Debug, Default)]
pub struct ConversationStore {
    states: RwLock<HashMap<u64, Conversation>>,
}

impl ConversationStore {
    /// Starts a flow, replacing whatever the user was doing.
    pub async fn begin(&self, user_id: u64, conversation: Conversation) {
        debug!("User {} entered {} flow", user_id, conversation.name());
        self.states.write().await.insert(user_id, conversation);
    }

    /// Current state without consuming it.
    pub async fn current(&self, user_id: u64) -> Option<Conversation> {
        self.states.read().await.get(&user_id).cloned()
    }

    /// Removes and returns the current state.
    pub async fn take(&self, user_id: u64) -> Option<Conversation> {
        self.states.write().await.remove(&user_id)
    }

    /// Removes the state only when it is a broadcast confirmation.
    pub async fn take_broadcast(&self, user_id: u64) -> Option<(MessageRef, Vec<i64>)> {
        let mut states = self.states.write().await;
        match states.remove(&user_id) {
            Some(Conversation::ConfirmingBroadcast { source, recipients }) => {
                Some((source, recipients))
            }
            Some(other) => {
                states.insert(user_id, other);
                None
            }
            None => None,
        }
    }

    /// Drops the user's state.
    pub async fn cancel(&self, user_id: u64) -> bool {
        self.states.write().await.remove(&user_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_replaces_previous_flow() {
        let store = ConversationStore::default();
        store.begin(1, Conversation::Browsing { category_id: 7 }).await;
        store
            .begin(
                1,
                Conversation::AwaitingAddress {
                    amount: Decimal::ONE,
                },
            )
            .await;

        assert_eq!(
            store.current(1).await,
            Some(Conversation::AwaitingAddress {
                amount: Decimal::ONE
            })
        );
        assert!(store.current(2).await.is_none());
    }

    #[tokio::test]
    async fn test_take_consumes_state() {
        let store = ConversationStore::default();
        store.begin(1, Conversation::Browsing { category_id: 7 }).await;

        assert_eq!(
            store.take(1).await,
            Some(Conversation::Browsing { category_id: 7 })
        );
        assert!(store.take(1).await.is_none());
        assert!(!store.cancel(1).await);
    }

    #[tokio::test]
    async fn test_take_broadcast_leaves_other_flows_alone() {
        let store = ConversationStore::default();
        store.begin(1, Conversation::Browsing { category_id: 7 }).await;
        assert!(store.take_broadcast(1).await.is_none());
        assert!(store.current(1).await.is_some());

        let source = MessageRef {
            channel_id: 5,
            message_id: 6,
        };
        store
            .begin(
                1,
                Conversation::ConfirmingBroadcast {
                    source,
                    recipients: vec![1, 2],
                },
            )
            .await;
        assert_eq!(store.take_broadcast(1).await, Some((source, vec![1, 2])));
        assert!(store.current(1).await.is_none());
    }
}
