//! Event bus for decoupled notification of engine state changes

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::SyncError;
use crate::feed::{FeedSlot, SubscriptionState};

/// Engine-level events consumed by the presentation layer
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A user session was established and the replica rebuilt
    SignedIn { user_id: Uuid },

    /// The session ended; replica and subscriptions were torn down
    SignedOut,

    /// The replica's UI-visible state changed
    ReplicaChanged,

    /// A feed subscription moved through its lifecycle
    SubscriptionChanged {
        slot: FeedSlot,
        state: SubscriptionState,
    },

    /// An optimistic mutation failed and was rolled back
    MutationFailed { entity_id: Uuid, error: SyncError },

    /// The current user gained access to a list (join confirmed)
    ListJoined { list_id: Uuid },

    /// Fatal failure; all subscriptions were torn down
    EngineHalted,
}

/// Event bus for broadcasting engine events
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: EngineEvent) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
