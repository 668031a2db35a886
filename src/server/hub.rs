//! Realtime event hub for ledger changes.
//!
//! Connected clients subscribe per group and receive every ledger event
//! broadcast for it. State is in-memory and process-local; a restart
//! drops all subscriptions.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::models::{GroupExpense, Settlement};

/// A change to a group's ledger, pushed to subscribed clients as a JSON
/// frame like `{"event": "NEW_EXPENSE", "expense": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    #[serde(rename = "NEW_EXPENSE")]
    NewExpense { expense: GroupExpense },
    #[serde(rename = "NEW_SETTLEMENT")]
    NewSettlement { settlement: Settlement },
}

/// Tracks subscriber channels per group.
///
/// Owned by the app state and injected into handlers; the channel map is
/// guarded by an async RwLock and senders are cloned out before sending,
/// so a broadcast never holds the lock while delivering.
pub struct EventHub {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<LedgerEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes to a group's events, creating the channel on first use.
    ///
    /// Dropping the returned receiver is the unsubscribe.
    pub async fn subscribe(&self, group_id: Uuid) -> broadcast::Receiver<LedgerEvent> {
        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(&group_id) {
            sender.subscribe()
        } else {
            let (sender, receiver) = broadcast::channel(16);
            channels.insert(group_id, sender);
            receiver
        }
    }

    /// Sends an event to every current subscriber of the group.
    ///
    /// Returns the number of subscribers reached. A group with no
    /// subscribers is a no-op, and a channel whose receivers have all
    /// disconnected is pruned from the map.
    pub async fn broadcast(&self, group_id: Uuid, event: LedgerEvent) -> usize {
        let sender = {
            let channels = self.channels.read().await;
            channels.get(&group_id).cloned()
        };

        let Some(sender) = sender else {
            return 0;
        };

        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                // Every receiver is gone; drop the idle entry unless a new
                // subscriber raced in since the snapshot.
                let mut channels = self.channels.write().await;
                if let Some(current) = channels.get(&group_id) {
                    if current.receiver_count() == 0 {
                        channels.remove(&group_id);
                    }
                }
                0
            }
        }
    }

    /// Number of groups with a live channel.
    #[cfg(test)]
    async fn group_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
