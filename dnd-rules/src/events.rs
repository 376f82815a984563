//! Notifications raised by the rules engine.
//!
//! Events fan out to every subscriber over a broadcast channel. Publishing
//! never blocks; dropping a receiver ends that subscription.

use crate::character::CharacterId;
use tokio::sync::broadcast;

/// Something the rules engine wants the table to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesEvent {
    /// A message for the dungeon master, e.g. from `TellDm` or a feature's
    /// activation message.
    DungeonMasterMessage { source: String, message: String },

    FeatureActivated {
        character: CharacterId,
        character_name: String,
        feature: String,
    },

    FeatureDeactivated {
        character: CharacterId,
        character_name: String,
        feature: String,
    },
}

/// Broadcast sink for [`RulesEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RulesEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RulesEvent> {
        self.sender.subscribe()
    }

    /// Post a message for the dungeon master.
    pub fn notify(&self, source: impl Into<String>, message: impl Into<String>) {
        self.publish(RulesEvent::DungeonMasterMessage {
            source: source.into(),
            message: message.into(),
        });
    }

    /// Send an event to every current subscriber. Returns how many received it.
    pub fn publish(&self, event: RulesEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(?event, "no subscribers for rules event");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.notify("Rage", "Shemo is raging.");

        let expected = RulesEvent::DungeonMasterMessage {
            source: "Rage".to_string(),
            message: "Shemo is raging.".to_string(),
        };
        assert_eq!(a.try_recv().unwrap(), expected);
        assert_eq!(b.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(RulesEvent::DungeonMasterMessage {
            source: "x".into(),
            message: "y".into(),
        }), 0);

        let receiver = bus.subscribe();
        drop(receiver);
        bus.notify("x", "dropped receivers are skipped");
    }
}
