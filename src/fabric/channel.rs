//! Named channels grouping agents for routing and fan-out.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Well-known channel ids created at fabric bootstrap.
pub const BROADCAST_CHANNEL: &str = "broadcast";
pub const COORDINATION_CHANNEL: &str = "coordination";
pub const SYSTEM_CHANNEL: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Direct,
    Broadcast,
    Multicast,
}

/// A named membership group. Channels are created at bootstrap or by the
/// host and are never deleted during normal operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub members: HashSet<String>,
    pub mode: DeliveryMode,
    pub persistent: bool,
}

impl Channel {
    pub fn new(id: impl Into<String>, name: impl Into<String>, mode: DeliveryMode) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            members: HashSet::new(),
            mode,
            persistent: false,
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn subscribe(&mut self, agent_id: &str) -> bool {
        self.members.insert(agent_id.to_string())
    }

    pub fn unsubscribe(&mut self, agent_id: &str) -> bool {
        self.members.remove(agent_id)
    }

    pub fn is_member(&self, agent_id: &str) -> bool {
        self.members.contains(agent_id)
    }
}

/// The channels every fabric starts with.
pub fn bootstrap_channels() -> Vec<Channel> {
    vec![
        Channel::new(BROADCAST_CHANNEL, "All Agents", DeliveryMode::Broadcast).persistent(),
        Channel::new(
            COORDINATION_CHANNEL,
            "Agent Coordination",
            DeliveryMode::Multicast,
        )
        .persistent(),
        Channel::new(SYSTEM_CHANNEL, "System Events", DeliveryMode::Broadcast).persistent(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let mut channel = Channel::new("c-1", "Test", DeliveryMode::Multicast);
        assert!(channel.subscribe("agent-a"));
        assert!(!channel.subscribe("agent-a"));
        assert!(channel.is_member("agent-a"));
        assert!(channel.unsubscribe("agent-a"));
        assert!(!channel.is_member("agent-a"));
    }

    #[test]
    fn test_bootstrap_channels() {
        let channels = bootstrap_channels();
        assert_eq!(channels.len(), 3);
        assert!(channels.iter().all(|c| c.persistent));
        assert!(channels.iter().any(|c| c.id == BROADCAST_CHANNEL));
        assert!(channels.iter().any(|c| c.id == COORDINATION_CHANNEL));
        assert!(channels.iter().any(|c| c.id == SYSTEM_CHANNEL));
    }
}
