//! Coordination event stream for external subscribers.
//!
//! Every externally observable occurrence in the core (agent lifecycle,
//! message delivery, conflict lifecycle, allocation and scaling outcomes)
//! is published here as a [`CoordEvent`] over a broadcast channel. Hosts
//! subscribe with [`EventBus::subscribe`]; slow subscribers lag and skip
//! rather than backpressure the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordEvent {
    AgentRegistered {
        agent_id: String,
        capabilities: Vec<String>,
    },
    AgentOffline {
        agent_id: String,
        last_seen: DateTime<Utc>,
    },
    MessageSent {
        message_id: String,
        from: String,
        to: String,
        channel: String,
    },
    MessageBroadcast {
        message_id: String,
        from: String,
        channel: String,
        delivered: usize,
        failed: usize,
    },
    ConflictDetected {
        conflict_id: String,
        kind: String,
        severity: String,
        participants: Vec<String>,
    },
    ConflictResolved {
        conflict_id: String,
        strategy: String,
        attempts: u32,
    },
    ConflictEscalated {
        conflict_id: String,
        reason: String,
    },
    ResourcesAllocated {
        agent_id: String,
        allocation_ids: Vec<String>,
    },
    AllocationFailed {
        agent_id: String,
        resource_type: String,
        reason: String,
    },
    ScalingExecuted {
        pool_id: String,
        action: String,
        amount: f64,
        new_total: f64,
    },
    MetricsUpdated {
        pool_count: usize,
        avg_utilization: f64,
    },
}

impl CoordEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentRegistered { .. } => "agent-registered",
            Self::AgentOffline { .. } => "agent-offline",
            Self::MessageSent { .. } => "message-sent",
            Self::MessageBroadcast { .. } => "message-broadcast",
            Self::ConflictDetected { .. } => "conflict-detected",
            Self::ConflictResolved { .. } => "conflict-resolved",
            Self::ConflictEscalated { .. } => "conflict-escalated",
            Self::ResourcesAllocated { .. } => "resources-allocated",
            Self::AllocationFailed { .. } => "allocation-failed",
            Self::ScalingExecuted { .. } => "scaling-executed",
            Self::MetricsUpdated { .. } => "metrics-updated",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailed { .. } | Self::ConflictEscalated { .. }
        )
    }
}

/// Broadcast bus for coordination events.
///
/// Publishing never fails: with no subscribers the event is dropped, which
/// is the normal state for embedded use without observers.
pub struct EventBus {
    sender: broadcast::Sender<CoordEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: CoordEvent) {
        let kind = event.kind();
        if self.sender.send(event).is_err() {
            debug!(event = kind, "No subscribers for coordination event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        let event = CoordEvent::AgentRegistered {
            agent_id: "a-1".into(),
            capabilities: vec![],
        };
        assert_eq!(event.kind(), "agent-registered");

        let event = CoordEvent::ScalingExecuted {
            pool_id: "p-1".into(),
            action: "scale-up".into(),
            amount: 20.0,
            new_total: 120.0,
        };
        assert_eq!(event.kind(), "scaling-executed");
    }

    #[test]
    fn test_event_is_error() {
        assert!(CoordEvent::AllocationFailed {
            agent_id: "a".into(),
            resource_type: "compute".into(),
            reason: "no pool".into(),
        }
        .is_error());

        assert!(!CoordEvent::MetricsUpdated {
            pool_count: 1,
            avg_utilization: 0.2,
        }
        .is_error());
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(CoordEvent::AgentRegistered {
            agent_id: "a-1".into(),
            capabilities: vec!["build".into()],
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "agent-registered");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(16);
        bus.publish(CoordEvent::MetricsUpdated {
            pool_count: 0,
            avg_utilization: 0.0,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
