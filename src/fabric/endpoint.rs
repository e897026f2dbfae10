//! Endpoint records for registered agents.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Busy => "busy",
            Self::Error => "error",
        }
    }
}

/// The fabric's record of a registered agent: liveness, capabilities,
/// inbound queue, and channel subscriptions.
///
/// Queue invariant: only messages whose TTL has not elapsed are held; the
/// sweep purges violators.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub agent_id: String,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub last_seen: DateTime<Utc>,
    pub subscriptions: HashSet<String>,
    queue: VecDeque<Message>,
}

impl Endpoint {
    pub fn new(agent_id: impl Into<String>, capabilities: Vec<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Online,
            capabilities,
            last_seen: Utc::now(),
            subscriptions: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, message: Message) {
        self.queue.push_back(message);
    }

    /// Return queued messages, draining them when `mark_consumed` is set.
    /// Expired messages are dropped either way.
    pub fn drain(&mut self, mark_consumed: bool, now: DateTime<Utc>) -> Vec<Message> {
        self.queue.retain(|m| !m.is_expired(now));
        if mark_consumed {
            self.queue.drain(..).collect()
        } else {
            self.queue.iter().cloned().collect()
        }
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.queue.len();
        self.queue.retain(|m| !m.is_expired(now));
        before - self.queue.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
        if self.status == AgentStatus::Offline {
            self.status = AgentStatus::Online;
        }
    }

    pub fn seconds_since_seen(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_seen).num_seconds()
    }
}
