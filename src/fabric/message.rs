//! Message types for inter-agent communication.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Recipient value that addresses every subscribed endpoint.
pub const BROADCAST_RECIPIENT: &str = "broadcast";

pub const DEFAULT_PRIORITY: u8 = 5;
pub const DEFAULT_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
    Heartbeat,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Notification => "notification",
            Self::Error => "error",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// A single inter-agent message.
///
/// Immutable once enqueued: the fabric only ever removes it, on consumption
/// or TTL expiry. An unset TTL is filled from the fabric config at send
/// time; outside the fabric it falls back to [`DEFAULT_TTL_SECS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub kind: MessageKind,
    pub channel: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub ttl_secs: Option<u64>,
    pub correlation_id: Option<String>,
}

impl Message {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: MessageKind,
        channel: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            kind,
            channel: channel.into(),
            payload,
            timestamp: Utc::now(),
            priority: DEFAULT_PRIORITY,
            ttl_secs: None,
            correlation_id: None,
        }
    }

    pub fn broadcast(
        from: impl Into<String>,
        kind: MessageKind,
        channel: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::new(from, BROADCAST_RECIPIENT, kind, channel, payload)
    }

    pub fn notification(
        from: impl Into<String>,
        to: impl Into<String>,
        channel: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::new(from, to, MessageKind::Notification, channel, payload)
    }

    pub fn heartbeat(from: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::broadcast(
            from,
            MessageKind::Heartbeat,
            channel,
            serde_json::json!({ "ping": true }),
        )
    }

    pub fn reply(&self, payload: Value) -> Self {
        let mut msg = Self::new(
            self.to.clone(),
            self.from.clone(),
            MessageKind::Response,
            self.channel.clone(),
            payload,
        );
        msg.correlation_id = Some(self.correlation_id.clone().unwrap_or_else(|| self.id.clone()));
        msg
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST_RECIPIENT
    }

    pub fn is_for(&self, agent_id: &str) -> bool {
        self.to == agent_id || self.is_broadcast()
    }

    pub fn ttl_or_default(&self) -> u64 {
        self.ttl_secs.unwrap_or(DEFAULT_TTL_SECS)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + Duration::seconds(self.ttl_or_default() as i64)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new(
            "agent-a",
            "agent-b",
            MessageKind::Request,
            "project-coordination",
            serde_json::json!({ "task": "build" }),
        );

        assert_eq!(msg.from, "agent-a");
        assert_eq!(msg.to, "agent-b");
        assert_eq!(msg.priority, DEFAULT_PRIORITY);
        assert!(msg.ttl_secs.is_none());
        assert_eq!(msg.ttl_or_default(), DEFAULT_TTL_SECS);
        assert!(!msg.is_broadcast());
        assert!(msg.is_for("agent-b"));
        assert!(!msg.is_for("agent-c"));
    }

    #[test]
    fn test_broadcast_message() {
        let msg = Message::broadcast(
            "coordinator",
            MessageKind::Notification,
            "system",
            serde_json::json!({ "note": "shutdown at 18:00" }),
        );

        assert!(msg.is_broadcast());
        assert!(msg.is_for("any-agent"));
    }

    #[test]
    fn test_reply_carries_correlation() {
        let req = Message::new(
            "agent-a",
            "agent-b",
            MessageKind::Request,
            "coordination",
            serde_json::json!({}),
        )
        .with_correlation("corr-1");

        let resp = req.reply(serde_json::json!({ "ok": true }));
        assert_eq!(resp.from, "agent-b");
        assert_eq!(resp.to, "agent-a");
        assert_eq!(resp.kind, MessageKind::Response);
        assert_eq!(resp.correlation_id.as_deref(), Some("corr-1"));
    }

    #[test]
    fn test_reply_falls_back_to_message_id() {
        let req = Message::new(
            "a",
            "b",
            MessageKind::Request,
            "coordination",
            serde_json::json!({}),
        );
        let resp = req.reply(serde_json::json!({}));
        assert_eq!(resp.correlation_id.as_deref(), Some(req.id.as_str()));
    }

    #[test]
    fn test_expiry() {
        let msg = Message::new(
            "a",
            "b",
            MessageKind::Notification,
            "coordination",
            serde_json::json!({}),
        )
        .with_ttl(60);

        assert!(!msg.is_expired(msg.timestamp + Duration::seconds(59)));
        assert!(msg.is_expired(msg.timestamp + Duration::seconds(60)));
    }

    #[test]
    fn test_kind_as_str() {
        assert_eq!(MessageKind::Request.as_str(), "request");
        assert_eq!(MessageKind::Heartbeat.as_str(), "heartbeat");
    }
}
