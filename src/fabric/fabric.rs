//! Message fabric: registration, routed delivery, and liveness sweeping.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::channel::{
    BROADCAST_CHANNEL, COORDINATION_CHANNEL, Channel, SYSTEM_CHANNEL, bootstrap_channels,
};
use super::endpoint::{AgentStatus, Endpoint};
use super::message::{Message, MessageKind};
use crate::config::FabricConfig;
use crate::error::{CoordError, Result};
use crate::events::{CoordEvent, EventBus};

/// Sender id used by the fabric itself for heartbeats and system notices.
const FABRIC_SENDER: &str = "fabric";

/// Outcome of a broadcast fan-out. Per-recipient failures are non-fatal;
/// the broadcast as a whole only fails if zero deliveries succeeded.
#[derive(Debug, Clone)]
pub struct BroadcastReport {
    pub message_id: String,
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BroadcastReport {
    pub fn success_count(&self) -> usize {
        self.delivered.len()
    }
}

/// Point-in-time fabric counters.
#[derive(Debug, Clone)]
pub struct FabricStats {
    pub endpoint_count: usize,
    pub online_count: usize,
    pub queued_total: usize,
    pub history_len: usize,
    pub by_kind: HashMap<&'static str, usize>,
}

/// Routes messages between registered agents over named channels.
///
/// All state is in-memory and process-lifetime. Capacity for growth is
/// bounded by the history limit and per-message TTLs, enforced by the
/// periodic [`sweep`](MessageFabric::sweep).
pub struct MessageFabric {
    config: FabricConfig,
    endpoints: RwLock<HashMap<String, Endpoint>>,
    channels: RwLock<HashMap<String, Channel>>,
    history: RwLock<VecDeque<Message>>,
    events: Arc<EventBus>,
    sweep_in_progress: AtomicBool,
}

impl MessageFabric {
    pub fn new(config: FabricConfig, events: Arc<EventBus>) -> Self {
        let channels = bootstrap_channels()
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Self {
            config,
            endpoints: RwLock::new(HashMap::new()),
            channels: RwLock::new(channels),
            history: RwLock::new(VecDeque::new()),
            events,
            sweep_in_progress: AtomicBool::new(false),
        }
    }

    /// Register a new agent endpoint and subscribe it to the default
    /// broadcast, coordination, and system channels.
    ///
    /// Re-registering a live agent is rejected; callers that want to
    /// reconnect must rely on the sweep marking the old endpoint offline
    /// and keep the same id out of the fabric until then.
    pub fn register_agent(&self, agent_id: &str, capabilities: Vec<String>) -> Result<()> {
        if agent_id.is_empty() {
            return Err(CoordError::Coordination("agent id must not be empty".into()));
        }

        // Lock order is endpoints before channels, fabric-wide. No other
        // path may take them in the opposite order while holding one.
        {
            let mut endpoints = self.endpoints.write();
            if endpoints.contains_key(agent_id) {
                return Err(CoordError::Coordination(format!(
                    "agent '{}' is already registered",
                    agent_id
                )));
            }

            let mut endpoint = Endpoint::new(agent_id, capabilities.clone());
            let mut channels = self.channels.write();
            for channel_id in [BROADCAST_CHANNEL, COORDINATION_CHANNEL, SYSTEM_CHANNEL] {
                if let Some(channel) = channels.get_mut(channel_id) {
                    channel.subscribe(agent_id);
                    endpoint.subscriptions.insert(channel_id.to_string());
                }
            }
            endpoints.insert(agent_id.to_string(), endpoint);
        }

        // Joined notice for earlier arrivals on the system channel. Sent
        // from the joining agent so fan-out excludes it; best effort, the
        // first agent has nobody to deliver to.
        let notice = Message::broadcast(
            agent_id,
            MessageKind::Notification,
            SYSTEM_CHANNEL,
            serde_json::json!({ "event": "agent-joined", "agent_id": agent_id }),
        );
        if let Err(e) = self.broadcast(notice) {
            debug!(agent = %agent_id, error = %e, "No recipients for join notice");
        }

        self.events.publish(CoordEvent::AgentRegistered {
            agent_id: agent_id.to_string(),
            capabilities,
        });

        info!(agent = %agent_id, "Agent registered");
        Ok(())
    }

    /// Validate and deliver a message.
    ///
    /// Broadcast recipients fan out per channel membership; directed
    /// messages append to the recipient's queue and the global history.
    pub fn send(&self, mut message: Message) -> Result<()> {
        self.validate(&message)?;
        message.ttl_secs.get_or_insert(self.config.default_ttl_secs);

        if message.is_broadcast() {
            self.broadcast(message)?;
            return Ok(());
        }

        {
            let mut endpoints = self.endpoints.write();
            let endpoint = endpoints
                .get_mut(&message.to)
                .ok_or_else(|| CoordError::UnknownRecipient(message.to.clone()))?;
            endpoint.enqueue(message.clone());
        }
        self.record_history(message.clone());

        self.events.publish(CoordEvent::MessageSent {
            message_id: message.id.clone(),
            from: message.from.clone(),
            to: message.to.clone(),
            channel: message.channel.clone(),
        });

        debug!(
            from = %message.from,
            to = %message.to,
            kind = message.kind.as_str(),
            channel = %message.channel,
            "Message delivered"
        );
        Ok(())
    }

    /// Fan a message out to every member of its channel except the sender.
    ///
    /// An unknown channel falls back to all registered endpoints. Each
    /// recipient gets an individual copy correlated to the original
    /// message id. Fails only if zero deliveries succeeded.
    pub fn broadcast(&self, mut message: Message) -> Result<BroadcastReport> {
        self.validate(&message)?;
        message.ttl_secs.get_or_insert(self.config.default_ttl_secs);

        // The channels guard must be released before endpoints is taken:
        // registration nests the locks endpoints-then-channels, and nesting
        // them here in the opposite order can deadlock.
        let channel_members: Option<Vec<String>> = {
            let channels = self.channels.read();
            channels
                .get(&message.channel)
                .map(|channel| channel.members.iter().cloned().collect())
        };
        let recipients: Vec<String> = match channel_members {
            Some(members) => members,
            None => self.endpoints.read().keys().cloned().collect(),
        };

        let correlation = message
            .correlation_id
            .clone()
            .unwrap_or_else(|| message.id.clone());

        let mut report = BroadcastReport {
            message_id: message.id.clone(),
            delivered: Vec::new(),
            failed: Vec::new(),
        };

        for recipient in recipients {
            if recipient == message.from {
                continue;
            }

            let mut copy = message.clone();
            copy.id = uuid::Uuid::new_v4().to_string();
            copy.to = recipient.clone();
            copy.correlation_id = Some(correlation.clone());

            let mut endpoints = self.endpoints.write();
            match endpoints.get_mut(&recipient) {
                Some(endpoint) => {
                    endpoint.enqueue(copy.clone());
                    drop(endpoints);
                    self.record_history(copy);
                    report.delivered.push(recipient);
                }
                None => {
                    drop(endpoints);
                    warn!(recipient = %recipient, channel = %message.channel, "Broadcast recipient not registered");
                    report
                        .failed
                        .push((recipient, "recipient not registered".into()));
                }
            }
        }

        self.events.publish(CoordEvent::MessageBroadcast {
            message_id: message.id.clone(),
            from: message.from.clone(),
            channel: message.channel.clone(),
            delivered: report.delivered.len(),
            failed: report.failed.len(),
        });

        if report.delivered.is_empty() {
            return Err(CoordError::Coordination(format!(
                "broadcast on channel '{}' reached no recipients",
                message.channel
            )));
        }
        Ok(report)
    }

    /// Return the agent's queued messages, updating its last-seen time.
    /// With `mark_consumed` the queue drains; otherwise it is peeked.
    pub fn receive(&self, agent_id: &str, mark_consumed: bool) -> Result<Vec<Message>> {
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints
            .get_mut(agent_id)
            .ok_or_else(|| CoordError::UnknownRecipient(agent_id.to_string()))?;
        endpoint.touch();
        Ok(endpoint.drain(mark_consumed, Utc::now()))
    }

    pub fn subscribe(&self, agent_id: &str, channel_id: &str) -> Result<()> {
        {
            let mut channels = self.channels.write();
            let channel = channels
                .get_mut(channel_id)
                .ok_or_else(|| CoordError::ChannelNotFound(channel_id.to_string()))?;
            channel.subscribe(agent_id);
        }
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints
            .get_mut(agent_id)
            .ok_or_else(|| CoordError::UnknownRecipient(agent_id.to_string()))?;
        endpoint.subscriptions.insert(channel_id.to_string());
        Ok(())
    }

    pub fn unsubscribe(&self, agent_id: &str, channel_id: &str) -> Result<()> {
        {
            let mut channels = self.channels.write();
            let channel = channels
                .get_mut(channel_id)
                .ok_or_else(|| CoordError::ChannelNotFound(channel_id.to_string()))?;
            channel.unsubscribe(agent_id);
        }
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints
            .get_mut(agent_id)
            .ok_or_else(|| CoordError::UnknownRecipient(agent_id.to_string()))?;
        endpoint.subscriptions.remove(channel_id);
        Ok(())
    }

    pub fn create_channel(&self, channel: Channel) -> Result<()> {
        let mut channels = self.channels.write();
        if channels.contains_key(&channel.id) {
            return Err(CoordError::Coordination(format!(
                "channel '{}' already exists",
                channel.id
            )));
        }
        channels.insert(channel.id.clone(), channel);
        Ok(())
    }

    pub fn endpoint_status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.endpoints.read().get(agent_id).map(|e| e.status)
    }

    pub fn set_endpoint_status(&self, agent_id: &str, status: AgentStatus) -> Result<()> {
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints
            .get_mut(agent_id)
            .ok_or_else(|| CoordError::UnknownRecipient(agent_id.to_string()))?;
        endpoint.status = status;
        Ok(())
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.endpoints.read().keys().cloned().collect()
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.endpoints.read().contains_key(agent_id)
    }

    pub fn stats(&self) -> FabricStats {
        let endpoints = self.endpoints.read();
        let history = self.history.read();

        let mut by_kind: HashMap<&'static str, usize> = HashMap::new();
        for msg in history.iter() {
            *by_kind.entry(msg.kind.as_str()).or_insert(0) += 1;
        }

        FabricStats {
            endpoint_count: endpoints.len(),
            online_count: endpoints
                .values()
                .filter(|e| e.status == AgentStatus::Online)
                .count(),
            queued_total: endpoints.values().map(Endpoint::queue_len).sum(),
            history_len: history.len(),
            by_kind,
        }
    }

    /// One liveness cycle: heartbeat broadcast, offline detection, and
    /// TTL purge across queues and history.
    ///
    /// Re-entrant calls are skipped; only one sweep runs at a time.
    pub fn sweep(&self) {
        if self
            .sweep_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already in progress, skipping cycle");
            return;
        }

        let heartbeat = Message::heartbeat(FABRIC_SENDER, BROADCAST_CHANNEL)
            .with_ttl(self.config.heartbeat_interval_secs * 2);
        if let Err(e) = self.broadcast(heartbeat) {
            debug!(error = %e, "Heartbeat reached no recipients");
        }

        let now = Utc::now();
        let offline_threshold = (self.config.heartbeat_interval_secs * 2) as i64;
        let mut gone_offline = Vec::new();
        let mut purged = 0usize;

        {
            let mut endpoints = self.endpoints.write();
            for endpoint in endpoints.values_mut() {
                purged += endpoint.purge_expired(now);
                if endpoint.status == AgentStatus::Online
                    && endpoint.seconds_since_seen(now) > offline_threshold
                {
                    endpoint.status = AgentStatus::Offline;
                    gone_offline.push((endpoint.agent_id.clone(), endpoint.last_seen));
                }
            }
        }

        {
            let mut history = self.history.write();
            let before = history.len();
            history.retain(|m| !m.is_expired(now));
            purged += before - history.len();
        }

        for (agent_id, last_seen) in gone_offline {
            warn!(agent = %agent_id, "Agent marked offline");
            self.events.publish(CoordEvent::AgentOffline {
                agent_id,
                last_seen,
            });
        }

        if purged > 0 {
            debug!(purged, "Expired messages purged");
        }

        self.sweep_in_progress.store(false, Ordering::Release);
    }

    fn validate(&self, message: &Message) -> Result<()> {
        if message.from.is_empty() {
            return Err(CoordError::InvalidMessage("missing sender".into()));
        }
        if message.to.is_empty() {
            return Err(CoordError::InvalidMessage("missing recipient".into()));
        }
        if message.channel.is_empty() {
            return Err(CoordError::InvalidMessage("missing channel".into()));
        }
        if message.payload.is_null() {
            return Err(CoordError::InvalidMessage("missing payload".into()));
        }
        Ok(())
    }

    fn record_history(&self, message: Message) {
        let mut history = self.history.write();
        history.push_back(message);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }
}
