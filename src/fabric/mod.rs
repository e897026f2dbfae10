//! Message fabric: named channels, per-agent inbound queues, TTL expiry,
//! and periodic liveness sweeping.
//!
//! The fabric is the only component the conflict engine and allocator
//! depend on; it depends on nothing but the clock and the event bus.

mod channel;
mod endpoint;
#[allow(clippy::module_inception)]
mod fabric;
mod message;

pub use channel::{
    BROADCAST_CHANNEL, COORDINATION_CHANNEL, Channel, DeliveryMode, SYSTEM_CHANNEL,
    bootstrap_channels,
};
pub use endpoint::{AgentStatus, Endpoint};
pub use fabric::{BroadcastReport, FabricStats, MessageFabric};
pub use message::{
    BROADCAST_RECIPIENT, DEFAULT_PRIORITY, DEFAULT_TTL_SECS, Message, MessageKind,
};
