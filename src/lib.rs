//! agentmesh: an in-process coordination core for multi-agent systems.
//!
//! Three subsystems cooperate over one event bus:
//! - [`fabric`]: channel-based message routing with TTL expiry and
//!   liveness sweeping
//! - [`conflict`]: conflict detection and strategy-driven resolution
//!   with bounded retries and escalation
//! - [`alloc`]: typed capacity pools, scored allocation, and
//!   policy-driven plus predictive scaling
//!
//! [`CoordinationCore`] wires them together and supervises their
//! periodic background tasks. All state is in-memory and
//! process-lifetime; persistence, if wanted, is the host's concern.

pub mod alloc;
pub mod config;
pub mod conflict;
pub mod error;
pub mod events;
pub mod fabric;
pub mod runtime;

pub use config::{AllocatorConfig, ConflictConfig, CoordConfig, FabricConfig};
pub use error::{CoordError, Result};
pub use events::{CoordEvent, EventBus};
pub use runtime::CoordinationCore;
