//! Conflict engine: detection, strategy-driven resolution with bounded
//! retries, and escalation when automation gives up.
//!
//! Depends only on the fabric (for participant notification) and the
//! event bus. Resolution effects go through the [`ActionExecutor`] seam
//! so hosts can apply reschedules and reallocations themselves.

mod engine;
mod strategy;
mod types;

pub use engine::{ActionExecutor, ConflictEngine, ConflictStats, FabricExecutor};
pub use strategy::{
    DependencyRescheduling, LastWriteWinsMerge, PriorityOrdering, ResolutionStrategy,
    ResourceSharing, StrategyRegistry, TimingStagger,
};
pub use types::{
    ActionKind, Conflict, ConflictContext, ConflictKind, ConflictSeverity, ConflictStatus,
    EstimatedImpact, Resolution, ResolutionAction, ResolutionAttempt, TimeWindow,
};
