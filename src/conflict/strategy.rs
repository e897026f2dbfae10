//! Per-kind resolution strategies.
//!
//! Each strategy is a pure `Conflict -> Resolution` function behind the
//! [`ResolutionStrategy`] trait, dispatched through a registry keyed by
//! conflict kind. Hosts may override any built-in by registering their own.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use super::types::{
    ActionKind, Conflict, ConflictKind, EstimatedImpact, Resolution, ResolutionAction,
};
use crate::error::{CoordError, Result};

/// Duration of the shared window granted by resource sharing.
const SHARING_WINDOW_SECS: u64 = 3600;
/// Stagger applied per precedence rank when reordering priorities.
const PRIORITY_STAGGER_SECS: u64 = 600;
/// Stagger applied per rank for timing conflicts.
const TIMING_STAGGER_SECS: u64 = 900;

const ENGINE_APPROVER: &str = "conflict-engine";

pub trait ResolutionStrategy: Send + Sync {
    fn label(&self) -> &'static str;
    fn resolve(&self, conflict: &Conflict) -> Result<Resolution>;
}

/// Registry mapping conflict kinds to their strategies.
pub struct StrategyRegistry {
    strategies: HashMap<ConflictKind, Arc<dyn ResolutionStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry with all five built-in strategies installed.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(ConflictKind::Resource, Arc::new(ResourceSharing));
        registry.register(ConflictKind::Priority, Arc::new(PriorityOrdering::default()));
        registry.register(ConflictKind::Dependency, Arc::new(DependencyRescheduling));
        registry.register(ConflictKind::Timing, Arc::new(TimingStagger));
        registry.register(ConflictKind::Data, Arc::new(LastWriteWinsMerge));
        registry
    }

    pub fn register(&mut self, kind: ConflictKind, strategy: Arc<dyn ResolutionStrategy>) {
        self.strategies.insert(kind, strategy);
    }

    pub fn get(&self, kind: ConflictKind) -> Result<Arc<dyn ResolutionStrategy>> {
        self.strategies
            .get(&kind)
            .cloned()
            .ok_or_else(|| CoordError::NoStrategy(kind.as_str().to_string()))
    }

    pub fn has(&self, kind: ConflictKind) -> bool {
        self.strategies.contains_key(&kind)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn resolution(
    label: &str,
    actions: Vec<ResolutionAction>,
    impact: EstimatedImpact,
) -> Resolution {
    Resolution {
        strategy: label.to_string(),
        actions,
        estimated_impact: impact,
        approver: ENGINE_APPROVER.to_string(),
        timestamp: Utc::now(),
    }
}

/// Splits contested resources evenly across participants for a fixed
/// one-hour window.
pub struct ResourceSharing;

impl ResolutionStrategy for ResourceSharing {
    fn label(&self) -> &'static str {
        "resource-sharing"
    }

    fn resolve(&self, conflict: &Conflict) -> Result<Resolution> {
        if conflict.participants.is_empty() {
            return Err(CoordError::ResolutionFailed(
                "resource conflict has no participants".into(),
            ));
        }

        let share = 1.0 / conflict.participants.len() as f64;
        let actions = conflict
            .participants
            .iter()
            .enumerate()
            .map(|(i, participant)| {
                ResolutionAction::new(
                    ActionKind::Allocate,
                    participant.clone(),
                    json!({
                        "resources": conflict.context.resources,
                        "share": share,
                        "window_secs": SHARING_WINDOW_SECS,
                    }),
                    i as u32,
                )
            })
            .collect();

        Ok(resolution(
            self.label(),
            actions,
            EstimatedImpact {
                time_delay_secs: 0,
                resource_cost: 0.0,
                quality_delta: -0.05,
                affected_stakeholders: conflict.participants.clone(),
            },
        ))
    }
}

/// Reorders participants by a precedence list and staggers their
/// execution windows by a fixed offset per rank. Participants not on the
/// list keep their supplied order after the listed ones.
#[derive(Default)]
pub struct PriorityOrdering {
    precedence: Vec<String>,
}

impl PriorityOrdering {
    pub fn with_precedence(precedence: Vec<String>) -> Self {
        Self { precedence }
    }

    fn rank(&self, participant: &str, supplied_index: usize) -> (usize, usize) {
        match self.precedence.iter().position(|p| p == participant) {
            Some(pos) => (0, pos),
            None => (1, supplied_index),
        }
    }
}

impl ResolutionStrategy for PriorityOrdering {
    fn label(&self) -> &'static str {
        "priority"
    }

    fn resolve(&self, conflict: &Conflict) -> Result<Resolution> {
        let mut ordered: Vec<(usize, &String)> =
            conflict.participants.iter().enumerate().collect();
        ordered.sort_by_key(|(i, p)| self.rank(p, *i));

        let actions = ordered
            .iter()
            .enumerate()
            .map(|(rank, (_, participant))| {
                ResolutionAction::new(
                    ActionKind::Reschedule,
                    (*participant).clone(),
                    json!({
                        "rank": rank,
                        "offset_secs": rank as u64 * PRIORITY_STAGGER_SECS,
                    }),
                    rank as u32,
                )
            })
            .collect();

        let max_delay = conflict.participants.len().saturating_sub(1) as u64
            * PRIORITY_STAGGER_SECS;

        Ok(resolution(
            self.label(),
            actions,
            EstimatedImpact {
                time_delay_secs: max_delay,
                resource_cost: 0.0,
                quality_delta: 0.0,
                affected_stakeholders: conflict.participants.clone(),
            },
        ))
    }
}

/// Bisects the conflict's task ids into a blocking first half and a
/// blocked second half, rescheduling the blocked tasks after the blocking
/// set. A deterministic split of the supplied order, not graph analysis.
pub struct DependencyRescheduling;

impl ResolutionStrategy for DependencyRescheduling {
    fn label(&self) -> &'static str {
        "rescheduling"
    }

    fn resolve(&self, conflict: &Conflict) -> Result<Resolution> {
        let tasks = &conflict.context.task_ids;
        if tasks.is_empty() {
            return Err(CoordError::ResolutionFailed(
                "dependency conflict carries no task ids".into(),
            ));
        }

        let mid = tasks.len().div_ceil(2);
        let (blocking, blocked) = tasks.split_at(mid);

        let mut actions = Vec::with_capacity(tasks.len());
        for (i, task) in blocking.iter().enumerate() {
            actions.push(ResolutionAction::new(
                ActionKind::Reschedule,
                task.clone(),
                json!({ "phase": "blocking", "order": i }),
                i as u32,
            ));
        }
        for (i, task) in blocked.iter().enumerate() {
            actions.push(ResolutionAction::new(
                ActionKind::Reschedule,
                task.clone(),
                json!({ "phase": "blocked", "order": i, "depends_on": blocking }),
                (blocking.len() + i) as u32,
            ));
        }

        Ok(resolution(
            self.label(),
            actions,
            EstimatedImpact {
                time_delay_secs: blocked.len() as u64 * TIMING_STAGGER_SECS,
                resource_cost: 0.0,
                quality_delta: 0.0,
                affected_stakeholders: conflict.participants.clone(),
            },
        ))
    }
}

/// Staggers participants by a fixed increment per rank while preserving
/// each participant's original duration and dependency ordering.
pub struct TimingStagger;

impl ResolutionStrategy for TimingStagger {
    fn label(&self) -> &'static str {
        "rescheduling"
    }

    fn resolve(&self, conflict: &Conflict) -> Result<Resolution> {
        let actions = conflict
            .participants
            .iter()
            .enumerate()
            .map(|(rank, participant)| {
                ResolutionAction::new(
                    ActionKind::Reschedule,
                    participant.clone(),
                    json!({
                        "offset_secs": rank as u64 * TIMING_STAGGER_SECS,
                        "preserve_duration": true,
                        "preserve_dependencies": true,
                    }),
                    rank as u32,
                )
            })
            .collect();

        let max_delay = conflict.participants.len().saturating_sub(1) as u64
            * TIMING_STAGGER_SECS;

        Ok(resolution(
            self.label(),
            actions,
            EstimatedImpact {
                time_delay_secs: max_delay,
                resource_cost: 0.0,
                quality_delta: 0.0,
                affected_stakeholders: conflict.participants.clone(),
            },
        ))
    }
}

/// Last-write-wins merge against the shared data store: back up first,
/// merge, then notify every participant.
pub struct LastWriteWinsMerge;

impl ResolutionStrategy for LastWriteWinsMerge {
    fn label(&self) -> &'static str {
        "merge"
    }

    fn resolve(&self, conflict: &Conflict) -> Result<Resolution> {
        let store = conflict
            .context
            .resources
            .first()
            .cloned()
            .unwrap_or_else(|| "shared-data".to_string());

        let mut actions = vec![
            ResolutionAction::new(
                ActionKind::Backup,
                store.clone(),
                json!({ "reason": "pre-merge snapshot" }),
                0,
            ),
            ResolutionAction::new(
                ActionKind::Merge,
                store,
                json!({
                    "policy": "last-write-wins",
                    "data": conflict.context.shared_data,
                }),
                1,
            ),
        ];
        for (i, participant) in conflict.participants.iter().enumerate() {
            actions.push(ResolutionAction::new(
                ActionKind::Notify,
                participant.clone(),
                json!({ "event": "data-merged" }),
                (2 + i) as u32,
            ));
        }

        Ok(resolution(
            self.label(),
            actions,
            EstimatedImpact {
                time_delay_secs: 0,
                resource_cost: 0.0,
                quality_delta: -0.1,
                affected_stakeholders: conflict.participants.clone(),
            },
        ))
    }
}
