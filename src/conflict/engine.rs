//! Conflict lifecycle engine: detection, strategy-driven resolution,
//! bounded retries, and escalation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::strategy::{ResolutionStrategy, StrategyRegistry};
use super::types::{
    ActionKind, Conflict, ConflictContext, ConflictKind, ConflictSeverity, ConflictStatus,
    EstimatedImpact, Resolution, ResolutionAction, ResolutionAttempt,
};
use crate::config::ConflictConfig;
use crate::error::{CoordError, Result};
use crate::events::{CoordEvent, EventBus};
use crate::fabric::{COORDINATION_CHANNEL, Message, MessageFabric};

const ENGINE_SENDER: &str = "conflict-engine";

/// Executes the individual actions of a resolution.
///
/// The default [`FabricExecutor`] delivers `notify` actions through the
/// fabric and acknowledges the rest; hosts that want reschedules or
/// reallocations applied directly can inject their own executor.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, conflict: &Conflict, action: &ResolutionAction) -> Result<()>;
}

pub struct FabricExecutor {
    fabric: Arc<MessageFabric>,
}

impl FabricExecutor {
    pub fn new(fabric: Arc<MessageFabric>) -> Self {
        Self { fabric }
    }
}

impl ActionExecutor for FabricExecutor {
    fn execute(&self, conflict: &Conflict, action: &ResolutionAction) -> Result<()> {
        match action.kind {
            ActionKind::Notify => {
                let message = Message::notification(
                    ENGINE_SENDER,
                    action.target.clone(),
                    COORDINATION_CHANNEL,
                    serde_json::json!({
                        "conflict_id": conflict.id,
                        "action": action.kind.as_str(),
                        "params": action.params,
                    }),
                );
                self.fabric.send(message)
            }
            _ => {
                debug!(
                    conflict = %conflict.id,
                    kind = action.kind.as_str(),
                    target = %action.target,
                    "Resolution action acknowledged"
                );
                Ok(())
            }
        }
    }
}

/// Aggregate read-only view over stored conflicts.
#[derive(Debug, Clone, Default)]
pub struct ConflictStats {
    pub total: usize,
    pub by_kind: HashMap<&'static str, usize>,
    pub by_severity: HashMap<&'static str, usize>,
    pub by_status: HashMap<&'static str, usize>,
    pub resolved: usize,
    pub escalated: usize,
    pub mean_resolution_secs: f64,
    pub total_impact: EstimatedImpact,
}

struct PendingResolution {
    conflict_id: String,
    due: Instant,
}

/// Removes the in-flight marker even on early return.
struct InFlightGuard<'a> {
    engine: &'a ConflictEngine,
    conflict_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.engine.in_flight.remove(&self.conflict_id);
    }
}

pub struct ConflictEngine {
    config: ConflictConfig,
    fabric: Arc<MessageFabric>,
    events: Arc<EventBus>,
    strategies: RwLock<StrategyRegistry>,
    executor: Arc<dyn ActionExecutor>,
    conflicts: RwLock<HashMap<String, Conflict>>,
    /// Resolved conflicts, oldest first. Bounded by config truncation.
    history: RwLock<VecDeque<Conflict>>,
    /// Per-conflict guard keeping resolution attempts strictly sequential.
    in_flight: DashMap<String, ()>,
    pending: Mutex<Vec<PendingResolution>>,
    cycle_in_progress: AtomicBool,
}

impl ConflictEngine {
    pub fn new(config: ConflictConfig, fabric: Arc<MessageFabric>, events: Arc<EventBus>) -> Self {
        let executor = Arc::new(FabricExecutor::new(Arc::clone(&fabric)));
        Self {
            config,
            fabric,
            events,
            strategies: RwLock::new(StrategyRegistry::with_defaults()),
            executor,
            conflicts: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            in_flight: DashMap::new(),
            pending: Mutex::new(Vec::new()),
            cycle_in_progress: AtomicBool::new(false),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn register_strategy(&self, kind: ConflictKind, strategy: Arc<dyn ResolutionStrategy>) {
        self.strategies.write().register(kind, strategy);
    }

    /// Record a new conflict and, unless it is critical, schedule a
    /// deferred automatic resolution attempt so detection never blocks
    /// on resolution.
    pub fn detect_conflict(
        &self,
        kind: ConflictKind,
        participants: Vec<String>,
        context: ConflictContext,
        description: impl Into<String>,
        severity: ConflictSeverity,
    ) -> Result<String> {
        if participants.is_empty() {
            return Err(CoordError::Coordination(
                "conflict requires at least one participant".into(),
            ));
        }

        let conflict = Conflict::new(kind, participants.clone(), context, description, severity);
        let conflict_id = conflict.id.clone();

        self.conflicts
            .write()
            .insert(conflict_id.clone(), conflict);

        self.events.publish(CoordEvent::ConflictDetected {
            conflict_id: conflict_id.clone(),
            kind: kind.as_str().to_string(),
            severity: severity.as_str().to_string(),
            participants,
        });

        if severity != ConflictSeverity::Critical {
            self.schedule_resolution(&conflict_id);
        }

        info!(
            conflict = %conflict_id,
            kind = kind.as_str(),
            severity = severity.as_str(),
            "Conflict detected"
        );
        Ok(conflict_id)
    }

    /// Run one full resolution attempt: `analyzing` -> strategy lookup ->
    /// `resolving` -> action execution -> `resolved`, or the bounded
    /// retry/escalation path on failure.
    pub fn resolve_conflict(&self, conflict_id: &str) -> Result<Resolution> {
        if self.in_flight.insert(conflict_id.to_string(), ()).is_some() {
            return Err(CoordError::Coordination(format!(
                "resolution already in progress for conflict '{}'",
                conflict_id
            )));
        }
        let _guard = InFlightGuard {
            engine: self,
            conflict_id: conflict_id.to_string(),
        };

        let mut conflict = self
            .get(conflict_id)
            .ok_or_else(|| CoordError::ConflictNotFound(conflict_id.to_string()))?;

        if conflict.status.is_terminal() {
            return Err(CoordError::InvalidConflictTransition {
                from: conflict.status.as_str().to_string(),
                to: ConflictStatus::Analyzing.as_str().to_string(),
            });
        }

        conflict.status = ConflictStatus::Analyzing;
        self.store(conflict.clone());

        let strategy = match self.strategies.read().get(conflict.kind) {
            Ok(strategy) => strategy,
            Err(e) => {
                // No handler will ever appear mid-retry; escalate directly.
                self.record_failure(&mut conflict, "none", &e.to_string(), true);
                return Err(e);
            }
        };

        conflict.status = ConflictStatus::Resolving;
        self.store(conflict.clone());

        let resolution = match strategy.resolve(&conflict) {
            Ok(resolution) => resolution,
            Err(e) => {
                self.record_failure(&mut conflict, strategy.label(), &e.to_string(), false);
                return Err(e);
            }
        };

        let mut actions = resolution.actions.clone();
        actions.sort_by_key(|a| a.ordinal);
        for action in &actions {
            if let Err(e) = self.executor.execute(&conflict, action) {
                let reason = format!(
                    "action {} ({}) on '{}' failed: {}",
                    action.ordinal,
                    action.kind.as_str(),
                    action.target,
                    e
                );
                self.record_failure(&mut conflict, strategy.label(), &reason, false);
                return Err(CoordError::ResolutionFailed(reason));
            }
        }

        conflict.status = ConflictStatus::Resolved;
        conflict.resolution = Some(resolution.clone());
        conflict.resolved_at = Some(Utc::now());
        self.store(conflict.clone());
        self.push_history(conflict.clone());
        self.notify_participants(&conflict, &resolution);

        self.events.publish(CoordEvent::ConflictResolved {
            conflict_id: conflict.id.clone(),
            strategy: resolution.strategy.clone(),
            attempts: conflict.attempt_count() + 1,
        });

        info!(
            conflict = %conflict.id,
            strategy = %resolution.strategy,
            actions = resolution.actions.len(),
            "Conflict resolved"
        );
        Ok(resolution)
    }

    /// One pass of the deferred auto-resolution loop: attempt every
    /// scheduled conflict whose delay has elapsed. Overlapping cycles
    /// are skipped.
    pub fn run_auto_resolution_cycle(&self) {
        if self
            .cycle_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Auto-resolution cycle already running, skipping");
            return;
        }

        let now = Instant::now();
        let due: Vec<String> = {
            let mut pending = self.pending.lock();
            let (ready, later): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|p| p.due <= now);
            *pending = later;
            ready.into_iter().map(|p| p.conflict_id).collect()
        };

        for conflict_id in due {
            match self.resolve_conflict(&conflict_id) {
                Ok(_) => {}
                Err(e) => debug!(conflict = %conflict_id, error = %e, "Auto-resolution attempt failed"),
            }
        }

        self.cycle_in_progress.store(false, Ordering::Release);
    }

    pub fn get(&self, conflict_id: &str) -> Option<Conflict> {
        self.conflicts.read().get(conflict_id).cloned()
    }

    pub fn active_conflicts(&self) -> Vec<Conflict> {
        self.conflicts
            .read()
            .values()
            .filter(|c| !c.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Whether any scheduled auto-resolution work remains.
    pub fn has_pending_resolutions(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    pub fn statistics(&self) -> ConflictStats {
        let conflicts = self.conflicts.read();
        let history = self.history.read();

        let mut stats = ConflictStats {
            total: conflicts.len(),
            ..Default::default()
        };

        for conflict in conflicts.values() {
            *stats.by_kind.entry(conflict.kind.as_str()).or_insert(0) += 1;
            *stats
                .by_severity
                .entry(conflict.severity.as_str())
                .or_insert(0) += 1;
            *stats
                .by_status
                .entry(conflict.status.as_str())
                .or_insert(0) += 1;
            match conflict.status {
                ConflictStatus::Resolved => stats.resolved += 1,
                ConflictStatus::Escalated => stats.escalated += 1,
                _ => {}
            }
        }

        let latencies: Vec<f64> = history
            .iter()
            .filter_map(Conflict::resolution_latency_secs)
            .collect();
        if !latencies.is_empty() {
            stats.mean_resolution_secs = latencies.iter().sum::<f64>() / latencies.len() as f64;
        }

        for conflict in history.iter() {
            if let Some(resolution) = &conflict.resolution {
                stats.total_impact.accumulate(&resolution.estimated_impact);
            }
        }

        stats
    }

    /// Drop conflicts resolved longer ago than the configured retention
    /// and truncate history past its limit.
    pub fn prune(&self) -> usize {
        let cutoff =
            Utc::now() - chrono::Duration::seconds(self.config.prune_resolved_after_secs as i64);

        let removed = {
            let mut conflicts = self.conflicts.write();
            let before = conflicts.len();
            conflicts.retain(|_, c| {
                c.status != ConflictStatus::Resolved
                    || c.resolved_at.map(|at| at > cutoff).unwrap_or(true)
            });
            before - conflicts.len()
        };

        {
            let mut history = self.history.write();
            if history.len() > self.config.history_limit {
                let excess = history.len() - self.config.history_retain;
                history.drain(..excess);
            }
        }

        if removed > 0 {
            debug!(removed, "Pruned resolved conflicts");
        }
        removed
    }

    fn schedule_resolution(&self, conflict_id: &str) {
        self.pending.lock().push(PendingResolution {
            conflict_id: conflict_id.to_string(),
            due: Instant::now() + Duration::from_millis(self.config.auto_resolve_delay_ms),
        });
    }

    /// Append a failed attempt and either cycle back to `analyzing` for a
    /// retry or force escalation when the budget is spent, the severity
    /// is critical, or retrying is pointless.
    fn record_failure(
        &self,
        conflict: &mut Conflict,
        strategy_label: &str,
        error: &str,
        force_escalation: bool,
    ) {
        conflict.attempts.push(ResolutionAttempt {
            attempt: conflict.attempt_count() + 1,
            strategy: strategy_label.to_string(),
            error: error.to_string(),
            at: Utc::now(),
        });

        let exhausted = conflict.attempt_count() >= self.config.max_resolution_attempts;
        let escalate =
            force_escalation || exhausted || conflict.severity == ConflictSeverity::Critical;

        if escalate {
            conflict.status = ConflictStatus::Escalated;
            self.store(conflict.clone());
            warn!(
                conflict = %conflict.id,
                attempts = conflict.attempt_count(),
                error,
                "Conflict escalated"
            );
            self.events.publish(CoordEvent::ConflictEscalated {
                conflict_id: conflict.id.clone(),
                reason: error.to_string(),
            });
        } else {
            conflict.status = ConflictStatus::Analyzing;
            self.store(conflict.clone());
            self.schedule_resolution(&conflict.id);
            debug!(
                conflict = %conflict.id,
                attempts = conflict.attempt_count(),
                error,
                "Resolution attempt failed, retry scheduled"
            );
        }
    }

    fn notify_participants(&self, conflict: &Conflict, resolution: &Resolution) {
        for participant in &conflict.participants {
            let message = Message::notification(
                ENGINE_SENDER,
                participant.clone(),
                COORDINATION_CHANNEL,
                serde_json::json!({
                    "event": "conflict-resolved",
                    "conflict_id": conflict.id,
                    "strategy": resolution.strategy,
                }),
            );
            if let Err(e) = self.fabric.send(message) {
                // Participant notification is best effort; one failed
                // delivery must not fail the resolution.
                warn!(participant = %participant, error = %e, "Failed to notify participant");
            }
        }
    }

    fn store(&self, conflict: Conflict) {
        self.conflicts.write().insert(conflict.id.clone(), conflict);
    }

    fn push_history(&self, conflict: Conflict) {
        let mut history = self.history.write();
        history.push_back(conflict);
        if history.len() > self.config.history_limit {
            let excess = history.len() - self.config.history_retain;
            history.drain(..excess);
        }
    }
}
