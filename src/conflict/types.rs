//! Conflict records, resolution artifacts, and the lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Resource,
    Priority,
    Dependency,
    Timing,
    Data,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Priority => "priority",
            Self::Dependency => "dependency",
            Self::Timing => "timing",
            Self::Data => "data",
        }
    }
}

/// Severity ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Lifecycle: `detected -> analyzing -> resolving -> resolved | escalated`,
/// with `resolving -> analyzing` allowed for bounded retry cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Detected,
    Analyzing,
    Resolving,
    Resolved,
    Escalated,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Analyzing => "analyzing",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Escalated)
    }

    pub fn can_transition_to(&self, next: ConflictStatus) -> bool {
        matches!(
            (self, next),
            (Self::Detected, Self::Analyzing)
                | (Self::Analyzing, Self::Resolving)
                | (Self::Analyzing, Self::Escalated)
                | (Self::Resolving, Self::Resolved)
                | (Self::Resolving, Self::Escalated)
                | (Self::Resolving, Self::Analyzing)
        )
    }
}

/// Free-form context attached at detection time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictContext {
    /// Resources under contention (pool ids, files, shared stores).
    pub resources: Vec<String>,
    /// Task ids involved, in caller-supplied order.
    pub task_ids: Vec<String>,
    /// Optional contention window.
    pub window: Option<TimeWindow>,
    /// Shared data snapshot for data conflicts.
    pub shared_data: Option<Value>,
}

impl ConflictContext {
    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_task_ids(mut self, task_ids: Vec<String>) -> Self {
        self.task_ids = task_ids;
        self
    }

    pub fn with_shared_data(mut self, data: Value) -> Self {
        self.shared_data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Allocate,
    Reassign,
    Reschedule,
    Merge,
    Backup,
    Notify,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocate => "allocate",
            Self::Reassign => "reassign",
            Self::Reschedule => "reschedule",
            Self::Merge => "merge",
            Self::Backup => "backup",
            Self::Notify => "notify",
        }
    }
}

/// One step of a resolution, executed in ordinal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub kind: ActionKind,
    /// Agent, task, or resource the action applies to.
    pub target: String,
    pub params: Value,
    pub ordinal: u32,
}

impl ResolutionAction {
    pub fn new(kind: ActionKind, target: impl Into<String>, params: Value, ordinal: u32) -> Self {
        Self {
            kind,
            target: target.into(),
            params,
            ordinal,
        }
    }
}

/// Advisory impact estimate reported by a strategy. Not re-validated by
/// the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimatedImpact {
    pub time_delay_secs: u64,
    pub resource_cost: f64,
    pub quality_delta: f64,
    pub affected_stakeholders: Vec<String>,
}

impl EstimatedImpact {
    pub fn accumulate(&mut self, other: &EstimatedImpact) {
        self.time_delay_secs += other.time_delay_secs;
        self.resource_cost += other.resource_cost;
        self.quality_delta += other.quality_delta;
        for stakeholder in &other.affected_stakeholders {
            if !self.affected_stakeholders.contains(stakeholder) {
                self.affected_stakeholders.push(stakeholder.clone());
            }
        }
    }
}

/// The chosen strategy and resulting actions. Immutable once attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub strategy: String,
    pub actions: Vec<ResolutionAction>,
    pub estimated_impact: EstimatedImpact,
    pub approver: String,
    pub timestamp: DateTime<Utc>,
}

/// Record of one failed resolution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAttempt {
    pub attempt: u32,
    pub strategy: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub participants: Vec<String>,
    pub context: ConflictContext,
    pub description: String,
    pub status: ConflictStatus,
    pub attempts: Vec<ResolutionAttempt>,
    pub resolution: Option<Resolution>,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    pub fn new(
        kind: ConflictKind,
        participants: Vec<String>,
        context: ConflictContext,
        description: impl Into<String>,
        severity: ConflictSeverity,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            severity,
            participants,
            context,
            description: description.into(),
            status: ConflictStatus::Detected,
            attempts: Vec::new(),
            resolution: None,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn resolution_latency_secs(&self) -> Option<f64> {
        self.resolved_at
            .map(|at| (at - self.detected_at).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use ConflictStatus::*;
        assert!(Detected.can_transition_to(Analyzing));
        assert!(Analyzing.can_transition_to(Resolving));
        assert!(Resolving.can_transition_to(Resolved));
        assert!(Resolving.can_transition_to(Analyzing));
        assert!(Resolving.can_transition_to(Escalated));
        assert!(Analyzing.can_transition_to(Escalated));

        // Never skips the middle states.
        assert!(!Detected.can_transition_to(Resolved));
        assert!(!Detected.can_transition_to(Resolving));
        // Terminal states are final.
        assert!(!Resolved.can_transition_to(Analyzing));
        assert!(!Escalated.can_transition_to(Analyzing));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConflictStatus::Resolved.is_terminal());
        assert!(ConflictStatus::Escalated.is_terminal());
        assert!(!ConflictStatus::Resolving.is_terminal());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ConflictSeverity::Critical > ConflictSeverity::High);
        assert!(ConflictSeverity::Medium > ConflictSeverity::Low);
    }

    #[test]
    fn test_impact_accumulation() {
        let mut total = EstimatedImpact::default();
        total.accumulate(&EstimatedImpact {
            time_delay_secs: 600,
            resource_cost: 2.0,
            quality_delta: -0.1,
            affected_stakeholders: vec!["x".into(), "y".into()],
        });
        total.accumulate(&EstimatedImpact {
            time_delay_secs: 300,
            resource_cost: 1.0,
            quality_delta: 0.05,
            affected_stakeholders: vec!["y".into(), "z".into()],
        });

        assert_eq!(total.time_delay_secs, 900);
        assert_eq!(total.affected_stakeholders.len(), 3);
        assert!((total.resource_cost - 3.0).abs() < f64::EPSILON);
    }
}
