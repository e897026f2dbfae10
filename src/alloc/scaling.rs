//! Scaling policies: sustained-window triggers, bounded actions, and
//! cooldown throttling.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::pool::PerformanceSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMetric {
    Utilization,
    LatencyMs,
    Throughput,
    ErrorRate,
    Availability,
}

impl ScalingMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utilization => "utilization",
            Self::LatencyMs => "latency_ms",
            Self::Throughput => "throughput",
            Self::ErrorRate => "error_rate",
            Self::Availability => "availability",
        }
    }

    pub fn extract(&self, snapshot: &PerformanceSnapshot) -> f64 {
        match self {
            Self::Utilization => snapshot.utilization,
            Self::LatencyMs => snapshot.latency_ms,
            Self::Throughput => snapshot.throughput,
            Self::ErrorRate => snapshot.error_rate,
            Self::Availability => snapshot.availability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gte,
    Gt,
    Lte,
    Lt,
}

impl Comparator {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gte => value >= threshold,
            Self::Gt => value > threshold,
            Self::Lte => value <= threshold,
            Self::Lt => value < threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Average,
    Max,
    Min,
}

impl Aggregation {
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self {
            Self::Average => values.iter().sum::<f64>() / values.len() as f64,
            Self::Max => values.iter().cloned().fold(f64::MIN, f64::max),
            Self::Min => values.iter().cloned().fold(f64::MAX, f64::min),
        })
    }
}

/// One timestamped performance sample retained for trigger evaluation.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub at: DateTime<Utc>,
    pub snapshot: PerformanceSnapshot,
}

/// Fires when the aggregated metric satisfies the comparator over the
/// whole sustained window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingTrigger {
    pub metric: ScalingMetric,
    pub comparator: Comparator,
    pub threshold: f64,
    /// The condition must hold across this many seconds of history.
    pub sustained_secs: u64,
    pub aggregation: Aggregation,
}

impl ScalingTrigger {
    /// The trigger holds only when history covers the full sustained
    /// window; a freshly observed spike never fires on its own.
    pub fn holds(&self, history: &[MetricSample], now: DateTime<Utc>) -> bool {
        let window_start = now - Duration::seconds(self.sustained_secs as i64);

        let covered = history.first().map(|s| s.at <= window_start).unwrap_or(false);
        if !covered {
            return false;
        }

        let values: Vec<f64> = history
            .iter()
            .filter(|s| s.at >= window_start)
            .map(|s| self.metric.extract(&s.snapshot))
            .collect();

        match self.aggregation.apply(&values) {
            Some(aggregate) => self.comparator.holds(aggregate, self.threshold),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDirection {
    ScaleUp,
    ScaleDown,
}

impl ScalingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScaleUp => "scale-up",
            Self::ScaleDown => "scale-down",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingAction {
    pub direction: ScalingDirection,
    pub amount: f64,
}

/// A scaling rule bound to one pool. Fires at most once per cooldown
/// window, and only when every trigger holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub id: String,
    pub pool_id: String,
    pub triggers: Vec<ScalingTrigger>,
    pub actions: Vec<ScalingAction>,
    pub cooldown_secs: u64,
    pub enabled: bool,
    pub last_fired: Option<DateTime<Utc>>,
}

impl ScalingPolicy {
    pub fn new(id: impl Into<String>, pool_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pool_id: pool_id.into(),
            triggers: Vec::new(),
            actions: Vec::new(),
            cooldown_secs: 300,
            enabled: true,
            last_fired: None,
        }
    }

    pub fn with_trigger(mut self, trigger: ScalingTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_action(mut self, direction: ScalingDirection, amount: f64) -> Self {
        self.actions.push(ScalingAction { direction, amount });
        self
    }

    pub fn with_cooldown(mut self, cooldown_secs: u64) -> Self {
        self.cooldown_secs = cooldown_secs;
        self
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_fired {
            Some(fired) => now < fired + Duration::seconds(self.cooldown_secs as i64),
            None => false,
        }
    }

    /// Whether the policy should fire: enabled, out of cooldown, has at
    /// least one trigger, and every trigger holds.
    pub fn should_fire(&self, history: &[MetricSample], now: DateTime<Utc>) -> bool {
        self.enabled
            && !self.in_cooldown(now)
            && !self.triggers.is_empty()
            && self.triggers.iter().all(|t| t.holds(history, now))
    }

    pub fn record_fired(&mut self, now: DateTime<Utc>) {
        self.last_fired = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(secs_ago: i64, utilization: f64) -> MetricSample {
        MetricSample {
            at: Utc::now() - Duration::seconds(secs_ago),
            snapshot: PerformanceSnapshot {
                utilization,
                ..PerformanceSnapshot::default()
            },
        }
    }

    fn utilization_trigger(threshold: f64, sustained_secs: u64) -> ScalingTrigger {
        ScalingTrigger {
            metric: ScalingMetric::Utilization,
            comparator: Comparator::Gte,
            threshold,
            sustained_secs,
            aggregation: Aggregation::Average,
        }
    }

    #[test]
    fn test_trigger_requires_full_window_coverage() {
        let trigger = utilization_trigger(0.8, 300);
        let now = Utc::now();

        // History only reaches back 100s: spike must not fire.
        let short = vec![sample(100, 0.95), sample(50, 0.95), sample(10, 0.95)];
        assert!(!trigger.holds(&short, now));

        // Full 300s of sustained high utilization fires.
        let sustained = vec![
            sample(320, 0.85),
            sample(200, 0.85),
            sample(100, 0.85),
            sample(10, 0.85),
        ];
        assert!(trigger.holds(&sustained, now));
    }

    #[test]
    fn test_trigger_aggregation_average() {
        let trigger = utilization_trigger(0.8, 300);
        let now = Utc::now();

        // One dip pulls the average below threshold.
        let mixed = vec![
            sample(320, 0.9),
            sample(200, 0.9),
            sample(100, 0.3),
            sample(10, 0.9),
        ];
        assert!(!trigger.holds(&mixed, now));
    }

    #[test]
    fn test_comparators() {
        assert!(Comparator::Gte.holds(0.8, 0.8));
        assert!(!Comparator::Gt.holds(0.8, 0.8));
        assert!(Comparator::Lte.holds(0.8, 0.8));
        assert!(Comparator::Lt.holds(0.7, 0.8));
    }

    #[test]
    fn test_policy_cooldown_suppresses_refire() {
        let now = Utc::now();
        let history = vec![sample(320, 0.9), sample(150, 0.9), sample(10, 0.9)];

        let mut policy = ScalingPolicy::new("policy-1", "pool-1")
            .with_trigger(utilization_trigger(0.8, 300))
            .with_action(ScalingDirection::ScaleUp, 20.0)
            .with_cooldown(600);

        assert!(policy.should_fire(&history, now));
        policy.record_fired(now);
        assert!(!policy.should_fire(&history, now + Duration::seconds(100)));
        assert!(policy.should_fire(&history, now + Duration::seconds(601)));
    }

    #[test]
    fn test_disabled_policy_never_fires() {
        let now = Utc::now();
        let history = vec![sample(320, 0.9), sample(10, 0.9)];
        let mut policy = ScalingPolicy::new("policy-1", "pool-1")
            .with_trigger(utilization_trigger(0.8, 300))
            .with_action(ScalingDirection::ScaleUp, 20.0);
        policy.enabled = false;
        assert!(!policy.should_fire(&history, now));
    }

    #[test]
    fn test_policy_without_triggers_never_fires() {
        let policy = ScalingPolicy::new("policy-1", "pool-1")
            .with_action(ScalingDirection::ScaleUp, 20.0);
        assert!(!policy.should_fire(&[], Utc::now()));
    }
}
