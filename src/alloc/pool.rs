//! Typed capacity pools and their reservation arithmetic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoordError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Compute,
    Memory,
    Storage,
    Network,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Memory => "memory",
            Self::Storage => "storage",
            Self::Network => "network",
        }
    }
}

/// Affinity of a pool towards a specific agent, expressed as a scoring
/// preference rather than a hard filter. Hard exclusion lives in
/// [`PoolConstraints::exclusions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityKind {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityRule {
    pub agent_id: String,
    pub kind: AffinityKind,
}

/// Static limits governing allocation sizes and scaling headroom.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConstraints {
    /// Smallest allocation the pool accepts.
    pub min_allocation: f64,
    /// Largest single allocation the pool accepts.
    pub max_allocation: f64,
    /// Capacity floor for scale-down.
    pub min_capacity: f64,
    /// Capacity ceiling for scale-up.
    pub max_capacity: f64,
    pub affinities: Vec<AffinityRule>,
    /// Agents that may never allocate from this pool.
    pub exclusions: Vec<String>,
}

impl Default for PoolConstraints {
    fn default() -> Self {
        Self {
            min_allocation: 0.0,
            max_allocation: f64::MAX,
            min_capacity: 0.0,
            max_capacity: f64::MAX,
            affinities: Vec::new(),
            exclusions: Vec::new(),
        }
    }
}

impl PoolConstraints {
    pub fn excludes(&self, agent_id: &str) -> bool {
        self.exclusions.iter().any(|a| a == agent_id)
    }

    /// Affinity score for scoring: required 1.0, preferred 0.8,
    /// discouraged 0.2, no rule 0.5.
    pub fn affinity_score(&self, agent_id: &str) -> f64 {
        match self
            .affinities
            .iter()
            .find(|r| r.agent_id == agent_id)
            .map(|r| r.kind)
        {
            Some(AffinityKind::Required) => 1.0,
            Some(AffinityKind::Preferred) => 0.8,
            Some(AffinityKind::Discouraged) => 0.2,
            None => 0.5,
        }
    }
}

/// Live performance view of a pool. Utilization is derived from capacity;
/// the remaining fields are host-reported telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSnapshot {
    /// Fraction of total capacity in use, 0.0 to 1.0.
    pub utilization: f64,
    pub latency_ms: f64,
    pub throughput: f64,
    /// Fraction of failed operations, 0.0 to 1.0.
    pub error_rate: f64,
    /// Fraction of time the pool was reachable, 0.0 to 1.0.
    pub availability: f64,
    pub measured_at: DateTime<Utc>,
}

impl Default for PerformanceSnapshot {
    fn default() -> Self {
        Self {
            utilization: 0.0,
            latency_ms: 0.0,
            throughput: 0.0,
            error_rate: 0.0,
            availability: 1.0,
            measured_at: Utc::now(),
        }
    }
}

impl PerformanceSnapshot {
    /// Composite health score blending headroom, availability, and
    /// error rate into one 0.0 to 1.0 figure.
    pub fn composite(&self) -> f64 {
        let headroom = 1.0 - self.utilization.clamp(0.0, 1.0);
        let reliability = 1.0 - self.error_rate.clamp(0.0, 1.0);
        headroom * 0.4 + self.availability.clamp(0.0, 1.0) * 0.4 + reliability * 0.2
    }
}

/// A typed, capacity-bounded shared resource.
///
/// `available + reserved <= total` holds at all times; reservation and
/// release mutate both sides under the owning allocator's pool lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    pub id: String,
    pub resource_type: ResourceType,
    pub total: f64,
    pub available: f64,
    pub reserved: f64,
    pub unit: String,
    pub cost_per_unit: f64,
    pub location: String,
    pub constraints: PoolConstraints,
    pub performance: PerformanceSnapshot,
}

impl ResourcePool {
    pub fn new(
        id: impl Into<String>,
        resource_type: ResourceType,
        total: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_type,
            total,
            available: total,
            reserved: 0.0,
            unit: unit.into(),
            cost_per_unit: 1.0,
            location: "default".to_string(),
            constraints: PoolConstraints::default(),
            performance: PerformanceSnapshot::default(),
        }
    }

    pub fn with_cost(mut self, cost_per_unit: f64) -> Self {
        self.cost_per_unit = cost_per_unit;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_constraints(mut self, constraints: PoolConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_performance(mut self, performance: PerformanceSnapshot) -> Self {
        self.performance = performance;
        self
    }

    pub fn utilization(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        ((self.total - self.available) / self.total).clamp(0.0, 1.0)
    }

    pub fn availability_ratio(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        (self.available / self.total).clamp(0.0, 1.0)
    }

    /// Whether this pool can serve a request of `amount` for `agent_id`
    /// at scoring time. Commit re-checks capacity under the pool lock.
    pub fn can_serve(&self, agent_id: &str, amount: f64) -> bool {
        !self.constraints.excludes(agent_id)
            && amount >= self.constraints.min_allocation
            && amount <= self.constraints.max_allocation
            && self.available >= amount
    }

    /// Atomically move `amount` from available to reserved. Re-checked at
    /// commit time: a no-op failure if capacity dropped since scoring.
    pub fn reserve(&mut self, amount: f64) -> Result<()> {
        if amount > self.available {
            return Err(CoordError::InsufficientCapacity {
                pool: self.id.clone(),
                requested: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        self.reserved += amount;
        Ok(())
    }

    /// Return reserved capacity to the available side.
    pub fn release(&mut self, amount: f64) {
        let amount = amount.min(self.reserved);
        self.reserved -= amount;
        self.available += amount;
    }

    /// Grow total and available capacity together, clamped to the
    /// constraint ceiling. Returns the amount actually applied.
    pub fn scale_up(&mut self, amount: f64) -> Result<f64> {
        let headroom = self.constraints.max_capacity - self.total;
        if headroom <= 0.0 {
            return Err(CoordError::ScalingRefused(format!(
                "pool '{}' is at its capacity ceiling",
                self.id
            )));
        }
        let applied = amount.min(headroom);
        self.total += applied;
        self.available += applied;
        Ok(applied)
    }

    /// Shrink total capacity, taking the removed amount out of available.
    /// Refused when it would cut into reserved capacity or drop below the
    /// constraint floor.
    pub fn scale_down(&mut self, amount: f64) -> Result<f64> {
        if amount > self.available {
            return Err(CoordError::ScalingRefused(format!(
                "pool '{}' has only {} available, cannot remove {}",
                self.id, self.available, amount
            )));
        }
        if self.total - amount < self.constraints.min_capacity {
            return Err(CoordError::ScalingRefused(format!(
                "pool '{}' would drop below its capacity floor",
                self.id
            )));
        }
        self.total -= amount;
        self.available -= amount;
        Ok(amount)
    }

    /// Refresh the derived part of the performance snapshot.
    pub fn refresh_utilization(&mut self) {
        self.performance.utilization = self.utilization();
        self.performance.measured_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ResourcePool {
        ResourcePool::new("pool-1", ResourceType::Compute, 100.0, "cores")
    }

    #[test]
    fn test_reserve_and_release_preserve_invariant() {
        let mut p = pool();
        p.reserve(80.0).unwrap();
        assert_eq!(p.available, 20.0);
        assert_eq!(p.reserved, 80.0);
        assert!((p.available + p.reserved - p.total).abs() < f64::EPSILON);

        p.release(80.0);
        assert_eq!(p.available, 100.0);
        assert_eq!(p.reserved, 0.0);
    }

    #[test]
    fn test_reserve_over_capacity_is_noop() {
        let mut p = pool();
        p.reserve(80.0).unwrap();

        let err = p.reserve(70.0).unwrap_err();
        assert!(matches!(err, CoordError::InsufficientCapacity { .. }));
        assert_eq!(p.available, 20.0);
        assert_eq!(p.reserved, 80.0);
    }

    #[test]
    fn test_release_never_exceeds_reserved() {
        let mut p = pool();
        p.reserve(10.0).unwrap();
        p.release(50.0);
        assert_eq!(p.reserved, 0.0);
        assert_eq!(p.available, 100.0);
    }

    #[test]
    fn test_scale_up_respects_ceiling() {
        let mut p = pool();
        p.constraints.max_capacity = 110.0;

        assert_eq!(p.scale_up(20.0).unwrap(), 10.0);
        assert_eq!(p.total, 110.0);
        assert_eq!(p.available, 110.0);
        assert!(p.scale_up(5.0).is_err());
    }

    #[test]
    fn test_scale_down_refused_beyond_available() {
        let mut p = pool();
        p.reserve(90.0).unwrap();
        assert!(matches!(
            p.scale_down(20.0),
            Err(CoordError::ScalingRefused(_))
        ));
        assert_eq!(p.total, 100.0);
    }

    #[test]
    fn test_scale_down_respects_floor() {
        let mut p = pool();
        p.constraints.min_capacity = 90.0;
        assert!(p.scale_down(20.0).is_err());
        assert_eq!(p.scale_down(10.0).unwrap(), 10.0);
        assert_eq!(p.total, 90.0);
    }

    #[test]
    fn test_affinity_scoring() {
        let mut p = pool();
        p.constraints.affinities = vec![
            AffinityRule {
                agent_id: "vip".into(),
                kind: AffinityKind::Required,
            },
            AffinityRule {
                agent_id: "casual".into(),
                kind: AffinityKind::Discouraged,
            },
        ];

        assert_eq!(p.constraints.affinity_score("vip"), 1.0);
        assert_eq!(p.constraints.affinity_score("casual"), 0.2);
        assert_eq!(p.constraints.affinity_score("other"), 0.5);
    }

    #[test]
    fn test_can_serve_applies_constraints() {
        let mut p = pool();
        p.constraints.min_allocation = 10.0;
        p.constraints.max_allocation = 50.0;
        p.constraints.exclusions = vec!["banned".into()];

        assert!(p.can_serve("a", 30.0));
        assert!(!p.can_serve("a", 5.0));
        assert!(!p.can_serve("a", 60.0));
        assert!(!p.can_serve("banned", 30.0));
    }

    #[test]
    fn test_utilization_derivation() {
        let mut p = pool();
        p.reserve(25.0).unwrap();
        p.refresh_utilization();
        assert!((p.performance.utilization - 0.25).abs() < 1e-9);
        assert!((p.availability_ratio() - 0.75).abs() < 1e-9);
    }
}
