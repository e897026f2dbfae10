//! Scoring-based allocation, atomic reservation, and the periodic
//! monitoring/scaling cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::allocation::{ResourceAllocation, ResourceRequirement};
use super::balancer::{BalancerProfile, BalancerRegistry, ScoreWeights};
use super::forecast::{
    Forecaster, PoolSnapshot, ScalingRecommendation, SystemSnapshot, UtilizationForecaster,
};
use super::pool::{PerformanceSnapshot, ResourcePool};
use super::scaling::{MetricSample, ScalingDirection, ScalingPolicy};
use crate::config::AllocatorConfig;
use crate::error::{CoordError, Result};
use crate::events::{CoordEvent, EventBus};

/// Scores within this distance are treated as tied.
const SCORE_EPSILON: f64 = 1e-9;

/// One requirement that could not be satisfied.
#[derive(Debug)]
pub struct RequirementFailure {
    pub requirement: ResourceRequirement,
    pub error: CoordError,
}

/// Per-requirement outcome of one `allocate` call. Partial success is
/// normal; callers must check which requirements were satisfied.
#[derive(Debug, Default)]
pub struct AllocationReport {
    pub granted: Vec<ResourceAllocation>,
    pub failed: Vec<RequirementFailure>,
}

impl AllocationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn allocation_ids(&self) -> Vec<String> {
        self.granted.iter().map(|a| a.id.clone()).collect()
    }
}

/// Aggregate capacity counters across all pools.
#[derive(Debug, Clone, Default)]
pub struct AllocatorStats {
    pub pool_count: usize,
    pub total_capacity: f64,
    pub total_available: f64,
    pub total_reserved: f64,
    pub active_allocations: usize,
    pub avg_utilization: f64,
}

pub struct ResourceAllocator {
    config: AllocatorConfig,
    events: Arc<EventBus>,
    pools: DashMap<String, ResourcePool>,
    /// Pool ids in registration order; scoring ties resolve to the
    /// earliest registered pool.
    pool_order: RwLock<Vec<String>>,
    allocations: DashMap<String, ResourceAllocation>,
    policies: RwLock<Vec<ScalingPolicy>>,
    balancers: RwLock<BalancerRegistry>,
    forecaster: RwLock<Arc<dyn Forecaster>>,
    metrics: DashMap<String, Vec<MetricSample>>,
    /// Last forecast-driven scaling per pool, for cooldown throttling.
    forecast_fired: DashMap<String, DateTime<Utc>>,
    monitor_in_progress: AtomicBool,
}

impl ResourceAllocator {
    pub fn new(config: AllocatorConfig, events: Arc<EventBus>) -> Self {
        Self {
            config,
            events,
            pools: DashMap::new(),
            pool_order: RwLock::new(Vec::new()),
            allocations: DashMap::new(),
            policies: RwLock::new(Vec::new()),
            balancers: RwLock::new(BalancerRegistry::with_defaults()),
            forecaster: RwLock::new(Arc::new(UtilizationForecaster::default())),
            metrics: DashMap::new(),
            forecast_fired: DashMap::new(),
            monitor_in_progress: AtomicBool::new(false),
        }
    }

    pub fn register_pool(&self, pool: ResourcePool) -> Result<()> {
        if self.pools.contains_key(&pool.id) {
            return Err(CoordError::Coordination(format!(
                "pool '{}' is already registered",
                pool.id
            )));
        }
        let pool_id = pool.id.clone();
        self.pools.insert(pool_id.clone(), pool);
        self.pool_order.write().push(pool_id.clone());
        info!(pool = %pool_id, "Resource pool registered");
        Ok(())
    }

    pub fn add_policy(&self, policy: ScalingPolicy) {
        self.policies.write().push(policy);
    }

    pub fn set_forecaster(&self, forecaster: Arc<dyn Forecaster>) {
        *self.forecaster.write() = forecaster;
    }

    pub fn register_balancer(&self, profile: BalancerProfile) {
        self.balancers.write().register(profile);
    }

    pub fn pool(&self, pool_id: &str) -> Option<ResourcePool> {
        self.pools.get(pool_id).map(|p| p.clone())
    }

    pub fn allocation(&self, allocation_id: &str) -> Option<ResourceAllocation> {
        self.allocations.get(allocation_id).map(|a| a.clone())
    }

    /// Attach host-observed performance to a live allocation.
    pub fn record_allocation_performance(
        &self,
        allocation_id: &str,
        snapshot: PerformanceSnapshot,
    ) -> Result<()> {
        let mut allocation = self
            .allocations
            .get_mut(allocation_id)
            .ok_or_else(|| CoordError::AllocationNotFound(allocation_id.to_string()))?;
        allocation.observed = Some(snapshot);
        Ok(())
    }

    /// Satisfy each requirement from the best-scoring pool of its type.
    ///
    /// Failures are per requirement and never roll back sibling grants.
    /// Contention handling is the caller's concern: a failed requirement
    /// does not open a conflict here.
    pub fn allocate(
        &self,
        agent_id: &str,
        requirements: &[ResourceRequirement],
        priority: u8,
    ) -> Result<AllocationReport> {
        if agent_id.is_empty() {
            return Err(CoordError::Coordination("agent id must not be empty".into()));
        }

        let profile = self
            .balancers
            .read()
            .select(self.avg_utilization(), &self.config);

        let mut report = AllocationReport::default();
        for requirement in requirements {
            match self.allocate_one(agent_id, requirement, priority, &profile.weights) {
                Ok(allocation) => report.granted.push(allocation),
                Err(error) => {
                    self.events.publish(CoordEvent::AllocationFailed {
                        agent_id: agent_id.to_string(),
                        resource_type: requirement.resource_type.as_str().to_string(),
                        reason: error.to_string(),
                    });
                    report.failed.push(RequirementFailure {
                        requirement: requirement.clone(),
                        error,
                    });
                }
            }
        }

        if !report.granted.is_empty() {
            self.events.publish(CoordEvent::ResourcesAllocated {
                agent_id: agent_id.to_string(),
                allocation_ids: report.allocation_ids(),
            });
        }

        debug!(
            agent = %agent_id,
            granted = report.granted.len(),
            failed = report.failed.len(),
            strategy = profile.algorithm.as_str(),
            "Allocation request processed"
        );
        Ok(report)
    }

    /// Return capacity for the given allocations and mark them completed.
    ///
    /// Idempotent: releasing an already-completed allocation is a no-op,
    /// and unknown ids are skipped.
    pub fn release(&self, allocation_ids: &[String]) -> Vec<String> {
        let mut released = Vec::new();
        for allocation_id in allocation_ids {
            let Some(mut allocation) = self.allocations.get_mut(allocation_id) else {
                warn!(allocation = %allocation_id, "Release of unknown allocation skipped");
                continue;
            };
            if allocation.status.is_terminal() {
                debug!(allocation = %allocation_id, "Allocation already released");
                continue;
            }

            if let Some(mut pool) = self.pools.get_mut(&allocation.pool_id) {
                pool.release(allocation.amount);
            } else {
                warn!(
                    allocation = %allocation_id,
                    pool = %allocation.pool_id,
                    "Pool vanished before release, capacity not returned"
                );
            }
            allocation.complete();
            released.push(allocation_id.clone());
        }
        released
    }

    pub fn statistics(&self) -> AllocatorStats {
        let mut stats = AllocatorStats {
            pool_count: self.pools.len(),
            ..Default::default()
        };
        for pool in self.pools.iter() {
            stats.total_capacity += pool.total;
            stats.total_available += pool.available;
            stats.total_reserved += pool.reserved;
        }
        stats.active_allocations = self
            .allocations
            .iter()
            .filter(|a| !a.status.is_terminal())
            .count();
        stats.avg_utilization = self.avg_utilization();
        stats
    }

    /// One monitoring/scaling cycle: refresh snapshots, record metric
    /// samples, evaluate scaling policies, then consult the forecaster.
    /// Overlapping cycles are skipped.
    pub fn run_monitor_cycle(&self) {
        if self
            .monitor_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Monitor cycle already running, skipping");
            return;
        }

        let now = Utc::now();
        let pool_ids: Vec<String> = self.pool_order.read().clone();

        for pool_id in &pool_ids {
            if let Some(mut pool) = self.pools.get_mut(pool_id) {
                pool.refresh_utilization();
                let sample = MetricSample {
                    at: now,
                    snapshot: pool.performance.clone(),
                };
                drop(pool);

                let mut history = self.metrics.entry(pool_id.clone()).or_default();
                history.push(sample);
                let limit = self.config.metric_history_limit;
                if history.len() > limit {
                    let excess = history.len() - limit;
                    history.drain(..excess);
                }
            }
        }

        self.evaluate_policies();
        self.run_forecast();

        self.events.publish(CoordEvent::MetricsUpdated {
            pool_count: pool_ids.len(),
            avg_utilization: self.avg_utilization(),
        });

        self.monitor_in_progress.store(false, Ordering::Release);
    }

    pub fn system_snapshot(&self) -> SystemSnapshot {
        let pool_ids = self.pool_order.read().clone();
        SystemSnapshot {
            taken_at: Utc::now(),
            pools: pool_ids
                .iter()
                .filter_map(|id| self.pools.get(id).map(|p| PoolSnapshot::from_pool(&p)))
                .collect(),
        }
    }

    fn allocate_one(
        &self,
        agent_id: &str,
        requirement: &ResourceRequirement,
        priority: u8,
        weights: &ScoreWeights,
    ) -> Result<ResourceAllocation> {
        let candidates = self.candidates(agent_id, requirement)?;

        let costs: Vec<f64> = candidates.iter().map(|p| p.cost_per_unit).collect();
        let latencies: Vec<f64> = candidates.iter().map(|p| p.performance.latency_ms).collect();

        let mut best: Option<(&ResourcePool, f64, bool)> = None;
        for pool in &candidates {
            let score = self.score(pool, agent_id, weights, &costs, &latencies);
            let location_match = requirement
                .preferred_location
                .as_deref()
                .map(|loc| loc == pool.location)
                .unwrap_or(false);

            let wins = match best {
                None => true,
                Some((_, best_score, best_match)) => {
                    score > best_score + SCORE_EPSILON
                        || ((score - best_score).abs() <= SCORE_EPSILON
                            && location_match
                            && !best_match)
                }
            };
            if wins {
                best = Some((pool, score, location_match));
            }
        }

        // Candidates are never empty here.
        let (chosen, score, _) = best.ok_or_else(|| {
            CoordError::PoolNotFound(requirement.resource_type.as_str().to_string())
        })?;

        // Commit under the pool lock: capacity may have moved since scoring.
        let mut pool = self
            .pools
            .get_mut(&chosen.id)
            .ok_or_else(|| CoordError::PoolNotFound(chosen.id.clone()))?;
        pool.reserve(requirement.amount)?;

        let allocation = ResourceAllocation::new(
            agent_id,
            &pool.id,
            requirement.amount,
            priority,
            pool.cost_per_unit,
        );
        drop(pool);

        debug!(
            agent = %agent_id,
            pool = %chosen.id,
            amount = requirement.amount,
            score,
            "Capacity reserved"
        );
        self.allocations
            .insert(allocation.id.clone(), allocation.clone());
        Ok(allocation)
    }

    /// Pools of the matching type that can serve the requirement, in
    /// registration order. Distinguishes "no such pool type" from
    /// "capacity exhausted" for the error report.
    fn candidates(
        &self,
        agent_id: &str,
        requirement: &ResourceRequirement,
    ) -> Result<Vec<ResourcePool>> {
        let pool_ids = self.pool_order.read().clone();
        let mut candidates = Vec::new();
        let mut nearest_miss: Option<(String, f64)> = None;

        for pool_id in &pool_ids {
            let Some(pool) = self.pools.get(pool_id) else {
                continue;
            };
            if pool.resource_type != requirement.resource_type
                || pool.constraints.excludes(agent_id)
            {
                continue;
            }
            if pool.can_serve(agent_id, requirement.amount) {
                candidates.push(pool.clone());
            } else if nearest_miss
                .as_ref()
                .map(|(_, avail)| pool.available > *avail)
                .unwrap_or(true)
            {
                nearest_miss = Some((pool.id.clone(), pool.available));
            }
        }

        if candidates.is_empty() {
            return match nearest_miss {
                Some((pool, available)) => Err(CoordError::InsufficientCapacity {
                    pool,
                    requested: requirement.amount,
                    available,
                }),
                None => Err(CoordError::PoolNotFound(
                    requirement.resource_type.as_str().to_string(),
                )),
            };
        }
        Ok(candidates)
    }

    fn score(
        &self,
        pool: &ResourcePool,
        agent_id: &str,
        weights: &ScoreWeights,
        candidate_costs: &[f64],
        candidate_latencies: &[f64],
    ) -> f64 {
        let availability = pool.availability_ratio();
        let performance = pool.performance.composite();
        let cost = inverted_normal(pool.cost_per_unit, candidate_costs);
        let latency = inverted_normal(pool.performance.latency_ms, candidate_latencies);
        let affinity = pool.constraints.affinity_score(agent_id);

        weights.availability * availability
            + weights.performance * performance
            + weights.cost * cost
            + weights.latency * latency
            + weights.affinity * affinity
    }

    fn evaluate_policies(&self) {
        let now = Utc::now();
        let mut policies = self.policies.write();
        for policy in policies.iter_mut() {
            let fires = self
                .metrics
                .get(&policy.pool_id)
                .map(|history| policy.should_fire(history.as_slice(), now))
                .unwrap_or(false);
            if !fires {
                continue;
            }

            let mut applied_any = false;
            for action in &policy.actions {
                match self.apply_scaling(&policy.pool_id, action.direction, action.amount) {
                    Ok(_) => applied_any = true,
                    Err(e) => {
                        warn!(policy = %policy.id, pool = %policy.pool_id, error = %e, "Scaling action refused")
                    }
                }
            }
            if applied_any {
                policy.record_fired(now);
            }
        }
    }

    fn run_forecast(&self) {
        let snapshot = self.system_snapshot();
        let recommendations = self.forecaster.read().forecast(&snapshot);

        for rec in recommendations {
            if rec.confidence < self.config.forecast_log_confidence {
                continue;
            }
            info!(
                pool = %rec.pool_id,
                action = rec.action.as_str(),
                confidence = rec.confidence,
                amount = rec.amount,
                "Scaling forecast"
            );
            if rec.confidence >= self.config.forecast_execute_confidence {
                self.execute_recommendation(&rec);
            }
        }
    }

    /// Forecast executions are throttled per pool, like policy firings:
    /// one scaling per `forecast_cooldown_secs`, even if the forecaster
    /// keeps recommending.
    fn execute_recommendation(&self, rec: &ScalingRecommendation) {
        let Some(direction) = rec.action.as_direction() else {
            return;
        };

        let now = Utc::now();
        let cooldown = chrono::Duration::seconds(self.config.forecast_cooldown_secs as i64);
        let in_cooldown = self
            .forecast_fired
            .get(&rec.pool_id)
            .map(|last| now < *last + cooldown)
            .unwrap_or(false);
        if in_cooldown {
            debug!(pool = %rec.pool_id, "Forecast-driven scaling suppressed by cooldown");
            return;
        }

        match self.apply_scaling(&rec.pool_id, direction, rec.amount) {
            Ok(_) => {
                self.forecast_fired.insert(rec.pool_id.clone(), now);
            }
            Err(e) => {
                warn!(pool = %rec.pool_id, error = %e, "Forecast-driven scaling refused");
            }
        }
    }

    fn apply_scaling(
        &self,
        pool_id: &str,
        direction: ScalingDirection,
        amount: f64,
    ) -> Result<f64> {
        let mut pool = self
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| CoordError::PoolNotFound(pool_id.to_string()))?;

        let applied = match direction {
            ScalingDirection::ScaleUp => pool.scale_up(amount)?,
            ScalingDirection::ScaleDown => pool.scale_down(amount)?,
        };
        let new_total = pool.total;
        drop(pool);

        info!(
            pool = %pool_id,
            action = direction.as_str(),
            applied,
            new_total,
            "Scaling executed"
        );
        self.events.publish(CoordEvent::ScalingExecuted {
            pool_id: pool_id.to_string(),
            action: direction.as_str().to_string(),
            amount: applied,
            new_total,
        });
        Ok(applied)
    }

    fn avg_utilization(&self) -> f64 {
        let count = self.pools.len();
        if count == 0 {
            return 0.0;
        }
        self.pools.iter().map(|p| p.utilization()).sum::<f64>() / count as f64
    }
}

/// Normalize against the candidate set and invert so that the cheapest or
/// fastest pool scores 1.0. A uniform set scores 1.0 for everyone.
fn inverted_normal(value: f64, candidates: &[f64]) -> f64 {
    let min = candidates.iter().cloned().fold(f64::MAX, f64::min);
    let max = candidates.iter().cloned().fold(f64::MIN, f64::max);
    if (max - min).abs() < SCORE_EPSILON {
        return 1.0;
    }
    1.0 - (value - min) / (max - min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::pool::{AffinityKind, AffinityRule, ResourceType};
    use super::super::scaling::{
        Aggregation, Comparator, ScalingMetric, ScalingTrigger,
    };
    use chrono::Duration;

    fn allocator() -> ResourceAllocator {
        ResourceAllocator::new(AllocatorConfig::default(), Arc::new(EventBus::default()))
    }

    fn compute_pool(id: &str, total: f64) -> ResourcePool {
        ResourcePool::new(id, ResourceType::Compute, total, "cores")
    }

    #[test]
    fn test_register_pool_rejects_duplicates() {
        let alloc = allocator();
        alloc.register_pool(compute_pool("pool-1", 100.0)).unwrap();
        assert!(alloc.register_pool(compute_pool("pool-1", 50.0)).is_err());
    }

    #[test]
    fn test_allocate_then_insufficient_capacity() {
        let alloc = allocator();
        alloc.register_pool(compute_pool("pool-1", 100.0)).unwrap();

        let report = alloc
            .allocate(
                "agent-a",
                &[
                    ResourceRequirement::new(ResourceType::Compute, 80.0),
                    ResourceRequirement::new(ResourceType::Compute, 70.0),
                ],
                5,
            )
            .unwrap();

        assert_eq!(report.granted.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            report.failed[0].error,
            CoordError::InsufficientCapacity { .. }
        ));

        let pool = alloc.pool("pool-1").unwrap();
        assert_eq!(pool.available, 20.0);
        assert_eq!(pool.reserved, 80.0);
    }

    #[test]
    fn test_allocate_unknown_type_reports_pool_not_found() {
        let alloc = allocator();
        alloc.register_pool(compute_pool("pool-1", 100.0)).unwrap();

        let report = alloc
            .allocate(
                "agent-a",
                &[ResourceRequirement::new(ResourceType::Storage, 10.0)],
                5,
            )
            .unwrap();
        assert!(matches!(
            report.failed[0].error,
            CoordError::PoolNotFound(_)
        ));
    }

    #[test]
    fn test_scoring_prefers_available_capacity() {
        let alloc = allocator();
        let mut busy = compute_pool("busy", 100.0);
        busy.reserve(90.0).unwrap();
        busy.refresh_utilization();
        alloc.register_pool(busy).unwrap();
        alloc.register_pool(compute_pool("idle", 100.0)).unwrap();

        let report = alloc
            .allocate(
                "agent-a",
                &[ResourceRequirement::new(ResourceType::Compute, 10.0)],
                5,
            )
            .unwrap();
        assert_eq!(report.granted[0].pool_id, "idle");
    }

    #[test]
    fn test_scoring_ties_break_by_registration_order() {
        let alloc = allocator();
        alloc.register_pool(compute_pool("first", 100.0)).unwrap();
        alloc.register_pool(compute_pool("second", 100.0)).unwrap();

        let report = alloc
            .allocate(
                "agent-a",
                &[ResourceRequirement::new(ResourceType::Compute, 10.0)],
                5,
            )
            .unwrap();
        assert_eq!(report.granted[0].pool_id, "first");
    }

    #[test]
    fn test_affinity_steers_selection() {
        let alloc = allocator();
        alloc.register_pool(compute_pool("plain", 100.0)).unwrap();
        let mut preferred = compute_pool("preferred", 100.0);
        preferred.constraints.affinities = vec![AffinityRule {
            agent_id: "agent-a".into(),
            kind: AffinityKind::Required,
        }];
        alloc.register_pool(preferred).unwrap();

        let report = alloc
            .allocate(
                "agent-a",
                &[ResourceRequirement::new(ResourceType::Compute, 10.0)],
                5,
            )
            .unwrap();
        assert_eq!(report.granted[0].pool_id, "preferred");
    }

    #[test]
    fn test_exclusion_is_a_hard_filter() {
        let alloc = allocator();
        let mut pool = compute_pool("pool-1", 100.0);
        pool.constraints.exclusions = vec!["banned".into()];
        alloc.register_pool(pool).unwrap();

        let report = alloc
            .allocate(
                "banned",
                &[ResourceRequirement::new(ResourceType::Compute, 10.0)],
                5,
            )
            .unwrap();
        assert!(matches!(
            report.failed[0].error,
            CoordError::PoolNotFound(_)
        ));
    }

    #[test]
    fn test_release_is_idempotent() {
        let alloc = allocator();
        alloc.register_pool(compute_pool("pool-1", 100.0)).unwrap();

        let report = alloc
            .allocate(
                "agent-a",
                &[ResourceRequirement::new(ResourceType::Compute, 40.0)],
                5,
            )
            .unwrap();
        let ids = report.allocation_ids();

        assert_eq!(alloc.release(&ids).len(), 1);
        assert_eq!(alloc.pool("pool-1").unwrap().available, 100.0);

        // Second release is a no-op: capacity is not double-credited.
        assert!(alloc.release(&ids).is_empty());
        let pool = alloc.pool("pool-1").unwrap();
        assert_eq!(pool.available, 100.0);
        assert_eq!(pool.reserved, 0.0);
    }

    #[test]
    fn test_release_unknown_id_is_skipped() {
        let alloc = allocator();
        assert!(alloc.release(&["no-such-allocation".to_string()]).is_empty());
    }

    #[test]
    fn test_sustained_policy_fires_once_then_cools_down() {
        let alloc = allocator();
        let mut pool = compute_pool("pool-1", 100.0);
        pool.reserve(85.0).unwrap();
        pool.refresh_utilization();
        alloc.register_pool(pool).unwrap();

        alloc.add_policy(
            ScalingPolicy::new("burst", "pool-1")
                .with_trigger(ScalingTrigger {
                    metric: ScalingMetric::Utilization,
                    comparator: Comparator::Gte,
                    threshold: 0.8,
                    sustained_secs: 300,
                    aggregation: Aggregation::Average,
                })
                .with_action(ScalingDirection::ScaleUp, 20.0)
                .with_cooldown(600),
        );

        // Backdate a sustained run of high-utilization samples.
        let now = Utc::now();
        let history: Vec<MetricSample> = (0..=6)
            .map(|i| {
                let mut snapshot = alloc.pool("pool-1").unwrap().performance;
                snapshot.utilization = 0.85;
                MetricSample {
                    at: now - Duration::seconds(360 - i * 60),
                    snapshot,
                }
            })
            .collect();
        alloc.metrics.insert("pool-1".to_string(), history);

        alloc.run_monitor_cycle();
        let pool = alloc.pool("pool-1").unwrap();
        assert_eq!(pool.total, 120.0);
        assert_eq!(pool.available, 35.0);

        // Identical conditions inside the cooldown window: suppressed.
        alloc.run_monitor_cycle();
        assert_eq!(alloc.pool("pool-1").unwrap().total, 120.0);
    }

    #[test]
    fn test_forecast_auto_executes_above_threshold() {
        let alloc = allocator();
        let mut pool = compute_pool("pool-1", 100.0);
        // 95% utilization: default forecaster confidence 0.875 >= 0.85.
        pool.reserve(95.0).unwrap();
        alloc.register_pool(pool).unwrap();

        alloc.run_monitor_cycle();
        assert_eq!(alloc.pool("pool-1").unwrap().total, 120.0);
    }

    #[test]
    fn test_idle_pool_is_never_auto_shrunk() {
        let alloc = allocator();
        alloc.register_pool(compute_pool("pool-1", 100.0)).unwrap();

        // With no policies installed, repeated cycles over a fully idle
        // pool must leave its capacity untouched: the default forecaster's
        // scale-down output stays below the execute threshold.
        alloc.run_monitor_cycle();
        alloc.run_monitor_cycle();
        let pool = alloc.pool("pool-1").unwrap();
        assert_eq!(pool.total, 100.0);
        assert_eq!(pool.available, 100.0);
    }

    #[test]
    fn test_forecast_scaling_respects_cooldown() {
        struct AlwaysGrow;
        impl Forecaster for AlwaysGrow {
            fn forecast(&self, snapshot: &SystemSnapshot) -> Vec<ScalingRecommendation> {
                snapshot
                    .pools
                    .iter()
                    .map(|p| ScalingRecommendation {
                        pool_id: p.pool_id.clone(),
                        action: super::super::forecast::ForecastAction::ScaleUp,
                        confidence: 0.95,
                        amount: 10.0,
                    })
                    .collect()
            }
        }

        let alloc = allocator();
        alloc.register_pool(compute_pool("pool-1", 100.0)).unwrap();
        alloc.set_forecaster(Arc::new(AlwaysGrow));

        alloc.run_monitor_cycle();
        assert_eq!(alloc.pool("pool-1").unwrap().total, 110.0);

        // Still recommending, but within the cooldown window: suppressed.
        alloc.run_monitor_cycle();
        assert_eq!(alloc.pool("pool-1").unwrap().total, 110.0);
    }

    #[test]
    fn test_record_allocation_performance() {
        let alloc = allocator();
        alloc.register_pool(compute_pool("pool-1", 100.0)).unwrap();
        let report = alloc
            .allocate(
                "agent-a",
                &[ResourceRequirement::new(ResourceType::Compute, 10.0)],
                5,
            )
            .unwrap();
        let id = &report.granted[0].id;

        let mut observed = PerformanceSnapshot::default();
        observed.latency_ms = 12.0;
        alloc.record_allocation_performance(id, observed).unwrap();
        let stored = alloc.allocation(id).unwrap().observed.unwrap();
        assert_eq!(stored.latency_ms, 12.0);

        let err = alloc
            .record_allocation_performance("no-such-allocation", PerformanceSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, CoordError::AllocationNotFound(_)));
    }

    #[test]
    fn test_forecast_below_execute_threshold_only_logs() {
        let alloc = allocator();
        let mut pool = compute_pool("pool-1", 100.0);
        // 82% utilization: confidence 0.55, logged but not executed.
        pool.reserve(82.0).unwrap();
        alloc.register_pool(pool).unwrap();

        alloc.run_monitor_cycle();
        assert_eq!(alloc.pool("pool-1").unwrap().total, 100.0);
    }

    #[test]
    fn test_statistics() {
        let alloc = allocator();
        alloc.register_pool(compute_pool("pool-1", 100.0)).unwrap();
        alloc
            .register_pool(ResourcePool::new("mem", ResourceType::Memory, 1024.0, "mb"))
            .unwrap();
        alloc
            .allocate(
                "agent-a",
                &[ResourceRequirement::new(ResourceType::Compute, 50.0)],
                5,
            )
            .unwrap();

        let stats = alloc.statistics();
        assert_eq!(stats.pool_count, 2);
        assert_eq!(stats.total_capacity, 1124.0);
        assert_eq!(stats.total_reserved, 50.0);
        assert_eq!(stats.active_allocations, 1);
        assert!((stats.avg_utilization - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_monitor_reentrancy_guard() {
        let alloc = allocator();
        alloc.monitor_in_progress.store(true, Ordering::Release);
        alloc.run_monitor_cycle();
        assert!(alloc.monitor_in_progress.load(Ordering::Acquire));
    }

    #[test]
    fn test_preferred_location_breaks_ties() {
        let alloc = allocator();
        alloc
            .register_pool(compute_pool("us", 100.0).with_location("us-east"))
            .unwrap();
        alloc
            .register_pool(compute_pool("eu", 100.0).with_location("eu-west"))
            .unwrap();

        let report = alloc
            .allocate(
                "agent-a",
                &[ResourceRequirement::new(ResourceType::Compute, 10.0).with_location("eu-west")],
                5,
            )
            .unwrap();
        assert_eq!(report.granted[0].pool_id, "eu");
    }
}
