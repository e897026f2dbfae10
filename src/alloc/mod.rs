//! Resource allocator: typed capacity pools, scored allocation,
//! policy-driven scaling, and predictive scaling behind a pluggable
//! forecaster.

mod allocation;
mod allocator;
mod balancer;
mod forecast;
mod pool;
mod scaling;

pub use allocation::{
    AllocationStatus, DEFAULT_ALLOCATION_PRIORITY, ResourceAllocation, ResourceRequirement,
};
pub use allocator::{
    AllocationReport, AllocatorStats, RequirementFailure, ResourceAllocator,
};
pub use balancer::{BalancerProfile, BalancerRegistry, BalancingAlgorithm, ScoreWeights};
pub use forecast::{
    ForecastAction, Forecaster, PoolSnapshot, ScalingRecommendation, SystemSnapshot,
    UtilizationForecaster,
};
pub use pool::{
    AffinityKind, AffinityRule, PerformanceSnapshot, PoolConstraints, ResourcePool, ResourceType,
};
pub use scaling::{
    Aggregation, Comparator, MetricSample, ScalingAction, ScalingDirection, ScalingMetric,
    ScalingPolicy, ScalingTrigger,
};
