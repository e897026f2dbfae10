//! Load-balancing strategy registry and utilization-tiered selection.
//!
//! Each registered strategy carries the weight set fed into pool scoring.
//! Selection is per-decision: the allocator picks the strategy matching
//! the current average utilization tier, so a busy system scores with
//! the full weighted blend while an idle one just chases headroom.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AllocatorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingAlgorithm {
    /// Pure headroom chasing; cheapest to evaluate.
    LeastLoaded,
    /// Headroom plus pool health, ignoring cost and latency.
    ResourceAware,
    /// Full weighted blend of availability, performance, cost, latency,
    /// and affinity.
    WeightedScore,
}

impl BalancingAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeastLoaded => "least-loaded",
            Self::ResourceAware => "resource-aware",
            Self::WeightedScore => "weighted-score",
        }
    }
}

/// Weights applied to the five scoring dimensions. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub availability: f64,
    pub performance: f64,
    pub cost: f64,
    pub latency: f64,
    pub affinity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            availability: 0.30,
            performance: 0.25,
            cost: 0.20,
            latency: 0.15,
            affinity: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerProfile {
    pub id: String,
    pub algorithm: BalancingAlgorithm,
    pub weights: ScoreWeights,
    /// Rolling success ratio of decisions made under this profile,
    /// host-reported.
    pub effectiveness: f64,
}

impl BalancerProfile {
    fn least_loaded() -> Self {
        Self {
            id: "least-loaded".into(),
            algorithm: BalancingAlgorithm::LeastLoaded,
            weights: ScoreWeights {
                availability: 1.0,
                performance: 0.0,
                cost: 0.0,
                latency: 0.0,
                affinity: 0.0,
            },
            effectiveness: 1.0,
        }
    }

    fn resource_aware() -> Self {
        Self {
            id: "resource-aware".into(),
            algorithm: BalancingAlgorithm::ResourceAware,
            weights: ScoreWeights {
                availability: 0.45,
                performance: 0.35,
                cost: 0.0,
                latency: 0.0,
                affinity: 0.20,
            },
            effectiveness: 1.0,
        }
    }

    fn weighted_score() -> Self {
        Self {
            id: "weighted-score".into(),
            algorithm: BalancingAlgorithm::WeightedScore,
            weights: ScoreWeights::default(),
            effectiveness: 1.0,
        }
    }
}

/// Registry of balancer profiles keyed by algorithm.
pub struct BalancerRegistry {
    profiles: Vec<BalancerProfile>,
}

impl BalancerRegistry {
    pub fn with_defaults() -> Self {
        Self {
            profiles: vec![
                BalancerProfile::least_loaded(),
                BalancerProfile::resource_aware(),
                BalancerProfile::weighted_score(),
            ],
        }
    }

    pub fn register(&mut self, profile: BalancerProfile) {
        self.profiles.retain(|p| p.algorithm != profile.algorithm);
        self.profiles.push(profile);
    }

    fn get(&self, algorithm: BalancingAlgorithm) -> Option<&BalancerProfile> {
        self.profiles.iter().find(|p| p.algorithm == algorithm)
    }

    /// Pick the profile for the current load tier. Falls back through the
    /// simpler algorithms when a tier's profile was unregistered.
    pub fn select(&self, avg_utilization: f64, config: &AllocatorConfig) -> BalancerProfile {
        let preferred = if avg_utilization >= config.high_utilization_threshold {
            BalancingAlgorithm::WeightedScore
        } else if avg_utilization >= config.moderate_utilization_threshold {
            BalancingAlgorithm::ResourceAware
        } else {
            BalancingAlgorithm::LeastLoaded
        };

        let profile = self
            .get(preferred)
            .or_else(|| self.get(BalancingAlgorithm::ResourceAware))
            .or_else(|| self.get(BalancingAlgorithm::LeastLoaded))
            .cloned()
            .unwrap_or_else(BalancerProfile::least_loaded);

        debug!(
            utilization = avg_utilization,
            strategy = profile.algorithm.as_str(),
            "Selected load-balancing strategy"
        );
        profile
    }
}

impl Default for BalancerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
