//! Predictive scaling: the forecaster contract and a trivial
//! utilization-trend default.
//!
//! The allocator only fixes the input/output shape: a system snapshot in,
//! ranked recommendations with confidence out. What model produces them
//! is the host's business.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pool::{ResourcePool, ResourceType};
use super::scaling::ScalingDirection;

/// Point-in-time view of one pool, as seen by the forecaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pool_id: String,
    pub resource_type: ResourceType,
    pub utilization: f64,
    pub available: f64,
    pub total: f64,
}

impl PoolSnapshot {
    pub fn from_pool(pool: &ResourcePool) -> Self {
        Self {
            pool_id: pool.id.clone(),
            resource_type: pool.resource_type,
            utilization: pool.utilization(),
            available: pool.available,
            total: pool.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub taken_at: DateTime<Utc>,
    pub pools: Vec<PoolSnapshot>,
}

impl SystemSnapshot {
    pub fn avg_utilization(&self) -> f64 {
        if self.pools.is_empty() {
            return 0.0;
        }
        self.pools.iter().map(|p| p.utilization).sum::<f64>() / self.pools.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastAction {
    ScaleUp,
    ScaleDown,
    Maintain,
}

impl ForecastAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScaleUp => "scale-up",
            Self::ScaleDown => "scale-down",
            Self::Maintain => "maintain",
        }
    }

    pub fn as_direction(&self) -> Option<ScalingDirection> {
        match self {
            Self::ScaleUp => Some(ScalingDirection::ScaleUp),
            Self::ScaleDown => Some(ScalingDirection::ScaleDown),
            Self::Maintain => None,
        }
    }
}

/// One ranked forecast output for one pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingRecommendation {
    pub pool_id: String,
    pub action: ForecastAction,
    /// 0.0 to 1.0; gates logging and auto-execution downstream.
    pub confidence: f64,
    pub amount: f64,
}

pub trait Forecaster: Send + Sync {
    /// Recommendations sorted by descending confidence.
    fn forecast(&self, snapshot: &SystemSnapshot) -> Vec<ScalingRecommendation>;
}

/// Default heuristic: extrapolates nothing, just maps current utilization
/// to a direction with confidence growing as utilization leaves the
/// comfortable band. Scale-down confidence is capped below the default
/// auto-execute gate, so this forecaster never shrinks a pool on its own;
/// hosts that want automatic shrinking install their own forecaster.
pub struct UtilizationForecaster {
    pub scale_up_above: f64,
    pub scale_down_below: f64,
    /// Fraction of current total to add or remove.
    pub step_fraction: f64,
}

impl Default for UtilizationForecaster {
    fn default() -> Self {
        Self {
            scale_up_above: 0.8,
            scale_down_below: 0.2,
            step_fraction: 0.2,
        }
    }
}

impl Forecaster for UtilizationForecaster {
    fn forecast(&self, snapshot: &SystemSnapshot) -> Vec<ScalingRecommendation> {
        let mut recommendations: Vec<ScalingRecommendation> = snapshot
            .pools
            .iter()
            .map(|pool| {
                let amount = pool.total * self.step_fraction;
                if pool.utilization >= self.scale_up_above {
                    // Confidence ramps from 0.5 at the threshold to 1.0 at
                    // full saturation.
                    let span = (1.0 - self.scale_up_above).max(f64::EPSILON);
                    let confidence =
                        0.5 + 0.5 * ((pool.utilization - self.scale_up_above) / span).min(1.0);
                    ScalingRecommendation {
                        pool_id: pool.pool_id.clone(),
                        action: ForecastAction::ScaleUp,
                        confidence,
                        amount,
                    }
                } else if pool.utilization <= self.scale_down_below && pool.total > 0.0 {
                    // Tops out at 0.8 even for a fully idle pool: shrinking
                    // capacity is advisory only from this heuristic.
                    let span = self.scale_down_below.max(f64::EPSILON);
                    let confidence =
                        0.5 + 0.3 * ((self.scale_down_below - pool.utilization) / span).min(1.0);
                    ScalingRecommendation {
                        pool_id: pool.pool_id.clone(),
                        action: ForecastAction::ScaleDown,
                        confidence,
                        amount,
                    }
                } else {
                    ScalingRecommendation {
                        pool_id: pool.pool_id.clone(),
                        action: ForecastAction::Maintain,
                        confidence: 0.3,
                        amount: 0.0,
                    }
                }
            })
            .collect();

        recommendations.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        recommendations
    }
}
