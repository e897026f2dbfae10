//! Allocation requests and granted reservations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pool::{PerformanceSnapshot, ResourceType};

pub const DEFAULT_ALLOCATION_PRIORITY: u8 = 5;

/// One resource need within an allocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub resource_type: ResourceType,
    pub amount: f64,
    /// Preferred location tag; soft hint, never a hard filter.
    pub preferred_location: Option<String>,
}

impl ResourceRequirement {
    pub fn new(resource_type: ResourceType, amount: f64) -> Self {
        Self {
            resource_type,
            amount,
            preferred_location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.preferred_location = Some(location.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Expired,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }
}

/// A granted reservation of capacity from one pool to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub id: String,
    pub agent_id: String,
    pub pool_id: String,
    pub amount: f64,
    pub priority: u8,
    pub status: AllocationStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Performance observed over the allocation's lifetime, host-reported.
    pub observed: Option<PerformanceSnapshot>,
    pub cost: f64,
}

impl ResourceAllocation {
    pub fn new(
        agent_id: impl Into<String>,
        pool_id: impl Into<String>,
        amount: f64,
        priority: u8,
        cost_per_unit: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            pool_id: pool_id.into(),
            amount,
            priority,
            status: AllocationStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
            observed: None,
            cost: amount * cost_per_unit,
        }
    }

    pub fn complete(&mut self) {
        self.status = AllocationStatus::Completed;
        self.ended_at = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}
