// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed load of a variant, attached to its current allocation.
/// Arrival rate is req/min at this boundary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadProfile {
    pub arrival_rate: f64,
    pub avg_input_tokens: f64,
    pub avg_output_tokens: f64,
}

impl LoadProfile {
    /// Zero traffic: no arrivals, or no output tokens to produce.
    pub fn is_zero(&self) -> bool {
        self.arrival_rate <= 0.0 || self.avg_output_tokens <= 0.0
    }
}

/// A chosen pairing of an accelerator type with a replica count, batch
/// size and the derived cost and expected latencies.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub accelerator: String,
    pub num_replicas: u32,
    /// Per-replica max batch the expectation was computed at.
    pub max_batch: u32,
    /// Total cost of the allocation per hour.
    pub cost: f64,
    pub itl_average: f64,
    pub ttft_average: f64,
    /// Saturation ratio of one replica under the observed load.
    pub rho: f64,
    /// Largest sustainable per-replica arrival rate, req/min.
    pub max_rate_per_replica: f64,
    /// Observed load, attached when this is a current allocation.
    pub load: Option<LoadProfile>,
}

impl Allocation {
    /// The allocation holding no resources, used when a variant has zero
    /// load and zero minimum replicas.
    pub fn zero() -> Self {
        Self {
            accelerator: String::new(),
            num_replicas: 0,
            max_batch: 0,
            cost: 0.0,
            itl_average: 0.0,
            ttft_average: 0.0,
            rho: 0.0,
            max_rate_per_replica: 0.0,
            load: None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.num_replicas == 0
    }
}

/// Serialized twin of [`Allocation`] as it appears on the variant status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationData {
    pub accelerator: String,
    pub num_replicas: u32,
    pub max_batch: u32,
    pub variant_cost: f64,
    pub itl_average: f64,
    pub ttft_average: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadProfile>,
}

impl From<&Allocation> for AllocationData {
    fn from(alloc: &Allocation) -> Self {
        Self {
            accelerator: alloc.accelerator.clone(),
            num_replicas: alloc.num_replicas,
            max_batch: alloc.max_batch,
            variant_cost: alloc.cost,
            itl_average: alloc.itl_average,
            ttft_average: alloc.ttft_average,
            load: alloc.load.clone(),
        }
    }
}

impl AllocationData {
    pub fn to_allocation(&self) -> Allocation {
        Allocation {
            accelerator: self.accelerator.clone(),
            num_replicas: self.num_replicas,
            max_batch: self.max_batch,
            cost: self.variant_cost,
            itl_average: self.itl_average,
            ttft_average: self.ttft_average,
            rho: 0.0,
            max_rate_per_replica: 0.0,
            load: self.load.clone(),
        }
    }
}

/// The optimizer's published decision for a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredOptimizedAlloc {
    pub last_run_time: DateTime<Utc>,
    pub accelerator: String,
    pub num_replicas: u32,
}

/// Bookkeeping for the external scaler that applies the decision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actuation {
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<DateTime<Utc>>,
}
