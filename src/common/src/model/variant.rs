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

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::allocation::{Actuation, AllocationData, DesiredOptimizedAlloc};
use super::condition::Condition;
use super::profile::PerfProfile;

/// A variant is the autoscaled unit: a model-serving deployment pinned to
/// an accelerator type. Created and deleted externally; the optimizer only
/// writes its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub name: String,
    pub namespace: String,
    pub model_id: String,
    /// Accelerator type the variant is currently labeled with.
    pub accelerator: String,
    /// Service laws for every accelerator type the model supports.
    pub profiles: Vec<PerfProfile>,
    #[serde(default)]
    pub min_replicas: u32,
    /// Overrides the profile-derived max batch when positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_override: Option<u32>,
    /// Name of the service class carrying this variant's SLO.
    pub service_class: String,
    /// Restrict candidate allocations to the current accelerator type.
    #[serde(default)]
    pub keep_accelerator: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: VariantStatus,
}

impl Variant {
    /// `namespace/name`, the key a variant is registered under everywhere.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn profile_for(&self, accelerator: &str) -> Option<&PerfProfile> {
        self.profiles.iter().find(|p| p.accelerator == accelerator)
    }

    /// The current allocation's accelerator must be one the model has a
    /// profile for, or empty.
    pub fn validate(&self) -> Result<(), String> {
        for profile in &self.profiles {
            profile.validate()?;
        }
        if let Some(current) = &self.status.current_alloc {
            if !current.accelerator.is_empty() && self.profile_for(&current.accelerator).is_none() {
                return Err(format!(
                    "variant {}: current allocation references accelerator {} without a profile",
                    self.full_name(),
                    current.accelerator
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_alloc: Option<AllocationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_optimized_alloc: Option<DesiredOptimizedAlloc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actuation: Option<Actuation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Echo of the tuner's current estimate, when the tuner is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuner_perf_data: Option<TunerPerfData>,
}

/// Tuned service-law parameters for one (variant, accelerator) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunerPerfData {
    pub accelerator: String,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
}
