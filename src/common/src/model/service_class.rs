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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// SLO targets for one model under a service class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SloTargets {
    /// Time-to-first-token target, ms.
    pub ttft_ms: f64,
    /// Inter-token latency target, ms.
    pub itl_ms: f64,
    /// Optional per-replica throughput floor, tokens/s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tps: Option<f64>,
}

/// A service class groups variants of the same priority and carries their
/// per-model SLO targets. Smaller priority is more important.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceClass {
    pub name: String,
    pub priority: u32,
    /// Model id -> targets.
    pub models: HashMap<String, SloTargets>,
}

impl ServiceClass {
    pub fn slo_for(&self, model_id: &str) -> Option<&SloTargets> {
        self.models.get(model_id)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=100).contains(&self.priority) {
            return Err(format!(
                "service class {}: priority must be in 1..=100, got {}",
                self.name, self.priority
            ));
        }
        for (model, slo) in &self.models {
            if slo.ttft_ms <= 0.0 || slo.itl_ms <= 0.0 {
                return Err(format!(
                    "service class {}: SLO targets for {model} must be positive",
                    self.name
                ));
            }
            if let Some(tps) = slo.tps {
                if tps <= 0.0 {
                    return Err(format!(
                        "service class {}: TPS floor for {model} must be positive",
                        self.name
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_priority_range() {
        let mut class = ServiceClass {
            name: "premium".into(),
            priority: 1,
            models: HashMap::from([(
                "llama-70b".into(),
                SloTargets {
                    ttft_ms: 1000.0,
                    itl_ms: 9.0,
                    tps: None,
                },
            )]),
        };
        assert!(class.validate().is_ok());
        class.priority = 0;
        assert!(class.validate().is_err());
        class.priority = 101;
        assert!(class.validate().is_err());
    }

    #[test]
    fn test_slo_lookup() {
        let class: ServiceClass = serde_json::from_str(
            r#"{
                "name": "freemium",
                "priority": 10,
                "models": {"llama-8b": {"ttftMs": 2000, "itlMs": 40}}
            }"#,
        )
        .unwrap();
        assert!(class.slo_for("llama-8b").is_some());
        assert!(class.slo_for("llama-70b").is_none());
        assert_eq!(class.slo_for("llama-8b").unwrap().tps, None);
    }
}
