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

use serde::{Deserialize, Serialize};

/// An accelerator type known to the cluster, e.g. `H100`. Attributes come
/// from the accelerator cost table in the configuration store and are
/// immutable within a reconcile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accelerator {
    /// Type tag, used as the key everywhere an accelerator is referenced.
    pub name: String,
    /// Cost of one accelerator unit per hour.
    pub unit_cost: f64,
    /// Units per physical card.
    #[serde(default = "default_multiplicity")]
    pub multiplicity: u32,
    /// Device memory in GiB.
    #[serde(default)]
    pub memory_gib: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerCurve>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerCurve {
    pub idle_watts: f64,
    pub full_watts: f64,
}

fn default_multiplicity() -> u32 {
    1
}

impl Accelerator {
    /// Estimated draw of one unit at the given saturation, interpolated
    /// linearly on the power curve. `None` when no curve is declared.
    pub fn power_draw(&self, rho: f64) -> Option<f64> {
        let curve = self.power.as_ref()?;
        let rho = rho.clamp(0.0, 1.0);
        Some(curve.idle_watts + (curve.full_watts - curve.idle_watts) * rho)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_entry_defaults() {
        let acc: Accelerator =
            serde_json::from_str(r#"{"name": "H100", "unitCost": 100.0}"#).unwrap();
        assert_eq!(acc.multiplicity, 1);
        assert_eq!(acc.memory_gib, 0.0);
        assert!(acc.power.is_none());
        assert!(acc.power_draw(0.5).is_none());
    }

    #[test]
    fn test_power_draw_interpolates() {
        let acc: Accelerator = serde_json::from_str(
            r#"{
                "name": "H100",
                "unitCost": 100.0,
                "power": {"idleWatts": 100.0, "fullWatts": 700.0}
            }"#,
        )
        .unwrap();
        assert_eq!(acc.power_draw(0.0), Some(100.0));
        assert_eq!(acc.power_draw(0.5), Some(400.0));
        assert_eq!(acc.power_draw(1.0), Some(700.0));
        // Saturation is clamped before interpolation.
        assert_eq!(acc.power_draw(3.0), Some(700.0));
    }
}
