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

/// Service law of a model on one accelerator type.
///
/// Decode time per forward step grows linearly with batch size,
/// `alpha + beta * b` ms; prefill time grows with the input length and the
/// batch, `gamma + delta * k_in * b` ms. `max_batch_size` is calibrated at
/// a reference output length of `at_tokens`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfProfile {
    /// Accelerator type this law was measured on.
    pub accelerator: String,
    /// Accelerator units driven by one replica.
    #[serde(default = "default_acc_count")]
    pub acc_count: u32,
    pub alpha: f64,
    pub beta: f64,
    #[serde(default)]
    pub gamma: f64,
    #[serde(default)]
    pub delta: f64,
    pub max_batch_size: u32,
    /// Output length at which `max_batch_size` was calibrated.
    #[serde(default = "default_at_tokens")]
    pub at_tokens: u32,
}

fn default_acc_count() -> u32 {
    1
}

fn default_at_tokens() -> u32 {
    100
}

impl PerfProfile {
    /// Decode step time at the given batch size, ms.
    pub fn decode_time(&self, batch: f64) -> f64 {
        self.alpha + self.beta * batch
    }

    /// Prefill time for the given average input length and batch size, ms.
    pub fn prefill_time(&self, in_tokens: f64, batch: f64) -> f64 {
        self.gamma + self.delta * in_tokens * batch
    }

    /// Effective max batch for a workload with the given average output
    /// length: the configured override when positive, otherwise the
    /// calibrated batch scaled from `at_tokens` to the observed length.
    /// Never below 1.
    pub fn effective_max_batch(&self, override_batch: Option<u32>, out_tokens: f64) -> u32 {
        match override_batch {
            Some(b) if b > 0 => return b,
            _ => {}
        }
        let scaled =
            self.max_batch_size as f64 * self.at_tokens as f64 / out_tokens.max(1.0);
        (scaled.floor() as u32).max(1)
    }

    /// Service-law constants must be non-negative and the calibrated batch
    /// at least 1.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
            ("delta", self.delta),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!(
                    "perf profile for {}: {name} must be a non-negative number, got {value}",
                    self.accelerator
                ));
            }
        }
        if self.max_batch_size < 1 {
            return Err(format!(
                "perf profile for {}: maxBatchSize must be at least 1",
                self.accelerator
            ));
        }
        if self.acc_count < 1 {
            return Err(format!(
                "perf profile for {}: accCount must be at least 1",
                self.accelerator
            ));
        }
        Ok(())
    }
}
