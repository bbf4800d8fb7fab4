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

//! Analytic queueing model of a batched inference replica.
//!
//! A replica serves batches of up to `max_batch` requests. With average
//! input length `k_in` and output length `k_out`, a batch of size `b`
//! occupies the replica for
//!
//! ```text
//! T(b) = prefill(k_in, b) + k_out * decode(b) = s0 + s1 * b   (ms)
//! s0 = gamma + k_out * alpha
//! s1 = delta * k_in + k_out * beta
//! ```
//!
//! The batching queue is modeled at batch granularity as an M/M/1 with
//! service time `T(b_eff)`: utilization `rho = lambda * T / b_eff` and
//! mean wait `rho * T / (1 - rho)`, capped by the finite queue capacity.
//! Percentile latency targets convert to exponential-mean targets by
//! dividing by the SLO margin `-ln(1 - p)`; the margin applies to the
//! stochastic wait only, since prefill and decode are deterministic.
//!
//! All rates here are req/ms; conversion from the req/min status boundary
//! happens in the candidate generator, exactly once.

use swell_common::model::{LoadProfile, PerfProfile, SloTargets};
use swell_common::util::sanitize;
use thiserror::Error;

/// Latency percentile the SLO targets refer to.
pub const DEFAULT_SLO_PERCENTILE: f64 = 0.95;

/// Queue capacity as a multiple of the batch size.
pub const DEFAULT_QUEUE_RATIO: u32 = 10;

/// Multiplicative factor translating a percentile target into an
/// exponential-mean target.
pub fn slo_margin(percentile: f64) -> f64 {
    -(1.0 - percentile).ln()
}

/// An SLO that no batch size can meet on this service law. The display
/// form is the stable reason tag recorded on the variant.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Infeasible {
    #[error("ItlUnachievable")]
    ItlUnachievable,
    #[error("TtftUnachievable")]
    TtftUnachievable,
    #[error("TpsUnachievable")]
    TpsUnachievable,
}

/// Service parameters of one replica for one (model, accelerator) pair
/// under the observed token lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub max_batch: u32,
    pub max_queue: u32,
    pub avg_in_tokens: f64,
    pub avg_out_tokens: f64,
}

impl ServiceParams {
    pub fn from_profile(profile: &PerfProfile, max_batch: u32, queue_ratio: u32, load: &LoadProfile) -> Self {
        Self {
            alpha: profile.alpha,
            beta: profile.beta,
            gamma: profile.gamma,
            delta: profile.delta,
            max_batch,
            max_queue: max_batch.saturating_mul(queue_ratio),
            avg_in_tokens: load.avg_input_tokens,
            avg_out_tokens: load.avg_output_tokens,
        }
    }

    fn s0(&self) -> f64 {
        self.gamma + self.avg_out_tokens * self.alpha
    }

    fn s1(&self) -> f64 {
        self.delta * self.avg_in_tokens + self.avg_out_tokens * self.beta
    }

    /// Time to fully serve a batch of size `b`, ms.
    fn service_time(&self, batch: f64) -> f64 {
        self.s0() + self.s1() * batch
    }

    fn decode_time(&self, batch: f64) -> f64 {
        self.alpha + self.beta * batch
    }

    fn prefill_time(&self, batch: f64) -> f64 {
        self.gamma + self.delta * self.avg_in_tokens * batch
    }
}

/// Steady-state metrics of one replica at a given arrival rate.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMetrics {
    /// Saturation ratio, arrival rate over the max sustainable rate.
    pub rho: f64,
    /// Mean queueing delay before prefill starts, ms.
    pub wait_ms: f64,
    pub prefill_ms: f64,
    pub itl_ms: f64,
    /// Mean time to first token: wait plus prefill, ms.
    pub ttft_ms: f64,
    /// Operating batch size.
    pub batch: u32,
    pub tokens_per_sec: f64,
}

/// Output of [`QueueingAnalyzer::size`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sizing {
    /// Largest sustainable per-replica arrival rate, req/ms.
    pub max_rate: f64,
    pub at_max: QueueMetrics,
}

#[derive(Debug, Clone)]
pub struct QueueingAnalyzer {
    params: ServiceParams,
    margin: f64,
}

impl QueueingAnalyzer {
    pub fn new(params: ServiceParams) -> Self {
        Self::with_percentile(params, DEFAULT_SLO_PERCENTILE)
    }

    pub fn with_percentile(params: ServiceParams, percentile: f64) -> Self {
        Self {
            params,
            margin: slo_margin(percentile),
        }
    }

    /// Largest batch size meeting the deterministic parts of the SLO.
    ///
    /// The ITL of a request equals the decode step time `alpha + beta * b`,
    /// and its prefill time is `gamma + delta * k_in * b`; both grow with
    /// the batch, so the SLO caps the batch. Infeasible when even a batch
    /// of one misses a target.
    fn effective_batch(&self, targets: &SloTargets) -> Result<u32, Infeasible> {
        let p = &self.params;
        if p.decode_time(1.0) > targets.itl_ms {
            return Err(Infeasible::ItlUnachievable);
        }
        if p.prefill_time(1.0) > targets.ttft_ms {
            return Err(Infeasible::TtftUnachievable);
        }

        let mut batch = p.max_batch.max(1) as f64;
        if p.beta > 0.0 {
            batch = batch.min(((targets.itl_ms - p.alpha) / p.beta).floor());
        }
        let prefill_slope = p.delta * p.avg_in_tokens;
        if prefill_slope > 0.0 {
            batch = batch.min(((targets.ttft_ms - p.gamma) / prefill_slope).floor());
        }
        Ok((batch as u32).max(1))
    }

    /// Compute the largest per-replica arrival rate for which the
    /// steady-state latencies honor the SLO, and the metrics at that rate.
    pub fn size(&self, targets: &SloTargets) -> Result<Sizing, Infeasible> {
        let p = &self.params;
        if p.avg_out_tokens <= 0.0 {
            // No output tokens to produce is treated as zero traffic.
            return Ok(Sizing {
                max_rate: 0.0,
                at_max: self.zero_traffic(),
            });
        }

        let batch = self.effective_batch(targets)? as f64;
        let service = p.service_time(batch);
        let max_throughput = sanitize(batch / service);

        let wait_budget = (targets.ttft_ms - p.prefill_time(batch)) / self.margin;
        // rho * T / (1 - rho) <= W  <=>  rho <= W / (T + W)
        let max_rate = sanitize(max_throughput * wait_budget / (service + wait_budget));
        if max_rate <= 0.0 {
            return Err(Infeasible::TtftUnachievable);
        }

        if let Some(tps) = targets.tps {
            if max_rate * p.avg_out_tokens * 1000.0 < tps {
                return Err(Infeasible::TpsUnachievable);
            }
        }

        Ok(Sizing {
            max_rate,
            at_max: self.analyze(targets, max_rate)?,
        })
    }

    /// Steady-state metrics at an arrival rate `lambda` (req/ms), expected
    /// to be at most the sized max rate.
    pub fn analyze(&self, targets: &SloTargets, lambda: f64) -> Result<QueueMetrics, Infeasible> {
        let p = &self.params;
        if lambda <= 0.0 || p.avg_out_tokens <= 0.0 {
            return Ok(self.zero_traffic());
        }

        let batch_limit = self.effective_batch(targets)?;
        let service = p.service_time(batch_limit as f64);
        let rho = sanitize(lambda * service / batch_limit as f64).max(0.0);

        // Operating batch: the smallest batch whose throughput covers the
        // arrival rate, `b >= lambda * s0 / (1 - lambda * s1)`.
        let denominator = 1.0 - lambda * p.s1();
        let batch = if denominator <= 0.0 {
            batch_limit
        } else {
            let raw = sanitize((lambda * p.s0() / denominator).ceil());
            (raw as u32).clamp(1, batch_limit)
        };

        let wait_cap = p.max_queue as f64 / batch_limit as f64 * service;
        let wait = if rho < 1.0 {
            sanitize(rho * service / (1.0 - rho)).min(wait_cap)
        } else {
            wait_cap
        };

        let prefill = p.prefill_time(batch as f64);
        Ok(QueueMetrics {
            rho,
            wait_ms: wait,
            prefill_ms: prefill,
            itl_ms: p.decode_time(batch as f64),
            ttft_ms: wait + prefill,
            batch,
            tokens_per_sec: sanitize(lambda * p.avg_out_tokens * 1000.0),
        })
    }

    /// Metrics of an idle replica: batch-one service with no queueing.
    fn zero_traffic(&self) -> QueueMetrics {
        let p = &self.params;
        let prefill = p.prefill_time(1.0);
        QueueMetrics {
            rho: 0.0,
            wait_ms: 0.0,
            prefill_ms: prefill,
            itl_ms: p.decode_time(1.0),
            ttft_ms: prefill,
            batch: 1,
            tokens_per_sec: 0.0,
        }
    }
}
