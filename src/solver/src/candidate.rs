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

//! Candidate allocation generation for one (variant, accelerator) pair.

use swell_common::model::{Accelerator, Allocation, PerfProfile, VariantServer};
use swell_common::util::{per_min_to_per_ms, per_ms_to_per_min, sanitize};

use crate::queueing::{QueueingAnalyzer, ServiceParams, DEFAULT_QUEUE_RATIO, DEFAULT_SLO_PERCENTILE};

/// Fraction of the combined old and new cost charged for moving a variant
/// across accelerator types, so borderline re-optimizations stick to the
/// current type.
pub const DEFAULT_ACCEL_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateOptions {
    pub accel_penalty: f64,
    pub queue_ratio: u32,
    pub slo_percentile: f64,
}

impl Default for CandidateOptions {
    fn default() -> Self {
        Self {
            accel_penalty: DEFAULT_ACCEL_PENALTY,
            queue_ratio: DEFAULT_QUEUE_RATIO,
            slo_percentile: DEFAULT_SLO_PERCENTILE,
        }
    }
}

/// A feasible allocation of one variant on one accelerator type, ranked by
/// `value`: the transition penalty against the current allocation, or the
/// plain cost when the variant holds nothing yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub alloc: Allocation,
    /// Accelerator units consumed per replica.
    pub units_per_replica: u32,
    pub value: f64,
}

impl Candidate {
    pub fn accelerator(&self) -> &str {
        &self.alloc.accelerator
    }

    /// Total accelerator units this candidate consumes.
    pub fn units(&self) -> u32 {
        self.alloc.num_replicas.saturating_mul(self.units_per_replica)
    }
}

/// Synthetic cost of moving from `current` to a new allocation. Resizing
/// on the same accelerator charges only the cost delta; changing the
/// accelerator type additionally charges a fraction of both costs.
pub fn transition_penalty(
    current_accelerator: &str,
    current_cost: f64,
    new_accelerator: &str,
    new_cost: f64,
    accel_penalty: f64,
) -> f64 {
    if current_accelerator == new_accelerator {
        (new_cost - current_cost).abs()
    } else {
        accel_penalty * (current_cost + new_cost) + (new_cost - current_cost)
    }
}

/// Build the candidate allocation of `server` on `accelerator`, or `None`
/// when the SLO is structurally unmeetable on this service law.
pub fn generate_candidate(
    server: &VariantServer,
    accelerator: &Accelerator,
    profile: &PerfProfile,
    opts: &CandidateOptions,
) -> Option<Candidate> {
    if server.variant.keep_accelerator && profile.accelerator != server.variant.accelerator {
        return None;
    }

    let load = &server.load;
    let max_batch =
        profile.effective_max_batch(server.variant.max_batch_override, load.avg_output_tokens);
    let params = ServiceParams::from_profile(profile, max_batch, opts.queue_ratio, load);
    let analyzer = QueueingAnalyzer::with_percentile(params, opts.slo_percentile);

    let sizing = analyzer.size(&server.slo).ok()?;

    // Aggregate rate the allocation must sustain, req/ms. A TPS target
    // overrides the observed arrival rate.
    let total_rate = match server.slo.tps {
        Some(tps) => sanitize(tps / load.avg_output_tokens.max(1.0) / 1000.0),
        None => per_min_to_per_ms(load.arrival_rate),
    };

    let demanded = sanitize((total_rate / sizing.max_rate).ceil()) as u32;
    let num_replicas = demanded.max(server.variant.min_replicas);

    let per_replica_rate = if num_replicas > 0 {
        total_rate / num_replicas as f64
    } else {
        0.0
    };
    let metrics = analyzer.analyze(&server.slo, per_replica_rate).ok()?;

    let units_per_replica = profile.acc_count.saturating_mul(accelerator.multiplicity);
    let cost = num_replicas as f64 * units_per_replica as f64 * accelerator.unit_cost;

    let alloc = Allocation {
        accelerator: profile.accelerator.clone(),
        num_replicas,
        max_batch,
        cost,
        itl_average: metrics.itl_ms,
        ttft_average: metrics.ttft_ms,
        rho: metrics.rho,
        max_rate_per_replica: per_ms_to_per_min(sizing.max_rate),
        load: None,
    };

    let value = match server.current_alloc.as_ref().filter(|c| !c.is_zero()) {
        Some(current) => transition_penalty(
            &current.accelerator,
            current.cost,
            &alloc.accelerator,
            alloc.cost,
            opts.accel_penalty,
        ),
        None => cost,
    };

    Some(Candidate {
        alloc,
        units_per_replica,
        value,
    })
}
