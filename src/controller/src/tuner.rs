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

//! Engine-resident tuner state.
//!
//! The Kalman estimators are the only state crossing ticks. They are keyed
//! by (variant full name, accelerator) and each estimator sits behind its
//! own lock; the outer map lock is only held to fetch the entry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use swell_common::model::{TunerPerfData, VariantServer};
use swell_common::util::per_min_to_per_ms;
use swell_collector::LoadSample;
use swell_solver::kalman::{PerfEstimator, TunerObservation};
use swell_solver::queueing::{QueueingAnalyzer, ServiceParams, DEFAULT_QUEUE_RATIO};
use tracing::debug;

type EstimatorKey = (String, String);

#[derive(Default)]
pub struct TunerState {
    estimators: Mutex<HashMap<EstimatorKey, Arc<Mutex<PerfEstimator>>>>,
}

impl TunerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refine the server's service law on its labeled accelerator from the
    /// observed latencies. On success the tuned profile replaces the
    /// declared one for this tick and the estimate is echoed back for the
    /// status; a rejected observation leaves the declared values in place.
    pub fn tune_server(
        &self,
        server: &mut VariantServer,
        sample: &LoadSample,
        auto_guess: bool,
    ) -> Option<TunerPerfData> {
        let accelerator = server.variant.accelerator.clone();
        let index = server
            .profiles
            .iter()
            .position(|p| p.accelerator == accelerator)?;
        let declared = server.profiles[index].clone();

        // Estimate the operating point from the declared law to recover
        // the batch size and the queueing share of the observed TTFT.
        let max_batch =
            declared.effective_max_batch(server.variant.max_batch_override, sample.avg_output_tokens);
        let params =
            ServiceParams::from_profile(&declared, max_batch, DEFAULT_QUEUE_RATIO, &server.load);
        let analyzer = QueueingAnalyzer::new(params);
        let per_replica_rate =
            per_min_to_per_ms(sample.arrival_rate) / server.current_replicas.max(1) as f64;
        let metrics = analyzer.analyze(&server.slo, per_replica_rate).ok()?;

        let observation = TunerObservation {
            batch: metrics.batch as f64,
            in_tokens: sample.avg_input_tokens,
            itl_ms: sample.itl_avg_ms,
            prefill_ms: (sample.ttft_avg_ms - metrics.wait_ms).max(0.0),
        };

        let estimator = {
            let mut estimators = self.estimators.lock();
            estimators
                .entry((server.full_name(), accelerator.clone()))
                .or_insert_with(|| {
                    let seed = if auto_guess {
                        PerfEstimator::auto_seeded(&declared, &observation)
                    } else {
                        PerfEstimator::from_profile(&declared)
                    };
                    Arc::new(Mutex::new(seed))
                })
                .clone()
        };

        let mut estimator = estimator.lock();
        if !estimator.observe(&observation) {
            debug!(
                variant = %server.full_name(),
                accelerator,
                "tuner observation rejected, keeping declared parameters"
            );
            return None;
        }

        let tuned = estimator.tuned_profile();
        let echo = TunerPerfData {
            accelerator,
            alpha: tuned.alpha,
            beta: tuned.beta,
            gamma: tuned.gamma,
            delta: tuned.delta,
        };
        server.profiles[index] = tuned;
        Some(echo)
    }

    /// Drop estimators for variants that no longer exist.
    pub fn retain(&self, live: impl Fn(&str) -> bool) {
        self.estimators.lock().retain(|(name, _), _| live(name));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use swell_common::model::{
        LoadProfile, PerfProfile, SloTargets, Variant, VariantStatus,
    };

    use super::*;

    fn server() -> VariantServer {
        let profile = PerfProfile {
            accelerator: "H100".into(),
            acc_count: 1,
            alpha: 6.958,
            beta: 0.042,
            gamma: 0.0,
            delta: 0.0,
            max_batch_size: 512,
            at_tokens: 200,
        };
        let variant = Variant {
            name: "llama-70b-a".into(),
            namespace: "inference".into(),
            model_id: "llama-70b".into(),
            accelerator: "H100".into(),
            profiles: vec![profile.clone()],
            min_replicas: 1,
            max_batch_override: None,
            service_class: "premium".into(),
            keep_accelerator: false,
            labels: BTreeMap::new(),
            deletion_timestamp: None,
            status: VariantStatus::default(),
        };
        VariantServer {
            priority: 1,
            slo: SloTargets {
                ttft_ms: 1000.0,
                itl_ms: 9.0,
                tps: None,
            },
            load: LoadProfile {
                arrival_rate: 60.0,
                avg_input_tokens: 100.0,
                avg_output_tokens: 200.0,
            },
            current_alloc: None,
            current_replicas: 1,
            profiles: vec![profile],
            variant,
        }
    }

    fn sample(itl_ms: f64) -> LoadSample {
        LoadSample {
            arrival_rate: 60.0,
            avg_input_tokens: 100.0,
            avg_output_tokens: 200.0,
            ttft_avg_ms: 20.0,
            itl_avg_ms: itl_ms,
        }
    }

    #[test]
    fn test_tuned_profile_substituted_for_tick() {
        let tuner = TunerState::new();
        let mut s = server();
        let echo = tuner.tune_server(&mut s, &sample(8.0), false).unwrap();
        assert_eq!(echo.accelerator, "H100");
        // The tick's effective profile is the tuned one.
        assert_eq!(s.profiles[0].alpha, echo.alpha);
        // Estimate moved toward the hotter observation.
        assert!(echo.alpha > 6.958);
        // Calibration fields survive tuning.
        assert_eq!(s.profiles[0].max_batch_size, 512);
    }

    #[test]
    fn test_rejected_observation_keeps_declared_values() {
        let tuner = TunerState::new();
        let mut s = server();
        assert!(tuner.tune_server(&mut s, &sample(f64::NAN), false).is_none());
        assert_eq!(s.profiles[0].alpha, 6.958);
    }

    #[test]
    fn test_state_persists_across_ticks() {
        let tuner = TunerState::new();
        let mut s = server();
        let first = tuner.tune_server(&mut s, &sample(8.0), false).unwrap();
        // A fresh server (as each tick builds) keeps refining the same
        // estimator rather than starting over.
        let mut s = server();
        let second = tuner.tune_server(&mut s, &sample(8.0), false).unwrap();
        assert!(second.alpha > first.alpha);
    }

    #[test]
    fn test_retain_drops_dead_variants() {
        let tuner = TunerState::new();
        let mut s = server();
        tuner.tune_server(&mut s, &sample(8.0), false).unwrap();
        tuner.retain(|_| false);
        assert!(tuner.estimators.lock().is_empty());
    }
}
