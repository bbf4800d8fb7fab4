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

//! One optimization tick.
//!
//! Inputs are sampled first (configuration tables, variant list, workload
//! replica counts, per-variant load), then the solver runs, then outputs
//! are written; the three phases never interleave. A fault confined to one
//! variant skips that variant with a condition and the tick continues.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use swell_collector::{collect_load, probe_liveness, LoadSample, ScopedTimeSeries};
use swell_common::config::OptimizerConfig;
use swell_common::model::{
    set_condition, Allocation, AllocationData, Condition, DesiredOptimizedAlloc,
    MetricsLiveness, SystemSnapshot, TunerPerfData, Variant, VariantServer,
};
use swell_common::util::retry::retry_transient;
use swell_common::{Error, Result};
use swell_solver::{solve, Candidate, CandidateOptions, SaturationPolicy, SolverOptions};
use thiserror_ext::AsReport as _;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::Event;
use crate::GlobalOptimizer;

/// Outcome of one tick, reported by the run loop.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub variants_processed: usize,
    pub optimization_successful: usize,
    /// Requeue interval the configuration currently asks for.
    pub interval: Duration,
}

struct PreparedServer {
    server: VariantServer,
    sample: LoadSample,
}

impl GlobalOptimizer {
    /// Run one reconcile over all active variants.
    pub async fn tick(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<TickSummary> {
        let now = Utc::now();

        // Input phase: configuration tables and the variant list.
        let entries = retry_transient(|| self.store.config_entries()).await?;
        let config = OptimizerConfig::from_kv(&entries)?;
        let accelerators = config.accelerator_table()?;
        let service_classes = config.service_class_table()?;
        let variants = retry_transient(|| self.store.list_variants()).await?;

        let mut snapshot = SystemSnapshot::new(accelerators, service_classes);
        let scoped = ScopedTimeSeries::new(self.backend.as_ref(), cancel, deadline);

        let mut processed = 0;
        let mut skipped: Vec<(Variant, Condition)> = Vec::new();
        let mut tuner_echoes: HashMap<String, TunerPerfData> = HashMap::new();
        let mut live: HashSet<String> = HashSet::new();

        for variant in variants {
            if variant.is_deleting() {
                continue;
            }
            processed += 1;
            live.insert(variant.full_name());

            match self.prepare(&scoped, &snapshot, variant, now).await {
                Ok(PreparedServer { mut server, sample }) => {
                    if config.experimental_model_tuner_enabled {
                        if let Some(echo) = self.tuner.tune_server(
                            &mut server,
                            &sample,
                            config.experimental_auto_guess_initial_state,
                        ) {
                            tuner_echoes.insert(server.full_name(), echo);
                        }
                    }
                    snapshot.register_server(server);
                }
                Err(skip) => skipped.push(skip),
            }
        }
        self.tuner.retain(|name| live.contains(name));

        // Solve phase.
        let placement = solve(&snapshot, &self.solver_options(&config));

        // Output phase.
        let mut successes = 0;
        for (name, server) in &snapshot.servers {
            let assignment = placement.assignments.get(name);
            let published = self
                .publish(server, assignment, tuner_echoes.remove(name), now)
                .await;
            if published && assignment.is_some() {
                successes += 1;
            }
        }
        for (variant, condition) in skipped {
            self.publish_skip(&variant, condition).await;
        }

        self.metrics.variants_processed.set(processed as i64);
        self.metrics.optimization_successful.set(successes as i64);

        Ok(TickSummary {
            variants_processed: processed,
            optimization_successful: successes,
            interval: config.global_opt_interval,
        })
    }

    fn solver_options(&self, config: &OptimizerConfig) -> SolverOptions {
        let saturation_policy = config
            .saturation_policy
            .parse::<SaturationPolicy>()
            .unwrap_or_else(|_| {
                warn!(
                    policy = config.saturation_policy,
                    "unrecognized saturation policy, using None"
                );
                SaturationPolicy::None
            });
        SolverOptions {
            // Cluster-capacity enforcement is not wired into the periodic
            // loop; the solver runs in unlimited mode.
            unlimited: true,
            delayed_best_effort: config.delayed_best_effort,
            saturation_policy,
            candidate: CandidateOptions {
                accel_penalty: config.accel_penalty,
                ..Default::default()
            },
        }
    }

    /// Assemble the per-variant inputs: SLO, workload replica count,
    /// metrics liveness and load. A failure confined to this variant
    /// returns it with the condition to record.
    async fn prepare(
        &self,
        scoped: &ScopedTimeSeries<'_>,
        snapshot: &SystemSnapshot,
        variant: Variant,
        now: DateTime<Utc>,
    ) -> std::result::Result<PreparedServer, (Variant, Condition)> {
        macro_rules! skip_optimization {
            ($message:expr) => {{
                let condition = Condition::optimization_ready(false, $message, now);
                return Err((variant, condition));
            }};
        }

        let (priority, slo) = match snapshot.service_classes.get(&variant.service_class) {
            Some(class) => match class.slo_for(&variant.model_id) {
                Some(slo) => (class.priority, slo.clone()),
                None => skip_optimization!(format!(
                    "service class {} has no SLO for model {}",
                    variant.service_class, variant.model_id
                )),
            },
            None => skip_optimization!(format!(
                "service class {} not found",
                variant.service_class
            )),
        };

        if let Err(message) = variant.validate() {
            skip_optimization!(message);
        }
        if snapshot.accelerator(&variant.accelerator).is_none() {
            skip_optimization!(format!(
                "accelerator {} is not in the cost table",
                variant.accelerator
            ));
        }

        let current_replicas = match retry_transient(|| {
            self.store.get_workload(&variant.namespace, &variant.name)
        })
        .await
        {
            Ok(workload) => {
                if workload.controller_ref.as_deref() != Some(&variant.full_name()[..]) {
                    if let Err(e) = self
                        .store
                        .set_controller_ref(&variant.namespace, &variant.name, &variant.full_name())
                        .await
                    {
                        warn!(
                            variant = %variant.full_name(),
                            error = %e.as_report(),
                            "failed to establish controller reference"
                        );
                    }
                }
                workload.replicas
            }
            // A variant whose workload has not materialized yet scales
            // from zero.
            Err(Error::NotFound(_)) => 0,
            Err(e) => skip_optimization!(format!("failed to read workload: {}", e.as_report())),
        };

        let liveness = probe_liveness(scoped, &variant.model_id, &variant.namespace, now).await;
        if !liveness.is_available() {
            let condition = Condition::metrics_available(
                liveness,
                format!(
                    "serving metrics for model {} in {} are not usable; check that the \
                     engine exposes them and that the metrics backend scrapes the namespace",
                    variant.model_id, variant.namespace
                ),
                now,
            );
            return Err((variant, condition));
        }

        let sample = match collect_load(scoped, &variant.model_id, &variant.namespace).await {
            Ok(sample) => sample,
            Err(e) => {
                let condition = Condition::metrics_available(
                    MetricsLiveness::Error,
                    format!("load queries failed: {}", e.as_report()),
                    now,
                );
                return Err((variant, condition));
            }
        };
        let load = sample.to_load_profile();

        let current_alloc = variant
            .status
            .current_alloc
            .as_ref()
            .map(|data| {
                let mut alloc = data.to_allocation();
                alloc.load = Some(load.clone());
                alloc
            })
            .or_else(|| self.synthesize_current(snapshot, &variant, current_replicas, &load));

        let server = VariantServer {
            priority,
            slo,
            load,
            current_alloc,
            current_replicas,
            profiles: variant.profiles.clone(),
            variant,
        };
        Ok(PreparedServer { server, sample })
    }

    /// A current allocation for a variant whose status has none yet but
    /// whose workload already runs replicas, priced from the cost table.
    fn synthesize_current(
        &self,
        snapshot: &SystemSnapshot,
        variant: &Variant,
        current_replicas: u32,
        load: &swell_common::model::LoadProfile,
    ) -> Option<Allocation> {
        if current_replicas == 0 {
            return None;
        }
        let accelerator = snapshot.accelerator(&variant.accelerator)?;
        let profile = variant.profile_for(&variant.accelerator)?;
        let units = profile.acc_count.saturating_mul(accelerator.multiplicity);
        Some(Allocation {
            accelerator: variant.accelerator.clone(),
            num_replicas: current_replicas,
            max_batch: profile.effective_max_batch(
                variant.max_batch_override,
                load.avg_output_tokens,
            ),
            cost: current_replicas as f64 * units as f64 * accelerator.unit_cost,
            itl_average: 0.0,
            ttft_average: 0.0,
            rho: 0.0,
            max_rate_per_replica: 0.0,
            load: Some(load.clone()),
        })
    }

    /// Write the tick's outputs for one optimized variant: the refreshed
    /// current allocation, the desired allocation (or the failure
    /// condition), and — only after the status write succeeded — the
    /// external gauges.
    async fn publish(
        &self,
        server: &VariantServer,
        assignment: Option<&Candidate>,
        tuner_echo: Option<TunerPerfData>,
        now: DateTime<Utc>,
    ) -> bool {
        let variant = &server.variant;
        let mut status = variant.status.clone();

        status.current_alloc = server.current_alloc.as_ref().map(|alloc| {
            let mut data = AllocationData::from(alloc);
            data.load = Some(server.load.clone());
            data
        });
        set_condition(
            &mut status.conditions,
            Condition::metrics_available(
                MetricsLiveness::Available,
                "serving metrics are fresh".to_owned(),
                now,
            ),
        );

        let mut target_changed = false;
        match assignment {
            Some(candidate) => {
                let previous = status.desired_optimized_alloc.take();
                let desired = DesiredOptimizedAlloc {
                    last_run_time: now,
                    accelerator: candidate.accelerator().to_owned(),
                    num_replicas: candidate.alloc.num_replicas,
                };
                // A new target means the external scaler has not applied
                // it yet.
                target_changed = previous.as_ref().map_or(true, |p| {
                    p.accelerator != desired.accelerator || p.num_replicas != desired.num_replicas
                });
                if target_changed {
                    let mut actuation = status.actuation.take().unwrap_or_default();
                    actuation.applied = false;
                    status.actuation = Some(actuation);
                }
                status.desired_optimized_alloc = Some(desired);
                set_condition(
                    &mut status.conditions,
                    Condition::optimization_ready(true, "optimization succeeded".to_owned(), now),
                );
                if let Some(echo) = tuner_echo {
                    status.tuner_perf_data = Some(echo);
                }
            }
            None => {
                set_condition(
                    &mut status.conditions,
                    Condition::optimization_ready(
                        false,
                        "no allocation satisfies the SLO on any supported accelerator".to_owned(),
                        now,
                    ),
                );
            }
        }

        let patched = retry_transient(|| {
            self.store
                .patch_variant_status(&variant.namespace, &variant.name, &status)
        })
        .await;
        if let Err(e) = patched {
            warn!(
                variant = %variant.full_name(),
                error = %e.as_report(),
                "failed to publish variant status"
            );
            return false;
        }

        match assignment {
            Some(candidate) => {
                self.metrics.publish(
                    &variant.name,
                    &variant.namespace,
                    candidate.accelerator(),
                    server.current_replicas,
                    candidate.alloc.num_replicas,
                );
                if target_changed && candidate.alloc.num_replicas != server.current_replicas {
                    self.record_event(Event::scaling(
                        &variant.namespace,
                        &variant.name,
                        server.current_replicas,
                        candidate.alloc.num_replicas,
                        candidate.accelerator(),
                    ))
                    .await;
                }
            }
            None => {
                self.record_event(Event::warning(
                    &variant.namespace,
                    &variant.name,
                    swell_common::model::REASON_OPTIMIZATION_FAILED,
                    "no allocation satisfies the SLO on any supported accelerator".to_owned(),
                ))
                .await;
            }
        }
        true
    }

    /// Events are advisory; a failing sink never fails the tick.
    async fn record_event(&self, event: Event) {
        if let Err(e) = self.events.record(event).await {
            debug!(error = %e.as_report(), "failed to record event");
        }
    }

    /// Record the skip reason for a variant left out of this tick. Its
    /// desired allocation is untouched.
    async fn publish_skip(&self, variant: &Variant, condition: Condition) {
        self.record_event(Event::warning(
            &variant.namespace,
            &variant.name,
            &condition.reason,
            condition.message.clone(),
        ))
        .await;
        let mut status = variant.status.clone();
        set_condition(&mut status.conditions, condition);
        let patched = retry_transient(|| {
            self.store
                .patch_variant_status(&variant.namespace, &variant.name, &status)
        })
        .await;
        if let Err(e) = patched {
            warn!(
                variant = %variant.full_name(),
                error = %e.as_report(),
                "failed to record skip condition"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use swell_collector::queries::{
        arrival_rate_query, generation_tokens_query, per_output_token_query, presence_query,
        prompt_tokens_query, queue_time_query,
    };
    use swell_collector::MemTimeSeries;
    use swell_common::config::{
        ACCELERATOR_COST_TABLE_KEY, ACCEL_PENALTY_KEY, GLOBAL_OPT_INTERVAL_KEY,
        SERVICE_CLASS_TABLE_KEY,
    };
    use swell_common::model::{
        ConditionStatus, PerfProfile, VariantStatus, CONDITION_METRICS_AVAILABLE,
        CONDITION_OPTIMIZATION_READY,
    };
    use swell_solver::DEFAULT_ACCEL_PENALTY;

    use crate::store::MemStore;
    use crate::{GlobalOptimizer, OptimizerMetrics, Workload};

    use super::*;

    struct Harness {
        store: Arc<MemStore>,
        backend: Arc<MemTimeSeries>,
        optimizer: GlobalOptimizer,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemStore::new());
        let backend = Arc::new(MemTimeSeries::new());
        store.set_config_entry(
            ACCELERATOR_COST_TABLE_KEY,
            serde_json::json!([
                {"name": "H100", "unitCost": 100.0},
                {"name": "A100", "unitCost": 40.0},
            ])
            .to_string(),
        );
        store.set_config_entry(
            SERVICE_CLASS_TABLE_KEY,
            serde_json::json!([{
                "name": "premium",
                "priority": 1,
                "models": {"llama-70b": {"ttftMs": 1000.0, "itlMs": 9.0}},
            }])
            .to_string(),
        );
        let optimizer = GlobalOptimizer::new(
            store.clone(),
            backend.clone(),
            Arc::new(OptimizerMetrics::for_test()),
        );
        Harness {
            store,
            backend,
            optimizer,
        }
    }

    fn h100_profile() -> PerfProfile {
        PerfProfile {
            accelerator: "H100".into(),
            acc_count: 1,
            alpha: 6.958,
            beta: 0.042,
            gamma: 0.0,
            delta: 0.0,
            max_batch_size: 512,
            at_tokens: 200,
        }
    }

    fn variant(name: &str, profiles: Vec<PerfProfile>) -> Variant {
        Variant {
            name: name.into(),
            namespace: "inference".into(),
            model_id: "llama-70b".into(),
            accelerator: profiles[0].accelerator.clone(),
            profiles,
            min_replicas: 1,
            max_batch_override: None,
            service_class: "premium".into(),
            keep_accelerator: false,
            labels: BTreeMap::new(),
            deletion_timestamp: None,
            status: VariantStatus::default(),
        }
    }

    fn workload(name: &str, replicas: u32) -> Workload {
        Workload {
            name: name.into(),
            namespace: "inference".into(),
            replicas,
            controller_ref: None,
        }
    }

    /// Seed the metrics backend with a steady load for (model, namespace).
    fn set_load(backend: &MemTimeSeries, req_per_sec: f64) {
        let now = Utc::now().timestamp() as f64;
        backend.set_scalar(presence_query("llama-70b", "inference"), 4.0, now);
        backend.set_scalar(arrival_rate_query("llama-70b", "inference"), req_per_sec, now);
        backend.set_scalar(prompt_tokens_query("llama-70b", "inference"), 100.0, now);
        backend.set_scalar(generation_tokens_query("llama-70b", "inference"), 200.0, now);
        backend.set_scalar(queue_time_query("llama-70b", "inference"), 0.05, now);
        backend.set_scalar(per_output_token_query("llama-70b", "inference"), 0.008, now);
    }

    async fn run_tick(h: &Harness) -> TickSummary {
        let cancel = CancellationToken::new();
        h.optimizer.tick(&cancel, None).await.unwrap()
    }

    fn condition<'a>(variant: &'a Variant, type_: &str) -> &'a Condition {
        variant
            .status
            .conditions
            .iter()
            .find(|c| c.type_ == type_)
            .unwrap_or_else(|| panic!("no {type_} condition"))
    }

    #[tokio::test]
    async fn test_single_variant_slack_capacity() {
        let h = harness();
        h.store.insert_variant(variant("llama-70b-a", vec![h100_profile()]));
        h.store.insert_workload(workload("llama-70b-a", 1));
        set_load(&h.backend, 1.0); // 60 req/min

        let summary = run_tick(&h).await;
        assert_eq!(summary.variants_processed, 1);
        assert_eq!(summary.optimization_successful, 1);
        assert_eq!(summary.interval, Duration::from_secs(60));

        let v = h.store.variant("inference/llama-70b-a").unwrap();
        let desired = v.status.desired_optimized_alloc.as_ref().unwrap();
        assert_eq!(desired.accelerator, "H100");
        assert_eq!(desired.num_replicas, 1);

        let current = v.status.current_alloc.as_ref().unwrap();
        assert!(current.itl_average < 9.0 || current.itl_average == 0.0);
        assert_eq!(current.load.as_ref().unwrap().arrival_rate, 60.0);

        assert_eq!(
            condition(&v, CONDITION_OPTIMIZATION_READY).status,
            ConditionStatus::True
        );
        assert_eq!(
            condition(&v, CONDITION_METRICS_AVAILABLE).status,
            ConditionStatus::True
        );

        // Controller reference established on the workload.
        let w = h.store.workload("inference/llama-70b-a").unwrap();
        assert_eq!(w.controller_ref.as_deref(), Some("inference/llama-70b-a"));

        let labels = &["llama-70b-a", "inference", "H100"];
        let m = h.optimizer.metrics();
        assert_eq!(m.desired_replicas.with_label_values(labels).get(), 1);
        assert_eq!(m.current_replicas.with_label_values(labels).get(), 1);
        assert_eq!(m.desired_ratio.with_label_values(labels).get(), 1.0);
    }

    #[tokio::test]
    async fn test_load_spike_scales_up() {
        let h = harness();
        h.store.insert_variant(variant("llama-70b-a", vec![h100_profile()]));
        h.store.insert_workload(workload("llama-70b-a", 1));
        set_load(&h.backend, 8.0); // 480 req/min

        run_tick(&h).await;

        let v = h.store.variant("inference/llama-70b-a").unwrap();
        let desired = v.status.desired_optimized_alloc.as_ref().unwrap();
        assert!(desired.num_replicas >= 2, "got {}", desired.num_replicas);

        let labels = &["llama-70b-a", "inference", "H100"];
        let m = h.optimizer.metrics();
        assert!(m.desired_ratio.with_label_values(labels).get() > 1.0);
        let up = &["llama-70b-a", "inference", "H100", "up", "load_increase"];
        assert_eq!(m.replica_scaling_total.with_label_values(up).get(), 1);
    }

    #[tokio::test]
    async fn test_cheap_accelerator_saturates_on_itl() {
        // A100 is cheap but its decode slope caps the batch at 8, so it
        // needs far more replicas than the H100 under the same SLO.
        let h = harness();
        let a100 = PerfProfile {
            accelerator: "A100".into(),
            acc_count: 1,
            alpha: 1.0,
            beta: 1.0,
            gamma: 0.0,
            delta: 0.0,
            max_batch_size: 512,
            at_tokens: 200,
        };
        let mut v = variant("llama-70b-a", vec![h100_profile(), a100]);
        v.accelerator = "H100".into();
        h.store.insert_variant(v);
        h.store.insert_workload(workload("llama-70b-a", 1));
        set_load(&h.backend, 8.0);

        run_tick(&h).await;

        let v = h.store.variant("inference/llama-70b-a").unwrap();
        let desired = v.status.desired_optimized_alloc.as_ref().unwrap();
        assert_eq!(desired.accelerator, "H100");
    }

    #[tokio::test]
    async fn test_transition_penalty_prefers_current_accelerator() {
        // Current allocation: A100 at 2 replicas, cost 20. The new tick
        // offers A100@3 (cost 30, penalty 10) against H100@2 (cost 18,
        // cross-type penalty 1.8 at the default factor): H100 wins.
        let h = harness();
        h.store.set_config_entry(
            ACCELERATOR_COST_TABLE_KEY,
            serde_json::json!([
                {"name": "H100", "unitCost": 9.0},
                {"name": "A100", "unitCost": 10.0},
            ])
            .to_string(),
        );
        let a100 = PerfProfile {
            accelerator: "A100".into(),
            acc_count: 1,
            alpha: 6.958,
            beta: 0.06,
            gamma: 0.0,
            delta: 0.0,
            max_batch_size: 512,
            at_tokens: 200,
        };
        let mut v = variant("llama-70b-a", vec![a100, h100_profile()]);
        v.accelerator = "A100".into();
        v.status.current_alloc = Some(AllocationData {
            accelerator: "A100".into(),
            num_replicas: 2,
            max_batch: 34,
            variant_cost: 20.0,
            itl_average: 0.0,
            ttft_average: 0.0,
            load: None,
        });
        h.store.insert_variant(v.clone());
        h.store.insert_workload(workload("llama-70b-a", 2));
        set_load(&h.backend, 8.0);

        run_tick(&h).await;
        let got = h.store.variant("inference/llama-70b-a").unwrap();
        assert_eq!(
            got.status.desired_optimized_alloc.as_ref().unwrap().accelerator,
            "H100"
        );

        // With a tenfold penalty the cross-type move costs 36 > 10 and the
        // variant stays on A100.
        h.store.set_config_entry(ACCEL_PENALTY_KEY, "1.0");
        let mut v = v;
        v.status = got.status.clone();
        v.status.current_alloc = Some(AllocationData {
            accelerator: "A100".into(),
            num_replicas: 2,
            max_batch: 34,
            variant_cost: 20.0,
            itl_average: 0.0,
            ttft_average: 0.0,
            load: None,
        });
        v.status.desired_optimized_alloc = None;
        h.store.insert_variant(v);

        run_tick(&h).await;
        let got = h.store.variant("inference/llama-70b-a").unwrap();
        assert_eq!(
            got.status.desired_optimized_alloc.as_ref().unwrap().accelerator,
            "A100"
        );
        assert_eq!(
            got.status.desired_optimized_alloc.as_ref().unwrap().num_replicas,
            3
        );
    }

    #[tokio::test]
    async fn test_stale_metrics_skip_variant() {
        let h = harness();
        h.store.insert_variant(variant("llama-70b-a", vec![h100_profile()]));
        h.store.insert_workload(workload("llama-70b-a", 1));
        set_load(&h.backend, 1.0);
        // Overwrite the presence metric with a ten-minute-old sample.
        let old = Utc::now().timestamp() as f64 - 600.0;
        h.backend
            .set_scalar(presence_query("llama-70b", "inference"), 4.0, old);

        let summary = run_tick(&h).await;
        assert_eq!(summary.variants_processed, 1);
        assert_eq!(summary.optimization_successful, 0);

        let v = h.store.variant("inference/llama-70b-a").unwrap();
        assert!(v.status.desired_optimized_alloc.is_none());
        let cond = condition(&v, CONDITION_METRICS_AVAILABLE);
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.reason, "MetricsStale");
    }

    #[tokio::test]
    async fn test_metrics_missing_and_error_reasons() {
        let h = harness();
        h.store.insert_variant(variant("llama-70b-a", vec![h100_profile()]));
        h.store.insert_workload(workload("llama-70b-a", 1));

        // No presence series at all.
        run_tick(&h).await;
        let v = h.store.variant("inference/llama-70b-a").unwrap();
        assert_eq!(condition(&v, CONDITION_METRICS_AVAILABLE).reason, "MetricsMissing");

        // Query layer down.
        h.backend.set_unavailable(true);
        run_tick(&h).await;
        let v = h.store.variant("inference/llama-70b-a").unwrap();
        assert_eq!(condition(&v, CONDITION_METRICS_AVAILABLE).reason, "PrometheusError");
    }

    #[tokio::test]
    async fn test_unlimited_mode_is_per_variant_optimum() {
        let h = harness();
        for (name, accelerator) in [("a", "H100"), ("b", "A100"), ("c", "H100")] {
            let mut profile = h100_profile();
            profile.accelerator = accelerator.into();
            h.store.insert_variant(variant(name, vec![profile]));
            h.store.insert_workload(workload(name, 1));
        }
        set_load(&h.backend, 1.0);

        let summary = run_tick(&h).await;
        assert_eq!(summary.variants_processed, 3);
        assert_eq!(summary.optimization_successful, 3);
        for (name, accelerator) in [("a", "H100"), ("b", "A100"), ("c", "H100")] {
            let v = h.store.variant(&format!("inference/{name}")).unwrap();
            let desired = v.status.desired_optimized_alloc.as_ref().unwrap();
            assert_eq!(desired.accelerator, accelerator);
            assert_eq!(desired.num_replicas, 1);
        }
    }

    #[tokio::test]
    async fn test_infeasible_slo_sets_optimization_failed() {
        let h = harness();
        h.store.set_config_entry(
            SERVICE_CLASS_TABLE_KEY,
            serde_json::json!([{
                "name": "premium",
                "priority": 1,
                // ITL below alpha + beta: unmeetable at any batch.
                "models": {"llama-70b": {"ttftMs": 1000.0, "itlMs": 5.0}},
            }])
            .to_string(),
        );
        h.store.insert_variant(variant("llama-70b-a", vec![h100_profile()]));
        h.store.insert_workload(workload("llama-70b-a", 1));
        set_load(&h.backend, 1.0);

        let summary = run_tick(&h).await;
        assert_eq!(summary.optimization_successful, 0);

        let v = h.store.variant("inference/llama-70b-a").unwrap();
        assert!(v.status.desired_optimized_alloc.is_none());
        let cond = condition(&v, CONDITION_OPTIMIZATION_READY);
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.reason, "OptimizationFailed");
    }

    #[tokio::test]
    async fn test_deleting_variant_filtered() {
        let h = harness();
        let mut v = variant("llama-70b-a", vec![h100_profile()]);
        v.deletion_timestamp = Some(Utc::now());
        h.store.insert_variant(v);
        set_load(&h.backend, 1.0);

        let summary = run_tick(&h).await;
        assert_eq!(summary.variants_processed, 0);
    }

    #[tokio::test]
    async fn test_missing_config_table_fails_tick() {
        let store = Arc::new(MemStore::new());
        let backend = Arc::new(MemTimeSeries::new());
        let optimizer = GlobalOptimizer::new(
            store.clone(),
            backend,
            Arc::new(OptimizerMetrics::for_test()),
        );
        store.insert_variant(variant("llama-70b-a", vec![h100_profile()]));

        let cancel = CancellationToken::new();
        let err = optimizer.tick(&cancel, None).await.unwrap_err();
        assert_matches!(err, Error::ConfigMissing(_));
        // No status was written.
        let v = store.variant("inference/llama-70b-a").unwrap();
        assert!(v.status.conditions.is_empty());
    }

    #[tokio::test]
    async fn test_patch_conflicts_are_retried() {
        let h = harness();
        h.store.insert_variant(variant("llama-70b-a", vec![h100_profile()]));
        h.store.insert_workload(workload("llama-70b-a", 1));
        set_load(&h.backend, 1.0);
        h.store.inject_patch_conflicts(2);

        let summary = run_tick(&h).await;
        assert_eq!(summary.optimization_successful, 1);
        let v = h.store.variant("inference/llama-70b-a").unwrap();
        assert!(v.status.desired_optimized_alloc.is_some());
    }

    #[tokio::test]
    async fn test_faulty_variant_does_not_block_others() {
        let h = harness();
        // "bad" references a service class that does not exist.
        let mut bad = variant("bad", vec![h100_profile()]);
        bad.service_class = "gold".into();
        h.store.insert_variant(bad);
        h.store.insert_variant(variant("good", vec![h100_profile()]));
        h.store.insert_workload(workload("good", 1));
        set_load(&h.backend, 1.0);

        let summary = run_tick(&h).await;
        assert_eq!(summary.variants_processed, 2);
        assert_eq!(summary.optimization_successful, 1);

        let good = h.store.variant("inference/good").unwrap();
        assert!(good.status.desired_optimized_alloc.is_some());
        let bad = h.store.variant("inference/bad").unwrap();
        assert!(bad.status.desired_optimized_alloc.is_none());
        assert_eq!(
            condition(&bad, CONDITION_OPTIMIZATION_READY).status,
            ConditionStatus::False
        );
    }

    #[tokio::test]
    async fn test_interval_follows_configuration() {
        let h = harness();
        h.store.set_config_entry(GLOBAL_OPT_INTERVAL_KEY, "30s");
        set_load(&h.backend, 1.0);
        let summary = run_tick(&h).await;
        assert_eq!(summary.interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_zero_load_zero_min_scales_to_zero() {
        let h = harness();
        let mut v = variant("llama-70b-a", vec![h100_profile()]);
        v.min_replicas = 0;
        h.store.insert_variant(v);
        h.store.insert_workload(workload("llama-70b-a", 1));
        // Presence is fresh but all load series are absent: zero traffic.
        let now = Utc::now().timestamp() as f64;
        h.backend
            .set_scalar(presence_query("llama-70b", "inference"), 0.0, now);

        run_tick(&h).await;
        let v = h.store.variant("inference/llama-70b-a").unwrap();
        let desired = v.status.desired_optimized_alloc.as_ref().unwrap();
        assert_eq!(desired.num_replicas, 0);
    }

    #[tokio::test]
    async fn test_default_penalty_constant() {
        assert_eq!(DEFAULT_ACCEL_PENALTY, 0.1);
        assert_eq!(OptimizerConfig::default().accel_penalty, 0.1);
    }

    #[tokio::test]
    async fn test_scaling_event_and_actuation_reset() {
        use crate::event::{EventType, MemRecorder};

        let h = harness();
        let recorder = Arc::new(MemRecorder::new());
        let optimizer = GlobalOptimizer::new(
            h.store.clone(),
            h.backend.clone(),
            Arc::new(OptimizerMetrics::for_test()),
        )
        .with_event_recorder(recorder.clone());

        h.store.insert_variant(variant("llama-70b-a", vec![h100_profile()]));
        h.store.insert_workload(workload("llama-70b-a", 1));
        set_load(&h.backend, 8.0);

        let cancel = CancellationToken::new();
        optimizer.tick(&cancel, None).await.unwrap();

        // Scale-up event recorded.
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, "ScalingUp");
        assert_eq!(events[0].type_, EventType::Normal);

        // A fresh target is pending actuation.
        let v = h.store.variant("inference/llama-70b-a").unwrap();
        assert!(!v.status.actuation.as_ref().unwrap().applied);

        // An unchanged decision on the next tick emits no new scaling
        // event and leaves the actuation block alone.
        let mut v = v;
        v.status.actuation.as_mut().unwrap().applied = true;
        h.store.insert_variant(v);
        optimizer.tick(&cancel, None).await.unwrap();
        let v = h.store.variant("inference/llama-70b-a").unwrap();
        assert!(v.status.actuation.as_ref().unwrap().applied);
    }

    #[tokio::test]
    async fn test_skip_emits_warning_event() {
        use crate::event::{EventType, MemRecorder};

        let h = harness();
        let recorder = Arc::new(MemRecorder::new());
        let optimizer = GlobalOptimizer::new(
            h.store.clone(),
            h.backend.clone(),
            Arc::new(OptimizerMetrics::for_test()),
        )
        .with_event_recorder(recorder.clone());

        h.store.insert_variant(variant("llama-70b-a", vec![h100_profile()]));
        h.store.insert_workload(workload("llama-70b-a", 1));
        // No serving metrics at all.

        let cancel = CancellationToken::new();
        optimizer.tick(&cancel, None).await.unwrap();

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].type_, EventType::Warning);
        assert_eq!(events[0].reason, "MetricsMissing");
    }
}
