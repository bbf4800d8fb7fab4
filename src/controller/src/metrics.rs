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

use prometheus::core::{AtomicU64, GenericCounterVec};
use prometheus::{
    register_gauge_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry, GaugeVec, IntGauge,
    IntGaugeVec, Registry,
};

const VARIANT_LABELS: &[&str] = &["variant_name", "namespace", "accelerator_type"];

/// External metrics of the optimizer. `desired_replicas` is the signal an
/// external horizontal scaler consumes; the rest are observability.
pub struct OptimizerMetrics {
    pub registry: Registry,
    pub desired_replicas: IntGaugeVec,
    pub current_replicas: IntGaugeVec,
    pub desired_ratio: GaugeVec,
    pub replica_scaling_total: GenericCounterVec<AtomicU64>,
    pub variants_processed: IntGauge,
    pub optimization_successful: IntGauge,
}

impl OptimizerMetrics {
    pub fn new(registry: Registry) -> Self {
        let desired_replicas = register_int_gauge_vec_with_registry!(
            "desired_replicas",
            "replica count the optimizer wants for the variant",
            VARIANT_LABELS,
            &registry
        )
        .unwrap();

        let current_replicas = register_int_gauge_vec_with_registry!(
            "current_replicas",
            "replica count currently observed on the workload",
            VARIANT_LABELS,
            &registry
        )
        .unwrap();

        let desired_ratio = register_gauge_vec_with_registry!(
            "desired_ratio",
            "desired over current replicas, or desired when current is zero",
            VARIANT_LABELS,
            &registry
        )
        .unwrap();

        let replica_scaling_total = register_int_counter_vec_with_registry!(
            "replica_scaling_total",
            "scaling decisions by direction and reason",
            &["variant_name", "namespace", "accelerator_type", "direction", "reason"],
            &registry
        )
        .unwrap();

        let variants_processed = register_int_gauge_with_registry!(
            "variants_processed",
            "variants handled by the last optimization tick",
            &registry
        )
        .unwrap();

        let optimization_successful = register_int_gauge_with_registry!(
            "optimization_successful",
            "variants that received an allocation in the last tick",
            &registry
        )
        .unwrap();

        Self {
            registry,
            desired_replicas,
            current_replicas,
            desired_ratio,
            replica_scaling_total,
            variants_processed,
            optimization_successful,
        }
    }

    pub fn for_test() -> Self {
        Self::new(Registry::new())
    }

    /// Publish the per-variant gauges after a successful status write, so
    /// gauges always agree with the last published status.
    pub fn publish(
        &self,
        variant_name: &str,
        namespace: &str,
        accelerator: &str,
        current: u32,
        desired: u32,
    ) {
        let labels = &[variant_name, namespace, accelerator];
        self.desired_replicas
            .with_label_values(labels)
            .set(desired as i64);
        self.current_replicas
            .with_label_values(labels)
            .set(current as i64);
        let ratio = if current > 0 {
            desired as f64 / current as f64
        } else {
            desired as f64
        };
        self.desired_ratio.with_label_values(labels).set(ratio);

        if desired != current {
            let (direction, reason) = if desired > current {
                ("up", "load_increase")
            } else {
                ("down", "load_decrease")
            };
            self.replica_scaling_total
                .with_label_values(&[variant_name, namespace, accelerator, direction, reason])
                .inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_gauges_and_ratio() {
        let metrics = OptimizerMetrics::for_test();
        metrics.publish("llama-70b-a", "inference", "H100", 1, 2);

        let labels = &["llama-70b-a", "inference", "H100"];
        assert_eq!(metrics.desired_replicas.with_label_values(labels).get(), 2);
        assert_eq!(metrics.current_replicas.with_label_values(labels).get(), 1);
        assert_eq!(metrics.desired_ratio.with_label_values(labels).get(), 2.0);
        let up = &["llama-70b-a", "inference", "H100", "up", "load_increase"];
        assert_eq!(metrics.replica_scaling_total.with_label_values(up).get(), 1);
    }

    #[test]
    fn test_ratio_with_zero_current() {
        let metrics = OptimizerMetrics::for_test();
        metrics.publish("v", "ns", "H100", 0, 3);
        assert_eq!(
            metrics.desired_ratio.with_label_values(&["v", "ns", "H100"]).get(),
            3.0
        );
    }

    #[test]
    fn test_no_scaling_counter_when_unchanged() {
        let metrics = OptimizerMetrics::for_test();
        metrics.publish("v", "ns", "H100", 2, 2);
        let up = &["v", "ns", "H100", "up", "load_increase"];
        let down = &["v", "ns", "H100", "down", "load_decrease"];
        assert_eq!(metrics.replica_scaling_total.with_label_values(up).get(), 0);
        assert_eq!(metrics.replica_scaling_total.with_label_values(down).get(), 0);
    }
}
