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

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CONDITION_METRICS_AVAILABLE: &str = "MetricsAvailable";
pub const CONDITION_OPTIMIZATION_READY: &str = "OptimizationReady";

pub const REASON_METRICS_FOUND: &str = "MetricsFound";
pub const REASON_OPTIMIZATION_SUCCEEDED: &str = "OptimizationSucceeded";
pub const REASON_OPTIMIZATION_FAILED: &str = "OptimizationFailed";

/// Outcome of the per-variant metrics liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsLiveness {
    /// Presence metric found with a fresh sample.
    Available,
    /// Presence query returned an empty vector.
    Missing,
    /// Latest sample is older than the staleness window.
    Stale,
    /// The query layer itself errored.
    Error,
}

impl MetricsLiveness {
    pub fn is_available(self) -> bool {
        matches!(self, MetricsLiveness::Available)
    }

    /// Condition reason mirrored onto the variant.
    pub fn reason(self) -> &'static str {
        match self {
            MetricsLiveness::Available => REASON_METRICS_FOUND,
            MetricsLiveness::Missing => "MetricsMissing",
            MetricsLiveness::Stale => "MetricsStale",
            MetricsLiveness::Error => "PrometheusError",
        }
    }
}

impl fmt::Display for MetricsLiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
}

/// A typed condition mirrored onto the variant status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn metrics_available(liveness: MetricsLiveness, message: String, now: DateTime<Utc>) -> Self {
        Self {
            type_: CONDITION_METRICS_AVAILABLE.to_owned(),
            status: if liveness.is_available() {
                ConditionStatus::True
            } else {
                ConditionStatus::False
            },
            reason: liveness.reason().to_owned(),
            message,
            last_transition_time: now,
        }
    }

    pub fn optimization_ready(ready: bool, message: String, now: DateTime<Utc>) -> Self {
        Self {
            type_: CONDITION_OPTIMIZATION_READY.to_owned(),
            status: if ready {
                ConditionStatus::True
            } else {
                ConditionStatus::False
            },
            reason: if ready {
                REASON_OPTIMIZATION_SUCCEEDED.to_owned()
            } else {
                REASON_OPTIMIZATION_FAILED.to_owned()
            },
            message,
            last_transition_time: now,
        }
    }
}

/// Upsert a condition by type. The transition time is preserved when the
/// status did not change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut next: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == next.type_) {
        if existing.status == next.status {
            next.last_transition_time = existing.last_transition_time;
        }
        *existing = next;
    } else {
        conditions.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_reasons() {
        assert_eq!(MetricsLiveness::Available.reason(), "MetricsFound");
        assert_eq!(MetricsLiveness::Missing.reason(), "MetricsMissing");
        assert_eq!(MetricsLiveness::Stale.reason(), "MetricsStale");
        assert_eq!(MetricsLiveness::Error.reason(), "PrometheusError");
        assert!(MetricsLiveness::Available.is_available());
        assert!(!MetricsLiveness::Stale.is_available());
    }

    #[test]
    fn test_set_condition_preserves_transition_time() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(60);
        let mut conditions = vec![];

        set_condition(
            &mut conditions,
            Condition::metrics_available(MetricsLiveness::Available, "found".into(), t0),
        );
        assert_eq!(conditions.len(), 1);

        // Same status again: the transition timestamp stays put.
        set_condition(
            &mut conditions,
            Condition::metrics_available(MetricsLiveness::Available, "found again".into(), t1),
        );
        assert_eq!(conditions[0].last_transition_time, t0);
        assert_eq!(conditions[0].message, "found again");

        // Status flips: the transition timestamp moves.
        set_condition(
            &mut conditions,
            Condition::metrics_available(MetricsLiveness::Stale, "stale".into(), t1),
        );
        assert_eq!(conditions[0].last_transition_time, t1);
        assert_eq!(conditions[0].status, ConditionStatus::False);
        assert_eq!(conditions[0].reason, "MetricsStale");
    }

    #[test]
    fn test_condition_serializes_kubernetes_style() {
        let cond = Condition::optimization_ready(true, "ok".into(), Utc::now());
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "OptimizationReady");
        assert_eq!(json["status"], "True");
        assert_eq!(json["reason"], "OptimizationSucceeded");
        assert!(json.get("lastTransitionTime").is_some());
    }
}
