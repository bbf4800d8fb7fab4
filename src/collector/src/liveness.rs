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

use std::time::Duration;

use chrono::{DateTime, Utc};
use swell_common::model::MetricsLiveness;
use thiserror_ext::AsReport as _;
use tracing::debug;

use crate::backend::ScopedTimeSeries;
use crate::queries::presence_query;

/// A presence sample older than this is considered stale.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(300);

/// Check that the variant's serving metrics exist and are fresh before any
/// of them are trusted. Optimization is skipped for this tick unless the
/// outcome is [`MetricsLiveness::Available`].
pub async fn probe_liveness(
    ts: &ScopedTimeSeries<'_>,
    model_id: &str,
    namespace: &str,
    now: DateTime<Utc>,
) -> MetricsLiveness {
    let samples = match ts.instant(&presence_query(model_id, namespace)).await {
        Ok(samples) => samples,
        Err(e) => {
            debug!(model_id, namespace, error = %e.as_report(), "presence query failed");
            return MetricsLiveness::Error;
        }
    };

    let newest = samples
        .iter()
        .map(|s| s.timestamp)
        .max_by(f64::total_cmp);
    match newest {
        None => MetricsLiveness::Missing,
        Some(timestamp) => {
            let age = now.timestamp() as f64 - timestamp;
            if age > STALENESS_WINDOW.as_secs_f64() {
                MetricsLiveness::Stale
            } else {
                MetricsLiveness::Available
            }
        }
    }
}
