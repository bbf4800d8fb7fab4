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

//! The per-variant query set.
//!
//! Serving engines expose vLLM-style counters and histogram sums; all
//! load statistics derive from 1-minute rate windows over them, filtered
//! by (model, namespace). Ratio results pass through sanitization so an
//! idle variant reads as zeros rather than NaN.

use swell_common::model::LoadProfile;
use swell_common::util::sanitize;
use swell_common::Result;

use crate::backend::ScopedTimeSeries;

const RATE_WINDOW: &str = "1m";

/// Load statistics of one variant over the rate window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadSample {
    /// Successful-request arrival rate, req/min.
    pub arrival_rate: f64,
    pub avg_input_tokens: f64,
    pub avg_output_tokens: f64,
    pub ttft_avg_ms: f64,
    pub itl_avg_ms: f64,
}

impl LoadSample {
    pub fn to_load_profile(&self) -> LoadProfile {
        LoadProfile {
            arrival_rate: self.arrival_rate,
            avg_input_tokens: self.avg_input_tokens,
            avg_output_tokens: self.avg_output_tokens,
        }
    }
}

fn selector(model_id: &str, namespace: &str) -> String {
    format!("{{model_name=\"{model_id}\", namespace=\"{namespace}\"}}")
}

pub fn arrival_rate_query(model_id: &str, namespace: &str) -> String {
    let sel = selector(model_id, namespace);
    format!("sum(rate(vllm:request_success_total{sel}[{RATE_WINDOW}]))")
}

/// Ratio-of-rates query over a `_sum`/`_count` metric pair.
fn mean_query(metric: &str, model_id: &str, namespace: &str) -> String {
    let sel = selector(model_id, namespace);
    format!(
        "sum(rate({metric}_sum{sel}[{RATE_WINDOW}])) / sum(rate({metric}_count{sel}[{RATE_WINDOW}]))"
    )
}

pub fn prompt_tokens_query(model_id: &str, namespace: &str) -> String {
    mean_query("vllm:request_prompt_tokens", model_id, namespace)
}

pub fn generation_tokens_query(model_id: &str, namespace: &str) -> String {
    mean_query("vllm:request_generation_tokens", model_id, namespace)
}

pub fn queue_time_query(model_id: &str, namespace: &str) -> String {
    mean_query("vllm:request_queue_time_seconds", model_id, namespace)
}

pub fn per_output_token_query(model_id: &str, namespace: &str) -> String {
    mean_query("vllm:time_per_output_token_seconds", model_id, namespace)
}

pub fn presence_query(model_id: &str, namespace: &str) -> String {
    let sel = selector(model_id, namespace);
    format!("vllm:num_requests_running{sel}")
}

/// First value of a result vector, sanitized; zero when the vector is
/// empty (no series yet for an idle variant).
async fn scalar(ts: &ScopedTimeSeries<'_>, query: &str) -> Result<f64> {
    let samples = ts.instant(query).await?;
    Ok(sanitize(samples.first().map(|s| s.value).unwrap_or(0.0)))
}

/// Collect the load snapshot of one variant. The five queries fan out
/// concurrently; each inherits the tick's cancellation and deadline.
pub async fn collect_load(
    ts: &ScopedTimeSeries<'_>,
    model_id: &str,
    namespace: &str,
) -> Result<LoadSample> {
    let arrival_rate_q = arrival_rate_query(model_id, namespace);
    let prompt_tokens_q = prompt_tokens_query(model_id, namespace);
    let generation_tokens_q = generation_tokens_query(model_id, namespace);
    let queue_time_q = queue_time_query(model_id, namespace);
    let per_output_token_q = per_output_token_query(model_id, namespace);
    let (arrival_per_sec, avg_in, avg_out, queue_secs, per_token_secs) = futures::try_join!(
        scalar(ts, &arrival_rate_q),
        scalar(ts, &prompt_tokens_q),
        scalar(ts, &generation_tokens_q),
        scalar(ts, &queue_time_q),
        scalar(ts, &per_output_token_q),
    )?;

    Ok(LoadSample {
        arrival_rate: sanitize(arrival_per_sec * 60.0),
        avg_input_tokens: avg_in,
        avg_output_tokens: avg_out,
        ttft_avg_ms: sanitize(queue_secs * 1000.0),
        itl_avg_ms: sanitize(per_token_secs * 1000.0),
    })
}
