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

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use swell_common::{Error, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-query timeout, shrunk to fit inside the parent deadline.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Headroom kept between a query timeout and the parent deadline.
const DEADLINE_HEADROOM: Duration = Duration::from_millis(100);

/// One point of an instant-query result vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: f64,
    /// Sample timestamp, unix seconds.
    pub timestamp: f64,
}

/// Abstract time-series query surface of the metrics backend.
#[async_trait]
pub trait TimeSeries: Send + Sync + 'static {
    /// Evaluate an instant query and return the result vector.
    async fn instant(&self, query: &str) -> Result<Vec<Sample>>;
}

/// A [`TimeSeries`] scoped to one tick: queries inherit the tick's
/// cancellation token, and the per-query timeout never exceeds the
/// remaining parent deadline (minus headroom, floored at 1 ms).
pub struct ScopedTimeSeries<'a> {
    backend: &'a dyn TimeSeries,
    cancel: &'a CancellationToken,
    deadline: Option<Instant>,
}

impl<'a> ScopedTimeSeries<'a> {
    pub fn new(
        backend: &'a dyn TimeSeries,
        cancel: &'a CancellationToken,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            backend,
            cancel,
            deadline,
        }
    }

    pub async fn instant(&self, query: &str) -> Result<Vec<Sample>> {
        let timeout = query_timeout(self.deadline);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(timeout, self.backend.instant(query)) => {
                result.unwrap_or_else(|_| {
                    Err(Error::Prometheus(format!("query timed out after {timeout:?}")))
                })
            }
        }
    }
}

fn query_timeout(deadline: Option<Instant>) -> Duration {
    match deadline {
        None => QUERY_TIMEOUT,
        Some(deadline) => {
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .saturating_sub(DEADLINE_HEADROOM);
            QUERY_TIMEOUT.min(remaining).max(Duration::from_millis(1))
        }
    }
}

/// The real backend, speaking PromQL over HTTP. TLS and credential wiring
/// are owned by the hosting runtime.
pub struct PrometheusBackend {
    client: prometheus_http_query::Client,
}

impl PrometheusBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let client =
            prometheus_http_query::Client::from_str(base_url).map_err(|e| Error::ConfigInvalid {
                key: swell_common::config::METRICS_BASE_URL_KEY.to_owned(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TimeSeries for PrometheusBackend {
    async fn instant(&self, query: &str) -> Result<Vec<Sample>> {
        let response = self
            .client
            .query(query)
            .get()
            .await
            .map_err(|e| Error::Prometheus(e.to_string()))?;
        let vector = response
            .data()
            .as_vector()
            .ok_or_else(|| Error::Prometheus("expected an instant vector result".to_owned()))?;
        Ok(vector
            .iter()
            .map(|iv| Sample {
                value: iv.sample().value(),
                timestamp: iv.sample().timestamp(),
            })
            .collect())
    }
}

/// In-memory backend for tests: canned result vectors per query string,
/// with a switch to simulate a failing query layer.
#[cfg(any(test, feature = "test"))]
pub struct MemTimeSeries {
    series: parking_lot::Mutex<std::collections::HashMap<String, Vec<Sample>>>,
    unavailable: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test"))]
impl MemTimeSeries {
    pub fn new() -> Self {
        Self {
            series: parking_lot::Mutex::new(std::collections::HashMap::new()),
            unavailable: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set(&self, query: impl Into<String>, samples: Vec<Sample>) {
        self.series.lock().insert(query.into(), samples);
    }

    pub fn set_scalar(&self, query: impl Into<String>, value: f64, timestamp: f64) {
        self.set(query, vec![Sample { value, timestamp }]);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable
            .store(unavailable, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(any(test, feature = "test"))]
#[async_trait]
impl TimeSeries for MemTimeSeries {
    async fn instant(&self, query: &str) -> Result<Vec<Sample>> {
        if self.unavailable.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(Error::Prometheus("connection refused".to_owned()));
        }
        Ok(self.series.lock().get(query).cloned().unwrap_or_default())
    }
}
