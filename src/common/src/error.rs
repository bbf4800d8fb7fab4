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

use thiserror::Error;

use crate::model::MetricsLiveness;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error kinds surfaced by the autoscaler. Callers switch on the kind to
/// decide between retrying with backoff, attaching a condition to the
/// variant, or failing the tick.
#[derive(Error, Debug)]
pub enum Error {
    /// A required configuration entry is absent. Fails the tick; no status
    /// is written.
    #[error("missing configuration entry {0}")]
    ConfigMissing(String),

    #[error("invalid configuration entry {key}: {message}")]
    ConfigInvalid { key: String, message: String },

    /// Metrics for a variant are missing, stale, or the query layer errored.
    /// The variant is skipped for this tick and the reason is recorded on
    /// its `MetricsAvailable` condition.
    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(MetricsLiveness),

    /// Transient failure from the metrics query layer.
    #[error("prometheus query failed: {0}")]
    Prometheus(String),

    /// The object does not exist in the store. Permanent; not retried.
    #[error("{0} not found")]
    NotFound(String),

    /// The object is malformed or the request was rejected as invalid.
    /// Permanent; not retried.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// Optimistic-concurrency conflict on a store write.
    #[error("write conflict on {0}")]
    Conflict(String),

    /// Transient store failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    /// No candidate allocation satisfies the SLO on any accelerator.
    #[error("optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Whether the operation that produced this error may be retried with
    /// backoff. Permanent errors (not-found, invalid, config) fail fast.
    pub fn retryable(&self) -> bool {
        match self {
            Error::Prometheus(_) | Error::Conflict(_) | Error::StoreUnavailable(_) => true,
            Error::ConfigMissing(_)
            | Error::ConfigInvalid { .. }
            | Error::MetricsUnavailable(_)
            | Error::NotFound(_)
            | Error::InvalidObject(_)
            | Error::OptimizationFailed(_)
            | Error::Cancelled
            | Error::Internal(_) => false,
        }
    }
}
