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

//! Telemetry collection: turns raw time-series queries against the
//! metrics backend into per-variant load snapshots, with a liveness gate
//! in front.

pub mod backend;
pub mod liveness;
pub mod queries;

pub use backend::{PrometheusBackend, Sample, ScopedTimeSeries, TimeSeries};
#[cfg(any(test, feature = "test"))]
pub use backend::MemTimeSeries;
pub use liveness::{probe_liveness, STALENESS_WINDOW};
pub use queries::{collect_load, LoadSample};
