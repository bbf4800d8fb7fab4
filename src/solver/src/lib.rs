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

//! The optimization core: an analytic queueing model of batched LLM
//! serving, per-variant candidate allocation generation, and the global
//! allocation solver.

pub mod candidate;
pub mod kalman;
pub mod queueing;
pub mod solve;

pub use candidate::{generate_candidate, Candidate, CandidateOptions, DEFAULT_ACCEL_PENALTY};
pub use queueing::{QueueMetrics, QueueingAnalyzer, ServiceParams, Sizing};
pub use solve::{solve, Placement, SaturationPolicy, SolverOptions};
