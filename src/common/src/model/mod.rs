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

//! The autoscaler data model.
//!
//! Accelerators, performance profiles and service classes are read-only
//! inputs per reconcile; variants are the autoscaled units; allocations are
//! the optimizer's outputs. The [`SystemSnapshot`] assembles all of them
//! into the per-tick value the solver consumes.

mod accelerator;
mod allocation;
mod condition;
mod profile;
mod service_class;
mod snapshot;
mod variant;

pub use accelerator::{Accelerator, PowerCurve};
pub use allocation::{Actuation, Allocation, AllocationData, DesiredOptimizedAlloc, LoadProfile};
pub use condition::{
    set_condition, Condition, ConditionStatus, MetricsLiveness, CONDITION_METRICS_AVAILABLE,
    CONDITION_OPTIMIZATION_READY, REASON_METRICS_FOUND, REASON_OPTIMIZATION_FAILED,
    REASON_OPTIMIZATION_SUCCEEDED,
};
pub use profile::PerfProfile;
pub use service_class::{ServiceClass, SloTargets};
pub use snapshot::{SystemSnapshot, VariantServer};
pub use variant::{TunerPerfData, Variant, VariantStatus};
