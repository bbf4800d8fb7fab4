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

use std::collections::{BTreeMap, HashMap};

use super::accelerator::Accelerator;
use super::allocation::{Allocation, LoadProfile};
use super::profile::PerfProfile;
use super::service_class::{ServiceClass, SloTargets};
use super::variant::Variant;

/// A variant registered for optimization in one tick, with its resolved
/// SLO, observed load and the effective (possibly tuned) service laws.
#[derive(Debug, Clone)]
pub struct VariantServer {
    pub variant: Variant,
    pub priority: u32,
    pub slo: SloTargets,
    pub load: LoadProfile,
    pub current_alloc: Option<Allocation>,
    /// Replica count read from the controlled workload.
    pub current_replicas: u32,
    /// Per-accelerator service laws effective for this tick.
    pub profiles: Vec<PerfProfile>,
}

impl VariantServer {
    pub fn full_name(&self) -> String {
        self.variant.full_name()
    }

    pub fn profile_for(&self, accelerator: &str) -> Option<&PerfProfile> {
        self.profiles.iter().find(|p| p.accelerator == accelerator)
    }
}

/// Immutable per-tick view of the system: accelerator and service-class
/// tables, remaining per-type capacity, and the registered variants.
/// Built fresh every reconcile and owned exclusively by the tick.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    pub accelerators: HashMap<String, Accelerator>,
    pub service_classes: HashMap<String, ServiceClass>,
    /// Available accelerator units per type. Ignored in unlimited mode.
    pub capacity: HashMap<String, u32>,
    /// Keyed by variant full name; ordered for deterministic iteration.
    pub servers: BTreeMap<String, VariantServer>,
}

impl SystemSnapshot {
    pub fn new(
        accelerators: HashMap<String, Accelerator>,
        service_classes: HashMap<String, ServiceClass>,
    ) -> Self {
        Self {
            accelerators,
            service_classes,
            capacity: HashMap::new(),
            servers: BTreeMap::new(),
        }
    }

    pub fn set_capacity(&mut self, accelerator: impl Into<String>, units: u32) {
        self.capacity.insert(accelerator.into(), units);
    }

    pub fn register_server(&mut self, server: VariantServer) {
        self.servers.insert(server.full_name(), server);
    }

    pub fn accelerator(&self, name: &str) -> Option<&Accelerator> {
        self.accelerators.get(name)
    }
}
