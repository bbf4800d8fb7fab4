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

//! Abstract cluster object store.
//!
//! The optimizer never talks to the API server directly; the hosting
//! runtime provides list/get/patch/watch over the typed resources it
//! cares about. Only the variant status subresource is ever written.

use std::collections::HashMap;

use async_trait::async_trait;
use swell_common::model::{Variant, VariantStatus};
use swell_common::Result;
use tokio::sync::mpsc::UnboundedReceiver;

/// The controlled workload object, read for its live replica count.
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    pub replicas: u32,
    /// Full name of the variant owning this workload, once established.
    pub controller_ref: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Entries of the process-wide configuration object.
    async fn config_entries(&self) -> Result<HashMap<String, String>>;

    /// All variant resources, including ones being deleted.
    async fn list_variants(&self) -> Result<Vec<Variant>>;

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload>;

    /// Establish the controller-reference relationship between a variant
    /// and its workload.
    async fn set_controller_ref(&self, namespace: &str, name: &str, owner: &str) -> Result<()>;

    /// Patch the status subresource of a variant.
    async fn patch_variant_status(
        &self,
        namespace: &str,
        name: &str,
        status: &VariantStatus,
    ) -> Result<()>;

    /// Notifications for configuration-object changes; each event triggers
    /// an immediate reconcile.
    fn watch_config(&self) -> UnboundedReceiver<()>;
}

#[cfg(any(test, feature = "test"))]
pub use mem::MemStore;

#[cfg(any(test, feature = "test"))]
mod mem {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use parking_lot::Mutex;
    use swell_common::Error;
    use tokio::sync::mpsc::UnboundedSender;

    use super::*;

    /// In-memory object store for tests, with switches for conflict and
    /// outage injection.
    #[derive(Default)]
    pub struct MemStore {
        config: Mutex<HashMap<String, String>>,
        variants: Mutex<BTreeMap<String, Variant>>,
        workloads: Mutex<BTreeMap<String, Workload>>,
        config_watchers: Mutex<Vec<UnboundedSender<()>>>,
        /// Next N status patches fail with a write conflict.
        patch_conflicts: AtomicU32,
        unavailable: AtomicBool,
    }

    impl MemStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_config_entry(&self, key: impl Into<String>, value: impl Into<String>) {
            self.config.lock().insert(key.into(), value.into());
            self.config_watchers
                .lock()
                .retain(|tx| tx.send(()).is_ok());
        }

        pub fn insert_variant(&self, variant: Variant) {
            self.variants.lock().insert(variant.full_name(), variant);
        }

        pub fn insert_workload(&self, workload: Workload) {
            let key = format!("{}/{}", workload.namespace, workload.name);
            self.workloads.lock().insert(key, workload);
        }

        pub fn variant(&self, full_name: &str) -> Option<Variant> {
            self.variants.lock().get(full_name).cloned()
        }

        pub fn workload(&self, full_name: &str) -> Option<Workload> {
            self.workloads.lock().get(full_name).cloned()
        }

        pub fn inject_patch_conflicts(&self, n: u32) {
            self.patch_conflicts.store(n, Ordering::Relaxed);
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::Relaxed);
        }

        fn check_available(&self) -> Result<()> {
            if self.unavailable.load(Ordering::Relaxed) {
                return Err(Error::StoreUnavailable(anyhow::anyhow!(
                    "connection refused"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ObjectStore for MemStore {
        async fn config_entries(&self) -> Result<HashMap<String, String>> {
            self.check_available()?;
            Ok(self.config.lock().clone())
        }

        async fn list_variants(&self) -> Result<Vec<Variant>> {
            self.check_available()?;
            Ok(self.variants.lock().values().cloned().collect())
        }

        async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload> {
            self.check_available()?;
            self.workloads
                .lock()
                .get(&format!("{namespace}/{name}"))
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("workload {namespace}/{name}")))
        }

        async fn set_controller_ref(
            &self,
            namespace: &str,
            name: &str,
            owner: &str,
        ) -> Result<()> {
            self.check_available()?;
            let mut workloads = self.workloads.lock();
            let workload = workloads
                .get_mut(&format!("{namespace}/{name}"))
                .ok_or_else(|| Error::NotFound(format!("workload {namespace}/{name}")))?;
            workload.controller_ref = Some(owner.to_owned());
            Ok(())
        }

        async fn patch_variant_status(
            &self,
            namespace: &str,
            name: &str,
            status: &VariantStatus,
        ) -> Result<()> {
            self.check_available()?;
            let full_name = format!("{namespace}/{name}");
            if self
                .patch_conflicts
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                    (n > 0).then(|| n - 1)
                })
                .is_ok()
            {
                return Err(Error::Conflict(full_name));
            }
            let mut variants = self.variants.lock();
            let variant = variants
                .get_mut(&full_name)
                .ok_or_else(|| Error::NotFound(format!("variant {full_name}")))?;
            variant.status = status.clone();
            Ok(())
        }

        fn watch_config(&self) -> UnboundedReceiver<()> {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            self.config_watchers.lock().push(tx);
            rx
        }
    }
}
