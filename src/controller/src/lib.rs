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

//! The reconciliation engine.
//!
//! [`GlobalOptimizer`] periodically assembles a system snapshot from the
//! object store and the metrics backend, runs the allocation solver, and
//! publishes the results to variant statuses and external gauges. Besides
//! the tuner's estimator state, nothing survives a tick.

pub mod event;
pub mod metrics;
pub mod reconcile;
pub mod store;
pub mod tuner;

use std::sync::Arc;
use std::time::Duration;

use swell_collector::TimeSeries;
use swell_common::config::DEFAULT_OPT_INTERVAL;
use thiserror_ext::AsReport as _;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use crate::event::{Event, EventRecorder, EventType, NoopRecorder};
pub use crate::metrics::OptimizerMetrics;
pub use crate::reconcile::TickSummary;
#[cfg(any(test, feature = "test"))]
pub use crate::store::MemStore;
pub use crate::store::{ObjectStore, Workload};
use crate::tuner::TunerState;

pub struct GlobalOptimizer {
    store: Arc<dyn ObjectStore>,
    backend: Arc<dyn TimeSeries>,
    metrics: Arc<OptimizerMetrics>,
    events: Arc<dyn EventRecorder>,
    tuner: TunerState,
    cancel: CancellationToken,
}

impl GlobalOptimizer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        backend: Arc<dyn TimeSeries>,
        metrics: Arc<OptimizerMetrics>,
    ) -> Self {
        Self {
            store,
            backend,
            metrics,
            events: Arc::new(NoopRecorder),
            tuner: TunerState::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the default no-op event sink.
    pub fn with_event_recorder(mut self, events: Arc<dyn EventRecorder>) -> Self {
        self.events = events;
        self
    }

    /// Root cancellation token. The hosting runtime cancels it on process
    /// exit signals; an in-flight tick then aborts at its next suspension
    /// point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn metrics(&self) -> &OptimizerMetrics {
        &self.metrics
    }

    /// Spawn the optimization loop. Dropping or firing the returned sender
    /// stops it.
    pub fn start(self: Arc<Self>) -> (JoinHandle<()>, oneshot::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });
        (join_handle, shutdown_tx)
    }

    async fn run(&self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut config_rx = self.store.watch_config();
        let mut watch_open = true;
        let mut period = DEFAULT_OPT_INTERVAL;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?period, "starting global optimizer");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    self.cancel.cancel();
                    info!("global optimizer is stopped");
                    break;
                }
                // Configuration change: reconcile immediately and push the
                // next periodic tick out a full interval.
                changed = config_rx.recv(), if watch_open => {
                    if changed.is_none() {
                        watch_open = false;
                        continue;
                    }
                    if let Some(new_period) = self.run_tick(period).await {
                        period = new_period;
                    }
                    interval = tokio::time::interval(period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    interval.reset();
                }
                _ = interval.tick() => {
                    if let Some(new_period) = self.run_tick(period).await {
                        if new_period != period {
                            period = new_period;
                            interval = tokio::time::interval(period);
                            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            interval.reset();
                        }
                    }
                }
            }
        }
    }

    /// Run one tick under the current period's deadline. Returns the
    /// requeue interval the configuration asks for, or `None` when the
    /// tick failed before reading it.
    async fn run_tick(&self, period: Duration) -> Option<Duration> {
        let deadline = Instant::now() + period;
        let cancel = self.cancel.child_token();
        match self.tick(&cancel, Some(deadline)).await {
            Ok(summary) => {
                info!(
                    variants_processed = summary.variants_processed,
                    optimization_successful = summary.optimization_successful,
                    "optimization tick complete"
                );
                // A zero interval would spin; keep at least one second.
                Some(summary.interval.max(Duration::from_secs(1)))
            }
            Err(e) => {
                error!(error = %e.as_report(), "optimization tick failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use swell_collector::MemTimeSeries;
    use swell_common::config::{ACCELERATOR_COST_TABLE_KEY, SERVICE_CLASS_TABLE_KEY};

    use super::*;

    fn booted_store() -> Arc<MemStore> {
        let store = Arc::new(MemStore::new());
        store.set_config_entry(
            ACCELERATOR_COST_TABLE_KEY,
            serde_json::json!([{"name": "H100", "unitCost": 100.0}]).to_string(),
        );
        store.set_config_entry(
            SERVICE_CLASS_TABLE_KEY,
            serde_json::json!([{"name": "premium", "priority": 1, "models": {}}]).to_string(),
        );
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_ticks_and_shuts_down() {
        let store = booted_store();
        let backend = Arc::new(MemTimeSeries::new());
        let optimizer = Arc::new(GlobalOptimizer::new(
            store.clone(),
            backend,
            Arc::new(OptimizerMetrics::for_test()),
        ));

        let (join_handle, shutdown_tx) = optimizer.clone().start();
        // The interval fires immediately on startup.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(optimizer.metrics().variants_processed.get(), 0);

        // A configuration change triggers a reconcile without waiting for
        // the next period.
        store.set_config_entry("GLOBAL_OPT_INTERVAL", "30s");
        tokio::time::sleep(Duration::from_millis(10)).await;

        shutdown_tx.send(()).unwrap();
        join_handle.await.unwrap();
        assert!(optimizer.cancellation_token().is_cancelled());
    }
}
