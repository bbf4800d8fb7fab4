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

//! Cluster events emitted alongside status updates.
//!
//! Events are advisory: emission failures are logged and never fail the
//! tick, and the no-op recorder is the default for hosts that do not
//! care.

use async_trait::async_trait;
use swell_common::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// One event about a variant, in the hosting cluster's event vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub namespace: String,
    pub variant_name: String,
    pub type_: EventType,
    /// Machine-readable reason, e.g. `ScalingUp`.
    pub reason: String,
    pub message: String,
}

impl Event {
    pub fn scaling(
        namespace: &str,
        variant_name: &str,
        current: u32,
        desired: u32,
        accelerator: &str,
    ) -> Self {
        let reason = if desired > current {
            "ScalingUp"
        } else {
            "ScalingDown"
        };
        Self {
            namespace: namespace.to_owned(),
            variant_name: variant_name.to_owned(),
            type_: EventType::Normal,
            reason: reason.to_owned(),
            message: format!("{current} -> {desired} replicas on {accelerator}"),
        }
    }

    pub fn warning(namespace: &str, variant_name: &str, reason: &str, message: String) -> Self {
        Self {
            namespace: namespace.to_owned(),
            variant_name: variant_name.to_owned(),
            type_: EventType::Warning,
            reason: reason.to_owned(),
            message,
        }
    }
}

/// Sink for cluster events. Implementations may suspend (the hosting
/// runtime typically posts to the API server).
#[async_trait]
pub trait EventRecorder: Send + Sync + 'static {
    async fn record(&self, event: Event) -> Result<()>;
}

/// Discards every event.
pub struct NoopRecorder;

#[async_trait]
impl EventRecorder for NoopRecorder {
    async fn record(&self, _event: Event) -> Result<()> {
        Ok(())
    }
}

/// Collects events in memory for tests.
#[cfg(any(test, feature = "test"))]
pub struct MemRecorder {
    events: parking_lot::Mutex<Vec<Event>>,
}

#[cfg(any(test, feature = "test"))]
impl MemRecorder {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

#[cfg(any(test, feature = "test"))]
#[async_trait]
impl EventRecorder for MemRecorder {
    async fn record(&self, event: Event) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_event_direction() {
        let up = Event::scaling("inference", "llama-70b-a", 1, 2, "H100");
        assert_eq!(up.reason, "ScalingUp");
        assert_eq!(up.type_, EventType::Normal);
        assert_eq!(up.message, "1 -> 2 replicas on H100");

        let down = Event::scaling("inference", "llama-70b-a", 3, 1, "H100");
        assert_eq!(down.reason, "ScalingDown");
    }

    #[tokio::test]
    async fn test_mem_recorder_collects() {
        let recorder = MemRecorder::new();
        recorder
            .record(Event::warning("ns", "v", "OptimizationFailed", "no fit".into()))
            .await
            .unwrap();
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].type_, EventType::Warning);
    }
}
