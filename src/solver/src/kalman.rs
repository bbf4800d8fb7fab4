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

//! Online refinement of service-law coefficients.
//!
//! Both laws are linear in their two coefficients — `itl = alpha + beta*b`
//! and `prefill = gamma + delta*k_in*b` — so a two-parameter Kalman filter
//! with a scalar observation tracks each pair from live latency samples.
//! Implausible observations are rejected and the declared profile stands
//! in for the tick.

use swell_common::model::PerfProfile;

const INITIAL_VARIANCE: f64 = 1.0;
const PROCESS_NOISE: f64 = 1e-4;
const MEASUREMENT_NOISE: f64 = 0.5;

/// Reject observations this many times larger than the declared law
/// predicts.
const PLAUSIBILITY_FACTOR: f64 = 100.0;

/// Two-parameter Kalman filter with scalar observations `z = h · theta`.
#[derive(Debug, Clone, PartialEq)]
pub struct Kalman2 {
    theta: [f64; 2],
    p: [[f64; 2]; 2],
    q: f64,
    r: f64,
}

impl Kalman2 {
    pub fn new(theta: [f64; 2]) -> Self {
        Self {
            theta,
            p: [[INITIAL_VARIANCE, 0.0], [0.0, INITIAL_VARIANCE]],
            q: PROCESS_NOISE,
            r: MEASUREMENT_NOISE,
        }
    }

    pub fn estimate(&self) -> [f64; 2] {
        self.theta
    }

    /// Fold in one observation `z` with measurement vector `h`.
    pub fn update(&mut self, h: [f64; 2], z: f64) {
        // Predict step: parameters drift slowly.
        self.p[0][0] += self.q;
        self.p[1][1] += self.q;

        // Innovation variance s = h P h' + r.
        let ph = [
            self.p[0][0] * h[0] + self.p[0][1] * h[1],
            self.p[1][0] * h[0] + self.p[1][1] * h[1],
        ];
        let s = h[0] * ph[0] + h[1] * ph[1] + self.r;
        let gain = [ph[0] / s, ph[1] / s];

        let innovation = z - (h[0] * self.theta[0] + h[1] * self.theta[1]);
        self.theta[0] += gain[0] * innovation;
        self.theta[1] += gain[1] * innovation;

        // P = (I - K h) P
        let p = self.p;
        for i in 0..2 {
            for j in 0..2 {
                self.p[i][j] = p[i][j] - gain[i] * (h[0] * p[0][j] + h[1] * p[1][j]);
            }
        }
    }
}

/// One latency sample of a running variant, taken at a known operating
/// batch size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunerObservation {
    pub batch: f64,
    pub in_tokens: f64,
    /// Observed mean inter-token latency, ms.
    pub itl_ms: f64,
    /// Observed prefill time: mean TTFT minus the estimated wait, ms.
    pub prefill_ms: f64,
}

/// Kalman estimates of `(alpha, beta)` and `(gamma, delta)` for one
/// (variant, accelerator) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfEstimator {
    decode: Kalman2,
    prefill: Kalman2,
    declared: PerfProfile,
}

impl PerfEstimator {
    /// Seed the filters from the declared profile.
    pub fn from_profile(profile: &PerfProfile) -> Self {
        Self {
            decode: Kalman2::new([profile.alpha, profile.beta]),
            prefill: Kalman2::new([profile.gamma, profile.delta]),
            declared: profile.clone(),
        }
    }

    /// Seed the filters from the first observation instead of the declared
    /// parameters: the constant term takes the full observed latency and
    /// the slope starts at zero.
    pub fn auto_seeded(profile: &PerfProfile, obs: &TunerObservation) -> Self {
        Self {
            decode: Kalman2::new([obs.itl_ms.max(0.0), 0.0]),
            prefill: Kalman2::new([obs.prefill_ms.max(0.0), 0.0]),
            declared: profile.clone(),
        }
    }

    /// Fold in one observation. Returns false (and leaves the estimate
    /// untouched) when the sample is outside plausibility bounds.
    pub fn observe(&mut self, obs: &TunerObservation) -> bool {
        if !self.plausible(obs) {
            return false;
        }
        self.decode.update([1.0, obs.batch], obs.itl_ms);
        self.prefill
            .update([1.0, obs.in_tokens * obs.batch], obs.prefill_ms);
        true
    }

    fn plausible(&self, obs: &TunerObservation) -> bool {
        if obs.batch < 1.0 || !obs.batch.is_finite() {
            return false;
        }
        if !obs.itl_ms.is_finite() || obs.itl_ms <= 0.0 {
            return false;
        }
        if !obs.prefill_ms.is_finite() || obs.prefill_ms < 0.0 {
            return false;
        }
        let expected_itl = self.declared.decode_time(obs.batch).max(1.0);
        if obs.itl_ms > PLAUSIBILITY_FACTOR * expected_itl {
            return false;
        }
        let expected_prefill = self
            .declared
            .prefill_time(obs.in_tokens, obs.batch)
            .max(1.0);
        obs.prefill_ms <= PLAUSIBILITY_FACTOR * expected_prefill
    }

    /// The declared profile with the current estimates substituted,
    /// clamped non-negative so the service-law invariants hold.
    pub fn tuned_profile(&self) -> PerfProfile {
        let [alpha, beta] = self.decode.estimate();
        let [gamma, delta] = self.prefill.estimate();
        PerfProfile {
            alpha: alpha.max(0.0),
            beta: beta.max(0.0),
            gamma: gamma.max(0.0),
            delta: delta.max(0.0),
            ..self.declared.clone()
        }
    }
}
