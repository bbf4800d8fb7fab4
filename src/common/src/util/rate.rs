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

//! Arrival-rate unit conversions.
//!
//! Rates are `req/min` at the variant-status boundary and `req/ms` inside
//! the analyzer and solver. Conversion happens exactly once, at the
//! boundary.

const MS_PER_MIN: f64 = 60_000.0;

pub fn per_min_to_per_ms(rate_per_min: f64) -> f64 {
    rate_per_min / MS_PER_MIN
}

pub fn per_ms_to_per_min(rate_per_ms: f64) -> f64 {
    rate_per_ms * MS_PER_MIN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        // 60 req/min == 1 req/s == 0.001 req/ms.
        assert_eq!(per_min_to_per_ms(60.0), 0.001);
        assert_eq!(per_ms_to_per_min(per_min_to_per_ms(480.0)), 480.0);
    }
}
