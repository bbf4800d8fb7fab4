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

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;

use crate::error::{Error, Result};

pub const RETRY_BASE_MS: u64 = 100;
pub const RETRY_MAX_ATTEMPTS: usize = 5;
const RETRY_JITTER: f64 = 0.1;

/// Backoff schedule for transient store and metrics-API failures:
/// 100 ms base, doubling per attempt, ±10% jitter, five attempts in total
/// (the initial try plus four retries).
pub fn backoff_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(RETRY_BASE_MS / 2)
        .map(jitter)
        .take(RETRY_MAX_ATTEMPTS - 1)
}

fn jitter(duration: Duration) -> Duration {
    let spread = 1.0 + RETRY_JITTER * (rand::thread_rng().gen::<f64>() * 2.0 - 1.0);
    duration.mul_f64(spread)
}

/// Run `action`, retrying on [`Error::retryable`] failures with
/// [`backoff_strategy`]. Permanent errors are returned immediately.
pub async fn retry_transient<T, F, Fut>(action: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryIf::spawn(backoff_strategy(), action, Error::retryable).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_backoff_shape() {
        let delays: Vec<_> = backoff_strategy().collect();
        assert_eq!(delays.len(), RETRY_MAX_ATTEMPTS - 1);
        // Base 100 ms doubling, with at most 10% of jitter either way.
        for (i, delay) in delays.iter().enumerate() {
            let nominal = (RETRY_BASE_MS << i) as f64;
            let millis = delay.as_secs_f64() * 1000.0;
            assert!(millis >= nominal * 0.9 && millis <= nominal * 1.1, "{millis} vs {nominal}");
        }
    }

    #[tokio::test]
    async fn test_retry_transient_recovers() {
        let attempts = AtomicUsize::new(0);
        let result = retry_transient(|| {
            let n = attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                if n < 2 {
                    Err(Error::Conflict("variant".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_fast() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_transient(|| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err(Error::NotFound("workload".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }
}
