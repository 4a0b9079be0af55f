// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::backoff::RetryBackoff;
use crate::cache::CredentialCache;
use crate::credentials::CredentialSource;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The lower bound of the jitter window.
const MIN_JITTER: Duration = Duration::from_secs(30);

/// Computes the delay before the next proactive refresh.
///
/// With `remaining` validity `R` the result is in
/// `[0.7 * R, 0.7 * R + max(30s, 0.1 * R))`. Randomizing the refresh time
/// keeps a fleet of devices from refreshing in lockstep.
pub fn refresh_delay<R: rand::Rng>(remaining: Duration, rng: &mut R) -> Duration {
    let window = std::cmp::max(MIN_JITTER, remaining / 10);
    remaining.mul_f64(0.7) + rng.random_range(Duration::ZERO..window)
}

/// Refreshes a [CredentialCache] in the background.
///
/// The scheduler keeps exactly one refresh pending. It waits until most of
/// the credential lifetime has passed, refreshes, and schedules the next
/// refresh from the new expiration. Failed refreshes are retried with
/// exponential backoff until one succeeds or the scheduler stops.
///
/// Refreshes go through the cache, so they never race with refreshes
/// triggered by requests.
#[derive(Debug)]
pub struct RefreshScheduler {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Starts refreshing `cache` in a background task.
    ///
    /// If the cache is empty the scheduler waits for its first successful
    /// refresh before scheduling anything.
    pub fn start<T>(cache: CredentialCache<T>, backoff: RetryBackoff) -> Self
    where
        T: CredentialSource + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(cache, backoff, cancel.clone()));
        Self {
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Cancels the pending refresh and waits for the background task to exit.
    ///
    /// Calling `stop()` more than once is a no-op.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("credential refresh task failed: {e}");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Wake {
    Cancelled,
    Rearm,
    Fire,
}

async fn refresh_loop<T>(
    cache: CredentialCache<T>,
    backoff: RetryBackoff,
    cancel: CancellationToken,
) where
    T: CredentialSource + 'static,
{
    let mut expirations = cache.subscribe();
    loop {
        let expiration = *expirations.borrow_and_update();
        let wake = match expiration {
            None => wait_for_change(&mut expirations, &cancel).await,
            Some(expiration) => sleep_until_due(expiration, &mut expirations, &cancel).await,
        };
        match wake {
            Wake::Cancelled => break,
            Wake::Rearm => continue,
            Wake::Fire => {
                if !refresh_with_backoff(&cache, &backoff, &mut expirations, &cancel).await {
                    break;
                }
            }
        }
    }
    tracing::info!("credential refresh cancelled");
}

async fn wait_for_change(
    expirations: &mut watch::Receiver<Option<DateTime<Utc>>>,
    cancel: &CancellationToken,
) -> Wake {
    tracing::debug!("waiting for the first credential refresh");
    tokio::select! {
        _ = cancel.cancelled() => Wake::Cancelled,
        changed = expirations.changed() => match changed {
            Ok(()) => Wake::Rearm,
            Err(_) => Wake::Cancelled,
        },
    }
}

async fn sleep_until_due(
    expiration: DateTime<Utc>,
    expirations: &mut watch::Receiver<Option<DateTime<Utc>>>,
    cancel: &CancellationToken,
) -> Wake {
    let remaining = (expiration - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    let delay = refresh_delay(remaining, &mut rand::rng());
    tracing::info!(
        delay_secs = delay.as_secs(),
        expiration = %expiration,
        "scheduled credential refresh"
    );
    tokio::select! {
        _ = cancel.cancelled() => Wake::Cancelled,
        changed = expirations.changed() => match changed {
            // Someone else refreshed the credentials, schedule from the new
            // expiration instead.
            Ok(()) => Wake::Rearm,
            Err(_) => Wake::Cancelled,
        },
        _ = tokio::time::sleep(delay) => Wake::Fire,
    }
}

// Returns `false` if cancelled before the credentials were replaced. Stops
// retrying when a request replaces or invalidates the credentials first.
async fn refresh_with_backoff<T>(
    cache: &CredentialCache<T>,
    backoff: &RetryBackoff,
    expirations: &mut watch::Receiver<Option<DateTime<Utc>>>,
    cancel: &CancellationToken,
) -> bool
where
    T: CredentialSource + 'static,
{
    let mut attempt = 0_u32;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return false,
            r = cache.refresh() => r,
        };
        let error = match result {
            Ok(_) => return true,
            Err(e) => e,
        };
        attempt = attempt.saturating_add(1);
        let delay = backoff.delay(attempt);
        tracing::warn!(
            attempt,
            retry_in_ms = delay.as_millis() as u64,
            "scheduled credential refresh failed: {error}"
        );
        tokio::select! {
            _ = cancel.cancelled() => return false,
            changed = expirations.changed() => return changed.is_ok(),
            _ = tokio::time::sleep(delay) => {},
        }
    }
}
