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

use std::time::Duration;

/// Spaces out retries of a failed background refresh.
///
/// The n-th consecutive failure waits a random time in `[0, min(first * 2^(n-1), cap)]`.
/// Randomizing the whole interval keeps devices that lost the credential
/// endpoint at the same time from retrying together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBackoff {
    first: Duration,
    cap: Duration,
}

impl Default for RetryBackoff {
    /// One second for the first retry, at most one minute.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl RetryBackoff {
    /// `cap` is raised to `first` if smaller.
    pub fn new(first: Duration, cap: Duration) -> Self {
        Self {
            first,
            cap: cap.max(first),
        }
    }

    /// The upper bound of the wait after `failures` consecutive failures.
    pub fn ceiling(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(31);
        self.first
            .checked_mul(1_u32 << doublings)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// A random wait after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        self.delay_with(failures, &mut rand::rng())
    }

    fn delay_with<R: rand::Rng>(&self, failures: u32, rng: &mut R) -> Duration {
        rng.random_range(Duration::ZERO..=self.ceiling(failures))
    }
}
