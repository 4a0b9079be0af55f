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

use crate::Result;
use crate::credentials::{CredentialSet, CredentialSource};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Caches a [CredentialSet] and refreshes it on demand.
///
/// Concurrent callers that find the cache empty or expired share a single
/// exchange. All of them receive the same credentials, or the same error.
///
/// Cloning the cache is cheap, clones share the same state.
#[derive(Debug)]
pub struct CredentialCache<T>
where
    T: CredentialSource,
{
    state: Arc<Mutex<State>>,

    // Held for the duration of each exchange.
    refresh_lock: Arc<tokio::sync::Mutex<()>>,

    // Publishes the expiration of each new credential set.
    expirations: Arc<watch::Sender<Option<DateTime<Utc>>>>,

    source: Arc<T>,
}

#[derive(Debug, Default)]
struct State {
    credentials: Option<CredentialSet>,
    // Incremented when an exchange completes, successful or not.
    generation: u64,
    last_outcome: Option<Result<CredentialSet>>,
}

// Implemented manually because `T` need not be `Clone`.
impl<T: CredentialSource> Clone for CredentialCache<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            refresh_lock: self.refresh_lock.clone(),
            expirations: self.expirations.clone(),
            source: self.source.clone(),
        }
    }
}

impl<T: CredentialSource> CredentialCache<T> {
    /// Creates an empty cache. Nothing is fetched until the first
    /// [get][Self::get] or [refresh][Self::refresh].
    pub fn new(source: T) -> Self {
        let (expirations, _) = watch::channel(None);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
            expirations: Arc::new(expirations),
            source: Arc::new(source),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the cached credentials if they have not expired, otherwise
    /// refreshes them.
    pub async fn get(&self) -> Result<CredentialSet> {
        let generation = {
            let state = self.lock_state();
            match &state.credentials {
                Some(c) if c.is_valid_at(Utc::now()) => return Ok(c.clone()),
                _ => state.generation,
            }
        };
        self.refresh_after(generation).await
    }

    /// Fetches new credentials and replaces the cached set.
    ///
    /// On failure the cached set, if any, is left untouched. If another
    /// refresh is running the call waits for it and returns its outcome
    /// instead of starting a second exchange.
    pub async fn refresh(&self) -> Result<CredentialSet> {
        let generation = self.lock_state().generation;
        self.refresh_after(generation).await
    }

    async fn refresh_after(&self, seen: u64) -> Result<CredentialSet> {
        let _guard = self.refresh_lock.lock().await;
        {
            let state = self.lock_state();
            // Another caller finished an exchange while this one waited. Its
            // credentials may already be expired if the source returned a
            // short-lived set.
            match &state.last_outcome {
                Some(Err(e)) if state.generation != seen => return Err(e.clone()),
                Some(Ok(c)) if state.generation != seen && c.is_valid_at(Utc::now()) => {
                    return Ok(c.clone());
                }
                _ => {}
            }
        }

        let outcome = self.source.fetch_credentials().await;

        let mut state = self.lock_state();
        state.generation += 1;
        state.last_outcome = Some(outcome.clone());
        if let Ok(credentials) = &outcome {
            state.credentials = Some(credentials.clone());
            drop(state);
            self.expirations.send_replace(Some(credentials.expiration));
        }
        outcome
    }

    /// Discards the cached credentials. The next [get][Self::get] refreshes.
    pub fn invalidate(&self) {
        self.lock_state().credentials = None;
        self.expirations.send_replace(None);
    }

    /// The name of the role the cached credentials belong to.
    pub fn role_name(&self) -> Result<String> {
        self.source.role_name()
    }

    /// The cached credentials, expired or not, without refreshing.
    pub fn current(&self) -> Option<CredentialSet> {
        self.lock_state().credentials.clone()
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.lock_state().credentials.as_ref().map(|c| c.expiration)
    }

    /// Receives the expiration of every newly cached credential set, and
    /// `None` when the cache is invalidated.
    pub fn subscribe(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.expirations.subscribe()
    }
}
