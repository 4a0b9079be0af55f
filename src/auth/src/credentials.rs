// Copyright 2024 Google LLC
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
use crate::client::CredentialClient;
use crate::constants::EXPIRATION_FORMAT;
use crate::metadata::MetadataStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// A set of short-lived AWS session credentials.
///
/// The set is replaced as a whole on every refresh.
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSet {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,

    /// When the credentials stop working.
    #[serde(with = "expiration")]
    pub expiration: DateTime<Utc>,
}

impl CredentialSet {
    /// Returns `true` if the credentials can be served at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiration
    }

    /// The time left until expiration, zero if already expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expiration - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// The expiration in the format used by the exchange endpoint, e.g.
    /// `2018-03-12T03:52:05Z`.
    pub fn expiration_string(&self) -> String {
        self.expiration.format(EXPIRATION_FORMAT).to_string()
    }
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[censored]")
            .field("session_token", &"[censored]")
            .field("expiration", &self.expiration)
            .finish()
    }
}

mod expiration {
    use super::EXPIRATION_FORMAT;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.format(EXPIRATION_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Fetches fresh credentials.
///
/// The cache and the refresh scheduler only depend on this trait. Tests
/// replace it with a fake, and applications may provide their own source.
#[async_trait::async_trait]
pub trait CredentialSource: std::fmt::Debug + Send + Sync {
    /// Performs a new credential exchange. Never served from a cache.
    async fn fetch_credentials(&self) -> Result<CredentialSet>;

    /// The name of the role these credentials belong to.
    fn role_name(&self) -> Result<String>;
}

/// Exchanges the device certificate for credentials.
///
/// Each fetch uses the current registration metadata, so a rewritten
/// `metadata.json` (or a rotated certificate) takes effect on the next
/// exchange.
#[derive(Debug)]
pub struct IotCredentialSource {
    store: Arc<MetadataStore>,
    client: CredentialClient,
}

impl IotCredentialSource {
    pub fn new(store: Arc<MetadataStore>, client: CredentialClient) -> Self {
        Self { store, client }
    }
}

#[async_trait::async_trait]
impl CredentialSource for IotCredentialSource {
    async fn fetch_credentials(&self) -> Result<CredentialSet> {
        let metadata = self.store.get()?;
        self.client.fetch(&metadata).await
    }

    fn role_name(&self) -> Result<String> {
        Ok(self.store.get()?.role_alias_name.clone())
    }
}
