// Copyright 2026 Google LLC
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
use crate::certificate::DeviceCertificate;
use crate::constants::THING_NAME_HEADER;
use crate::credentials::CredentialSet;
use crate::errors::{self, CredentialsError, ErrorKind};
use crate::metadata::RegistrationMetadata;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;

/// A client for the AWS IoT credential provider.
///
/// Each call to [fetch][Self::fetch] authenticates with the device
/// certificate using mutual TLS. The client does not retry, callers decide
/// whether and when to try again.
#[derive(Clone, Debug)]
pub struct CredentialClient {
    registration_dir: PathBuf,
    timeout: Option<Duration>,
}

#[derive(Clone, Debug, serde::Deserialize)]
struct ExchangeResponse {
    credentials: CredentialSet,
}

impl CredentialClient {
    /// Creates a client that finds the certificate and key in
    /// `registration_dir`.
    pub fn new<P: Into<PathBuf>>(registration_dir: P) -> Self {
        Self {
            registration_dir: registration_dir.into(),
            timeout: None,
        }
    }

    /// Bounds the total time of each exchange.
    ///
    /// By default the exchange has no timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Exchanges the device certificate for a new set of credentials.
    pub async fn fetch(&self, metadata: &RegistrationMetadata) -> Result<CredentialSet> {
        let certificate = DeviceCertificate::new(&self.registration_dir, &metadata.certificate_id);
        let http = self
            .builder()
            .identity(certificate.identity()?)
            .build()
            .map_err(|e| {
                CredentialsError::new(
                    false,
                    ErrorKind::Certificate,
                    "cannot create the HTTP client for the credential exchange",
                    e,
                )
            })?;
        exchange(&http, metadata).await
    }

    fn builder(&self) -> reqwest::ClientBuilder {
        let builder = reqwest::Client::builder();
        match self.timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        }
    }
}

/// Returns `{credential_endpoint}/role-aliases/{role_alias_name}/credentials`.
pub(crate) fn credentials_url(metadata: &RegistrationMetadata) -> String {
    format!(
        "{}/role-aliases/{}/credentials",
        metadata.credential_endpoint.trim_end_matches('/'),
        metadata.role_alias_name
    )
}

async fn exchange(
    http: &reqwest::Client,
    metadata: &RegistrationMetadata,
) -> Result<CredentialSet> {
    let url = credentials_url(metadata);
    tracing::debug!(%url, thing_name = %metadata.device_name, "exchanging device certificate");

    let error_message = "failed to fetch credentials";
    let response = http
        .get(&url)
        .header(THING_NAME_HEADER, &metadata.device_name)
        .send()
        .await
        .map_err(|e| errors::from_http_error(e, error_message))?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response
            .text()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;
        return Err(CredentialsError::exchange(status.as_u16(), body));
    }

    let response = response
        .json::<ExchangeResponse>()
        .await
        .map_err(|e| errors::from_http_error(e, "malformed credential exchange response"))?;
    Ok(response.credentials)
}
