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

//! Serves the instance metadata endpoints.

use crate::identity::{self, OverrideFileError, OverridesFile};
use crate::routes::Route;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, Uri, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use iot_auth::cache::CredentialCache;
use iot_auth::credentials::{CredentialSet, CredentialSource};
use iot_auth::errors::CredentialsError;
use iot_auth::metadata::MetadataStore;
use std::sync::Arc;

pub const PING_RESPONSE: &str = "pong";
pub const SIGNATURE_RESPONSE: &str = "bad";

const TEXT_PLAIN: &str = "text/plain";
const APPLICATION_JSON: &str = "application/json";
const TEXT_HTML: &str = "text/html";

const NOT_FOUND_PAGE: &str = r#"<?xml version="1.0" encoding="iso-8859-1"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN"
         "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="en" lang="en">
 <head>
  <title>404 - Not Found</title>
 </head>
 <body>
  <h1>404 - Not Found</h1>
 </body>
</html>
"#;

/// The shared state behind every request.
///
/// Handlers keep no state of their own, the cache and the store are
/// created once at startup and injected here.
#[derive(Debug)]
pub struct AppState<T: CredentialSource> {
    cache: CredentialCache<T>,
    store: Arc<MetadataStore>,
    overrides: OverridesFile,
}

impl<T: CredentialSource> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            store: self.store.clone(),
            overrides: self.overrides.clone(),
        }
    }
}

impl<T: CredentialSource> AppState<T> {
    pub fn new(
        cache: CredentialCache<T>,
        store: Arc<MetadataStore>,
        overrides: OverridesFile,
    ) -> Self {
        Self {
            cache,
            store,
            overrides,
        }
    }

    pub fn cache(&self) -> &CredentialCache<T> {
        &self.cache
    }
}

/// Builds the router for all metadata endpoints.
pub fn router<T>(state: AppState<T>) -> Router
where
    T: CredentialSource + 'static,
{
    Router::new().fallback(dispatch::<T>).with_state(state)
}

/// Errors that turn into a `500 Internal Server Error`.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Overrides(#[from] OverrideFileError),
    #[error("cannot serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::error!("cannot serve metadata request: {self}");
        text(StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
    }
}

/// The credentials in the format of the instance metadata service.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: String,
    code: &'static str,
    #[serde(rename = "Type")]
    credential_type: &'static str,
    last_updated: String,
}

impl From<CredentialSet> for MetadataCredentials {
    fn from(c: CredentialSet) -> Self {
        let expiration = c.expiration_string();
        Self {
            access_key_id: c.access_key_id,
            secret_access_key: c.secret_access_key,
            token: c.session_token,
            last_updated: expiration.clone(),
            expiration,
            code: "Success",
            credential_type: "AWS-HMAC",
        }
    }
}

async fn dispatch<T>(
    State(state): State<AppState<T>>,
    method: Method,
    uri: Uri,
) -> Result<Response, HandlerError>
where
    T: CredentialSource + 'static,
{
    let route = Route::resolve(&method, uri.path());
    let response = match route {
        Route::Ping => text(StatusCode::OK, PING_RESPONSE),
        Route::RoleName => text(StatusCode::OK, state.cache.role_name()?),
        Route::RoleCredentials(role) => {
            if role != state.cache.role_name()? {
                tracing::debug!(%role, "request for a role not served here");
                return Ok(not_found());
            }
            let credentials = MetadataCredentials::from(state.cache.get().await?);
            json(serde_json::to_string_pretty(&credentials)?)
        }
        Route::IdentityDocument => {
            let doc = load_identity_document(&state)?;
            json(serde_json::to_string_pretty(&doc)?)
        }
        Route::InstanceId => {
            let doc = load_identity_document(&state)?;
            text(
                StatusCode::OK,
                identity::field_text(&doc, identity::INSTANCE_ID_KEY),
            )
        }
        Route::Signature => text(StatusCode::OK, SIGNATURE_RESPONSE),
        Route::AvailabilityZone => {
            let overrides = state.overrides.read_or_default()?;
            text(StatusCode::OK, identity::availability_zone(&overrides))
        }
        Route::Put => StatusCode::OK.into_response(),
        Route::NotFound => {
            tracing::debug!(path = uri.path(), "no such metadata path");
            not_found()
        }
        Route::Unsupported => text(
            StatusCode::NOT_IMPLEMENTED,
            format!("unsupported method ({method})"),
        ),
    };
    Ok(response)
}

fn load_identity_document(
    state: &AppState<impl CredentialSource>,
) -> Result<serde_json::Map<String, serde_json::Value>, HandlerError> {
    let metadata = state.store.get()?;
    let overrides = state.overrides.read_or_default()?;
    Ok(identity::identity_document(&metadata, overrides))
}

fn text<B: Into<String>>(status: StatusCode, body: B) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))],
        body.into(),
    )
        .into_response()
}

fn json(body: String) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))],
        body,
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(CONTENT_TYPE, HeaderValue::from_static(TEXT_HTML))],
        NOT_FOUND_PAGE,
    )
        .into_response()
}
