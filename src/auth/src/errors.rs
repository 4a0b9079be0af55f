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

//! Errors created while loading registration data or exchanging credentials.

use http::StatusCode;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result};
use std::sync::Arc;

/// Represents an error loading, fetching, or caching credentials.
///
/// The type is cheap to clone. When several callers wait on the same refresh
/// they all receive a copy of the same error.
///
/// # Example
/// ```
/// # use iot_auth::errors::{CredentialsError, ErrorKind};
/// let err = CredentialsError::exchange(503, "try again");
/// assert!(err.is_transient());
/// assert!(matches!(err.kind(), ErrorKind::Exchange { status: 503, .. }));
/// assert!(format!("{err}").contains("try again"));
/// ```
#[derive(Clone, Debug)]
pub struct CredentialsError {
    /// A boolean value indicating whether the error is transient.
    ///
    /// If `true`, the operation that resulted in this error might succeed upon
    /// retry.
    is_transient: bool,

    kind: ErrorKind,

    message: String,

    /// The underlying source of the error, if any.
    source: Option<Arc<dyn Error + Send + Sync>>,
}

/// The category of a [CredentialsError].
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The registration file is missing, unreadable, or malformed.
    MetadataUnavailable,
    /// The device certificate or private key cannot be loaded.
    Certificate,
    /// The exchange endpoint answered with a non-success status code.
    Exchange {
        /// The HTTP status code.
        status: u16,
        /// The response body, as returned by the endpoint.
        body: String,
    },
    /// The request to the exchange endpoint did not complete.
    Transport,
    /// The exchange endpoint returned a response that cannot be parsed.
    Decode,
}

impl CredentialsError {
    /// Creates a new `CredentialsError` from a source error.
    pub fn new<M, T>(is_transient: bool, kind: ErrorKind, message: M, source: T) -> Self
    where
        M: Into<String>,
        T: Error + Send + Sync + 'static,
    {
        Self {
            is_transient,
            kind,
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a new `CredentialsError` without a source error.
    pub fn from_msg<M: Into<String>>(is_transient: bool, kind: ErrorKind, message: M) -> Self {
        Self {
            is_transient,
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// The registration metadata cannot be used.
    pub fn metadata_unavailable<M, T>(message: M, source: T) -> Self
    where
        M: Into<String>,
        T: Error + Send + Sync + 'static,
    {
        Self::new(false, ErrorKind::MetadataUnavailable, message, source)
    }

    /// The device certificate or private key cannot be used.
    pub fn certificate<M: Into<String>>(message: M) -> Self {
        Self::from_msg(false, ErrorKind::Certificate, message)
    }

    /// The exchange endpoint rejected the request.
    ///
    /// The error is transient if the status code suggests the request may
    /// succeed later.
    pub fn exchange<B: Into<String>>(status: u16, body: B) -> Self {
        let body = body.into();
        let is_transient = StatusCode::from_u16(status).is_ok_and(is_retryable);
        let message = format!("credential exchange failed with status {status}: {body}");
        Self::from_msg(is_transient, ErrorKind::Exchange { status, body }, message)
    }

    /// Returns the error category.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns `true` if the error is transient; otherwise returns `false`.
    pub fn is_transient(&self) -> bool {
        self.is_transient
    }
}

impl std::error::Error for CredentialsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

const TRANSIENT_MSG: &str = "but future attempts may succeed";
const PERMANENT_MSG: &str = "and future attempts will not succeed";

impl Display for CredentialsError {
    /// Formats the error message to include retryability and source.
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let msg = if self.is_transient {
            TRANSIENT_MSG
        } else {
            PERMANENT_MSG
        };
        match &self.source {
            None => write!(f, "{}, {}", self.message, msg),
            Some(source) => write!(f, "{}, {}, source: {}", self.message, msg, source),
        }
    }
}

/// Classifies an error from the HTTP client.
///
/// Decoding errors are not transient. Typically they indicate a badly
/// configured endpoint, or DNS redirecting the request to a random server.
pub(crate) fn from_http_error(err: reqwest::Error, msg: &str) -> CredentialsError {
    if err.is_decode() {
        return CredentialsError::new(false, ErrorKind::Decode, msg, err);
    }
    let is_transient = err.is_connect()
        || err.is_timeout()
        || err
            .status()
            .map_or(err.is_request(), is_retryable);
    CredentialsError::new(is_transient, ErrorKind::Transport, msg, err)
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}
