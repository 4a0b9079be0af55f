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

//! AWS IoT certificate credentials for processes that only speak the instance
//! metadata protocol.
//!
//! A device registered with AWS IoT holds a long-lived X.509 certificate
//! instead of an EC2 instance identity. This crate exchanges that certificate
//! for short-lived session credentials at the [AWS IoT credential provider],
//! caches the result, and refreshes it before it expires.
//!
//! The main types are:
//!
//! * [metadata::MetadataStore] loads the registration data (`metadata.json`)
//!   and reloads it whenever the file modification time changes.
//! * [client::CredentialClient] performs the mutually authenticated exchange.
//! * [cache::CredentialCache] serves cached credentials and collapses
//!   concurrent refreshes into a single exchange.
//! * [refresh::RefreshScheduler] refreshes the cache in the background, before
//!   the credentials expire.
//!
//! [AWS IoT credential provider]: https://docs.aws.amazon.com/iot/latest/developerguide/authorizing-direct-aws.html

pub mod errors;

/// Jittered, doubling delays between retries of a failed background refresh.
pub mod backoff;

/// The credentials cache.
pub mod cache;

/// Device certificate and private key files.
pub mod certificate;

/// The mutually authenticated credential exchange.
pub mod client;

pub mod constants;

/// Types and traits to work with session credentials.
pub mod credentials;

/// Registration metadata for the device.
pub mod metadata;

/// Background refresh of cached credentials.
pub mod refresh;

/// A `Result` alias where the `Err` case is
/// `iot_auth::errors::CredentialsError`.
pub type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;
