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

//! Maps requests to the metadata endpoints they address.

use axum::http::Method;

pub const PING_PATH: &str = "/ping";
pub const ROLE_PATH: &str = "/latest/meta-data/iam/security-credentials";
pub const IDENTITY_PATH: &str = "/latest/dynamic/instance-identity/document";
pub const INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";
pub const SIGNATURE_PATH: &str = "/latest/dynamic/instance-identity/signature";
pub const AVAILABILITY_ZONE_PATH: &str = "/latest/meta-data/placement/availability-zone";

/// The endpoint addressed by a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Liveness check.
    Ping,
    /// The name of the role served by this server.
    RoleName,
    /// The credentials for the given role.
    RoleCredentials(String),
    IdentityDocument,
    InstanceId,
    /// The identity document signature, which is not implemented.
    Signature,
    AvailabilityZone,
    /// Any `PUT`, accepted and ignored.
    Put,
    NotFound,
    /// Methods other than `GET` and `PUT`.
    Unsupported,
}

impl Route {
    /// Resolves `path` for `method`.
    ///
    /// Trailing slashes are ignored, everything else must match exactly.
    pub fn resolve(method: &Method, path: &str) -> Self {
        if method == Method::PUT {
            return Self::Put;
        }
        if method != Method::GET {
            return Self::Unsupported;
        }
        match path.trim_end_matches('/') {
            PING_PATH => Self::Ping,
            ROLE_PATH => Self::RoleName,
            IDENTITY_PATH => Self::IdentityDocument,
            INSTANCE_ID_PATH => Self::InstanceId,
            SIGNATURE_PATH => Self::Signature,
            AVAILABILITY_ZONE_PATH => Self::AvailabilityZone,
            p => match p.strip_prefix(ROLE_PATH).and_then(|r| r.strip_prefix('/')) {
                Some(role) if !role.is_empty() => Self::RoleCredentials(role.to_string()),
                _ => Self::NotFound,
            },
        }
    }
}
