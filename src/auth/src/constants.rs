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

//! Well-known names and defaults.

/// Where the registration files live unless configured otherwise.
pub const DEFAULT_REGISTRATION_DIR: &str = "/AWSIoT";
/// Overrides [DEFAULT_REGISTRATION_DIR].
pub const REGISTRATION_DIR_ENV_VAR: &str = "FAKE_METADATA_PATH";
/// The registration metadata file, relative to the registration directory.
pub const METADATA_FILE: &str = "metadata.json";
/// The header naming the thing (device) requesting credentials.
pub const THING_NAME_HEADER: &str = "x-amzn-iot-thingname";

pub(crate) const CERTIFICATE_SUFFIX: &str = "pem";
pub(crate) const PRIVATE_KEY_SUFFIX: &str = "privatekey";
/// The format of `expiration` in credential exchange responses.
pub(crate) const EXPIRATION_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
