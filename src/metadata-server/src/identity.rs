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

//! The instance identity document and its overrides file.

use iot_auth::metadata::RegistrationMetadata;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const AVAILABILITY_ZONE_KEY: &str = "availabilityZone";
pub const INSTANCE_ID_KEY: &str = "instanceId";

/// Returned where an EC2 instance would report a real value.
pub const FAKE: &str = "fake";
const INSTANCE_TYPE: &str = "f1.fake";

/// Errors reading the identity document overrides.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum OverrideFileError {
    #[error("cannot read overrides file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in overrides file {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl OverrideFileError {
    /// Returns `true` for errors that fall back to the defaults: a missing
    /// file, or one that does not hold a JSON object.
    pub fn is_ignored(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            Self::InvalidJson { .. } => true,
        }
    }
}

/// An optional JSON object merged into the identity document.
///
/// The file is read on every call, edits take effect on the next request.
#[derive(Clone, Debug)]
pub struct OverridesFile {
    path: PathBuf,
}

impl OverridesFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the overrides, failing on any error.
    pub fn read(&self) -> Result<Map<String, Value>, OverrideFileError> {
        let contents = std::fs::read(&self.path).map_err(|source| OverrideFileError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&contents).map_err(|source| OverrideFileError::InvalidJson {
            path: self.path.clone(),
            source,
        })
    }

    /// Reads the overrides. A missing or invalid file yields no overrides.
    pub fn read_or_default(&self) -> Result<Map<String, Value>, OverrideFileError> {
        match self.read() {
            Ok(m) => Ok(m),
            Err(e) if e.is_ignored() => {
                tracing::debug!("ignoring identity document overrides: {e}");
                Ok(Map::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// Builds the identity document for `metadata`, with `overrides` replacing
/// the default values key by key.
pub fn identity_document(
    metadata: &RegistrationMetadata,
    overrides: Map<String, Value>,
) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("accountId".into(), metadata.account_id.clone().into());
    doc.insert("region".into(), metadata.region.clone().into());
    doc.insert("architecture".into(), std::env::consts::ARCH.into());
    doc.insert(AVAILABILITY_ZONE_KEY.into(), FAKE.into());
    doc.insert("imageId".into(), FAKE.into());
    doc.insert(INSTANCE_ID_KEY.into(), metadata.device_name.clone().into());
    doc.insert("instanceType".into(), INSTANCE_TYPE.into());
    doc.insert("privateIp".into(), FAKE.into());
    doc.extend(overrides);
    doc
}

/// Formats a document field as a plain-text response body.
pub fn field_text(doc: &Map<String, Value>, key: &str) -> String {
    match doc.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}

/// The availability zone from the overrides, or `fake`.
pub fn availability_zone(overrides: &Map<String, Value>) -> String {
    match overrides.get(AVAILABILITY_ZONE_KEY) {
        Some(_) => field_text(overrides, AVAILABILITY_ZONE_KEY),
        None => FAKE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type TestResult = anyhow::Result<()>;

    fn metadata() -> RegistrationMetadata {
        RegistrationMetadata {
            credential_endpoint: "https://xyzzy.credentials.iot.us-east-1.amazonaws.com"
                .to_string(),
            role_alias_name: "TestRole".to_string(),
            device_name: "test1".to_string(),
            certificate_id: "mycertificateid".to_string(),
            account_id: "0123456789".to_string(),
            region: "us-test-1".to_string(),
        }
    }

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object: {v:?}"),
        }
    }

    #[test]
    fn defaults() {
        let doc = identity_document(&metadata(), Map::new());
        assert_eq!(
            Value::Object(doc),
            json!({
                "accountId": "0123456789",
                "region": "us-test-1",
                "architecture": std::env::consts::ARCH,
                "availabilityZone": "fake",
                "imageId": "fake",
                "instanceId": "test1",
                "instanceType": "f1.fake",
                "privateIp": "fake",
            })
        );
    }

    #[test]
    fn overrides_win() {
        let overrides = object(json!({
            "availabilityZone": "us-foo-1",
            "instanceId": "i-0123",
            "extra": 42,
        }));
        let doc = identity_document(&metadata(), overrides);
        assert_eq!(doc["availabilityZone"], "us-foo-1");
        assert_eq!(doc["extra"], 42);
        assert_eq!(doc["accountId"], "0123456789");
        assert_eq!(field_text(&doc, INSTANCE_ID_KEY), "i-0123");
    }

    #[test]
    fn availability_zone_default_and_override() {
        assert_eq!(availability_zone(&Map::new()), "fake");
        let overrides = object(json!({"availabilityZone": "us-foo-1"}));
        assert_eq!(availability_zone(&overrides), "us-foo-1");
        let overrides = object(json!({"availabilityZone": 7}));
        assert_eq!(availability_zone(&overrides), "7");
    }

    #[test]
    fn missing_file_is_ignored() -> TestResult {
        let dir = tempfile::tempdir()?;
        let file = OverridesFile::new(dir.path().join("missing.json"));
        let err = file.read().unwrap_err();
        assert!(err.is_ignored(), "{err:?}");
        assert!(file.read_or_default()?.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_json_is_ignored() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("overrides.json");
        let file = OverridesFile::new(&path);

        std::fs::write(&path, "{not json")?;
        assert!(file.read_or_default()?.is_empty());

        std::fs::write(&path, "[1, 2, 3]")?;
        assert!(file.read_or_default()?.is_empty());
        Ok(())
    }

    #[test]
    fn other_errors_are_surfaced() -> TestResult {
        let dir = tempfile::tempdir()?;
        // Reading a directory fails with something other than NotFound.
        let file = OverridesFile::new(dir.path());
        let err = file.read_or_default().unwrap_err();
        assert!(matches!(err, OverrideFileError::Io { .. }), "{err:?}");
        assert!(!err.is_ignored(), "{err:?}");
        let got = err.to_string();
        assert!(got.contains(&dir.path().display().to_string()), "{got}");
        Ok(())
    }

    #[test]
    fn reread_on_every_call() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("overrides.json");
        let file = OverridesFile::new(&path);
        assert_eq!(file.path(), path);

        std::fs::write(&path, r#"{"availabilityZone": "us-foo-1"}"#)?;
        assert_eq!(availability_zone(&file.read_or_default()?), "us-foo-1");
        std::fs::write(&path, r#"{"availabilityZone": "us-bar-2"}"#)?;
        assert_eq!(availability_zone(&file.read_or_default()?), "us-bar-2");
        Ok(())
    }
}
