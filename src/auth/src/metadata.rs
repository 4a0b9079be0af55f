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
use crate::constants::{
    DEFAULT_REGISTRATION_DIR, METADATA_FILE, REGISTRATION_DIR_ENV_VAR,
};
use crate::errors::CredentialsError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// The registration data for a device, as written by the provisioning tools.
///
/// A snapshot is immutable. When `metadata.json` changes the store replaces
/// the whole snapshot, it never updates fields in place.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RegistrationMetadata {
    /// The AWS IoT credential provider endpoint, e.g.
    /// `https://xyzzy.credentials.iot.us-east-1.amazonaws.com`.
    pub credential_endpoint: String,
    /// The role alias the device assumes.
    pub role_alias_name: String,
    /// The thing name registered for this device.
    pub device_name: String,
    /// Names the certificate and private key files.
    pub certificate_id: String,
    pub account_id: String,
    pub region: String,
}

/// Loads [RegistrationMetadata] and reloads it when the file changes.
///
/// The store compares the modification time of `metadata.json` with the one
/// recorded on the last load. Content changes that keep the modification time
/// are not detected.
#[derive(Debug)]
pub struct MetadataStore {
    dir: PathBuf,
    snapshot: RwLock<Option<Snapshot>>,
}

#[derive(Clone, Debug)]
struct Snapshot {
    metadata: Arc<RegistrationMetadata>,
    modified: SystemTime,
}

impl MetadataStore {
    /// Creates a store for the registration files in `dir`.
    ///
    /// Nothing is read until the first call to [get][Self::get] or
    /// [load][Self::load].
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            snapshot: RwLock::new(None),
        }
    }

    /// Creates a store using the `FAKE_METADATA_PATH` environment variable, or
    /// `/AWSIoT` if the variable is not set.
    pub fn from_env() -> Self {
        let dir = std::env::var_os(REGISTRATION_DIR_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRATION_DIR));
        Self::new(dir)
    }

    /// The directory holding `metadata.json`, the certificate, and its key.
    pub fn registration_dir(&self) -> &Path {
        &self.dir
    }

    fn metadata_file(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Returns the current registration metadata.
    ///
    /// Reloads the file first if it has never been loaded, or if its
    /// modification time differs from the last load.
    pub fn get(&self) -> Result<Arc<RegistrationMetadata>> {
        let modified = self.modified()?;
        let current = self
            .snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match current {
            Some(s) if s.modified == modified => Ok(s.metadata),
            _ => self.load(),
        }
    }

    /// Reads and parses `metadata.json`, replacing the current snapshot.
    pub fn load(&self) -> Result<Arc<RegistrationMetadata>> {
        let path = self.metadata_file();
        // Record the modification time before reading. If the file changes
        // while we read it the next `get()` sees a newer time and reloads.
        let modified = self.modified()?;
        let contents = std::fs::read(&path).map_err(|e| {
            CredentialsError::metadata_unavailable(
                format!("cannot read registration metadata {}", path.display()),
                e,
            )
        })?;
        let metadata = serde_json::from_slice::<RegistrationMetadata>(&contents)
            .map(Arc::new)
            .map_err(|e| {
                CredentialsError::metadata_unavailable(
                    format!("malformed registration metadata {}", path.display()),
                    e,
                )
            })?;
        tracing::debug!(path = %path.display(), device = %metadata.device_name, "loaded registration metadata");
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Some(Snapshot {
            metadata: metadata.clone(),
            modified,
        });
        Ok(metadata)
    }

    fn modified(&self) -> Result<SystemTime> {
        let path = self.metadata_file();
        std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| {
                CredentialsError::metadata_unavailable(
                    format!("cannot stat registration metadata {}", path.display()),
                    e,
                )
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::time::Duration;

    type TestResult = anyhow::Result<()>;

    pub(crate) fn test_metadata() -> RegistrationMetadata {
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

    pub(crate) fn write_metadata(dir: &Path, metadata: &RegistrationMetadata) -> TestResult {
        std::fs::write(dir.join(METADATA_FILE), serde_json::to_vec(metadata)?)?;
        Ok(())
    }

    fn set_modified(dir: &Path, t: SystemTime) -> TestResult {
        let file = std::fs::File::options()
            .write(true)
            .open(dir.join(METADATA_FILE))?;
        file.set_modified(t)?;
        Ok(())
    }

    #[test]
    fn load_success() -> TestResult {
        let dir = tempfile::tempdir()?;
        write_metadata(dir.path(), &test_metadata())?;

        let store = MetadataStore::new(dir.path());
        assert_eq!(store.registration_dir(), dir.path());
        let got = store.get()?;
        assert_eq!(*got, test_metadata());
        Ok(())
    }

    #[test]
    fn load_missing() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = MetadataStore::new(dir.path());
        let err = store.get().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::MetadataUnavailable);
        assert!(!err.is_transient(), "{err:?}");
        Ok(())
    }

    #[test]
    fn load_malformed() -> TestResult {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(METADATA_FILE), r#"{"device_name": "test1"}"#)?;
        let store = MetadataStore::new(dir.path());
        let err = store.load().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::MetadataUnavailable);
        let got = format!("{err}");
        assert!(got.contains("malformed"), "{got}");
        Ok(())
    }

    #[test]
    fn reload_on_mtime_change() -> TestResult {
        let dir = tempfile::tempdir()?;
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        write_metadata(dir.path(), &test_metadata())?;
        set_modified(dir.path(), t0)?;

        let store = MetadataStore::new(dir.path());
        let first = store.get()?;
        assert_eq!(first.device_name, "test1");

        let updated = RegistrationMetadata {
            device_name: "test2".to_string(),
            ..test_metadata()
        };
        write_metadata(dir.path(), &updated)?;
        set_modified(dir.path(), t0 + Duration::from_secs(60))?;

        let second = store.get()?;
        assert_eq!(*second, updated);
        // The first snapshot is not modified in place.
        assert_eq!(first.device_name, "test1");
        Ok(())
    }

    #[test]
    fn no_reload_while_mtime_unchanged() -> TestResult {
        let dir = tempfile::tempdir()?;
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        write_metadata(dir.path(), &test_metadata())?;
        set_modified(dir.path(), t0)?;

        let store = MetadataStore::new(dir.path());
        let first = store.get()?;

        let updated = RegistrationMetadata {
            device_name: "test2".to_string(),
            ..test_metadata()
        };
        write_metadata(dir.path(), &updated)?;
        set_modified(dir.path(), t0)?;

        let second = store.get()?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.device_name, "test1");
        Ok(())
    }

    #[test]
    #[serial_test::serial]
    fn from_env() {
        let _e = scoped_env::ScopedEnv::set(REGISTRATION_DIR_ENV_VAR, "/tmp/registration");
        let store = MetadataStore::from_env();
        assert_eq!(store.registration_dir(), Path::new("/tmp/registration"));

        let _e = scoped_env::ScopedEnv::remove(REGISTRATION_DIR_ENV_VAR);
        let store = MetadataStore::from_env();
        assert_eq!(store.registration_dir(), Path::new(DEFAULT_REGISTRATION_DIR));
    }

    #[test]
    fn file_removed_after_load() -> TestResult {
        let dir = tempfile::tempdir()?;
        write_metadata(dir.path(), &test_metadata())?;
        let store = MetadataStore::new(dir.path());
        store.get()?;

        std::fs::remove_file(dir.path().join(METADATA_FILE))?;
        let err = store.get().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::MetadataUnavailable);
        Ok(())
    }
}
