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
use crate::constants::{CERTIFICATE_SUFFIX, PRIVATE_KEY_SUFFIX};
use crate::errors::{CredentialsError, ErrorKind};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::path::{Path, PathBuf};

/// The certificate and private key files used for mutual TLS.
///
/// The files are `{certificate_id}.pem` and `{certificate_id}.privatekey` in
/// the registration directory. They are read every time an identity is
/// needed, so rotated files are picked up without a restart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCertificate {
    certificate: PathBuf,
    private_key: PathBuf,
}

impl DeviceCertificate {
    pub fn new(dir: &Path, certificate_id: &str) -> Self {
        Self {
            certificate: dir.join(format!("{certificate_id}.{CERTIFICATE_SUFFIX}")),
            private_key: dir.join(format!("{certificate_id}.{PRIVATE_KEY_SUFFIX}")),
        }
    }

    pub fn certificate_path(&self) -> &Path {
        &self.certificate
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_key
    }

    /// Loads the certificate chain and key as a client identity.
    pub(crate) fn identity(&self) -> Result<reqwest::Identity> {
        let certificate = read(&self.certificate)?;
        let private_key = read(&self.private_key)?;

        let chain = CertificateDer::pem_slice_iter(&certificate)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                CredentialsError::new(
                    false,
                    ErrorKind::Certificate,
                    format!("cannot parse certificate {}", self.certificate.display()),
                    e,
                )
            })?;
        if chain.is_empty() {
            return Err(CredentialsError::certificate(format!(
                "no certificates found in {}",
                self.certificate.display()
            )));
        }
        PrivateKeyDer::from_pem_slice(&private_key).map_err(|e| {
            CredentialsError::new(
                false,
                ErrorKind::Certificate,
                format!("cannot parse private key {}", self.private_key.display()),
                e,
            )
        })?;

        let mut pem = certificate;
        pem.push(b'\n');
        pem.extend_from_slice(&private_key);
        reqwest::Identity::from_pem(&pem).map_err(|e| {
            CredentialsError::new(
                false,
                ErrorKind::Certificate,
                "cannot create TLS client identity",
                e,
            )
        })
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        CredentialsError::new(
            false,
            ErrorKind::Certificate,
            format!("cannot read {}", path.display()),
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = anyhow::Result<()>;

    #[test]
    fn paths() {
        let cert = DeviceCertificate::new(Path::new("/AWSIoT"), "mycertificateid");
        assert_eq!(
            cert.certificate_path(),
            Path::new("/AWSIoT/mycertificateid.pem")
        );
        assert_eq!(
            cert.private_key_path(),
            Path::new("/AWSIoT/mycertificateid.privatekey")
        );
    }

    #[test]
    fn missing_files() -> TestResult {
        let dir = tempfile::tempdir()?;
        let cert = DeviceCertificate::new(dir.path(), "missing");
        let err = cert.identity().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Certificate);
        assert!(!err.is_transient(), "{err:?}");
        let got = format!("{err}");
        assert!(got.contains("missing.pem"), "{got}");
        Ok(())
    }

    #[test]
    fn empty_certificate() -> TestResult {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("empty.pem"), "not a pem file")?;
        std::fs::write(dir.path().join("empty.privatekey"), "not a pem file")?;
        let cert = DeviceCertificate::new(dir.path(), "empty");
        let err = cert.identity().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Certificate);
        let got = format!("{err}");
        assert!(got.contains("no certificates found"), "{got}");
        Ok(())
    }

    #[test]
    fn bad_private_key() -> TestResult {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("bad.pem"),
            "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n",
        )?;
        std::fs::write(dir.path().join("bad.privatekey"), "BLAHBLAHBLAH")?;
        let cert = DeviceCertificate::new(dir.path(), "bad");
        let err = cert.identity().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Certificate);
        let got = format!("{err}");
        assert!(got.contains("private key"), "{got}");
        Ok(())
    }
}
