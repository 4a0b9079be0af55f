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

//! Server configuration, read from the environment.

use iot_auth::constants::{DEFAULT_REGISTRATION_DIR, REGISTRATION_DIR_ENV_VAR};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const HOST_ENV_VAR: &str = "FAKE_METADATA_HOST";
pub const PORT_ENV_VAR: &str = "FAKE_METADATA_PORT";
pub const TIMEOUT_ENV_VAR: &str = "FAKE_METADATA_TIMEOUT_SECS";

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_PORT: u16 = 51680;
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// The file merged into the instance identity document.
pub const OVERRIDES_FILE: &str = "instance_document_overrides.json";

/// Errors reading the configuration from the environment.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid listen address in {HOST_ENV_VAR} ({value:?}): {source}")]
    InvalidHost {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid port in {PORT_ENV_VAR} ({value:?}): {source}")]
    InvalidPort {
        value: String,
        source: std::num::ParseIntError,
    },
    #[error("invalid timeout in {TIMEOUT_ENV_VAR} ({value:?}): {source}")]
    InvalidTimeout {
        value: String,
        source: std::num::ParseIntError,
    },
}

/// Configures a [MetadataServer][crate::MetadataServer].
///
/// # Example
/// ```
/// # use iot_metadata_server::Config;
/// use std::time::Duration;
/// let config = Config::default()
///     .with_registration_dir("/var/lib/iot")
///     .with_port(8080)
///     .with_exchange_timeout(Some(Duration::from_secs(10)));
/// assert_eq!(config.port(), 8080);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    registration_dir: PathBuf,
    host: IpAddr,
    port: u16,
    exchange_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registration_dir: PathBuf::from(DEFAULT_REGISTRATION_DIR),
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            exchange_timeout: Some(DEFAULT_EXCHANGE_TIMEOUT),
        }
    }
}

impl Config {
    /// Reads the configuration from `FAKE_METADATA_PATH`,
    /// `FAKE_METADATA_HOST`, `FAKE_METADATA_PORT` and
    /// `FAKE_METADATA_TIMEOUT_SECS`.
    ///
    /// Unset variables use the defaults. A timeout of `0` disables the
    /// exchange timeout.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(REGISTRATION_DIR_ENV_VAR) {
            config.registration_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var(HOST_ENV_VAR) {
            config.host = value
                .parse()
                .map_err(|source| ConfigError::InvalidHost { value, source })?;
        }
        if let Ok(value) = std::env::var(PORT_ENV_VAR) {
            config.port = value
                .parse()
                .map_err(|source| ConfigError::InvalidPort { value, source })?;
        }
        if let Ok(value) = std::env::var(TIMEOUT_ENV_VAR) {
            let secs = value
                .parse::<u64>()
                .map_err(|source| ConfigError::InvalidTimeout { value, source })?;
            config.exchange_timeout = (secs != 0).then(|| Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn with_registration_dir<P: Into<PathBuf>>(mut self, v: P) -> Self {
        self.registration_dir = v.into();
        self
    }

    pub fn with_host<V: Into<IpAddr>>(mut self, v: V) -> Self {
        self.host = v.into();
        self
    }

    /// Port `0` picks any free port.
    pub fn with_port(mut self, v: u16) -> Self {
        self.port = v;
        self
    }

    /// `None` disables the exchange timeout.
    pub fn with_exchange_timeout(mut self, v: Option<Duration>) -> Self {
        self.exchange_timeout = v;
        self
    }

    /// The directory with `metadata.json`, the device certificate and key,
    /// and the optional identity document overrides.
    pub fn registration_dir(&self) -> &Path {
        &self.registration_dir
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn exchange_timeout(&self) -> Option<Duration> {
        self.exchange_timeout
    }

    pub fn overrides_path(&self) -> PathBuf {
        self.registration_dir.join(OVERRIDES_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoped_env::ScopedEnv;
    use serial_test::serial;

    type TestResult = anyhow::Result<()>;

    #[test]
    #[serial]
    fn defaults() -> TestResult {
        let _p = ScopedEnv::remove(REGISTRATION_DIR_ENV_VAR);
        let _h = ScopedEnv::remove(HOST_ENV_VAR);
        let _o = ScopedEnv::remove(PORT_ENV_VAR);
        let _t = ScopedEnv::remove(TIMEOUT_ENV_VAR);

        let config = Config::from_env()?;
        assert_eq!(config, Config::default());
        assert_eq!(config.registration_dir(), Path::new("/AWSIoT"));
        assert_eq!(config.socket_addr(), "127.0.0.1:51680".parse::<SocketAddr>()?);
        assert_eq!(config.exchange_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.overrides_path(),
            Path::new("/AWSIoT/instance_document_overrides.json")
        );
        Ok(())
    }

    #[test]
    #[serial]
    fn from_env() -> TestResult {
        let _p = ScopedEnv::set(REGISTRATION_DIR_ENV_VAR, "/tmp/registration");
        let _h = ScopedEnv::set(HOST_ENV_VAR, "0.0.0.0");
        let _o = ScopedEnv::set(PORT_ENV_VAR, "8080");
        let _t = ScopedEnv::set(TIMEOUT_ENV_VAR, "0");

        let config = Config::from_env()?;
        assert_eq!(config.registration_dir(), Path::new("/tmp/registration"));
        assert_eq!(config.socket_addr(), "0.0.0.0:8080".parse::<SocketAddr>()?);
        assert_eq!(config.exchange_timeout(), None);
        Ok(())
    }

    #[test]
    #[serial]
    fn bad_port() {
        let _h = ScopedEnv::remove(HOST_ENV_VAR);
        let _o = ScopedEnv::set(PORT_ENV_VAR, "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }), "{err:?}");
        assert!(err.to_string().contains("not-a-port"), "{err}");
    }

    #[test]
    #[serial]
    fn bad_host() {
        let _h = ScopedEnv::set(HOST_ENV_VAR, "localhost.invalid");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHost { .. }), "{err:?}");
    }

    #[test]
    #[serial]
    fn bad_timeout() {
        let _h = ScopedEnv::remove(HOST_ENV_VAR);
        let _o = ScopedEnv::remove(PORT_ENV_VAR);
        let _t = ScopedEnv::set(TIMEOUT_ENV_VAR, "-1");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }), "{err:?}");
    }

    #[test]
    fn setters() {
        let config = Config::default()
            .with_registration_dir("/var/lib/iot")
            .with_host(Ipv4Addr::UNSPECIFIED)
            .with_port(0)
            .with_exchange_timeout(None);
        assert_eq!(config.registration_dir(), Path::new("/var/lib/iot"));
        assert_eq!(config.host(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.port(), 0);
        assert_eq!(config.exchange_timeout(), None);
    }
}
