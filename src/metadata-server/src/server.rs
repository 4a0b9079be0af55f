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

//! The server lifecycle.

use crate::config::Config;
use crate::handler::{self, AppState};
use crate::identity::OverridesFile;
use iot_auth::backoff::RetryBackoff;
use iot_auth::cache::CredentialCache;
use iot_auth::client::CredentialClient;
use iot_auth::credentials::{CredentialSource, IotCredentialSource};
use iot_auth::metadata::MetadataStore;
use iot_auth::refresh::RefreshScheduler;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// A bound metadata server, ready to [run][Self::run].
#[derive(Debug)]
pub struct MetadataServer<T: CredentialSource> {
    listener: TcpListener,
    state: AppState<T>,
    backoff: RetryBackoff,
}

impl MetadataServer<IotCredentialSource> {
    /// Creates the credential cache for the registration directory in
    /// `config` and binds the listening socket.
    pub async fn from_config(config: &Config) -> std::io::Result<Self> {
        let store = Arc::new(MetadataStore::new(config.registration_dir()));
        let client = CredentialClient::new(config.registration_dir());
        let client = match config.exchange_timeout() {
            Some(t) => client.with_timeout(t),
            None => client,
        };
        let cache = CredentialCache::new(IotCredentialSource::new(store.clone(), client));
        let state = AppState::new(cache, store, OverridesFile::new(config.overrides_path()));
        Self::bind(config.socket_addr(), state).await
    }
}

impl<T> MetadataServer<T>
where
    T: CredentialSource + 'static,
{
    pub async fn bind(addr: SocketAddr, state: AppState<T>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state,
            backoff: RetryBackoff::default(),
        })
    }

    /// Changes the backoff between failed background refreshes.
    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn cache(&self) -> &CredentialCache<T> {
        self.state.cache()
    }

    /// Serves requests and refreshes credentials until `shutdown` completes.
    ///
    /// On shutdown the background refresh stops first. Then the server stops
    /// accepting connections, waits for in-flight requests, and closes the
    /// listening socket.
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scheduler = Arc::new(RefreshScheduler::start(
            self.state.cache().clone(),
            self.backoff,
        ));
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, "serving instance metadata");

        let stopper = scheduler.clone();
        let signal = async move {
            shutdown.await;
            tracing::info!("shutting down the metadata server");
            stopper.stop().await;
        };
        let result = axum::serve(self.listener, handler::router(self.state))
            .with_graceful_shutdown(signal)
            .await;
        // No-op after a graceful shutdown.
        scheduler.stop().await;
        result
    }
}
