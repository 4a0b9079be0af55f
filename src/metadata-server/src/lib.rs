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

//! A local emulation of the EC2 instance metadata service.
//!
//! AWS SDKs look for credentials at a well-known metadata endpoint. This
//! crate serves that protocol on a loopback port, backed by credentials
//! exchanged for the device certificate of an AWS IoT thing. Existing SDK
//! credential discovery works unmodified once traffic for the metadata
//! address is redirected to the server.
//!
//! ```no_run
//! # use iot_metadata_server::{Config, MetadataServer};
//! # async fn sample() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let server = MetadataServer::from_config(&config).await?;
//! server.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(()) }
//! ```

pub mod config;
pub mod handler;
pub mod identity;
pub mod routes;
pub mod server;

pub use config::Config;
pub use server::MetadataServer;
