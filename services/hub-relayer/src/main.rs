// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Hub Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use hub_relayer::service;
use hub_relayer_config::cli::{create_store, load_config, setup_logger, Opts};
use hub_relayer_utils::metric::Metrics;
use hub_relayer_utils::probe;
use tokio::signal::unix;

/// The main entry point for the relayer.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose)?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;
    let store = create_store(&args)?;
    let metrics = Arc::new(Metrics::new()?);

    let relayer =
        service::build_relayer(&config, store, metrics.clone()).await?;
    // misconfigured hub or unreachable node, nothing to retry here.
    let mut worker_handle = service::ignite(relayer.clone()).await?;

    let (addr, server) =
        service::build_web_services(relayer.clone(), config.port)?;
    tracing::info!("Starting the server on {}", addr);
    let server_handle = tokio::spawn(server);
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        started = true
    );
    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    let outcome = tokio::select! {
        result = &mut worker_handle => {
            match result {
                Ok(Err(e)) => {
                    tracing::error!("Relay worker stopped: {e}");
                    Err(anyhow::Error::from(e))
                }
                Ok(Ok(())) => Ok(()),
                Err(e) => Err(anyhow::Error::from(e)),
            }
        },
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
            Ok(())
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
            Ok(())
        },
        _ = quit_signal.recv() => {
            tracing::warn!("Quitting ...");
            Ok(())
        },
    };
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        shutdown = true
    );
    tracing::warn!("Shutting down...");
    server_handle.abort();
    worker_handle.abort();
    tracing::info!("Clean Exit ..");
    outcome
}
