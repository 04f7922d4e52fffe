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


//! # Relayer Service Module 🕸️
//!
//! Builds the long-running relay worker and the HTTP server in front of it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use ethers::providers::{Http, Provider};
use hub_relayer_chain::{ChainClient, EthersChainClient, LocalKeyManager};
use hub_relayer_config::HubRelayerConfig;
use hub_relayer_registration::RegistrationManager;
use hub_relayer_tx_manager::TransactionManager;
use hub_relayer_utils::metric::Metrics;
use hub_relayer_utils::{probe, Error, Result};
use hub_relayer_worker::{RelayApi, RelayWorker};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Type alias for providers
pub type Client = Provider<Http>;
/// Type alias for [Sled](https://sled.rs)-based database store
pub type Store = hub_relayer_store::SledStore;
/// The relay worker as run by the binary.
pub type HubRelayer =
    RelayWorker<Store, EthersChainClient<Client>, LocalKeyManager>;

/// Builds the key manager from the configured keys, or from fresh random
/// keys when the config asks for ephemeral ones.
pub fn build_key_manager(
    config: &HubRelayerConfig,
) -> Result<LocalKeyManager> {
    let chain_id = config.chain.chain_id;
    match config.keys.manager.as_ref() {
        Some(manager) if !config.keys.workers.is_empty() => {
            let workers = config
                .keys
                .workers
                .iter()
                .map(|key| key.to_wallet())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(LocalKeyManager::new(chain_id, manager.to_wallet()?, workers))
        }
        _ if config.keys.ephemeral => Ok(LocalKeyManager::random(chain_id, 1)),
        _ => Err(Error::MissingSecrets),
    }
}

/// Connects to the configured node and assembles the relay worker.
///
/// Fails with [`Error::ChainIdMismatch`] if the node serves another chain.
pub async fn build_relayer(
    config: &HubRelayerConfig,
    store: Store,
    metrics: Arc<Metrics>,
) -> Result<Arc<HubRelayer>> {
    let provider = Provider::new(Http::new(
        config.chain.http_endpoint.as_url().clone(),
    ));
    let chain = EthersChainClient::new(
        Arc::new(provider),
        config.contracts.relay_hub,
        config.contracts.stake_manager,
    );
    let found = chain.chain_id().await?;
    if found != config.chain.chain_id {
        return Err(Error::ChainIdMismatch {
            expected: config.chain.chain_id,
            found,
        });
    }
    tracing::info!(
        "Connected to {} ({}) at {}",
        config.chain.name,
        found,
        config.chain.http_endpoint
    );
    let keys = build_key_manager(config)?;
    let tx_manager = Arc::new(TransactionManager::new(
        Arc::new(store),
        Arc::new(chain),
        Arc::new(keys),
        config.tx_manager.clone(),
        metrics,
    ));
    let registration = RegistrationManager::new(
        tx_manager.clone(),
        config.registration.clone(),
    )?;
    let worker = RelayWorker::new(
        tx_manager,
        registration,
        config.contracts.clone(),
        config.worker.clone(),
    )?;
    Ok(Arc::new(worker))
}

/// Runs the startup checks of the relay worker and starts its loop on a
/// background task.
///
/// Returns an error without spawning anything when the checks fail.
pub async fn ignite(
    relayer: Arc<HubRelayer>,
) -> Result<tokio::task::JoinHandle<Result<()>>> {
    relayer.init().await?;
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        worker_loop = true,
    );
    Ok(tokio::spawn(relayer.run()))
}

/// Sets up the HTTP server for the relayer, routing (endpoint queries / requests
/// mapped to handled code) to the relay worker.
///
/// Returns `Ok((addr, server))` on success.
///
/// # Arguments
///
/// * `api` - The relay server answering the requests
/// * `port` - Port to listen on, on all interfaces
pub fn build_web_services(
    api: Arc<dyn RelayApi>,
    port: u16,
) -> Result<(
    SocketAddr,
    impl core::future::Future<Output = hyper::Result<()>> + 'static,
)> {
    let app = hub_relayer_handlers::build_router(api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let server = axum::Server::try_bind(&socket_addr)?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    Ok((server.local_addr(), server))
}
