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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use futures::TryFutureExt;
use hub_relayer_chain::{ChainClient, KeyManager};
use hub_relayer_config::chain::ContractsConfig;
use hub_relayer_config::relay::{RegistrationConfig, WorkerConfig};
use hub_relayer_registration::RegistrationManager;
use hub_relayer_store::TxStore;
use hub_relayer_tx_manager::{SendTransactionDetails, TransactionManager};
use hub_relayer_types::relay::{
    PingResponse, RelayTransactionRequest, RelayTransactionResponse,
};
use hub_relayer_types::{Identity, ServerAction};
use hub_relayer_utils::metric::{wei_to_gwei, Metrics};
use hub_relayer_utils::{probe, Error, RelayRequestError, Result};
use parking_lot::{Mutex, RwLock};

use crate::fees::TX_BASE_GAS;
use crate::RelayApi;

/// Chain view of the last tick. Replaced as a whole on every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub block_number: u64,
    /// Lowest gas price accepted from clients.
    pub gas_price: U256,
    pub manager_balance: U256,
    pub owner: Option<Address>,
    pub ready: bool,
    /// Why the server is not ready.
    pub last_error: Option<String>,
}

pub struct RelayWorker<S, C, K> {
    pub(crate) tx_manager: Arc<TransactionManager<S, C, K>>,
    registration: tokio::sync::Mutex<RegistrationManager<S, C, K>>,
    pub(crate) contracts: ContractsConfig,
    pub(crate) config: WorkerConfig,
    pub(crate) fees: RegistrationConfig,
    pub(crate) manager: Address,
    /// The worker relayed calls are signed with.
    pub(crate) worker: Address,
    workers: Vec<(Identity, Address)>,
    snapshot: RwLock<Arc<WorkerSnapshot>>,
    force_registration: AtomicBool,
    last_logged_error: Mutex<Option<String>>,
}

impl<S, C, K> std::fmt::Debug for RelayWorker<S, C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayWorker")
            .field("manager", &self.manager)
            .field("worker", &self.worker)
            .field("snapshot", &self.snapshot.read())
            .finish_non_exhaustive()
    }
}

impl<S, C, K> RelayWorker<S, C, K>
where
    S: TxStore + 'static,
    C: ChainClient + 'static,
    K: KeyManager + 'static,
{
    pub fn new(
        tx_manager: Arc<TransactionManager<S, C, K>>,
        registration: RegistrationManager<S, C, K>,
        contracts: ContractsConfig,
        config: WorkerConfig,
    ) -> Result<Self> {
        let keys = tx_manager.keys();
        let manager = keys.address(Identity::Manager)?;
        let worker = keys.address(Identity::Worker(0))?;
        let workers = keys
            .identities()
            .into_iter()
            .filter(Identity::is_worker)
            .map(|identity| Ok((identity, keys.address(identity)?)))
            .collect::<Result<Vec<_>>>()?;
        let fees = registration.config().clone();
        let force_registration =
            AtomicBool::new(fees.force_registration_on_start);
        Ok(Self {
            tx_manager,
            registration: tokio::sync::Mutex::new(registration),
            contracts,
            config,
            fees,
            manager,
            worker,
            workers,
            snapshot: RwLock::new(Arc::new(WorkerSnapshot {
                last_error: Some(String::from("waiting for the first block")),
                ..Default::default()
            })),
            force_registration,
            last_logged_error: Mutex::new(None),
        })
    }

    /// The snapshot published by the last tick.
    pub fn snapshot(&self) -> Arc<WorkerSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn tx_manager(&self) -> &Arc<TransactionManager<S, C, K>> {
        &self.tx_manager
    }

    /// Snapshot of the registration manager state.
    pub async fn registration_state(
        &self,
    ) -> hub_relayer_registration::RegistrationState {
        self.registration.lock().await.state()
    }

    fn metrics_ref(&self) -> &Metrics {
        self.tx_manager.metrics()
    }

    /// Startup checks, failing with a fatal error when the configured hub is
    /// not usable.
    #[tracing::instrument(skip_all)]
    pub async fn init(&self) -> Result<()> {
        let chain = self.tx_manager.chain();
        let relay_hub = chain.relay_hub();
        let code = chain.code_at(relay_hub).await?;
        if code.is_empty() {
            return Err(Error::InvalidHubContract(relay_hub));
        }
        let version = chain.hub_version().await?;
        if !version.starts_with(&self.contracts.expected_hub_version) {
            return Err(Error::HubVersionMismatch {
                expected: self.contracts.expected_hub_version.clone(),
                found: version,
            });
        }
        self.tx_manager.init().await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            ?relay_hub,
            %version,
            manager = ?self.manager,
            worker = ?self.worker,
            initialized = true,
        );
        Ok(())
    }

    /// Processes `block`. Returns the ids of the transactions sent.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self, block: u64) -> Result<Vec<H256>> {
        let mut snapshot = WorkerSnapshot {
            block_number: block,
            ..Default::default()
        };
        let result = self.tick_inner(block, &mut snapshot).await;
        match &result {
            Ok(_) => {
                snapshot.ready = true;
                snapshot.last_error = None;
                if self.last_logged_error.lock().take().is_some() {
                    tracing::info!(block, "relay server is ready again");
                }
            }
            Err(e) => {
                let message = e.to_string();
                let mut last = self.last_logged_error.lock();
                if last.as_deref() != Some(message.as_str()) {
                    tracing::warn!(block, error = %message, "relay server not ready");
                    *last = Some(message.clone());
                }
                snapshot.ready = false;
                snapshot.last_error = Some(message);
            }
        }
        self.metrics_ref()
            .ready
            .set(if snapshot.ready { 1.0 } else { 0.0 });
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Worker,
            block,
            ready = snapshot.ready,
            gas_price = %snapshot.gas_price,
        );
        *self.snapshot.write() = Arc::new(snapshot);
        result
    }

    async fn tick_inner(
        &self,
        block: u64,
        snapshot: &mut WorkerSnapshot,
    ) -> Result<Vec<H256>> {
        let chain = self.tx_manager.chain();

        let network_gas_price = chain.gas_price().await?;
        let gas_price = (network_gas_price
            .saturating_mul(U256::from(self.config.gas_price_percent))
            / 100)
            .max(self.config.min_gas_price.wei());
        let max_gas_price = self.tx_manager.config().max_gas_price.wei();
        snapshot.gas_price = gas_price;
        if gas_price > max_gas_price {
            return Err(Error::GasPriceTooHigh {
                gas_price,
                max_gas_price,
            });
        }

        let balance = chain.balance(self.manager).await?;
        snapshot.manager_balance = balance;
        self.metrics_ref().manager_balance.set(wei_to_gwei(balance));
        let required = self.fees.min_manager_balance.wei();
        if balance < required {
            return Err(Error::FundingNeeded { balance, required });
        }

        let mut sent = {
            let mut registration = self.registration.lock().await;
            let from = registration
                .state()
                .last_scanned_block
                .map(|b| b + 1)
                .unwrap_or(self.contracts.deployed_at);
            let mut events = Vec::new();
            let step = self.config.max_blocks_per_step.max(1);
            let mut start = from;
            while start <= block {
                let end = block.min(start + step - 1);
                events.extend(chain.hub_events(self.manager, start, end).await?);
                start = end + 1;
            }
            let force = self.force_registration.load(Ordering::SeqCst);
            let sent = registration
                .handle_chain_events(&events, block, force)
                .await?;
            self.force_registration.store(false, Ordering::SeqCst);
            snapshot.owner = registration.state().owner;
            registration.assert_registered()?;
            sent
        };

        sent.extend(self.top_up_workers(block, balance).await?);
        let replacements = self.tx_manager.reconcile_confirmed(block).await?;
        sent.extend(replacements.iter().map(|tx| tx.id));
        Ok(sent)
    }

    /// Refills the workers below `min_worker_balance` up to
    /// `worker_target_balance`, as long as the manager keeps its own minimum.
    async fn top_up_workers(
        &self,
        block: u64,
        mut manager_balance: U256,
    ) -> Result<Vec<H256>> {
        let chain = self.tx_manager.chain();
        let min_balance = self.config.min_worker_balance.wei();
        let target = self.config.worker_target_balance.wei();
        let manager_minimum = self.fees.min_manager_balance.wei();
        let pending_transfers: Vec<Address> = self
            .tx_manager
            .store()
            .get_all_for_signer(self.manager)?
            .into_iter()
            .filter(|tx| tx.action == ServerAction::ValueTransfer && !tx.is_mined())
            .map(|tx| tx.to)
            .collect();

        let mut sent = Vec::new();
        let mut total = U256::zero();
        for (identity, address) in &self.workers {
            let balance = chain.balance(*address).await?;
            total += balance;
            if balance >= min_balance || pending_transfers.contains(address) {
                continue;
            }
            let amount = target.saturating_sub(balance);
            if manager_balance < amount + manager_minimum {
                tracing::warn!(
                    %identity,
                    %balance,
                    %manager_balance,
                    "manager can not afford to top up the worker",
                );
                continue;
            }
            let details = SendTransactionDetails::builder()
                .identity(Identity::Manager)
                .action(ServerAction::ValueTransfer)
                .to(*address)
                .value(amount)
                .gas_limit(U256::from(TX_BASE_GAS))
                .creation_block(block)
                .build();
            let signed = self.tx_manager.send_transaction(details).await?;
            tracing::info!(%identity, %amount, tx_hash = ?signed.tx_hash, "topped up worker");
            manager_balance -= amount;
            sent.push(signed.tx_hash);
        }
        self.metrics_ref().worker_balance.set(wei_to_gwei(total));
        Ok(sent)
    }

    /// Ticks on every new block until the future is dropped.
    ///
    /// Fatal errors stop the loop, anything else is retried on the next
    /// block.
    #[tracing::instrument(skip_all)]
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let interval = self.config.polling_interval();
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: None,
            ..Default::default()
        };
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            polling_interval_ms = interval.as_millis() as u64,
            starting = true,
        );
        let last_ticked = Mutex::new(None::<u64>);
        let task = || async {
            loop {
                let block = self
                    .tx_manager
                    .chain()
                    .block_number()
                    .map_err(backoff::Error::transient)
                    .await?;
                let is_new = last_ticked.lock().map_or(true, |last| block > last);
                if is_new {
                    match self.tick(block).await {
                        Err(e) if e.is_fatal() => {
                            return Err(backoff::Error::permanent(e));
                        }
                        // logged by the tick
                        Ok(_) | Err(_) => {}
                    }
                    *last_ticked.lock() = Some(block);
                }
                tokio::time::sleep(interval).await;
            }
        };
        backoff::future::retry_notify(backoff, task, |e, after: std::time::Duration| {
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Retry,
                error = %e,
                retry_after_ms = after.as_millis() as u64,
            );
        })
        .await
    }

    /// Addresses and readiness of the server.
    pub async fn ping(&self) -> PingResponse {
        let snapshot = self.snapshot();
        PingResponse {
            relay_worker_address: self.worker,
            relay_manager_address: self.manager,
            relay_hub_address: self.tx_manager.chain().relay_hub(),
            owner_address: snapshot.owner,
            min_gas_price: snapshot.gas_price,
            max_acceptance_budget: U256::from(self.config.max_acceptance_budget),
            chain_id: self.tx_manager.keys().chain_id(),
            ready: snapshot.ready,
            version: String::from(env!("CARGO_PKG_VERSION")),
        }
    }

    pub(crate) fn ensure_ready(
        &self,
        snapshot: &WorkerSnapshot,
    ) -> std::result::Result<(), RelayRequestError> {
        if snapshot.ready {
            Ok(())
        } else {
            Err(RelayRequestError::NotReady(
                snapshot
                    .last_error
                    .clone()
                    .unwrap_or_else(|| String::from("unknown")),
            ))
        }
    }
}

#[async_trait::async_trait]
impl<S, C, K> RelayApi for RelayWorker<S, C, K>
where
    S: TxStore + 'static,
    C: ChainClient + 'static,
    K: KeyManager + 'static,
{
    async fn create_relay_transaction(
        &self,
        request: RelayTransactionRequest,
    ) -> Result<RelayTransactionResponse> {
        RelayWorker::create_relay_transaction(self, request).await
    }

    async fn ping(&self) -> Result<PingResponse> {
        Ok(RelayWorker::ping(self).await)
    }

    fn metrics(&self) -> Arc<Metrics> {
        self.tx_manager.metrics().clone()
    }
}
