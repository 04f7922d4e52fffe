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

//! # Registration Manager 🪪
//!
//! Folds the stake manager and relay hub events of the relay manager into a
//! small state machine:
//!
//! ```text
//! Unstaked -> Staked -> Authorized -> Registered
//!      \          \          \            \
//!       `----------`----------`------------`--> Withdrawing
//! ```
//!
//! and sends the transactions that move it forward: adding the workers,
//! registering the server, and draining every balance to the owner once the
//! stake is unlocked, withdrawn or the hub is de-authorized.

use std::collections::BTreeSet;
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use hub_relayer_chain::{calls, CallRequest, ChainClient, KeyManager};
use hub_relayer_config::relay::RegistrationConfig;
use hub_relayer_store::TxStore;
use hub_relayer_tx_manager::{SendTransactionDetails, TransactionManager};
use hub_relayer_types::{
    HubEvent, Identity, LoggedEvent, ServerAction, StakeInfo,
};
use hub_relayer_utils::{probe, Error, Result, StateError};

/// Gas of a plain value transfer.
const VALUE_TRANSFER_GAS: u64 = 21_000;

/// A `RelayServerRegistered` event of this relay manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRegistration {
    pub base_relay_fee: U256,
    pub pct_relay_fee: U256,
    pub url: String,
    pub block_number: u64,
}

/// What the manager knows about its on-chain standing.
///
/// `stake` and `hub_authorized` are `None` once invalidated by an event and
/// read again from the chain on the next update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationState {
    pub owner: Option<Address>,
    pub stake: Option<StakeInfo>,
    pub hub_authorized: Option<bool>,
    pub last_registration: Option<ServerRegistration>,
    pub added_workers: BTreeSet<Address>,
    pub registration_pending: bool,
    pub withdrawing: bool,
    /// Set by an event that drains the balances, `Some(true)` includes the
    /// manager balance. Kept until every leg went out.
    pub withdrawal_due: Option<bool>,
    pub last_scanned_block: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RegistrationStatus {
    #[display(fmt = "unstaked")]
    Unstaked,
    #[display(fmt = "staked")]
    Staked,
    #[display(fmt = "authorized")]
    Authorized,
    #[display(fmt = "registered")]
    Registered,
    #[display(fmt = "withdrawing")]
    Withdrawing,
}

pub struct RegistrationManager<S, C, K> {
    tx_manager: Arc<TransactionManager<S, C, K>>,
    config: RegistrationConfig,
    manager: Address,
    workers: Vec<(Identity, Address)>,
    state: RegistrationState,
}

impl<S, C, K> std::fmt::Debug for RegistrationManager<S, C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationManager")
            .field("manager", &self.manager)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S, C, K> RegistrationManager<S, C, K>
where
    S: TxStore,
    C: ChainClient,
    K: KeyManager,
{
    pub fn new(
        tx_manager: Arc<TransactionManager<S, C, K>>,
        config: RegistrationConfig,
    ) -> Result<Self> {
        let keys = tx_manager.keys();
        let manager = keys.address(Identity::Manager)?;
        let workers = keys
            .identities()
            .into_iter()
            .filter(Identity::is_worker)
            .map(|identity| Ok((identity, keys.address(identity)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            tx_manager,
            config,
            manager,
            workers,
            state: RegistrationState::default(),
        })
    }

    pub fn manager_address(&self) -> Address {
        self.manager
    }

    pub fn worker_addresses(&self) -> Vec<Address> {
        self.workers.iter().map(|(_, address)| *address).collect()
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn state(&self) -> RegistrationState {
        self.state.clone()
    }

    pub fn status(&self) -> RegistrationStatus {
        if self.state.withdrawing {
            return RegistrationStatus::Withdrawing;
        }
        match self.assert_registered() {
            Ok(()) => RegistrationStatus::Registered,
            Err(StateError::NotRegistered) => RegistrationStatus::Authorized,
            Err(StateError::HubNotAuthorized) => RegistrationStatus::Staked,
            Err(_) => RegistrationStatus::Unstaked,
        }
    }

    /// Folds `events` into the state, drains the balances when an event
    /// asked for it, then registers when needed. Returns the ids of the
    /// transactions sent.
    ///
    /// The events count as scanned once folded, a withdrawal that failed
    /// halfway is picked up again by the next call.
    #[tracing::instrument(skip(self, events), fields(events = events.len()))]
    pub async fn handle_chain_events(
        &mut self,
        events: &[LoggedEvent],
        current_block: u64,
        force_registration: bool,
    ) -> Result<Vec<H256>> {
        let relay_hub = self.tx_manager.chain().relay_hub();
        let mut sent = Vec::new();
        for logged in events {
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Registration,
                block_number = logged.block_number,
                event = ?logged.event,
            );
            match &logged.event {
                HubEvent::StakeAdded { owner, .. } => {
                    self.state.owner = Some(*owner);
                    self.state.stake = None;
                    self.state.withdrawing = false;
                }
                HubEvent::StakeUnlocked { owner, .. } => {
                    self.state.owner = Some(*owner);
                    self.state.stake = None;
                    self.withdrawal_due(false);
                }
                HubEvent::StakeWithdrawn { owner, .. } => {
                    self.state.owner = Some(*owner);
                    self.state.stake = None;
                    self.withdrawal_due(true);
                }
                HubEvent::HubAuthorized { relay_hub: hub }
                    if *hub == relay_hub =>
                {
                    self.state.hub_authorized = None;
                    self.state.withdrawing = false;
                }
                HubEvent::HubUnauthorized { relay_hub: hub, .. }
                    if *hub == relay_hub =>
                {
                    self.state.hub_authorized = None;
                    self.withdrawal_due(false);
                }
                HubEvent::RelayServerRegistered {
                    base_relay_fee,
                    pct_relay_fee,
                    relay_url,
                } => {
                    self.state.last_registration = Some(ServerRegistration {
                        base_relay_fee: *base_relay_fee,
                        pct_relay_fee: *pct_relay_fee,
                        url: relay_url.clone(),
                        block_number: logged.block_number,
                    });
                }
                HubEvent::RelayWorkersAdded {
                    new_relay_workers, ..
                } => {
                    self.state
                        .added_workers
                        .extend(new_relay_workers.iter().copied());
                }
                HubEvent::HubAuthorized { .. }
                | HubEvent::HubUnauthorized { .. } => {}
            }
        }
        self.state.last_scanned_block = Some(current_block);

        if let Some(include_manager_balance) = self.state.withdrawal_due {
            sent.extend(
                self.withdraw_all_funds(include_manager_balance, current_block)
                    .await?,
            );
            self.state.withdrawal_due = None;
        }
        self.refresh().await?;

        self.state.registration_pending = self.is_registration_pending()?;
        if !self.state.withdrawing
            && (force_registration
                || (!self.is_registration_current()
                    && !self.state.registration_pending))
        {
            sent.extend(self.attempt_registration(current_block).await?);
            self.state.registration_pending = self.is_registration_pending()?;
        }
        Ok(sent)
    }

    /// Adds the workers and registers the server, if the stake, the hub
    /// authorization and the manager balance allow it.
    #[tracing::instrument(skip(self))]
    pub async fn attempt_registration(
        &mut self,
        current_block: u64,
    ) -> Result<Vec<H256>> {
        if let Err(reason) = self.check_stake_and_authorization() {
            tracing::debug!(%reason, "not registering");
            return Ok(Vec::new());
        }
        let balance = self.tx_manager.chain().balance(self.manager).await?;
        let required = self.config.min_manager_balance.wei();
        if balance < required {
            tracing::debug!(%balance, %required, "manager balance too low to register");
            return Ok(Vec::new());
        }

        let relay_hub = self.tx_manager.chain().relay_hub();
        let mut sent = Vec::new();
        if !self.workers_added()
            && !self
                .tx_manager
                .is_action_pending(Identity::Manager, ServerAction::AddWorker)?
        {
            let details = SendTransactionDetails::builder()
                .identity(Identity::Manager)
                .action(ServerAction::AddWorker)
                .to(relay_hub)
                .data(calls::add_relay_workers(self.worker_addresses()))
                .creation_block(current_block)
                .build();
            sent.push(self.send(details).await?);
        }
        if !self
            .tx_manager
            .is_action_pending(Identity::Manager, ServerAction::RegisterServer)?
        {
            let details = SendTransactionDetails::builder()
                .identity(Identity::Manager)
                .action(ServerAction::RegisterServer)
                .to(relay_hub)
                .data(calls::register_relay_server(
                    self.config.base_relay_fee.wei(),
                    U256::from(self.config.pct_relay_fee),
                    &self.config.url,
                ))
                .creation_block(current_block)
                .build();
            sent.push(self.send(details).await?);
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Registration,
            url = %self.config.url,
            registering = true,
            txs = sent.len(),
        );
        Ok(sent)
    }

    /// Sends the manager hub balance and every worker balance to the owner,
    /// and the manager balance too when `include_manager_balance` is set.
    ///
    /// Legs with a transfer still in flight are skipped. A failing leg does
    /// not stop the others, the first failure is returned once all of them
    /// were tried.
    #[tracing::instrument(skip(self))]
    pub async fn withdraw_all_funds(
        &mut self,
        include_manager_balance: bool,
        current_block: u64,
    ) -> Result<Vec<H256>> {
        let Some(owner) = self.owner().await? else {
            tracing::warn!("stake owner unknown, nothing withdrawn");
            return Ok(Vec::new());
        };
        let chain = self.tx_manager.chain().clone();
        let relay_hub = chain.relay_hub();
        let gas_price = chain.gas_price().await?;
        let mut sent = Vec::new();
        let mut first_error = None;

        let hub_balance = chain.hub_balance_of(self.manager).await?;
        let data = calls::hub_withdraw(hub_balance, owner);
        let call = CallRequest {
            from: self.manager,
            to: relay_hub,
            data: data.clone(),
            ..Default::default()
        };
        let gas_limit = chain.estimate_gas(&call).await.unwrap_or_else(|_| {
            U256::from(self.tx_manager.config().default_gas_limit)
        });
        if self.worth_moving(Identity::Manager, "hub", hub_balance, gas_limit * gas_price)
            && !self
                .tx_manager
                .is_action_pending(Identity::Manager, ServerAction::HubWithdraw)?
        {
            let details = SendTransactionDetails::builder()
                .identity(Identity::Manager)
                .action(ServerAction::HubWithdraw)
                .to(relay_hub)
                .data(data)
                .gas_limit(gas_limit)
                .gas_price(gas_price)
                .creation_block(current_block)
                .build();
            match self.send(details).await {
                Ok(id) => sent.push(id),
                Err(e) => {
                    tracing::warn!(error = %e, "hub balance withdrawal failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        let mut legs = self.workers.clone();
        if include_manager_balance {
            legs.push((Identity::Manager, self.manager));
        }
        let transfer_cost = gas_price * VALUE_TRANSFER_GAS;
        for (identity, address) in legs {
            if self.is_transfer_pending(address, owner)? {
                tracing::debug!(%identity, "transfer to the owner in flight");
                continue;
            }
            let balance = chain.balance(address).await?;
            if !self.worth_moving(identity, "native", balance, transfer_cost)
            {
                continue;
            }
            let details = SendTransactionDetails::builder()
                .identity(identity)
                .action(ServerAction::ValueTransfer)
                .to(owner)
                .value(balance - transfer_cost)
                .gas_limit(U256::from(VALUE_TRANSFER_GAS))
                .gas_price(gas_price)
                .creation_block(current_block)
                .build();
            match self.send(details).await {
                Ok(id) => sent.push(id),
                Err(e) => {
                    tracing::warn!(%identity, error = %e, "withdrawal failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Registration,
            ?owner,
            withdrawing = true,
            include_manager_balance,
            txs = sent.len(),
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }

    /// The first unmet precondition of a registered relay server, if any.
    pub fn assert_registered(&self) -> std::result::Result<(), StateError> {
        self.check_stake_and_authorization()?;
        if self.is_registration_current() || self.state.registration_pending {
            Ok(())
        } else {
            Err(StateError::NotRegistered)
        }
    }

    fn check_stake_and_authorization(
        &self,
    ) -> std::result::Result<(), StateError> {
        let stake = match &self.state.stake {
            Some(stake) if !stake.stake.is_zero() => stake,
            _ => return Err(StateError::NotStaked),
        };
        let required = self.config.min_stake.wei();
        if stake.stake < required {
            return Err(StateError::StakeTooLow {
                current: stake.stake,
                required,
            });
        }
        let required = U256::from(self.config.min_unstake_delay);
        if stake.unstake_delay < required {
            return Err(StateError::UnstakeDelayTooLow {
                current: stake.unstake_delay,
                required,
            });
        }
        if !stake.is_locked() {
            return Err(StateError::StakeNotLocked);
        }
        if self.state.hub_authorized != Some(true) {
            return Err(StateError::HubNotAuthorized);
        }
        Ok(())
    }

    /// The last registration on chain carries the configured fees and url.
    fn is_registration_current(&self) -> bool {
        self.state.last_registration.as_ref().is_some_and(|r| {
            r.base_relay_fee == self.config.base_relay_fee.wei()
                && r.pct_relay_fee == U256::from(self.config.pct_relay_fee)
                && r.url == self.config.url
        })
    }

    fn withdrawal_due(&mut self, include_manager_balance: bool) {
        self.state.withdrawing = true;
        let due = self.state.withdrawal_due.unwrap_or_default();
        self.state.withdrawal_due = Some(due || include_manager_balance);
    }

    /// Sends a transaction. One that got persisted but not broadcast counts
    /// as sent, the resend path broadcasts it again.
    async fn send(&self, details: SendTransactionDetails) -> Result<H256> {
        match self.tx_manager.send_transaction(details).await {
            Ok(signed) => Ok(signed.tx_hash),
            Err(Error::Broadcast {
                identity,
                nonce,
                tx_hash,
                reason,
            }) => {
                tracing::warn!(
                    %identity,
                    nonce,
                    ?tx_hash,
                    %reason,
                    "stored but not broadcast, left to the resend path",
                );
                Ok(tx_hash)
            }
            Err(e) => Err(e),
        }
    }

    /// An unmined value transfer from `from` to `to` is stored.
    fn is_transfer_pending(&self, from: Address, to: Address) -> Result<bool> {
        let pending = self
            .tx_manager
            .store()
            .get_all_for_signer(from)?
            .iter()
            .any(|tx| {
                tx.action == ServerAction::ValueTransfer
                    && tx.to == to
                    && !tx.is_mined()
            });
        Ok(pending)
    }

    fn is_registration_pending(&self) -> Result<bool> {
        self.tx_manager
            .is_action_pending(Identity::Manager, ServerAction::RegisterServer)
    }

    fn workers_added(&self) -> bool {
        self.workers
            .iter()
            .all(|(_, address)| self.state.added_workers.contains(address))
    }

    fn worth_moving(
        &self,
        identity: Identity,
        leg: &str,
        balance: U256,
        cost: U256,
    ) -> bool {
        if balance > cost {
            return true;
        }
        tracing::info!(
            %identity,
            leg,
            %balance,
            %cost,
            "balance does not cover the gas cost, skipping withdrawal",
        );
        false
    }

    async fn owner(&mut self) -> Result<Option<Address>> {
        if self.state.owner.is_none() {
            self.refresh().await?;
        }
        Ok(self.state.owner)
    }

    /// Reads back whatever was invalidated.
    async fn refresh(&mut self) -> Result<()> {
        let chain = self.tx_manager.chain();
        if self.state.stake.is_none() {
            let stake = chain.stake_info(self.manager).await?;
            if !stake.owner.is_zero() {
                self.state.owner = Some(stake.owner);
            }
            self.state.stake = Some(stake);
        }
        if self.state.hub_authorized.is_none() {
            let authorized = chain.is_hub_authorized(self.manager).await?;
            self.state.hub_authorized = Some(authorized);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hub_relayer_chain::mocked::{MockedChain, MockedKeyManager};
    use hub_relayer_config::relay::TxManagerConfig;
    use hub_relayer_store::InMemoryStore;
    use hub_relayer_utils::metric::Metrics;

    use super::*;

    type Manager =
        RegistrationManager<InMemoryStore, MockedChain, MockedKeyManager>;

    const ETHER: u64 = 1_000_000_000_000_000_000;
    const HUB: Address = Address::repeat_byte(0xaa);
    const OWNER: Address = Address::repeat_byte(0x0e);

    struct Setup {
        chain: Arc<MockedChain>,
        keys: Arc<MockedKeyManager>,
        store: Arc<InMemoryStore>,
        registration: Manager,
    }

    fn setup() -> Setup {
        let chain = Arc::new(MockedChain::new(HUB));
        let keys =
            Arc::new(MockedKeyManager::random(chain.chain_id_value(), 2));
        let store = Arc::new(InMemoryStore::default());
        let tx_manager = Arc::new(TransactionManager::new(
            store.clone(),
            chain.clone(),
            keys.clone(),
            TxManagerConfig::default(),
            Arc::new(Metrics::new().unwrap()),
        ));
        let registration = RegistrationManager::new(
            tx_manager,
            RegistrationConfig::default(),
        )
        .unwrap();
        chain.set_balance(registration.manager_address(), U256::from(ETHER));
        Setup {
            chain,
            keys,
            store,
            registration,
        }
    }

    fn stake(amount: u64, unstake_delay: u64) -> StakeInfo {
        StakeInfo {
            stake: U256::from(amount),
            unstake_delay: U256::from(unstake_delay),
            withdraw_block: U256::zero(),
            owner: OWNER,
        }
    }

    fn actions(store: &InMemoryStore) -> Vec<ServerAction> {
        store
            .get_all()
            .unwrap()
            .into_iter()
            .map(|tx| tx.action)
            .collect()
    }

    #[tokio::test]
    async fn unstaked_manager_sends_nothing() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let sent = registration.handle_chain_events(&[], 10, false).await.unwrap();
        assert!(sent.is_empty());
        assert!(store.get_all().unwrap().is_empty());
        assert!(chain.sent_transactions().is_empty());
        assert_eq!(registration.assert_registered(), Err(StateError::NotStaked));
        assert_eq!(registration.status(), RegistrationStatus::Unstaked);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn registers_once_when_preconditions_are_met() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        chain.set_stake_info(manager, stake(ETHER, 1_000));
        chain.set_hub_authorized(manager, true);

        let sent = registration.handle_chain_events(&[], 10, false).await.unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            actions(&store),
            vec![ServerAction::AddWorker, ServerAction::RegisterServer]
        );
        assert_eq!(registration.assert_registered(), Ok(()));
        assert_eq!(registration.status(), RegistrationStatus::Registered);

        // Nothing more while the registration is in flight.
        let sent = registration.handle_chain_events(&[], 11, false).await.unwrap();
        assert!(sent.is_empty());
        assert_eq!(store.get_all().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn preconditions_are_reported_in_order() {
        let Setup {
            chain,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        chain.set_stake_info(manager, stake(ETHER / 2, 10));
        registration.handle_chain_events(&[], 10, false).await.unwrap();
        assert!(matches!(
            registration.assert_registered(),
            Err(StateError::StakeTooLow { .. })
        ));

        let added = LoggedEvent {
            block_number: 11,
            log_index: 0,
            event: HubEvent::StakeAdded {
                owner: OWNER,
                stake: U256::from(ETHER),
                unstake_delay: U256::from(10),
            },
        };
        chain.set_stake_info(manager, stake(ETHER, 10));
        registration
            .handle_chain_events(&[added], 11, false)
            .await
            .unwrap();
        assert_eq!(
            registration.assert_registered(),
            Err(StateError::UnstakeDelayTooLow {
                current: U256::from(10),
                required: U256::from(1_000),
            })
        );

        let mut unlocked = stake(ETHER, 1_000);
        unlocked.withdraw_block = U256::from(2_000);
        chain.set_stake_info(manager, unlocked);
        let added = LoggedEvent {
            block_number: 12,
            log_index: 0,
            event: HubEvent::StakeAdded {
                owner: OWNER,
                stake: U256::zero(),
                unstake_delay: U256::from(1_000),
            },
        };
        registration
            .handle_chain_events(&[added], 12, false)
            .await
            .unwrap();
        assert_eq!(
            registration.assert_registered(),
            Err(StateError::StakeNotLocked)
        );

        chain.set_stake_info(manager, stake(ETHER, 1_000));
        let added = LoggedEvent {
            block_number: 13,
            log_index: 0,
            event: HubEvent::StakeAdded {
                owner: OWNER,
                stake: U256::zero(),
                unstake_delay: U256::from(1_000),
            },
        };
        registration
            .handle_chain_events(&[added], 13, false)
            .await
            .unwrap();
        assert_eq!(
            registration.assert_registered(),
            Err(StateError::HubNotAuthorized)
        );
        assert_eq!(registration.status(), RegistrationStatus::Staked);
    }

    #[tokio::test]
    async fn matching_registration_on_chain_is_kept() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        chain.set_stake_info(manager, stake(ETHER, 1_000));
        chain.set_hub_authorized(manager, true);
        let config = registration.config().clone();
        let events = [
            LoggedEvent {
                block_number: 5,
                log_index: 0,
                event: HubEvent::RelayWorkersAdded {
                    new_relay_workers: registration.worker_addresses(),
                    workers_count: U256::from(2),
                },
            },
            LoggedEvent {
                block_number: 5,
                log_index: 1,
                event: HubEvent::RelayServerRegistered {
                    base_relay_fee: config.base_relay_fee.wei(),
                    pct_relay_fee: U256::from(config.pct_relay_fee),
                    relay_url: config.url.clone(),
                },
            },
        ];
        let sent = registration
            .handle_chain_events(&events, 10, false)
            .await
            .unwrap();
        assert!(sent.is_empty());
        assert!(store.get_all().unwrap().is_empty());
        assert_eq!(registration.assert_registered(), Ok(()));

        // A changed url on chain means registering again, workers are known.
        let moved = LoggedEvent {
            block_number: 11,
            log_index: 0,
            event: HubEvent::RelayServerRegistered {
                base_relay_fee: config.base_relay_fee.wei(),
                pct_relay_fee: U256::from(config.pct_relay_fee),
                relay_url: String::from("https://elsewhere.example.org"),
            },
        };
        let sent = registration
            .handle_chain_events(&[moved], 12, false)
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(actions(&store), vec![ServerAction::RegisterServer]);
    }

    #[tokio::test]
    async fn forced_registration_resends() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        chain.set_stake_info(manager, stake(ETHER, 1_000));
        chain.set_hub_authorized(manager, true);
        registration.handle_chain_events(&[], 10, false).await.unwrap();
        chain.set_block_number(20);
        chain.mine_pending();
        // reconcile would stamp them, do it by hand
        for mut tx in store.get_all().unwrap() {
            tx.mined_block = Some(20);
            store.put(&tx, true).unwrap();
        }

        let sent = registration.handle_chain_events(&[], 21, true).await.unwrap();
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test]
    async fn low_manager_balance_blocks_registration() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        chain.set_stake_info(manager, stake(ETHER, 1_000));
        chain.set_hub_authorized(manager, true);
        chain.set_balance(manager, U256::from(ETHER / 100));
        let sent = registration.handle_chain_events(&[], 10, false).await.unwrap();
        assert!(sent.is_empty());
        assert!(store.get_all().unwrap().is_empty());
        assert_eq!(registration.status(), RegistrationStatus::Authorized);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn unlocked_stake_withdraws_everything_but_the_manager_balance() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        let workers = registration.worker_addresses();
        chain.set_hub_balance(manager, U256::from(ETHER));
        chain.set_balance(workers[0], U256::from(ETHER / 2));
        // Below 21000 gas at 1 gwei.
        chain.set_balance(workers[1], U256::from(1_000u64));

        let unlocked = LoggedEvent {
            block_number: 10,
            log_index: 0,
            event: HubEvent::StakeUnlocked {
                owner: OWNER,
                withdraw_block: U256::from(1_010),
            },
        };
        registration
            .handle_chain_events(&[unlocked], 10, false)
            .await
            .unwrap();
        assert_eq!(registration.status(), RegistrationStatus::Withdrawing);
        let mut stored = actions(&store);
        stored.sort_by_key(ToString::to_string);
        assert_eq!(
            stored,
            vec![ServerAction::HubWithdraw, ServerAction::ValueTransfer]
        );
        let transfers: Vec<_> = chain
            .sent_transactions()
            .into_iter()
            .filter(|tx| tx.to == Some(OWNER))
            .collect();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].from, workers[0]);
        assert_eq!(
            transfers[0].value,
            U256::from(ETHER / 2) - U256::from(21_000u64 * 1_000_000_000)
        );
        assert!(logs_contain("skipping withdrawal"));
    }

    #[tokio::test]
    async fn withdrawn_stake_also_drains_the_manager() {
        let Setup {
            chain,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        let withdrawn = LoggedEvent {
            block_number: 10,
            log_index: 0,
            event: HubEvent::StakeWithdrawn {
                owner: OWNER,
                amount: U256::from(ETHER),
            },
        };
        let sent = registration
            .handle_chain_events(&[withdrawn], 10, false)
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        let from_manager = chain.sent_by(manager);
        assert_eq!(from_manager.len(), 1);
        assert_eq!(from_manager[0].to, Some(OWNER));
    }

    #[tokio::test]
    async fn events_of_other_hubs_are_ignored() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let unauthorized = LoggedEvent {
            block_number: 10,
            log_index: 0,
            event: HubEvent::HubUnauthorized {
                relay_hub: Address::repeat_byte(0xbb),
                removal_block: U256::from(20),
            },
        };
        registration
            .handle_chain_events(&[unauthorized], 10, false)
            .await
            .unwrap();
        assert!(!registration.state().withdrawing);
        assert!(store.get_all().unwrap().is_empty());
        assert!(chain.sent_transactions().is_empty());
    }

    fn unlocked_at(block_number: u64) -> LoggedEvent {
        LoggedEvent {
            block_number,
            log_index: 0,
            event: HubEvent::StakeUnlocked {
                owner: OWNER,
                withdraw_block: U256::from(block_number + 1_000),
            },
        }
    }

    #[tokio::test]
    async fn own_hub_unauthorized_drains_all_but_the_manager() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        let workers = registration.worker_addresses();
        chain.set_stake_info(manager, stake(ETHER, 1_000));
        chain.set_hub_authorized(manager, true);
        registration.handle_chain_events(&[], 10, false).await.unwrap();
        assert_eq!(registration.assert_registered(), Ok(()));

        chain.set_hub_authorized(manager, false);
        chain.set_hub_balance(manager, U256::from(ETHER));
        chain.set_balance(workers[0], U256::from(ETHER));
        chain.set_balance(workers[1], U256::from(ETHER));
        let unauthorized = LoggedEvent {
            block_number: 11,
            log_index: 0,
            event: HubEvent::HubUnauthorized {
                relay_hub: HUB,
                removal_block: U256::from(20),
            },
        };
        registration
            .handle_chain_events(&[unauthorized], 11, false)
            .await
            .unwrap();
        assert_eq!(registration.status(), RegistrationStatus::Withdrawing);
        assert_eq!(
            registration.assert_registered(),
            Err(StateError::HubNotAuthorized)
        );

        let stored = store.get_all().unwrap();
        let hub_withdrawals = stored
            .iter()
            .filter(|tx| tx.action == ServerAction::HubWithdraw)
            .count();
        assert_eq!(hub_withdrawals, 1);
        let mut drained: Vec<_> = stored
            .iter()
            .filter(|tx| tx.action == ServerAction::ValueTransfer)
            .map(|tx| tx.from)
            .collect();
        drained.sort();
        let mut expected = workers.clone();
        expected.sort();
        assert_eq!(drained, expected);
        assert!(chain
            .sent_by(manager)
            .iter()
            .all(|tx| tx.to != Some(OWNER)));
    }

    #[tokio::test]
    async fn refolding_after_a_failed_leg_does_not_transfer_twice() {
        let Setup {
            chain,
            keys,
            mut registration,
            ..
        } = setup();
        let workers = registration.worker_addresses();
        chain.set_balance(workers[0], U256::from(ETHER));
        chain.set_balance(workers[1], U256::from(ETHER));
        keys.fail_signing_for(Identity::Worker(1));

        let events = [unlocked_at(10)];
        let err = registration
            .handle_chain_events(&events, 10, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SigningUnavailable { .. }));
        assert_eq!(registration.state().last_scanned_block, Some(10));
        assert_eq!(registration.state().withdrawal_due, Some(false));
        assert_eq!(chain.sent_by(workers[0]).len(), 1);
        assert!(chain.sent_by(workers[1]).is_empty());

        keys.restore_signing_for(Identity::Worker(1));
        registration
            .handle_chain_events(&events, 10, false)
            .await
            .unwrap();
        assert_eq!(chain.sent_by(workers[0]).len(), 1);
        assert_eq!(chain.sent_by(workers[1]).len(), 1);
        assert_eq!(registration.state().withdrawal_due, None);

        // Nothing left to drain on the next tick.
        let sent = registration.handle_chain_events(&[], 11, false).await.unwrap();
        assert!(sent.is_empty());
        assert_eq!(chain.sent_by(workers[0]).len(), 1);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn failed_broadcast_does_not_stop_the_withdrawal() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        let workers = registration.worker_addresses();
        chain.set_hub_balance(manager, U256::from(ETHER));
        chain.set_balance(workers[0], U256::from(ETHER));
        chain.set_balance(workers[1], U256::from(ETHER));
        chain.fail_broadcast(true);

        let sent = registration
            .handle_chain_events(&[unlocked_at(10)], 10, false)
            .await
            .unwrap();
        assert_eq!(sent.len(), 3);
        let stored = store.get_all().unwrap();
        assert_eq!(stored.len(), 3);
        let mut ids: Vec<_> = stored.iter().map(|tx| tx.id).collect();
        let mut sent = sent;
        ids.sort();
        sent.sort();
        assert_eq!(ids, sent);
        assert_eq!(registration.state().withdrawal_due, None);
        assert!(logs_contain("left to the resend path"));
    }

    #[tokio::test]
    async fn failed_broadcast_keeps_the_registration_pending() {
        let Setup {
            chain,
            store,
            mut registration,
            ..
        } = setup();
        let manager = registration.manager_address();
        chain.set_stake_info(manager, stake(ETHER, 1_000));
        chain.set_hub_authorized(manager, true);
        chain.fail_broadcast(true);

        let sent = registration.handle_chain_events(&[], 10, false).await.unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            actions(&store),
            vec![ServerAction::AddWorker, ServerAction::RegisterServer]
        );
        assert!(chain.sent_transactions().is_empty());
        assert_eq!(registration.assert_registered(), Ok(()));
    }
}
