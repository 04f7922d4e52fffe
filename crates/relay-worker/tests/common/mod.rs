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

#![allow(dead_code)]

use std::sync::Arc;

use ethers::types::{Address, Bytes, U256};
use hub_relayer_chain::mocked::{MockedChain, MockedKeyManager};
use hub_relayer_chain::KeyManager;
use hub_relayer_config::chain::ContractsConfig;
use hub_relayer_config::relay::{
    RegistrationConfig, TxManagerConfig, WorkerConfig,
};
use hub_relayer_registration::RegistrationManager;
use hub_relayer_store::InMemoryStore;
use hub_relayer_tx_manager::TransactionManager;
use hub_relayer_types::relay::{
    ForwardRequest, RelayData, RelayMetadata, RelayRequest,
    RelayTransactionRequest,
};
use hub_relayer_types::{HubEvent, Identity, PaymasterGasLimits, StakeInfo};
use hub_relayer_utils::metric::Metrics;
use hub_relayer_worker::RelayWorker;

pub const ETHER: u64 = 1_000_000_000_000_000_000;
pub const GWEI: u64 = 1_000_000_000;
pub const HUB: Address = Address::repeat_byte(0xaa);
pub const OWNER: Address = Address::repeat_byte(0x0e);
pub const PAYMASTER: Address = Address::repeat_byte(0x9a);
pub const FORWARDER: Address = Address::repeat_byte(0xf0);

pub type Worker = RelayWorker<InMemoryStore, MockedChain, MockedKeyManager>;
pub type TxManager =
    TransactionManager<InMemoryStore, MockedChain, MockedKeyManager>;

pub struct Harness {
    pub chain: Arc<MockedChain>,
    pub keys: Arc<MockedKeyManager>,
    pub store: Arc<InMemoryStore>,
    pub tx_manager: Arc<TxManager>,
    pub worker: Arc<Worker>,
    pub manager_address: Address,
    pub worker_address: Address,
}

/// A funded relay server with one worker, not staked yet.
pub fn harness() -> Harness {
    harness_with(WorkerConfig::default())
}

pub fn harness_with(worker_config: WorkerConfig) -> Harness {
    let chain = Arc::new(MockedChain::new(HUB));
    let keys = Arc::new(MockedKeyManager::random(chain.chain_id_value(), 1));
    let store = Arc::new(InMemoryStore::default());
    let tx_manager = Arc::new(TransactionManager::new(
        store.clone(),
        chain.clone(),
        keys.clone(),
        TxManagerConfig::default(),
        Arc::new(Metrics::new().unwrap()),
    ));
    let registration =
        RegistrationManager::new(tx_manager.clone(), RegistrationConfig::default())
            .unwrap();
    let contracts = ContractsConfig {
        relay_hub: HUB,
        stake_manager: Address::repeat_byte(0x5a),
        deployed_at: 1,
        expected_hub_version: String::from("2."),
    };
    let worker = Arc::new(
        RelayWorker::new(tx_manager.clone(), registration, contracts, worker_config)
            .unwrap(),
    );
    let manager_address = keys.address(Identity::Manager).unwrap();
    let worker_address = keys.address(Identity::Worker(0)).unwrap();
    chain.set_balance(manager_address, U256::from(ETHER));
    chain.set_balance(worker_address, U256::from(ETHER));
    chain.set_paymaster_gas_limits(
        PAYMASTER,
        PaymasterGasLimits {
            acceptance_budget: U256::from(150_000),
            pre_relayed_call_gas_limit: U256::from(100_000),
            post_relayed_call_gas_limit: U256::from(110_000),
        },
    );
    chain.set_hub_balance(PAYMASTER, U256::from(ETHER));
    Harness {
        chain,
        keys,
        store,
        tx_manager,
        worker,
        manager_address,
        worker_address,
    }
}

impl Harness {
    /// Stakes exactly the required amount and authorizes the hub.
    pub fn stake_and_authorize(&self) {
        let config = RegistrationConfig::default();
        self.chain.set_stake_info(
            self.manager_address,
            StakeInfo {
                stake: config.min_stake.wei(),
                unstake_delay: U256::from(config.min_unstake_delay),
                withdraw_block: U256::zero(),
                owner: OWNER,
            },
        );
        self.chain.set_hub_authorized(self.manager_address, true);
    }

    /// Puts a matching registration of the server on chain.
    pub fn register_on_chain(&self) {
        let config = RegistrationConfig::default();
        self.stake_and_authorize();
        self.chain.push_event(
            self.manager_address,
            HubEvent::RelayWorkersAdded {
                new_relay_workers: vec![self.worker_address],
                workers_count: U256::one(),
            },
        );
        self.chain.push_event(
            self.manager_address,
            HubEvent::RelayServerRegistered {
                base_relay_fee: config.base_relay_fee.wei(),
                pct_relay_fee: U256::from(config.pct_relay_fee),
                relay_url: config.url,
            },
        );
    }

    /// Registered on chain and ticked once at `block`.
    pub async fn ready_at(&self, block: u64) {
        self.register_on_chain();
        self.chain.set_block_number(block);
        self.worker.tick(block).await.unwrap();
        assert!(self.worker.snapshot().ready);
    }

    pub fn relay_request(&self, gas_price: U256) -> RelayTransactionRequest {
        let config = RegistrationConfig::default();
        RelayTransactionRequest {
            relay_request: RelayRequest {
                request: ForwardRequest {
                    from: Address::repeat_byte(0xc1),
                    to: Address::repeat_byte(0xc2),
                    value: U256::zero(),
                    gas: U256::from(100_000),
                    nonce: U256::zero(),
                    data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
                    valid_until: U256::zero(),
                },
                relay_data: RelayData {
                    gas_price,
                    pct_relay_fee: U256::from(config.pct_relay_fee),
                    base_relay_fee: config.base_relay_fee.wei(),
                    relay_worker: self.worker_address,
                    paymaster: PAYMASTER,
                    forwarder: FORWARDER,
                    paymaster_data: Bytes::default(),
                    client_id: U256::one(),
                },
            },
            metadata: RelayMetadata {
                approval_data: Bytes::default(),
                relay_hub_address: HUB,
                relay_max_nonce: 10,
                signature: Bytes::from(vec![0x11; 65]),
            },
        }
    }
}
