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

use std::fmt::Display;
use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::{Address, BlockId, BlockNumber, Bytes, H256, U256};
use hub_relayer_types::{HubEvent, LoggedEvent, PaymasterGasLimits, StakeInfo};
use hub_relayer_utils::{Error, Result};

use crate::contracts::paymaster::PaymasterContract;
use crate::contracts::relay_hub::{RelayHubContract, RelayHubContractEvents};
use crate::contracts::stake_manager::{
    StakeManagerContract, StakeManagerContractEvents,
};
use crate::{BlockTag, CallRequest, ChainClient};

/// [`ChainClient`] over any ethers [`Middleware`], usually a
/// `Provider<Http>`.
#[derive(Debug)]
pub struct EthersChainClient<M: Middleware> {
    client: Arc<M>,
    hub: RelayHubContract<M>,
    stake_manager: StakeManagerContract<M>,
    relay_hub: Address,
}

impl<M: Middleware + 'static> EthersChainClient<M> {
    pub fn new(
        client: Arc<M>,
        relay_hub: Address,
        stake_manager: Address,
    ) -> Self {
        Self {
            hub: RelayHubContract::new(relay_hub, client.clone()),
            stake_manager: StakeManagerContract::new(
                stake_manager,
                client.clone(),
            ),
            client,
            relay_hub,
        }
    }
}

fn query_failed<E: Display>(operation: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::ChainQuery {
        operation,
        reason: e.to_string(),
    }
}

fn block_id(at: BlockTag) -> BlockId {
    match at {
        BlockTag::Latest => BlockId::Number(BlockNumber::Latest),
        BlockTag::Pending => BlockId::Number(BlockNumber::Pending),
        BlockTag::Number(n) => BlockId::Number(BlockNumber::Number(n.into())),
    }
}

fn from_hub_event(event: RelayHubContractEvents) -> HubEvent {
    match event {
        RelayHubContractEvents::RelayServerRegisteredFilter(e) => {
            HubEvent::RelayServerRegistered {
                base_relay_fee: e.base_relay_fee,
                pct_relay_fee: e.pct_relay_fee,
                relay_url: e.relay_url,
            }
        }
        RelayHubContractEvents::RelayWorkersAddedFilter(e) => {
            HubEvent::RelayWorkersAdded {
                new_relay_workers: e.new_relay_workers,
                workers_count: e.workers_count,
            }
        }
    }
}

fn from_stake_event(event: StakeManagerContractEvents) -> HubEvent {
    match event {
        StakeManagerContractEvents::StakeAddedFilter(e) => {
            HubEvent::StakeAdded {
                owner: e.owner,
                stake: e.stake,
                unstake_delay: e.unstake_delay,
            }
        }
        StakeManagerContractEvents::StakeUnlockedFilter(e) => {
            HubEvent::StakeUnlocked {
                owner: e.owner,
                withdraw_block: e.withdraw_block,
            }
        }
        StakeManagerContractEvents::StakeWithdrawnFilter(e) => {
            HubEvent::StakeWithdrawn {
                owner: e.owner,
                amount: e.amount,
            }
        }
        StakeManagerContractEvents::HubAuthorizedFilter(e) => {
            HubEvent::HubAuthorized {
                relay_hub: e.relay_hub,
            }
        }
        StakeManagerContractEvents::HubUnauthorizedFilter(e) => {
            HubEvent::HubUnauthorized {
                relay_hub: e.relay_hub,
                removal_block: e.removal_block,
            }
        }
    }
}

#[async_trait::async_trait]
impl<M: Middleware + 'static> ChainClient for EthersChainClient<M> {
    fn relay_hub(&self) -> Address {
        self.relay_hub
    }

    async fn chain_id(&self) -> Result<u64> {
        let id = self
            .client
            .get_chainid()
            .await
            .map_err(query_failed("get_chain_id"))?;
        Ok(id.as_u64())
    }

    async fn block_number(&self) -> Result<u64> {
        let n = self
            .client
            .get_block_number()
            .await
            .map_err(query_failed("get_block_number"))?;
        Ok(n.as_u64())
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.client
            .get_balance(address, None)
            .await
            .map_err(query_failed("get_balance"))
    }

    async fn transaction_count(
        &self,
        address: Address,
        at: BlockTag,
    ) -> Result<u64> {
        let count = self
            .client
            .get_transaction_count(address, Some(block_id(at)))
            .await
            .map_err(query_failed("get_transaction_count"))?;
        Ok(count.as_u64())
    }

    async fn gas_price(&self) -> Result<U256> {
        self.client
            .get_gas_price()
            .await
            .map_err(query_failed("get_gas_price"))
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<U256> {
        self.client
            .estimate_gas(&call.to_typed(), None)
            .await
            .map_err(query_failed("estimate_gas"))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = self
            .client
            .send_raw_transaction(raw)
            .await
            .map_err(query_failed("send_raw_transaction"))?;
        Ok(pending.tx_hash())
    }

    async fn call(&self, call: &CallRequest) -> Result<Bytes> {
        self.client
            .call(&call.to_typed(), None)
            .await
            .map_err(query_failed("call"))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.client
            .get_code(address, None)
            .await
            .map_err(query_failed("get_code"))
    }

    #[tracing::instrument(skip(self))]
    async fn hub_events(
        &self,
        manager: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LoggedEvent>> {
        let topic = H256::from(manager);
        let hub_logs = self
            .hub
            .events()
            .from_block(from_block)
            .to_block(to_block)
            .topic1(topic)
            .query_with_meta()
            .await
            .map_err(query_failed("get_logs"))?;
        let stake_logs = self
            .stake_manager
            .events()
            .from_block(from_block)
            .to_block(to_block)
            .topic1(topic)
            .query_with_meta()
            .await
            .map_err(query_failed("get_logs"))?;

        let mut events: Vec<LoggedEvent> = hub_logs
            .into_iter()
            .map(|(e, meta)| (from_hub_event(e), meta))
            .chain(
                stake_logs
                    .into_iter()
                    .map(|(e, meta)| (from_stake_event(e), meta)),
            )
            .map(|(event, meta)| LoggedEvent {
                block_number: meta.block_number.as_u64(),
                log_index: meta.log_index.as_u64(),
                event,
            })
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        tracing::trace!(count = events.len(), "fetched hub events");
        Ok(events)
    }

    async fn stake_info(&self, manager: Address) -> Result<StakeInfo> {
        let (stake, unstake_delay, withdraw_block, owner) = self
            .stake_manager
            .get_stake_info(manager)
            .call()
            .await
            .map_err(query_failed("get_stake_info"))?;
        Ok(StakeInfo {
            stake,
            unstake_delay,
            withdraw_block,
            owner,
        })
    }

    async fn is_hub_authorized(&self, manager: Address) -> Result<bool> {
        let removal_block = self
            .stake_manager
            .authorized_hubs(manager, self.relay_hub)
            .call()
            .await
            .map_err(query_failed("authorized_hubs"))?;
        // An authorized hub has no scheduled removal.
        Ok(removal_block == U256::MAX)
    }

    async fn hub_balance_of(&self, account: Address) -> Result<U256> {
        self.hub
            .balance_of(account)
            .call()
            .await
            .map_err(query_failed("balance_of"))
    }

    async fn hub_version(&self) -> Result<String> {
        self.hub
            .version_hub()
            .call()
            .await
            .map_err(query_failed("version_hub"))
    }

    async fn hub_gas_overhead(&self) -> Result<U256> {
        self.hub
            .gas_overhead()
            .call()
            .await
            .map_err(query_failed("gas_overhead"))
    }

    async fn paymaster_gas_limits(
        &self,
        paymaster: Address,
    ) -> Result<PaymasterGasLimits> {
        let contract = PaymasterContract::new(paymaster, self.client.clone());
        let (
            acceptance_budget,
            pre_relayed_call_gas_limit,
            post_relayed_call_gas_limit,
        ) = contract
            .get_gas_limits()
            .call()
            .await
            .map_err(query_failed("get_gas_limits"))?;
        Ok(PaymasterGasLimits {
            acceptance_budget,
            pre_relayed_call_gas_limit,
            post_relayed_call_gas_limit,
        })
    }
}
