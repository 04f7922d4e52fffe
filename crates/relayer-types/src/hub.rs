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

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Relay hub and stake manager events concerning one relay manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "PascalCase")]
pub enum HubEvent {
    StakeAdded {
        owner: Address,
        stake: U256,
        unstake_delay: U256,
    },
    StakeUnlocked {
        owner: Address,
        withdraw_block: U256,
    },
    StakeWithdrawn {
        owner: Address,
        amount: U256,
    },
    HubAuthorized {
        relay_hub: Address,
    },
    HubUnauthorized {
        relay_hub: Address,
        removal_block: U256,
    },
    RelayServerRegistered {
        base_relay_fee: U256,
        pct_relay_fee: U256,
        relay_url: String,
    },
    RelayWorkersAdded {
        new_relay_workers: Vec<Address>,
        workers_count: U256,
    },
}

/// A [`HubEvent`] with its position in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub block_number: u64,
    pub log_index: u64,
    pub event: HubEvent,
}

/// Stake of a relay manager, as reported by the stake manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeInfo {
    pub stake: U256,
    /// Blocks between unlocking and withdrawing the stake.
    pub unstake_delay: U256,
    /// Zero while the stake is locked.
    pub withdraw_block: U256,
    pub owner: Address,
}

impl StakeInfo {
    /// The owner did not start unlocking the stake.
    pub fn is_locked(&self) -> bool {
        self.withdraw_block.is_zero()
    }
}

/// Gas limits a paymaster declares for the pre/post relayed call hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymasterGasLimits {
    pub acceptance_budget: U256,
    pub pre_relayed_call_gas_limit: U256,
    pub post_relayed_call_gas_limit: U256,
}
