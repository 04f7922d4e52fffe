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

use std::time::Duration;

use ethers::types::Address;
use hub_relayer_types::Amount;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// What the relay server registers on the hub and what it requires from its
/// stake before doing so.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistrationConfig {
    /// Public url clients reach this server at.
    pub url: String,
    /// Flat fee charged per relayed call.
    #[serde(default = "defaults::base_relay_fee")]
    pub base_relay_fee: Amount,
    /// Fee charged on top of the gas used, in percent.
    #[serde(default = "defaults::pct_relay_fee")]
    pub pct_relay_fee: u64,
    /// Minimum stake before registering.
    #[serde(default = "defaults::min_stake")]
    pub min_stake: Amount,
    /// Minimum unstake delay (in blocks) before registering.
    #[serde(default = "defaults::min_unstake_delay")]
    pub min_unstake_delay: u64,
    /// Minimum manager balance to operate, below it the worker asks for funding.
    #[serde(default = "defaults::min_manager_balance")]
    pub min_manager_balance: Amount,
    /// Send the registration transaction on the first tick even when the
    /// on-chain registration is already up to date.
    #[serde(default)]
    pub force_registration_on_start: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost:8090"),
            base_relay_fee: defaults::base_relay_fee(),
            pct_relay_fee: defaults::pct_relay_fee(),
            min_stake: defaults::min_stake(),
            min_unstake_delay: defaults::min_unstake_delay(),
            min_manager_balance: defaults::min_manager_balance(),
            force_registration_on_start: false,
        }
    }
}

/// Transaction manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TxManagerConfig {
    /// Blocks on top of a transaction before its record gets pruned.
    #[serde(default = "defaults::confirmations")]
    pub confirmations: u64,
    /// Blocks a transaction may stay pending before it gets replaced.
    #[serde(default = "defaults::pending_transaction_timeout_blocks")]
    pub pending_transaction_timeout_blocks: u64,
    /// Gas price of a replacement, in percent of the replaced one.
    #[serde(default = "defaults::retry_gas_price_percent")]
    pub retry_gas_price_percent: u64,
    /// Upper bound for any gas price the relayer signs with.
    #[serde(default = "defaults::max_gas_price")]
    pub max_gas_price: Amount,
    /// Used when estimating the gas of a transaction fails.
    #[serde(default = "defaults::default_gas_limit")]
    pub default_gas_limit: u64,
}

impl Default for TxManagerConfig {
    fn default() -> Self {
        Self {
            confirmations: defaults::confirmations(),
            pending_transaction_timeout_blocks:
                defaults::pending_transaction_timeout_blocks(),
            retry_gas_price_percent: defaults::retry_gas_price_percent(),
            max_gas_price: defaults::max_gas_price(),
            default_gas_limit: defaults::default_gas_limit(),
        }
    }
}

/// Worker loop and relay request policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerConfig {
    /// How often to poll the ledger for a new block.
    #[serde(default = "defaults::polling_interval_ms")]
    pub polling_interval_ms: u64,
    /// Maximum number of blocks covered by one events query.
    #[serde(default = "defaults::max_blocks_per_step")]
    pub max_blocks_per_step: u64,
    /// Gas price quoted to clients, in percent of the network gas price.
    #[serde(default = "defaults::gas_price_percent")]
    pub gas_price_percent: u64,
    /// Floor of the quoted gas price.
    #[serde(default = "defaults::min_gas_price")]
    pub min_gas_price: Amount,
    /// Highest paymaster acceptance budget this server is exposed to.
    #[serde(default = "defaults::max_acceptance_budget")]
    pub max_acceptance_budget: u64,
    /// Paymasters exempt from the fee and acceptance budget checks.
    #[serde(default)]
    pub trusted_paymasters: Vec<Address>,
    /// Gas added on top of the computed maximum of a relayed call.
    #[serde(default = "defaults::gas_reserve")]
    pub gas_reserve: u64,
    /// Worker balance below which the manager tops the worker up.
    #[serde(default = "defaults::min_worker_balance")]
    pub min_worker_balance: Amount,
    /// Worker balance after a top up.
    #[serde(default = "defaults::worker_target_balance")]
    pub worker_target_balance: Amount,
}

impl WorkerConfig {
    /// [`Self::polling_interval_ms`] as a [`Duration`].
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: defaults::polling_interval_ms(),
            max_blocks_per_step: defaults::max_blocks_per_step(),
            gas_price_percent: defaults::gas_price_percent(),
            min_gas_price: defaults::min_gas_price(),
            max_acceptance_budget: defaults::max_acceptance_budget(),
            trusted_paymasters: Vec::new(),
            gas_reserve: defaults::gas_reserve(),
            min_worker_balance: defaults::min_worker_balance(),
            worker_target_balance: defaults::worker_target_balance(),
        }
    }
}
