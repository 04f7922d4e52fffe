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

#![allow(missing_docs)]

use ethers::types::U256;
use hub_relayer_types::Amount;

const GWEI: u64 = 1_000_000_000;
const ETHER: u64 = 1_000_000_000_000_000_000;

const fn wei(amount: u64) -> Amount {
    Amount(U256([amount, 0, 0, 0]))
}

pub const fn relayer_port() -> u16 {
    8090
}
pub fn expected_hub_version() -> String {
    String::from("2.")
}
pub const fn base_relay_fee() -> Amount {
    wei(0)
}
pub const fn pct_relay_fee() -> u64 {
    70
}
pub const fn min_stake() -> Amount {
    wei(ETHER)
}
pub const fn min_unstake_delay() -> u64 {
    1_000
}
pub const fn min_manager_balance() -> Amount {
    wei(ETHER / 10)
}
pub const fn confirmations() -> u64 {
    12
}
pub const fn pending_transaction_timeout_blocks() -> u64 {
    30
}
pub const fn retry_gas_price_percent() -> u64 {
    120
}
pub const fn max_gas_price() -> Amount {
    wei(100 * GWEI)
}
pub const fn default_gas_limit() -> u64 {
    500_000
}
pub const fn polling_interval_ms() -> u64 {
    10_000
}
pub const fn max_blocks_per_step() -> u64 {
    500
}
pub const fn gas_price_percent() -> u64 {
    100
}
pub const fn min_gas_price() -> Amount {
    wei(GWEI)
}
pub const fn max_acceptance_budget() -> u64 {
    285_252
}
pub const fn gas_reserve() -> u64 {
    100_000
}
pub const fn min_worker_balance() -> Amount {
    wei(ETHER / 10)
}
pub const fn worker_target_balance() -> Amount {
    wei(3 * ETHER / 10)
}
