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

use ethers::types::U256;
use hub_relayer_types::relay::RelayData;
use hub_relayer_types::PaymasterGasLimits;

/// Intrinsic gas of every transaction.
pub const TX_BASE_GAS: u64 = 21_000;
const ZERO_BYTE_GAS: u64 = 4;
const NON_ZERO_BYTE_GAS: u64 = 16;

/// Gas charged by the network for carrying `data` as calldata.
pub fn calldata_gas_cost(data: &[u8]) -> U256 {
    let gas: u64 = data
        .iter()
        .map(|b| if *b == 0 { ZERO_BYTE_GAS } else { NON_ZERO_BYTE_GAS })
        .sum();
    U256::from(gas)
}

/// What the paymaster pays the relay server for `gas_used` gas.
///
/// `base_relay_fee + gas_used * gas_price * (100 + pct_relay_fee) / 100`,
/// `None` on overflow.
pub fn calculate_charge(
    gas_used: U256,
    relay_data: &RelayData,
) -> Option<U256> {
    let gas_cost = gas_used.checked_mul(relay_data.gas_price)?;
    let pct = relay_data.pct_relay_fee.checked_add(U256::from(100))?;
    let charge = gas_cost.checked_mul(pct)? / 100;
    relay_data.base_relay_fee.checked_add(charge)
}

/// Upper bound of the gas a `relayCall` transaction can consume, also
/// used as its gas limit. `None` on overflow.
pub fn max_possible_gas(
    gas_reserve: u64,
    hub_overhead: U256,
    limits: &PaymasterGasLimits,
    relayed_call_gas: U256,
    relay_call_data: &[u8],
) -> Option<U256> {
    [
        U256::from(gas_reserve),
        hub_overhead,
        limits.pre_relayed_call_gas_limit,
        limits.post_relayed_call_gas_limit,
        relayed_call_gas,
        calldata_gas_cost(relay_call_data),
    ]
    .into_iter()
    .try_fold(U256::from(TX_BASE_GAS), |total, gas| total.checked_add(gas))
}
