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

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// The call the client wants to get executed through the forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas: U256,
    pub nonce: U256,
    pub data: Bytes,
    pub valid_until: U256,
}

/// Fee terms and routing of a relayed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayData {
    pub gas_price: U256,
    pub pct_relay_fee: U256,
    pub base_relay_fee: U256,
    pub relay_worker: Address,
    pub paymaster: Address,
    pub forwarder: Address,
    pub paymaster_data: Bytes,
    pub client_id: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub request: ForwardRequest,
    pub relay_data: RelayData,
}

/// Everything that is not signed by the client as part of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMetadata {
    pub approval_data: Bytes,
    pub relay_hub_address: Address,
    /// Highest worker nonce the client accepts for this call.
    pub relay_max_nonce: u64,
    pub signature: Bytes,
}

/// Body of `POST /relay`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTransactionRequest {
    pub relay_request: RelayRequest,
    pub metadata: RelayMetadata,
}

/// Response of `POST /relay`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTransactionResponse {
    /// The signed `relayCall` transaction, RLP encoded.
    pub signed_tx: Bytes,
    pub tx_hash: H256,
    pub nonce: u64,
}

/// Response of `GET /getaddr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub relay_worker_address: Address,
    pub relay_manager_address: Address,
    pub relay_hub_address: Address,
    pub owner_address: Option<Address>,
    pub min_gas_price: U256,
    pub max_acceptance_budget: U256,
    pub chain_id: u64,
    pub ready: bool,
    pub version: String,
}
