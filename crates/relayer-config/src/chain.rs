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

use ethers::types::Address;
use hub_relayer_types::{private_key::PrivateKey, rpc_url::RpcUrl};
use serde::{Deserialize, Serialize};

use crate::defaults;

/// The ledger the relay server operates on.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// Http(s) Endpoint for quick Req/Res
    #[serde(skip_serializing)]
    pub http_endpoint: RpcUrl,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u64,
    /// Block Explorer for this chain.
    ///
    /// Optional, and only used for printing transaction links.
    #[serde(skip_serializing)]
    pub explorer: Option<url::Url>,
}

/// Addresses of the contracts the relay server talks to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContractsConfig {
    /// The relay hub this server registers with and relays through.
    pub relay_hub: Address,
    /// The stake manager holding the manager's stake.
    pub stake_manager: Address,
    /// Block at which the hub got deployed, the first block to scan for events.
    #[serde(default)]
    pub deployed_at: u64,
    /// `versionHub()` of the relay hub must start with this prefix.
    #[serde(default = "defaults::expected_hub_version")]
    pub expected_hub_version: String,
}

/// The keys of the signing identities.
///
/// Keys are written either as a `0x` prefixed hex string or as `$ENV_VAR`
/// holding one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeysConfig {
    /// Key of the relay manager, handling stake and registration.
    pub manager: Option<PrivateKey>,
    /// Keys of the relay workers, in worker index order.
    #[serde(default)]
    pub workers: Vec<PrivateKey>,
    /// Generate random keys for missing ones, useful for local testing only.
    #[serde(default)]
    pub ephemeral: bool,
}
