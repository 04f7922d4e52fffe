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

use crate::Identity;

/// The business operation that produced a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerAction {
    /// `registerRelayServer` on the relay hub.
    RegisterServer,
    /// `addRelayWorkers` on the relay hub.
    AddWorker,
    /// `relayCall` on the relay hub, on behalf of a client.
    RelayCall,
    /// Plain value transfer, e.g. worker top-up or fund withdrawal.
    ValueTransfer,
    /// `withdraw` of the manager's balance held by the relay hub.
    HubWithdraw,
    /// Penalization of a misbehaving relay.
    Penalization,
}

impl std::fmt::Display for ServerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerAction::RegisterServer => "register-server",
            ServerAction::AddWorker => "add-worker",
            ServerAction::RelayCall => "relay-call",
            ServerAction::ValueTransfer => "value-transfer",
            ServerAction::HubWithdraw => "hub-withdraw",
            ServerAction::Penalization => "penalization",
        };
        f.write_str(name)
    }
}

/// A transaction signed by the relayer, as kept in the transaction store.
///
/// At most one record exists per `(from, nonce)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTransaction {
    /// Keccak-256 hash of the signed payload.
    pub id: H256,
    /// The identity that signed it.
    pub identity: Identity,
    /// Address of `identity`.
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub data: Bytes,
    pub nonce: u64,
    /// 1 for the first broadcast, incremented on every replacement.
    pub attempts: u32,
    pub action: ServerAction,
    /// Block at which this version of the transaction was persisted.
    pub creation_block: u64,
    /// First block at which the nonce was seen consumed on chain.
    pub mined_block: Option<u64>,
}

impl StoredTransaction {
    /// Whether the transaction was observed mined.
    pub fn is_mined(&self) -> bool {
        self.mined_block.is_some()
    }

    /// Whether the transaction waited for at least `timeout` blocks since it
    /// was last (re)persisted.
    pub fn is_stuck(&self, current_block: u64, timeout: u64) -> bool {
        !self.is_mined()
            && current_block.saturating_sub(self.creation_block) >= timeout
    }
}
