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

//! # Chain access 🕸️
//!
//! The two collaborators the relay engine needs from the outside world: a
//! [`ChainClient`] reading the ledger and broadcasting signed transactions,
//! and a [`KeyManager`] holding the keys of the signing identities.
//!
//! [`EthersChainClient`] and [`LocalKeyManager`] are the production
//! implementations. The `mocked` module, behind the `mocked` feature, has
//! in-memory ones for tests.
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use hub_relayer_types::{Identity, LoggedEvent, PaymasterGasLimits, StakeInfo};
use hub_relayer_utils::Result;

/// Calldata of the relay hub functions the relayer calls.
pub mod calls;
/// Contract bindings.
pub mod contracts;
mod ethers_client;
mod keys;
/// In-memory ledger and key manager, used in tests.
#[cfg(any(test, feature = "mocked"))]
pub mod mocked;

pub use ethers_client::EthersChainClient;
pub use keys::LocalKeyManager;

/// Block at which account state is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    /// Latest mined block.
    Latest,
    /// Latest block plus the transactions in the mempool.
    Pending,
    /// A given block height.
    Number(u64),
}

/// A call, executed either read-only or to estimate its gas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: Option<U256>,
    pub gas_price: Option<U256>,
}

impl CallRequest {
    /// A legacy transaction request carrying this call.
    pub fn to_typed(&self) -> TypedTransaction {
        let mut tx = TransactionRequest::new()
            .from(self.from)
            .to(self.to)
            .value(self.value)
            .data(self.data.clone());
        if let Some(gas) = self.gas {
            tx = tx.gas(gas);
        }
        if let Some(gas_price) = self.gas_price {
            tx = tx.gas_price(gas_price);
        }
        tx.into()
    }
}

/// Read access to the ledger, plus broadcasting of signed transactions.
///
/// Errors carry the name of the failing operation
/// ([`hub_relayer_utils::Error::ChainQuery`]).
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the relay hub this client talks to.
    fn relay_hub(&self) -> Address;
    async fn chain_id(&self) -> Result<u64>;
    async fn block_number(&self) -> Result<u64>;
    async fn balance(&self, address: Address) -> Result<U256>;
    /// Number of transactions sent from `address`, i.e. its next nonce, at `at`.
    async fn transaction_count(
        &self,
        address: Address,
        at: BlockTag,
    ) -> Result<u64>;
    async fn gas_price(&self) -> Result<U256>;
    async fn estimate_gas(&self, call: &CallRequest) -> Result<U256>;
    /// Broadcasts an RLP encoded signed transaction, returns its hash.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;
    /// Executes `call` read-only against the latest block.
    async fn call(&self, call: &CallRequest) -> Result<Bytes>;
    async fn code_at(&self, address: Address) -> Result<Bytes>;
    /// Relay hub and stake manager events of `manager` within
    /// `from_block..=to_block`, in chain order.
    async fn hub_events(
        &self,
        manager: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LoggedEvent>>;
    async fn stake_info(&self, manager: Address) -> Result<StakeInfo>;
    /// Whether the relay hub may spend the stake of `manager`.
    async fn is_hub_authorized(&self, manager: Address) -> Result<bool>;
    /// Balance of `account` held by the relay hub.
    async fn hub_balance_of(&self, account: Address) -> Result<U256>;
    async fn hub_version(&self) -> Result<String>;
    /// Gas the relay hub spends around the relayed call.
    async fn hub_gas_overhead(&self) -> Result<U256>;
    async fn paymaster_gas_limits(
        &self,
        paymaster: Address,
    ) -> Result<PaymasterGasLimits>;
}

/// Holds the keys of the signing identities.
#[async_trait::async_trait]
pub trait KeyManager: Send + Sync {
    /// Chain id transactions are signed for.
    fn chain_id(&self) -> u64;
    /// Every identity this key manager can sign for.
    fn identities(&self) -> Vec<Identity>;
    /// Address of `identity`.
    fn address(&self, identity: Identity) -> Result<Address>;
    /// Signs `tx` with the key of `identity`, returning the RLP encoded
    /// signed transaction.
    ///
    /// Fails with [`hub_relayer_utils::Error::SigningUnavailable`] when the
    /// key material can not be accessed.
    async fn sign_transaction(
        &self,
        identity: Identity,
        tx: &TypedTransaction,
    ) -> Result<Bytes>;
}
