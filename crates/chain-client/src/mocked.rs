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

use std::collections::{BTreeMap, HashMap, HashSet};

use ethers::signers::LocalWallet;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::rlp::Rlp;
use hub_relayer_types::{
    HubEvent, Identity, LoggedEvent, PaymasterGasLimits, StakeInfo,
};
use hub_relayer_utils::{Error, Result};
use parking_lot::Mutex;

use crate::{calls, BlockTag, CallRequest, ChainClient, KeyManager, LocalKeyManager};

/// A transaction accepted by [`MockedChain::send_raw_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub gas_price: U256,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Debug)]
struct MockedState {
    chain_id: u64,
    block_number: u64,
    gas_price: Option<U256>,
    estimate: Option<U256>,
    balances: HashMap<Address, U256>,
    hub_balances: HashMap<Address, U256>,
    // block -> transaction count, per address
    mined_nonces: HashMap<Address, BTreeMap<u64, u64>>,
    pending_nonces: HashMap<Address, u64>,
    sent: Vec<SentTransaction>,
    fail_broadcast: bool,
    events: Vec<(Address, LoggedEvent)>,
    stake_infos: HashMap<Address, StakeInfo>,
    authorized: HashSet<Address>,
    paymaster_limits: HashMap<Address, PaymasterGasLimits>,
    call_result: Bytes,
    calls: Vec<CallRequest>,
    hub_code: Bytes,
    hub_version: String,
    hub_gas_overhead: U256,
}

impl MockedState {
    fn mined_nonce(&self, address: Address, at: Option<u64>) -> u64 {
        let Some(history) = self.mined_nonces.get(&address) else {
            return 0;
        };
        let entry = match at {
            Some(block) => history.range(..=block).next_back(),
            None => history.iter().next_back(),
        };
        entry.map(|(_, n)| *n).unwrap_or_default()
    }
}

/// An in-memory ledger.
///
/// Broadcast transactions are decoded and stay pending until
/// [`MockedChain::mine_pending`] or [`MockedChain::set_nonce`] is called.
#[derive(Debug)]
pub struct MockedChain {
    relay_hub: Address,
    state: Mutex<MockedState>,
}

impl MockedChain {
    pub fn new(relay_hub: Address) -> Self {
        let state = MockedState {
            chain_id: 1337,
            block_number: 1,
            gas_price: Some(U256::from(1_000_000_000u64)),
            estimate: Some(U256::from(100_000)),
            balances: HashMap::new(),
            hub_balances: HashMap::new(),
            mined_nonces: HashMap::new(),
            pending_nonces: HashMap::new(),
            sent: Vec::new(),
            fail_broadcast: false,
            events: Vec::new(),
            stake_infos: HashMap::new(),
            authorized: HashSet::new(),
            paymaster_limits: HashMap::new(),
            call_result: calls::encode_relay_call_result(true, &[]),
            calls: Vec::new(),
            hub_code: Bytes::from(vec![0x60, 0x80, 0x60, 0x40]),
            hub_version: String::from("2.2.0+opengsn.hub.irelayhub"),
            hub_gas_overhead: U256::from(35_965),
        };
        Self {
            relay_hub,
            state: Mutex::new(state),
        }
    }

    pub fn chain_id_value(&self) -> u64 {
        self.state.lock().chain_id
    }

    pub fn current_block(&self) -> u64 {
        self.state.lock().block_number
    }

    pub fn set_block_number(&self, block: u64) {
        self.state.lock().block_number = block;
    }

    /// Moves the chain `blocks` ahead, returning the new height.
    pub fn advance_blocks(&self, blocks: u64) -> u64 {
        let mut state = self.state.lock();
        state.block_number += blocks;
        state.block_number
    }

    /// `None` makes gas price queries fail.
    pub fn set_gas_price(&self, gas_price: Option<U256>) {
        self.state.lock().gas_price = gas_price;
    }

    /// `None` makes gas estimation fail.
    pub fn set_estimate(&self, estimate: Option<U256>) {
        self.state.lock().estimate = estimate;
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    pub fn set_hub_balance(&self, address: Address, balance: U256) {
        self.state.lock().hub_balances.insert(address, balance);
    }

    /// Marks `count` transactions of `address` as mined at the current block.
    pub fn set_nonce(&self, address: Address, count: u64) {
        let mut state = self.state.lock();
        let block = state.block_number;
        state
            .mined_nonces
            .entry(address)
            .or_default()
            .insert(block, count);
        let pending = state.pending_nonces.entry(address).or_default();
        *pending = (*pending).max(count);
    }

    /// Only the mempool knows about `count` transactions of `address`.
    pub fn set_pending_nonce(&self, address: Address, count: u64) {
        self.state.lock().pending_nonces.insert(address, count);
    }

    /// Mines every pending transaction at the current block.
    pub fn mine_pending(&self) {
        let pending: Vec<_> = {
            let state = self.state.lock();
            state
                .pending_nonces
                .iter()
                .filter(|(address, n)| **n > state.mined_nonce(**address, None))
                .map(|(address, n)| (*address, *n))
                .collect()
        };
        for (address, count) in pending {
            self.set_nonce(address, count);
        }
    }

    pub fn sent_transactions(&self) -> Vec<SentTransaction> {
        self.state.lock().sent.clone()
    }

    pub fn sent_by(&self, from: Address) -> Vec<SentTransaction> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|tx| tx.from == from)
            .cloned()
            .collect()
    }

    pub fn fail_broadcast(&self, fail: bool) {
        self.state.lock().fail_broadcast = fail;
    }

    /// Emits `event` for `manager` in the current block.
    pub fn push_event(&self, manager: Address, event: HubEvent) {
        let mut state = self.state.lock();
        let block_number = state.block_number;
        let log_index = state
            .events
            .iter()
            .filter(|(_, e)| e.block_number == block_number)
            .count() as u64;
        state.events.push((
            manager,
            LoggedEvent {
                block_number,
                log_index,
                event,
            },
        ));
    }

    pub fn set_stake_info(&self, manager: Address, info: StakeInfo) {
        self.state.lock().stake_infos.insert(manager, info);
    }

    pub fn set_hub_authorized(&self, manager: Address, authorized: bool) {
        let mut state = self.state.lock();
        if authorized {
            state.authorized.insert(manager);
        } else {
            state.authorized.remove(&manager);
        }
    }

    pub fn set_paymaster_gas_limits(
        &self,
        paymaster: Address,
        limits: PaymasterGasLimits,
    ) {
        self.state.lock().paymaster_limits.insert(paymaster, limits);
    }

    /// Output of every read-only call.
    pub fn set_call_result(&self, output: Bytes) {
        self.state.lock().call_result = output;
    }

    /// Read-only calls seen so far.
    pub fn calls(&self) -> Vec<CallRequest> {
        self.state.lock().calls.clone()
    }

    pub fn set_hub_code(&self, code: Bytes) {
        self.state.lock().hub_code = code;
    }

    pub fn set_hub_version(&self, version: &str) {
        self.state.lock().hub_version = version.to_owned();
    }

    fn decode(raw: &Bytes) -> Result<SentTransaction> {
        let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(raw))
            .map_err(|_| Error::Generic("invalid signed transaction"))?;
        let from = signature
            .recover(tx.sighash())
            .map_err(|_| Error::Generic("invalid transaction signature"))?;
        Ok(SentTransaction {
            hash: ethers::utils::keccak256(raw).into(),
            from,
            to: tx.to_addr().copied(),
            nonce: tx.nonce().map(U256::as_u64).unwrap_or_default(),
            gas_price: tx.gas_price().unwrap_or_default(),
            value: tx.value().copied().unwrap_or_default(),
            data: tx.data().cloned().unwrap_or_default(),
        })
    }
}

fn unavailable(operation: &'static str) -> Error {
    Error::ChainQuery {
        operation,
        reason: String::from("mocked failure"),
    }
}

#[async_trait::async_trait]
impl ChainClient for MockedChain {
    fn relay_hub(&self) -> Address {
        self.relay_hub
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id_value())
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.current_block())
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        let state = self.state.lock();
        Ok(state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn transaction_count(
        &self,
        address: Address,
        at: BlockTag,
    ) -> Result<u64> {
        let state = self.state.lock();
        let count = match at {
            BlockTag::Latest => state.mined_nonce(address, None),
            BlockTag::Number(block) => state.mined_nonce(address, Some(block)),
            BlockTag::Pending => state
                .pending_nonces
                .get(&address)
                .copied()
                .unwrap_or_default()
                .max(state.mined_nonce(address, None)),
        };
        Ok(count)
    }

    async fn gas_price(&self) -> Result<U256> {
        self.state
            .lock()
            .gas_price
            .ok_or_else(|| unavailable("get_gas_price"))
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> Result<U256> {
        self.state
            .lock()
            .estimate
            .ok_or_else(|| unavailable("estimate_gas"))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let tx = Self::decode(&raw)?;
        let mut state = self.state.lock();
        if state.fail_broadcast {
            return Err(unavailable("send_raw_transaction"));
        }
        let hash = tx.hash;
        let pending = state.pending_nonces.entry(tx.from).or_default();
        *pending = (*pending).max(tx.nonce + 1);
        state.sent.push(tx);
        Ok(hash)
    }

    async fn call(&self, call: &CallRequest) -> Result<Bytes> {
        let mut state = self.state.lock();
        state.calls.push(call.clone());
        Ok(state.call_result.clone())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        let state = self.state.lock();
        if address == self.relay_hub {
            Ok(state.hub_code.clone())
        } else {
            Ok(Bytes::default())
        }
    }

    async fn hub_events(
        &self,
        manager: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LoggedEvent>> {
        let state = self.state.lock();
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|(m, e)| {
                *m == manager
                    && e.block_number >= from_block
                    && e.block_number <= to_block
            })
            .map(|(_, e)| e.clone())
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn stake_info(&self, manager: Address) -> Result<StakeInfo> {
        let state = self.state.lock();
        Ok(state.stake_infos.get(&manager).cloned().unwrap_or_default())
    }

    async fn is_hub_authorized(&self, manager: Address) -> Result<bool> {
        Ok(self.state.lock().authorized.contains(&manager))
    }

    async fn hub_balance_of(&self, account: Address) -> Result<U256> {
        let state = self.state.lock();
        Ok(state.hub_balances.get(&account).copied().unwrap_or_default())
    }

    async fn hub_version(&self) -> Result<String> {
        Ok(self.state.lock().hub_version.clone())
    }

    async fn hub_gas_overhead(&self) -> Result<U256> {
        Ok(self.state.lock().hub_gas_overhead)
    }

    async fn paymaster_gas_limits(
        &self,
        paymaster: Address,
    ) -> Result<PaymasterGasLimits> {
        let state = self.state.lock();
        state
            .paymaster_limits
            .get(&paymaster)
            .cloned()
            .ok_or_else(|| unavailable("get_gas_limits"))
    }
}

/// [`LocalKeyManager`] whose signing can be switched off per identity.
#[derive(Debug)]
pub struct MockedKeyManager {
    inner: LocalKeyManager,
    failing: Mutex<HashSet<Identity>>,
}

impl MockedKeyManager {
    pub fn new(inner: LocalKeyManager) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn random(chain_id: u64, workers: u32) -> Self {
        Self::new(LocalKeyManager::random(chain_id, workers))
    }

    pub fn from_wallets(
        chain_id: u64,
        manager: LocalWallet,
        workers: Vec<LocalWallet>,
    ) -> Self {
        Self::new(LocalKeyManager::new(chain_id, manager, workers))
    }

    pub fn fail_signing_for(&self, identity: Identity) {
        self.failing.lock().insert(identity);
    }

    pub fn restore_signing_for(&self, identity: Identity) {
        self.failing.lock().remove(&identity);
    }
}

#[async_trait::async_trait]
impl KeyManager for MockedKeyManager {
    fn chain_id(&self) -> u64 {
        self.inner.chain_id()
    }

    fn identities(&self) -> Vec<Identity> {
        self.inner.identities()
    }

    fn address(&self, identity: Identity) -> Result<Address> {
        self.inner.address(identity)
    }

    async fn sign_transaction(
        &self,
        identity: Identity,
        tx: &TypedTransaction,
    ) -> Result<Bytes> {
        if self.failing.lock().contains(&identity) {
            return Err(Error::SigningUnavailable {
                identity: identity.to_string(),
                reason: String::from("key store locked"),
            });
        }
        self.inner.sign_transaction(identity, tx).await
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::TransactionRequest;

    use super::*;

    #[tokio::test]
    async fn nonces_follow_broadcast_and_mining() {
        let chain = MockedChain::new(Address::repeat_byte(0xaa));
        let keys = MockedKeyManager::random(chain.chain_id_value(), 1);
        let worker = keys.address(Identity::Worker(0)).unwrap();
        let tx: TypedTransaction = TransactionRequest::new()
            .to(Address::repeat_byte(1))
            .nonce(0)
            .gas(21_000)
            .gas_price(1_000_000_000u64)
            .into();
        let raw = keys.sign_transaction(Identity::Worker(0), &tx).await.unwrap();
        chain.send_raw_transaction(raw).await.unwrap();

        let sent = chain.sent_by(worker);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].nonce, 0);
        assert_eq!(
            chain
                .transaction_count(worker, BlockTag::Pending)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            chain.transaction_count(worker, BlockTag::Latest).await.unwrap(),
            0
        );

        chain.advance_blocks(5);
        chain.mine_pending();
        assert_eq!(
            chain.transaction_count(worker, BlockTag::Latest).await.unwrap(),
            1
        );
        assert_eq!(
            chain
                .transaction_count(worker, BlockTag::Number(2))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn failing_identity_cannot_sign() {
        let keys = MockedKeyManager::random(1337, 1);
        keys.fail_signing_for(Identity::Manager);
        let tx: TypedTransaction = TransactionRequest::new().nonce(0).into();
        let err = keys
            .sign_transaction(Identity::Manager, &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SigningUnavailable { .. }));
        keys.restore_signing_for(Identity::Manager);
        assert!(keys.sign_transaction(Identity::Manager, &tx).await.is_ok());
    }
}
