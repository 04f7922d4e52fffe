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

//! # Transaction Manager 📨
//!
//! The only component of the relayer that signs and broadcasts transactions.
//!
//! Nonces are allocated under one global lock: the next nonce is read,
//! the transaction is signed and persisted, and only then the lock is
//! released and the transaction broadcast. A transaction that failed to
//! broadcast stays in the store and is picked up again by
//! [`TransactionManager::reconcile_confirmed`].

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use hub_relayer_chain::{BlockTag, CallRequest, ChainClient, KeyManager};
use hub_relayer_config::relay::TxManagerConfig;
use hub_relayer_store::TxStore;
use hub_relayer_types::{Identity, ServerAction, StoredTransaction};
use hub_relayer_utils::metric::Metrics;
use hub_relayer_utils::{probe, Error, Result};
use tokio::sync::Mutex;
use typed_builder::TypedBuilder;

/// What to send. Gas limit and gas price are looked up when omitted.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SendTransactionDetails {
    pub identity: Identity,
    pub action: ServerAction,
    pub to: Address,
    #[builder(default)]
    pub value: U256,
    #[builder(default)]
    pub data: Bytes,
    #[builder(default, setter(strip_option))]
    pub gas_limit: Option<U256>,
    #[builder(default, setter(strip_option))]
    pub gas_price: Option<U256>,
    /// Block the transaction is created at, starts the stuck timer.
    pub creation_block: u64,
    /// Highest nonce the caller accepts.
    #[builder(default, setter(strip_option))]
    pub max_nonce: Option<u64>,
}

/// A persisted and signed transaction.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub record: StoredTransaction,
    /// RLP encoded signed transaction.
    pub raw: Bytes,
    pub tx_hash: H256,
}

pub struct TransactionManager<S, C, K> {
    store: Arc<S>,
    chain: Arc<C>,
    keys: Arc<K>,
    config: TxManagerConfig,
    metrics: Arc<Metrics>,
    /// Next nonce per signer address.
    nonces: Mutex<HashMap<Address, u64>>,
}

impl<S, C, K> std::fmt::Debug for TransactionManager<S, C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, C, K> TransactionManager<S, C, K>
where
    S: TxStore,
    C: ChainClient,
    K: KeyManager,
{
    pub fn new(
        store: Arc<S>,
        chain: Arc<C>,
        keys: Arc<K>,
        config: TxManagerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            chain,
            keys,
            config,
            metrics,
            nonces: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    pub fn keys(&self) -> &Arc<K> {
        &self.keys
    }

    pub fn config(&self) -> &TxManagerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Address of a signing identity.
    pub fn address(&self, identity: Identity) -> Result<Address> {
        self.keys.address(identity)
    }

    /// Seeds the nonce counters from the store, so that a crash between
    /// persisting and broadcasting can not lead to a reused nonce.
    #[tracing::instrument(skip_all)]
    pub async fn init(&self) -> Result<()> {
        let mut nonces = self.nonces.lock().await;
        for identity in self.keys.identities() {
            let signer = self.keys.address(identity)?;
            let records = self.store.get_all_for_signer(signer)?;
            if let Some(last) = records.last() {
                let next = nonces.entry(signer).or_default();
                *next = (*next).max(last.nonce + 1);
                tracing::debug!(%identity, next_nonce = *next, "seeded nonce");
            }
        }
        Ok(())
    }

    /// The nonce the next transaction of `identity` would get, without
    /// allocating it.
    pub async fn poll_nonce(&self, identity: Identity) -> Result<u64> {
        let signer = self.keys.address(identity)?;
        let nonces = self.nonces.lock().await;
        let local = nonces.get(&signer).copied().unwrap_or_default();
        let pending = self
            .chain
            .transaction_count(signer, BlockTag::Pending)
            .await?;
        Ok(local.max(pending))
    }

    /// Whether an unmined transaction of `identity` with `action` is stored.
    pub fn is_action_pending(
        &self,
        identity: Identity,
        action: ServerAction,
    ) -> Result<bool> {
        let signer = self.keys.address(identity)?;
        let pending = self
            .store
            .get_all_for_signer(signer)?
            .iter()
            .any(|tx| tx.action == action && !tx.is_mined());
        Ok(pending)
    }

    async fn estimate_gas(
        &self,
        from: Address,
        details: &SendTransactionDetails,
    ) -> U256 {
        let call = CallRequest {
            from,
            to: details.to,
            value: details.value,
            data: details.data.clone(),
            ..Default::default()
        };
        match self.chain.estimate_gas(&call).await {
            Ok(gas) => gas,
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    action = %details.action,
                    "gas estimation failed, using the default gas limit",
                );
                U256::from(self.config.default_gas_limit)
            }
        }
    }

    /// Allocates a nonce, signs, persists and broadcasts a new transaction.
    #[tracing::instrument(
        skip_all,
        fields(identity = %details.identity, action = %details.action)
    )]
    pub async fn send_transaction(
        &self,
        details: SendTransactionDetails,
    ) -> Result<SignedTransaction> {
        let identity = details.identity;
        let from = self.keys.address(identity)?;
        let gas_price = match details.gas_price {
            Some(gas_price) => gas_price,
            None => self.chain.gas_price().await?,
        };
        let gas_limit = match details.gas_limit {
            Some(gas_limit) => gas_limit,
            None => self.estimate_gas(from, &details).await,
        };

        let (record, raw) = {
            let mut nonces = self.nonces.lock().await;
            let local = nonces.get(&from).copied().unwrap_or_default();
            let pending =
                self.chain.transaction_count(from, BlockTag::Pending).await?;
            let nonce = local.max(pending);
            if let Some(max_nonce) = details.max_nonce {
                if nonce > max_nonce {
                    return Err(Error::NonceCeilingExceeded { nonce, max_nonce });
                }
            }
            let tx = legacy_transaction(
                from,
                details.to,
                details.value,
                details.data.clone(),
                gas_limit,
                gas_price,
                nonce,
                self.keys.chain_id(),
            );
            let raw = self.keys.sign_transaction(identity, &tx).await?;
            let record = StoredTransaction {
                id: ethers::utils::keccak256(&raw).into(),
                identity,
                from,
                to: details.to,
                value: details.value,
                gas_limit,
                gas_price,
                data: details.data,
                nonce,
                attempts: 1,
                action: details.action,
                creation_block: details.creation_block,
                mined_block: None,
            };
            self.store.put(&record, false)?;
            nonces.insert(from, nonce + 1);
            (record, raw)
        };

        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxManager,
            %identity,
            nonce = record.nonce,
            tx_hash = ?record.id,
            signed = true,
        );
        let tx_hash = self.broadcast(&record, raw.clone()).await?;
        self.metrics.transactions_sent.inc();
        Ok(SignedTransaction {
            record,
            raw,
            tx_hash,
        })
    }

    /// Replaces `record` with the same transaction at a higher gas price.
    /// The nonce never changes.
    #[tracing::instrument(
        skip_all,
        fields(identity = %record.identity, nonce = record.nonce)
    )]
    pub async fn resend_transaction(
        &self,
        record: &StoredTransaction,
        current_block: u64,
    ) -> Result<SignedTransaction> {
        let gas_price = self.boosted_gas_price(record.gas_price);
        let (replacement, raw) = {
            let _guard = self.nonces.lock().await;
            let tx = legacy_transaction(
                record.from,
                record.to,
                record.value,
                record.data.clone(),
                record.gas_limit,
                gas_price,
                record.nonce,
                self.keys.chain_id(),
            );
            let raw = self.keys.sign_transaction(record.identity, &tx).await?;
            let replacement = StoredTransaction {
                id: ethers::utils::keccak256(&raw).into(),
                gas_price,
                attempts: record.attempts + 1,
                creation_block: current_block,
                mined_block: None,
                ..record.clone()
            };
            self.store.put(&replacement, true)?;
            (replacement, raw)
        };

        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxManager,
            identity = %replacement.identity,
            nonce = replacement.nonce,
            old_gas_price = %record.gas_price,
            new_gas_price = %gas_price,
            attempts = replacement.attempts,
            resent = true,
        );
        let tx_hash = self.broadcast(&replacement, raw.clone()).await?;
        self.metrics.transactions_resent.inc();
        Ok(SignedTransaction {
            record: replacement,
            raw,
            tx_hash,
        })
    }

    /// `max(old, min(old * retry_gas_price_percent / 100, max_gas_price))`
    fn boosted_gas_price(&self, old: U256) -> U256 {
        let boosted = old
            .saturating_mul(U256::from(self.config.retry_gas_price_percent))
            / 100;
        old.max(boosted.min(self.config.max_gas_price.wei()))
    }

    /// Prunes confirmed transactions, stamps mined ones and resends the
    /// stuck ones. Returns the replacements.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_confirmed(
        &self,
        current_block: u64,
    ) -> Result<Vec<StoredTransaction>> {
        let confirmed_block =
            current_block.saturating_sub(self.config.confirmations);
        let mut replacements = Vec::new();
        for identity in self.keys.identities() {
            let signer = self.keys.address(identity)?;
            let confirmed_nonce = self
                .chain
                .transaction_count(signer, BlockTag::Number(confirmed_block))
                .await?;
            let latest_nonce = self
                .chain
                .transaction_count(signer, BlockTag::Latest)
                .await?;

            let pending = {
                let _guard = self.nonces.lock().await;
                if confirmed_nonce > 0 {
                    let removed = self
                        .store
                        .remove_up_to_nonce(signer, confirmed_nonce - 1)?;
                    if removed > 0 {
                        tracing::debug!(
                            %identity,
                            removed,
                            confirmed_nonce,
                            "pruned confirmed transactions"
                        );
                    }
                }
                let mut pending = Vec::new();
                for mut tx in self.store.get_all_for_signer(signer)? {
                    if tx.is_mined() {
                        continue;
                    }
                    if tx.nonce < latest_nonce {
                        tx.mined_block = Some(current_block);
                        self.store.put(&tx, true)?;
                    } else {
                        pending.push(tx);
                    }
                }
                pending
            };

            for tx in pending {
                if !tx.is_stuck(
                    current_block,
                    self.config.pending_transaction_timeout_blocks,
                ) {
                    break;
                }
                let resent = self.resend_transaction(&tx, current_block).await?;
                replacements.push(resent.record);
            }
        }
        Ok(replacements)
    }

    async fn broadcast(
        &self,
        record: &StoredTransaction,
        raw: Bytes,
    ) -> Result<H256> {
        self.chain.send_raw_transaction(raw).await.map_err(|e| {
            tracing::warn!(
                identity = %record.identity,
                nonce = record.nonce,
                tx_hash = ?record.id,
                error = %e,
                "broadcast failed, the transaction stays stored",
            );
            Error::Broadcast {
                identity: record.identity.to_string(),
                nonce: record.nonce,
                tx_hash: record.id,
                reason: e.to_string(),
            }
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn legacy_transaction(
    from: Address,
    to: Address,
    value: U256,
    data: Bytes,
    gas_limit: U256,
    gas_price: U256,
    nonce: u64,
    chain_id: u64,
) -> TypedTransaction {
    TransactionRequest::new()
        .from(from)
        .to(to)
        .value(value)
        .data(data)
        .gas(gas_limit)
        .gas_price(gas_price)
        .nonce(nonce)
        .chain_id(chain_id)
        .into()
}
