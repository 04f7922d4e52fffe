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

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ethers::types::{Address, H256};
use hub_relayer_types::StoredTransaction;
use hub_relayer_utils::{Error, Result};
use parking_lot::RwLock;

use crate::TxStore;

#[derive(Default)]
struct MemTxStore {
    records: HashMap<H256, StoredTransaction>,
    by_nonce: BTreeMap<(Address, u64), H256>,
}

impl MemTxStore {
    fn collect<'a>(
        &self,
        ids: impl Iterator<Item = &'a H256>,
    ) -> Vec<StoredTransaction> {
        ids.filter_map(|id| self.records.get(id).cloned()).collect()
    }
}

/// InMemoryStore is a store that stores the transactions in memory.
///
/// Nothing survives a restart, meant for tests and throwaway relayers.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<MemTxStore>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl TxStore for InMemoryStore {
    #[tracing::instrument(
        skip_all,
        fields(id = ?tx.id, signer = ?tx.from, nonce = tx.nonce)
    )]
    fn put(&self, tx: &StoredTransaction, allow_update: bool) -> Result<()> {
        let mut guard = self.inner.write();
        let key = (tx.from, tx.nonce);
        if let Some(old_id) = guard.by_nonce.get(&key).copied() {
            if !allow_update {
                return Err(Error::DuplicateNonce {
                    signer: tx.from,
                    nonce: tx.nonce,
                });
            }
            guard.records.remove(&old_id);
        }
        guard.by_nonce.insert(key, tx.id);
        guard.records.insert(tx.id, tx.clone());
        Ok(())
    }

    fn get_by_id(&self, id: H256) -> Result<Option<StoredTransaction>> {
        Ok(self.inner.read().records.get(&id).cloned())
    }

    fn get_by_nonce(
        &self,
        signer: Address,
        nonce: u64,
    ) -> Result<Option<StoredTransaction>> {
        let guard = self.inner.read();
        Ok(guard
            .by_nonce
            .get(&(signer, nonce))
            .and_then(|id| guard.records.get(id))
            .cloned())
    }

    fn get_all_for_signer(
        &self,
        signer: Address,
    ) -> Result<Vec<StoredTransaction>> {
        let guard = self.inner.read();
        let ids = guard
            .by_nonce
            .range((signer, 0)..=(signer, u64::MAX))
            .map(|(_, id)| id);
        Ok(guard.collect(ids))
    }

    fn get_all(&self) -> Result<Vec<StoredTransaction>> {
        let guard = self.inner.read();
        Ok(guard.collect(guard.by_nonce.values()))
    }

    #[tracing::instrument(skip(self))]
    fn remove_up_to_nonce(&self, signer: Address, nonce: u64) -> Result<usize> {
        let mut guard = self.inner.write();
        let doomed: Vec<_> = guard
            .by_nonce
            .range((signer, 0)..=(signer, nonce))
            .map(|(key, id)| (*key, *id))
            .collect();
        for (key, id) in &doomed {
            guard.by_nonce.remove(key);
            guard.records.remove(id);
        }
        Ok(doomed.len())
    }

    fn clear_all(&self) -> Result<()> {
        let mut guard = self.inner.write();
        guard.records.clear();
        guard.by_nonce.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[test]
    fn duplicate_nonce_is_rejected() {
        conformance::duplicate_nonce_is_rejected(&InMemoryStore::default());
    }

    #[test]
    fn update_replaces_the_record() {
        conformance::update_replaces_the_record(&InMemoryStore::default());
    }

    #[test]
    fn signers_are_independent_and_ordered() {
        conformance::signers_are_independent_and_ordered(
            &InMemoryStore::default(),
        );
    }

    #[test]
    fn remove_up_to_nonce_is_inclusive() {
        conformance::remove_up_to_nonce_is_inclusive(
            &InMemoryStore::default(),
        );
    }

    #[test]
    fn clear_all_empties_the_store() {
        conformance::clear_all_empties_the_store(&InMemoryStore::default());
    }

    #[test]
    fn clones_share_state() {
        let store = InMemoryStore::default();
        let other = store.clone();
        store.put(&conformance::record(1, 0, 10), false).unwrap();
        assert_eq!(other.get_all().unwrap().len(), 1);
    }
}
